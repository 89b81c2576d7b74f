//! Release version parsing and update classification

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Parsed semantic version with optional pre-release tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Pre-release tag (e.g., "rc7", "beta1", "alpha"). None means final release.
    pub prerelease: Option<String>,
}

impl Version {
    /// Parse `major.minor[.patch][-prerelease]`, with an optional leading `v`
    pub fn parse(version: &str) -> Option<Self> {
        let version = version.trim().trim_start_matches('v');

        let (version_part, prerelease) = match version.split_once('-') {
            Some((v, pre)) if !pre.is_empty() => (v, Some(pre.to_string())),
            Some((v, _)) => (v, None),
            None => (version, None),
        };

        let parts: Vec<&str> = version_part.split('.').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return None;
        }

        Some(Version {
            major: parts.first()?.parse().ok()?,
            minor: parts.get(1)?.parse().ok()?,
            patch: match parts.get(2) {
                Some(p) => p.parse().ok()?,
                None => 0,
            },
            prerelease,
        })
    }

    /// Version of the running wallet
    pub fn current() -> Self {
        // CARGO_PKG_VERSION is always a valid semver
        Self::parse(env!("CARGO_PKG_VERSION")).unwrap_or(Version {
            major: 0,
            minor: 0,
            patch: 0,
            prerelease: None,
        })
    }

    pub fn is_newer_than(&self, other: &Version) -> bool {
        self > other
    }

    /// None (final release) > Some (pre-release)
    fn compare_prerelease(a: &Option<String>, b: &Option<String>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => {
                let a_prefix = a.trim_end_matches(|c: char| c.is_ascii_digit());
                let b_prefix = b.trim_end_matches(|c: char| c.is_ascii_digit());

                // Same prefix (both "rc", both "beta"): compare the numeric suffix
                if a_prefix == b_prefix {
                    let a_num: u32 = a[a_prefix.len()..].parse().unwrap_or(0);
                    let b_num: u32 = b[b_prefix.len()..].parse().unwrap_or(0);
                    a_num.cmp(&b_num)
                } else {
                    // alpha < beta < rc
                    a.cmp(b)
                }
            }
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| Self::compare_prerelease(&self.prerelease, &other.prerelease))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

/// How urgently a downloaded update must be installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    /// Shown as a blocking warning until installed or skipped
    Mandatory,
    /// Only flagged in the control bar
    Optional,
}

pub struct UpdatePolicy;

impl UpdatePolicy {
    /// A new major or minor release is mandatory; patch and pre-release
    /// bumps are optional.
    pub fn classify(current: &Version, new: &Version) -> UpdateKind {
        if current.major != new.major || current.minor != new.minor {
            UpdateKind::Mandatory
        } else {
            UpdateKind::Optional
        }
    }
}
