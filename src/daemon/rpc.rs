//! JSON-RPC client for the local daemon
//!
//! One HTTP request per call, Basic auth, no retries. Callers decide what a
//! failure means.

use crate::config::RpcCredentials;
use crate::error::RpcError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Per-request timeout of the HTTP transport
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// RPC request structure
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

/// Error object inside a response
#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Something that can carry a JSON-RPC call to the daemon
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError>;
}

/// HTTP transport to `127.0.0.1:<port>`
pub struct HttpTransport {
    url: String,
    credentials: RpcCredentials,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(credentials: RpcCredentials) -> Result<Self, RpcError> {
        Self::with_host("127.0.0.1", credentials)
    }

    pub fn with_host(host: &str, credentials: RpcCredentials) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            url: format!("http://{}:{}/", host, credentials.port),
            credentials,
            client,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let request = RpcRequest {
            jsonrpc: "1.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params: &params,
        };

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
            .header(reqwest::header::CONNECTION, "close")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        // Bitcoin-family daemons report RPC errors as HTTP 500 with a JSON
        // body, so the body is consulted before the status code.
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => interpret_response(map, status),
            _ if !status.is_success() => Err(RpcError::Http {
                status: status.as_u16(),
            }),
            Ok(other) => Err(RpcError::Malformed(format!("unexpected response: {}", other))),
            Err(e) => Err(RpcError::Malformed(e.to_string())),
        }
    }
}

fn interpret_response(
    mut response: serde_json::Map<String, Value>,
    status: reqwest::StatusCode,
) -> Result<Value, RpcError> {
    match response.remove("error") {
        None | Some(Value::Null) => {}
        Some(error) => {
            let error: RpcErrorBody = serde_json::from_value(error)
                .map_err(|e| RpcError::Malformed(format!("invalid error object: {}", e)))?;
            return Err(RpcError::Daemon {
                code: error.code,
                message: error.message,
            });
        }
    }

    // `null` is a legitimate result for void methods, but the key itself
    // must be present.
    match response.remove("result") {
        Some(result) => Ok(result),
        None if !status.is_success() => Err(RpcError::Http {
            status: status.as_u16(),
        }),
        None => Err(RpcError::Malformed("response missing result".to_string())),
    }
}

/// Split `"masternode list-conf"` into method and leading parameters
fn split_command(command: &str) -> (&str, Vec<Value>) {
    let mut words = command.split_whitespace();
    let method = words.next().unwrap_or(command);
    let leading = words.map(|w| Value::String(w.to_string())).collect();
    (method, leading)
}

/// Lightweight RPC client; cheap to clone, one per caller is fine
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
}

impl RpcClient {
    /// Create a client talking HTTP to the local daemon
    pub fn connect(credentials: RpcCredentials) -> Result<Self, RpcError> {
        Ok(Self::from_transport(Arc::new(HttpTransport::new(credentials)?)))
    }

    pub fn from_transport(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    /// Untyped call; resolves with the `result` field
    pub async fn call(&self, command: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let (method, mut all_params) = split_command(command);
        all_params.extend(params);
        log::trace!("rpc -> {} {:?}", method, all_params);
        self.transport.call(method, all_params).await
    }

    /// Typed call; the result is decoded into `T`
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        command: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        let value = self.call(command, params).await?;
        serde_json::from_value(value).map_err(|e| RpcError::Decode {
            method: command.to_string(),
            reason: e.to_string(),
        })
    }

    /// Probe the endpoint with `getinfo`
    pub async fn reachability(&self) -> Reachability {
        match self.call("getinfo", vec![]).await {
            Ok(_) => Reachability::Answered,
            Err(e) if e.is_daemon_response() => Reachability::Answered,
            Err(e) if e.is_unauthorized() => Reachability::Unauthorized,
            Err(_) => Reachability::Unreachable,
        }
    }

    /// The daemon answers at all (a warm-up error or a credentials
    /// rejection counts as an answer)
    pub async fn is_reachable(&self) -> bool {
        self.reachability().await != Reachability::Unreachable
    }
}

/// Outcome of a readiness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// JSON-RPC payload came back, possibly a warm-up error
    Answered,
    /// HTTP 401: something listens on the port with other credentials
    Unauthorized,
    Unreachable,
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory transport and a minimal HTTP daemon for tests

    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    type Reply = Result<Value, RpcError>;

    /// Scripted transport: each method has a queue of replies; the last
    /// reply repeats once the queue is down to one entry.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: Mutex<HashMap<String, VecDeque<Reply>>>,
        pub calls: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn reply(&self, method: &str, reply: Reply) -> &Self {
            self.replies
                .lock()
                .unwrap()
                .entry(method.to_string())
                .or_default()
                .push_back(reply);
            self
        }

        pub fn ok(&self, method: &str, value: Value) -> &Self {
            self.reply(method, Ok(value))
        }

        pub fn err(&self, method: &str, code: i64, message: &str) -> &Self {
            self.reply(
                method,
                Err(RpcError::Daemon {
                    code,
                    message: message.to_string(),
                }),
            )
        }

        pub fn methods_called(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
        }
    }

    fn clone_reply(reply: &Reply) -> Reply {
        match reply {
            Ok(v) => Ok(v.clone()),
            Err(RpcError::Daemon { code, message }) => Err(RpcError::Daemon {
                code: *code,
                message: message.clone(),
            }),
            Err(RpcError::Http { status }) => Err(RpcError::Http { status: *status }),
            Err(e) => Err(RpcError::Transport(e.to_string())),
        }
    }

    #[async_trait]
    impl RpcTransport for ScriptedTransport {
        async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params));

            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(method) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) if queue.len() == 1 => clone_reply(&queue[0]),
                _ => Err(RpcError::Transport(format!("no scripted reply for {}", method))),
            }
        }
    }

    /// Serve raw HTTP responses from `handler(body) -> (status line, body)`
    /// on an ephemeral localhost port. Returns the port.
    pub async fn spawn_http_daemon<F>(handler: F) -> u16
    where
        F: Fn(Value) -> (&'static str, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handler = Arc::new(handler);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let request = read_http_body(&mut stream).await;
                    let json = serde_json::from_slice(&request).unwrap_or(Value::Null);
                    let (status, body) = handler(json);
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        port
    }

    async fn read_http_body(stream: &mut tokio::net::TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let n = stream.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return Vec::new();
            }
            buf.extend_from_slice(&chunk[..n]);

            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let length = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);

                let body_start = pos + 4;
                while buf.len() < body_start + length {
                    let n = stream.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                return buf[body_start..].to_vec();
            }
        }
    }

    pub fn creds(port: u16) -> RpcCredentials {
        RpcCredentials {
            user: "user".to_string(),
            password: "pass".to_string(),
            port,
        }
    }
}
