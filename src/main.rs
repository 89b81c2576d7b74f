fn main() -> anyhow::Result<()> {
    unigrid_wallet_lib::run()
}
