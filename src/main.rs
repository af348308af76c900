#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cartwright::cli::run().await
}
