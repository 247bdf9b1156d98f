#[tokio::main]
async fn main() -> anyhow::Result<()> {
    duet_messaging::run().await
}
