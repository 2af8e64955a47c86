#[tokio::main]
async fn main() -> anyhow::Result<()> {
    parley_lib::run().await
}
