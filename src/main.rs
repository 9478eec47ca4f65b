#[tokio::main]
async fn main() -> anyhow::Result<()> {
    officeflow_lib::run().await
}
