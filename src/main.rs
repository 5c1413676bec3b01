#[tokio::main]
async fn main() -> anyhow::Result<()> {
    imagechat_lib::run().await
}
