#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = mocklab_rust::run().await {
        eprintln!("mocklab-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
