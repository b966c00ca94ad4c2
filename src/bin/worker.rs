#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = mocklab_rust::run_worker().await {
        eprintln!("mocklab-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
