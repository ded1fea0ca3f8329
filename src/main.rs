#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = markscan::run().await {
        eprintln!("markscan fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
