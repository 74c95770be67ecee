//! Entrypoint for the `sotay` CLI binary.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    sotay_cli::run().await
}
