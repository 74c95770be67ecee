//! Entrypoint for the sotay MCP server binary.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    sotay_mcp::serve_stdio().await?;
    Ok(())
}
