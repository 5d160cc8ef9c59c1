//! Write the wallet ledger OpenAPI document.
//!
//! ```text
//! export_openapi                      # stdout
//! export_openapi --output openapi.json
//! ```

use anyhow::Context;
use utoipa::OpenApi;
use wallet_ledger::gateway::openapi::ApiDoc;

fn output_path() -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == "--output" || a == "-o")
        .and_then(|i| args.get(i + 1).cloned())
}

fn main() -> anyhow::Result<()> {
    let json = ApiDoc::openapi()
        .to_pretty_json()
        .context("Failed to serialize OpenAPI document")?;

    match output_path() {
        Some(path) => {
            std::fs::write(&path, &json).with_context(|| format!("Failed to write {}", path))?;
            eprintln!("OpenAPI document written to {}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}
