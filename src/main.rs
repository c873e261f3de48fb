//! Relkit - deterministic release packaging pipeline.
//!
//! This binary drives the packaging stages (freeze, bundle, normalize,
//! archive, installer, sign, notarize, verify) for one target platform,
//! propagating sub-tool exit statuses unchanged.

mod cli;
mod error;
mod pipeline;

use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Run CLI and get exit code
    let exit_code = match cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_status()
        }
    };

    process::exit(exit_code);
}
