use clap::Parser;
use coql_core::AppConfig;
use std::process::ExitCode;

mod app;
mod cli;
mod logging;
mod output;
mod query_client;

use crate::cli::Args;
use crate::logging::log_error;
use crate::output::print_usage_instructions;
use crate::query_client::QueryClient;

/// Main function - Sends questions to the query server and renders the view
#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let args = Args::parse();

    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log_error(&format!("Failed to load configuration: {}", e));
            return Ok(ExitCode::FAILURE);
        }
    };

    logging::init(logging::resolve_level(
        args.verbose,
        config.cli.log_level.as_deref(),
    ));

    let server_url = args
        .server_url
        .clone()
        .unwrap_or_else(|| config.cli.server_url.clone());
    let client = QueryClient::new(&server_url)?;

    if args.interactive {
        if let Err(e) = app::run_interactive(&client, args.json).await {
            log_error(&format!("Interactive session failed: {:#}", e));
            return Ok(ExitCode::FAILURE);
        }
    } else if let Some(prompt) = args.prompt.as_deref() {
        if !app::run_single_query(&client, prompt, args.json).await? {
            return Ok(ExitCode::FAILURE);
        }
    } else {
        print_usage_instructions();
    }

    Ok(ExitCode::SUCCESS)
}
