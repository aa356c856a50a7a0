use anyhow::{Context, Result};
use coql_core::{QueryView, ViewState};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::output::{print_json, render_view};
use crate::query_client::QueryClient;

/// Runs one submission against `view`.
///
/// Returns `false` when a newer submission started meanwhile and this
/// outcome was dropped.
pub async fn submit(client: &QueryClient, view: &Mutex<QueryView>, natural_query: &str) -> bool {
    let token = view.lock().await.begin_submission();
    debug!("Submission {} started", token.value());
    let outcome = client.submit(natural_query).await;
    view.lock().await.complete(token, outcome)
}

fn loading_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Processing your query...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Submits with the spinner shown for the loading state, then prints the final state
async fn submit_and_show(
    client: &QueryClient,
    view: &Mutex<QueryView>,
    natural_query: &str,
    json: bool,
) -> Result<ViewState> {
    let spinner = loading_spinner();
    submit(client, view, natural_query).await;
    spinner.finish_and_clear();

    let state = view.lock().await.state().clone();
    match (&state, json) {
        (ViewState::Results(response), true) => print_json(response)?,
        _ => print!("{}", render_view(&state)),
    }
    Ok(state)
}

/// Runs a single query and returns `true` when it ended in results
pub async fn run_single_query(client: &QueryClient, prompt: &str, json: bool) -> Result<bool> {
    info!("Running single query");
    let view = Mutex::new(QueryView::new());
    let state = submit_and_show(client, &view, prompt, json).await?;
    Ok(!state.error_visible())
}

/// Reads questions from stdin until `exit`, `quit` or end of input
pub async fn run_interactive(client: &QueryClient, json: bool) -> Result<()> {
    match client.health().await {
        Ok(health) => info!("Server at {} is {}", client.base_url(), health.status),
        Err(e) => {
            warn!("Health check failed: {:#}", e);
            eprintln!(
                "{}",
                format!("Warning: could not reach {} ({})", client.base_url(), e).yellow()
            );
        }
    }

    println!("Ask questions about your Zoho CRM data.");
    println!("Type 'exit' or 'quit' to end the session.");
    println!();

    let view = Mutex::new(QueryView::new());
    let stdin = io::stdin();

    loop {
        print!("{}: ", "Query".green().bold());
        io::stdout().flush().context("Failed to flush stdout")?;

        let mut input = String::new();
        let read = stdin
            .lock()
            .read_line(&mut input)
            .context("Failed to read input")?;
        if read == 0 {
            println!();
            break;
        }

        let input = input.trim_end_matches(['\r', '\n']);
        if input.trim().eq_ignore_ascii_case("exit") || input.trim().eq_ignore_ascii_case("quit")
        {
            println!("Exiting.");
            break;
        }

        // Empty input is submitted like any other; the server decides
        submit_and_show(client, &view, input, json).await?;
        println!();
    }

    Ok(())
}
