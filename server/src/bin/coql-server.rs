use anyhow::{Context, Result};
use clap::Parser;
use coql_core::{
    AppConfig, ChatCompletionClient, CoqlConverter, QueryPipeline, ResponseProcessor,
    ZohoCoqlExecutor,
};
use coql_server::http_server::{self, AppState};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "coql-server",
    about = "Natural language to Zoho COQL query server",
    version
)]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides server.host)
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "COQL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Print the effective configuration with secrets redacted and exit
    #[arg(long)]
    dump_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config =
        AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(host) = args.host {
        config.server.host = host.to_string();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if args.dump_config {
        let dumped = config.redacted().to_toml_string()?;
        print!("{}", dumped);
        return Ok(());
    }

    let log_level = args
        .log_level
        .or_else(|| config.server.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)))
        .init();

    info!("Starting COQL server");

    let llm = ChatCompletionClient::new(&config.llm)
        .context("Failed to initialize LLM client")?;
    info!(
        provider = %config.llm.provider,
        model = %config.llm.model_name,
        "Initialized LLM client"
    );
    let llm = Arc::new(llm);

    let executor = ZohoCoqlExecutor::new(&config.zoho)
        .context("Failed to initialize Zoho executor")?;
    info!(api = %config.zoho.api_base_url, "Initialized Zoho executor");

    let pipeline = QueryPipeline::new(
        CoqlConverter::new(llm.clone()),
        Arc::new(executor),
        ResponseProcessor::new(llm),
    );

    let host: IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid server host '{}'", config.server.host))?;
    let addr = SocketAddr::new(host, config.server.port);

    http_server::run_server(AppState::new(pipeline), addr).await?;

    info!("COQL server shutting down");
    Ok(())
}
