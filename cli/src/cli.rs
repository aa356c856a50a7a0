use clap::Parser;
use std::path::PathBuf;

/// Terminal client for the COQL query server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Natural-language question to send to the server
    #[arg(index = 1)] // Positional argument
    pub prompt: Option<String>,

    /// Enter interactive mode
    #[arg(short, long, default_value_t = false)]
    pub interactive: bool,

    /// Base URL of the query server (overrides cli.server_url)
    #[arg(long, env = "COQL_SERVER_URL")]
    pub server_url: Option<String>,

    /// Print the success body as JSON instead of the rendered view
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_prompt_and_flags() {
        let args = Args::try_parse_from([
            "coql-cli",
            "deals closing this month",
            "--server-url",
            "http://localhost:9000",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.prompt.as_deref(), Some("deals closing this month"));
        assert_eq!(args.server_url.as_deref(), Some("http://localhost:9000"));
        assert!(args.json);
        assert!(!args.interactive);
    }

    #[test]
    fn test_interactive_without_prompt() {
        let args = Args::try_parse_from(["coql-cli", "-i", "-v"]).unwrap();
        assert!(args.prompt.is_none());
        assert!(args.interactive);
        assert!(args.verbose);
    }
}
