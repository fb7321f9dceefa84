use clap::{Parser, Subcommand, ValueEnum};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gatekeeper-cli")]
#[command(about = "Read-only client for the gatekeeper admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "GATEKEEPER_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show tracked client counts and uptime
    Status,
    /// List bans currently in force
    Bans,
    /// Show recent security log entries
    Logs {
        #[arg(short = 't', long = "type", value_enum, default_value_t = LogType::All)]
        log_type: LogType,

        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogType {
    All,
    Blocked,
    Banned,
}

impl LogType {
    fn as_str(self) -> &'static str {
        match self {
            LogType::All => "all",
            LogType::Blocked => "blocked",
            LogType::Banned => "banned",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let url = match cli.command {
        Commands::Status => format!("{}/admin/status", cli.url),
        Commands::Bans => format!("{}/admin/bans", cli.url),
        Commands::Logs { log_type, limit } => format!(
            "{}/admin/security-logs?type={}&limit={}",
            cli.url,
            log_type.as_str(),
            limit
        ),
    };

    let res = client.get(url).headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
