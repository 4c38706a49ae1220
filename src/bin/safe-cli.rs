use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "safe-cli")]
#[command(about = "Management CLI for the Safe coordinator", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "SAFE_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check coordinator status
    Status,
    /// Count tracked transactions by status
    Summary,
    /// Show one tracked transaction
    Transaction {
        /// Chain transaction hash (0x-prefixed)
        tx_hash: String,
    },
    /// Track a submitted Safe creation
    Register {
        /// JSON body: {"tx_hash", "user_id", "params"}
        json: String,
    },
    /// Create a proposal
    Propose {
        /// JSON body: {"safe_address", "kind", "required_signatures"}
        json: String,
    },
    /// Show one proposal
    Proposal { id: String },
    /// Print the nonce and hash owners must sign
    Prepare { id: String },
    /// Add an owner signature to a proposal
    Sign {
        id: String,
        /// JSON body: {"signer", "signature"}
        json: String,
    },
    /// Submit a proposal that has reached quorum
    Execute { id: String },
}

impl Commands {
    fn path(&self) -> String {
        match self {
            Commands::Status => "/admin/status".to_string(),
            Commands::Summary => "/admin/summary".to_string(),
            Commands::Transaction { tx_hash } => format!("/admin/transactions/{}", tx_hash),
            Commands::Register { .. } => "/admin/transactions".to_string(),
            Commands::Propose { .. } => "/admin/proposals".to_string(),
            Commands::Proposal { id } => format!("/admin/proposals/{}", id),
            Commands::Prepare { id } => format!("/admin/proposals/{}/prepare", id),
            Commands::Sign { id, .. } => format!("/admin/proposals/{}/signatures", id),
            Commands::Execute { id } => format!("/admin/proposals/{}/execute", id),
        }
    }

    /// Request body for write commands; `None` means GET.
    fn body(&self) -> Result<Option<Value>, serde_json::Error> {
        match self {
            Commands::Register { json } | Commands::Propose { json } | Commands::Sign { json, .. } => {
                serde_json::from_str(json).map(Some)
            }
            Commands::Prepare { .. } | Commands::Execute { .. } => Ok(Some(Value::Null)),
            _ => Ok(None),
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

    let url = format!("{}{}", cli.url.trim_end_matches('/'), cli.command.path());
    let request = match cli.command.body()? {
        Some(Value::Null) => client.post(url),
        Some(body) => client.post(url).json(&body),
        None => client.get(url),
    };
    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
