use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::{Map, Value};

#[derive(Parser)]
#[command(name = "gatewayctl")]
#[command(about = "Control CLI for proxy-gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:9090")]
    url: String,

    /// Control API secret, if one is configured.
    #[arg(short, long)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective general settings
    Show,
    /// Change general settings; omitted options keep their current value
    Patch {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        socks_port: Option<u16>,
        #[arg(long)]
        redir_port: Option<u16>,
        #[arg(long)]
        allow_lan: Option<bool>,
        #[arg(long)]
        bind_address: Option<String>,
        #[arg(long)]
        redir_bind_address: Option<String>,
        /// global, rule or direct
        #[arg(long)]
        mode: Option<String>,
        /// debug, info, warning, error or silent
        #[arg(long)]
        log_level: Option<String>,
    },
    /// Reload a configuration file
    Reload {
        path: PathBuf,
        /// Also reapply listeners, mode and log level
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(secret) = &cli.secret {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", secret))?);
    }
    let configs = format!("{}/configs", cli.url.trim_end_matches('/'));

    match cli.command {
        Commands::Show => {
            let res = client.get(&configs).headers(headers).send().await?;
            print_response(res).await?;
        }
        Commands::Patch {
            port,
            socks_port,
            redir_port,
            allow_lan,
            bind_address,
            redir_bind_address,
            mode,
            log_level,
        } => {
            let mut body = Map::new();
            insert(&mut body, "port", port);
            insert(&mut body, "socks-port", socks_port);
            insert(&mut body, "redir-port", redir_port);
            insert(&mut body, "allow-lan", allow_lan);
            insert(&mut body, "bind-address", bind_address);
            insert(&mut body, "redir-bind-address", redir_bind_address);
            insert(&mut body, "mode", mode);
            insert(&mut body, "log-level", log_level);

            let res = client.patch(&configs).headers(headers).json(&body).send().await?;
            print_response(res).await?;
        }
        Commands::Reload { path, force } => {
            // The server only accepts absolute paths.
            let path = std::fs::canonicalize(&path)?;
            let res = client
                .put(&configs)
                .query(&[("force", force.to_string())])
                .headers(headers)
                .json(&serde_json::json!({ "path": path }))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

fn insert<T: Into<Value>>(body: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        body.insert(key.to_string(), value.into());
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: control API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }
    if status == StatusCode::NO_CONTENT {
        println!("OK");
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
