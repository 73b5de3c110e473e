use clap::{Parser, Subcommand};
use std::process::ExitCode;

use crate::clients::meshy::MeshyRemote;
use crate::infra::config::AppConfig;

#[derive(Parser)]
#[command(name = "meshy-mcp-gateway")]
#[command(about = "Meshy MCP Gateway - Admin CLI")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Health check the gateway service
    Health {
        /// Service URL to check
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
    },
    /// Validate configuration
    Config {
        /// Validate config without starting service
        #[arg(long)]
        validate: bool,
    },
    /// Check upstream credentials by fetching the account balance
    Balance,
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    run_commands(cli.command).await
}

pub async fn run_commands(command: Commands) -> ExitCode {
    match command {
        Commands::Health { url } => match health_check(&url).await {
            Ok(_) => {
                println!("✅ Service is healthy");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ Health check failed: {}", e);
                ExitCode::FAILURE
            }
        },
        Commands::Config { validate: _ } => match validate_config() {
            Ok(_) => {
                println!("✅ Configuration is valid");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ Configuration validation failed: {}", e);
                ExitCode::FAILURE
            }
        },
        Commands::Balance => match fetch_balance().await {
            Ok(balance) => {
                println!("✅ Upstream reachable: {balance}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ Balance check failed: {}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn health_check(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/healthz", url))
        .timeout(std::time::Duration::from_millis(500))
        .send()
        .await?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("HTTP {}", response.status()).into())
    }
}

fn validate_config() -> Result<(), Box<dyn std::error::Error>> {
    let mode = std::env::var("MODE").unwrap_or_else(|_| "server".into());
    if !matches!(mode.as_str(), "server" | "stdio") {
        return Err(format!("Invalid MODE: {}. Must be 'server' or 'stdio'", mode).into());
    }

    if mode == "server" {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);

        if port == 0 {
            return Err("PORT cannot be 0".into());
        }
    }

    let app_cfg = AppConfig::from_env_and_toml();
    if app_cfg.meshy.api_key.is_none() {
        eprintln!("⚠️  MESHY_API_KEY not set; Meshy tools will error until configured");
    }

    Ok(())
}

async fn fetch_balance() -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let app_cfg = AppConfig::from_env_and_toml();
    let client = MeshyRemote::from_config(&app_cfg.meshy);
    Ok(client.balance().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn validate_config_accepts_defaults() {
        std::env::remove_var("MODE");
        std::env::remove_var("PORT");
        assert!(validate_config().is_ok());
    }

    #[test]
    #[serial]
    fn validate_config_rejects_bad_mode() {
        std::env::set_var("MODE", "carrier-pigeon");
        assert!(validate_config().is_err());
        std::env::remove_var("MODE");
    }

    #[test]
    #[serial]
    fn validate_config_rejects_port_zero() {
        std::env::set_var("MODE", "server");
        std::env::set_var("PORT", "0");
        assert!(validate_config().is_err());
        std::env::remove_var("MODE");
        std::env::remove_var("PORT");
    }

    #[tokio::test]
    #[serial]
    async fn health_command_fails_against_closed_port() {
        let code = run_commands(Commands::Health {
            url: "http://127.0.0.1:1".into(),
        })
        .await;
        // ExitCode has no PartialEq; compare the debug form.
        assert_eq!(format!("{code:?}"), format!("{:?}", ExitCode::FAILURE));
    }
}
