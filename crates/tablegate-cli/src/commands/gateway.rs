//! Gateway command - start and check the gateway server.

use crate::ui;
use anyhow::{Context, Result};
use tablegate_core::Config;
use tablegate_core::config::BindMode;
use tablegate_gateway::GatewayConfig;

/// Gateway command arguments.
#[derive(Debug, Clone)]
pub struct GatewayArgs {
    /// Subcommand.
    pub action: GatewayAction,
}

/// Gateway actions.
#[derive(Debug, Clone)]
pub enum GatewayAction {
    Run {
        /// Port to listen on.
        port: Option<u16>,
        /// Bind address.
        bind: Option<String>,
    },
    Status,
}

/// Run the gateway command.
pub async fn run_gateway(args: GatewayArgs) -> Result<()> {
    match args.action {
        GatewayAction::Run { port, bind } => run_gateway_server(port, bind).await,
        GatewayAction::Status => gateway_status().await,
    }
}

/// Start the gateway server.
async fn run_gateway_server(port: Option<u16>, bind: Option<String>) -> Result<()> {
    let path = Config::default_path();
    let config = Config::load_default()
        .with_context(|| format!("Failed to load {}", path.display()))?
        .with_env_overrides();
    if path.exists() {
        tracing::debug!(path = %path.display(), "Loaded configuration");
    } else {
        ui::info("No configuration file found, using defaults");
    }

    let mut gateway_config = GatewayConfig::from_config(&config);
    if let Some(port) = port {
        gateway_config.port = port;
    }
    if let Some(bind) = bind {
        gateway_config.bind_address = bind;
    }

    let address = format!("{}:{}", gateway_config.bind_address, gateway_config.port);
    if std::net::TcpListener::bind(&address).is_err() {
        anyhow::bail!("Address {address} is already in use");
    }

    ui::header("Starting Tablegate Gateway");
    ui::kv("Address", &address);
    let mode_str = match &config.gateway.mode {
        BindMode::Local => "local",
        BindMode::Public => "public",
        BindMode::Custom(_) => "custom",
    };
    ui::kv("Mode", mode_str);
    let shield = &gateway_config.shield;
    ui::kv("Shield", if shield.enabled { "enabled" } else { "disabled" });
    ui::kv("Counting", &format!("{:?}", shield.counting));
    ui::kv(
        "Admin API",
        if shield.admin_api { "/admin/shield" } else { "off" },
    );
    if shield.admin_api && gateway_config.bind_address != "127.0.0.1" {
        ui::warning("Admin API is unauthenticated and the gateway is not bound to loopback");
    }
    println!();

    ui::info("Press Ctrl+C to stop");
    println!();

    tablegate_gateway::start(gateway_config).await?;

    Ok(())
}

/// Check gateway status.
async fn gateway_status() -> Result<()> {
    ui::header("Gateway Status");

    let port = Config::load_default()
        .map(|c| c.with_env_overrides().gateway.port)
        .unwrap_or_else(|_| GatewayConfig::default().port);

    let client = reqwest::Client::new();
    match client
        .get(format!("http://127.0.0.1:{port}/health"))
        .timeout(std::time::Duration::from_secs(2))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            ui::success(&format!("Gateway is running on port {port}"));
            if let Ok(body) = resp.json::<serde_json::Value>().await {
                if let Some(version) = body.get("version").and_then(|v| v.as_str()) {
                    ui::kv("Version", version);
                }
                if let Some(status) = body.get("status").and_then(|v| v.as_str()) {
                    ui::kv("Status", status);
                }
            }
        }
        Ok(resp) => {
            ui::warning(&format!("Health check failed: HTTP {}", resp.status()));
        }
        Err(_) => {
            ui::warning(&format!("Gateway is not running on port {port}"));
            ui::info("Start with: tablegate gateway run");
        }
    }

    Ok(())
}
