//! Shield command - operate the request shield of a running gateway.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use tablegate_core::Config;
use tablegate_gateway::ShieldStats;
use tablegate_gateway::admin::{
    BlockRequest, BlockResponse, ClearResponse, UnblockRequest, UnblockResponse,
};

use crate::ui;

/// Shield command arguments.
#[derive(Debug, Clone)]
pub struct ShieldArgs {
    /// Gateway base URL override.
    pub url: Option<String>,
    /// Subcommand.
    pub action: ShieldAction,
}

/// Shield actions.
#[derive(Debug, Clone)]
pub enum ShieldAction {
    Stats,
    Block {
        ip: String,
        reason: Option<String>,
        duration_secs: Option<u64>,
    },
    Unblock {
        ip: String,
    },
    Clear {
        yes: bool,
    },
}

/// Run the shield command.
pub async fn run_shield(args: ShieldArgs) -> Result<()> {
    let base_url = match args.url {
        Some(url) => url,
        None => {
            let port = Config::load_default()?.with_env_overrides().gateway.port;
            format!("http://127.0.0.1:{port}")
        }
    };
    let client = AdminClient::new(&base_url);

    match args.action {
        ShieldAction::Stats => {
            let stats = client.stats().await?;
            ui::header("Shield Statistics");
            ui::kv("Tracked clients", &stats.total_tracked_ips.to_string());
            ui::kv("Blocked clients", &stats.blocked_ips.to_string());
            ui::kv("Requests (last 60s)", &stats.recent_requests.to_string());
        }

        ShieldAction::Block {
            ip,
            reason,
            duration_secs,
        } => {
            let request = BlockRequest {
                ip,
                reason,
                duration_ms: duration_secs.map(|s| s.saturating_mul(1000)),
            };
            let block = client.block(&request).await?;
            ui::success(&format!("Blocked {}", block.ip));
            ui::kv("Reason", &block.reason);
            ui::kv("Until", &block.until.format("%Y-%m-%d %H:%M:%S UTC").to_string());
        }

        ShieldAction::Unblock { ip } => {
            let result = client.unblock(&UnblockRequest { ip }).await?;
            if result.unblocked {
                ui::success(&format!("Unblocked {}", result.ip));
            } else {
                ui::info(&format!("{} was not blocked", result.ip));
            }
        }

        ShieldAction::Clear { yes } => {
            if !yes {
                ui::warning("This forgets every tracked client and lifts all blocks.");
                if !ui::prompts::confirm("Clear shield state?")? {
                    ui::info("Clear cancelled");
                    return Ok(());
                }
            }
            let result = client.clear().await?;
            ui::success(&format!("Cleared {} client entries", result.cleared));
        }
    }

    Ok(())
}

/// Thin client for the gateway's `/admin/shield` endpoints.
struct AdminClient {
    http: reqwest::Client,
    base: String,
}

impl AdminClient {
    fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: admin_base(base_url),
        }
    }

    async fn stats(&self) -> Result<ShieldStats> {
        let response = self
            .http
            .get(format!("{}/stats", self.base))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .with_context(|| format!("Cannot reach gateway at {}", self.base))?;
        decode(response).await
    }

    async fn block(&self, request: &BlockRequest) -> Result<BlockResponse> {
        self.post("block", request).await
    }

    async fn unblock(&self, request: &UnblockRequest) -> Result<UnblockResponse> {
        self.post("unblock", request).await
    }

    async fn clear(&self) -> Result<ClearResponse> {
        self.post("clear", &serde_json::json!({})).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{}/{endpoint}", self.base))
            .timeout(Duration::from_secs(5))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Cannot reach gateway at {}", self.base))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let detail = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| status.to_string());
    anyhow::bail!("Gateway rejected request: {detail}")
}

fn admin_base(base_url: &str) -> String {
    format!("{}/admin/shield", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_base() {
        assert_eq!(
            admin_base("http://127.0.0.1:8787"),
            "http://127.0.0.1:8787/admin/shield"
        );
        assert_eq!(
            admin_base("http://gateway.local/"),
            "http://gateway.local/admin/shield"
        );
    }
}
