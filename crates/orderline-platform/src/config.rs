use anyhow::{Context, Result};
use orderline_core::Agent;

const DEFAULT_SHEETS_API_URL: &str = "https://sheets.googleapis.com";

#[derive(Clone, Debug)]
pub struct SheetsConfig {
    pub api_url: String,
    pub spreadsheet_id: String,
    pub access_token: String,
    pub order_sheet: String,
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub name: String,
    pub max_attempts: u32,
    /// Names this process's processing list; must be stable across restarts
    /// so reserved jobs are recovered.
    pub worker_id: String,
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: String,
    pub queue: QueueConfig,
    pub sheets: SheetsConfig,
    pub import_service_url: Option<String>,
    pub agents: Vec<Agent>,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let mut config = Self::worker_from_env()?;
        config.http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());
        if config.import_service_url.is_none() {
            anyhow::bail!("IMPORT_SERVICE_URL is required");
        }
        Ok(config)
    }

    pub fn worker_from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;

        let queue = QueueConfig {
            name: std::env::var("ORDER_QUEUE").unwrap_or_else(|_| "orders".to_string()),
            max_attempts: match std::env::var("ORDER_QUEUE_MAX_ATTEMPTS") {
                Ok(raw) => raw
                    .parse()
                    .context("ORDER_QUEUE_MAX_ATTEMPTS must be a positive integer")?,
                Err(_) => 3,
            },
            worker_id: std::env::var("ORDER_WORKER_ID")
                .or_else(|_| std::env::var("HOSTNAME"))
                .unwrap_or_else(|_| "worker-1".to_string()),
        };

        let sheets = SheetsConfig {
            api_url: std::env::var("SHEETS_API_URL")
                .unwrap_or_else(|_| DEFAULT_SHEETS_API_URL.to_string()),
            spreadsheet_id: std::env::var("SHEETS_SPREADSHEET_ID")
                .context("SHEETS_SPREADSHEET_ID is required")?,
            access_token: std::env::var("SHEETS_ACCESS_TOKEN")
                .context("SHEETS_ACCESS_TOKEN is required")?,
            order_sheet: std::env::var("SHEETS_ORDER_SHEET").unwrap_or_else(|_| "Orders".to_string()),
        };

        let agents = match std::env::var("ORDER_AGENTS") {
            Ok(raw) => parse_agents(&raw)?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            database_url,
            redis_url,
            http_addr: String::new(),
            queue,
            sheets,
            import_service_url: std::env::var("IMPORT_SERVICE_URL").ok(),
            agents,
        })
    }
}

pub fn parse_agents(raw: &str) -> Result<Vec<Agent>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
        .context("ORDER_AGENTS must be a JSON list of {\"phone_number\", \"name\"} objects")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agents_parse_in_configured_order() {
        let agents = parse_agents(
            r#"[{"phone_number": "012-345 6789", "name": "Aisyah"},
                {"phone_number": "+65 9123 4567", "name": "Wei Ling"}]"#,
        )
        .unwrap();

        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].name, "Aisyah");
        assert_eq!(agents[1].phone_number, "+65 9123 4567");
    }

    #[test]
    fn blank_agent_list_is_empty() {
        assert!(parse_agents("  ").unwrap().is_empty());
        assert!(parse_agents("not json").is_err());
    }
}
