//! Spreadsheet ledger client (Sheets v4 `values` API).

use std::sync::Arc;

use async_trait::async_trait;
use orderline_core::LedgerMirror;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SheetsConfig;

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Unauthorized: access token rejected")]
    Unauthorized,
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct AppendBody<'a> {
    values: [&'a [String]; 1],
}

#[derive(Clone)]
pub struct SheetsClient {
    inner: Arc<SheetsClientInner>,
}

struct SheetsClientInner {
    client: reqwest::Client,
    values_url: String,
    access_token: String,
}

impl SheetsClient {
    pub fn new(config: &SheetsConfig) -> Result<Self, SheetsError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            inner: Arc::new(SheetsClientInner {
                client,
                values_url: format!(
                    "{}/v4/spreadsheets/{}/values",
                    config.api_url.trim_end_matches('/'),
                    config.spreadsheet_id
                ),
                access_token: config.access_token.clone(),
            }),
        })
    }

    async fn get_range(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        let response = self
            .inner
            .client
            .get(format!("{}/{range}", self.inner.values_url))
            .bearer_auth(&self.inner.access_token)
            .send()
            .await?;

        let body: ValueRange = check(response).await?.json().await?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    async fn append(&self, sheet: &str, values: &[String]) -> Result<(), SheetsError> {
        let response = self
            .inner
            .client
            .post(format!("{}/{sheet}!A1:append", self.inner.values_url))
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(&self.inner.access_token)
            .json(&AppendBody { values: [values] })
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, SheetsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SheetsError::Unauthorized);
    }
    let message = response.text().await.unwrap_or_default();
    Err(SheetsError::Api {
        status: status.as_u16(),
        message,
    })
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl LedgerMirror for SheetsClient {
    async fn header_row(&self, sheet: &str) -> anyhow::Result<Vec<String>> {
        let rows = self.get_range(&format!("{sheet}!1:1")).await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    async fn append_row(&self, sheet: &str, values: Vec<String>) -> anyhow::Result<()> {
        self.append(sheet, &values).await?;
        Ok(())
    }

    async fn read_all_rows(&self, sheet: &str) -> anyhow::Result<Vec<Vec<String>>> {
        Ok(self.get_range(sheet).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cells_become_text() {
        assert_eq!(cell_to_string(serde_json::json!("RM 10")), "RM 10");
        assert_eq!(cell_to_string(serde_json::json!(42)), "42");
        assert_eq!(cell_to_string(serde_json::Value::Null), "");
    }

    #[test]
    fn append_body_wraps_single_row() {
        let row = vec!["a".to_string(), "b".to_string()];
        let body = serde_json::to_value(AppendBody { values: [row.as_slice()] }).unwrap();
        assert_eq!(body, serde_json::json!({ "values": [["a", "b"]] }));
    }
}
