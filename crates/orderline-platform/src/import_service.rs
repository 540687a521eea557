//! Client for the CSV parsing service. The service takes an uploaded file and
//! answers with one order payload per row.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use orderline_core::{ImportSource, NewOrderJob};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    success: bool,
    #[serde(default)]
    data: Vec<NewOrderJob>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
pub struct ImportServiceClient {
    client: reqwest::Client,
    parse_url: String,
}

impl ImportServiceClient {
    pub fn new(base_url: &str) -> Result<Self, ImportServiceError> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            parse_url: format!("{}/parse", base_url.trim_end_matches('/')),
        })
    }

    async fn upload(&self, file_name: String, bytes: Vec<u8>) -> Result<Vec<NewOrderJob>, ImportServiceError> {
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("text/csv")?;
        let form = Form::new().part("file", part);

        let response = self.client.post(&self.parse_url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ImportServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ParseResponse = response
            .json()
            .await
            .map_err(|err| ImportServiceError::Parse(err.to_string()))?;
        if !body.success {
            return Err(ImportServiceError::Parse(
                body.error.unwrap_or_else(|| "import service rejected the file".to_string()),
            ));
        }

        Ok(body.data)
    }
}

#[async_trait]
impl ImportSource for ImportServiceClient {
    async fn parse_file(&self, path: &Path) -> anyhow::Result<Vec<NewOrderJob>> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "import.csv".to_string());

        Ok(self.upload(file_name, bytes).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_accepts_rows() {
        let body: ParseResponse = serde_json::from_value(serde_json::json!({
            "success": true,
            "data": [{
                "customer": { "name": "Ali", "phone_number": "0123456789" },
                "address": { "line1": "1 Jalan Ampang", "city": "Kuala Lumpur", "postcode": "50450" },
                "items": [{ "product_name": "Kopi", "quantity": 2 }]
            }]
        }))
        .unwrap();

        assert!(body.success);
        assert_eq!(body.data.len(), 1);
        assert_eq!(body.data[0].address.country, "Malaysia");
        assert_eq!(body.data[0].source, "api");
    }
}
