//! API client for communicating with the sentinel server

use anyhow::{Context, Result};
use reqwest::{header, Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the sentinel server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Make a GET request and return the body as text with its attachment name
    pub async fn get_attachment(&self, path: &str) -> Result<Attachment> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;
        let response = check_status(response).await?;

        let filename = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_filename);
        let body = response.text().await.context("Failed to read response")?;

        Ok(Attachment { filename, body })
    }

    /// Make a POST request without a body
    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// GET a probe endpoint, whose body is meaningful for any status
    pub async fn probe<T: DeserializeOwned>(&self, path: &str) -> Result<(u16, T)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;
        let status = response.status().as_u16();
        let body = response.json().await.context("Failed to parse response")?;

        Ok((status, body))
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<StatusBody>(&body) {
        Ok(parsed) => anyhow::bail!("API error ({}): {}", status, parsed.message),
        Err(_) => anyhow::bail!("API error ({}): {}", status, body),
    }
}

/// Extract `filename` from a `Content-Disposition` header value
fn attachment_filename(disposition: &str) -> Option<String> {
    disposition
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

/// Downloaded text attachment
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: Option<String>,
    pub body: String,
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffenderCount {
    pub ip: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEntry {
    pub timestamp: String,
    pub ip_address: String,
    pub endpoint: String,
    pub method: String,
    pub response_time: f64,
    pub status_code: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub total_requests: usize,
    pub total_anomalies: usize,
    pub anomalies_percentage: f64,
    pub top_ips: Vec<OffenderCount>,
    pub recent_anomalies: Vec<AnomalyEntry>,
    pub new_alerts: Vec<String>,
    pub model_version: String,
}

/// `/api/stats` answers either a summary or a status such as `no_data`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatsReply {
    Stats(Stats),
    Status(StatusBody),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
