//! API client for communicating with the Docker Monitor dashboard API

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the dashboard API
pub struct ApiClient {
    client: Client,
    base_url: Url,
    credentials: Option<(String, String)>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, user: Option<String>, password: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = normalize_base(base_url)?;
        let credentials = user.map(|u| (u, password.unwrap_or_default()));

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    /// Make a GET request with query parameters
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let mut url = self.base_url.join(path).context("Invalid path")?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }

        let mut request = self.client.get(url);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await.context("Failed to send request")?;

        match response.status() {
            status if status.is_success() => {
                response.json().await.context("Failed to parse response")
            }
            StatusCode::UNAUTHORIZED => {
                anyhow::bail!("Authentication required: pass --user/--password or set DMON_USER/DMON_PASSWORD")
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorResponse>(&body)
                    .map(|e| e.error)
                    .unwrap_or(body);
                anyhow::bail!("API error ({}): {}", status, message);
            }
        }
    }
}

/// Parse the API URL so that relative joins keep any path prefix, e.g. a
/// reverse proxy mounting the dashboard at `/monitor`
fn normalize_base(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url).context("Invalid API URL")?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStats {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub restart_count: u64,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    #[serde(default)]
    pub mem_usage: u64,
    #[serde(default)]
    pub mem_limit: u64,
    #[serde(default)]
    pub net_rx: u64,
    #[serde(default)]
    pub net_tx: u64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskStats {
    pub mount: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub pct: f64,
}

/// Host sample; every field is optional because `/api/current` returns an
/// empty object before the first cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostStats {
    pub cpu_temp: Option<f64>,
    pub gpu_temp: Option<f64>,
    pub disk: Vec<DiskStats>,
    pub load_avg: [f64; 3],
    pub timestamp: Option<String>,
}

/// Docker disk usage totals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageStats {
    pub image_count: u64,
    pub image_size: u64,
    pub cache_size: u64,
    pub volume_count: u64,
    pub volume_size: u64,
    pub container_rw_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
    pub value: f64,
    pub timestamp: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Current {
    pub containers: Vec<ContainerStats>,
    #[serde(default)]
    pub host: HostStats,
    #[serde(default)]
    pub images: Option<ImageStats>,
    pub anomalies: Vec<Alert>,
    pub ts: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    pub status: String,
    pub last_cycle: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_get_sends_basic_auth_and_query() {
        let mut server = mockito::Server::new_async().await;
        // admin:secret
        let mock = server
            .mock("GET", "/api/alerts")
            .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
            .match_query(Matcher::UrlEncoded("hours".into(), "12".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"type":"cpu_high","target":"web","value":95.0,"timestamp":"2024-01-01T00:00:00Z","message":"Container web CPU 95.0% (>80.0% x3)"}]"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(
            &server.url(),
            Some("admin".to_string()),
            Some("secret".to_string()),
        )
        .unwrap();
        let alerts: Vec<Alert> = client
            .get("api/alerts", &[("hours", "12".to_string())])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, "cpu_high");
    }

    #[tokio::test]
    async fn test_current_skeleton_parses() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/current")
            .with_status(200)
            .with_body(r#"{"containers":[],"host":{},"images":null,"anomalies":[],"ts":null}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), None, None).unwrap();
        let current: Current = client.get("api/current", &[]).await.unwrap();

        assert!(current.containers.is_empty());
        assert!(current.host.cpu_temp.is_none());
        assert!(current.images.is_none());
        assert!(current.ts.is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_hint() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/current")
            .with_status(401)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), None, None).unwrap();
        let err = client.get::<Current>("api/current", &[]).await.unwrap_err();

        assert!(err.to_string().contains("--user"));
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/history/host")
            .match_query(Matcher::Any)
            .with_status(422)
            .with_body(r#"{"error":"hours must be between 0.1 and 168"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), None, None).unwrap();
        let err = client
            .get::<Vec<HostStats>>("api/history/host", &[("hours", "500".to_string())])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("hours must be between"));
    }

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let base = normalize_base("http://proxy.local/monitor").unwrap();
        assert_eq!(
            base.join("api/current").unwrap().as_str(),
            "http://proxy.local/monitor/api/current"
        );

        let base = normalize_base("http://proxy.local/monitor/").unwrap();
        assert_eq!(base.as_str(), "http://proxy.local/monitor/");

        let base = normalize_base("http://localhost:8080").unwrap();
        assert_eq!(
            base.join("api/health").unwrap().as_str(),
            "http://localhost:8080/api/health"
        );
    }

    #[tokio::test]
    async fn test_requests_go_under_path_prefix() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/monitor/api/health")
            .with_status(200)
            .with_body(r#"{"status":"ok","last_cycle":null}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&format!("{}/monitor", server.url()), None, None).unwrap();
        let health: ApiHealth = client.get("api/health", &[]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(health.status, "ok");
    }
}
