use std::fmt::Display;

use async_trait::async_trait;
use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::invoice::{InvoiceRequest, InvoiceResponse};
use crate::time_entry::{TimeEntry, TodaySummary};

/// サーバーの全てのレスポンスを包むエンベロープ。
///
/// HTTPとしては成功していても`success`が`false`の場合がある。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
impl<T> ApiResponse<T> {
    /// 成功した`data`付きのレスポンスを返す。
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    /// `success: false`のレスポンスを返す。
    pub fn failure(error: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            message: None,
        }
    }
}

/// ヘルスチェックのレスポンス。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
}

/// 通信層のエラー。
#[derive(Debug, Error)]
pub enum ApiError {
    /// 2xx以外のステータスが返された。
    #[error("HTTP {status}: {status_text}")]
    Http {
        status: u16,
        status_text: String,
        body: String,
    },
    /// ステータスを受け取る前に失敗した、もしくはレスポンスを解釈できなかった。
    #[error("Network error: {detail}")]
    Network { detail: String },
}

impl ApiError {
    fn network(err: impl Display) -> Self {
        Self::Network {
            detail: err.to_string(),
        }
    }

    /// HTTPステータスを返す。ネットワークエラーは0。
    pub fn status(&self) -> u16 {
        match self {
            Self::Http { status, .. } => *status,
            Self::Network { .. } => 0,
        }
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

/// time tracker APIへの操作を表すtrait。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TrackerRepository: Send + Sync {
    /// タイマーを開始する。
    async fn start_timer(&self, client: &str, project: &str, description: &str) -> ApiResult<TimeEntry>;

    /// 計測中のタイマーを停止する。
    async fn stop_timer(&self) -> ApiResult<TimeEntry>;

    /// 現在のタイマーを取得する。`data`が無い場合はタイマーが存在しない。
    async fn current_timer(&self) -> ApiResult<TimeEntry>;

    /// 当日のサマリーを取得する。
    async fn today_summary(&self) -> ApiResult<TodaySummary>;

    /// time entryの一覧を取得する。
    async fn time_entries(&self) -> ApiResult<Vec<TimeEntry>>;

    /// 請求書を生成する。
    async fn generate_invoice(&self, request: &InvoiceRequest) -> ApiResult<InvoiceResponse>;

    /// ヘルスチェックを行う。
    async fn health_check(&self) -> ApiResult<HealthStatus>;
}

#[derive(Debug, Serialize)]
struct StartTimerBody<'a> {
    client: &'a str,
    project: &'a str,
    description: &'a str,
}

/// time tracker APIと通信するためのクライアント。
///
/// # Examples
///
/// ```
/// let client = ApiClient::new("http://localhost:8080");
/// let entries = client.time_entries().await?;
/// ```
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// 新しい`ApiClient`を返す。
    ///
    /// # Arguments
    ///
    /// * `base_url` - APIのベースURL。末尾の`/`は取り除く。
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, endpoint: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, endpoint))
            .header(CONTENT_TYPE, "application/json")
    }

    fn post(&self, endpoint: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, endpoint))
            .header(CONTENT_TYPE, "application/json")
    }

    /// リクエストを送信し、エンベロープをデシリアライズする。
    ///
    /// 2xx以外は`ApiError::Http`、それ以外の失敗は全て`ApiError::Network`になる。
    async fn request<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let response = builder
            .send()
            .await
            .map_err(ApiError::network)?;

        let status = response.status();
        debug!("{} {}", status.as_u16(), response.url());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        response
            .json::<ApiResponse<T>>()
            .await
            .map_err(ApiError::network)
    }
}

#[async_trait]
impl TrackerRepository for ApiClient {
    async fn start_timer(&self, client: &str, project: &str, description: &str) -> ApiResult<TimeEntry> {
        info!("Starting timer for {} / {}", client, project);
        let body = StartTimerBody {
            client,
            project,
            description,
        };
        self.request(self.post("/api/time/start").json(&body))
            .await
    }

    async fn stop_timer(&self) -> ApiResult<TimeEntry> {
        info!("Stopping timer");
        self.request(self.post("/api/time/stop"))
            .await
    }

    async fn current_timer(&self) -> ApiResult<TimeEntry> {
        self.request(self.get("/api/time/current"))
            .await
    }

    async fn today_summary(&self) -> ApiResult<TodaySummary> {
        self.request(self.get("/api/time/today"))
            .await
    }

    async fn time_entries(&self) -> ApiResult<Vec<TimeEntry>> {
        self.request(self.get("/api/time/entries"))
            .await
    }

    async fn generate_invoice(&self, request: &InvoiceRequest) -> ApiResult<InvoiceResponse> {
        info!(
            "Generating invoice for {} with {} line items",
            request.client_name,
            request.line_items.len()
        );
        self.request(self.post("/api/invoice/generate").json(request))
            .await
    }

    async fn health_check(&self) -> ApiResult<HealthStatus> {
        self.request(self.get("/api/health"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::{ApiClient, ApiError, TrackerRepository};
    use crate::invoice::{InvoiceLineItem, InvoiceRequest};

    const RUNNING_ENTRY: &str = r#"{
        "id": "1",
        "client": "Acme",
        "project": "Site",
        "description": "design",
        "start_time": "2024-01-01T09:00:00Z",
        "is_running": true
    }"#;

    #[tokio::test]
    async fn test_start_timer_sends_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/time/start")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "client": "Acme",
                "project": "Site",
                "description": ""
            })))
            .with_status(200)
            .with_body(format!(r#"{{"success": true, "data": {}}}"#, RUNNING_ENTRY))
            .create_async()
            .await;

        let client = ApiClient::new(&server.url());
        let response = client.start_timer("Acme", "Site", "").await.unwrap();

        mock.assert_async().await;
        assert!(response.success);
        let entry = response.data.unwrap();
        assert_eq!(entry.project, "Site");
        assert!(entry.is_running);
    }

    /// `data`がnullの場合はタイマー無しとして扱う。
    #[tokio::test]
    async fn test_current_timer_null_data() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/time/current")
            .with_status(200)
            .with_body(r#"{"success": true, "data": null}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url());
        let response = client.current_timer().await.unwrap();

        mock.assert_async().await;
        assert!(response.success);
        assert!(response.data.is_none());
    }

    #[tokio::test]
    async fn test_application_failure_is_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/time/stop")
            .with_status(200)
            .with_body(r#"{"success": false, "error": "No timer running"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url());
        let response = client.stop_timer().await.unwrap();

        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("No timer running"));
    }

    #[tokio::test]
    async fn test_http_error_carries_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/time/entries")
            .with_status(404)
            .with_body(r#"{"error": "Not Found"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url());
        let err = client.time_entries().await.unwrap_err();

        assert_eq!(err.status(), 404);
        assert_eq!(err.to_string(), "HTTP 404: Not Found");
        match err {
            ApiError::Http { body, .. } => assert_eq!(body, r#"{"error": "Not Found"}"#),
            ApiError::Network { .. } => panic!("expected http error"),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_is_network_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/time/today")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url());
        let err = client.today_summary().await.unwrap_err();

        assert_eq!(err.status(), 0);
        assert!(err.to_string().starts_with("Network error: "));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = ApiClient::new("http://127.0.0.1:1");
        let err = client.health_check().await.unwrap_err();

        assert!(matches!(err, ApiError::Network { .. }));
        assert_eq!(err.status(), 0);
    }

    #[tokio::test]
    async fn test_generate_invoice_posts_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/invoice/generate")
            .match_body(Matcher::PartialJson(json!({
                "client_name": "Acme",
                "client_email": "billing@acme.test",
                "line_items": [
                    {"description": "Site - design", "hours": 2.0, "rate": 60.0, "amount": 120.0}
                ],
                "date": "2024-01-31"
            })))
            .with_status(200)
            .with_body(
                r#"{"success": true, "data": {
                    "success": true,
                    "message": "Invoice generated",
                    "download_url": "/api/invoice/download/inv-1.pdf",
                    "filename": "inv-1.pdf"
                }}"#,
            )
            .create_async()
            .await;

        let request = InvoiceRequest {
            client_name: "Acme".to_string(),
            client_email: "billing@acme.test".to_string(),
            line_items: vec![InvoiceLineItem {
                description: "Site - design".to_string(),
                hours: 2.0,
                rate: 60.0,
                amount: 120.0,
            }],
            notes: None,
            date: Some("2024-01-31".to_string()),
        };
        let client = ApiClient::new(&format!("{}/", server.url()));
        let response = client.generate_invoice(&request).await.unwrap();

        mock.assert_async().await;
        let invoice = response.data.unwrap();
        assert_eq!(invoice.filename.as_deref(), Some("inv-1.pdf"));
        assert_eq!(invoice.invoice_path, None);
    }
}
