//! Client for the database collaborator endpoints.
//!
//! The editor never talks to the database directly. Table listing, query
//! execution, dashboard persistence and connection tests go through a small
//! JSON-over-HTTP contract, abstracted here as the [`DataSource`] trait so the
//! session can run against a fake in tests.

use crate::element::{Row, TableInfo};
use crate::error::InputError;
use crate::record::ElementRecord;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

static HOST_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9.-]+$").expect("host pattern is valid"));

/// Errors from the collaborator layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint returned a non-2xx status code.
    #[error("Server error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The endpoint answered with `success: false`.
    #[error("{0}")]
    Rejected(String),

    /// The response body did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// The collaborators the editor depends on
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, ClientError>;

    async fn execute_query(&self, query: &str) -> Result<Vec<Row>, ClientError>;

    async fn save_dashboard(
        &self,
        dashboard_name: &str,
        elements: &[ElementRecord],
    ) -> Result<(), ClientError>;

    async fn load_dashboard(&self, dashboard_name: &str) -> Result<Vec<ElementRecord>, ClientError>;

    async fn test_connection(&self, settings: &ConnectionSettings) -> Result<(), ClientError>;
}

/// Database server credentials as entered by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub host: String,
    /// Kept as typed so it can be validated with a precise message
    pub port: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl ConnectionSettings {
    /// Check the form before any network call
    pub fn validate(&self) -> Result<(), InputError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(InputError::MissingField("Host"));
        }
        if !HOST_PATTERN.is_match(host) {
            return Err(InputError::InvalidHost(host.to_string()));
        }

        self.port_number()?;

        if self.username.trim().is_empty() {
            return Err(InputError::MissingField("Username"));
        }
        Ok(())
    }

    pub fn port_number(&self) -> Result<u16, InputError> {
        let port = self.port.trim();
        if port.is_empty() {
            return Err(InputError::MissingField("Port"));
        }
        if !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InputError::InvalidPort(port.to_string()));
        }
        match port.parse::<u16>() {
            Ok(0) | Err(_) => Err(InputError::InvalidPort(port.to_string())),
            Ok(n) => Ok(n),
        }
    }
}

/// Endpoint URLs of the collaborator service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub list_tables: String,
    pub execute_query: String,
    pub dashboard: String,
    pub test_connection: String,
}

impl Endpoints {
    /// Default endpoint layout under `base_url`
    pub fn under(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            list_tables: format!("{}/list-tables.php", base),
            execute_query: format!("{}/execute-query.php", base),
            dashboard: format!("{}/dashboard.php", base),
            test_connection: format!("{}/ping-server.php", base),
        }
    }
}

// ========== Wire format ==========

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum DashboardRequest<'a> {
    Save {
        #[serde(rename = "dashboardName")]
        dashboard_name: &'a str,
        elements: &'a [ElementRecord],
    },
    Load {
        #[serde(rename = "dashboardName")]
        dashboard_name: &'a str,
    },
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListTablesResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    tables: Vec<TableInfo>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    results: Option<Vec<Row>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SavedDashboard {
    #[serde(default)]
    elements: Vec<ElementRecord>,
}

#[derive(Debug, Deserialize)]
struct LoadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    dashboard: Option<SavedDashboard>,
    #[serde(default)]
    error: Option<String>,
}

/// Turn a `{success, error}` envelope into a result
fn accepted(success: bool, error: Option<String>, fallback: &str) -> Result<(), ClientError> {
    if success {
        Ok(())
    } else {
        Err(ClientError::Rejected(
            error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| fallback.to_string()),
        ))
    }
}

/// [`DataSource`] backed by the HTTP endpoints
#[derive(Debug, Clone)]
pub struct HttpDataSource {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl HttpDataSource {
    /// Create a client with a per-request timeout
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn post<B, T>(&self, url: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        debug!(url, "POST");
        let response = self.client.post(url).json(body).send().await?;
        Self::parse_response(response).await
    }

    /// Ensure the response has a success status code
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, ClientError> {
        debug!(url = %self.endpoints.list_tables, "GET");
        let response = self.client.get(&self.endpoints.list_tables).send().await?;
        let body: ListTablesResponse = Self::parse_response(response).await?;
        accepted(body.success, body.error, "Failed to fetch tables")?;
        Ok(body.tables)
    }

    async fn execute_query(&self, query: &str) -> Result<Vec<Row>, ClientError> {
        let body: QueryResponse = self
            .post(&self.endpoints.execute_query, &QueryRequest { query })
            .await?;
        accepted(body.success, body.error, "Query failed")?;
        Ok(body.results.unwrap_or_default())
    }

    async fn save_dashboard(
        &self,
        dashboard_name: &str,
        elements: &[ElementRecord],
    ) -> Result<(), ClientError> {
        let request = DashboardRequest::Save {
            dashboard_name,
            elements,
        };
        let body: StatusResponse = self.post(&self.endpoints.dashboard, &request).await?;
        accepted(body.success, body.error, "Failed to save dashboard")
    }

    async fn load_dashboard(&self, dashboard_name: &str) -> Result<Vec<ElementRecord>, ClientError> {
        let request = DashboardRequest::Load { dashboard_name };
        let body: LoadResponse = self.post(&self.endpoints.dashboard, &request).await?;
        accepted(body.success, body.error, "Failed to load dashboard")?;
        body.dashboard
            .map(|d| d.elements)
            .ok_or_else(|| ClientError::Decode("missing dashboard".to_string()))
    }

    async fn test_connection(&self, settings: &ConnectionSettings) -> Result<(), ClientError> {
        let body: StatusResponse = self.post(&self.endpoints.test_connection, settings).await?;
        accepted(body.success, body.error, "Failed to connect to database server")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            host: "localhost".to_string(),
            port: "3306".to_string(),
            username: "root".to_string(),
            password: String::new(),
            database: None,
        }
    }

    #[test]
    fn test_endpoints_under_base() {
        let endpoints = Endpoints::under("http://localhost/kanvas/api/mysql/");
        assert_eq!(
            endpoints.list_tables,
            "http://localhost/kanvas/api/mysql/list-tables.php"
        );
        assert_eq!(
            endpoints.dashboard,
            "http://localhost/kanvas/api/mysql/dashboard.php"
        );
    }

    #[test]
    fn test_save_request_shape() {
        let request = DashboardRequest::Save {
            dashboard_name: "Sales",
            elements: &[],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"action": "save", "dashboardName": "Sales", "elements": []})
        );

        let request = DashboardRequest::Load {
            dashboard_name: "Sales",
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"action": "load", "dashboardName": "Sales"})
        );
    }

    #[test]
    fn test_query_response_parsing() {
        let body: QueryResponse = serde_json::from_value(json!({
            "success": true,
            "results": [{"id": 1, "name": "Ada"}]
        }))
        .unwrap();
        assert!(body.success);
        assert_eq!(body.results.unwrap()[0]["name"], json!("Ada"));

        let body: QueryResponse = serde_json::from_value(json!({
            "success": false,
            "error": "You have an error in your SQL syntax"
        }))
        .unwrap();
        assert_matches!(
            accepted(body.success, body.error, "Query failed"),
            Err(ClientError::Rejected(msg)) if msg.contains("SQL syntax")
        );
    }

    #[test]
    fn test_load_response_parsing() {
        let body: LoadResponse = serde_json::from_value(json!({
            "success": true,
            "dashboard": {"elements": [
                {"id": "a", "type": "text", "x": 100, "y": 100, "width": 200, "height": 150, "content": "Hi"}
            ]}
        }))
        .unwrap();
        let elements = body.dashboard.unwrap().elements;
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].content.as_deref(), Some("Hi"));
    }

    #[test]
    fn test_rejection_without_message_uses_fallback() {
        let body: StatusResponse = serde_json::from_value(json!({})).unwrap();
        assert_matches!(
            accepted(body.success, body.error, "Failed to save dashboard"),
            Err(ClientError::Rejected(msg)) if msg == "Failed to save dashboard"
        );
    }

    #[test]
    fn test_connection_settings_validation() {
        assert!(settings().validate().is_ok());

        let mut s = settings();
        s.host = "  ".to_string();
        assert_eq!(s.validate(), Err(InputError::MissingField("Host")));

        let mut s = settings();
        s.host = "db host".to_string();
        assert_matches!(s.validate(), Err(InputError::InvalidHost(_)));

        let mut s = settings();
        s.port = "33o6".to_string();
        assert_matches!(s.validate(), Err(InputError::InvalidPort(_)));

        let mut s = settings();
        s.port = "70000".to_string();
        assert_matches!(s.validate(), Err(InputError::InvalidPort(_)));

        let mut s = settings();
        s.port = "0".to_string();
        assert_matches!(s.validate(), Err(InputError::InvalidPort(_)));

        let mut s = settings();
        s.username.clear();
        assert_eq!(s.validate(), Err(InputError::MissingField("Username")));
    }

    #[test]
    fn test_connection_settings_wire_shape() {
        let value = serde_json::to_value(settings()).unwrap();
        assert_eq!(
            value,
            json!({"host": "localhost", "port": "3306", "username": "root", "password": ""})
        );
    }
}
