//! Remote Query Client for the portfolio GraphQL endpoint.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::RemoteError;
use crate::model::{Category, Project, ProjectType};

use super::queries::{GraphQuery, GraphResponse, QueryParams};

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Endpoint and timeout for the remote client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
  pub url: String,
  pub timeout: Duration,
}

impl ClientOptions {
  /// HTTP transport plus a client enforcing `timeout` on top of it.
  pub fn connect(&self) -> Result<(HttpTransport, RemoteClient), RemoteError> {
    let transport = HttpTransport::new(&self.url, self.timeout)?;
    let client = RemoteClient::new(Arc::new(transport.clone())).with_timeout(self.timeout);
    Ok((transport, client))
  }
}

/// Transport that executes one GraphQL query and returns the result field.
///
/// Implementations need not enforce a timeout; `RemoteClient` does.
#[async_trait]
pub trait GraphTransport: Send + Sync {
  async fn execute(&self, query: &GraphQuery) -> Result<Value, RemoteError>;
}

/// HTTP transport (`POST` with a JSON body).
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  endpoint: url::Url,
}

impl HttpTransport {
  pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, RemoteError> {
    let endpoint = url::Url::parse(endpoint)
      .map_err(|e| RemoteError::Network(format!("invalid endpoint '{}': {}", endpoint, e)))?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .connect_timeout(timeout)
      .build()
      .map_err(|e| RemoteError::Network(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self { client, endpoint })
  }

  pub fn endpoint(&self) -> &url::Url {
    &self.endpoint
  }

  pub fn http(&self) -> &reqwest::Client {
    &self.client
  }
}

#[async_trait]
impl GraphTransport for HttpTransport {
  async fn execute(&self, query: &GraphQuery) -> Result<Value, RemoteError> {
    debug!(operation = query.operation_name(), endpoint = %self.endpoint, "graphql request");

    let response = self
      .client
      .post(self.endpoint.clone())
      .json(&query.request_body())
      .send()
      .await
      .map_err(map_reqwest_error)?;

    let status = response.status();

    // Gateways answering for a dead backend mean "unreachable", not a query failure
    if matches!(status.as_u16(), 502..=504) {
      return Err(RemoteError::Network(format!("endpoint unavailable (HTTP {})", status)));
    }

    let body = response.text().await.map_err(map_reqwest_error)?;
    let parsed: GraphResponse = match serde_json::from_str(&body) {
      Ok(parsed) => parsed,
      Err(e) if status.is_success() => {
        return Err(RemoteError::GraphQl(format!("malformed response: {}", e)));
      }
      Err(_) => return Err(RemoteError::GraphQl(format!("HTTP {}", status))),
    };

    parsed.into_field(query)
  }
}

fn map_reqwest_error(e: reqwest::Error) -> RemoteError {
  if e.is_timeout() {
    RemoteError::Timeout(0)
  } else {
    RemoteError::Network(e.to_string())
  }
}

/// Typed client over a transport, enforcing the caller's timeout.
///
/// Never writes to any cache; callers decide what to persist.
#[derive(Clone)]
pub struct RemoteClient {
  transport: Arc<dyn GraphTransport>,
  timeout: Duration,
}

impl RemoteClient {
  pub fn new(transport: Arc<dyn GraphTransport>) -> Self {
    Self {
      transport,
      timeout: DEFAULT_TIMEOUT,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  /// Fetch a category with the default timeout.
  pub async fn fetch<T: DeserializeOwned>(
    &self,
    category: Category,
    params: &QueryParams,
  ) -> Result<T, RemoteError> {
    self.fetch_with_timeout(category, params, self.timeout).await
  }

  /// Fetch a category, failing with `Timeout` once `timeout` elapses.
  pub async fn fetch_with_timeout<T: DeserializeOwned>(
    &self,
    category: Category,
    params: &QueryParams,
    timeout: Duration,
  ) -> Result<T, RemoteError> {
    let query = GraphQuery::for_category(category, params);
    let value = self.run(&query, timeout).await?;
    decode(&query, value)
  }

  /// Single project by id; `None` when the endpoint has no such project.
  pub async fn project(&self, id: u32) -> Result<Option<Project>, RemoteError> {
    let query = GraphQuery::Project(id);
    let value = self.run(&query, self.timeout).await?;
    if value.is_null() {
      return Ok(None);
    }
    decode(&query, value).map(Some)
  }

  pub async fn projects_by_type(&self, project_type: ProjectType) -> Result<Vec<Project>, RemoteError> {
    let query = GraphQuery::ProjectsByType(project_type);
    let value = self.run(&query, self.timeout).await?;
    decode(&query, value)
  }

  pub async fn all_technologies(&self) -> Result<Vec<String>, RemoteError> {
    let query = GraphQuery::AllTechnologies;
    let value = self.run(&query, self.timeout).await?;
    decode(&query, value)
  }

  async fn run(&self, query: &GraphQuery, timeout: Duration) -> Result<Value, RemoteError> {
    let timeout_ms = timeout.as_millis() as u64;
    match tokio::time::timeout(timeout, self.transport.execute(query)).await {
      Ok(Err(RemoteError::Timeout(_))) | Err(_) => {
        warn!(operation = query.operation_name(), timeout_ms, "remote query timed out");
        Err(RemoteError::Timeout(timeout_ms))
      }
      Ok(result) => result,
    }
  }
}

fn decode<T: DeserializeOwned>(query: &GraphQuery, value: Value) -> Result<T, RemoteError> {
  serde_json::from_value(value).map_err(|e| {
    RemoteError::GraphQl(format!("unexpected {} shape: {}", query.data_field(), e))
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::HomeData;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct Fixed {
    value: Result<Value, RemoteError>,
    delay: Duration,
    calls: AtomicUsize,
  }

  impl Fixed {
    fn new(value: Result<Value, RemoteError>, delay: Duration) -> Arc<Self> {
      Arc::new(Self {
        value,
        delay,
        calls: AtomicUsize::new(0),
      })
    }
  }

  #[async_trait]
  impl GraphTransport for Fixed {
    async fn execute(&self, _query: &GraphQuery) -> Result<Value, RemoteError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(self.delay).await;
      self.value.clone()
    }
  }

  #[tokio::test]
  async fn test_fetch_decodes_category() {
    let transport = Fixed::new(
      Ok(serde_json::json!({ "name": "X", "roles": ["Engineer"] })),
      Duration::ZERO,
    );
    let client = RemoteClient::new(transport.clone());

    let home: HomeData = client
      .fetch(Category::HomeStats, &QueryParams::default())
      .await
      .unwrap();
    assert_eq!(home.name, "X");
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_timeout_instead_of_hanging() {
    let transport = Fixed::new(Ok(serde_json::json!([])), Duration::from_secs(30));
    let client = RemoteClient::new(transport).with_timeout(Duration::from_millis(5000));

    let result: Result<Vec<Project>, _> = client.fetch(Category::Projects, &QueryParams::default()).await;
    assert_eq!(result, Err(RemoteError::Timeout(5000)));
  }

  #[tokio::test]
  async fn test_shape_mismatch_is_graphql_error() {
    let transport = Fixed::new(Ok(serde_json::json!({ "unexpected": true })), Duration::ZERO);
    let client = RemoteClient::new(transport);

    let result: Result<Vec<Project>, _> = client.fetch(Category::Projects, &QueryParams::default()).await;
    assert!(matches!(result, Err(RemoteError::GraphQl(_))));
  }

  #[tokio::test]
  async fn test_missing_project_is_none() {
    let transport = Fixed::new(Ok(Value::Null), Duration::ZERO);
    let client = RemoteClient::new(transport);
    assert_eq!(client.project(42).await, Ok(None));
  }

  #[tokio::test]
  async fn test_network_error_passes_through() {
    let transport = Fixed::new(Err(RemoteError::Network("refused".into())), Duration::ZERO);
    let client = RemoteClient::new(transport);
    assert_eq!(
      client.all_technologies().await,
      Err(RemoteError::Network("refused".into()))
    );
  }

  #[test]
  fn test_invalid_endpoint_rejected() {
    assert!(HttpTransport::new("not a url", DEFAULT_TIMEOUT).is_err());
  }
}
