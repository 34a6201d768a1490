//! HTTP client for the engine REST API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};
use url::Url;

use crate::error::ClientError;
use crate::external_task::{
    BpmnErrorRequest, CompleteRequest, ExtendLockRequest, ExternalTask, ExternalTaskService,
    FailureRequest, FetchAndLock, LockedExternalTask,
};

/// Default REST endpoint of a local engine
pub const DEFAULT_ENDPOINT_URL: &str = "http://localhost:8080/engine-rest";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("CamundaClientRust/", env!("CARGO_PKG_VERSION"));

/// Client configuration
///
/// The timeout applies to whole requests, so it must stay above the
/// long-polling timeout used for fetch-and-lock.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the REST API
    pub endpoint_url: String,

    /// User agent header
    pub user_agent: String,

    /// Request timeout
    #[serde(with = "duration_millis")]
    pub timeout: Duration,

    /// Basic auth user
    pub api_user: Option<String>,

    /// Basic auth password
    pub api_password: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            api_user: None,
            api_password: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given endpoint
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            ..Default::default()
        }
    }

    /// Set basic auth credentials
    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.api_user = Some(user.into());
        self.api_password = Some(password.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .field("api_user", &self.api_user)
            .field("api_password", &self.api_password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Client for the engine REST API
///
/// Cheap to clone; clones share the connection pool.
///
/// # Example
///
/// ```ignore
/// use camunda_client::{Client, ClientConfig};
///
/// let client = Client::new(
///     ClientConfig::new("http://localhost:8080/engine-rest").with_auth("demo", "demo"),
/// )?;
/// let tasks = client.external_task().fetch_and_lock(&query).await?;
/// ```
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    endpoint_url: String,
    api_user: Option<String>,
    api_password: Option<String>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint_url", &self.endpoint_url)
            .field("api_user", &self.api_user)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a new client
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            endpoint_url: config.endpoint_url.trim_end_matches('/').to_string(),
            api_user: config.api_user,
            api_password: config.api_password,
        })
    }

    /// External task resource
    pub fn external_task(&self) -> ExternalTaskClient {
        ExternalTaskClient {
            client: self.clone(),
        }
    }

    /// Base URL of the REST API
    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Append `segments` to the endpoint, percent-encoding each one
    fn build_url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.endpoint_url)?;
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<Response, ClientError> {
        let url = self.build_url(segments)?;
        trace!(%method, %url, "Sending engine request");

        let mut request = self.http.request(method, url);
        if let Some(user) = &self.api_user {
            request = request.basic_auth(user, self.api_password.as_ref());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        check_response(response).await
    }

    async fn send_json<B, T>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(method, segments, body).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_empty<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<(), ClientError> {
        self.send(method, segments, body).await?;
        Ok(())
    }
}

/// Error body returned by the engine
#[derive(Debug, Deserialize)]
struct EngineErrorBody {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

/// Map non-2xx responses to errors
async fn check_response(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);

    if is_json {
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::not_found());
        }

        let bytes = response.bytes().await?;
        return match serde_json::from_slice::<EngineErrorBody>(&bytes) {
            Ok(body) => Err(ClientError::engine(body.error_type, body.message)),
            Err(e) => Err(ClientError::Status {
                status: status.as_u16(),
                body: format!("failed unmarshal error response: {e}"),
            }),
        };
    }

    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Client for the `/external-task` resource
#[derive(Debug, Clone)]
pub struct ExternalTaskClient {
    client: Client,
}

impl ExternalTaskClient {
    /// Get an external task by id
    #[instrument(skip(self))]
    pub async fn get(&self, task_id: &str) -> Result<ExternalTask, ClientError> {
        self.client
            .send_json::<(), _>(Method::GET, &["external-task", task_id], None)
            .await
    }

    /// Set the priority of a task
    #[instrument(skip(self))]
    pub async fn set_priority(&self, task_id: &str, priority: i64) -> Result<(), ClientError> {
        self.client
            .send_empty(
                Method::PUT,
                &["external-task", task_id, "priority"],
                Some(&serde_json::json!({ "priority": priority })),
            )
            .await
    }

    /// Set the number of retries left; 0 creates an incident
    #[instrument(skip(self))]
    pub async fn set_retries(&self, task_id: &str, retries: u32) -> Result<(), ClientError> {
        self.client
            .send_empty(
                Method::PUT,
                &["external-task", task_id, "retries"],
                Some(&serde_json::json!({ "retries": retries })),
            )
            .await
    }
}

#[async_trait]
impl ExternalTaskService for ExternalTaskClient {
    #[instrument(skip(self, query), fields(worker_id = %query.worker_id))]
    async fn fetch_and_lock(
        &self,
        query: &FetchAndLock,
    ) -> Result<Vec<LockedExternalTask>, ClientError> {
        let tasks: Vec<LockedExternalTask> = self
            .client
            .send_json(Method::POST, &["external-task", "fetchAndLock"], Some(query))
            .await?;
        debug!(count = tasks.len(), "Fetched external tasks");
        Ok(tasks)
    }

    #[instrument(skip(self, request))]
    async fn complete(&self, task_id: &str, request: &CompleteRequest) -> Result<(), ClientError> {
        self.client
            .send_empty(
                Method::POST,
                &["external-task", task_id, "complete"],
                Some(request),
            )
            .await
    }

    #[instrument(skip(self, request))]
    async fn handle_failure(
        &self,
        task_id: &str,
        request: &FailureRequest,
    ) -> Result<(), ClientError> {
        self.client
            .send_empty(
                Method::POST,
                &["external-task", task_id, "failure"],
                Some(request),
            )
            .await
    }

    #[instrument(skip(self, request))]
    async fn handle_bpmn_error(
        &self,
        task_id: &str,
        request: &BpmnErrorRequest,
    ) -> Result<(), ClientError> {
        self.client
            .send_empty(
                Method::POST,
                &["external-task", task_id, "bpmnError"],
                Some(request),
            )
            .await
    }

    #[instrument(skip(self, request))]
    async fn extend_lock(
        &self,
        task_id: &str,
        request: &ExtendLockRequest,
    ) -> Result<(), ClientError> {
        self.client
            .send_empty(
                Method::POST,
                &["external-task", task_id, "extendLock"],
                Some(request),
            )
            .await
    }

    #[instrument(skip(self))]
    async fn unlock(&self, task_id: &str) -> Result<(), ClientError> {
        self.client
            .send_empty::<()>(Method::POST, &["external-task", task_id, "unlock"], None)
            .await
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
