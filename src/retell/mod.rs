use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

use crate::model::{Agent, BatchCall, BatchCallTask, Call, PhoneNumber};

pub mod model;

pub use model::{
    BatchTaskInput, CreateBatchCallRequest, CreatePhoneCallRequest, CreatedBatchCall,
    CreatedPhoneCall, ListCallsRequest, ListCallsResponse, SortOrder,
};

pub const RETELL_API_BASE: &str = "https://api.retellai.com/";

#[derive(Clone)]
pub struct RetellClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for RetellClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetellClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Operations the dashboard needs from the voice platform.
#[async_trait]
pub trait RetellService: Send + Sync {
    async fn list_calls(&self, request: &ListCallsRequest) -> Result<ListCallsResponse>;

    async fn list_phone_numbers(&self) -> Result<Vec<PhoneNumber>>;

    async fn list_agents(&self) -> Result<Vec<Agent>>;

    async fn list_batch_calls(&self) -> Result<Vec<BatchCall>>;

    async fn list_batch_call_tasks(&self, tasks_url: &str) -> Result<Vec<BatchCallTask>>;

    async fn create_batch_call(&self, request: &CreateBatchCallRequest)
        -> Result<CreatedBatchCall>;

    async fn delete_batch_call(&self, batch_call_id: &str) -> Result<()>;

    async fn create_phone_call(&self, request: &CreatePhoneCallRequest)
        -> Result<CreatedPhoneCall>;
}

impl RetellClient {
    pub fn new(api_key: String) -> Result<Self> {
        let base_url = Url::parse(RETELL_API_BASE).context("invalid default Retell URL")?;
        Self::with_base_url(api_key, base_url)
    }

    pub fn with_base_url(api_key: String, base_url: Url) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(anyhow!("API key not provided"));
        }
        let http = Client::builder()
            .user_agent("callboard/0.1")
            .no_proxy()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid Retell endpoint {}", path))
    }

    fn authorized(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    pub fn build_list_calls_request(&self, request: &ListCallsRequest) -> Result<reqwest::Request> {
        let url = self.endpoint("v2/list-calls")?;
        self.authorized(Method::POST, url)
            .json(request)
            .build()
            .context("failed to build list-calls request")
    }

    /// Sends the request and returns the JSON body of a 2xx response.
    async fn execute(&self, request: reqwest::Request, what: &str) -> Result<Value> {
        debug!(url=%request.url(), method=%request.method(), "sending retell request");
        let res = self
            .http
            .execute(request)
            .await
            .with_context(|| format!("failed to reach Retell ({})", what))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("{} failed: {} {}", what, status, body));
        }
        res.json::<Value>()
            .await
            .with_context(|| format!("invalid JSON from Retell ({})", what))
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<Vec<T>> {
        let request = self
            .authorized(Method::GET, self.endpoint(path)?)
            .build()
            .with_context(|| format!("failed to build {} request", what))?;
        let value = self.execute(request, what).await?;
        Ok(parse_list(value, what))
    }

    pub async fn list_calls(&self, request: &ListCallsRequest) -> Result<ListCallsResponse> {
        let http_request = self.build_list_calls_request(request)?;
        let value = self.execute(http_request, "list calls").await?;
        Ok(parse_list_calls(value))
    }

    pub async fn list_phone_numbers(&self) -> Result<Vec<PhoneNumber>> {
        self.get_list("list-phone-numbers", "list phone numbers").await
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        self.get_list("list-agents", "list agents").await
    }

    pub async fn list_batch_calls(&self) -> Result<Vec<BatchCall>> {
        self.get_list("list-batch-call", "list batch calls").await
    }

    /// Task listings live behind a pre-signed URL, so no credentials are sent.
    pub async fn list_batch_call_tasks(&self, tasks_url: &str) -> Result<Vec<BatchCallTask>> {
        let url = Url::parse(tasks_url)
            .with_context(|| format!("invalid tasks URL {}", tasks_url))?;
        let request = self
            .http
            .get(url)
            .build()
            .context("failed to build batch tasks request")?;
        let value = self.execute(request, "list batch call tasks").await?;
        Ok(parse_list(value, "list batch call tasks"))
    }

    pub async fn create_batch_call(
        &self,
        request: &CreateBatchCallRequest,
    ) -> Result<CreatedBatchCall> {
        let http_request = self
            .authorized(Method::POST, self.endpoint("create-batch-call")?)
            .json(request)
            .build()
            .context("failed to build create-batch-call request")?;
        let value = self.execute(http_request, "create batch call").await?;
        serde_json::from_value(value).context("invalid create-batch-call response")
    }

    /// A 204 is the usual answer; any other 2xx body is ignored.
    pub async fn delete_batch_call(&self, batch_call_id: &str) -> Result<()> {
        if batch_call_id.trim().is_empty() {
            return Err(anyhow!("batch call id must be non-empty"));
        }
        let url = self.endpoint(&format!("delete-batch-call/{}", batch_call_id))?;
        let request = self
            .http
            .delete(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .build()
            .context("failed to build delete-batch-call request")?;
        debug!(url=%request.url(), "deleting batch call");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Retell (delete batch call)")?;
        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        let body = res.text().await.unwrap_or_default();
        Err(anyhow!("delete batch call failed: {} {}", status, body))
    }

    pub async fn create_phone_call(
        &self,
        request: &CreatePhoneCallRequest,
    ) -> Result<CreatedPhoneCall> {
        let http_request = self
            .authorized(Method::POST, self.endpoint("v2/create-phone-call")?)
            .json(request)
            .build()
            .context("failed to build create-phone-call request")?;
        let value = self.execute(http_request, "create phone call").await?;
        serde_json::from_value(value).context("invalid create-phone-call response")
    }
}

#[async_trait]
impl RetellService for RetellClient {
    async fn list_calls(&self, request: &ListCallsRequest) -> Result<ListCallsResponse> {
        RetellClient::list_calls(self, request).await
    }

    async fn list_phone_numbers(&self) -> Result<Vec<PhoneNumber>> {
        RetellClient::list_phone_numbers(self).await
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        RetellClient::list_agents(self).await
    }

    async fn list_batch_calls(&self) -> Result<Vec<BatchCall>> {
        RetellClient::list_batch_calls(self).await
    }

    async fn list_batch_call_tasks(&self, tasks_url: &str) -> Result<Vec<BatchCallTask>> {
        RetellClient::list_batch_call_tasks(self, tasks_url).await
    }

    async fn create_batch_call(
        &self,
        request: &CreateBatchCallRequest,
    ) -> Result<CreatedBatchCall> {
        RetellClient::create_batch_call(self, request).await
    }

    async fn delete_batch_call(&self, batch_call_id: &str) -> Result<()> {
        RetellClient::delete_batch_call(self, batch_call_id).await
    }

    async fn create_phone_call(
        &self,
        request: &CreatePhoneCallRequest,
    ) -> Result<CreatedPhoneCall> {
        RetellClient::create_phone_call(self, request).await
    }
}

/// The listing endpoint answers either with a bare array (cursor = last call
/// id) or with `{calls, pagination_key}`.
pub fn parse_list_calls(value: Value) -> ListCallsResponse {
    match value {
        Value::Array(items) => {
            let received = items.len();
            let calls: Vec<Call> = decode_items(items, "call");
            let pagination_key = calls.last().map(|c| c.call_id.clone());
            ListCallsResponse {
                calls,
                pagination_key,
                received,
            }
        }
        Value::Object(mut obj) => {
            let (calls, received) = match obj.remove("calls") {
                Some(Value::Array(items)) => {
                    let received = items.len();
                    (decode_items(items, "call"), received)
                }
                _ => (Vec::new(), 0),
            };
            let pagination_key = obj
                .get("pagination_key")
                .and_then(Value::as_str)
                .filter(|k| !k.is_empty())
                .map(str::to_string);
            ListCallsResponse {
                calls,
                pagination_key,
                received,
            }
        }
        other => {
            warn!(kind = json_kind(&other), "unexpected list-calls response shape");
            ListCallsResponse::default()
        }
    }
}

/// Anything other than an array is logged and treated as an empty listing.
pub fn parse_list<T: DeserializeOwned>(value: Value, what: &str) -> Vec<T> {
    match value {
        Value::Array(items) => decode_items(items, what),
        other => {
            warn!(what, kind = json_kind(&other), "expected a JSON array");
            Vec::new()
        }
    }
}

/// Records that fail to decode are skipped rather than failing the batch.
pub fn decode_items<T: DeserializeOwned>(items: Vec<Value>, what: &str) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<T>(item) {
            Ok(v) => out.push(v),
            Err(err) => warn!(what, %err, "skipping malformed record"),
        }
    }
    out
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
