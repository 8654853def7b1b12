//! Per-user state: resolved credentials, the API clients built from them and
//! the loaders whose caches live for as long as the session does.

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use reqwest::Url;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::config::{CallSource, Config};
use crate::dashboard::DashboardData;
use crate::loader::{
    CallLoader, CallPager, CallSnapshot, LoadOutcome, ResourceLoader, ResourceSnapshot, RetellPager,
    WebhookPager,
};
use crate::model::{
    Agenda, Agent, BatchCall, BatchCallTask, ClientCredentials, FilterCriteria, PhoneNumber,
    TimestampRange,
};
use crate::retell::{
    CreateBatchCallRequest, CreatePhoneCallRequest, CreatedBatchCall, CreatedPhoneCall,
    RetellClient, RetellService,
};
use crate::view::DateRange;
use crate::webhook::{DashboardRequest, WebhookClient, WebhookService};

pub const MISSING_API_KEY: &str = "API key not configured; sign in or set an API key first";
const MISSING_CLIENT_ID: &str = "tenant not resolved; sign in by email first";

/// Builds a platform client for an API key.
pub type RetellFactory = Box<dyn Fn(&str) -> Result<Arc<dyn RetellService>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    /// Only known after an email sign-in.
    pub client_id: Option<String>,
    pub email: Option<String>,
}

struct Auth {
    credentials: Credentials,
    api: Arc<dyn RetellService>,
}

pub struct Session {
    config: Config,
    hooks: Arc<dyn WebhookService>,
    retell_factory: RetellFactory,
    auth: RwLock<Option<Auth>>,
    call_window: RwLock<DateRange>,
    calls: CallLoader,
    phone_numbers: ResourceLoader<PhoneNumber>,
    batch_calls: ResourceLoader<BatchCall>,
}

impl Session {
    pub fn new(config: Config, hooks: Arc<dyn WebhookService>, retell_factory: RetellFactory) -> Self {
        let settings = config.loader_settings();
        Self {
            config,
            hooks,
            retell_factory,
            auth: RwLock::new(None),
            call_window: RwLock::new(DateRange::default()),
            calls: CallLoader::new(settings),
            phone_numbers: ResourceLoader::new("phone numbers", settings),
            batch_calls: ResourceLoader::new("batch calls", settings),
        }
    }

    /// Wires the real HTTP clients described by `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let hooks: Arc<dyn WebhookService> = Arc::new(WebhookClient::from_config(&config.webhooks)?);
        let base_url = Url::parse(config.retell.base_url.trim()).context("invalid retell.base_url")?;
        let factory: RetellFactory = Box::new(move |key: &str| {
            let client = RetellClient::with_base_url(key.to_string(), base_url.clone())?;
            Ok(Arc::new(client) as Arc<dyn RetellService>)
        });
        let session = Self::new(config, hooks, factory);
        Ok(session)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn install(&self, credentials: Credentials) -> Result<()> {
        let api = (self.retell_factory)(&credentials.api_key)?;
        let mut auth = self.auth.write().await;
        // Webhook-sourced calls are scoped by tenant, so a new client id with
        // the same key still invalidates everything cached.
        let changed = auth.as_ref().map_or(true, |a| {
            a.credentials.api_key != credentials.api_key
                || a.credentials.client_id != credentials.client_id
        });
        *auth = Some(Auth { credentials, api });
        drop(auth);
        if changed {
            self.calls.reset().await;
            self.phone_numbers.reset().await;
            self.batch_calls.reset().await;
        }
        Ok(())
    }

    /// Resolves the tenant for `email` through the identity webhook.
    #[instrument(skip_all)]
    pub async fn sign_in(&self, email: &str) -> Result<ClientCredentials> {
        let found = self
            .hooks
            .resolve_client(email)
            .await
            .context("identity lookup failed")?;
        let Some(record) = found else {
            warn!("no API key registered for this account");
            return Err(anyhow!("no API key registered for {}", email.trim()));
        };
        self.install(Credentials {
            api_key: record.api_key.clone(),
            client_id: Some(record.client_id.clone()),
            email: record.email.clone().or_else(|| Some(email.trim().to_string())),
        })
        .await?;
        info!(client_id = %record.client_id, "signed in");
        Ok(record)
    }

    /// Uses a key directly, without a tenant id.
    pub async fn set_api_key(&self, api_key: &str) -> Result<()> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(anyhow!(MISSING_API_KEY));
        }
        self.install(Credentials {
            api_key: api_key.to_string(),
            client_id: None,
            email: None,
        })
        .await
    }

    pub async fn credentials(&self) -> Option<Credentials> {
        self.auth.read().await.as_ref().map(|a| a.credentials.clone())
    }

    async fn api(&self) -> Option<Arc<dyn RetellService>> {
        self.auth.read().await.as_ref().map(|a| Arc::clone(&a.api))
    }

    async fn require_api(&self) -> Result<Arc<dyn RetellService>> {
        self.api().await.ok_or_else(|| anyhow!(MISSING_API_KEY))
    }

    async fn require_client_id(&self) -> Result<String> {
        self.credentials()
            .await
            .and_then(|c| c.client_id)
            .ok_or_else(|| anyhow!(MISSING_CLIENT_ID))
    }

    /// Restricts the call list to a date range. Changing it drops cached calls.
    pub async fn set_call_window(&self, window: DateRange) {
        let mut current = self.call_window.write().await;
        if *current != window {
            *current = window;
            drop(current);
            self.calls.reset().await;
        }
    }

    async fn call_pager(&self) -> Result<Box<dyn CallPager>, &'static str> {
        let window = *self.call_window.read().await;
        let auth = self.auth.read().await;
        let Some(auth) = auth.as_ref() else {
            return Err(MISSING_API_KEY);
        };
        match self.config.app.call_source {
            CallSource::Retell => Ok(Box::new(RetellPager::new(
                Arc::clone(&auth.api),
                window_filter(window),
            ))),
            CallSource::Webhook => {
                let client_id = auth.credentials.client_id.clone().ok_or(MISSING_CLIENT_ID)?;
                Ok(Box::new(WebhookPager::new(
                    Arc::clone(&self.hooks),
                    client_id,
                    window.from,
                    window.to,
                )))
            }
        }
    }

    pub async fn load_all_calls(&self, force: bool) -> LoadOutcome {
        match self.call_pager().await {
            Ok(pager) => self.calls.load_all(pager.as_ref(), force).await,
            Err(message) => {
                self.calls.set_error(message).await;
                LoadOutcome::MissingCredentials
            }
        }
    }

    pub async fn load_next_calls_page(&self) -> LoadOutcome {
        match self.call_pager().await {
            Ok(pager) => self.calls.load_next_page(pager.as_ref()).await,
            Err(message) => {
                self.calls.set_error(message).await;
                LoadOutcome::MissingCredentials
            }
        }
    }

    pub async fn calls(&self) -> CallSnapshot {
        self.calls.snapshot().await
    }

    pub async fn load_phone_numbers(&self, force: bool) -> LoadOutcome {
        let Some(api) = self.api().await else {
            return LoadOutcome::MissingCredentials;
        };
        self.phone_numbers
            .load(force, || async move { api.list_phone_numbers().await })
            .await
    }

    pub async fn phone_numbers(&self) -> ResourceSnapshot<PhoneNumber> {
        self.phone_numbers.snapshot().await
    }

    pub async fn load_batch_calls(&self, force: bool) -> LoadOutcome {
        let Some(api) = self.api().await else {
            return LoadOutcome::MissingCredentials;
        };
        self.batch_calls
            .load(force, || async move { api.list_batch_calls().await })
            .await
    }

    pub async fn refresh_batch_calls(&self) -> LoadOutcome {
        self.load_batch_calls(true).await
    }

    pub async fn batch_calls(&self) -> ResourceSnapshot<BatchCall> {
        self.batch_calls.snapshot().await
    }

    /// Loads phone numbers and batch calls side by side.
    pub async fn warm_up(&self) -> (LoadOutcome, LoadOutcome) {
        futures::join!(self.load_phone_numbers(false), self.load_batch_calls(false))
    }

    #[instrument(skip_all)]
    pub async fn dashboard(&self, range: DateRange) -> Result<Option<DashboardData>> {
        let client_id = self.require_client_id().await?;
        self.hooks
            .dashboard(&DashboardRequest {
                client_id,
                fecha_inicio: range.from,
                fecha_fin: range.to,
            })
            .await
    }

    pub async fn agendas(&self) -> Result<Vec<Agenda>> {
        let client_id = self.require_client_id().await?;
        self.hooks.agendas(&client_id).await
    }

    pub async fn agents(&self) -> Result<Vec<Agent>> {
        self.require_api().await?.list_agents().await
    }

    /// Tasks of a campaign, looked up through its `tasks_url`.
    pub async fn batch_call_tasks(&self, batch_call_id: &str) -> Result<Vec<BatchCallTask>> {
        let api = self.require_api().await?;
        self.load_batch_calls(false).await;
        let batches = self.batch_calls.items().await;
        let batch = batches
            .iter()
            .find(|b| b.batch_call_id == batch_call_id)
            .ok_or_else(|| anyhow!("batch call {} not found", batch_call_id))?;
        let tasks_url = batch
            .tasks_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow!("batch call {} has no task listing yet", batch_call_id))?;
        api.list_batch_call_tasks(tasks_url).await
    }

    pub async fn create_batch_call(&self, request: &CreateBatchCallRequest) -> Result<CreatedBatchCall> {
        let created = self.require_api().await?.create_batch_call(request).await?;
        info!(batch_call_id = ?created.batch_call_id, tasks = request.tasks.len(), "batch call created");
        self.refresh_batch_calls().await;
        Ok(created)
    }

    pub async fn delete_batch_call(&self, batch_call_id: &str) -> Result<()> {
        self.require_api().await?.delete_batch_call(batch_call_id).await?;
        info!(batch_call_id, "batch call deleted");
        self.refresh_batch_calls().await;
        Ok(())
    }

    pub async fn create_phone_call(&self, request: &CreatePhoneCallRequest) -> Result<CreatedPhoneCall> {
        self.require_api().await?.create_phone_call(request).await
    }
}

/// Server-side start-time filter covering whole UTC days.
fn window_filter(window: DateRange) -> FilterCriteria {
    let millis = |date: NaiveDate, time: NaiveTime| date.and_time(time).and_utc().timestamp_millis();
    if window.is_open() {
        return FilterCriteria::default();
    }
    let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    FilterCriteria {
        start_timestamp: Some(TimestampRange {
            lower_threshold: window.from.map(|d| millis(d, NaiveTime::MIN)),
            upper_threshold: window.to.map(|d| millis(d, end_of_day)),
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_filter_covers_whole_days() {
        assert_eq!(window_filter(DateRange::default()), FilterCriteria::default());
        let filter = window_filter(DateRange {
            from: NaiveDate::from_ymd_opt(2024, 5, 1),
            to: NaiveDate::from_ymd_opt(2024, 5, 1),
        });
        let range = filter.start_timestamp.unwrap();
        assert_eq!(range.lower_threshold, Some(1_714_521_600_000));
        assert_eq!(range.upper_threshold, Some(1_714_607_999_999));
    }
}
