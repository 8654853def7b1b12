//! Client for the tenant webhooks: identity lookup, paged call listing,
//! dashboard aggregates and agendas.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Webhooks;
use crate::dashboard::DashboardData;
use crate::model::{Agenda, Call, ClientCredentials};
use crate::retell::{decode_items, json_kind};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookCallsRequest {
    pub per_page: u32,
    pub page: u32,
    pub client_id: String,
    pub fecha_inicio: Option<NaiveDate>,
    pub fecha_fin: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookCallsPage {
    pub calls: Vec<Call>,
    /// Items in `llamadas`, counting the ones that failed to decode.
    pub received: usize,
    pub total_pages: Option<u32>,
    pub total_calls: Option<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DashboardRequest {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_inicio: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_fin: Option<NaiveDate>,
}

#[async_trait]
pub trait WebhookService: Send + Sync {
    async fn resolve_client(&self, email: &str) -> Result<Option<ClientCredentials>>;

    async fn list_calls_page(&self, request: &WebhookCallsRequest) -> Result<WebhookCallsPage>;

    async fn dashboard(&self, request: &DashboardRequest) -> Result<Option<DashboardData>>;

    async fn agendas(&self, client_id: &str) -> Result<Vec<Agenda>>;
}

#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: Client,
    identity_url: Url,
    calls_url: Url,
    dashboard_url: Url,
    agendas_url: Url,
}

impl WebhookClient {
    pub fn from_config(hooks: &Webhooks) -> Result<Self> {
        let parse = |raw: &str, name: &str| {
            Url::parse(raw.trim()).with_context(|| format!("invalid webhooks.{} URL", name))
        };
        let http = Client::builder()
            .user_agent("callboard/0.1")
            .no_proxy()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            identity_url: parse(&hooks.identity_url, "identity_url")?,
            calls_url: parse(&hooks.calls_url, "calls_url")?,
            dashboard_url: parse(&hooks.dashboard_url, "dashboard_url")?,
            agendas_url: parse(&hooks.agendas_url, "agendas_url")?,
        })
    }

    async fn post_json<B: Serialize + ?Sized>(&self, url: &Url, body: &B, what: &str) -> Result<Value> {
        debug!(url=%url, what, "calling webhook");
        let res = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to reach {} webhook", what))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("{} webhook error {}: {}", what, status, body));
        }
        let text = res
            .text()
            .await
            .with_context(|| format!("failed to read {} webhook response", what))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).with_context(|| format!("invalid JSON from {} webhook", what))
    }

    pub async fn resolve_client(&self, email: &str) -> Result<Option<ClientCredentials>> {
        let email = email.trim();
        if email.is_empty() {
            return Err(anyhow!("email must be non-empty"));
        }
        let value = self
            .post_json(&self.identity_url, &json!({ "email": email }), "identity")
            .await?;
        Ok(parse_identity(value))
    }

    pub async fn list_calls_page(&self, request: &WebhookCallsRequest) -> Result<WebhookCallsPage> {
        let value = self.post_json(&self.calls_url, request, "calls").await?;
        Ok(parse_calls_page(value))
    }

    pub async fn dashboard(&self, request: &DashboardRequest) -> Result<Option<DashboardData>> {
        let value = self
            .post_json(&self.dashboard_url, request, "dashboard")
            .await?;
        Ok(parse_dashboard(value))
    }

    pub async fn agendas(&self, client_id: &str) -> Result<Vec<Agenda>> {
        let value = self
            .post_json(&self.agendas_url, &json!({ "client_id": client_id }), "agendas")
            .await?;
        Ok(parse_agendas(value))
    }
}

#[async_trait]
impl WebhookService for WebhookClient {
    async fn resolve_client(&self, email: &str) -> Result<Option<ClientCredentials>> {
        WebhookClient::resolve_client(self, email).await
    }

    async fn list_calls_page(&self, request: &WebhookCallsRequest) -> Result<WebhookCallsPage> {
        WebhookClient::list_calls_page(self, request).await
    }

    async fn dashboard(&self, request: &DashboardRequest) -> Result<Option<DashboardData>> {
        WebhookClient::dashboard(self, request).await
    }

    async fn agendas(&self, client_id: &str) -> Result<Vec<Agenda>> {
        WebhookClient::agendas(self, client_id).await
    }
}

/// Webhooks wrap their payload in a one-element array more often than not.
fn unwrap_single(value: Value) -> Value {
    match value {
        Value::Array(mut items) if items.len() == 1 && items[0].is_object() => items.remove(0),
        other => other,
    }
}

/// First record carrying a usable API key wins.
pub fn parse_identity(value: Value) -> Option<ClientCredentials> {
    let candidates = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => items,
            Some(inner @ Value::Object(_)) => vec![inner],
            _ => vec![Value::Object(obj)],
        },
        other => {
            warn!(kind = json_kind(&other), "unexpected identity response shape");
            return None;
        }
    };
    decode_items::<ClientCredentials>(candidates, "client")
        .into_iter()
        .find(|c| !c.api_key.trim().is_empty())
}

pub fn parse_calls_page(value: Value) -> WebhookCallsPage {
    let Value::Object(mut obj) = unwrap_single(value) else {
        warn!("unexpected calls webhook response shape");
        return WebhookCallsPage::default();
    };
    let (calls, received) = match obj.remove("llamadas") {
        Some(Value::Array(items)) => {
            let received = items.len();
            (decode_items(items, "call"), received)
        }
        _ => (Vec::new(), 0),
    };
    WebhookCallsPage {
        calls,
        received,
        total_pages: obj
            .get("total_paginas")
            .and_then(as_u64)
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX)),
        total_calls: obj.get("total_llamadas").and_then(as_u64),
    }
}

pub fn parse_dashboard(value: Value) -> Option<DashboardData> {
    let Value::Object(mut obj) = unwrap_single(value) else {
        warn!("unexpected dashboard response shape");
        return None;
    };
    let payload = match obj.remove("dashboard_data") {
        Some(inner) => inner,
        None => Value::Object(obj),
    };
    match serde_json::from_value(payload) {
        Ok(data) => Some(data),
        Err(err) => {
            warn!(%err, "malformed dashboard payload");
            None
        }
    }
}

pub fn parse_agendas(value: Value) -> Vec<Agenda> {
    let items = match value {
        Value::Array(items) if items.iter().all(|i| i.get("agendas").is_none()) => items,
        other => match unwrap_single(other) {
            Value::Object(mut obj) => match obj.remove("agendas").or_else(|| obj.remove("data")) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            Value::Null => Vec::new(),
            other => {
                warn!(kind = json_kind(&other), "unexpected agendas response shape");
                Vec::new()
            }
        },
    };
    decode_items(items, "agenda")
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_picks_first_record_with_key() {
        let creds = parse_identity(json!([
            { "client_id": "c0", "api_key": "" },
            { "id": 3, "email": "a@b.c", "client_id": "c1", "api_key": "key_1" }
        ]))
        .unwrap();
        assert_eq!(creds.client_id, "c1");
        assert_eq!(creds.api_key, "key_1");

        let creds = parse_identity(json!({ "client_id": "c2", "api_key": "k2" })).unwrap();
        assert_eq!(creds.client_id, "c2");
        assert!(parse_identity(json!([])).is_none());
        assert!(parse_identity(Value::Null).is_none());
    }

    #[test]
    fn calls_page_reads_wrapped_object() {
        let page = parse_calls_page(json!([{
            "llamadas": [{ "call_id": "a" }, { "call_id": "b" }],
            "total_paginas": "4",
            "total_llamadas": 310
        }]));
        assert_eq!(page.calls.len(), 2);
        assert_eq!(page.received, 2);
        assert_eq!(page.total_pages, Some(4));
        assert_eq!(page.total_calls, Some(310));

        let page = parse_calls_page(json!({
            "llamadas": [{ "call_id": "a" }, { "bogus": 1 }],
            "total_paginas": 8_589_934_592u64
        }));
        assert_eq!((page.calls.len(), page.received), (1, 2));
        assert_eq!(page.total_pages, Some(u32::MAX));

        assert_eq!(parse_calls_page(json!("nope")), WebhookCallsPage::default());
    }

    #[test]
    fn dashboard_accepts_both_wrappings() {
        let wrapped = parse_dashboard(json!([{
            "dashboard_data": { "metricas_generales": { "total_llamadas": 5 } }
        }]))
        .unwrap();
        assert_eq!(wrapped.totals.total_calls, 5);

        let bare = parse_dashboard(json!({ "metricas_generales": { "total_llamadas": 7 } })).unwrap();
        assert_eq!(bare.totals.total_calls, 7);

        assert!(parse_dashboard(json!({ "llamadas_por_dia": "bad" })).is_none());

        let partial = parse_dashboard(json!({
            "metricas_generales": { "total_llamadas": 2 },
            "llamadas_por_dia": [{ "fecha": "??", "total_llamadas": 1 }, { "fecha": "2024-05-02" }]
        }))
        .unwrap();
        assert_eq!(partial.totals.total_calls, 2);
        assert_eq!(partial.daily.len(), 1);
    }

    #[test]
    fn agendas_accepts_array_or_wrapper() {
        let direct = parse_agendas(json!([{ "nombre": "Ana" }, { "nombre": "Luis" }]));
        assert_eq!(direct.len(), 2);

        let wrapped = parse_agendas(json!([{ "agendas": [{ "nombre": "Ana" }] }]));
        assert_eq!(wrapped.len(), 1);

        assert!(parse_agendas(Value::Null).is_empty());
    }

    #[test]
    fn calls_request_serializes_dates() {
        let req = WebhookCallsRequest {
            per_page: 100,
            page: 2,
            client_id: "c1".into(),
            fecha_inicio: NaiveDate::from_ymd_opt(2024, 5, 1),
            fecha_fin: None,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({ "per_page": 100, "page": 2, "client_id": "c1", "fecha_inicio": "2024-05-01", "fecha_fin": null })
        );
    }
}
