use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Call {
    pub call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<i64>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transcript_object: Vec<TranscriptEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_log_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<Latency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_analysis: Option<CallAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_cost: Option<CallCost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEntry {
    #[serde(default)]
    pub timestamp: f64,
    pub speaker: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LatencyStats {
    pub mean: Option<f64>,
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Latency {
    pub e2e: Option<LatencyStats>,
    pub llm: Option<LatencyStats>,
    pub tts: Option<LatencyStats>,
    pub s2s: Option<LatencyStats>,
    pub knowledge_base: Option<LatencyStats>,
    pub llm_websocket_network_rtt: Option<LatencyStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CallAnalysis {
    pub call_summary: Option<String>,
    pub sentiment: Option<String>,
    pub user_sentiment: Option<String>,
    pub topics: Vec<String>,
    pub call_successful: Option<bool>,
    pub in_voicemail: Option<bool>,
    pub custom_analysis_data: Option<Map<String, Value>>,
}

/// Costs as reported by the platform, in cents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CallCost {
    pub total_cost: Option<f64>,
    pub llm_cost: Option<f64>,
    pub tts_cost: Option<f64>,
}

impl Call {
    /// `call_status` takes precedence over the legacy `status` field.
    pub fn status(&self) -> Option<&str> {
        self.call_status.as_deref().or(self.status.as_deref())
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.start_timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Whole seconds, falling back from `duration` to the timestamps and then
    /// to a numeric `metadata.duration` (already in seconds).
    pub fn duration_seconds(&self) -> Option<u64> {
        if let Some(ms) = self.duration.filter(|d| *d > 0.0) {
            return Some((ms / 1000.0).floor() as u64);
        }
        if let (Some(start), Some(end)) = (self.start_timestamp, self.end_timestamp) {
            if end >= start {
                return Some(((end - start) / 1000) as u64);
            }
        }
        let meta = self.metadata.as_ref()?.get("duration")?;
        let secs = match meta {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        (secs > 0.0).then(|| secs.floor() as u64)
    }

    pub fn total_cost(&self) -> Option<f64> {
        self.call_cost.as_ref().and_then(|c| c.total_cost)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhoneNumber {
    pub phone_number: String,
    pub phone_number_pretty: Option<String>,
    pub phone_number_type: Option<String>,
    pub inbound_agent_id: Option<String>,
    pub outbound_agent_id: Option<String>,
    pub area_code: Option<u32>,
    pub nickname: Option<String>,
    pub inbound_webhook_url: Option<String>,
    pub last_modification_timestamp: Option<i64>,
}

impl PhoneNumber {
    pub fn agent_ids(&self) -> impl Iterator<Item = &str> {
        self.inbound_agent_id
            .as_deref()
            .into_iter()
            .chain(self.outbound_agent_id.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponseEngine {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub llm_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub response_engine: Option<ResponseEngine>,
    #[serde(default)]
    pub last_modification_timestamp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchCall {
    pub batch_call_id: String,
    pub name: Option<String>,
    pub from_number: Option<String>,
    pub status: Option<String>,
    pub timezone: Option<String>,
    pub send_now: Option<bool>,
    pub scheduled_timestamp: Option<i64>,
    pub total: u64,
    pub total_task_count: u64,
    pub sent: u64,
    pub picked_up: u64,
    pub completed: u64,
    pub last_sent_timestamp: Option<i64>,
    pub tasks_url: Option<String>,
}

impl BatchCall {
    fn task_count(&self) -> u64 {
        self.total_task_count.max(self.total)
    }

    /// Share of sent calls that were picked up, 0..=100.
    pub fn pickup_rate(&self) -> f64 {
        percentage(self.picked_up, self.sent)
    }

    /// Share of all tasks that completed, 0..=100.
    pub fn completion_rate(&self) -> f64 {
        percentage(self.completed, self.task_count())
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 100.0).min(100.0)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchCallTask {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub retell_llm_dynamic_variables: Option<Map<String, Value>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub start_timestamp: Option<i64>,
    #[serde(default)]
    pub end_timestamp: Option<i64>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Union of the non-null keys present across a set of tasks.
pub fn task_columns(tasks: &[BatchCallTask]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for task in tasks {
        let Ok(Value::Object(map)) = serde_json::to_value(task) else {
            continue;
        };
        for (key, value) in map {
            if !value.is_null() && !columns.contains(&key) {
                columns.push(key);
            }
        }
    }
    columns
}

/// A scheduled appointment as stored by the agenda webhook.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Agenda {
    pub id: Option<Value>,
    #[serde(rename = "nombre")]
    pub name: Option<String>,
    pub phone_number: Option<String>,
    #[serde(rename = "direccion")]
    pub address: Option<String>,
    #[serde(rename = "ciudad")]
    pub city: Option<String>,
    pub region: Option<String>,
    #[serde(rename = "codigo_postal")]
    pub postal_code: Option<String>,
    #[serde(rename = "local")]
    pub venue: Option<String>,
    #[serde(rename = "tipo_agenda")]
    pub kind: Option<String>,
    #[serde(rename = "fecha_agendamiento")]
    pub scheduled_for: Option<String>,
    pub created_at: Option<String>,
    pub call_id: Option<String>,
}

/// Tenant record returned by the identity webhook.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientCredentials {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    pub client_id: String,
    pub api_key: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TimestampRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_threshold: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_threshold: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DurationRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u64>,
}

/// Server-side filter sent with call listing requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<TimestampRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_range: Option<DurationRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnection_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_tolerates_unknown_and_missing_fields() {
        let call: Call = serde_json::from_value(json!({
            "call_id": "c1",
            "call_status": "ended",
            "brand_new_field": 42
        }))
        .unwrap();
        assert_eq!(call.call_id, "c1");
        assert_eq!(call.status(), Some("ended"));
        assert!(call.transcript_object.is_empty());
    }

    #[test]
    fn duration_falls_back_in_order() {
        let mut call = Call {
            call_id: "c".into(),
            duration: Some(125_900.0),
            start_timestamp: Some(1_000),
            end_timestamp: Some(11_000),
            ..Default::default()
        };
        assert_eq!(call.duration_seconds(), Some(125));

        call.duration = None;
        assert_eq!(call.duration_seconds(), Some(10));

        call.start_timestamp = None;
        let meta = json!({ "duration": "42" });
        call.metadata = meta.as_object().cloned();
        assert_eq!(call.duration_seconds(), Some(42));

        call.metadata = None;
        assert_eq!(call.duration_seconds(), None);
    }

    #[test]
    fn batch_rates() {
        let batch = BatchCall {
            batch_call_id: "b".into(),
            total_task_count: 10,
            sent: 8,
            picked_up: 2,
            completed: 5,
            ..Default::default()
        };
        assert_eq!(batch.pickup_rate(), 25.0);
        assert_eq!(batch.completion_rate(), 50.0);
        assert_eq!(BatchCall::default().pickup_rate(), 0.0);
    }

    #[test]
    fn agenda_uses_wire_names() {
        let agenda: Agenda = serde_json::from_value(json!({
            "id": 7,
            "nombre": "Ana",
            "ciudad": "Lisboa",
            "tipo_agenda": "visita",
            "fecha_agendamiento": "2024-05-02T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(agenda.name.as_deref(), Some("Ana"));
        assert_eq!(agenda.city.as_deref(), Some("Lisboa"));
        assert_eq!(agenda.kind.as_deref(), Some("visita"));
    }

    #[test]
    fn task_columns_is_union_of_present_keys() {
        let tasks: Vec<BatchCallTask> = serde_json::from_value(json!([
            { "phone_number": "+1", "status": "done" },
            { "phone_number": "+2", "status": "queued", "attempts": 2 }
        ]))
        .unwrap();
        let cols = task_columns(&tasks);
        assert!(cols.contains(&"phone_number".to_string()));
        assert!(cols.contains(&"attempts".to_string()));
        assert!(!cols.contains(&"call_id".to_string()));
    }

    #[test]
    fn filter_criteria_omits_empty_sections() {
        let body = serde_json::to_value(FilterCriteria::default()).unwrap();
        assert_eq!(body, json!({}));
    }
}
