//! Pre-aggregated dashboard payload and the light client-side helpers run
//! over it. All totals come from the dashboard webhook as-is.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DashboardData {
    #[serde(rename = "metricas_generales", default)]
    pub totals: GeneralMetrics,
    #[serde(rename = "llamadas_por_dia", default, deserialize_with = "lenient::rows")]
    pub daily: Vec<DailyRow>,
    #[serde(rename = "llamadas_por_hora", default, deserialize_with = "lenient::rows")]
    pub hourly: Vec<HourlyRow>,
    #[serde(rename = "razones_desconexion", default, deserialize_with = "lenient::rows")]
    pub disconnection_reasons: Vec<ReasonRow>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeneralMetrics {
    #[serde(rename = "total_llamadas", default, deserialize_with = "lenient::u64")]
    pub total_calls: u64,
    #[serde(rename = "llamadas_completadas", default, deserialize_with = "lenient::u64")]
    pub completed_calls: u64,
    #[serde(rename = "porcentaje_completadas", default, deserialize_with = "lenient::f64")]
    pub completed_pct: f64,
    #[serde(rename = "llamadas_fallidas", default, deserialize_with = "lenient::u64")]
    pub failed_calls: u64,
    #[serde(rename = "porcentaje_fallidas", default, deserialize_with = "lenient::f64")]
    pub failed_pct: f64,
    /// Despite the wire name the webhook reports milliseconds.
    #[serde(rename = "duracion_promedio_segundos", default, deserialize_with = "lenient::f64")]
    pub average_duration_ms: f64,
    #[serde(rename = "costo_total", default, deserialize_with = "lenient::f64")]
    pub total_cost: f64,
}

impl GeneralMetrics {
    pub fn average_duration_secs(&self) -> u64 {
        (self.average_duration_ms / 1000.0).max(0.0).floor() as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyRow {
    #[serde(rename = "fecha", deserialize_with = "lenient::date")]
    pub date: NaiveDate,
    #[serde(rename = "dia_label", default)]
    pub label: Option<String>,
    #[serde(rename = "total_llamadas", default, deserialize_with = "lenient::u64")]
    pub total_calls: u64,
    #[serde(rename = "costo_total", default, deserialize_with = "lenient::f64")]
    pub cost: f64,
}

impl DailyRow {
    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.date.format("%Y-%m-%d").to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HourlyRow {
    #[serde(rename = "hora", deserialize_with = "lenient::u64")]
    pub hour: u64,
    #[serde(rename = "hora_label", default)]
    pub label: Option<String>,
    /// Calls that lasted more than 16 seconds.
    #[serde(rename = "llamadas_mas_16_segundos", default, deserialize_with = "lenient::u64")]
    pub calls: u64,
}

impl HourlyRow {
    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("{}:00", self.hour))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasonRow {
    #[serde(rename = "razon", default = "unknown_reason")]
    pub reason: String,
    #[serde(default, deserialize_with = "lenient::u64")]
    pub total: u64,
    #[serde(rename = "porcentaje", default, deserialize_with = "lenient::f64")]
    pub percentage: f64,
}

fn unknown_reason() -> String {
    "unknown".to_string()
}

/// Window applied to the per-day rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    #[default]
    All,
    /// Today and the `n - 1` days before it. Windows reaching past the
    /// calendar's start are unbounded.
    LastDays(u32),
    /// Inclusive on both ends.
    Between(NaiveDate, NaiveDate),
}

impl Period {
    pub fn contains(&self, date: NaiveDate, today: NaiveDate) -> bool {
        match *self {
            Period::All => true,
            Period::LastDays(0) => false,
            Period::LastDays(n) => {
                let from = today.checked_sub_days(Days::new(u64::from(n) - 1));
                from.map_or(true, |from| date >= from) && date <= today
            }
            Period::Between(from, to) => date >= from && date <= to,
        }
    }
}

impl DashboardData {
    pub fn daily_in(&self, period: Period, today: NaiveDate) -> Vec<&DailyRow> {
        self.daily
            .iter()
            .filter(|row| period.contains(row.date, today))
            .collect()
    }

    pub fn top_reasons(&self, n: usize) -> &[ReasonRow] {
        let end = n.min(self.disconnection_reasons.len());
        &self.disconnection_reasons[..end]
    }

    pub fn reasons_total(&self) -> u64 {
        self.disconnection_reasons.iter().map(|r| r.total).sum()
    }
}

pub fn period_totals<'a>(rows: impl IntoIterator<Item = &'a DailyRow>) -> (u64, f64) {
    rows.into_iter()
        .fold((0, 0.0), |(calls, cost), row| (calls + row.total_calls, cost + row.cost))
}

/// Human label for the platform's disconnection reason codes.
pub fn disconnection_label(reason: &str) -> &str {
    match reason {
        "agent_hangup" => "Agent hung up",
        "user_hangup" => "User hung up",
        "dial_busy" => "Line busy",
        "dial_no_answer" => "No answer",
        "dial_failed" => "Dial failed",
        "voicemail_reached" => "Voicemail",
        "call_transfer" => "Transferred",
        "inactivity" => "Inactivity",
        "machine_detected" => "Machine detected",
        "error" => "Error",
        "unknown" => "Unknown",
        other => other,
    }
}

/// Webhook payloads come out of SQL views, so numbers may arrive as strings.
mod lenient {
    use chrono::NaiveDate;
    use serde::de::{DeserializeOwned, Deserializer, Error};
    use serde::Deserialize;
    use serde_json::Value;

    use crate::retell::decode_items;

    /// Rows that fail to decode are dropped so one bad row doesn't sink the
    /// whole payload. A null list is empty.
    pub fn rows<'de, D: Deserializer<'de>, T: DeserializeOwned>(d: D) -> Result<Vec<T>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => Ok(decode_items(items, "dashboard row")),
            other => Err(D::Error::custom(format!("expected a list, got {}", other))),
        }
    }

    fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(n.as_f64()),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("not a number: {}", s))),
            other => Err(D::Error::custom(format!("not a number: {}", other))),
        }
    }

    pub fn f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(number(d)?.unwrap_or(0.0))
    }

    pub fn u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        Ok(number(d)?.unwrap_or(0.0).max(0.0).round() as u64)
    }

    /// Accepts `YYYY-MM-DD` with an optional time suffix.
    pub fn date<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        let day = raw.get(..10).unwrap_or(&raw);
        NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|_| D::Error::custom(format!("not a date: {}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sample() -> DashboardData {
        serde_json::from_value(json!({
            "metricas_generales": {
                "total_llamadas": 120,
                "llamadas_completadas": "90",
                "porcentaje_completadas": "75.0",
                "llamadas_fallidas": 30,
                "porcentaje_fallidas": 25,
                "duracion_promedio_segundos": 95500,
                "costo_total": "12.5"
            },
            "llamadas_por_dia": [
                { "fecha": "2024-05-01", "total_llamadas": 10, "costo_total": 1.5 },
                { "fecha": "2024-05-05T00:00:00.000Z", "dia_label": "Sun 5", "total_llamadas": 20, "costo_total": "2.5" },
                { "fecha": "2024-05-07", "total_llamadas": 5, "costo_total": null }
            ],
            "llamadas_por_hora": [ { "hora": 9, "llamadas_mas_16_segundos": 4 } ],
            "razones_desconexion": [
                { "razon": "user_hangup", "total": 60, "porcentaje": 50 },
                { "razon": "dial_no_answer", "total": 40, "porcentaje": 33.3 },
                { "total": 20, "porcentaje": 16.7 }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn decodes_lenient_numbers() {
        let data = sample();
        assert_eq!(data.totals.completed_calls, 90);
        assert_eq!(data.totals.completed_pct, 75.0);
        assert_eq!(data.totals.total_cost, 12.5);
        assert_eq!(data.totals.average_duration_secs(), 95);
        assert_eq!(data.daily[1].date, d("2024-05-05"));
        assert_eq!(data.daily[2].cost, 0.0);
        assert_eq!(data.disconnection_reasons[2].reason, "unknown");
        assert_eq!(data.hourly[0].display_label(), "9:00");
    }

    #[test]
    fn last_days_window_includes_today() {
        let data = sample();
        let rows = data.daily_in(Period::LastDays(3), d("2024-05-07"));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].display_label(), "Sun 5");
        assert_eq!(period_totals(rows), (25, 2.5));
        assert!(data.daily_in(Period::LastDays(0), d("2024-05-07")).is_empty());
    }

    #[test]
    fn huge_last_days_window_is_unbounded() {
        let today = d("2024-05-07");
        let period = Period::LastDays(u32::MAX);
        assert!(period.contains(today, today));
        assert!(period.contains(d("1900-01-01"), today));
        assert!(!period.contains(d("2024-05-08"), today));
        assert_eq!(sample().daily_in(period, today).len(), 3);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let data: DashboardData = serde_json::from_value(json!({
            "metricas_generales": { "total_llamadas": 3 },
            "llamadas_por_dia": [
                { "fecha": "2024-05-01", "total_llamadas": 1 },
                { "fecha": "yesterday", "total_llamadas": 2 },
                { "total_llamadas": 9 }
            ],
            "llamadas_por_hora": null,
            "razones_desconexion": [{ "razon": "user_hangup", "total": "x" }]
        }))
        .unwrap();
        assert_eq!(data.totals.total_calls, 3);
        assert_eq!(data.daily.len(), 1);
        assert_eq!(data.daily[0].date, d("2024-05-01"));
        assert!(data.hourly.is_empty());
        assert!(data.disconnection_reasons.is_empty());
    }

    #[test]
    fn between_is_inclusive() {
        let data = sample();
        let rows = data.daily_in(Period::Between(d("2024-05-01"), d("2024-05-05")), d("2024-06-01"));
        assert_eq!(rows.len(), 2);
        assert_eq!(data.daily_in(Period::All, d("2000-01-01")).len(), 3);
    }

    #[test]
    fn top_reasons_and_total() {
        let data = sample();
        assert_eq!(data.top_reasons(2).len(), 2);
        assert_eq!(data.top_reasons(10).len(), 3);
        assert_eq!(data.reasons_total(), 120);
        assert_eq!(disconnection_label("dial_busy"), "Line busy");
        assert_eq!(disconnection_label("something_new"), "something_new");
    }
}
