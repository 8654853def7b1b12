//! CSV export of the call table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::model::Call;
use crate::stats::format_duration;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown column: {0}")]
pub struct UnknownColumn(pub String);

/// Table columns in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    CallId,
    Status,
    Timestamp,
    Duration,
    DisconnectionReason,
    CallType,
    Agent,
    FromNumber,
    ToNumber,
}

impl Column {
    pub const ALL: [Column; 9] = [
        Column::CallId,
        Column::Status,
        Column::Timestamp,
        Column::Duration,
        Column::DisconnectionReason,
        Column::CallType,
        Column::Agent,
        Column::FromNumber,
        Column::ToNumber,
    ];

    pub fn default_selection() -> Vec<Column> {
        Self::ALL[..6].to_vec()
    }

    pub fn header(self) -> &'static str {
        match self {
            Column::CallId => "Call ID",
            Column::Status => "Status",
            Column::Timestamp => "Date and time",
            Column::Duration => "Duration",
            Column::DisconnectionReason => "Disconnection reason",
            Column::CallType => "Call type",
            Column::Agent => "Agent",
            Column::FromNumber => "From",
            Column::ToNumber => "To",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Column::CallId => "call_id",
            Column::Status => "status",
            Column::Timestamp => "timestamp",
            Column::Duration => "duration",
            Column::DisconnectionReason => "disconnection_reason",
            Column::CallType => "call_type",
            Column::Agent => "agent",
            Column::FromNumber => "from_number",
            Column::ToNumber => "to_number",
        }
    }

    pub fn value(self, call: &Call) -> String {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        match self {
            Column::CallId => call.call_id.clone(),
            Column::Status => call.status().unwrap_or_default().to_string(),
            Column::Timestamp => call
                .started_at()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            Column::Duration => call
                .duration_seconds()
                .map(format_duration)
                .unwrap_or_else(|| "in progress".to_string()),
            Column::DisconnectionReason => text(&call.disconnection_reason),
            Column::CallType => text(&call.call_type),
            Column::Agent => text(&call.agent_id),
            Column::FromNumber => text(&call.from_number),
            Column::ToNumber => text(&call.to_number),
        }
    }
}

impl FromStr for Column {
    type Err = UnknownColumn;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Column::ALL
            .into_iter()
            .find(|c| c.key() == wanted)
            .ok_or_else(|| UnknownColumn(s.to_string()))
    }
}

/// Puts a selection in table order and drops duplicates.
pub fn normalize_columns(selected: &[Column]) -> Vec<Column> {
    let mut cols = selected.to_vec();
    cols.sort();
    cols.dedup();
    cols
}

/// Renders exactly `calls` with exactly `columns`, one row per call.
/// Fields are quoted only when they need it.
pub fn export_csv<'a>(calls: impl IntoIterator<Item = &'a Call>, columns: &[Column]) -> Result<String> {
    let columns = normalize_columns(columns);
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(columns.iter().map(|c| c.header()))
        .context("failed to write CSV header")?;
    for call in calls {
        writer
            .write_record(columns.iter().map(|c| c.value(call)))
            .with_context(|| format!("failed to write CSV row for {}", call.call_id))?;
    }
    let bytes = writer.into_inner().context("failed to flush CSV")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("calls_{}.csv", date.format("%Y-%m-%d"))
}

pub async fn write_csv(path: &Path, contents: &str) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        let mut calls = Vec::new();
        for id in ["plain", "a,b", "say \"hi\"", "two\nlines"] {
            calls.push(Call {
                call_id: id.into(),
                ..Default::default()
            });
        }
        let csv = export_csv(&calls, &[Column::CallId]).unwrap();
        assert_eq!(
            csv,
            "Call ID\nplain\n\"a,b\"\n\"say \"\"hi\"\"\"\n\"two\nlines\"\n"
        );
    }

    #[test]
    fn columns_parse_and_order() {
        let cols: Vec<Column> = ["to-number", "call_id", "CALL_ID"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(normalize_columns(&cols), vec![Column::CallId, Column::ToNumber]);
        assert_eq!("nope".parse::<Column>(), Err(UnknownColumn("nope".into())));
        assert_eq!(Column::default_selection().len(), 6);
    }

    #[test]
    fn duration_and_timestamp_cells() {
        let call = Call {
            call_id: "c".into(),
            start_timestamp: Some(1_714_564_800_000),
            duration: Some(61_000.0),
            ..Default::default()
        };
        assert_eq!(Column::Timestamp.value(&call), "2024-05-01 12:00:00");
        assert_eq!(Column::Duration.value(&call), "1:01");
        let ongoing = Call {
            call_id: "d".into(),
            ..Default::default()
        };
        assert_eq!(Column::Duration.value(&ongoing), "in progress");
        assert_eq!(Column::Timestamp.value(&ongoing), "");
    }

    #[test]
    fn file_name_uses_date() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(export_file_name(date), "calls_2024-05-01.csv");
    }
}
