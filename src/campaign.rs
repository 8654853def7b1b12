//! Builds batch-call campaigns from a recipients CSV.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::retell::{BatchTaskInput, CreateBatchCallRequest};

static PHONE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)phone|tel[eé]fono|m[oó]vil|celular|n[uú]mero").unwrap());
static PHONE_HEADER_EXACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(phone|tel[eé]fono|m[oó]vil|celular|n[uú]mero)$").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CampaignError {
    #[error("the recipients file is empty")]
    EmptyFile,
    #[error("no phone number column found in the header")]
    NoPhoneColumn,
    #[error("phone column {0} is out of range")]
    PhoneColumnOutOfRange(usize),
    #[error("no valid phone numbers found in the file")]
    NoRecipients,
    #[error("a from number is required")]
    MissingFromNumber,
    #[error("could not read the recipients file: {0}")]
    Malformed(String),
}

/// A parsed recipients file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipients {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Recipients {
    /// Comma-separated with standard quoting. The first non-blank record is
    /// the header; rows may be ragged.
    pub fn parse(content: &str) -> Result<Self, CampaignError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| CampaignError::Malformed(err.to_string()))?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        let mut records = records.into_iter();
        let headers = records.next().ok_or(CampaignError::EmptyFile)?;
        Ok(Self {
            headers,
            rows: records.collect(),
        })
    }

    pub fn detect_phone_column(&self) -> Option<usize> {
        self.headers.iter().position(|h| PHONE_HEADER.is_match(h))
    }

    /// Non-empty headers that become per-recipient dynamic variables.
    pub fn variable_columns(&self, phone_column: usize) -> Vec<(usize, &str)> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(i, h)| *i != phone_column && !h.is_empty() && !PHONE_HEADER_EXACT.is_match(h))
            .map(|(i, h)| (i, h.as_str()))
            .collect()
    }

    pub fn tasks(&self, phone_column: Option<usize>) -> Result<Vec<BatchTaskInput>, CampaignError> {
        let phone_column = match phone_column {
            Some(i) if i >= self.headers.len() => return Err(CampaignError::PhoneColumnOutOfRange(i)),
            Some(i) => i,
            None => self.detect_phone_column().ok_or(CampaignError::NoPhoneColumn)?,
        };
        let variables = self.variable_columns(phone_column);

        let tasks: Vec<_> = self
            .rows
            .iter()
            .filter_map(|row| {
                let number = row.get(phone_column).map(|n| n.trim()).filter(|n| !n.is_empty())?;
                let to_number = if number.starts_with('+') {
                    number.to_string()
                } else {
                    format!("+{}", number)
                };
                let vars: Map<String, Value> = variables
                    .iter()
                    .filter_map(|(i, name)| {
                        row.get(*i)
                            .map(|v| (name.to_string(), Value::String(v.clone())))
                    })
                    .collect();
                Some(BatchTaskInput {
                    to_number,
                    retell_llm_dynamic_variables: (!vars.is_empty()).then_some(vars),
                })
            })
            .collect();

        if tasks.is_empty() {
            return Err(CampaignError::NoRecipients);
        }
        Ok(tasks)
    }
}

/// Assembles the create request; a blank name is left out.
pub fn build_batch_request(
    from_number: &str,
    name: Option<&str>,
    csv: &str,
    phone_column: Option<usize>,
) -> Result<CreateBatchCallRequest, CampaignError> {
    let from_number = from_number.trim();
    if from_number.is_empty() {
        return Err(CampaignError::MissingFromNumber);
    }
    let tasks = Recipients::parse(csv)?.tasks(phone_column)?;
    Ok(CreateBatchCallRequest {
        from_number: from_number.to_string(),
        tasks,
        name: name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string),
    })
}
