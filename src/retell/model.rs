use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{Call, FilterCriteria};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Descending,
    Ascending,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ListCallsRequest {
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination_key: Option<String>,
    pub sort_order: SortOrder,
    pub filter_criteria: FilterCriteria,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListCallsResponse {
    pub calls: Vec<Call>,
    pub pagination_key: Option<String>,
    /// Items in the response, counting the ones that failed to decode.
    pub received: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchTaskInput {
    pub to_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retell_llm_dynamic_variables: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateBatchCallRequest {
    pub from_number: String,
    pub tasks: Vec<BatchTaskInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreatePhoneCallRequest {
    pub from_number: String,
    pub to_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retell_llm_dynamic_variables: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CreatedBatchCall {
    #[serde(default)]
    pub batch_call_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CreatedPhoneCall {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub call_status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
