//! Wire types for the search engine's HTTP API

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::query::{FacetCounts, QueryParams, SearchPage};

// ============================================================================
// Tasks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
  Enqueued,
  Processing,
  Succeeded,
  Failed,
  Canceled,
}

impl TaskStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
  }
}

/// Summary returned when the engine accepts an asynchronous operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
  pub task_uid: u64,
  #[serde(default)]
  pub index_uid: Option<String>,
  pub status: TaskStatus,
  #[serde(rename = "type", default)]
  pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
  pub message: String,
  pub code: String,
  #[serde(rename = "type", default)]
  pub kind: Option<String>,
  #[serde(default)]
  pub link: Option<String>,
}

/// Full task record from `GET /tasks/{uid}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub uid: u64,
  #[serde(default)]
  pub index_uid: Option<String>,
  pub status: TaskStatus,
  #[serde(rename = "type", default)]
  pub kind: Option<String>,
  #[serde(default)]
  pub error: Option<TaskError>,
}

// ============================================================================
// Indexes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
  pub number_of_documents: u64,
  pub is_indexing: bool,
  #[serde(default)]
  pub field_distribution: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateIndexRequest<'a> {
  pub uid: &'a str,
  pub primary_key: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateIndexRequest<'a> {
  pub primary_key: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteByFilterRequest<'a> {
  pub filter: &'a Value,
}

/// Error body the engine sends with non-2xx responses
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub code: String,
}

// ============================================================================
// Search
// ============================================================================

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchRequest {
  pub q: String,
  pub page: usize,
  pub hits_per_page: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub filter: Option<Value>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub facets: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub sort: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub attributes_to_search_on: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub distinct: Option<String>,
}

impl From<&QueryParams> for SearchRequest {
  fn from(params: &QueryParams) -> Self {
    Self {
      q: params.query.clone(),
      page: params.effective_page(),
      hits_per_page: params.effective_page_size(),
      filter: params.filter.clone(),
      facets: params.facets.clone(),
      sort: params.sort.clone(),
      attributes_to_search_on: params.attributes_to_search_on.clone(),
      distinct: params.distinct.clone().filter(|d| !d.is_empty()),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchResponse {
  #[serde(default)]
  pub hits: Vec<Value>,
  #[serde(default)]
  pub total_hits: Option<u64>,
  #[serde(default)]
  pub estimated_total_hits: Option<u64>,
  #[serde(default)]
  pub facet_distribution: Option<FacetCounts>,
}

impl From<SearchResponse> for SearchPage {
  fn from(resp: SearchResponse) -> Self {
    let total = resp
      .total_hits
      .or(resp.estimated_total_hits)
      .unwrap_or(resp.hits.len() as u64);
    Self {
      total,
      hits: resp.hits,
      facets: resp.facet_distribution.unwrap_or_default(),
    }
  }
}
