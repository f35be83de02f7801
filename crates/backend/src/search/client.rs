//! HTTP client for a Meilisearch-compatible search engine
//!
//! Every mutation is accepted by the engine as an asynchronous task. The
//! client returns the [`TaskInfo`] it gets back, and [`SearchClient::wait_for_task`]
//! polls until the task reaches a terminal status.

use std::time::{Duration, Instant};

use reqwest::{
  RequestBuilder, StatusCode, Url,
  header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use super::{
  documents::DocumentOp,
  error::SearchError,
  types::{
    ApiErrorBody, CreateIndexRequest, DeleteByFilterRequest, IndexStats, SearchRequest, SearchResponse, Task,
    TaskInfo, TaskStatus, UpdateIndexRequest,
  },
};
use crate::domain::{
  config::{ClientConfig, TaskConfig},
  query::{QueryParams, SearchPage},
};

#[derive(Debug, Clone)]
pub struct SearchClient {
  client: reqwest::Client,
  base_url: Url,
  tasks: TaskConfig,
}

impl SearchClient {
  pub fn new(host: &str, api_key: Option<&str>, timeout: Duration, tasks: TaskConfig) -> Result<Self, SearchError> {
    let host = host.trim();
    if host.is_empty() {
      return Err(SearchError::InvalidParameter("host is empty"));
    }
    let base_url = Url::parse(host).map_err(|_| SearchError::InvalidParameter("host is not a valid URL"))?;
    if base_url.cannot_be_a_base() {
      return Err(SearchError::InvalidParameter("host is not a valid URL"));
    }

    let mut headers = HeaderMap::new();
    if let Some(key) = api_key.filter(|key| !key.is_empty()) {
      let value = HeaderValue::from_str(&format!("Bearer {key}"))
        .map_err(|_| SearchError::InvalidParameter("api key is not a valid header value"))?;
      headers.insert(AUTHORIZATION, value);
    }

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .default_headers(headers)
      .build()?;

    info!(
      base_url = %base_url,
      authenticated = api_key.is_some_and(|key| !key.is_empty()),
      timeout_ms = timeout.as_millis() as u64,
      "Search client initialized"
    );
    Ok(Self {
      client,
      base_url,
      tasks,
    })
  }

  pub fn from_config(config: &ClientConfig, tasks: TaskConfig) -> Result<Self, SearchError> {
    let api_key = config.resolved_api_key();
    Self::new(&config.host, api_key.as_deref(), config.timeout(), tasks)
  }

  pub fn base_url(&self) -> &str {
    self.base_url.as_str()
  }

  /// Base URL with `segments` appended, each percent-encoded as one segment
  ///
  /// Empty, `.` and `..` segments are rejected since the URL parser would
  /// drop them and address a different endpoint.
  fn endpoint(&self, segments: &[&str]) -> Result<Url, SearchError> {
    if segments.iter().any(|segment| matches!(*segment, "" | "." | "..")) {
      return Err(SearchError::InvalidParameter("path segment is empty or relative"));
    }
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| SearchError::InvalidParameter("host is not a valid URL"))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  fn index_url(&self, uid: &str, rest: &[&str]) -> Result<Url, SearchError> {
    let mut segments = vec!["indexes", uid];
    segments.extend_from_slice(rest);
    self.endpoint(&segments)
  }

  fn documents_url(&self, uid: &str, primary_key: &str) -> Result<Url, SearchError> {
    let mut url = self.index_url(uid, &["documents"])?;
    if !primary_key.is_empty() {
      url.query_pairs_mut().append_pair("primaryKey", primary_key);
    }
    Ok(url)
  }

  /// Send a request and decode a 2xx body, mapping anything else to `Api`
  async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SearchError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(api_error(status, response).await);
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
  }

  // ==========================================================================
  // Tasks
  // ==========================================================================

  pub async fn get_task(&self, uid: u64) -> Result<Task, SearchError> {
    let uid_segment = uid.to_string();
    let url = self.endpoint(&["tasks", uid_segment.as_str()])?;
    self.send(self.client.get(url)).await
  }

  /// Poll a task until it succeeds, fails or is canceled
  ///
  /// A failed or canceled task becomes [`SearchError::TaskFailed`]. Waiting
  /// longer than the configured timeout gives [`SearchError::TaskTimeout`];
  /// the task itself keeps running on the engine.
  pub async fn wait_for_task(&self, uid: u64) -> Result<Task, SearchError> {
    let started = Instant::now();
    let timeout = self.tasks.timeout();

    loop {
      let task = self.get_task(uid).await?;
      trace!(task = uid, status = ?task.status, "Polled task");

      match task.status {
        TaskStatus::Succeeded => {
          debug!(task = uid, elapsed_ms = started.elapsed().as_millis() as u64, "Task succeeded");
          return Ok(task);
        }
        TaskStatus::Failed | TaskStatus::Canceled => {
          let (code, message) = match &task.error {
            Some(error) => (error.code.clone(), error.message.clone()),
            None if task.status == TaskStatus::Canceled => ("task_canceled".to_string(), "task was canceled".to_string()),
            None => ("unknown".to_string(), "task failed without an error body".to_string()),
          };
          return Err(SearchError::TaskFailed { uid, code, message });
        }
        TaskStatus::Enqueued | TaskStatus::Processing => {}
      }

      if started.elapsed() >= timeout {
        warn!(task = uid, timeout_secs = timeout.as_secs(), "Gave up waiting for task");
        return Err(SearchError::TaskTimeout {
          uid,
          secs: timeout.as_secs(),
        });
      }
      tokio::time::sleep(self.tasks.poll_interval()).await;
    }
  }

  // ==========================================================================
  // Indexes
  // ==========================================================================

  pub async fn create_index(&self, uid: &str, primary_key: &str) -> Result<TaskInfo, SearchError> {
    let url = self.endpoint(&["indexes"])?;
    debug!(index = uid, primary_key, "Creating index");
    self
      .send(self.client.post(url).json(&CreateIndexRequest { uid, primary_key }))
      .await
  }

  pub async fn update_filterable_attributes(&self, uid: &str, fields: &[String]) -> Result<TaskInfo, SearchError> {
    let url = self.index_url(uid, &["settings", "filterable-attributes"])?;
    debug!(index = uid, fields = ?fields, "Updating filterable attributes");
    self.send(self.client.put(url).json(fields)).await
  }

  pub async fn update_primary_key(&self, uid: &str, primary_key: &str) -> Result<TaskInfo, SearchError> {
    let url = self.index_url(uid, &[])?;
    debug!(index = uid, primary_key, "Updating primary key");
    self
      .send(self.client.patch(url).json(&UpdateIndexRequest { primary_key }))
      .await
  }

  pub async fn stats(&self, uid: &str) -> Result<IndexStats, SearchError> {
    let url = self.index_url(uid, &["stats"])?;
    self.send(self.client.get(url)).await
  }

  // ==========================================================================
  // Documents
  // ==========================================================================

  pub async fn add_documents(&self, uid: &str, primary_key: &str, documents: &Value) -> Result<TaskInfo, SearchError> {
    let url = self.documents_url(uid, primary_key)?;
    self.send(self.client.post(url).json(documents)).await
  }

  pub async fn update_documents(
    &self,
    uid: &str,
    primary_key: &str,
    documents: &Value,
  ) -> Result<TaskInfo, SearchError> {
    let url = self.documents_url(uid, primary_key)?;
    self.send(self.client.put(url).json(documents)).await
  }

  pub async fn delete_documents(&self, uid: &str, ids: &[String]) -> Result<TaskInfo, SearchError> {
    let url = self.index_url(uid, &["documents", "delete-batch"])?;
    self.send(self.client.post(url).json(ids)).await
  }

  pub async fn delete_documents_by_filter(&self, uid: &str, filter: &Value) -> Result<TaskInfo, SearchError> {
    let url = self.index_url(uid, &["documents", "delete"])?;
    self
      .send(self.client.post(url).json(&DeleteByFilterRequest { filter }))
      .await
  }

  /// Fetch one document, `None` when the engine has no such id
  pub async fn get_document(&self, uid: &str, id: &str) -> Result<Option<Value>, SearchError> {
    let url = self.index_url(uid, &["documents", id])?;
    let response = self.client.get(url).send().await?;
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !status.is_success() {
      return Err(api_error(status, response).await);
    }
    let bytes = response.bytes().await?;
    Ok(Some(serde_json::from_slice(&bytes)?))
  }

  /// Run a document mutation and wait for the engine to finish it
  pub async fn apply(&self, uid: &str, primary_key: &str, op: &DocumentOp) -> Result<Task, SearchError> {
    let info = match op {
      DocumentOp::Add { documents } => self.add_documents(uid, primary_key, documents).await?,
      DocumentOp::Update { documents } => self.update_documents(uid, primary_key, documents).await?,
      DocumentOp::Delete { ids } => self.delete_documents(uid, ids).await?,
      DocumentOp::DeleteByFilter { filter } => self.delete_documents_by_filter(uid, filter).await?,
    };
    debug!(index = uid, op = op.name(), task = info.task_uid, "Document task enqueued");
    self.wait_for_task(info.task_uid).await
  }

  // ==========================================================================
  // Search
  // ==========================================================================

  pub(crate) async fn search_raw(&self, uid: &str, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
    let url = self.index_url(uid, &["search"])?;
    self.send(self.client.post(url).json(request)).await
  }

  pub async fn search(&self, uid: &str, params: &QueryParams) -> Result<SearchPage, SearchError> {
    let response = self.search_raw(uid, &SearchRequest::from(params)).await?;
    Ok(response.into())
  }
}

async fn api_error(status: StatusCode, response: reqwest::Response) -> SearchError {
  let body = response.text().await.unwrap_or_default();
  let (code, message) = match serde_json::from_str::<ApiErrorBody>(&body) {
    Ok(parsed) => (parsed.code, parsed.message),
    Err(_) => (String::new(), body),
  };
  warn!(status = status.as_u16(), code = %code, message = %message, "Search engine request failed");
  SearchError::Api {
    status: status.as_u16(),
    code,
    message,
  }
}
