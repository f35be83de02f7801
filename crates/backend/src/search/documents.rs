//! Documents - mutations and queries for one index
//!
//! Mutations go through a [`Dispatcher`]: every operation for a document id
//! hashes to the same lane, so two writes to one document are applied in the
//! order they were submitted while writes to different documents proceed in
//! parallel. Each lane runs [`SearchClient::apply`], which waits for the
//! engine's task before the lane picks up its next request.
//!
//! Queries bypass the pool and call the engine directly.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use super::{
  client::SearchClient,
  error::SearchError,
  types::{SearchRequest, Task},
};
use crate::{
  actor::{DispatchError, Dispatcher, Payload, Route},
  domain::{
    config::PoolConfig,
    query::{QueryParams, SearchPage},
  },
};

// ============================================================================
// Document Operations
// ============================================================================

/// A mutation carried through the worker pool
#[derive(Debug, Clone)]
pub enum DocumentOp {
  /// Add or replace whole documents
  Add { documents: Value },
  /// Merge fields into existing documents
  Update { documents: Value },
  Delete { ids: Vec<String> },
  DeleteByFilter { filter: Value },
}

impl DocumentOp {
  pub fn name(&self) -> &'static str {
    match self {
      Self::Add { .. } => "add",
      Self::Update { .. } => "update",
      Self::Delete { .. } => "delete",
      Self::DeleteByFilter { .. } => "delete_by_filter",
    }
  }
}

impl Payload for DocumentOp {
  fn is_empty(&self) -> bool {
    match self {
      Self::Add { documents } | Self::Update { documents } => documents_empty(documents),
      Self::Delete { ids } => ids.is_empty(),
      Self::DeleteByFilter { filter } => Payload::is_empty(filter),
    }
  }
}

fn documents_empty(documents: &Value) -> bool {
  match documents {
    Value::Null => true,
    Value::Array(items) => items.is_empty(),
    Value::Object(fields) => fields.is_empty(),
    _ => false,
  }
}

// ============================================================================
// Documents
// ============================================================================

pub struct Documents {
  index: String,
  /// Shared with the lane handler so a key change reaches queued writes
  primary_key: Arc<RwLock<String>>,
  api: SearchClient,
  pool: Dispatcher<DocumentOp, Task>,
}

impl Documents {
  /// Start the worker pool for `index`
  ///
  /// Must be called from within a Tokio runtime.
  pub fn new(api: SearchClient, index: &str, primary_key: &str, pool: &PoolConfig) -> Result<Self, SearchError> {
    if index.is_empty() {
      return Err(SearchError::InvalidParameter("index name is empty"));
    }

    let dispatcher = Dispatcher::from_config(pool);
    let primary_key = Arc::new(RwLock::new(primary_key.to_string()));
    let (worker_api, uid, worker_pk) = (api.clone(), index.to_string(), primary_key.clone());
    dispatcher.set_handler(move |op: DocumentOp| {
      let (api, uid, pk) = (worker_api.clone(), uid.clone(), worker_pk.read().clone());
      async move { api.apply(&uid, &pk, &op).await }
    });
    let workers = pool.resolved_workers();
    dispatcher.create_workers(workers)?;

    info!(index, workers, "Document pool started");
    Ok(Self {
      index: index.to_string(),
      primary_key,
      api,
      pool: dispatcher,
    })
  }

  pub fn index(&self) -> &str {
    &self.index
  }

  pub fn primary_key(&self) -> String {
    self.primary_key.read().clone()
  }

  pub(crate) fn set_primary_key(&self, key: &str) {
    *self.primary_key.write() = key.to_string();
  }

  pub fn worker_count(&self) -> usize {
    self.pool.worker_count()
  }

  /// Slot a document id's mutations run on
  pub fn slot_for(&self, doc_id: &str) -> Result<u64, SearchError> {
    Ok(self.pool.resolve(&Route::hashed(doc_id))?)
  }

  // ==========================================================================
  // Mutations (fire-and-forget)
  // ==========================================================================

  /// Queue documents for insertion
  ///
  /// `doc_id` picks the lane; pass the id of the document (or of the first
  /// document of a batch) to keep its writes ordered, or `""` for any lane.
  pub async fn add(&self, documents: Value, doc_id: &str) -> Result<(), SearchError> {
    self.cast(DocumentOp::Add { documents }, Route::hashed(doc_id)).await
  }

  /// Queue a partial update
  pub async fn update(&self, documents: Value, doc_id: &str) -> Result<(), SearchError> {
    self.cast(DocumentOp::Update { documents }, Route::hashed(doc_id)).await
  }

  /// Queue deletion of documents by id
  pub async fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<(), SearchError> {
    let ids: Vec<String> = ids
      .iter()
      .map(|id| id.as_ref().to_string())
      .filter(|id| !id.is_empty())
      .collect();
    let route = match ids.as_slice() {
      [only] => Route::hashed(only.as_str()),
      _ => Route::Any,
    };
    self.cast(DocumentOp::Delete { ids }, route).await
  }

  /// Queue deletion of every document matching `filter`
  pub async fn delete_by_filter(&self, filter: impl Into<Value>) -> Result<(), SearchError> {
    self
      .cast(DocumentOp::DeleteByFilter { filter: filter.into() }, Route::Any)
      .await
  }

  /// Run a mutation on its lane and wait for the engine's final task
  pub async fn apply(&self, op: DocumentOp, doc_id: &str) -> Result<Task, SearchError> {
    if op.is_empty() {
      return Err(SearchError::InvalidParameter("document operation is empty"));
    }
    self.pool.call(op, Route::hashed(doc_id)).await.map_err(unwrap_handler_error)
  }

  async fn cast(&self, op: DocumentOp, route: Route) -> Result<(), SearchError> {
    if op.is_empty() {
      return Err(SearchError::InvalidParameter("document operation is empty"));
    }
    debug!(index = %self.index, op = op.name(), key = ?route.key(), "Queueing document operation");
    Ok(self.pool.cast(op, route).await?)
  }

  // ==========================================================================
  // Queries
  // ==========================================================================

  pub async fn search(&self, params: &QueryParams) -> Result<SearchPage, SearchError> {
    self.api.search(&self.index, params).await
  }

  /// Fetch every document whose `field` equals one of `ids`
  ///
  /// `field` must be filterable.
  pub async fn get_by_ids<S: AsRef<str>>(&self, field: &str, ids: &[S]) -> Result<Vec<Value>, SearchError> {
    if field.is_empty() {
      return Err(SearchError::InvalidParameter("field is empty"));
    }
    let filter = id_filter(field, ids.iter().map(|id| id.as_ref()));
    let count = ids.iter().filter(|id| !id.as_ref().is_empty()).count();
    if count == 0 {
      return Err(SearchError::InvalidParameter("no ids given"));
    }

    let request = SearchRequest {
      page: 1,
      hits_per_page: count,
      filter: Some(Value::String(filter)),
      ..Default::default()
    };
    Ok(self.api.search_raw(&self.index, &request).await?.hits)
  }

  /// First document whose `field` matches `value`
  pub async fn get_one_by_field<T: DeserializeOwned>(&self, field: &str, value: &str) -> Result<Option<T>, SearchError> {
    if field.is_empty() || value.is_empty() {
      return Err(SearchError::InvalidParameter("field and value are required"));
    }

    let request = SearchRequest {
      q: value.to_string(),
      page: 1,
      hits_per_page: 1,
      attributes_to_search_on: vec![field.to_string()],
      ..Default::default()
    };
    let response = self.api.search_raw(&self.index, &request).await?;
    match response.hits.into_iter().next() {
      Some(hit) => Ok(Some(serde_json::from_value(hit)?)),
      None => Ok(None),
    }
  }

  /// Fetch one document by primary key
  pub async fn get<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, SearchError> {
    if id.is_empty() {
      return Err(SearchError::InvalidParameter("document id is empty"));
    }
    match self.api.get_document(&self.index, id).await? {
      Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
      None => Ok(None),
    }
  }

  /// Drain queued mutations and stop the pool
  pub async fn shutdown(&self) {
    self.pool.shutdown().await;
    debug!(index = %self.index, "Document pool stopped");
  }
}

/// Surface the handler's own error instead of a boxed copy of it
fn unwrap_handler_error(err: DispatchError) -> SearchError {
  match err {
    DispatchError::Handler(inner) => match inner.downcast::<SearchError>() {
      Ok(search) => *search,
      Err(other) => SearchError::Dispatch(DispatchError::Handler(other)),
    },
    other => SearchError::Dispatch(other),
  }
}

/// `field = "a" OR field = "b"` over the non-empty ids
fn id_filter<'a>(field: &str, ids: impl Iterator<Item = &'a str>) -> String {
  ids
    .filter(|id| !id.is_empty())
    .map(|id| format!("{} = \"{}\"", field, id.replace('\\', "\\\\").replace('"', "\\\"")))
    .collect::<Vec<_>>()
    .join(" OR ")
}
