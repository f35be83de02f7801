//! HostClient - one search host and the indexes opened on it

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use super::{client::SearchClient, error::SearchError, index::Index};
use crate::domain::config::{ClientConfig, IndexConfig, PoolConfig, TaskConfig};

pub struct HostClient {
  config: ClientConfig,
  api: SearchClient,
  pool: PoolConfig,
  indexes: DashMap<String, Arc<Index>>,
}

impl HostClient {
  /// Connect to the host and open every configured index
  pub async fn connect(config: ClientConfig, pool: &PoolConfig, tasks: TaskConfig) -> Result<Self, SearchError> {
    if config.tag.is_empty() {
      return Err(SearchError::InvalidParameter("client tag is empty"));
    }

    let api = SearchClient::from_config(&config, tasks)?;
    let client = Self {
      pool: config.pool(pool),
      api,
      indexes: DashMap::new(),
      config,
    };

    for index in client.config.indexes.clone() {
      if let Err(e) = client.create_index(index).await {
        client.shutdown().await;
        return Err(e);
      }
    }

    info!(
      tag = %client.config.tag,
      host = %client.config.host,
      indexes = client.indexes.len(),
      "Host client connected"
    );
    Ok(client)
  }

  pub fn tag(&self) -> &str {
    &self.config.tag
  }

  pub fn config(&self) -> &ClientConfig {
    &self.config
  }

  pub fn api(&self) -> &SearchClient {
    &self.api
  }

  pub fn index(&self, name: &str) -> Result<Arc<Index>, SearchError> {
    self
      .indexes
      .get(name)
      .map(|entry| entry.value().clone())
      .ok_or_else(|| SearchError::UnknownIndex(name.to_string()))
  }

  /// Open an index on this host, returning the existing one if already open
  pub async fn create_index(&self, config: IndexConfig) -> Result<Arc<Index>, SearchError> {
    if let Ok(existing) = self.index(&config.name) {
      return Ok(existing);
    }

    let name = config.name.clone();
    let index = Arc::new(Index::open(self.api.clone(), config, &self.pool).await?);

    // Another caller may have opened the same index while we were waiting.
    if let Some(existing) = self.indexes.get(&name).map(|entry| entry.value().clone()) {
      index.shutdown().await;
      return Ok(existing);
    }
    self.indexes.insert(name, index.clone());
    Ok(index)
  }

  pub fn index_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.indexes.iter().map(|entry| entry.key().clone()).collect();
    names.sort();
    names
  }

  /// Drain every index's pool and forget the indexes
  pub async fn shutdown(&self) {
    let indexes: Vec<Arc<Index>> = self.indexes.iter().map(|entry| entry.value().clone()).collect();
    self.indexes.clear();
    futures::future::join_all(indexes.iter().map(|index| index.shutdown())).await;
    info!(tag = %self.config.tag, "Host client shut down");
  }
}

impl std::fmt::Debug for HostClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("HostClient")
      .field("tag", &self.config.tag)
      .field("host", &self.api.base_url())
      .field("indexes", &self.index_names())
      .finish()
  }
}
