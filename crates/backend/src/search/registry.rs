//! Registry - host clients keyed by tag
//!
//! The registry is an ordinary value owned by the caller; create one per
//! process (or per test) and share it with `Arc` where needed.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, warn};

use super::{error::SearchError, host::HostClient};
use crate::domain::config::{ClientConfig, Config, PoolConfig, TaskConfig};

#[derive(Default)]
pub struct Registry {
  clients: DashMap<String, Arc<HostClient>>,
  pool: PoolConfig,
  tasks: TaskConfig,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Empty registry whose clients use the given pool and task settings
  pub fn with_settings(pool: PoolConfig, tasks: TaskConfig) -> Self {
    Self {
      clients: DashMap::new(),
      pool,
      tasks,
    }
  }

  /// Registry with every client from `config` connected
  pub async fn from_config(config: &Config) -> Result<Self, SearchError> {
    let registry = Self::with_settings(config.pool.clone(), config.tasks.clone());
    for client in &config.clients {
      if let Err(e) = registry.add_client(client.clone()).await {
        registry.shutdown().await;
        return Err(e);
      }
    }
    Ok(registry)
  }

  /// Connect a host and register it under its tag
  pub async fn add_client(&self, config: ClientConfig) -> Result<Arc<HostClient>, SearchError> {
    if self.clients.contains_key(&config.tag) {
      return Err(SearchError::ClientExists(config.tag));
    }

    let client = Arc::new(HostClient::connect(config, &self.pool, self.tasks.clone()).await?);
    let tag = client.tag().to_string();
    let raced = match self.clients.entry(tag.clone()) {
      Entry::Occupied(_) => true,
      Entry::Vacant(slot) => {
        slot.insert(client.clone());
        false
      }
    };
    if raced {
      warn!(tag = %tag, "Client registered concurrently; discarding duplicate");
      client.shutdown().await;
      return Err(SearchError::ClientExists(tag));
    }

    debug!(tag = %tag, "Client registered");
    Ok(client)
  }

  pub fn client(&self, tag: &str) -> Result<Arc<HostClient>, SearchError> {
    self
      .clients
      .get(tag)
      .map(|entry| entry.value().clone())
      .ok_or_else(|| SearchError::UnknownClient(tag.to_string()))
  }

  /// Unregister a client and drain its indexes
  pub async fn remove_client(&self, tag: &str) -> Result<(), SearchError> {
    let (_, client) = self
      .clients
      .remove(tag)
      .ok_or_else(|| SearchError::UnknownClient(tag.to_string()))?;
    client.shutdown().await;
    Ok(())
  }

  pub fn tags(&self) -> Vec<String> {
    let mut tags: Vec<String> = self.clients.iter().map(|entry| entry.key().clone()).collect();
    tags.sort();
    tags
  }

  pub async fn shutdown(&self) {
    let clients: Vec<Arc<HostClient>> = self.clients.iter().map(|entry| entry.value().clone()).collect();
    self.clients.clear();
    futures::future::join_all(clients.iter().map(|client| client.shutdown())).await;
  }
}
