//! Index - one configured index and its document pool

use tracing::{debug, info};

use super::{
  client::SearchClient,
  documents::Documents,
  error::SearchError,
  types::{IndexStats, Task},
};
use crate::domain::config::{IndexConfig, PoolConfig};

const INDEX_ALREADY_EXISTS: &str = "index_already_exists";

pub struct Index {
  config: IndexConfig,
  api: SearchClient,
  documents: Documents,
}

impl Index {
  /// Prepare the index on the engine and start its document pool
  ///
  /// With `create_index` set the index is created first; an index that
  /// already exists is not an error. With `update_fields` set, non-empty
  /// `filterable_fields` are pushed to the engine.
  pub async fn open(api: SearchClient, config: IndexConfig, pool: &PoolConfig) -> Result<Self, SearchError> {
    if config.name.is_empty() {
      return Err(SearchError::InvalidParameter("index name is empty"));
    }

    if config.create_index {
      let created = match api.create_index(&config.name, &config.primary_key).await {
        Ok(info) => api.wait_for_task(info.task_uid).await.map(|_| ()),
        Err(e) => Err(e),
      };
      match created {
        Ok(()) => info!(index = %config.name, primary_key = %config.primary_key, "Index created"),
        Err(e) if e.code() == Some(INDEX_ALREADY_EXISTS) => {
          debug!(index = %config.name, "Index already exists");
        }
        Err(e) => return Err(e),
      }
    }

    if config.update_fields && !config.filterable_fields.is_empty() {
      let info = api
        .update_filterable_attributes(&config.name, &config.filterable_fields)
        .await?;
      api.wait_for_task(info.task_uid).await?;
      debug!(index = %config.name, fields = ?config.filterable_fields, "Filterable attributes updated");
    }

    let documents = Documents::new(api.clone(), &config.name, &config.primary_key, pool)?;
    Ok(Self { config, api, documents })
  }

  pub fn name(&self) -> &str {
    &self.config.name
  }

  pub fn config(&self) -> &IndexConfig {
    &self.config
  }

  pub fn documents(&self) -> &Documents {
    &self.documents
  }

  pub async fn stats(&self) -> Result<IndexStats, SearchError> {
    self.api.stats(&self.config.name).await
  }

  pub async fn update_filterable_attributes(&self, fields: &[String]) -> Result<Task, SearchError> {
    if fields.is_empty() {
      return Err(SearchError::InvalidParameter("filterable fields are empty"));
    }
    let info = self.api.update_filterable_attributes(&self.config.name, fields).await?;
    self.api.wait_for_task(info.task_uid).await
  }

  /// Change the primary key; later writes through this index use the new key
  pub async fn update_primary_key(&self, key: &str) -> Result<Task, SearchError> {
    if key.is_empty() {
      return Err(SearchError::InvalidParameter("primary key is empty"));
    }
    let info = self.api.update_primary_key(&self.config.name, key).await?;
    let task = self.api.wait_for_task(info.task_uid).await?;
    self.documents.set_primary_key(key);
    Ok(task)
  }

  pub async fn shutdown(&self) {
    self.documents.shutdown().await;
  }
}
