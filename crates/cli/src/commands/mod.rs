//! CLI command implementations

mod admin;
mod documents;
mod search;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use searchlane::{
  config::{Config, IndexConfig},
  search::{Index, Registry},
};

pub use admin::{cmd_config_init, cmd_config_show, cmd_stats};
pub use documents::{WriteMode, cmd_delete, cmd_write};
pub use search::{cmd_get, cmd_search};

/// Host tag and index a command operates on
pub struct Target {
  pub client: Option<String>,
  pub index: String,
}

/// Load config from `path`, or from the default locations when absent
pub fn load_config(path: Option<&Path>) -> Result<Config> {
  match path {
    Some(path) => Config::load_from(path).with_context(|| format!("Failed to load config from {}", path.display())),
    None => Config::load().context("Failed to load config"),
  }
}

/// Connect the target's host and open only the requested index
///
/// Indexes missing from the config are opened without creating them or
/// touching their settings.
async fn open_index(config: &Config, target: &Target) -> Result<(Registry, Arc<Index>)> {
  let client = match target.client.as_deref() {
    Some(tag) => config
      .client(tag)
      .with_context(|| format!("No client tagged '{}' in config", tag))?,
    None => config
      .clients
      .first()
      .context("No clients configured; run `searchlane config init`")?,
  };

  let mut client = client.clone();
  let index = client
    .indexes
    .iter()
    .find(|index| index.name == target.index)
    .cloned()
    .unwrap_or_else(|| IndexConfig {
      create_index: false,
      update_fields: false,
      ..IndexConfig::new(target.index.as_str())
    });
  client.indexes = vec![index];
  let tag = client.tag.clone();

  let registry = Registry::with_settings(config.pool.clone(), config.tasks.clone());
  let host = registry
    .add_client(client)
    .await
    .with_context(|| format!("Failed to connect to '{}'", tag))?;
  let index = host.index(&target.index)?;

  Ok((registry, index))
}
