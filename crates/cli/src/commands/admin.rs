//! Administrative commands (stats, config)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use searchlane::config::{CONFIG_ENV, Config};

use super::{Target, open_index};

/// Show index statistics
pub async fn cmd_stats(config: &Config, target: Target) -> Result<()> {
  let (registry, index) = open_index(config, &target).await?;
  let lanes = index.documents().worker_count();
  let result = index.stats().await;
  registry.shutdown().await;
  let stats = result.context("Failed to get index stats")?;

  println!("Index '{}'", target.index);
  println!("==========={}\n", "=".repeat(target.index.len()));
  println!("Documents:      {}", stats.number_of_documents);
  println!("Indexing:       {}", if stats.is_indexing { "yes" } else { "no" });
  println!("Write lanes:    {}", lanes);

  if !stats.field_distribution.is_empty() {
    println!("\n--- Fields ---");
    for (field, count) in &stats.field_distribution {
      println!("{:<16}{}", field, count);
    }
  }

  Ok(())
}

/// Where the effective config came from
fn config_source(explicit: Option<&Path>) -> Option<PathBuf> {
  if let Some(path) = explicit {
    return Some(path.to_path_buf());
  }
  if let Ok(path) = std::env::var(CONFIG_ENV)
    && !path.is_empty()
  {
    return Some(PathBuf::from(path));
  }
  Config::user_config_path().filter(|path| path.exists())
}

/// Show the effective configuration
pub fn cmd_config_show(config: &Config, explicit: Option<&Path>) -> Result<()> {
  match config_source(explicit) {
    Some(path) => println!("# Loaded from {}", path.display()),
    None => println!("# No config file found; showing defaults"),
  }
  println!();

  let rendered = toml::to_string_pretty(config).context("Failed to render config")?;
  print!("{}", rendered);
  Ok(())
}

/// Write the config template to `output` or the user config path
pub fn cmd_config_init(output: Option<PathBuf>, force: bool) -> Result<()> {
  let path = match output {
    Some(path) => path,
    None => Config::user_config_path().context("Could not determine config directory")?,
  };

  if path.exists() && !force {
    bail!("Config file already exists: {} (use --force to overwrite)", path.display());
  }

  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
  }

  std::fs::write(&path, Config::generate_template())
    .with_context(|| format!("Failed to write {}", path.display()))?;

  println!("Created config: {}", path.display());
  println!("Edit [[clients]] to point at your search host.");
  Ok(())
}
