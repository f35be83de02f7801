//! Search and lookup commands

use anyhow::{Context, Result};
use searchlane::{config::Config, query::QueryParams};
use serde_json::Value;

use super::{Target, open_index};

/// Short one-line rendering of a hit
fn summarize(hit: &Value, max_len: usize) -> String {
  let text = serde_json::to_string(hit).unwrap_or_default();
  if text.chars().count() <= max_len {
    return text;
  }
  let cut: String = text.chars().take(max_len).collect();
  format!("{}...", cut)
}

/// Search an index
pub async fn cmd_search(config: &Config, target: Target, params: QueryParams, json_output: bool) -> Result<()> {
  let (registry, index) = open_index(config, &target).await?;
  let result = index.documents().search(&params).await;
  registry.shutdown().await;
  let page = result.context("Search failed")?;

  if json_output {
    println!("{}", serde_json::to_string_pretty(&page)?);
    return Ok(());
  }

  if page.hits.is_empty() {
    println!("No results for '{}' in '{}'", params.query, target.index);
    return Ok(());
  }

  println!(
    "Page {} of '{}' ({} total hits)\n",
    params.effective_page(),
    target.index,
    page.total
  );
  for (i, hit) in page.hits.iter().enumerate() {
    let rank = (params.effective_page() - 1) * params.effective_page_size() + i + 1;
    println!("{:>4}. {}", rank, summarize(hit, 120));
  }

  if !page.facets.is_empty() {
    println!("\nFacets:");
    for (facet, counts) in &page.facets {
      println!("  {}:", facet);
      for (value, count) in counts {
        println!("    {:<24} {}", value, count);
      }
    }
  }

  Ok(())
}

/// Fetch one document by primary key
pub async fn cmd_get(config: &Config, target: Target, id: &str) -> Result<()> {
  let (registry, index) = open_index(config, &target).await?;
  let result = index.documents().get::<Value>(id).await;
  registry.shutdown().await;

  match result.context("Failed to fetch document")? {
    Some(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
    None => println!("No document '{}' in '{}'", id, target.index),
  }
  Ok(())
}
