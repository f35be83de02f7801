//! Document mutation commands

use std::path::Path;

use anyhow::{Context, Result, bail};
use futures::future::join_all;
use searchlane::{config::Config, search::DocumentOp};
use serde_json::Value;
use tracing::{info, warn};

use super::{Target, open_index};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
  Add,
  Update,
}

/// Read a JSON file holding one document or an array of them
fn read_documents(file: &Path) -> Result<Vec<Value>> {
  let raw = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
  let value: Value = serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", file.display()))?;
  match value {
    Value::Array(docs) => Ok(docs),
    doc @ Value::Object(_) => Ok(vec![doc]),
    _ => bail!("{} must contain a JSON object or an array of objects", file.display()),
  }
}

/// Document id as a routing key; numbers are accepted alongside strings
fn document_id(doc: &Value, id_field: &str) -> Option<String> {
  match doc.get(id_field)? {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// Write every document in `file`, one engine task per document, and report failures
pub async fn cmd_write(config: &Config, target: Target, file: &Path, id_field: &str, mode: WriteMode) -> Result<()> {
  let docs = read_documents(file)?;
  if docs.is_empty() {
    println!("No documents in {}", file.display());
    return Ok(());
  }

  let (registry, index) = open_index(config, &target).await?;
  let documents = index.documents();

  let mut unkeyed = 0usize;
  let ops: Vec<(String, DocumentOp)> = docs
    .into_iter()
    .map(|doc| {
      let id = document_id(&doc, id_field);
      if id.is_none() {
        unkeyed += 1;
      }
      let documents = Value::Array(vec![doc]);
      let op = match mode {
        WriteMode::Add => DocumentOp::Add { documents },
        WriteMode::Update => DocumentOp::Update { documents },
      };
      (id.unwrap_or_default(), op)
    })
    .collect();

  if unkeyed > 0 {
    warn!(unkeyed, id_field, "Documents without an id are routed to any lane");
  }

  // Requests enter their lanes in file order, so writes to one id stay ordered
  let outcomes = join_all(
    ops
      .into_iter()
      .map(|(id, op)| async move { documents.apply(op, &id).await }),
  )
  .await;
  registry.shutdown().await;

  let total = outcomes.len();
  let mut failed = 0usize;
  for error in outcomes.iter().filter_map(|outcome| outcome.as_ref().err()) {
    failed += 1;
    warn!(error = %error, "Document write failed");
  }
  let written = total - failed;
  info!(written, failed, index = %target.index, "Write complete");

  let verb = match mode {
    WriteMode::Add => "Added",
    WriteMode::Update => "Updated",
  };
  println!("{} {} document(s) in '{}'", verb, written, target.index);
  if failed > 0 {
    bail!("{} of {} document write(s) failed", failed, total);
  }
  Ok(())
}

/// Delete documents by id, or everything matching a filter
pub async fn cmd_delete(config: &Config, target: Target, ids: Vec<String>, filter: Option<String>) -> Result<()> {
  if ids.is_empty() && filter.is_none() {
    bail!("Pass document ids or --filter");
  }

  let (registry, index) = open_index(config, &target).await?;
  let documents = index.documents();

  let result = match &filter {
    Some(filter) => documents.delete_by_filter(filter.as_str()).await,
    None => documents.delete(ids.as_slice()).await,
  };
  registry.shutdown().await;
  result.context("Failed to queue deletion")?;

  match filter {
    Some(filter) => println!("Deleted documents matching '{}' from '{}'", filter, target.index),
    None => println!("Deleted {} document(s) from '{}'", ids.len(), target.index),
  }
  Ok(())
}
