//! searchlane CLI - document mutations and search against a Meilisearch host

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{
  Target, WriteMode, cmd_config_init, cmd_config_show, cmd_delete, cmd_get, cmd_search, cmd_stats, cmd_write,
  load_config,
};
use logging::init_cli_logging;

#[derive(Parser)]
#[command(name = "searchlane")]
#[command(about = "Per-document ordered writes and search for Meilisearch")]
#[command(after_help = "\
QUICK START:
  searchlane config init                  # Write a config template
  searchlane add movies movies.json       # Queue documents, ordered per id
  searchlane search movies \"space\"        # Search an index

COMMON WORKFLOWS:
  searchlane delete movies 1 2 3          # Delete by id
  searchlane delete movies --filter 'year < 1990'
  searchlane stats movies                 # Document counts")]
struct Cli {
  /// Config file (default: $SEARCHLANE_CONFIG or ~/.config/searchlane/config.toml)
  #[arg(long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Host tag to use (default: first configured client)
  #[arg(long, global = true)]
  client: Option<String>,

  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `searchlane config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show the effective configuration
  Show,
  /// Write a commented config template
  Init {
    /// Where to write it (default: user config path)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },
}

#[derive(Subcommand)]
enum Commands {
  /// Add documents from a JSON file (object or array)
  Add {
    index: String,
    file: PathBuf,
    /// Field holding each document's id; used to order writes per document
    #[arg(long, default_value = "id")]
    id_field: String,
  },
  /// Partially update documents from a JSON file
  Update {
    index: String,
    file: PathBuf,
    #[arg(long, default_value = "id")]
    id_field: String,
  },
  /// Delete documents by id or by filter
  Delete {
    index: String,
    /// Document ids
    ids: Vec<String>,
    /// Filter expression, e.g. "genre = horror"
    #[arg(long, conflicts_with = "ids")]
    filter: Option<String>,
  },
  /// Search an index
  Search {
    index: String,
    /// Search query
    #[arg(default_value = "")]
    query: String,
    #[arg(long)]
    filter: Option<String>,
    /// Facet to count (repeatable)
    #[arg(long = "facet")]
    facets: Vec<String>,
    /// Sort rule such as "year:desc" (repeatable)
    #[arg(long)]
    sort: Vec<String>,
    #[arg(long, default_value = "1")]
    page: usize,
    #[arg(long, default_value = "20")]
    page_size: usize,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Fetch one document by primary key
  Get { index: String, id: String },
  /// Show index statistics
  Stats { index: String },
  /// Configuration management
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let config = load_config(cli.config.as_deref())?;
  init_cli_logging(&config.log.level);

  let target = |index: String| Target {
    client: cli.client.clone(),
    index,
  };

  match cli.command {
    Commands::Add { index, file, id_field } => {
      cmd_write(&config, target(index), &file, &id_field, WriteMode::Add).await
    }
    Commands::Update { index, file, id_field } => {
      cmd_write(&config, target(index), &file, &id_field, WriteMode::Update).await
    }
    Commands::Delete { index, ids, filter } => cmd_delete(&config, target(index), ids, filter).await,
    Commands::Search {
      index,
      query,
      filter,
      facets,
      sort,
      page,
      page_size,
      json,
    } => {
      let params = searchlane::query::QueryParams {
        query,
        filter: filter.map(Into::into),
        facets,
        sort,
        page,
        page_size,
        ..Default::default()
      };
      cmd_search(&config, target(index), params, json).await
    }
    Commands::Get { index, id } => cmd_get(&config, target(index), &id).await,
    Commands::Stats { index } => cmd_stats(&config, target(index)).await,
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show(&config, cli.config.as_deref()),
      ConfigCommand::Init { output, force } => cmd_config_init(output, force),
    },
  }
}

