//! Query parameters and result pages for document search

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Parameters of a paged search
///
/// `filter` is passed to the engine verbatim, so it may be a filter
/// expression string or a nested array of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
  pub query: String,
  pub attributes_to_search_on: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub distinct: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub filter: Option<Value>,
  pub sort: Vec<String>,
  pub facets: Vec<String>,
  /// 1-based; 0 means [`DEFAULT_PAGE`]
  pub page: usize,
  /// 0 means [`DEFAULT_PAGE_SIZE`]
  pub page_size: usize,
}

impl QueryParams {
  pub fn new(query: impl Into<String>) -> Self {
    Self {
      query: query.into(),
      ..Default::default()
    }
  }

  pub fn with_filter(mut self, filter: impl Into<Value>) -> Self {
    self.filter = Some(filter.into());
    self
  }

  pub fn with_facets<I, S>(mut self, facets: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.facets = facets.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
    self.page = page;
    self.page_size = page_size;
    self
  }

  pub fn effective_page(&self) -> usize {
    if self.page == 0 { DEFAULT_PAGE } else { self.page }
  }

  pub fn effective_page_size(&self) -> usize {
    if self.page_size == 0 {
      DEFAULT_PAGE_SIZE
    } else {
      self.page_size
    }
  }
}

/// Facet name -> facet value -> hit count
pub type FacetCounts = BTreeMap<String, BTreeMap<String, u64>>;

/// One page of search results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPage {
  /// Total hits across all pages
  pub total: u64,
  pub hits: Vec<Value>,
  pub facets: FacetCounts,
}
