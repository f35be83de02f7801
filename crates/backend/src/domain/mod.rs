//! Domain types - configuration and query shapes
//!
//! These types are independent of the HTTP wire format; the search module
//! translates them into engine requests.

pub mod config;
pub mod query;
