pub mod actor;
pub mod search;

mod domain;
pub use domain::{config, query};
