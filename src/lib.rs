//! Unified SQL execution layer for two Databricks-backed targets: a SQL
//! warehouse driven through the statement execution API, and a Lakebase
//! (managed PostgreSQL) instance authenticated with short-lived OAuth
//! tokens. Both expose the same row/fetch/execute contract.

pub mod backend;
pub mod cache;
pub mod config;
pub mod convert;
pub mod error;
pub mod escape;
pub mod retry;
pub mod row;
pub mod token;
