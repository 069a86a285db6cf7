pub mod backend;
pub mod catalog;
pub mod filter;
pub mod guard;
pub mod ident;
pub mod queries;
pub mod reader;
pub mod schema;
pub mod sort;

pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `kompass_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
