pub mod analytics;
pub mod config;
pub mod error;
pub mod event;
pub mod table;

pub use config::Config;
pub use error::QueryError;
