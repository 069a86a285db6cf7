pub mod admin_db;
pub mod analytics;
pub mod health;
pub mod track;
