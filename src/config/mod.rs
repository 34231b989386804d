/// Database connection and table creation
pub mod database;

/// Promotion and fiscal service settings from config.toml
pub mod settings;
