//! Database layer: initialization, migrations, models, settings store

pub mod init;
pub mod migrations;
pub mod models;
pub mod settings;

pub use init::init_database;
