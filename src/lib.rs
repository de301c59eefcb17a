pub mod app_state;
pub mod config;
pub mod database;
pub mod events;
pub mod files;
pub mod logging;
pub mod reconcile;
pub mod stations;
pub mod stores;
pub mod upgrade;
