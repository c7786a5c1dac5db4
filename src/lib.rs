pub mod announcement;
pub mod api;
pub mod classifier;
pub mod config;
pub mod fetch;
pub mod infra;
pub mod monitor;
pub mod output;
pub mod record;
pub mod services;
pub mod snapshot;
pub mod summary;
