pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod poller;
pub mod query;
pub mod source;
pub mod state;
pub mod stats;
pub mod types;
