pub mod admin;
pub mod config;
pub mod credentials;
pub mod cursor;
pub mod db;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod migrations;
pub mod positivity;
pub mod rate_limit;
pub mod server;
pub mod validation;
