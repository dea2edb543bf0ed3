pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod store;
pub mod ws;
