pub mod cache;
pub mod config;
pub mod correlator;
pub mod driver;
pub mod enrich;
pub mod error;
pub mod event;
pub mod metrics_server;
pub mod queue;
pub mod retry;
pub mod sinks;
pub mod stats;
pub mod stream;
