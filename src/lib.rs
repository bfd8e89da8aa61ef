pub mod agents;
pub mod chain;
pub mod config;
pub mod drp;
pub mod errors;
pub mod journal;
pub mod logger;
pub mod metrics;
pub mod notifications;
pub mod orchestrator;
pub mod paths;
pub mod tx_engine;
