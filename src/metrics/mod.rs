//! Metrics Module
//! 
//! Prometheus counters for tunnel connections and relay sessions.

pub mod collector;

pub use collector::Metrics;
