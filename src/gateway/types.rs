//! Gateway Response Types

use serde::{Deserialize, Serialize};

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub uptime_seconds: u64,
    pub active_connections: usize,
    pub active_sessions: usize,
    pub total_connections: u64,
    pub version: String,
}
