//! Connection-related data models.

use serde::Serialize;

/// Pool counters for one schema handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Configured upper bound on open connections.
    pub max_open: u32,
    /// Connections currently open (idle + in use).
    pub open: u32,
    pub idle: u32,
    pub in_use: u32,
    /// Connections established over the pool's lifetime.
    pub total_opened: u64,
    /// Connections closed over the pool's lifetime, for any reason
    /// (max lifetime, idle timeout, failed health check).
    pub total_closed: u64,
}

impl ConnectionStats {
    pub fn new(max_open: u32, open: u32, idle: u32, total_opened: u64) -> Self {
        let idle = idle.min(open);
        Self {
            max_open,
            open,
            idle,
            in_use: open - idle,
            total_opened,
            total_closed: total_opened.saturating_sub(open as u64),
        }
    }

    /// True when every allowed connection is checked out.
    pub fn is_saturated(&self) -> bool {
        self.in_use >= self.max_open
    }
}
