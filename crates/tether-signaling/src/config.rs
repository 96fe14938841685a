//! Signaling configuration

use std::time::Duration;

use crate::dispatch::DEFAULT_QUEUE_CAPACITY;

/// Tunables shared by the server, its sessions, and their connection actors.
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Name used in logs.
    pub name: String,
    /// Connections beyond this count are refused at accept.
    pub max_sessions: usize,
    /// Keepalive probe interval. One silent interval sends a ping; a second
    /// one closes the connection.
    pub keepalive_interval: Duration,
    /// Capacity of each session's dispatch queue.
    pub dispatch_queue_capacity: usize,
    /// Capacity of each session's outbound send queue.
    pub send_queue_capacity: usize,
    /// Largest accepted signaling frame.
    pub max_frame_bytes: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            name: "tether".to_string(),
            max_sessions: 256,
            keepalive_interval: Duration::from_secs(10),
            dispatch_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            send_queue_capacity: 128,
            max_frame_bytes: tether_core::MAX_FRAME_BYTES,
        }
    }
}
