//! Coordinator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Coordinator tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Shared room name, matched case-insensitively
    #[serde(rename = "room-name", default = "default_room_name")]
    pub room_name: String,

    /// Fixed numeric room ID used when this participant creates the room
    #[serde(rename = "room-id", default = "default_room_id")]
    pub room_id: i64,

    /// Keep the room (and its anchors) alive after all peers leave
    #[serde(rename = "keep-room-alive", default = "default_keep_room_alive")]
    pub keep_room_alive: bool,

    /// Minimum serialized anchor size considered trustworthy; payloads at
    /// or below this are rejected and the anchor is re-created
    #[serde(rename = "min-trustworthy-anchor-bytes", default = "default_min_trustworthy")]
    pub min_trustworthy_anchor_bytes: u64,

    /// Name of the object anchors are attached to
    #[serde(rename = "placement-target", default = "default_placement_target")]
    pub placement_target: String,

    /// Scheduler tick interval in milliseconds
    #[serde(rename = "tick-ms", default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Mailbox buffer size
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

fn default_room_name() -> String {
    "ShareRoom".to_string()
}

fn default_room_id() -> i64 {
    74656
}

fn default_keep_room_alive() -> bool {
    true
}

fn default_min_trustworthy() -> u64 {
    // Larger payloads carry more captured surface detail
    100_000
}

fn default_placement_target() -> String {
    "PlacementObjectAnchor".to_string()
}

fn default_tick_ms() -> u64 {
    33
}

fn default_channel_buffer() -> usize {
    256
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            room_name: default_room_name(),
            room_id: default_room_id(),
            keep_room_alive: default_keep_room_alive(),
            min_trustworthy_anchor_bytes: default_min_trustworthy(),
            placement_target: default_placement_target(),
            tick_ms: default_tick_ms(),
            channel_buffer: default_channel_buffer(),
        }
    }
}

impl CoordinatorConfig {
    /// Tick interval as a Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.room_name, "ShareRoom");
        assert_eq!(config.room_id, 74656);
        assert!(config.keep_room_alive);
        assert_eq!(config.min_trustworthy_anchor_bytes, 100_000);
        assert_eq!(config.tick_ms, 33);
    }

    #[test]
    fn test_tick_interval_duration() {
        let config = CoordinatorConfig {
            tick_ms: 16,
            ..Default::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(16));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: CoordinatorConfig = serde_yaml::from_str("room-name: Atrium\n").unwrap();
        assert_eq!(config.room_name, "Atrium");
        assert_eq!(config.room_id, 74656);
        assert_eq!(config.min_trustworthy_anchor_bytes, 100_000);
    }
}
