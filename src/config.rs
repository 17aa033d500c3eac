use std::time::Duration;

use serde::{Deserialize, Serialize};


#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum OfflineMovePolicy {
    // Apply the move locally and submit it once the connection is back.
    #[default]
    Queue,
    // Refuse to make moves while disconnected.
    Block,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    // A pending move that has not been echoed for this long triggers a resync with the server.
    #[serde(with = "humantime_serde")]
    pub pending_move_timeout: Duration,
    pub offline_move_policy: OfflineMovePolicy,
    // Desyncs in a row before the divergence is reported as persistent.
    pub max_consecutive_desyncs: u32,
    // Whether `resume_to_live` is implied when an opponent move arrives while the cursor is live.
    // Never affects a user who is looking at an older position.
    pub follow_live_on_remote_move: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            pending_move_timeout: Duration::from_secs(10),
            offline_move_policy: OfflineMovePolicy::Queue,
            max_consecutive_desyncs: 2,
            follow_live_on_remote_move: true,
        }
    }
}

impl SyncConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, serde_yaml::Error> { serde_yaml::from_str(s) }
}
