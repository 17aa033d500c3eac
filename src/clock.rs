use std::fmt;
use std::time::Duration;

use enum_map::{EnumMap, enum_map};
use instant::Instant;
use serde::{Deserialize, Serialize};

use crate::event::ClockUpdate;
use crate::force::Force;


pub const LOW_TIME_THRESHOLD: Duration = Duration::from_secs(10);

// Client-side view of the clock. The server sends the remaining time whenever something changes;
// in between, the clock of the side to move runs down locally.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ClockState {
    remaining: EnumMap<Force, Duration>,
    current_turn: Force,
    updated_at: Instant,
    running: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ClockShowing {
    pub force: Force,
    pub time_left: Duration,
    pub is_active: bool,
    pub is_low_time: bool,
}

impl ClockState {
    pub fn from_update(update: &ClockUpdate, now: Instant) -> Self {
        let to_duration = |ms: i64| Duration::from_millis(ms.max(0).unsigned_abs());
        ClockState {
            remaining: enum_map! {
                Force::White => to_duration(update.white_time_ms),
                Force::Black => to_duration(update.black_time_ms),
            },
            current_turn: update.current_turn,
            updated_at: now,
            running: true,
        }
    }

    pub fn current_turn(&self) -> Force { self.current_turn }
    pub fn is_running(&self) -> bool { self.running }

    pub fn stop(&mut self, now: Instant) {
        if self.running {
            self.remaining[self.current_turn] = self.time_left(self.current_turn, now);
            self.updated_at = now;
            self.running = false;
        }
    }

    pub fn time_left(&self, force: Force, now: Instant) -> Duration {
        let remaining = self.remaining[force];
        if self.running && force == self.current_turn {
            remaining.saturating_sub(now.duration_since(self.updated_at))
        } else {
            remaining
        }
    }

    // Side whose time has run out, if any.
    pub fn flagged(&self, now: Instant) -> Option<Force> {
        [Force::White, Force::Black]
            .into_iter()
            .find(|&force| self.time_left(force, now).is_zero())
    }

    pub fn showing_for(&self, force: Force, now: Instant) -> ClockShowing {
        let time_left = self.time_left(force, now);
        ClockShowing {
            force,
            time_left,
            is_active: self.running && force == self.current_turn,
            is_low_time: time_left < LOW_TIME_THRESHOLD,
        }
    }
}

impl fmt::Display for ClockShowing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&duration_to_mss(self.time_left))
    }
}

// Rounds down: 9.9 seconds are shown as "0:09".
pub fn duration_to_mss(d: Duration) -> String {
    let s = d.as_secs();
    format!("{}:{:02}", s / 60, s % 60)
}
