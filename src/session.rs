use std::fmt;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::force::Force;
use crate::position::Position;


#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(String);

#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self { GameId(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self { PlayerId(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}


#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum VictoryReason {
    Checkmate,
    Flag,
    Resignation,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum DrawReason {
    Stalemate,
    // Draw reported by the server for a reason the client doesn't track (e.g. agreement).
    Other,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum GameStatus {
    Active,
    Victory(Force, VictoryReason),
    Draw(DrawReason),
    // Finished according to the server, but the outcome could not be determined.
    Ended(String),
}

impl GameStatus {
    pub fn is_active(&self) -> bool { *self == GameStatus::Active }

    // Interprets the `result` / `endReason` pair of a finished game. The server is not consistent
    // here: besides "WHITE_WINS" and friends it may store the way the game ended as the result.
    pub fn from_server_result(
        result: Option<&str>, end_reason: Option<&str>, final_position: &Position,
    ) -> Self {
        let reason = end_reason.unwrap_or_default().to_ascii_lowercase();
        let victory_reason = if reason.contains("checkmate") {
            VictoryReason::Checkmate
        } else if reason.contains("time") {
            VictoryReason::Flag
        } else {
            VictoryReason::Resignation
        };
        match result.map(str::to_ascii_uppercase).as_deref() {
            Some("WHITE_WINS" | "WHITE_WIN") => GameStatus::Victory(Force::White, victory_reason),
            Some("BLACK_WINS" | "BLACK_WIN") => GameStatus::Victory(Force::Black, victory_reason),
            // The mated side is the one to move.
            Some("CHECKMATE") => GameStatus::Victory(
                final_position.active_force().opponent(),
                VictoryReason::Checkmate,
            ),
            Some("DRAW") if reason.contains("stalemate") => GameStatus::Draw(DrawReason::Stalemate),
            Some("DRAW") => GameStatus::Draw(DrawReason::Other),
            _ => GameStatus::Ended(
                end_reason.or(result).unwrap_or("unknown reason").to_owned(),
            ),
        }
    }

    // PGN result token.
    pub fn result_token(&self) -> &'static str {
        match self {
            GameStatus::Active | GameStatus::Ended(_) => "*",
            GameStatus::Victory(Force::White, _) => "1-0",
            GameStatus::Victory(Force::Black, _) => "0-1",
            GameStatus::Draw(_) => "1/2-1/2",
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::Active => write!(f, "in progress"),
            GameStatus::Victory(force, reason) => {
                let how = match reason {
                    VictoryReason::Checkmate => "by checkmate",
                    VictoryReason::Flag => "on time",
                    VictoryReason::Resignation => "by resignation",
                };
                write!(f, "{} wins {how}", force.name())
            }
            GameStatus::Draw(DrawReason::Stalemate) => write!(f, "draw by stalemate"),
            GameStatus::Draw(DrawReason::Other) => write!(f, "draw"),
            GameStatus::Ended(description) => write!(f, "game over ({description})"),
        }
    }
}


#[derive(Clone, PartialEq, Eq, Debug)]
pub enum SessionMode {
    Online,
    // The game could not be loaded from the server. Moves are played locally and never sent.
    Offline { reason: String },
}

// Everything the client knows about the game besides the moves themselves. Identity (`my_force`)
// is fixed when the session is created.
#[derive(Clone, Debug, new)]
pub struct GameSession {
    pub id: GameId,
    pub my_id: PlayerId,
    pub my_force: Force,
    #[new(value = "GameStatus::Active")]
    pub status: GameStatus,
    #[new(value = "ConnectionState::Disconnected")]
    pub connection_state: ConnectionState,
    #[new(value = "SessionMode::Online")]
    pub mode: SessionMode,
}

impl GameSession {
    pub fn is_connected(&self) -> bool { self.connection_state == ConnectionState::Connected }
    pub fn is_offline(&self) -> bool { matches!(self.mode, SessionMode::Offline { .. }) }
}
