// Wire payloads exchanged with the game server. Field names follow the server's camelCase JSON.

use serde::{Deserialize, Serialize};

use crate::coord::Coord;
use crate::force::Force;
use crate::piece::PieceKind;


// Published on `game/{id}/moves`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveSubmission {
    pub from: Coord,
    pub to: Coord,
    pub promotion: Option<PieceKind>,
    // Correlation id, echoed back by servers that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

// Received on `game/{id}/moves`, both for opponent moves and as the echo of our own moves.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveNotification {
    pub algebraic_notation: String,
    pub fen: String,
    #[serde(default)]
    pub is_check: bool,
    #[serde(default)]
    pub is_checkmate: bool,
    #[serde(default)]
    pub is_stalemate: bool,
    #[serde(default)]
    pub from: Option<Coord>,
    #[serde(default)]
    pub to: Option<Coord>,
    #[serde(default)]
    pub captured_piece: Option<PieceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

// Received on `game/{id}/clock`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockUpdate {
    pub white_time_ms: i64,
    pub black_time_ms: i64,
    pub current_turn: Force,
}

// `GET /games/{id}`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    #[serde(alias = "gameId")]
    pub id: String,
    pub white_player_id: String,
    pub black_player_id: String,
    pub current_fen: String,
    // "IN_PROGRESS" or "FINISHED".
    pub status: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub end_reason: Option<String>,
}

// Element of `GET /games/{id}/moves`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveLogEntry {
    pub algebraic_notation: String,
    pub move_number: u32,
}

// The HTTP API wraps every response body as `{ "data": ... }`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
    #[serde(default)]
    pub message: Option<String>,
}

pub const GAME_STATUS_IN_PROGRESS: &str = "IN_PROGRESS";

impl GameSnapshot {
    pub fn is_in_progress(&self) -> bool { self.status == GAME_STATUS_IN_PROGRESS }

    pub fn force_of(&self, player_id: &str) -> Option<Force> {
        if self.white_player_id == player_id {
            Some(Force::White)
        } else if self.black_player_id == player_id {
            Some(Force::Black)
        } else {
            None
        }
    }
}

impl ClockUpdate {
    // Force whose time ran out, if any. White is checked first.
    pub fn flagged_force(&self) -> Option<Force> {
        if self.white_time_ms <= 0 {
            Some(Force::White)
        } else if self.black_time_ms <= 0 {
            Some(Force::Black)
        } else {
            None
        }
    }
}
