// `Position` is an opaque board snapshot. This crate never looks inside it beyond the two FEN
// fields it needs (side to move and move number); everything else is the rules oracle's business.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::force::Force;


pub const INITIAL_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

const FEN_SIDE_TO_MOVE_FIELD: usize = 1;
const FEN_FULLMOVE_FIELD: usize = 5;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position {
    fen: String,
}

impl Position {
    // Does not validate the FEN: validation happens when the oracle first uses the position.
    pub fn from_fen(fen: impl Into<String>) -> Self {
        Position { fen: fen.into().trim().to_owned() }
    }

    pub fn initial() -> Self { Self::from_fen(INITIAL_FEN) }

    pub fn fen(&self) -> &str { &self.fen }

    // Falls back to White for malformed records; the oracle reports such positions properly.
    pub fn active_force(&self) -> Force {
        self.fen
            .split_whitespace()
            .nth(FEN_SIDE_TO_MOVE_FIELD)
            .and_then(|field| field.chars().next())
            .and_then(Force::from_fen_char)
            .unwrap_or(Force::White)
    }

    pub fn fullmove_number(&self) -> u32 {
        self.fen
            .split_whitespace()
            .nth(FEN_FULLMOVE_FIELD)
            .and_then(|field| field.parse().ok())
            .unwrap_or(1)
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Position({})", self.fen) }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.fen) }
}
