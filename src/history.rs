// Log of moves played so far, with the resulting position cached for every entry so that any
// ply can be shown in O(1). The log is append-only except for the last entry while it is still
// unconfirmed by the server: a local move that the server never accepted can be retracted.
//
// Indices follow the convention used throughout the crate: `None` is the initial position
// (before the first move), `Some(i)` is the position after entry `i`.

use serde::{Deserialize, Serialize};

use crate::chess_move::Move;
use crate::position::Position;


pub type PlyIndex = usize;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Confirmation {
    // Acknowledged by the server, or received from it.
    Confirmed,
    // Local move published to the server, echo not received yet.
    Pending,
    // Local move made while disconnected; the server doesn't know about it.
    Unsent,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct MoveHistoryEntry {
    pub chess_move: Move,
    pub position: Position,
    pub ply_index: PlyIndex,
    pub confirmation: Confirmation,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AppendOutcome {
    pub index: PlyIndex,
    // Whether the view cursor moved to the new entry. It does iff it was at the live end.
    pub cursor_followed: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HistoryError {
    IndexOutOfRange { index: PlyIndex, len: usize },
}

impl std::fmt::Display for HistoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryError::IndexOutOfRange { index, len } => {
                write!(f, "ply {index} is out of range, the game has {len} plies")
            }
        }
    }
}

impl std::error::Error for HistoryError {}

#[derive(Clone, Debug)]
pub struct HistoryStore {
    initial_position: Position,
    entries: Vec<MoveHistoryEntry>,
    cursor: Option<PlyIndex>,
}

impl HistoryStore {
    pub fn new(initial_position: Position) -> Self {
        HistoryStore { initial_position, entries: Vec::new(), cursor: None }
    }

    pub fn initial_position(&self) -> &Position { &self.initial_position }
    pub fn entries(&self) -> &[MoveHistoryEntry] { &self.entries }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn last(&self) -> Option<&MoveHistoryEntry> { self.entries.last() }

    pub fn cursor(&self) -> Option<PlyIndex> { self.cursor }
    pub fn live_index(&self) -> Option<PlyIndex> { self.entries.len().checked_sub(1) }
    pub fn is_at_live(&self) -> bool { self.cursor == self.live_index() }

    pub fn position_at(&self, index: Option<PlyIndex>) -> Option<&Position> {
        match index {
            None => Some(&self.initial_position),
            Some(i) => self.entries.get(i).map(|e| &e.position),
        }
    }
    pub fn cursor_position(&self) -> &Position { self.position_or_initial(self.cursor) }
    pub fn live_position(&self) -> &Position { self.position_or_initial(self.live_index()) }

    // Position in which the move at `index` was made.
    pub fn position_before(&self, index: PlyIndex) -> Option<&Position> {
        self.position_at(index.checked_sub(1))
    }

    pub fn append(
        &mut self, chess_move: Move, position: Position, confirmation: Confirmation,
    ) -> AppendOutcome {
        let cursor_followed = self.is_at_live();
        let index = self.entries.len();
        self.entries.push(MoveHistoryEntry { chess_move, position, ply_index: index, confirmation });
        if cursor_followed {
            self.cursor = Some(index);
        }
        AppendOutcome { index, cursor_followed }
    }

    pub fn set_cursor(&mut self, index: Option<PlyIndex>) -> Result<&Position, HistoryError> {
        if let Some(i) = index {
            if i >= self.entries.len() {
                return Err(HistoryError::IndexOutOfRange { index: i, len: self.entries.len() });
            }
        }
        self.cursor = index;
        Ok(self.cursor_position())
    }

    pub fn resume_live(&mut self) -> &Position {
        self.cursor = self.live_index();
        self.cursor_position()
    }

    // Returns whether the cursor moved.
    pub fn step_forward(&mut self) -> bool {
        let next = self.cursor.map_or(0, |i| i + 1);
        if next >= self.entries.len() {
            return false;
        }
        self.cursor = Some(next);
        true
    }

    pub fn step_backward(&mut self) -> bool {
        match self.cursor {
            None => false,
            Some(i) => {
                self.cursor = i.checked_sub(1);
                true
            }
        }
    }

    // Removes the live entry unless the server has confirmed it. A cursor pointing at the removed
    // entry moves to the new live end.
    pub fn retract_live(&mut self) -> Option<MoveHistoryEntry> {
        if self.entries.last()?.confirmation == Confirmation::Confirmed {
            return None;
        }
        let entry = self.entries.pop()?;
        if self.cursor.is_some_and(|i| i >= self.entries.len()) {
            self.cursor = self.live_index();
        }
        Some(entry)
    }

    // Overwrites the live position with the server's version. Returns the replaced position if
    // it was different.
    pub fn correct_live(&mut self, position: Position) -> Option<Position> {
        let entry = self.entries.last_mut()?;
        if entry.position == position {
            return None;
        }
        Some(std::mem::replace(&mut entry.position, position))
    }

    pub fn set_live_confirmation(&mut self, confirmation: Confirmation) {
        if let Some(entry) = self.entries.last_mut() {
            entry.confirmation = confirmation;
        }
    }

    pub fn unconfirmed_live(&self) -> Option<&MoveHistoryEntry> {
        self.entries.last().filter(|e| e.confirmation != Confirmation::Confirmed)
    }

    fn position_or_initial(&self, index: Option<PlyIndex>) -> &Position {
        self.position_at(index).unwrap_or(&self.initial_position)
    }
}
