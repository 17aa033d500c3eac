use enum_map::{EnumMap, enum_map};
use serde::{Deserialize, Serialize};

use crate::force::Force;
use crate::history::{HistoryStore, PlyIndex};
use crate::piece::PieceKind;


// Everything here is a pure function of the history and the view cursor; never mutate it
// directly, recompute instead.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct DerivedState {
    // Pieces captured *by* the given force, in capture order.
    pub captured: EnumMap<Force, Vec<PieceKind>>,
    // Value captured by White minus value captured by Black.
    pub material_balance: i32,
    pub active_force: Force,
}

impl DerivedState {
    pub fn compute(history: &HistoryStore, cursor: Option<PlyIndex>) -> Self {
        let mut captured: EnumMap<Force, Vec<PieceKind>> = enum_map! { _ => vec![] };
        let num_plies = cursor.map_or(0, |i| i + 1);
        for entry in history.entries().iter().take(num_plies) {
            if !entry.chess_move.is_capture() {
                continue;
            }
            let Some(piece) = entry.chess_move.captured_piece else {
                continue;
            };
            let mover = history
                .position_before(entry.ply_index)
                .map_or(Force::White, |pos| pos.active_force());
            captured[mover].push(piece);
        }
        let value = |force: Force| captured[force].iter().map(|p| p.value()).sum::<i32>();
        let material_balance = value(Force::White) - value(Force::Black);
        let active_force = history
            .position_at(cursor)
            .unwrap_or(history.initial_position())
            .active_force();
        DerivedState { captured, material_balance, active_force }
    }

    pub fn captured_by_white(&self) -> &[PieceKind] { &self.captured[Force::White] }
    pub fn captured_by_black(&self) -> &[PieceKind] { &self.captured[Force::Black] }

    // Material lead from the point of view of `force`; negative when behind.
    pub fn advantage(&self, force: Force) -> i32 {
        match force {
            Force::White => self.material_balance,
            Force::Black => -self.material_balance,
        }
    }

    // Captured pieces ordered from cheapest to most valuable, the way they are usually shown.
    pub fn captured_for_display(&self, force: Force) -> Vec<PieceKind> {
        let mut pieces = self.captured[force].clone();
        pieces.sort_by_key(|p| p.value());
        pieces
    }
}
