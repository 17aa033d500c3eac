// Helpers shared by tests and the console `replay` command.

use enum_map::{EnumMap, enum_map};

use crate::event::{GAME_STATUS_IN_PROGRESS, GameSnapshot, MoveLogEntry};
use crate::force::Force;
use crate::history::{Confirmation, HistoryStore};
use crate::position::Position;
use crate::rules::{RulesOracle, TurnError};
use crate::session::{GameId, PlayerId};


pub fn sample_game_id() -> GameId { GameId::new("g-1") }

pub fn sample_players() -> EnumMap<Force, PlayerId> {
    enum_map! {
        Force::White => PlayerId::new("alice"),
        Force::Black => PlayerId::new("bob"),
    }
}

// Splits a move list like "1. e4 e5 2.Nf3" into SAN words.
pub fn split_log(log: &str) -> Vec<&str> {
    log.split_whitespace()
        .map(|word| word.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.'))
        .filter(|word| !word.is_empty())
        .collect()
}

pub fn replay_log(
    oracle: &dyn RulesOracle, history: &mut HistoryStore, log: &str,
) -> Result<(), TurnError> {
    for notation in split_log(log) {
        let applied = oracle.apply_notation(history.live_position(), notation)?;
        history.append(applied.chess_move, applied.position, Confirmation::Confirmed);
    }
    Ok(())
}

pub fn history_from_log(oracle: &dyn RulesOracle, log: &str) -> Result<HistoryStore, TurnError> {
    let mut history = HistoryStore::new(Position::initial());
    replay_log(oracle, &mut history, log)?;
    Ok(history)
}

// Server-side representation of a move list, as returned by `GET /games/{id}/moves`.
pub fn server_move_log(log: &str) -> Vec<MoveLogEntry> {
    split_log(log)
        .into_iter()
        .enumerate()
        .map(|(ply, notation)| MoveLogEntry {
            algebraic_notation: notation.to_owned(),
            move_number: (ply / 2 + 1) as u32,
        })
        .collect()
}

pub fn in_progress_snapshot(game_id: &GameId, current_fen: &str) -> GameSnapshot {
    let players = sample_players();
    GameSnapshot {
        id: game_id.to_string(),
        white_player_id: players[Force::White].to_string(),
        black_player_id: players[Force::Black].to_string(),
        current_fen: current_fen.to_owned(),
        status: GAME_STATUS_IN_PROGRESS.to_owned(),
        result: None,
        end_reason: None,
    }
}
