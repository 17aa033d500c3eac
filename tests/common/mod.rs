// Rust-upgrade (https://github.com/rust-lang/rust/issues/46379):
//   remove `#[allow(dead_code)]` before public functions.

use std::rc::Rc;

use chess_sync::altered_game::AlteredGame;
use chess_sync::config::SyncConfig;
use chess_sync::event::MoveNotification;
use chess_sync::force::Force;
use chess_sync::position::Position;
use chess_sync::rules::{RulesOracle, StandardRules};
use chess_sync::session::{ConnectionState, GameSession};
use chess_sync::test_util::{
    history_from_log, in_progress_snapshot, sample_game_id, sample_players, server_move_log,
};
use instant::Instant;


#[macro_export]
macro_rules! mv {
    ($from:ident -> $to:ident) => {
        chess_sync::chess_move::MoveCandidate::new(
            chess_sync::coord::Coord::$from,
            chess_sync::coord::Coord::$to,
        )
    };
    ($from:ident -> $to:ident = $promotion:ident) => {
        chess_sync::chess_move::MoveCandidate::promoting(
            chess_sync::coord::Coord::$from,
            chess_sync::coord::Coord::$to,
            chess_sync::piece::PieceKind::$promotion,
        )
    };
}

#[allow(dead_code)]
pub fn t0() -> Instant { Instant::now() }

// Connected game for `my_force` with `log` already played and confirmed.
#[allow(dead_code)]
pub fn loaded_game(my_force: Force, log: &str) -> AlteredGame {
    loaded_game_with(my_force, log, SyncConfig::default())
}

#[allow(dead_code)]
pub fn loaded_game_with(my_force: Force, log: &str, config: SyncConfig) -> AlteredGame {
    let game_id = sample_game_id();
    let session = GameSession::new(game_id.clone(), sample_players()[my_force].clone(), my_force);
    let mut game = AlteredGame::new(Rc::new(StandardRules::new()), session, config);
    game.set_connection_state(ConnectionState::Connected);
    let history = history_from_log(&StandardRules, log).unwrap();
    let snapshot = in_progress_snapshot(&game_id, history.live_position().fen());
    game.finish_loading(&snapshot, &server_move_log(log));
    game
}

// What the server sends after `san` is played in `position`.
#[allow(dead_code)]
pub fn notification(position: &Position, san: &str, request_id: Option<&str>) -> MoveNotification {
    let applied = StandardRules.apply_notation(position, san).unwrap();
    let status = StandardRules.status(&applied.position).unwrap();
    MoveNotification {
        algebraic_notation: applied.chess_move.notation,
        fen: applied.position.fen().to_owned(),
        is_check: status.is_check,
        is_checkmate: status.is_checkmate,
        is_stalemate: status.is_stalemate,
        from: Some(applied.chess_move.from),
        to: Some(applied.chess_move.to),
        captured_piece: applied.chess_move.captured_piece,
        request_id: request_id.map(str::to_owned),
    }
}

// Echo of the pending local move, as a server that supports correlation ids would send it.
#[allow(dead_code)]
pub fn echo_of_pending(game: &AlteredGame) -> MoveNotification {
    let pending = game.pending().unwrap();
    let previous = game.history().position_before(game.history().len() - 1).unwrap().clone();
    notification(&previous, &pending.token.notation, Some(&pending.token.request_id))
}

// Opponent reply in the live position.
#[allow(dead_code)]
pub fn opponent_move(game: &AlteredGame, san: &str) -> MoveNotification {
    notification(game.live_position(), san, None)
}
