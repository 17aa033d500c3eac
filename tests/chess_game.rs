use chess_sync::chess_move::MoveFlag;
use chess_sync::derived::DerivedState;
use chess_sync::force::Force;
use chess_sync::history::HistoryStore;
use chess_sync::piece::PieceKind;
use chess_sync::position::Position;
use chess_sync::rules::{RulesOracle, StandardRules, TurnError};
use chess_sync::test_util::{history_from_log, replay_log, split_log};
use pretty_assertions::assert_eq;


const OPERA_GAME: &str = "1.e4 e5 2.Nf3 d6 3.d4 Bg4 4.dxe5 Bxf3 5.Qxf3 dxe5 6.Bc4 Nf6 7.Qb3 Qe7
    8.Nc3 c6 9.Bg5 b5 10.Nxb5 cxb5 11.Bxb5+ Nbd7 12.O-O-O Rd8 13.Rxd7 Rxd7 14.Rd1 Qe6
    15.Bxd7+ Nxd7 16.Qb8+ Nxb8 17.Rd8#";

fn replay_log_from_start(log: &str) -> Result<HistoryStore, TurnError> {
    history_from_log(&StandardRules, log)
}

fn notations(history: &HistoryStore) -> Vec<&str> {
    history.entries().iter().map(|e| e.chess_move.notation.as_str()).collect()
}


#[test]
fn opera_game() {
    let history = replay_log_from_start(OPERA_GAME).unwrap();
    assert_eq!(notations(&history), split_log(OPERA_GAME));
    assert!(StandardRules.is_checkmate(history.live_position()));

    let castling = &history.entries()[22].chess_move;
    assert_eq!(castling.notation, "O-O-O");
    assert!(castling.flags.contains(MoveFlag::Castle));

    let derived = DerivedState::compute(&history, history.live_index());
    assert_eq!(derived.active_force, Force::Black);
    // Morphy gave up material for the attack.
    assert_eq!(derived.material_balance, 14 - 24);
    assert_eq!(derived.captured_by_black().last(), Some(&PieceKind::Queen));
}

#[test]
fn check_markers_are_optional() {
    let history = replay_log_from_start("f3 e5 g4 Qh4").unwrap();
    assert_eq!(notations(&history).last(), Some(&"Qh4#"));

    let history = replay_log_from_start("e4 f6 Qh5+").unwrap();
    assert_eq!(notations(&history).last(), Some(&"Qh5+"));
}

#[test]
fn illegal_moves() {
    assert_eq!(replay_log_from_start("e4 e5 Ke3").unwrap_err(), TurnError::IllegalMove);
    assert_eq!(replay_log_from_start("e5").unwrap_err(), TurnError::IllegalMove);
    assert!(matches!(
        replay_log_from_start("e4 @@").unwrap_err(),
        TurnError::InvalidNotation(_)
    ));
}

#[test]
fn en_passant() {
    let history = replay_log_from_start("e4 a6 e5 d5 exd6").unwrap();
    let last = &history.last().unwrap().chess_move;
    assert_eq!(last.notation, "exd6");
    assert!(last.flags.contains(MoveFlag::EnPassant));
    assert_eq!(last.captured_piece, Some(PieceKind::Pawn));
}

#[test]
fn promotion_with_capture() {
    let history = replay_log_from_start("a4 b5 axb5 a6 bxa6 Nc6 a7 Rb8 axb8=Q").unwrap();
    let last = &history.last().unwrap().chess_move;
    assert_eq!(last.promotion, Some(PieceKind::Queen));
    assert_eq!(last.captured_piece, Some(PieceKind::Rook));
    assert!(last.flags.contains(MoveFlag::Promotion));
    assert!(last.is_capture());
}

#[test]
fn replay_from_custom_position() {
    let initial = Position::from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 30");
    let mut history = HistoryStore::new(initial.clone());
    replay_log(&StandardRules, &mut history, "e4 Kd7 e5 Ke6").unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history.initial_position(), &initial);
    assert_eq!(history.live_position().fullmove_number(), 32);
    assert_eq!(history.live_position().active_force(), Force::White);
}

#[test]
fn cached_positions_match_replay() {
    let history = replay_log_from_start(OPERA_GAME).unwrap();
    let mut position = Position::initial();
    for entry in history.entries() {
        position = StandardRules.apply_notation(&position, &entry.chess_move.notation).unwrap().position;
        assert_eq!(position, entry.position);
    }
}
