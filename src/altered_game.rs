// Defines `AlteredGame`: the game as seen by this client, i.e. the server-confirmed history plus at
// most one local move that the server has not acknowledged yet.
//
// The server is trusted, the user is not. Bogus local input is rejected without touching the
// state. Server notifications are always accepted: when they disagree with the local view, the
// local view is corrected and the disagreement is reported.
//
// Only one unconfirmed local move is allowed. Chess is turn-based, so a second one could never be
// legal anyway.

use std::cell::Ref;
use std::rc::Rc;
use std::time::Duration;

use instant::Instant;
use log::{debug, info, warn};

use crate::chess_move::{Move, MoveCandidate};
use crate::log_internal_error;
use crate::config::{OfflineMovePolicy, SyncConfig};
use crate::coord::Coord;
use crate::derived::DerivedState;
use crate::event::{GameSnapshot, MoveLogEntry, MoveNotification, MoveSubmission};
use crate::force::Force;
use crate::history::{Confirmation, HistoryStore, MoveHistoryEntry, PlyIndex};
use crate::position::Position;
use crate::rules::{PositionStatus, RulesOracle, TurnError};
use crate::session::{
    ConnectionState, DrawReason, GameSession, GameStatus, SessionMode, VictoryReason,
};
use crate::versioned::{Memo, Versioned};


#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SyncPhase {
    // Waiting for the initial snapshot. No moves can be made.
    Loading,
    Live,
    // Cursor is not at the live end. Remote moves still apply, local moves are rejected.
    ViewingHistory,
    // Game is over. Absorbing: no further moves or status changes.
    Terminal,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MoveToken {
    pub request_id: String,
    pub notation: String,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PendingMove {
    pub token: MoveToken,
    pub sent_at: Instant,
    // Request ids of earlier submissions of the same move that were superseded by a resync. The
    // server may still process and echo one of them.
    pub earlier_request_ids: Vec<String>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum LocalMoveOutcome {
    // Applied optimistically; the submission must be published.
    Sent(MoveSubmission),
    // Applied locally while disconnected. Will be submitted on resync.
    Unconfirmed,
    // Applied locally in offline mode. There is nobody to tell.
    LocalOnly,
    // Pawn reaches the last rank: ask the user for the piece and submit again.
    PromotionRequired,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum LocalMoveError {
    Illegal(TurnError),
    ViewingHistory,
    NotYourTurn,
    MovePending,
    NotLive(SyncPhase),
    GameOver,
    Disconnected,
}

// Server position differs from what the client computed locally.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Desync {
    pub local: Position,
    pub server: Position,
    pub consecutive: u32,
    // More than `SyncConfig::max_consecutive_desyncs` in a row: a resync is in order.
    pub persistent: bool,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RemoteMoveOutcome {
    Ignored,
    Duplicate,
    // Echo of the pending local move.
    Confirmed { desync: Option<Desync> },
    OpponentMoved { cursor_followed: bool, desync: Option<Desync> },
    // The server went a different way: the optimistic local move was dropped in favor of the
    // notification, which has been applied.
    PendingDiscarded { discarded: Move, desync: Option<Desync> },
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RemoteMoveError {
    NotLoaded,
    // Notation doesn't apply to the local position and the notification lacks the squares needed
    // to record the move anyway. Needs a resync.
    Unrecognized(String),
}

// Result of rebuilding the history from the server (initial load or resync).
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct SyncReport {
    pub num_moves: usize,
    // The server move log could not be replayed; history starts from the server position.
    pub replay_error: Option<TurnError>,
    pub desync: Option<Desync>,
    // An unconfirmed local move that the server doesn't have was applied again and must be sent.
    pub resubmit: Option<MoveSubmission>,
    // An unconfirmed local move that no longer fits the server's line.
    pub dropped: Option<Move>,
}

pub struct AlteredGame {
    oracle: Rc<dyn RulesOracle>,
    config: SyncConfig,
    session: GameSession,
    loading: bool,
    history: Versioned<HistoryStore>,
    pending: Option<PendingMove>,
    consecutive_desyncs: u32,
    next_request_seq: u64,
    // Use `derived_state()` instead, which ensures that the data is up-to-date.
    derived: Memo<u64, DerivedState>,
}

impl AlteredGame {
    pub fn new(oracle: Rc<dyn RulesOracle>, session: GameSession, config: SyncConfig) -> Self {
        let history = Versioned::new(HistoryStore::new(Position::initial()));
        let derived = Memo::new(history.revision(), DerivedState::compute(&history, None));
        AlteredGame {
            oracle,
            config,
            session,
            loading: true,
            history,
            pending: None,
            consecutive_desyncs: 0,
            next_request_seq: 1,
            derived,
        }
    }

    pub fn session(&self) -> &GameSession { &self.session }
    pub fn config(&self) -> &SyncConfig { &self.config }
    pub fn my_force(&self) -> Force { self.session.my_force }
    pub fn status(&self) -> &GameStatus { &self.session.status }
    pub fn history(&self) -> &HistoryStore { &self.history }
    pub fn pending(&self) -> Option<&PendingMove> { self.pending.as_ref() }
    pub fn has_unconfirmed_move(&self) -> bool { self.history.unconfirmed_live().is_some() }
    pub fn consecutive_desyncs(&self) -> u32 { self.consecutive_desyncs }

    pub fn phase(&self) -> SyncPhase {
        if self.loading {
            SyncPhase::Loading
        } else if !self.session.status.is_active() {
            SyncPhase::Terminal
        } else if !self.history.is_at_live() {
            SyncPhase::ViewingHistory
        } else {
            SyncPhase::Live
        }
    }

    pub fn displayed_position(&self) -> &Position { self.history.cursor_position() }
    pub fn live_position(&self) -> &Position { self.history.live_position() }

    pub fn live_status(&self) -> PositionStatus {
        self.oracle.status(self.history.live_position()).unwrap_or_default()
    }

    pub fn is_my_turn(&self) -> bool {
        self.session.is_offline() || self.live_position().active_force() == self.session.my_force
    }

    // Destinations for a piece on `from` in the live position, for move hints.
    pub fn legal_destinations(&self, from: Coord) -> Vec<Coord> {
        match self.oracle.legal_moves(self.live_position(), Some(from)) {
            Ok(moves) => {
                let mut destinations: Vec<_> = moves.into_iter().map(|m| m.to).collect();
                destinations.dedup();
                destinations
            }
            Err(_) => vec![],
        }
    }

    pub fn derived_state(&self) -> Ref<'_, DerivedState> {
        self.derived.get_or_compute(self.history.revision(), || {
            DerivedState::compute(&self.history, self.history.cursor())
        })
    }

    pub fn set_connection_state(&mut self, state: ConnectionState) {
        self.session.connection_state = state;
    }

    pub fn finish_loading(
        &mut self, snapshot: &GameSnapshot, move_log: &[MoveLogEntry],
    ) -> SyncReport {
        let report = self.reset_to_server_line(snapshot, move_log);
        self.loading = false;
        info!(
            "Game {} loaded: {} moves, {}",
            self.session.id, report.num_moves, self.session.status
        );
        report
    }

    // Gives up on the server and lets the user play both sides locally.
    pub fn fall_back_to_offline(&mut self, reason: String) {
        warn!("Game {} switches to offline mode: {reason}", self.session.id);
        self.session.mode = SessionMode::Offline { reason };
        self.loading = false;
        self.pending = None;
    }

    // Replaces the local history with the server's. Called after reconnecting and when the pending
    // move has not been echoed for too long.
    pub fn rebuild_from_server(
        &mut self, snapshot: &GameSnapshot, move_log: &[MoveLogEntry], now: Instant,
    ) -> SyncReport {
        let unconfirmed = self.history.unconfirmed_live().cloned();
        let viewed = (!self.history.is_at_live()).then(|| self.history.cursor());
        let earlier_request_ids = self.pending.take().map_or_else(Vec::new, |pending| {
            let mut ids = pending.earlier_request_ids;
            ids.push(pending.token.request_id);
            ids
        });
        let mut report = self.reset_to_server_line(snapshot, move_log);
        if let Some(entry) = unconfirmed {
            self.resubmit_unconfirmed(entry, earlier_request_ids, &mut report, now);
        }
        if let Some(cursor) = viewed {
            // Ignore failure: the position may not exist anymore.
            let _ = self.history.get_mut().set_cursor(cursor);
        }
        report
    }

    // Applies a local move the server doesn't know about on top of the freshly rebuilt history.
    // The cursor is at live here.
    fn resubmit_unconfirmed(
        &mut self, entry: MoveHistoryEntry, earlier_request_ids: Vec<String>,
        report: &mut SyncReport, now: Instant,
    ) {
        let server_entry = self.history.entries().get(entry.ply_index);
        if server_entry.is_some_and(|e| {
            Move::same_notation(&e.chess_move.notation, &entry.chess_move.notation)
        }) {
            debug!("Server already has {}", entry.chess_move.notation);
            return;
        }
        if self.history.len() == entry.ply_index {
            match self.submit_local_move(entry.chess_move.candidate(), now) {
                Ok(LocalMoveOutcome::Sent(submission)) => {
                    if let Some(pending) = &mut self.pending {
                        pending.earlier_request_ids = earlier_request_ids;
                    }
                    report.resubmit = Some(submission);
                    return;
                }
                Ok(LocalMoveOutcome::Unconfirmed | LocalMoveOutcome::LocalOnly) => return,
                Ok(LocalMoveOutcome::PromotionRequired) | Err(_) => {}
            }
        }
        info!("Dropping local move {} after resync", entry.chess_move.notation);
        report.dropped = Some(entry.chess_move);
    }

    pub fn submit_local_move(
        &mut self, candidate: MoveCandidate, now: Instant,
    ) -> Result<LocalMoveOutcome, LocalMoveError> {
        match self.phase() {
            SyncPhase::Live => {}
            SyncPhase::ViewingHistory => return Err(LocalMoveError::ViewingHistory),
            SyncPhase::Terminal => return Err(LocalMoveError::GameOver),
            phase @ SyncPhase::Loading => return Err(LocalMoveError::NotLive(phase)),
        }
        if self.pending.is_some() || self.has_unconfirmed_move() {
            return Err(LocalMoveError::MovePending);
        }
        if !self.is_my_turn() {
            return Err(LocalMoveError::NotYourTurn);
        }
        let offline = self.session.is_offline();
        let connected = self.session.is_connected();
        if !offline && !connected && self.config.offline_move_policy == OfflineMovePolicy::Block {
            return Err(LocalMoveError::Disconnected);
        }

        let mover = self.live_position().active_force();
        let applied = match self.oracle.apply_move(self.live_position(), candidate) {
            Ok(applied) => applied,
            Err(TurnError::PromotionRequired) => return Ok(LocalMoveOutcome::PromotionRequired),
            Err(err) => return Err(LocalMoveError::Illegal(err)),
        };
        let confirmation = match (offline, connected) {
            (true, _) => Confirmation::Confirmed,
            (false, true) => Confirmation::Pending,
            (false, false) => Confirmation::Unsent,
        };
        let notation = applied.chess_move.notation.clone();
        let status = self.oracle.status(&applied.position).unwrap_or_default();
        self.history.get_mut().append(applied.chess_move, applied.position, confirmation);
        self.apply_position_status(status, mover);

        match confirmation {
            Confirmation::Confirmed => Ok(LocalMoveOutcome::LocalOnly),
            Confirmation::Unsent => {
                info!("Move {notation} made while disconnected");
                Ok(LocalMoveOutcome::Unconfirmed)
            }
            Confirmation::Pending => {
                let request_id = self.make_request_id();
                self.pending = Some(PendingMove {
                    token: MoveToken { request_id: request_id.clone(), notation },
                    sent_at: now,
                    earlier_request_ids: vec![],
                });
                Ok(LocalMoveOutcome::Sent(MoveSubmission {
                    from: candidate.from,
                    to: candidate.to,
                    promotion: candidate.promotion,
                    request_id: Some(request_id),
                }))
            }
        }
    }

    // The submission returned by `submit_local_move` could not be published.
    pub fn mark_unsent(&mut self) {
        if self.pending.take().is_some() {
            self.history.get_mut().set_live_confirmation(Confirmation::Unsent);
        }
    }

    pub fn pending_is_stale(&self, now: Instant, timeout: Duration) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|p| now.duration_since(p.sent_at) >= timeout)
    }

    pub fn apply_remote_move(
        &mut self, notification: &MoveNotification,
    ) -> Result<RemoteMoveOutcome, RemoteMoveError> {
        if self.loading {
            return Err(RemoteMoveError::NotLoaded);
        }
        let server_position = Position::from_fen(notification.fen.as_str());
        let is_echo = self.pending.as_ref().is_some_and(|p| is_echo_of(p, notification));

        if self.phase() == SyncPhase::Terminal {
            if is_echo {
                self.pending = None;
                let history = self.history.get_mut();
                history.set_live_confirmation(Confirmation::Confirmed);
                history.correct_live(server_position);
            } else {
                debug!("Ignoring {} after game end", notification.algebraic_notation);
            }
            return Ok(RemoteMoveOutcome::Ignored);
        }

        if is_echo {
            self.pending = None;
            let history = self.history.get_mut();
            history.set_live_confirmation(Confirmation::Confirmed);
            let desync = history
                .correct_live(server_position.clone())
                .map(|local| self.register_desync(local, server_position));
            if desync.is_none() {
                self.consecutive_desyncs = 0;
            }
            self.apply_notification_status(notification);
            return Ok(RemoteMoveOutcome::Confirmed { desync });
        }

        // Typically a notification that was buffered while loading a log that already had it.
        let already_known = self.history.entries().iter().rev().any(|entry| {
            entry.confirmation == Confirmation::Confirmed
                && entry.position == server_position
                && Move::same_notation(&entry.chess_move.notation, &notification.algebraic_notation)
        });
        if already_known {
            debug!("Duplicate notification {}", notification.algebraic_notation);
            return Ok(RemoteMoveOutcome::Duplicate);
        }

        let mut discarded = None;
        if let Some(pending) = self.pending.take() {
            if self.continues_live_line(notification, &server_position) {
                // The echo got lost, but the opponent's reply shows the server accepted our move.
                debug!("{} implicitly confirmed", pending.token.notation);
                self.history.get_mut().set_live_confirmation(Confirmation::Confirmed);
            } else {
                warn!(
                    "Server line diverges from pending move {}: got {}",
                    pending.token.notation, notification.algebraic_notation
                );
                discarded = self.history.get_mut().retract_live().map(|e| e.chess_move);
                if discarded.is_none() {
                    log_internal_error!("no unconfirmed entry for {}", pending.token.notation);
                }
            }
        }

        let (cursor_followed, desync) = self.append_server_move(notification, server_position)?;
        self.apply_notification_status(notification);
        Ok(match discarded {
            Some(discarded) => RemoteMoveOutcome::PendingDiscarded { discarded, desync },
            None => RemoteMoveOutcome::OpponentMoved { cursor_followed, desync },
        })
    }

    pub fn resign(&mut self) -> bool {
        let winner = self.session.my_force.opponent();
        self.set_status(GameStatus::Victory(winner, VictoryReason::Resignation))
    }

    pub fn timeout(&mut self, winner: Force) -> bool {
        self.set_status(GameStatus::Victory(winner, VictoryReason::Flag))
    }

    // Returns whether the status changed. Once the game is over, it stays over.
    pub fn set_status(&mut self, status: GameStatus) -> bool {
        if !self.session.status.is_active() || status.is_active() {
            return false;
        }
        info!("Game {} over: {status}", self.session.id);
        self.session.status = status;
        true
    }

    pub fn go_to_ply(&mut self, index: Option<PlyIndex>) -> &Position {
        let history = self.history.get_mut();
        if history.set_cursor(index).is_err() {
            debug!("Ply {index:?} out of range");
        }
        self.history.cursor_position()
    }

    pub fn step_forward(&mut self) -> &Position {
        self.history.get_mut().step_forward();
        self.history.cursor_position()
    }

    pub fn step_backward(&mut self) -> &Position {
        self.history.get_mut().step_backward();
        self.history.cursor_position()
    }

    pub fn resume_to_live(&mut self) -> &Position { self.history.get_mut().resume_live() }

    fn make_request_id(&mut self) -> String {
        let id = format!("{}-{}", self.session.my_id, self.next_request_seq);
        self.next_request_seq += 1;
        id
    }

    // Whether the notification is a legal continuation of the live position (which includes the
    // pending move) that ends where the server says it does.
    fn continues_live_line(
        &self, notification: &MoveNotification, server_position: &Position,
    ) -> bool {
        self.oracle
            .apply_notation(self.live_position(), &notification.algebraic_notation)
            .is_ok_and(|applied| applied.position == *server_position)
    }

    fn append_server_move(
        &mut self, notification: &MoveNotification, server_position: Position,
    ) -> Result<(bool, Option<Desync>), RemoteMoveError> {
        let notation = &notification.algebraic_notation;
        let (chess_move, desync) =
            match self.oracle.apply_notation(self.live_position(), notation) {
                Ok(applied) if applied.position == server_position => {
                    self.consecutive_desyncs = 0;
                    (applied.chess_move, None)
                }
                Ok(applied) => {
                    let desync = self.register_desync(applied.position, server_position.clone());
                    (applied.chess_move, Some(desync))
                }
                Err(err) => {
                    let chess_move = Move::from_server_report(
                        notation,
                        notification.from,
                        notification.to,
                        notification.captured_piece,
                    )
                    .ok_or_else(|| RemoteMoveError::Unrecognized(notation.clone()))?;
                    warn!("Cannot apply server move {notation} locally: {err}");
                    let local = self.live_position().clone();
                    (chess_move, Some(self.register_desync(local, server_position.clone())))
                }
            };
        let live_before = self.history.live_index();
        let history = self.history.get_mut();
        let outcome = history.append(chess_move, server_position, Confirmation::Confirmed);
        let mut cursor_followed = outcome.cursor_followed;
        if cursor_followed && !self.config.follow_live_on_remote_move {
            // Keep showing the position the user was looking at.
            let _ = history.set_cursor(live_before);
            cursor_followed = false;
        }
        Ok((cursor_followed, desync))
    }

    fn register_desync(&mut self, local: Position, server: Position) -> Desync {
        self.consecutive_desyncs += 1;
        let persistent = self.consecutive_desyncs > self.config.max_consecutive_desyncs;
        warn!(
            "Desync #{} in game {}: local {local}, server {server}",
            self.consecutive_desyncs, self.session.id
        );
        Desync { local, server, consecutive: self.consecutive_desyncs, persistent }
    }

    fn apply_notification_status(&mut self, notification: &MoveNotification) {
        let live = self.history.live_position();
        let local = self.oracle.status(live).unwrap_or_default();
        let status = PositionStatus {
            is_check: notification.is_check || local.is_check,
            is_checkmate: notification.is_checkmate || local.is_checkmate,
            is_stalemate: notification.is_stalemate || local.is_stalemate,
        };
        // The side to move after the move is the one that didn't make it.
        let mover = live.active_force().opponent();
        self.apply_position_status(status, mover);
    }

    fn apply_position_status(&mut self, status: PositionStatus, mover: Force) {
        if status.is_checkmate {
            self.set_status(GameStatus::Victory(mover, VictoryReason::Checkmate));
        } else if status.is_stalemate {
            self.set_status(GameStatus::Draw(DrawReason::Stalemate));
        }
    }

    fn reset_to_server_line(
        &mut self, snapshot: &GameSnapshot, move_log: &[MoveLogEntry],
    ) -> SyncReport {
        let server_position = Position::from_fen(snapshot.current_fen.as_str());
        let mut history = HistoryStore::new(Position::initial());
        let mut report = SyncReport::default();
        for entry in move_log {
            match self.oracle.apply_notation(history.live_position(), &entry.algebraic_notation) {
                Ok(applied) => {
                    history.append(applied.chess_move, applied.position, Confirmation::Confirmed);
                }
                Err(err) => {
                    warn!(
                        "Cannot replay move {} {}: {err}",
                        entry.move_number, entry.algebraic_notation
                    );
                    report.replay_error = Some(err);
                    history = HistoryStore::new(server_position.clone());
                    break;
                }
            }
        }
        if history.is_empty() {
            // Either no moves yet or a game that didn't start from the standard position.
            history = HistoryStore::new(server_position.clone());
        } else if let Some(local) = history.correct_live(server_position.clone()) {
            self.consecutive_desyncs = 0;
            report.desync = Some(self.register_desync(local, server_position.clone()));
        }
        report.num_moves = history.len();
        if report.desync.is_none() {
            self.consecutive_desyncs = 0;
        }
        *self.history.get_mut() = history;

        if !snapshot.is_in_progress() {
            let status = GameStatus::from_server_result(
                snapshot.result.as_deref(),
                snapshot.end_reason.as_deref(),
                &server_position,
            );
            self.set_status(status);
        } else {
            let mover = server_position.active_force().opponent();
            let status = self.oracle.status(&server_position).unwrap_or_default();
            self.apply_position_status(status, mover);
        }
        report
    }
}

// Server echoes the request id if it supports it. Otherwise the notation has to do.
fn is_echo_of(pending: &PendingMove, notification: &MoveNotification) -> bool {
    match &notification.request_id {
        Some(request_id) => {
            *request_id == pending.token.request_id
                || pending.earlier_request_ids.contains(request_id)
        }
        None => Move::same_notation(&pending.token.notation, &notification.algebraic_notation),
    }
}
