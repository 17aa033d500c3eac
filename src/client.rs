// Client driver: owns the transport and the game API handle, feeds incoming messages into
// `AlteredGame` and turns the results into `NotableEvent`s for the UI.

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use instant::Instant;
use log::{error, info, warn};

use crate::altered_game::{
    AlteredGame, Desync, LocalMoveError, LocalMoveOutcome, RemoteMoveError, RemoteMoveOutcome,
    SyncPhase, SyncReport,
};
use crate::api::{ApiError, GameApi};
use crate::chess_move::MoveCandidate;
use crate::clock::ClockState;
use crate::config::SyncConfig;
use crate::event::{ClockUpdate, MoveNotification, MoveSubmission};
use crate::force::Force;
use crate::log_internal_error;
use crate::network::{self, Transport};
use crate::rules::RulesOracle;
use crate::session::{ConnectionState, GameId, GameSession, GameStatus, PlayerId};


#[derive(Clone, PartialEq, Eq, Debug)]
pub enum NotableEvent {
    GameLoaded,
    // The game could not be fetched. The session continues in offline mode.
    LoadFailed(String),
    MoveConfirmed,
    // Local move is shown but the server doesn't know about it yet.
    MoveUnconfirmed,
    OpponentMoved,
    // Optimistic local move was rolled back. Contains its notation.
    LocalMoveDiscarded(String),
    // Side in check.
    Check(Force),
    DesyncDetected { persistent: bool },
    // The driver should call `resync` when convenient.
    ResyncRequired,
    Resynced,
    ClockUpdated,
    GameOver(GameStatus),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum EventError {
    BadPayload(String),
    UnknownTopic(String),
    CannotApplyEvent(String),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ResignError {
    // Nothing to resign from until the game is loaded.
    NotLoaded,
    Api(ApiError),
}

pub enum GameState {
    NotLoaded {
        // Messages that arrived before the game was loaded, in order.
        buffered: Vec<(String, String)>,
    },
    Ready(AlteredGame),
}

pub struct ClientState {
    game_id: GameId,
    my_id: PlayerId,
    config: SyncConfig,
    oracle: Rc<dyn RulesOracle>,
    transport: Box<dyn Transport>,
    api: Rc<dyn GameApi>,
    game_state: GameState,
    clock: Option<ClockState>,
    resync_requested: bool,
    notable_events: VecDeque<NotableEvent>,
}

impl ClientState {
    pub fn new(
        game_id: GameId, my_id: PlayerId, config: SyncConfig, oracle: Rc<dyn RulesOracle>,
        transport: Box<dyn Transport>, api: Rc<dyn GameApi>,
    ) -> Self {
        ClientState {
            game_id,
            my_id,
            config,
            oracle,
            transport,
            api,
            game_state: GameState::NotLoaded { buffered: vec![] },
            clock: None,
            resync_requested: false,
            notable_events: VecDeque::new(),
        }
    }

    pub fn game_id(&self) -> &GameId { &self.game_id }
    pub fn my_id(&self) -> &PlayerId { &self.my_id }
    pub fn config(&self) -> &SyncConfig { &self.config }
    pub fn clock(&self) -> Option<&ClockState> { self.clock.as_ref() }
    pub fn transport(&self) -> &dyn Transport { self.transport.as_ref() }
    pub fn transport_mut(&mut self) -> &mut dyn Transport { self.transport.as_mut() }

    pub fn game(&self) -> Option<&AlteredGame> {
        match &self.game_state {
            GameState::Ready(game) => Some(game),
            GameState::NotLoaded { .. } => None,
        }
    }
    pub fn game_mut(&mut self) -> Option<&mut AlteredGame> {
        match &mut self.game_state {
            GameState::Ready(game) => Some(game),
            GameState::NotLoaded { .. } => None,
        }
    }

    pub fn next_notable_event(&mut self) -> Option<NotableEvent> {
        self.notable_events.pop_front()
    }

    // Subscribes to game topics, fetches the game and replays whatever arrived in the meantime.
    pub async fn load(&mut self, now: Instant) {
        for topic in [network::moves_topic(&self.game_id), network::clock_topic(&self.game_id)] {
            if let Err(err) = self.transport.subscribe(&topic) {
                warn!("Cannot subscribe to {topic}: {err}");
            }
        }
        let fetched = match self.api.fetch_game(&self.game_id).await {
            Ok(snapshot) => match self.api.fetch_moves(&self.game_id).await {
                Ok(log) => Ok((snapshot, log)),
                Err(err) => Err(err.to_string()),
            },
            Err(err) => Err(err.to_string()),
        };
        let my_force =
            fetched.as_ref().ok().map(|(snapshot, _)| snapshot.force_of(self.my_id.as_str()));
        let session = GameSession::new(
            self.game_id.clone(),
            self.my_id.clone(),
            my_force.flatten().unwrap_or(Force::White),
        );
        let mut game = AlteredGame::new(Rc::clone(&self.oracle), session, self.config.clone());
        game.set_connection_state(self.transport.connection_state());
        let (snapshot, log) = match (fetched, my_force) {
            (Ok(fetched), Some(Some(_))) => fetched,
            (Ok(_), _) => {
                self.go_offline(game, format!("{} is not playing in this game", self.my_id));
                return;
            }
            (Err(err), _) => {
                self.go_offline(game, err);
                return;
            }
        };

        let report = game.finish_loading(&snapshot, &log);
        let GameState::NotLoaded { buffered } =
            std::mem::replace(&mut self.game_state, GameState::Ready(game))
        else {
            log_internal_error!("game {} loaded twice", self.game_id);
            return;
        };
        self.notable_events.push_back(NotableEvent::GameLoaded);
        self.report_sync(report);
        self.note_position_change(true, true, now);
        for (topic, payload) in buffered {
            if let Err(err) = self.process_message(&topic, &payload, now) {
                warn!("Dropping buffered message on {topic}: {err:?}");
            }
        }
    }

    pub fn make_move(
        &mut self, candidate: MoveCandidate, now: Instant,
    ) -> Result<LocalMoveOutcome, LocalMoveError> {
        let GameState::Ready(game) = &mut self.game_state else {
            return Err(LocalMoveError::NotLive(SyncPhase::Loading));
        };
        let was_active = game.status().is_active();
        let mut outcome = game.submit_local_move(candidate, now)?;
        if let LocalMoveOutcome::Sent(submission) = &outcome {
            if let Err(err) = self.publish_move(submission) {
                warn!("Cannot send move: {err}");
                if let GameState::Ready(game) = &mut self.game_state {
                    game.mark_unsent();
                }
                outcome = LocalMoveOutcome::Unconfirmed;
            }
        }
        match outcome {
            LocalMoveOutcome::Unconfirmed => {
                self.notable_events.push_back(NotableEvent::MoveUnconfirmed)
            }
            LocalMoveOutcome::PromotionRequired => return Ok(outcome),
            LocalMoveOutcome::Sent(_) | LocalMoveOutcome::LocalOnly => {}
        }
        self.note_position_change(was_active, true, now);
        Ok(outcome)
    }

    pub fn process_message(
        &mut self, topic: &str, payload: &str, now: Instant,
    ) -> Result<(), EventError> {
        let game = match &mut self.game_state {
            GameState::Ready(game) => game,
            GameState::NotLoaded { buffered } => {
                buffered.push((topic.to_owned(), payload.to_owned()));
                return Ok(());
            }
        };
        if topic == network::moves_topic(&self.game_id) {
            let notification: MoveNotification = network::parse_obj(payload)
                .map_err(|err| EventError::BadPayload(format!("{err}: {payload}")))?;
            let was_active = game.status().is_active();
            match game.apply_remote_move(&notification) {
                Ok(outcome) => {
                    let moved = self.process_remote_move_outcome(outcome);
                    self.note_position_change(was_active, moved, now);
                    Ok(())
                }
                Err(RemoteMoveError::NotLoaded) => Err(EventError::CannotApplyEvent(
                    "game is not loaded".to_owned(),
                )),
                Err(RemoteMoveError::Unrecognized(notation)) => {
                    self.request_resync();
                    Err(EventError::CannotApplyEvent(format!("unrecognized move {notation}")))
                }
            }
        } else if topic == network::clock_topic(&self.game_id) {
            let update: ClockUpdate = network::parse_obj(payload)
                .map_err(|err| EventError::BadPayload(format!("{err}: {payload}")))?;
            self.process_clock_update(update, now);
            Ok(())
        } else {
            Err(EventError::UnknownTopic(topic.to_owned()))
        }
    }

    pub fn set_connection_state(&mut self, state: ConnectionState) {
        let previous = self.game().map(|game| game.session().connection_state);
        if let Some(game) = self.game_mut() {
            game.set_connection_state(state);
        }
        if state == ConnectionState::Connected && previous == Some(ConnectionState::Disconnected) {
            info!("Reconnected to game {}", self.game_id);
            self.request_resync();
        }
    }

    // Periodic housekeeping: a move that the server never echoed is a reason to resync.
    pub fn tick(&mut self, now: Instant) {
        let timeout = self.config.pending_move_timeout;
        if let Some(game) = self.game() {
            if game.pending_is_stale(now, timeout) {
                warn!("No echo for pending move after {timeout:?}");
                self.request_resync();
            }
        }
        if let Some(clock) = &mut self.clock {
            // The server decides when time is up. Until then just stop counting.
            if clock.is_running() && clock.flagged(now).is_some() {
                clock.stop(now);
            }
        }
    }

    // Fetches the authoritative state and rebuilds local history from it.
    pub async fn resync(&mut self, now: Instant) -> Result<(), ApiError> {
        let snapshot = self.api.fetch_game(&self.game_id).await?;
        let log = self.api.fetch_moves(&self.game_id).await?;
        let GameState::Ready(game) = &mut self.game_state else {
            return Ok(());
        };
        let was_active = game.status().is_active();
        let report = game.rebuild_from_server(&snapshot, &log, now);
        self.resync_requested = false;
        self.notable_events.push_back(NotableEvent::Resynced);
        self.report_sync(report);
        self.note_position_change(was_active, true, now);
        Ok(())
    }

    pub async fn resign(&mut self, now: Instant) -> Result<(), ResignError> {
        let Some(game) = self.game() else {
            return Err(ResignError::NotLoaded);
        };
        if !game.status().is_active() {
            return Ok(());
        }
        if !game.session().is_offline() {
            self.api.resign(&self.game_id, &self.my_id).await?;
        }
        if let Some(game) = self.game_mut() {
            if game.resign() {
                let status = game.status().clone();
                self.clock_stopped(now);
                self.notable_events.push_back(NotableEvent::GameOver(status));
            }
        }
        Ok(())
    }

    fn go_offline(&mut self, mut game: AlteredGame, reason: String) {
        error!("Cannot load game {}: {reason}", self.game_id);
        game.fall_back_to_offline(reason.clone());
        self.game_state = GameState::Ready(game);
        self.notable_events.push_back(NotableEvent::LoadFailed(reason));
    }

    fn publish_move(&mut self, submission: &MoveSubmission) -> Result<(), network::CommunicationError> {
        let topic = network::moves_topic(&self.game_id);
        network::write_obj(self.transport.as_mut(), &topic, submission)
    }

    fn request_resync(&mut self) {
        if !self.resync_requested {
            self.resync_requested = true;
            self.notable_events.push_back(NotableEvent::ResyncRequired);
        }
    }

    fn report_desync(&mut self, desync: Option<Desync>) {
        if let Some(desync) = desync {
            self.notable_events
                .push_back(NotableEvent::DesyncDetected { persistent: desync.persistent });
            if desync.persistent {
                self.request_resync();
            }
        }
    }

    fn report_sync(&mut self, report: SyncReport) {
        if let Some(err) = &report.replay_error {
            warn!("Server move log of {} could not be replayed: {err}", self.game_id);
        }
        self.report_desync(report.desync);
        if let Some(submission) = report.resubmit {
            if let Err(err) = self.publish_move(&submission) {
                warn!("Cannot resubmit move: {err}");
                if let Some(game) = self.game_mut() {
                    game.mark_unsent();
                }
            }
        }
        if let Some(dropped) = report.dropped {
            self.notable_events.push_back(NotableEvent::LocalMoveDiscarded(dropped.notation));
        }
    }

    // Returns whether the live position changed.
    fn process_remote_move_outcome(&mut self, outcome: RemoteMoveOutcome) -> bool {
        match outcome {
            RemoteMoveOutcome::Ignored | RemoteMoveOutcome::Duplicate => false,
            RemoteMoveOutcome::Confirmed { desync } => {
                self.notable_events.push_back(NotableEvent::MoveConfirmed);
                let corrected = desync.is_some();
                self.report_desync(desync);
                corrected
            }
            RemoteMoveOutcome::OpponentMoved { desync, .. } => {
                self.notable_events.push_back(NotableEvent::OpponentMoved);
                self.report_desync(desync);
                true
            }
            RemoteMoveOutcome::PendingDiscarded { discarded, desync } => {
                self.notable_events.push_back(NotableEvent::LocalMoveDiscarded(discarded.notation));
                self.notable_events.push_back(NotableEvent::OpponentMoved);
                self.report_desync(desync);
                true
            }
        }
    }

    fn process_clock_update(&mut self, update: ClockUpdate, now: Instant) {
        self.clock = Some(ClockState::from_update(&update, now));
        self.notable_events.push_back(NotableEvent::ClockUpdated);
        let Some(flagged) = update.flagged_force() else {
            return;
        };
        if let Some(game) = self.game_mut() {
            if game.timeout(flagged.opponent()) {
                let status = game.status().clone();
                self.clock_stopped(now);
                self.notable_events.push_back(NotableEvent::GameOver(status));
            }
        }
    }

    // Emits game-over events, and check events if the live position changed.
    fn note_position_change(&mut self, was_active: bool, moved: bool, now: Instant) {
        let Some(game) = self.game() else {
            return;
        };
        let status = game.status().clone();
        if was_active && !status.is_active() {
            self.clock_stopped(now);
            self.notable_events.push_back(NotableEvent::GameOver(status));
        } else if moved && status.is_active() && game.live_status().is_check {
            let in_check = game.live_position().active_force();
            self.notable_events.push_back(NotableEvent::Check(in_check));
        }
    }

    fn clock_stopped(&mut self, now: Instant) {
        if let Some(clock) = &mut self.clock {
            clock.stop(now);
        }
    }
}

impl From<ApiError> for ResignError {
    fn from(err: ApiError) -> Self { ResignError::Api(err) }
}

impl fmt::Display for ResignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResignError::NotLoaded => write!(f, "game is not loaded yet"),
            ResignError::Api(err) => write!(f, "{err}"),
        }
    }
}
