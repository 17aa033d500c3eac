// In-process stand-in for the game server and the message broker. Validates moves with the same
// rules oracle as clients, keeps the authoritative move log and fans notifications out to
// subscribers. Messages are queued per client and delivered when the owner drains them, which
// makes any interleaving reproducible.
//
// Used by tests and by the console `play` command.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::api::{ApiError, GameApi};
use crate::chess_move::MoveCandidate;
use crate::event::{
    ClockUpdate, GAME_STATUS_IN_PROGRESS, GameSnapshot, MoveLogEntry, MoveNotification,
    MoveSubmission,
};
use crate::force::Force;
use crate::network::{self, Transport, TransportError};
use crate::position::Position;
use crate::rules::RulesOracle;
use crate::session::{ConnectionState, GameId, PlayerId};


pub const GAME_STATUS_FINISHED: &str = "FINISHED";

pub type ClientId = usize;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ServerOptions {
    // Real servers may not echo the correlation id; clients must cope.
    pub echo_request_ids: bool,
}

impl Default for ServerOptions {
    fn default() -> Self { ServerOptions { echo_request_ids: true } }
}

struct ServerGame {
    white: PlayerId,
    black: PlayerId,
    position: Position,
    moves: Vec<MoveLogEntry>,
    status: String,
    result: Option<String>,
    end_reason: Option<String>,
}

struct ClientConnection {
    player_id: PlayerId,
    connected: bool,
    subscriptions: HashSet<String>,
    inbox: VecDeque<(String, String)>,
    // Number of upcoming notifications to lose, for simulating an unreliable channel.
    drop_next: usize,
}

struct ServerState {
    oracle: Rc<dyn RulesOracle>,
    options: ServerOptions,
    games: HashMap<GameId, ServerGame>,
    clients: Vec<ClientConnection>,
    api_available: bool,
}

#[derive(Clone)]
pub struct LoopbackServer {
    state: Rc<RefCell<ServerState>>,
}

pub struct LoopbackTransport {
    client_id: ClientId,
    server: LoopbackServer,
}

impl LoopbackServer {
    pub fn new(oracle: Rc<dyn RulesOracle>, options: ServerOptions) -> Self {
        LoopbackServer {
            state: Rc::new(RefCell::new(ServerState {
                oracle,
                options,
                games: HashMap::new(),
                clients: vec![],
                api_available: true,
            })),
        }
    }

    pub fn create_game(&self, game_id: GameId, white: PlayerId, black: PlayerId) {
        self.create_game_from(game_id, white, black, Position::initial());
    }

    pub fn create_game_from(
        &self, game_id: GameId, white: PlayerId, black: PlayerId, position: Position,
    ) {
        let game = ServerGame {
            white,
            black,
            position,
            moves: vec![],
            status: GAME_STATUS_IN_PROGRESS.to_owned(),
            result: None,
            end_reason: None,
        };
        self.state.borrow_mut().games.insert(game_id, game);
    }

    pub fn connect(&self, player_id: PlayerId) -> LoopbackTransport {
        let mut state = self.state.borrow_mut();
        state.clients.push(ClientConnection {
            player_id,
            connected: true,
            subscriptions: HashSet::new(),
            inbox: VecDeque::new(),
            drop_next: 0,
        });
        LoopbackTransport { client_id: state.clients.len() - 1, server: self.clone() }
    }

    // While disconnected a client neither sends nor receives. Messages are not replayed later.
    pub fn set_connected(&self, client_id: ClientId, connected: bool) {
        if let Some(client) = self.state.borrow_mut().clients.get_mut(client_id) {
            client.connected = connected;
            if !connected {
                client.inbox.clear();
            }
        }
    }

    pub fn drop_next_notifications(&self, client_id: ClientId, count: usize) {
        if let Some(client) = self.state.borrow_mut().clients.get_mut(client_id) {
            client.drop_next = count;
        }
    }

    pub fn set_api_available(&self, available: bool) {
        self.state.borrow_mut().api_available = available;
    }

    pub fn take_messages(&self, client_id: ClientId) -> Vec<(String, String)> {
        self.state
            .borrow_mut()
            .clients
            .get_mut(client_id)
            .map(|client| client.inbox.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn position(&self, game_id: &GameId) -> Option<Position> {
        self.state.borrow().games.get(game_id).map(|game| game.position.clone())
    }

    pub fn move_log(&self, game_id: &GameId) -> Vec<MoveLogEntry> {
        self.state.borrow().games.get(game_id).map(|game| game.moves.clone()).unwrap_or_default()
    }

    // Applies a move as if `player_id` had submitted it, bypassing the transport.
    pub fn play_as(&self, game_id: &GameId, player_id: &PlayerId, candidate: MoveCandidate) -> bool {
        let submission = MoveSubmission {
            from: candidate.from,
            to: candidate.to,
            promotion: candidate.promotion,
            request_id: None,
        };
        self.state.borrow_mut().apply_submission(game_id, player_id, &submission)
    }

    pub fn send_clock(&self, game_id: &GameId, update: ClockUpdate) {
        let mut state = self.state.borrow_mut();
        if update.flagged_force().is_some() {
            if let Some(game) = state.games.get_mut(game_id) {
                if game.status == GAME_STATUS_IN_PROGRESS {
                    let winner = update.flagged_force().map(Force::opponent);
                    game.finish(winner_result(winner), "Timeout");
                }
            }
        }
        match serde_json::to_string(&update) {
            Ok(payload) => state.broadcast(&network::clock_topic(game_id), &payload),
            Err(err) => warn!("Cannot serialize clock update: {err}"),
        }
    }
}

impl ServerState {
    fn handle_publish(
        &mut self, client_id: ClientId, topic: &str, payload: &str,
    ) -> Result<(), TransportError> {
        let client = self.clients.get(client_id).ok_or(TransportError::NotConnected)?;
        if !client.connected {
            return Err(TransportError::NotConnected);
        }
        let player_id = client.player_id.clone();
        let Some(game_id) = self
            .games
            .keys()
            .find(|id| network::moves_topic(id) == topic)
            .cloned()
        else {
            return Err(TransportError::Rejected(format!("unknown topic {topic}")));
        };
        let submission: MoveSubmission = network::parse_obj(payload)
            .map_err(|err| TransportError::Rejected(err.to_string()))?;
        // Like a real broker: publishing succeeds even if the server then refuses the move.
        self.apply_submission(&game_id, &player_id, &submission);
        Ok(())
    }

    fn apply_submission(
        &mut self, game_id: &GameId, player_id: &PlayerId, submission: &MoveSubmission,
    ) -> bool {
        let oracle = Rc::clone(&self.oracle);
        let echo_request_ids = self.options.echo_request_ids;
        let Some(game) = self.games.get_mut(game_id) else {
            warn!("Move for unknown game {game_id}");
            return false;
        };
        if game.status != GAME_STATUS_IN_PROGRESS {
            debug!("Move after game end in {game_id}");
            return false;
        }
        let to_move = game.position.active_force();
        let mover = match to_move {
            Force::White => &game.white,
            Force::Black => &game.black,
        };
        if mover != player_id {
            debug!("{player_id} moved out of turn in {game_id}");
            return false;
        }
        let candidate = MoveCandidate {
            from: submission.from,
            to: submission.to,
            promotion: submission.promotion,
        };
        let applied = match oracle.apply_move(&game.position, candidate) {
            Ok(applied) => applied,
            Err(err) => {
                info!("Rejected {candidate:?} in {game_id}: {err}");
                return false;
            }
        };
        let status = oracle.status(&applied.position).unwrap_or_default();
        game.moves.push(MoveLogEntry {
            algebraic_notation: applied.chess_move.notation.clone(),
            move_number: game.position.fullmove_number(),
        });
        game.position = applied.position.clone();
        if status.is_checkmate {
            game.finish(winner_result(Some(to_move)), "Checkmate");
        } else if status.is_stalemate {
            game.finish("DRAW".to_owned(), "Stalemate");
        }
        let notification = MoveNotification {
            algebraic_notation: applied.chess_move.notation.clone(),
            fen: applied.position.fen().to_owned(),
            is_check: status.is_check,
            is_checkmate: status.is_checkmate,
            is_stalemate: status.is_stalemate,
            from: Some(applied.chess_move.from),
            to: Some(applied.chess_move.to),
            captured_piece: applied.chess_move.captured_piece,
            request_id: if echo_request_ids { submission.request_id.clone() } else { None },
        };
        match serde_json::to_string(&notification) {
            Ok(payload) => self.broadcast(&network::moves_topic(game_id), &payload),
            Err(err) => warn!("Cannot serialize notification: {err}"),
        }
        true
    }

    fn broadcast(&mut self, topic: &str, payload: &str) {
        for client in self.clients.iter_mut() {
            if !client.connected || !client.subscriptions.contains(topic) {
                continue;
            }
            if client.drop_next > 0 {
                client.drop_next -= 1;
                debug!("Dropping message to {} on {topic}", client.player_id);
                continue;
            }
            client.inbox.push_back((topic.to_owned(), payload.to_owned()));
        }
    }

    fn snapshot(&self, game_id: &GameId) -> Result<GameSnapshot, ApiError> {
        if !self.api_available {
            return Err(ApiError::Network("connection refused".to_owned()));
        }
        let game = self.games.get(game_id).ok_or(ApiError::NotFound)?;
        Ok(GameSnapshot {
            id: game_id.to_string(),
            white_player_id: game.white.to_string(),
            black_player_id: game.black.to_string(),
            current_fen: game.position.fen().to_owned(),
            status: game.status.clone(),
            result: game.result.clone(),
            end_reason: game.end_reason.clone(),
        })
    }
}

impl ServerGame {
    fn finish(&mut self, result: String, end_reason: &str) {
        self.status = GAME_STATUS_FINISHED.to_owned();
        self.result = Some(result);
        self.end_reason = Some(end_reason.to_owned());
    }
}

fn winner_result(winner: Option<Force>) -> String {
    match winner {
        Some(Force::White) => "WHITE_WINS".to_owned(),
        Some(Force::Black) => "BLACK_WINS".to_owned(),
        None => "DRAW".to_owned(),
    }
}

#[async_trait(?Send)]
impl GameApi for LoopbackServer {
    async fn fetch_game(&self, game_id: &GameId) -> Result<GameSnapshot, ApiError> {
        self.state.borrow().snapshot(game_id)
    }

    async fn fetch_moves(&self, game_id: &GameId) -> Result<Vec<MoveLogEntry>, ApiError> {
        let state = self.state.borrow();
        if !state.api_available {
            return Err(ApiError::Network("connection refused".to_owned()));
        }
        let game = state.games.get(game_id).ok_or(ApiError::NotFound)?;
        Ok(game.moves.clone())
    }

    async fn resign(&self, game_id: &GameId, player_id: &PlayerId) -> Result<(), ApiError> {
        let mut state = self.state.borrow_mut();
        if !state.api_available {
            return Err(ApiError::Network("connection refused".to_owned()));
        }
        let game = state.games.get_mut(game_id).ok_or(ApiError::NotFound)?;
        let winner = if *player_id == game.white {
            Force::Black
        } else if *player_id == game.black {
            Force::White
        } else {
            return Err(ApiError::Server {
                status: 403,
                message: format!("{player_id} is not playing"),
            });
        };
        if game.status == GAME_STATUS_IN_PROGRESS {
            game.finish(winner_result(Some(winner)), "Resignation");
        }
        Ok(())
    }
}

impl LoopbackTransport {
    pub fn client_id(&self) -> ClientId { self.client_id }
}

impl Transport for LoopbackTransport {
    fn connection_state(&self) -> ConnectionState {
        let connected = self
            .server
            .state
            .borrow()
            .clients
            .get(self.client_id)
            .is_some_and(|client| client.connected);
        if connected { ConnectionState::Connected } else { ConnectionState::Disconnected }
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let mut state = self.server.state.borrow_mut();
        let client = state.clients.get_mut(self.client_id).ok_or(TransportError::NotConnected)?;
        client.subscriptions.insert(topic.to_owned());
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) {
        if let Some(client) = self.server.state.borrow_mut().clients.get_mut(self.client_id) {
            client.subscriptions.remove(topic);
        }
    }

    fn publish(&mut self, topic: &str, payload: String) -> Result<(), TransportError> {
        self.server.state.borrow_mut().handle_publish(self.client_id, topic, &payload)
    }
}
