// Improvement potential. Cover clocks that keep running between server updates with a mock clock
//   shared by the server and the clients.

mod common;

use std::ops;
use std::rc::Rc;
use std::time::Duration;

use chess_sync::altered_game::{LocalMoveError, LocalMoveOutcome, SyncPhase};
use chess_sync::chess_move::MoveCandidate;
use chess_sync::client::{ClientState, EventError, NotableEvent, ResignError};
use chess_sync::config::SyncConfig;
use chess_sync::event::{ClockUpdate, MoveNotification};
use chess_sync::force::Force;
use chess_sync::history::Confirmation;
use chess_sync::loopback::{ClientId, LoopbackServer, ServerOptions};
use chess_sync::network::{self, Transport};
use chess_sync::rules::StandardRules;
use chess_sync::session::{ConnectionState, GameId, GameStatus, PlayerId, VictoryReason};
use chess_sync::test_util::{history_from_log, sample_game_id, sample_players};
use common::*;
use instant::Instant;
use pretty_assertions::assert_eq;
use Force::{Black, White};


#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct TestClientId(usize);

struct TestClient {
    state: ClientState,
    connection: ClientId,
}

impl TestClient {
    fn events(&mut self) -> Vec<NotableEvent> {
        std::iter::from_fn(|| self.state.next_notable_event()).collect()
    }

    fn history_notations(&self) -> Vec<String> {
        let game = self.state.game().unwrap();
        game.history().entries().iter().map(|e| e.chess_move.notation.clone()).collect()
    }
}

struct World {
    server: LoopbackServer,
    clients: Vec<TestClient>,
    game_id: GameId,
    creation_instant: Instant,
    time_elapsed: Duration,
}

impl World {
    fn new() -> Self { Self::with_options(ServerOptions::default()) }

    fn with_options(options: ServerOptions) -> Self {
        let server = LoopbackServer::new(Rc::new(StandardRules::new()), options);
        let game_id = sample_game_id();
        let players = sample_players();
        server.create_game(game_id.clone(), players[White].clone(), players[Black].clone());
        World {
            server,
            clients: vec![],
            game_id,
            creation_instant: Instant::now(),
            time_elapsed: Duration::ZERO,
        }
    }

    fn set_time(&mut self, time: Duration) { self.time_elapsed = time; }
    fn now(&self) -> Instant { self.creation_instant + self.time_elapsed }

    fn new_client(&mut self, player: &PlayerId, config: SyncConfig) -> TestClientId {
        let transport = self.server.connect(player.clone());
        let connection = transport.client_id();
        let state = ClientState::new(
            self.game_id.clone(),
            player.clone(),
            config,
            Rc::new(StandardRules::new()),
            Box::new(transport),
            Rc::new(self.server.clone()),
        );
        self.clients.push(TestClient { state, connection });
        TestClientId(self.clients.len() - 1)
    }

    async fn load(&mut self, id: TestClientId) {
        let now = self.now();
        self[id].state.load(now).await;
    }

    // Loads both players and discards the load events.
    async fn default_clients(&mut self) -> (TestClientId, TestClientId) {
        self.default_clients_with_config(SyncConfig::default()).await
    }

    async fn default_clients_with_config(
        &mut self, config: SyncConfig,
    ) -> (TestClientId, TestClientId) {
        let players = sample_players();
        let alice = self.new_client(&players[White], config.clone());
        let bob = self.new_client(&players[Black], config);
        for id in [alice, bob] {
            self.load(id).await;
            assert_eq!(self[id].events(), vec![NotableEvent::GameLoaded]);
        }
        (alice, bob)
    }

    fn make_move(
        &mut self, id: TestClientId, candidate: MoveCandidate,
    ) -> Result<LocalMoveOutcome, LocalMoveError> {
        let now = self.now();
        self[id].state.make_move(candidate, now)
    }

    fn disconnect(&mut self, id: TestClientId) {
        self.server.set_connected(self[id].connection, false);
        self[id].state.set_connection_state(ConnectionState::Disconnected);
    }

    fn reconnect(&mut self, id: TestClientId) {
        self.server.set_connected(self[id].connection, true);
        self[id].state.set_connection_state(ConnectionState::Connected);
    }

    async fn resync(&mut self, id: TestClientId) {
        let now = self.now();
        self[id].state.resync(now).await.unwrap();
    }

    fn deliver(&mut self, id: TestClientId) -> Result<(), EventError> {
        let now = self.now();
        let messages = self.server.take_messages(self[id].connection);
        for (topic, payload) in messages {
            self[id].state.process_message(&topic, &payload, now)?;
        }
        Ok(())
    }

    fn deliver_all(&mut self) {
        for i in 0..self.clients.len() {
            self.deliver(TestClientId(i)).unwrap();
        }
    }

    fn server_notations(&self) -> Vec<String> {
        self.server
            .move_log(&self.game_id)
            .into_iter()
            .map(|entry| entry.algebraic_notation)
            .collect()
    }
}

impl ops::Index<TestClientId> for World {
    type Output = TestClient;
    fn index(&self, id: TestClientId) -> &Self::Output { &self.clients[id.0] }
}
impl ops::IndexMut<TestClientId> for World {
    fn index_mut(&mut self, id: TestClientId) -> &mut Self::Output { &mut self.clients[id.0] }
}

fn clock_update(white_ms: i64, black_ms: i64, current_turn: Force) -> ClockUpdate {
    ClockUpdate { white_time_ms: white_ms, black_time_ms: black_ms, current_turn }
}


#[async_std::test]
async fn play_online_until_checkmate() {
    let mut world = World::new();
    let (alice, bob) = world.default_clients().await;

    assert!(matches!(world.make_move(alice, mv!(F2 -> F3)), Ok(LocalMoveOutcome::Sent(_))));
    world.deliver_all();
    assert_eq!(world[alice].events(), vec![NotableEvent::MoveConfirmed]);
    assert_eq!(world[bob].events(), vec![NotableEvent::OpponentMoved]);

    world.make_move(bob, mv!(E7 -> E5)).unwrap();
    world.deliver_all();
    world.make_move(alice, mv!(G2 -> G4)).unwrap();
    world.deliver_all();
    world[alice].events();
    world[bob].events();

    world.make_move(bob, mv!(D8 -> H4)).unwrap();
    let mate = GameStatus::Victory(Black, VictoryReason::Checkmate);
    assert_eq!(world[bob].events(), vec![NotableEvent::GameOver(mate.clone())]);
    world.deliver_all();
    assert_eq!(world[bob].events(), vec![]);
    assert_eq!(
        world[alice].events(),
        vec![NotableEvent::OpponentMoved, NotableEvent::GameOver(mate.clone())]
    );

    let server_position = world.server.position(&world.game_id).unwrap();
    for id in [alice, bob] {
        let game = world[id].state.game().unwrap();
        assert_eq!(game.status(), &mate);
        assert_eq!(game.phase(), SyncPhase::Terminal);
        assert_eq!(game.live_position(), &server_position);
        assert!(game.pending().is_none());
        assert!(game.history().entries().iter().all(|e| e.confirmation == Confirmation::Confirmed));
        assert_eq!(world[id].history_notations(), vec!["f3", "e5", "g4", "Qh4#"]);
    }
    assert_eq!(world.make_move(alice, mv!(E2 -> E4)), Err(LocalMoveError::GameOver));
}

#[async_std::test]
async fn check_is_announced_once() {
    let mut world = World::new();
    let (alice, bob) = world.default_clients().await;
    world.make_move(alice, mv!(E2 -> E4)).unwrap();
    world.deliver_all();
    world.make_move(bob, mv!(F7 -> F6)).unwrap();
    world.deliver_all();
    world[alice].events();
    world[bob].events();

    world.make_move(alice, mv!(D1 -> H5)).unwrap();
    assert_eq!(world[alice].events(), vec![NotableEvent::Check(Black)]);
    world.deliver_all();
    assert_eq!(world[alice].events(), vec![NotableEvent::MoveConfirmed]);
    assert_eq!(world[bob].events(), vec![NotableEvent::OpponentMoved, NotableEvent::Check(Black)]);
}

#[async_std::test]
async fn works_without_request_id_echo() {
    let mut world = World::with_options(ServerOptions { echo_request_ids: false });
    let (alice, bob) = world.default_clients().await;
    world.make_move(alice, mv!(E2 -> E4)).unwrap();
    world.deliver_all();
    assert_eq!(world[alice].events(), vec![NotableEvent::MoveConfirmed]);
    world.make_move(bob, mv!(E7 -> E5)).unwrap();
    world.deliver_all();
    assert_eq!(world[bob].events(), vec![NotableEvent::MoveConfirmed]);
    assert_eq!(world[alice].events(), vec![NotableEvent::OpponentMoved]);
    assert_eq!(world[alice].history_notations(), world.server_notations());
}

#[async_std::test]
async fn opponent_move_while_reviewing_history() {
    let mut world = World::new();
    let (alice, bob) = world.default_clients().await;
    for (id, candidate) in [(alice, mv!(E2 -> E4)), (bob, mv!(E7 -> E5)), (alice, mv!(G1 -> F3))] {
        world.make_move(id, candidate).unwrap();
        world.deliver_all();
    }
    let game = world[bob].state.game_mut().unwrap();
    game.go_to_ply(None);
    assert_eq!(world.make_move(bob, mv!(B8 -> C6)), Err(LocalMoveError::ViewingHistory));

    // Black moves from another device.
    let players = sample_players();
    let game_id = world.game_id.clone();
    world.server.play_as(&game_id, &players[Black], mv!(B8 -> C6));
    world.deliver_all();
    let game = world[bob].state.game_mut().unwrap();
    assert_eq!(game.history().cursor(), None);
    assert_eq!(game.phase(), SyncPhase::ViewingHistory);
    game.resume_to_live();
    assert_eq!(game.phase(), SyncPhase::Live);
    assert_eq!(world[bob].history_notations(), vec!["e4", "e5", "Nf3", "Nc6"]);
}

#[async_std::test]
async fn lost_echo_implied_by_reply() {
    let mut world = World::new();
    let (alice, bob) = world.default_clients().await;
    world.server.drop_next_notifications(world[alice].connection, 1);
    world.make_move(alice, mv!(E2 -> E4)).unwrap();
    world.deliver_all();
    assert_eq!(world[alice].events(), vec![]);
    assert!(world[alice].state.game().unwrap().pending().is_some());

    world.make_move(bob, mv!(C7 -> C5)).unwrap();
    world.deliver_all();
    assert_eq!(world[alice].events(), vec![NotableEvent::OpponentMoved]);
    let game = world[alice].state.game().unwrap();
    assert!(game.pending().is_none());
    assert_eq!(world[alice].history_notations(), vec!["e4", "c5"]);
}

#[async_std::test]
async fn lost_echo_triggers_resync() {
    let mut world = World::new();
    let (alice, _bob) = world.default_clients().await;
    world.server.drop_next_notifications(world[alice].connection, 1);
    world.make_move(alice, mv!(E2 -> E4)).unwrap();
    world.deliver_all();

    world.set_time(Duration::from_secs(5));
    let now = world.now();
    world[alice].state.tick(now);
    assert_eq!(world[alice].events(), vec![]);

    world.set_time(Duration::from_secs(11));
    let now = world.now();
    world[alice].state.tick(now);
    world[alice].state.tick(now);
    assert_eq!(world[alice].events(), vec![NotableEvent::ResyncRequired]);

    world.resync(alice).await;
    assert_eq!(world[alice].events(), vec![NotableEvent::Resynced]);
    let game = world[alice].state.game().unwrap();
    assert!(game.pending().is_none());
    assert_eq!(game.history().entries()[0].confirmation, Confirmation::Confirmed);
    assert_eq!(game.live_position(), &world.server.position(&world.game_id).unwrap());
}

#[async_std::test]
async fn move_made_while_disconnected_is_sent_after_reconnect() {
    let mut world = World::new();
    let (alice, bob) = world.default_clients().await;
    world.disconnect(alice);
    assert_eq!(world.make_move(alice, mv!(E2 -> E4)), Ok(LocalMoveOutcome::Unconfirmed));
    assert_eq!(world[alice].events(), vec![NotableEvent::MoveUnconfirmed]);
    assert!(world.server_notations().is_empty());

    world.reconnect(alice);
    assert_eq!(world[alice].events(), vec![NotableEvent::ResyncRequired]);
    world.resync(alice).await;
    assert_eq!(world[alice].events(), vec![NotableEvent::Resynced]);
    assert_eq!(world.server_notations(), vec!["e4"]);

    world.deliver_all();
    assert_eq!(world[alice].events(), vec![NotableEvent::MoveConfirmed]);
    assert_eq!(world[bob].events(), vec![NotableEvent::OpponentMoved]);
}

#[async_std::test]
async fn failed_publish_keeps_move_locally() {
    let mut world = World::new();
    let (alice, _bob) = world.default_clients().await;
    // The broker is gone but the client doesn't know it yet.
    world.server.set_connected(world[alice].connection, false);
    assert_eq!(world.make_move(alice, mv!(D2 -> D4)), Ok(LocalMoveOutcome::Unconfirmed));
    assert_eq!(world[alice].events(), vec![NotableEvent::MoveUnconfirmed]);
    let game = world[alice].state.game().unwrap();
    assert!(game.pending().is_none());
    assert_eq!(game.history().entries()[0].confirmation, Confirmation::Unsent);

    world.server.set_connected(world[alice].connection, true);
    world.resync(alice).await;
    world.deliver_all();
    assert_eq!(world.server_notations(), vec!["d4"]);
    assert_eq!(world[alice].events(), vec![NotableEvent::Resynced, NotableEvent::MoveConfirmed]);
}

#[async_std::test]
async fn persistent_desync_requests_resync() {
    let mut world = World::new();
    let config = SyncConfig { max_consecutive_desyncs: 0, ..SyncConfig::default() };
    let (alice, _bob) = world.default_clients_with_config(config).await;
    world.make_move(alice, mv!(E2 -> E4)).unwrap();
    world.deliver_all();
    world[alice].events();

    // A reply the server never made: the position doesn't match the notation.
    let wrong = history_from_log(&StandardRules, "e4 c5").unwrap().live_position().clone();
    let game = world[alice].state.game().unwrap();
    let mut bogus: MoveNotification = opponent_move(game, "e5");
    bogus.fen = wrong.fen().to_owned();
    let payload = serde_json::to_string(&bogus).unwrap();
    let topic = network::moves_topic(&world.game_id);
    let now = world.now();
    world[alice].state.process_message(&topic, &payload, now).unwrap();
    assert_eq!(
        world[alice].events(),
        vec![
            NotableEvent::OpponentMoved,
            NotableEvent::DesyncDetected { persistent: true },
            NotableEvent::ResyncRequired,
        ]
    );
    assert_eq!(world[alice].state.game().unwrap().live_position(), &wrong);

    world.resync(alice).await;
    assert_eq!(world[alice].history_notations(), vec!["e4"]);
    let game = world[alice].state.game().unwrap();
    assert_eq!(game.live_position(), &world.server.position(&world.game_id).unwrap());
    assert_eq!(game.consecutive_desyncs(), 0);
}

#[async_std::test]
async fn bad_messages() {
    let mut world = World::new();
    let (alice, _bob) = world.default_clients().await;
    let now = world.now();
    let topic = network::moves_topic(&world.game_id);
    assert!(matches!(
        world[alice].state.process_message(&topic, "not json", now),
        Err(EventError::BadPayload(_))
    ));
    assert_eq!(
        world[alice].state.process_message("game/g-1/chat", "{}", now),
        Err(EventError::UnknownTopic("game/g-1/chat".to_owned()))
    );
    assert!(world[alice].state.game().unwrap().history().is_empty());
}

#[async_std::test]
async fn messages_before_load_are_buffered() {
    let mut world = World::new();
    let players = sample_players();
    let alice = world.new_client(&players[White], SyncConfig::default());
    world.load(alice).await;
    let bob = world.new_client(&players[Black], SyncConfig::default());
    let topic = network::moves_topic(&world.game_id);
    world[bob].state.transport_mut().subscribe(&topic).unwrap();

    world.make_move(alice, mv!(E2 -> E4)).unwrap();
    world.deliver_all();
    assert!(world[bob].state.game().is_none());

    world.load(bob).await;
    assert_eq!(world[bob].events(), vec![NotableEvent::GameLoaded]);
    assert_eq!(world[bob].history_notations(), vec!["e4"]);
    assert!(world[bob].state.game().unwrap().is_my_turn());
}

#[async_std::test]
async fn load_failure_falls_back_to_offline() {
    let mut world = World::new();
    world.server.set_api_available(false);
    let alice = world.new_client(&sample_players()[White], SyncConfig::default());
    world.load(alice).await;
    assert!(matches!(world[alice].events().as_slice(), [NotableEvent::LoadFailed(_)]));

    let game = world[alice].state.game().unwrap();
    assert!(game.session().is_offline());
    assert_eq!(game.phase(), SyncPhase::Live);
    assert_eq!(world.make_move(alice, mv!(E2 -> E4)), Ok(LocalMoveOutcome::LocalOnly));
    assert_eq!(world.make_move(alice, mv!(E7 -> E5)), Ok(LocalMoveOutcome::LocalOnly));
    assert!(world.server_notations().is_empty());
    assert_eq!(world[alice].history_notations(), vec!["e4", "e5"]);
}

#[async_std::test]
async fn spectator_plays_offline() {
    let mut world = World::new();
    let carol = world.new_client(&PlayerId::new("carol"), SyncConfig::default());
    world.load(carol).await;
    assert_eq!(
        world[carol].events(),
        vec![NotableEvent::LoadFailed("carol is not playing in this game".to_owned())]
    );
    assert!(world[carol].state.game().unwrap().session().is_offline());
}

#[async_std::test]
async fn clock_timeout_ends_game() {
    let mut world = World::new();
    let (alice, bob) = world.default_clients().await;
    let game_id = world.game_id.clone();
    world.server.send_clock(&game_id, clock_update(60_000, 30_000, White));
    world.deliver_all();
    assert_eq!(world[alice].events(), vec![NotableEvent::ClockUpdated]);
    assert_eq!(world[bob].events(), vec![NotableEvent::ClockUpdated]);
    let now = world.now();
    let clock = world[alice].state.clock().unwrap();
    assert_eq!(clock.showing_for(White, now).to_string(), "1:00");
    assert!(clock.showing_for(White, now).is_active);
    assert_eq!(clock.showing_for(Black, now).to_string(), "0:30");

    // Local expiry only stops the clock; the server has the final say.
    world.set_time(Duration::from_secs(61));
    let now = world.now();
    world[alice].state.tick(now);
    let clock = world[alice].state.clock().unwrap();
    assert!(!clock.is_running());
    assert_eq!(clock.flagged(now), Some(White));
    assert!(world[alice].state.game().unwrap().status().is_active());

    world.server.send_clock(&game_id, clock_update(0, 30_000, White));
    world.deliver_all();
    let flag = GameStatus::Victory(Black, VictoryReason::Flag);
    assert_eq!(
        world[alice].events(),
        vec![NotableEvent::ClockUpdated, NotableEvent::GameOver(flag.clone())]
    );
    assert_eq!(world[bob].state.game().unwrap().status(), &flag);
    assert_eq!(world.make_move(alice, mv!(E2 -> E4)), Err(LocalMoveError::GameOver));
}

#[async_std::test]
async fn resignation() {
    let mut world = World::new();
    let (alice, bob) = world.default_clients().await;
    world.make_move(alice, mv!(E2 -> E4)).unwrap();
    world.deliver_all();
    world[alice].events();
    world[bob].events();

    let now = world.now();
    world[alice].state.resign(now).await.unwrap();
    let resigned = GameStatus::Victory(Black, VictoryReason::Resignation);
    assert_eq!(world[alice].events(), vec![NotableEvent::GameOver(resigned.clone())]);

    // Resignation is not broadcast: the opponent learns about it on the next resync.
    world.resync(bob).await;
    assert_eq!(
        world[bob].events(),
        vec![NotableEvent::Resynced, NotableEvent::GameOver(resigned.clone())]
    );
    assert_eq!(world[bob].state.game().unwrap().phase(), SyncPhase::Terminal);
    assert_eq!(world.make_move(bob, mv!(E7 -> E5)), Err(LocalMoveError::GameOver));
}

#[async_std::test]
async fn resignation_stops_clock() {
    let mut world = World::new();
    let (alice, _bob) = world.default_clients().await;
    let game_id = world.game_id.clone();
    world.server.send_clock(&game_id, clock_update(60_000, 60_000, White));
    world.deliver_all();

    world.set_time(Duration::from_secs(10));
    let now = world.now();
    world[alice].state.resign(now).await.unwrap();
    world.set_time(Duration::from_secs(25));
    let later = world.now();
    let clock = world[alice].state.clock().unwrap();
    assert!(!clock.is_running());
    assert_eq!(clock.time_left(White, later), Duration::from_secs(50));
}

#[async_std::test]
async fn cannot_resign_before_load() {
    let mut world = World::new();
    let alice = world.new_client(&sample_players()[White], SyncConfig::default());
    let now = world.now();
    assert_eq!(world[alice].state.resign(now).await, Err(ResignError::NotLoaded));

    world.load(alice).await;
    assert_eq!(world[alice].events(), vec![NotableEvent::GameLoaded]);
    assert_eq!(world[alice].state.game().unwrap().phase(), SyncPhase::Live);
}
