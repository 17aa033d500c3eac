// Hot-seat game against the in-process server: both sides are real clients, so every move goes
// through submission, echo and reconciliation exactly as it would online.

use std::io::{self, BufRead, Write};
use std::rc::Rc;

use chess_sync::chess_move::MoveCandidate;
use chess_sync::client::{ClientState, NotableEvent};
use chess_sync::config::SyncConfig;
use chess_sync::coord::Coord;
use chess_sync::force::Force;
use chess_sync::loopback::{ClientId, LoopbackServer, ServerOptions};
use chess_sync::pgn::{self, PgnTags};
use chess_sync::piece::PieceKind;
use chess_sync::rules::{RulesOracle, StandardRules};
use chess_sync::session::ConnectionState;
use chess_sync::test_util;
use instant::Instant;
use log::warn;


const HELP: &str = "\
Commands:
  e2e4, e7e8q     move for the side to move
  back, fwd, live, goto <ply>
                  navigate White's view of the history
  drop            lose the next notification to the side not to move
  disconnect, reconnect
                  toggle White's connection
  resign          side to move resigns
  pgn             print the game
  quit";

pub struct PlayConfig {
    pub sync_config: SyncConfig,
    pub echo_request_ids: bool,
}

struct Seat {
    force: Force,
    client_id: ClientId,
    state: ClientState,
}

pub fn run(config: PlayConfig) -> anyhow::Result<()> {
    async_std::task::block_on(run_async(config))
}

async fn run_async(config: PlayConfig) -> anyhow::Result<()> {
    let oracle: Rc<dyn RulesOracle> = Rc::new(StandardRules::new());
    let server = LoopbackServer::new(
        Rc::clone(&oracle),
        ServerOptions { echo_request_ids: config.echo_request_ids },
    );
    let game_id = test_util::sample_game_id();
    let players = test_util::sample_players();
    server.create_game(
        game_id.clone(),
        players[Force::White].clone(),
        players[Force::Black].clone(),
    );

    let mut seats = vec![];
    for force in [Force::White, Force::Black] {
        let transport = server.connect(players[force].clone());
        let client_id = transport.client_id();
        let mut state = ClientState::new(
            game_id.clone(),
            players[force].clone(),
            config.sync_config.clone(),
            Rc::clone(&oracle),
            Box::new(transport),
            Rc::new(server.clone()),
        );
        state.load(Instant::now()).await;
        seats.push(Seat { force, client_id, state });
    }
    deliver(&server, &mut seats).await;
    println!("{HELP}");

    let stdin = io::stdin();
    loop {
        render(&seats);
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        let to_move = seats[0]
            .state
            .game()
            .map_or(Force::White, |game| game.live_position().active_force());
        let mover = seat_index(to_move);
        let now = Instant::now();
        match words.as_slice() {
            [] => continue,
            ["quit" | "q"] => break,
            ["help"] => println!("{HELP}"),
            ["back"] => with_view(&mut seats[0], |game| {
                game.step_backward();
            }),
            ["fwd"] => with_view(&mut seats[0], |game| {
                game.step_forward();
            }),
            ["live"] => with_view(&mut seats[0], |game| {
                game.resume_to_live();
            }),
            ["goto", ply] => match ply.parse::<usize>() {
                Ok(ply) => with_view(&mut seats[0], |game| {
                    game.go_to_ply(ply.checked_sub(1));
                }),
                Err(err) => println!("Bad ply: {err}"),
            },
            ["drop"] => server.drop_next_notifications(seats[1 - mover].client_id, 1),
            ["disconnect"] => {
                server.set_connected(seats[0].client_id, false);
                seats[0].state.set_connection_state(ConnectionState::Disconnected);
            }
            ["reconnect"] => {
                server.set_connected(seats[0].client_id, true);
                seats[0].state.set_connection_state(ConnectionState::Connected);
            }
            ["resign"] => {
                if let Err(err) = seats[mover].state.resign(now).await {
                    println!("Cannot resign: {err}");
                }
            }
            ["pgn"] => {
                if let Some(game) = seats[0].state.game() {
                    let tags = PgnTags {
                        event: Some("Console game".to_owned()),
                        white: Some(players[Force::White].to_string()),
                        black: Some(players[Force::Black].to_string()),
                        ..PgnTags::default()
                    };
                    print!("{}", pgn::export_to_pgn(game.history(), game.status(), &tags));
                }
            }
            [word] => match parse_move(word) {
                Some(candidate) => {
                    if let Err(err) = seats[mover].state.make_move(candidate, now) {
                        println!("Move rejected: {err:?}");
                    }
                }
                None => println!("Unknown command; type \"help\""),
            },
            _ => println!("Unknown command; type \"help\""),
        }
        for seat in seats.iter_mut() {
            seat.state.tick(now);
        }
        deliver(&server, &mut seats).await;
    }
    Ok(())
}

fn seat_index(force: Force) -> usize {
    match force {
        Force::White => 0,
        Force::Black => 1,
    }
}

fn with_view(seat: &mut Seat, f: impl FnOnce(&mut chess_sync::altered_game::AlteredGame)) {
    if let Some(game) = seat.state.game_mut() {
        f(game);
    }
}

// Hands queued messages to clients and reacts to their events until everything settles.
async fn deliver(server: &LoopbackServer, seats: &mut [Seat]) {
    loop {
        let mut idle = true;
        for seat in seats.iter_mut() {
            for (topic, payload) in server.take_messages(seat.client_id) {
                idle = false;
                if let Err(err) = seat.state.process_message(&topic, &payload, Instant::now()) {
                    warn!("{}: {err:?}", seat.force.name());
                }
            }
            while let Some(event) = seat.state.next_notable_event() {
                idle = false;
                println!("[{}] {event:?}", seat.force.name());
                if event == NotableEvent::ResyncRequired {
                    if let Err(err) = seat.state.resync(Instant::now()).await {
                        println!("[{}] resync failed: {err}", seat.force.name());
                    }
                }
            }
        }
        if idle {
            break;
        }
    }
}

fn render(seats: &[Seat]) {
    let Some(game) = seats[0].state.game() else {
        return;
    };
    let derived = game.derived_state();
    println!();
    println!("{}", pgn::movetext(game.history(), game.status()).trim_end());
    println!("Showing:  {}", game.displayed_position());
    println!(
        "Phase:    {:?}, {} to move, material {:+}",
        game.phase(),
        derived.active_force.name(),
        derived.material_balance
    );
}

fn parse_move(word: &str) -> Option<MoveCandidate> {
    if word.len() < 4 || word.len() > 5 || !word.is_ascii() {
        return None;
    }
    let from = Coord::from_algebraic(&word[0..2])?;
    let to = Coord::from_algebraic(&word[2..4])?;
    let promotion = match word[4..].chars().next() {
        Some(ch) => Some(PieceKind::from_char(ch)?),
        None => None,
    };
    Some(MoveCandidate { from, to, promotion })
}
