#![forbid(unsafe_code)]
#![cfg_attr(feature = "strict", deny(warnings))]

mod fetch_main;
mod http_api;
mod null_transport;
mod play_main;
mod replay_main;

use std::path::Path;

use anyhow::Context;
use chess_sync::config::SyncConfig;
use clap::{Command, arg};


fn main() -> anyhow::Result<()> {
    env_logger::Builder::new()
        .target(env_logger::Target::Stdout)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let matches = Command::new("Chess sync")
        .version(clap::crate_version!())
        .about("Console front-end for the chess game synchronization engine")
        .subcommand_required(true)
        .subcommand(
            Command::new("replay")
                .about("Replays a move list and prints the resulting state")
                .arg(arg!(<moves> "Moves in SAN, e.g. \"1. e4 e5 2. Nf3\""))
                .arg(arg!(--"ply" <ply> "Show the position after this many plies")
                    .value_parser(clap::value_parser!(usize)))
                .arg(arg!(--"pgn" "Print the game as PGN"))
                .arg(arg!(--"json" "Print the derived state as JSON")),
        )
        .subcommand(
            Command::new("play")
                .about("Plays both sides against an in-process server")
                .arg(arg!(--"config" <config_file> "Path to a yaml-serialized SyncConfig"))
                .arg(arg!(--"no-echo-ids" "Server doesn't echo request ids back")),
        )
        .subcommand(
            Command::new("config")
                .about("Prints the effective synchronization settings")
                .arg(arg!(--"config" <config_file> "Path to a yaml-serialized SyncConfig")),
        )
        .subcommand(
            Command::new("fetch")
                .about("Loads a game over HTTP and prints it")
                .arg(arg!(<api_url> "API root, e.g. http://localhost:8080/api"))
                .arg(arg!(<game_id> "Game ID"))
                .arg(arg!(<player_id> "Player ID"))
                .arg(arg!(--"config" <config_file> "Path to a yaml-serialized SyncConfig")),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("replay", sub_matches)) => replay_main::run(replay_main::ReplayConfig {
            moves: sub_matches.get_one::<String>("moves").cloned().unwrap_or_default(),
            ply: sub_matches.get_one::<usize>("ply").copied(),
            print_pgn: sub_matches.get_flag("pgn"),
            print_json: sub_matches.get_flag("json"),
        }),
        Some(("play", sub_matches)) => play_main::run(play_main::PlayConfig {
            sync_config: read_config(sub_matches.get_one::<String>("config"))?,
            echo_request_ids: !sub_matches.get_flag("no-echo-ids"),
        }),
        Some(("config", sub_matches)) => {
            let config = read_config(sub_matches.get_one::<String>("config"))?;
            print!("{}", serde_yaml::to_string(&config)?);
            println!(
                "# A resync is requested after {} without an echo.",
                humantime::format_duration(config.pending_move_timeout)
            );
            Ok(())
        }
        Some(("fetch", sub_matches)) => {
            let get = |name| sub_matches.get_one::<String>(name).cloned().unwrap_or_default();
            async_std::task::block_on(fetch_main::run(fetch_main::FetchConfig {
                api_url: get("api_url"),
                game_id: get("game_id"),
                player_id: get("player_id"),
                sync_config: read_config(sub_matches.get_one::<String>("config"))?,
            }))
        }
        _ => unreachable!("Exhausted list of subcommands and subcommand_required prevents `None`"),
    }
}

fn read_config(path: Option<&String>) -> anyhow::Result<SyncConfig> {
    let Some(path) = path else {
        return Ok(SyncConfig::default());
    };
    let path = Path::new(path);
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Reading config file {}", path.display()))?;
    SyncConfig::from_yaml_str(&contents)
        .with_context(|| format!("Parsing config file {}", path.display()))
}
