use std::rc::Rc;

use chess_sync::client::ClientState;
use chess_sync::config::SyncConfig;
use chess_sync::pgn::{self, PgnTags};
use chess_sync::rules::StandardRules;
use chess_sync::session::{GameId, PlayerId};
use instant::Instant;

use crate::http_api::HttpGameApi;
use crate::null_transport::NullTransport;


pub struct FetchConfig {
    pub api_url: String,
    pub game_id: String,
    pub player_id: String,
    pub sync_config: SyncConfig,
}

pub async fn run(config: FetchConfig) -> anyhow::Result<()> {
    let api = HttpGameApi::new(&config.api_url)?;
    let mut client = ClientState::new(
        GameId::new(config.game_id),
        PlayerId::new(config.player_id),
        config.sync_config,
        Rc::new(StandardRules::new()),
        Box::new(NullTransport),
        Rc::new(api),
    );
    client.load(Instant::now()).await;
    while let Some(event) = client.next_notable_event() {
        println!("{event:?}");
    }
    let Some(game) = client.game() else {
        anyhow::bail!("Game was not loaded");
    };
    let session = game.session();
    let tags = PgnTags { site: Some(config.api_url), ..PgnTags::default() };
    println!("Playing {} as {}", session.id, session.my_force.name());
    print!("{}", pgn::export_to_pgn(game.history(), game.status(), &tags));
    let derived = game.derived_state();
    println!("Material: {:+}", derived.advantage(session.my_force));
    Ok(())
}
