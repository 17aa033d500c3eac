use anyhow::Context;
use chess_sync::derived::DerivedState;
use chess_sync::force::Force;
use chess_sync::piece::piece_to_pictogram;
use chess_sync::pgn::{self, PgnTags};
use chess_sync::rules::{RulesOracle, StandardRules};
use chess_sync::session::{DrawReason, GameStatus, VictoryReason};
use chess_sync::test_util;
use itertools::Itertools;


pub struct ReplayConfig {
    pub moves: String,
    // Number of plies to show; `None` for the final position.
    pub ply: Option<usize>,
    pub print_pgn: bool,
    pub print_json: bool,
}

pub fn run(config: ReplayConfig) -> anyhow::Result<()> {
    let oracle = StandardRules::new();
    let mut history =
        test_util::history_from_log(&oracle, &config.moves).context("Cannot replay moves")?;
    if let Some(ply) = config.ply {
        history.set_cursor(ply.checked_sub(1))?;
    }

    let live = history.live_position();
    let live_status = oracle.status(live)?;
    let status = if live_status.is_checkmate {
        GameStatus::Victory(live.active_force().opponent(), VictoryReason::Checkmate)
    } else if live_status.is_stalemate {
        GameStatus::Draw(DrawReason::Stalemate)
    } else {
        GameStatus::Active
    };

    if config.print_pgn {
        print!("{}", pgn::export_to_pgn(&history, &status, &PgnTags::default()));
        return Ok(());
    }

    let derived = DerivedState::compute(&history, history.cursor());
    if config.print_json {
        println!("{}", serde_json::to_string_pretty(&derived)?);
        return Ok(());
    }

    for pair in pgn::move_pairs(&history) {
        let half = |ply: &Option<pgn::PlyRef>| {
            ply.as_ref().map_or("...".to_owned(), |p| {
                let marker = if Some(p.ply_index) == history.cursor() { "*" } else { "" };
                format!("{}{marker}", p.notation)
            })
        };
        println!("{:>3}. {:<10} {}", pair.number, half(&pair.white), half(&pair.black));
    }
    // Pieces captured by `force` belong to the opponent.
    let captured = |force: Force| {
        derived
            .captured_for_display(force)
            .into_iter()
            .map(|kind| piece_to_pictogram(kind, force.opponent()))
            .join("")
    };
    println!();
    println!("Position:     {}", history.cursor_position());
    println!("To move:      {}", derived.active_force.name());
    println!("White took:   {}", captured(Force::White));
    println!("Black took:   {}", captured(Force::Black));
    println!("Material:     {:+}", derived.material_balance);
    println!("Status:       {status}");
    Ok(())
}
