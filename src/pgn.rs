// Move list formatting: numbered move pairs for display and PGN export.
//
// PGN doc: http://www.saremba.de/chessgml/standards/pgn/pgn-complete.htm

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::force::Force;
use crate::history::{HistoryStore, PlyIndex};
use crate::position::{INITIAL_FEN, Position};
use crate::session::GameStatus;


const LINE_WIDTH: usize = 80;

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PlyRef {
    pub ply_index: PlyIndex,
    pub notation: String,
}

// One row of the move list: "12. Nf3 Nc6". Either half may be missing: Black's half for the
// latest move, White's half when the game started with Black to move.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct MovePair {
    pub number: u32,
    pub white: Option<PlyRef>,
    pub black: Option<PlyRef>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct PgnTags {
    pub event: Option<String>,
    pub site: Option<String>,
    pub white: Option<String>,
    pub black: Option<String>,
}

struct TextDocument {
    text: String,
    last_line_len: usize,
}

impl TextDocument {
    fn new() -> Self { TextDocument { text: String::new(), last_line_len: 0 } }

    fn push_word(&mut self, word: &str) {
        if self.last_line_len == 0 {
            // First word on the line.
        } else if self.last_line_len + word.len() < LINE_WIDTH {
            self.text.push(' ');
            self.last_line_len += 1;
        } else {
            self.text.push('\n');
            self.last_line_len = 0;
        }
        self.text.push_str(word);
        self.last_line_len += word.len();
    }

    fn render(self) -> String {
        let trailing_newline = if self.last_line_len > 0 { "\n" } else { "" };
        format!("{}{trailing_newline}", self.text)
    }
}

pub fn move_pairs(history: &HistoryStore) -> Vec<MovePair> {
    let mut pairs: Vec<MovePair> = Vec::new();
    let mut number = history.initial_position().fullmove_number();
    let mut force = history.initial_position().active_force();
    for entry in history.entries() {
        let ply = PlyRef {
            ply_index: entry.ply_index,
            notation: entry.chess_move.notation.clone(),
        };
        match force {
            Force::White => pairs.push(MovePair { number, white: Some(ply), black: None }),
            Force::Black => match pairs.last_mut() {
                Some(pair) if pair.number == number && pair.black.is_none() => {
                    pair.black = Some(ply);
                }
                _ => pairs.push(MovePair { number, white: None, black: Some(ply) }),
            },
        }
        if force == Force::Black {
            number += 1;
        }
        force = force.opponent();
    }
    pairs
}

// Movetext only, e.g. "1. e4 e5 2. Nf3 *".
pub fn movetext(history: &HistoryStore, status: &GameStatus) -> String {
    let mut doc = TextDocument::new();
    for pair in move_pairs(history) {
        let word = match (&pair.white, &pair.black) {
            (Some(white), Some(black)) => {
                format!("{}. {} {}", pair.number, white.notation, black.notation)
            }
            (Some(white), None) => format!("{}. {}", pair.number, white.notation),
            (None, Some(black)) => format!("{}... {}", pair.number, black.notation),
            (None, None) => continue,
        };
        doc.push_word(&word);
    }
    doc.push_word(status.result_token());
    doc.render()
}

pub fn export_to_pgn(history: &HistoryStore, status: &GameStatus, tags: &PgnTags) -> String {
    let unknown = || "?".to_owned();
    let mut header = vec![
        ("Event", tags.event.clone().unwrap_or_else(unknown)),
        ("Site", tags.site.clone().unwrap_or_else(unknown)),
        ("Date", "????.??.??".to_owned()),
        ("Round", "-".to_owned()),
        ("White", tags.white.clone().unwrap_or_else(unknown)),
        ("Black", tags.black.clone().unwrap_or_else(unknown)),
        ("Result", status.result_token().to_owned()),
    ];
    let initial = history.initial_position();
    if *initial != Position::from_fen(INITIAL_FEN) {
        header.push(("SetUp", "1".to_owned()));
        header.push(("FEN", initial.fen().to_owned()));
    }
    if let GameStatus::Ended(description) = status {
        header.push(("Termination", description.clone()));
    }
    let header = header
        .into_iter()
        .map(|(name, value)| format!("[{name} \"{}\"]\n", value.replace('"', "'")))
        .join("");
    format!("{header}\n{}", movetext(history, status))
}


#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::history::Confirmation;
    use crate::rules::{RulesOracle, StandardRules};
    use crate::session::VictoryReason;

    fn store_with(initial: Position, notations: &str) -> HistoryStore {
        let mut store = HistoryStore::new(initial);
        for san in notations.split_whitespace() {
            let applied = StandardRules.apply_notation(store.live_position(), san).unwrap();
            store.append(applied.chess_move, applied.position, Confirmation::Confirmed);
        }
        store
    }

    #[test]
    fn pairs() {
        let store = store_with(Position::initial(), "e4 e5 Nf3");
        let pairs = move_pairs(&store);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].number, 1);
        assert_eq!(pairs[0].black.as_ref().unwrap().notation, "e5");
        assert_eq!(pairs[1].white.as_ref().unwrap().ply_index, 2);
        assert_eq!(pairs[1].black, None);
    }

    #[test]
    fn black_to_move_first() {
        let initial = Position::from_fen(
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
        );
        let store = store_with(initial, "e5 Nf3");
        assert_eq!(movetext(&store, &GameStatus::Active), "1... e5 2. Nf3 *\n");
    }

    #[test]
    fn export() {
        let store = store_with(Position::initial(), "f3 e5 g4 Qh4#");
        let status = GameStatus::Victory(Force::Black, VictoryReason::Checkmate);
        let tags = PgnTags { white: Some("Alice".to_owned()), ..PgnTags::default() };
        let pgn = export_to_pgn(&store, &status, &tags);
        assert!(pgn.starts_with("[Event \"?\"]\n"));
        assert!(pgn.contains("[White \"Alice\"]\n"));
        assert!(pgn.contains("[Result \"0-1\"]\n"));
        assert!(!pgn.contains("[FEN"));
        assert!(pgn.ends_with("\n1. f3 e5 2. g4 Qh4# 0-1\n"));
    }

    #[test]
    fn long_games_are_wrapped() {
        let store = store_with(
            Position::initial(),
            "Nf3 Nf6 Ng1 Ng8 Nf3 Nf6 Ng1 Ng8 Nf3 Nf6 Ng1 Ng8 Nf3 Nf6 Ng1 Ng8 Nf3 Nf6 Ng1 Ng8",
        );
        let text = movetext(&store, &GameStatus::Active);
        assert!(text.lines().count() > 1);
        assert!(text.lines().all(|line| line.len() <= LINE_WIDTH));
    }
}
