use enum_map::{Enum, EnumMap};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

use crate::coord::Coord;
use crate::piece::PieceKind;
use crate::util::strip_check_suffix;


#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Enum, EnumIter, Serialize, Deserialize)]
pub enum MoveFlag {
    Castle,
    EnPassant,
    Promotion,
    Capture,
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MoveFlags {
    flags: EnumMap<MoveFlag, bool>,
}

impl MoveFlags {
    pub fn empty() -> Self { Self::default() }
    pub fn contains(&self, flag: MoveFlag) -> bool { self.flags[flag] }
    pub fn insert(&mut self, flag: MoveFlag) { self.flags[flag] = true; }
    pub fn with(mut self, flag: MoveFlag) -> Self {
        self.insert(flag);
        self
    }
    pub fn iter(&self) -> impl Iterator<Item = MoveFlag> + '_ {
        MoveFlag::iter().filter(|&flag| self.flags[flag])
    }
}

impl std::fmt::Debug for MoveFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<MoveFlag> for MoveFlags {
    fn from_iter<I: IntoIterator<Item = MoveFlag>>(iter: I) -> Self {
        let mut flags = MoveFlags::empty();
        iter.into_iter().for_each(|flag| flags.insert(flag));
        flags
    }
}


// What the user asked for: the pair of squares plus an optional promotion piece.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct MoveCandidate {
    pub from: Coord,
    pub to: Coord,
    pub promotion: Option<PieceKind>,
}

// A move as played. Normally produced by the rules oracle, which fills in notation and all the
// details that depend on the position.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Move {
    pub from: Coord,
    pub to: Coord,
    pub promotion: Option<PieceKind>,
    // SAN including check/mate suffix, e.g. "Bxc6+".
    pub notation: String,
    pub captured_piece: Option<PieceKind>,
    pub flags: MoveFlags,
}

impl MoveCandidate {
    pub fn new(from: Coord, to: Coord) -> Self { MoveCandidate { from, to, promotion: None } }
    pub fn promoting(from: Coord, to: Coord, promotion: PieceKind) -> Self {
        MoveCandidate { from, to, promotion: Some(promotion) }
    }
}

impl Move {
    pub fn candidate(&self) -> MoveCandidate {
        MoveCandidate { from: self.from, to: self.to, promotion: self.promotion }
    }

    pub fn is_capture(&self) -> bool { self.flags.contains(MoveFlag::Capture) }

    // Compares SAN ignoring check and mate markers.
    pub fn same_notation(a: &str, b: &str) -> bool { strip_check_suffix(a) == strip_check_suffix(b) }

    // Reconstructs a move from what the server reported when the notation cannot be matched
    // against the local position. Details that are not in the report are inferred from SAN.
    pub fn from_server_report(
        notation: &str, from: Option<Coord>, to: Option<Coord>, captured_piece: Option<PieceKind>,
    ) -> Option<Self> {
        let san = strip_check_suffix(notation);
        let castle = san.starts_with("O-O");
        let promotion = san
            .split_once('=')
            .and_then(|(_, piece)| piece.chars().next())
            .and_then(PieceKind::from_char);
        let is_capture = captured_piece.is_some() || san.contains('x');
        let mut flags = MoveFlags::empty();
        if castle {
            flags.insert(MoveFlag::Castle);
        }
        if promotion.is_some() {
            flags.insert(MoveFlag::Promotion);
        }
        if is_capture {
            flags.insert(MoveFlag::Capture);
        }
        Some(Move {
            from: from?,
            to: to?,
            promotion,
            notation: notation.to_owned(),
            captured_piece,
            flags,
        })
    }
}
