use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};


pub const NUM_ROWS: u8 = 8;
pub const NUM_COLS: u8 = 8;


#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Row {
    idx: u8, // 0-based
}

impl Row {
    pub const fn from_zero_based(idx: u8) -> Self {
        assert!(idx < NUM_ROWS);
        Self { idx }
    }
    pub fn from_algebraic(ch: char) -> Option<Self> {
        let idx = (ch as u32).checked_sub('1' as u32)?;
        (idx < NUM_ROWS as u32).then(|| Self::from_zero_based(idx as u8))
    }
    pub const fn to_zero_based(self) -> u8 { self.idx }
    pub const fn to_algebraic(self) -> char { (self.idx + b'1') as char }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Col {
    idx: u8, // 0-based
}

impl Col {
    pub const fn from_zero_based(idx: u8) -> Self {
        assert!(idx < NUM_COLS);
        Self { idx }
    }
    pub fn from_algebraic(ch: char) -> Option<Self> {
        let idx = (ch as u32).checked_sub('a' as u32)?;
        (idx < NUM_COLS as u32).then(|| Self::from_zero_based(idx as u8))
    }
    pub const fn to_zero_based(self) -> u8 { self.idx }
    pub const fn to_algebraic(self) -> char { (self.idx + b'a') as char }
}


// A board square. Serialized in algebraic form, e.g. "e4", which is what the server sends
// and expects in `from`/`to` fields.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord {
    pub row: Row,
    pub col: Col,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ParseCoordError(pub String);

impl Coord {
    pub const fn new(row: Row, col: Col) -> Self { Self { row, col } }

    const fn from_indices(col: u8, row: u8) -> Self {
        Self::new(Row::from_zero_based(row), Col::from_zero_based(col))
    }

    pub fn from_algebraic(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        let col = Col::from_algebraic(chars.next()?)?;
        let row = Row::from_algebraic(chars.next()?)?;
        chars.next().is_none().then_some(Coord { row, col })
    }

    pub fn to_algebraic(self) -> String {
        format!("{}{}", self.col.to_algebraic(), self.row.to_algebraic())
    }

    pub fn all() -> impl Iterator<Item = Coord> {
        (0..NUM_ROWS).flat_map(|row| (0..NUM_COLS).map(move |col| Coord::from_indices(col, row)))
    }
}

impl fmt::Debug for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coord({}{})", self.col.to_algebraic(), self.row.to_algebraic())
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.col.to_algebraic(), self.row.to_algebraic())
    }
}

impl FromStr for Coord {
    type Err = ParseCoordError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Coord::from_algebraic(s).ok_or_else(|| ParseCoordError(s.to_owned()))
    }
}

impl Serialize for Coord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_algebraic())
    }
}

impl<'de> Deserialize<'de> for Coord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Coord::from_algebraic(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid square: {s:?}")))
    }
}

macro_rules! define_coords {
    ($($col:literal: $($name:ident $row:literal),+;)+) => {
        impl Coord {
            $($(pub const $name: Coord = Coord::from_indices($col, $row);)+)+
        }
    };
}

define_coords! {
    0: A1 0, A2 1, A3 2, A4 3, A5 4, A6 5, A7 6, A8 7;
    1: B1 0, B2 1, B3 2, B4 3, B5 4, B6 5, B7 6, B8 7;
    2: C1 0, C2 1, C3 2, C4 3, C5 4, C6 5, C7 6, C8 7;
    3: D1 0, D2 1, D3 2, D4 3, D5 4, D6 5, D7 6, D8 7;
    4: E1 0, E2 1, E3 2, E4 3, E5 4, E6 5, E7 6, E8 7;
    5: F1 0, F2 1, F3 2, F4 3, F5 4, F6 5, F7 6, F8 7;
    6: G1 0, G2 1, G3 2, G4 3, G5 4, G6 5, G7 6, G8 7;
    7: H1 0, H2 1, H3 2, H4 3, H5 4, H6 5, H7 6, H8 7;
}
