use enum_map::Enum;
use serde::{Deserialize, Serialize};
use strum::EnumIter;


// Wire format uses lowercase names ("white"/"black"), e.g. `currentTurn` in clock updates.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Enum, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Force {
    White,
    Black,
}

impl Force {
    pub fn opponent(self) -> Force {
        match self {
            Force::White => Force::Black,
            Force::Black => Force::White,
        }
    }

    // Side-to-move field of a FEN record.
    pub fn from_fen_char(ch: char) -> Option<Self> {
        match ch {
            'w' => Some(Force::White),
            'b' => Some(Force::Black),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Force::White => "white",
            Force::Black => "black",
        }
    }
}
