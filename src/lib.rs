#![forbid(unsafe_code)]
#![cfg_attr(feature = "strict", deny(warnings))]

pub mod altered_game;
pub mod api;
pub mod chess_move;
pub mod client;
pub mod clock;
pub mod config;
pub mod coord;
pub mod derived;
pub mod error;
pub mod event;
pub mod force;
pub mod history;
pub mod loopback;
pub mod network;
pub mod pgn;
pub mod piece;
pub mod position;
pub mod rules;
pub mod session;
pub mod test_util;
pub mod util;
pub mod versioned;
