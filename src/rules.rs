// Rules oracle: the only place that knows chess rules. The synchronization engine treats it as
// a pure function of a position, so any implementation must be stateless.
//
// `StandardRules` delegates to `shakmaty`. Positions cross the boundary as FEN, which keeps
// `Position` opaque and makes the server's FEN directly comparable with ours.

use itertools::Itertools;
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position as _, Role, Square};

use crate::chess_move::{Move, MoveCandidate, MoveFlag, MoveFlags};
use crate::coord::{Col, Coord};
use crate::piece::PieceKind;
use crate::position::Position;


#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TurnError {
    InvalidPosition(String),
    InvalidNotation(String),
    IllegalMove,
    // Pawn reaches the last rank, but the promotion piece was not specified.
    PromotionRequired,
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct PositionStatus {
    pub is_check: bool,
    pub is_checkmate: bool,
    pub is_stalemate: bool,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AppliedMove {
    pub chess_move: Move,
    pub position: Position,
}

pub trait RulesOracle {
    fn apply_move(
        &self, position: &Position, candidate: MoveCandidate,
    ) -> Result<AppliedMove, TurnError>;

    // Applies a move given in SAN. Check markers are optional.
    fn apply_notation(&self, position: &Position, notation: &str)
    -> Result<AppliedMove, TurnError>;

    fn status(&self, position: &Position) -> Result<PositionStatus, TurnError>;

    fn legal_moves(
        &self, position: &Position, from: Option<Coord>,
    ) -> Result<Vec<MoveCandidate>, TurnError>;

    fn is_check(&self, position: &Position) -> bool {
        self.status(position).is_ok_and(|s| s.is_check)
    }
    fn is_checkmate(&self, position: &Position) -> bool {
        self.status(position).is_ok_and(|s| s.is_checkmate)
    }
    fn is_stalemate(&self, position: &Position) -> bool {
        self.status(position).is_ok_and(|s| s.is_stalemate)
    }
}

impl PositionStatus {
    pub fn is_terminal(&self) -> bool { self.is_checkmate || self.is_stalemate }
}

impl std::fmt::Display for TurnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnError::InvalidPosition(err) => write!(f, "invalid position: {err}"),
            TurnError::InvalidNotation(notation) => write!(f, "cannot parse move {notation:?}"),
            TurnError::IllegalMove => write!(f, "illegal move"),
            TurnError::PromotionRequired => write!(f, "promotion piece required"),
        }
    }
}

impl std::error::Error for TurnError {}


#[derive(Clone, Copy, Debug, Default)]
pub struct StandardRules;

impl StandardRules {
    pub fn new() -> Self { StandardRules }
}

impl RulesOracle for StandardRules {
    fn apply_move(
        &self, position: &Position, candidate: MoveCandidate,
    ) -> Result<AppliedMove, TurnError> {
        let pos = load_position(position)?;
        let matching = pos
            .legal_moves()
            .into_iter()
            .filter(|m| {
                move_origin(m) == Some(candidate.from) && move_destination(m) == Some(candidate.to)
            })
            .collect_vec();
        let promoting = matching.iter().any(|m| m.is_promotion());
        let chosen = match (candidate.promotion, promoting) {
            (_, false) => matching.into_iter().next(),
            (None, true) => return Err(TurnError::PromotionRequired),
            (Some(kind), true) => {
                let role = piece_kind_to_role(kind);
                matching.into_iter().find(|m| m.promotion() == Some(role))
            }
        };
        let chosen = chosen.ok_or(TurnError::IllegalMove)?;
        play(pos, &chosen)
    }

    fn apply_notation(
        &self, position: &Position, notation: &str,
    ) -> Result<AppliedMove, TurnError> {
        let pos = load_position(position)?;
        let san_plus: SanPlus = notation
            .trim()
            .parse()
            .map_err(|_| TurnError::InvalidNotation(notation.to_owned()))?;
        let m = san_plus.san.to_move(&pos).map_err(|_| TurnError::IllegalMove)?;
        play(pos, &m)
    }

    fn status(&self, position: &Position) -> Result<PositionStatus, TurnError> {
        let pos = load_position(position)?;
        Ok(PositionStatus {
            is_check: pos.is_check(),
            is_checkmate: pos.is_checkmate(),
            is_stalemate: pos.is_stalemate(),
        })
    }

    fn legal_moves(
        &self, position: &Position, from: Option<Coord>,
    ) -> Result<Vec<MoveCandidate>, TurnError> {
        let pos = load_position(position)?;
        Ok(pos
            .legal_moves()
            .iter()
            .filter_map(|m| {
                Some(MoveCandidate {
                    from: move_origin(m)?,
                    to: move_destination(m)?,
                    promotion: m.promotion().map(role_to_piece_kind),
                })
            })
            .filter(|candidate| from.is_none_or(|from| candidate.from == from))
            .collect())
    }
}

fn load_position(position: &Position) -> Result<Chess, TurnError> {
    let fen: Fen =
        position.fen().parse().map_err(|err| TurnError::InvalidPosition(format!("{err}")))?;
    fen.into_position::<Chess>(CastlingMode::Standard)
        .map_err(|err| TurnError::InvalidPosition(format!("{err}")))
}

fn play(pos: Chess, m: &shakmaty::Move) -> Result<AppliedMove, TurnError> {
    let san = San::from_move(&pos, m);
    let mut after = pos;
    after.play_unchecked(m);
    let suffix = if after.is_checkmate() {
        "#"
    } else if after.is_check() {
        "+"
    } else {
        ""
    };
    let mut flags = MoveFlags::empty();
    if m.is_castle() {
        flags.insert(MoveFlag::Castle);
    }
    if m.is_en_passant() {
        flags.insert(MoveFlag::EnPassant);
    }
    if m.is_promotion() {
        flags.insert(MoveFlag::Promotion);
    }
    if m.is_capture() {
        flags.insert(MoveFlag::Capture);
    }
    let chess_move = Move {
        from: move_origin(m).ok_or(TurnError::IllegalMove)?,
        to: move_destination(m).ok_or(TurnError::IllegalMove)?,
        promotion: m.promotion().map(role_to_piece_kind),
        notation: format!("{san}{suffix}"),
        captured_piece: m.capture().map(role_to_piece_kind),
        flags,
    };
    let fen = Fen::from_position(after, EnPassantMode::Legal);
    Ok(AppliedMove { chess_move, position: Position::from_fen(fen.to_string()) })
}

fn square_to_coord(square: Square) -> Option<Coord> { Coord::from_algebraic(&square.to_string()) }

fn move_origin(m: &shakmaty::Move) -> Option<Coord> { m.from().and_then(square_to_coord) }

// Castling is represented as "king takes rook" internally; users and the server address it by
// the square the king lands on.
fn move_destination(m: &shakmaty::Move) -> Option<Coord> {
    match *m {
        shakmaty::Move::Castle { king, rook } => {
            let king = square_to_coord(king)?;
            let rook = square_to_coord(rook)?;
            let col = if rook.col > king.col { 'g' } else { 'c' };
            Some(Coord::new(king.row, Col::from_algebraic(col)?))
        }
        _ => square_to_coord(m.to()),
    }
}

fn role_to_piece_kind(role: Role) -> PieceKind {
    match role {
        Role::Pawn => PieceKind::Pawn,
        Role::Knight => PieceKind::Knight,
        Role::Bishop => PieceKind::Bishop,
        Role::Rook => PieceKind::Rook,
        Role::Queen => PieceKind::Queen,
        Role::King => PieceKind::King,
    }
}

fn piece_kind_to_role(kind: PieceKind) -> Role {
    match kind {
        PieceKind::Pawn => Role::Pawn,
        PieceKind::Knight => Role::Knight,
        PieceKind::Bishop => Role::Bishop,
        PieceKind::Rook => Role::Rook,
        PieceKind::Queen => Role::Queen,
        PieceKind::King => Role::King,
    }
}
