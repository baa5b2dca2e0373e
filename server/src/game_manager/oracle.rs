//! Adapter over the chess rules library. The only authority on move
//! legality, SAN, and terminal detection; all operations are local to the
//! wrapped game state.

use chess::{Board, BoardStatus, ChessMove, Game, MoveGen, Piece, Square};
use shared::{Color, EndReason, MoveInput};
use std::str::FromStr;

/// Rejected move. Carries no detail on purpose: the caller surfaces a single
/// `invalid_move` event regardless of how the input failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalMove;

#[derive(Debug, Clone)]
pub struct AppliedMove {
    pub san: String,
    pub from: String,
    pub to: String,
    pub piece: Piece,
    pub captured: Option<Piece>,
    pub promotion: Option<Piece>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Checkmate { winner: Color },
    Stalemate,
    Draw(EndReason),
}

/// Authoritative game state: the library's game plus the SAN history and a
/// halfmove clock (the library reports claimable draws without saying which
/// rule triggered; the clock disambiguates).
pub struct Position {
    game: Game,
    history: Vec<String>,
    halfmove_clock: u32,
}

impl Position {
    pub fn new() -> Self {
        Self {
            game: Game::new(),
            history: Vec::new(),
            halfmove_clock: 0,
        }
    }

    pub fn turn(&self) -> Color {
        match self.game.side_to_move() {
            chess::Color::White => Color::White,
            chess::Color::Black => Color::Black,
        }
    }

    pub fn fen(&self) -> String {
        format!("{}", self.game.current_position())
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn move_count(&self) -> u32 {
        self.history.len() as u32
    }

    /// Validates and applies a move given as SAN or coordinates. On success
    /// the position advances and the SAN is recorded.
    pub fn apply(&mut self, input: &MoveInput) -> Result<AppliedMove, IllegalMove> {
        let board = self.game.current_position();
        let mv = parse_move(&board, input)?;

        if !MoveGen::new_legal(&board).any(|m| m == mv) {
            return Err(IllegalMove);
        }

        let piece = board.piece_on(mv.get_source()).ok_or(IllegalMove)?;
        let captured = board.piece_on(mv.get_dest());
        let en_passant = piece == Piece::Pawn
            && captured.is_none()
            && mv.get_source().get_file() != mv.get_dest().get_file();
        let san = san_for(&board, mv);

        if !self.game.make_move(mv) {
            return Err(IllegalMove);
        }

        if piece == Piece::Pawn || captured.is_some() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }
        self.history.push(san.clone());

        Ok(AppliedMove {
            san,
            from: mv.get_source().to_string(),
            to: mv.get_dest().to_string(),
            piece,
            captured: captured.or(en_passant.then_some(Piece::Pawn)),
            promotion: mv.get_promotion(),
        })
    }

    /// Terminal state of the current position, if any. Claimable draws
    /// (threefold, fifty-move) are adjudicated immediately.
    pub fn terminal(&self) -> Option<Terminal> {
        let board = self.game.current_position();
        match board.status() {
            BoardStatus::Checkmate => {
                return Some(Terminal::Checkmate {
                    winner: self.turn().opposite(),
                })
            }
            BoardStatus::Stalemate => return Some(Terminal::Stalemate),
            BoardStatus::Ongoing => {}
        }

        if insufficient_material(&board) {
            return Some(Terminal::Draw(EndReason::InsufficientMaterial));
        }

        if self.game.can_declare_draw() {
            let reason = if self.halfmove_clock >= 100 {
                EndReason::FiftyMove
            } else {
                EndReason::Threefold
            };
            return Some(Terminal::Draw(reason));
        }

        None
    }
}

fn parse_move(board: &Board, input: &MoveInput) -> Result<ChessMove, IllegalMove> {
    match input {
        // SAN is resolved by matching against the notation of each legal
        // move, so parsing and generation can never disagree.
        MoveInput::San(s) => {
            let wanted = normalize_san(s);
            if wanted.is_empty() {
                return Err(IllegalMove);
            }
            MoveGen::new_legal(board)
                .find(|m| normalize_san(&san_for(board, *m)) == wanted)
                .ok_or(IllegalMove)
        }
        MoveInput::Coords {
            from,
            to,
            promotion,
        } => {
            let from_sq = Square::from_str(from.trim()).map_err(|_| IllegalMove)?;
            let to_sq = Square::from_str(to.trim()).map_err(|_| IllegalMove)?;
            let mut promo = match promotion.as_deref().map(str::to_ascii_lowercase).as_deref() {
                Some("q") => Some(Piece::Queen),
                Some("r") => Some(Piece::Rook),
                Some("b") => Some(Piece::Bishop),
                Some("n") => Some(Piece::Knight),
                Some(_) => return Err(IllegalMove),
                None => None,
            };
            // A pawn reaching the last rank without an explicit piece
            // promotes to a queen.
            if promo.is_none()
                && board.piece_on(from_sq) == Some(Piece::Pawn)
                && matches!(to_sq.get_rank(), chess::Rank::First | chess::Rank::Eighth)
            {
                promo = Some(Piece::Queen);
            }
            Ok(ChessMove::new(from_sq, to_sq, promo))
        }
    }
}

/// Strips annotations and check/mate marks, and accepts zero-style castling.
fn normalize_san(s: &str) -> String {
    s.trim()
        .trim_end_matches(['+', '#', '!', '?'])
        .replace('0', "O")
}

fn piece_letter(piece: Piece) -> char {
    match piece {
        Piece::Pawn => 'P',
        Piece::Knight => 'N',
        Piece::Bishop => 'B',
        Piece::Rook => 'R',
        Piece::Queen => 'Q',
        Piece::King => 'K',
    }
}

fn file_char(sq: Square) -> char {
    (b'a' + sq.get_file().to_index() as u8) as char
}

fn rank_char(sq: Square) -> char {
    (b'1' + sq.get_rank().to_index() as u8) as char
}

/// Standard algebraic notation for a legal move in `board`.
fn san_for(board: &Board, mv: ChessMove) -> String {
    let from = mv.get_source();
    let to = mv.get_dest();
    let Some(piece) = board.piece_on(from) else {
        return format!("{from}{to}");
    };

    let file_delta = to.get_file().to_index() as i32 - from.get_file().to_index() as i32;
    let mut san = if piece == Piece::King && file_delta == 2 {
        "O-O".to_string()
    } else if piece == Piece::King && file_delta == -2 {
        "O-O-O".to_string()
    } else {
        let capture = board.piece_on(to).is_some()
            || (piece == Piece::Pawn && from.get_file() != to.get_file());
        let mut s = String::new();
        if piece != Piece::Pawn {
            s.push(piece_letter(piece));
            s.push_str(&disambiguation(board, mv, piece));
        }
        if capture {
            if piece == Piece::Pawn {
                s.push(file_char(from));
            }
            s.push('x');
        }
        s.push_str(&to.to_string());
        if let Some(promo) = mv.get_promotion() {
            s.push('=');
            s.push(piece_letter(promo));
        }
        s
    };

    let after = board.make_move_new(mv);
    if after.checkers().popcnt() > 0 {
        san.push(if after.status() == BoardStatus::Checkmate {
            '#'
        } else {
            '+'
        });
    }
    san
}

/// File and/or rank needed to distinguish `mv` from other legal moves of the
/// same piece type to the same destination.
fn disambiguation(board: &Board, mv: ChessMove, piece: Piece) -> String {
    if piece == Piece::King {
        return String::new();
    }
    let from = mv.get_source();
    let rivals: Vec<Square> = MoveGen::new_legal(board)
        .filter(|m| {
            m.get_dest() == mv.get_dest()
                && m.get_source() != from
                && board.piece_on(m.get_source()) == Some(piece)
        })
        .map(|m| m.get_source())
        .collect();
    if rivals.is_empty() {
        return String::new();
    }

    let file_clashes = rivals.iter().any(|s| s.get_file() == from.get_file());
    let rank_clashes = rivals.iter().any(|s| s.get_rank() == from.get_rank());
    let mut out = String::new();
    if !file_clashes {
        out.push(file_char(from));
    } else if !rank_clashes {
        out.push(rank_char(from));
    } else {
        out.push(file_char(from));
        out.push(rank_char(from));
    }
    out
}

/// Neither side can mate: bare kings, a lone minor piece, or one bishop each
/// on squares of the same color.
fn insufficient_material(board: &Board) -> bool {
    let heavy = board.pieces(Piece::Pawn).popcnt()
        + board.pieces(Piece::Rook).popcnt()
        + board.pieces(Piece::Queen).popcnt();
    if heavy > 0 {
        return false;
    }

    let knights = board.pieces(Piece::Knight).popcnt();
    let bishops = *board.pieces(Piece::Bishop);
    match (knights, bishops.popcnt()) {
        (0, 0) => true,
        (1, 0) | (0, 1) => true,
        (0, 2) => {
            let one_each = [chess::Color::White, chess::Color::Black]
                .iter()
                .all(|c| (bishops & *board.color_combined(*c)).popcnt() == 1);
            let square_colors: Vec<usize> = bishops
                .map(|sq| (sq.get_file().to_index() + sq.get_rank().to_index()) % 2)
                .collect();
            one_each && square_colors.windows(2).all(|w| w[0] == w[1])
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn san(pos: &mut Position, s: &str) -> AppliedMove {
        pos.apply(&MoveInput::San(s.into())).expect(s)
    }

    #[test]
    fn starting_position_is_white_to_move() {
        let pos = Position::new();
        assert_eq!(pos.turn(), Color::White);
        assert!(pos.terminal().is_none());
        assert!(pos.fen().starts_with("rnbqkbnr/pppppppp"));
    }

    #[test]
    fn illegal_san_is_rejected_without_state_change() {
        let mut pos = Position::new();
        let before = pos.fen();
        assert!(pos.apply(&MoveInput::San("e5".into())).is_err());
        assert!(pos.apply(&MoveInput::San("garbage".into())).is_err());
        assert_eq!(pos.fen(), before);
        assert_eq!(pos.move_count(), 0);
    }

    #[test]
    fn coordinate_moves_apply() {
        let mut pos = Position::new();
        let applied = pos
            .apply(&MoveInput::Coords {
                from: "e2".into(),
                to: "e4".into(),
                promotion: None,
            })
            .unwrap();
        assert_eq!(applied.san, "e4");
        assert_eq!(applied.piece, Piece::Pawn);
        assert_eq!(pos.turn(), Color::Black);
    }

    #[test]
    fn fools_mate_is_checkmate_for_black() {
        let mut pos = Position::new();
        for m in ["f3", "e5", "g4"] {
            san(&mut pos, m);
        }
        assert!(pos.terminal().is_none());
        let mate = san(&mut pos, "Qh4");
        assert_eq!(mate.san, "Qh4#");
        assert_eq!(
            pos.terminal(),
            Some(Terminal::Checkmate {
                winner: Color::Black
            })
        );
        assert_eq!(pos.history(), &["f3", "e5", "g4", "Qh4#"]);
    }

    #[test]
    fn capture_and_check_notation() {
        let mut pos = Position::new();
        san(&mut pos, "e4");
        san(&mut pos, "d5");
        let capture = san(&mut pos, "exd5");
        assert_eq!(capture.san, "exd5");
        assert_eq!(capture.captured, Some(Piece::Pawn));

        san(&mut pos, "f5");
        let check = san(&mut pos, "Qh5");
        assert_eq!(check.san, "Qh5+");
    }

    #[test]
    fn san_accepts_check_marks_and_zero_castling() {
        let mut pos = Position::new();
        san(&mut pos, "e4");
        san(&mut pos, "d5");
        san(&mut pos, "exd5");
        san(&mut pos, "f5");
        assert_eq!(san(&mut pos, "Qh5+").san, "Qh5+");

        let mut pos = Position::new();
        for m in ["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5"] {
            san(&mut pos, m);
        }
        assert_eq!(san(&mut pos, "0-0").san, "O-O");
    }

    #[test]
    fn ambiguous_knight_move_gets_file_disambiguation() {
        let mut pos = Position::new();
        for m in ["Nf3", "Nf6", "Nc3", "Nc6", "Nb5", "a6"] {
            san(&mut pos, m);
        }
        // Knights on b5 and f3 both reach d4.
        let applied = pos
            .apply(&MoveInput::Coords {
                from: "f3".into(),
                to: "d4".into(),
                promotion: None,
            })
            .unwrap();
        assert_eq!(applied.san, "Nfd4");

        // And the disambiguated SAN parses back to the same move.
        let mut pos2 = Position::new();
        for m in ["Nf3", "Nf6", "Nc3", "Nc6", "Nb5", "a6"] {
            san(&mut pos2, m);
        }
        assert_eq!(san(&mut pos2, "Nfd4").from, "f3");
    }

    #[test]
    fn castling_san() {
        let mut pos = Position::new();
        for m in ["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5"] {
            san(&mut pos, m);
        }
        let castle = san(&mut pos, "O-O");
        assert_eq!(castle.san, "O-O");
        assert_eq!(castle.piece, Piece::King);
    }

    #[test]
    fn promotion_defaults_to_queen_on_coordinate_input() {
        let mut pos = Position::new();
        for m in ["e4", "d5", "exd5", "c6", "dxc6", "e6", "cxb7", "Bd6"] {
            san(&mut pos, m);
        }
        let promo = pos
            .apply(&MoveInput::Coords {
                from: "b7".into(),
                to: "a8".into(),
                promotion: None,
            })
            .unwrap();
        assert_eq!(promo.promotion, Some(Piece::Queen));
        assert_eq!(promo.captured, Some(Piece::Rook));
        assert!(promo.san.starts_with("bxa8=Q"));
    }

    #[test]
    fn stalemate_detected() {
        // Sam Loyd's ten-move stalemate.
        let mut pos = Position::new();
        for m in [
            "e3", "a5", "Qh5", "Ra6", "Qxa5", "h5", "Qxc7", "Rah6", "h4", "f6",
            "Qxd7", "Kf7", "Qxb7", "Qd3", "Qxb8", "Qh7", "Qxc8", "Kg6", "Qe6",
        ] {
            san(&mut pos, m);
        }
        assert_eq!(pos.terminal(), Some(Terminal::Stalemate));
    }

    #[test]
    fn threefold_repetition_is_a_draw() {
        let mut pos = Position::new();
        for m in ["Nf3", "Nf6", "Ng1", "Ng8", "Nf3", "Nf6", "Ng1", "Ng8"] {
            san(&mut pos, m);
        }
        assert_eq!(pos.terminal(), Some(Terminal::Draw(EndReason::Threefold)));
    }
}
