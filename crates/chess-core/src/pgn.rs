//! PGN parsing utilities: lightweight regex-based parser plus replay through
//! shakmaty for full per-move detail.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use shakmaty::{Chess, Position};
use tracing::debug;

use crate::error::ChessError;
use crate::game_data::{ChessMove, Game, GameMetadata, Source};
use crate::position::{describe_move, fen_of, parse_fen, parse_san_move};

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\[(\w+)\s+"(.*)"\]$"#).expect("header regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]*\}|;[^\n]*").expect("comment regex"));
static VARIATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^()]*\)").expect("variation regex"));
static MOVE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.+").expect("move number regex"));
static NAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\d+").expect("nag regex"));
static MOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"O-O-O[+#]?|O-O[+#]?|[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?")
        .expect("move regex")
});

/// Tags written first, in this order, by [`create`].
const SEVEN_TAG_ROSTER: [&str; 7] = ["Event", "Site", "Date", "Round", "White", "Black", "Result"];
const WRAP_WIDTH: usize = 80;

/// Headers and SAN move tokens of one game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPgn {
    pub headers: BTreeMap<String, String>,
    pub moves: Vec<String>,
}

/// Split one game into header tag-pairs and movetext tokens.
pub fn parse_single(pgn: &str) -> ParsedPgn {
    let mut headers = BTreeMap::new();
    let mut move_lines = Vec::new();
    let mut in_headers = true;

    for line in pgn.trim().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            in_headers = false;
            continue;
        }
        if trimmed.starts_with('[') {
            if in_headers {
                if let Some(cap) = HEADER_RE.captures(trimmed) {
                    headers.insert(cap[1].to_string(), cap[2].to_string());
                }
            }
            continue;
        }
        move_lines.push(trimmed);
    }

    ParsedPgn {
        headers,
        moves: extract_moves(&move_lines.join("\n")),
    }
}

/// Strip comments, variations, move numbers, NAGs and the result token.
fn extract_moves(movetext: &str) -> Vec<String> {
    let mut cleaned = COMMENT_RE.replace_all(movetext, " ").into_owned();

    // Variations nest, so peel the innermost level until none remain.
    loop {
        let next = VARIATION_RE.replace_all(&cleaned, " ").into_owned();
        if next == cleaned {
            break;
        }
        cleaned = next;
    }

    let cleaned = MOVE_NUMBER_RE.replace_all(&cleaned, " ");
    let cleaned = NAG_RE.replace_all(&cleaned, " ").replace("0-0-0", "O-O-O").replace("0-0", "O-O");

    MOVE_RE
        .find_iter(&cleaned)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Split a multi-game blob on blank lines followed by a header.
pub fn parse_multiple(text: &str) -> Vec<ParsedPgn> {
    split_games(text)
        .iter()
        .map(|chunk| parse_single(chunk))
        .filter(|parsed| !parsed.headers.is_empty() || !parsed.moves.is_empty())
        .collect()
}

/// Raw text of each game in a multi-game blob.
pub fn split_games(text: &str) -> Vec<String> {
    let mut games = Vec::new();
    let mut current = String::new();
    let mut after_blank = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            after_blank = true;
            current.push('\n');
            continue;
        }
        if after_blank && trimmed.starts_with('[') && !current.trim().is_empty() {
            games.push(current.trim().to_string());
            current.clear();
        }
        after_blank = false;
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        games.push(current.trim().to_string());
    }
    games
}

/// Parse and replay a game. Any move that fails to replay fails the whole
/// conversion.
pub fn to_game(pgn: &str, source: Source) -> Result<Game, ChessError> {
    let parsed = parse_single(pgn);
    if parsed.moves.is_empty() {
        return Err(ChessError::EmptyGame);
    }

    let mut pos = start_position(&parsed.headers)?;
    let mut moves: Vec<ChessMove> = Vec::with_capacity(parsed.moves.len());
    for (ply, token) in parsed.moves.iter().enumerate() {
        let mv = parse_san_move(&pos, token).map_err(|_| {
            debug!(ply, token = token.as_str(), "PGN replay failed");
            ChessError::InvalidPgn(format!("illegal move {} at ply {}", token, ply + 1))
        })?;
        moves.push(describe_move(&pos, mv));
        pos.play_unchecked(mv);
    }

    let headers = &parsed.headers;
    let metadata = GameMetadata {
        id: generate_game_id(headers),
        white: header(headers, "White").unwrap_or("Unknown").to_string(),
        black: header(headers, "Black").unwrap_or("Unknown").to_string(),
        result: header(headers, "Result").unwrap_or("*").to_string(),
        date: header(headers, "Date")
            .map(str::to_string)
            .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string()),
        white_rating: header_int(headers, "WhiteElo"),
        black_rating: header_int(headers, "BlackElo"),
        time_control: header(headers, "TimeControl").map(str::to_string),
        opening: header(headers, "Opening")
            .or_else(|| header(headers, "ECO"))
            .map(str::to_string),
        source,
    };

    Ok(Game {
        metadata,
        pgn: pgn.to_string(),
        moves,
    })
}

fn start_position(headers: &BTreeMap<String, String>) -> Result<Chess, ChessError> {
    match headers.get("FEN") {
        Some(fen) if headers.get("SetUp").map(String::as_str) != Some("0") => parse_fen(fen),
        _ => Ok(Chess::default()),
    }
}

fn generate_game_id(headers: &BTreeMap<String, String>) -> String {
    let field = |key: &str| headers.get(key).cloned().unwrap_or_default();
    let parts = [
        field("Site"),
        field("Date"),
        field("White"),
        field("Black"),
        chrono::Utc::now().timestamp_millis().to_string(),
    ];
    parts
        .join("-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

/// Check that every move of the game replays legally.
pub fn validate(pgn: &str) -> Result<(), ChessError> {
    match to_game(pgn, Source::Manual) {
        Ok(_) | Err(ChessError::EmptyGame) => Ok(()),
        Err(e) => Err(e),
    }
}

pub fn extract_headers(pgn: &str) -> BTreeMap<String, String> {
    parse_single(pgn).headers
}

pub fn extract_moves_only(pgn: &str) -> Vec<String> {
    parse_single(pgn).moves
}

/// FEN after the first `plies` moves (clamped to the game length).
pub fn position_at(pgn: &str, plies: usize) -> Result<String, ChessError> {
    let parsed = parse_single(pgn);
    let mut pos = start_position(&parsed.headers)?;
    for token in parsed.moves.iter().take(plies) {
        let mv = parse_san_move(&pos, token)?;
        pos.play_unchecked(mv);
    }
    Ok(fen_of(&pos))
}

/// Render headers and SAN moves as PGN text, movetext wrapped at 80 columns.
pub fn create(headers: &BTreeMap<String, String>, moves: &[String]) -> String {
    let mut pgn = String::new();

    for key in SEVEN_TAG_ROSTER {
        if let Some(value) = headers.get(key) {
            pgn.push_str(&format!("[{} \"{}\"]\n", key, value));
        }
    }
    for (key, value) in headers {
        if !SEVEN_TAG_ROSTER.contains(&key.as_str()) {
            pgn.push_str(&format!("[{} \"{}\"]\n", key, value));
        }
    }
    pgn.push('\n');

    let mut words = Vec::with_capacity(moves.len() * 3 / 2 + 1);
    for (i, mv) in moves.iter().enumerate() {
        if i % 2 == 0 {
            words.push(format!("{}.", i / 2 + 1));
        }
        words.push(mv.clone());
    }
    words.push(
        headers
            .get("Result")
            .cloned()
            .unwrap_or_else(|| "*".to_string()),
    );

    pgn.push_str(&wrap(&words, WRAP_WIDTH));
    pgn
}

fn wrap(words: &[String], width: usize) -> String {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in words {
        if !line.is_empty() && line.len() + word.len() + 1 > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines.join("\n")
}

/// Value of a tag, treating empty values and `?` placeholders as absent.
pub fn header<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && !v.starts_with('?'))
}

pub fn header_int(headers: &BTreeMap<String, String>, name: &str) -> Option<i32> {
    header(headers, name)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[Event "Rated Blitz game"]
[Site "https://lichess.org/abcd1234"]
[Date "2024.03.02"]
[White "Player1"]
[Black "Player2"]
[Result "1-0"]
[WhiteElo "1500"]
[BlackElo "1600"]
[TimeControl "300+3"]
[Opening "Italian Game"]

1. e4 { best } e5 2. Nf3 (2. f4 exf4 (2... d5)) Nc6 3. Bc4 $1 Bc5 1-0"#;

    #[test]
    fn test_parse_single_strips_annotations() {
        let parsed = parse_single(SAMPLE);
        assert_eq!(parsed.headers["White"], "Player1");
        assert_eq!(parsed.headers["Result"], "1-0");
        assert_eq!(parsed.moves, vec!["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5"]);
    }

    #[test]
    fn test_black_move_numbers() {
        let parsed = parse_single("12... Qxd5+ 13. O-O-O Kb8 *");
        assert_eq!(parsed.moves, vec!["Qxd5+", "O-O-O", "Kb8"]);
    }

    #[test]
    fn test_to_game_replays_moves() {
        let game = to_game(SAMPLE, Source::Lichess).unwrap();
        assert_eq!(game.moves.len(), 6);
        assert!(game.is_contiguous());
        assert_eq!(game.metadata.white_rating, Some(1500));
        assert_eq!(game.metadata.opening.as_deref(), Some("Italian Game"));
        assert_eq!(game.metadata.source, Source::Lichess);
        assert!(game.metadata.id.starts_with("httpslichessorgabcd1234-20240302-Player1-Player2-"));
        assert_eq!(game.moves[2].lan, "g1f3");
    }

    #[test]
    fn test_to_game_defaults() {
        let game = to_game("1. d4 d5 *", Source::Manual).unwrap();
        assert_eq!(game.metadata.white, "Unknown");
        assert_eq!(game.metadata.result, "*");
        assert_eq!(game.metadata.date.len(), 10);
    }

    #[test]
    fn test_to_game_fails_on_illegal_move() {
        assert!(to_game("1. e4 e5 2. Ke2 *", Source::Manual).is_ok());
        let err = to_game("1. e4 e5 2. Ke4 *", Source::Manual);
        assert!(matches!(err, Err(ChessError::InvalidPgn(_))));
        assert!(validate("1. e4 e5 2. Ke4 *").is_err());
    }

    #[test]
    fn test_parse_multiple() {
        let blob = format!("{}\n\n{}\n", SAMPLE, "[White \"A\"]\n[Black \"B\"]\n\n1. d4 *");
        let games = parse_multiple(&blob);
        assert_eq!(games.len(), 2);
        assert_eq!(games[1].headers["White"], "A");
        assert_eq!(games[1].moves, vec!["d4"]);
    }

    #[test]
    fn test_create_round_trip() {
        let mut headers = BTreeMap::new();
        headers.insert("Event".to_string(), "Casual".to_string());
        headers.insert("White".to_string(), "Alice".to_string());
        headers.insert("Black".to_string(), "Bob".to_string());
        headers.insert("Result".to_string(), "1-0".to_string());
        headers.insert("Annotator".to_string(), "Coach".to_string());

        // Ten full moves with captures, a promotion and both castles
        let moves: Vec<String> = [
            "e4", "d5", "exd5", "c6", "dxc6", "Nf6", "cxb7", "Nbd7", "bxa8=Q", "Qb6", "Qxa7",
            "e5", "Nf3", "Bd6", "Be2", "O-O", "O-O", "Re8", "d3", "Bb7",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let text = create(&headers, &moves);
        assert!(text.starts_with("[Event \"Casual\"]\n[White \"Alice\"]"));
        assert!(text.lines().all(|l| l.len() <= 80));

        let parsed = parse_single(&text);
        assert_eq!(parsed.headers, headers);
        assert_eq!(parsed.moves, moves);

        let game = to_game(&text, Source::Manual).unwrap();
        assert_eq!(game.moves.len(), 20);
        assert_eq!(game.moves[8].promotion, Some('q'));
    }

    #[test]
    fn test_position_at() {
        let fen = position_at(SAMPLE, 2).unwrap();
        assert_eq!(fen, "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2");
        assert_eq!(position_at(SAMPLE, 0).unwrap(), crate::position::START_FEN);
    }

    #[test]
    fn test_header_placeholders_read_as_absent() {
        let pgn = "[White \"anna\"]\n[Black \"\"]\n[WhiteElo \"1500\"]\n[BlackElo \"?\"]\n[Date \"????.??.??\"]\n[ECO \"C20\"]\n[Opening \"\"]\n\n1. e4 e5 *";
        let headers = extract_headers(pgn);
        assert_eq!(header(&headers, "White"), Some("anna"));
        assert_eq!(header_int(&headers, "WhiteElo"), Some(1500));
        assert_eq!(header_int(&headers, "BlackElo"), None);
        assert_eq!(header(&headers, "Missing"), None);

        let game = to_game(pgn, Source::Manual).unwrap();
        assert_eq!(game.metadata.black, "Unknown");
        assert_eq!(game.metadata.white_rating, Some(1500));
        assert_eq!(game.metadata.black_rating, None);
        assert_eq!(game.metadata.opening.as_deref(), Some("C20"));
        assert_eq!(game.metadata.date.len(), 10);
        assert!(!game.metadata.date.starts_with('?'));
    }
}
