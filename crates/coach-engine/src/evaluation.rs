use serde::{Deserialize, Serialize};

use crate::uci::{InfoLine, Score};

/// Any mate score maps to this many centipawns.
pub const MATE_SCORE: i32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    Cp,
    Mate,
}

/// One ranked line from a multi-PV search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvLine {
    pub rank: u32,
    pub kind: ScoreKind,
    pub value: i32,
    pub pv: Vec<String>,
}

impl PvLine {
    pub fn first_move(&self) -> Option<&str> {
        self.pv.first().map(String::as_str)
    }

    pub fn cp_equivalent(&self) -> i32 {
        cp_equivalent(self.kind, self.value)
    }
}

/// Result of one completed search, from the side to move's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub kind: ScoreKind,
    pub value: i32,
    pub depth: u32,
    pub nodes: Option<u64>,
    pub elapsed_ms: Option<u64>,
    pub principal_variation: Vec<String>,
    pub best_move: Option<String>,
    /// Ranked lines when more than one PV was requested, best first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<PvLine>,
}

impl Evaluation {
    pub fn centipawns(value: i32) -> Self {
        Self::bare(ScoreKind::Cp, value)
    }

    pub fn mate_in(moves: i32) -> Self {
        Self::bare(ScoreKind::Mate, moves)
    }

    fn bare(kind: ScoreKind, value: i32) -> Self {
        Self {
            kind,
            value,
            depth: 0,
            nodes: None,
            elapsed_ms: None,
            principal_variation: Vec::new(),
            best_move: None,
            lines: Vec::new(),
        }
    }

    pub fn with_best_move(mut self, best: &str) -> Self {
        self.best_move = Some(best.to_string());
        self
    }

    /// Build a provisional evaluation from a usable `info` line.
    pub fn from_info(info: &InfoLine) -> Option<Self> {
        if !info.is_evaluation() {
            return None;
        }
        let (kind, value) = match info.score? {
            Score::Cp(v) => (ScoreKind::Cp, v),
            Score::Mate(v) => (ScoreKind::Mate, v),
        };
        Some(Self {
            kind,
            value,
            depth: info.depth?,
            nodes: info.nodes,
            elapsed_ms: info.time_ms,
            principal_variation: info.pv.clone(),
            best_move: None,
            lines: Vec::new(),
        })
    }

    pub fn is_mate(&self) -> bool {
        self.kind == ScoreKind::Mate
    }

    /// Score in centipawns with mates pinned to +/-[`MATE_SCORE`].
    pub fn cp_equivalent(&self) -> i32 {
        cp_equivalent(self.kind, self.value)
    }
}

fn cp_equivalent(kind: ScoreKind, value: i32) -> i32 {
    match kind {
        ScoreKind::Cp => value.clamp(-MATE_SCORE, MATE_SCORE),
        // "mate 0" means the side to move is already mated
        ScoreKind::Mate if value > 0 => MATE_SCORE,
        ScoreKind::Mate => -MATE_SCORE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uci::parse_info;

    #[test]
    fn test_from_info_requires_depth_and_score() {
        let info = parse_info("info depth 14 score cp -42 nodes 5000 time 20 pv d7d5 c2c4");
        let eval = Evaluation::from_info(&info).unwrap();
        assert_eq!(eval.kind, ScoreKind::Cp);
        assert_eq!(eval.value, -42);
        assert_eq!(eval.depth, 14);
        assert_eq!(eval.principal_variation, vec!["d7d5", "c2c4"]);

        assert!(Evaluation::from_info(&parse_info("info depth 14 nodes 5")).is_none());
        assert!(Evaluation::from_info(&parse_info("info score cp 10")).is_none());
    }

    #[test]
    fn test_cp_equivalent() {
        assert_eq!(Evaluation::mate_in(3).cp_equivalent(), MATE_SCORE);
        assert_eq!(Evaluation::mate_in(-2).cp_equivalent(), -MATE_SCORE);
        assert_eq!(Evaluation::mate_in(0).cp_equivalent(), -MATE_SCORE);
        assert_eq!(Evaluation::centipawns(123).cp_equivalent(), 123);
        assert_eq!(Evaluation::centipawns(40_000).cp_equivalent(), MATE_SCORE);
    }
}
