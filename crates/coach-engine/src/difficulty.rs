//! Rating -> engine strength mapping, and the post-game adjustment rule.
//!
//! Everything here is pure. Randomness is injected through an [`Rng`] so
//! callers and tests control it; the `rand::rng()` conveniences exist for
//! play.

use rand::Rng;
use serde::{Deserialize, Serialize};

pub const MIN_RATING: u32 = 400;
pub const MAX_RATING: u32 = 3000;

pub const MIN_DEPTH: u32 = 3;
pub const MAX_DEPTH: u32 = 22;
pub const MIN_MOVE_TIME_MS: u32 = 100;
pub const MAX_MOVE_TIME_MS: u32 = 3000;
pub const MAX_SKILL: f32 = 20.0;
pub const MAX_ERROR_RATE: f64 = 0.30;

const FULL_ANALYSIS_DEPTH: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultySettings {
    pub search_depth: u32,
    pub move_time_ms: u32,
    /// 0-20; half steps accumulate between games and are rounded when sent
    /// to the engine.
    pub skill_level: f32,
    pub error_rate: f64,
}

struct Band {
    below: u32,
    name: &'static str,
    settings: DifficultySettings,
}

const fn band(
    below: u32,
    name: &'static str,
    search_depth: u32,
    move_time_ms: u32,
    skill_level: f32,
    error_rate: f64,
) -> Band {
    Band {
        below,
        name,
        settings: DifficultySettings {
            search_depth,
            move_time_ms,
            skill_level,
            error_rate,
        },
    }
}

/// Ascending step table. A rating falls in the first band whose `below`
/// bound exceeds it.
const BANDS: [Band; 10] = [
    band(800, "Beginner", 1, 100, 0.0, 0.30),
    band(1000, "Novice", 3, 200, 2.0, 0.25),
    band(1200, "Casual", 5, 300, 5.0, 0.20),
    band(1400, "Intermediate", 6, 500, 8.0, 0.12),
    band(1600, "Club player", 8, 800, 11.0, 0.08),
    band(1800, "Advanced", 10, 1000, 14.0, 0.05),
    band(2000, "Expert", 12, 1200, 17.0, 0.03),
    band(2200, "Master", 13, 1500, 19.0, 0.01),
    band(2400, "Grandmaster", 14, 2000, 20.0, 0.005),
    band(u32::MAX, "Super-strong", 15, 2500, 20.0, 0.0),
];

fn band_for(rating: u32) -> &'static Band {
    let rating = rating.clamp(MIN_RATING, MAX_RATING);
    BANDS
        .iter()
        .find(|b| rating < b.below)
        .unwrap_or(&BANDS[BANDS.len() - 1])
}

pub fn calculate(rating: u32) -> DifficultySettings {
    band_for(rating).settings
}

pub fn band_name(rating: u32) -> &'static str {
    band_for(rating).name
}

/// Nudge settings after a game. A lopsided result (a win above 85%
/// accuracy, a loss below 60%) moves twice as far as a close one.
pub fn adjust(
    settings: &DifficultySettings,
    player_won: bool,
    move_accuracy: f64,
) -> DifficultySettings {
    let lopsided = (player_won && move_accuracy > 85.0) || (!player_won && move_accuracy < 60.0);
    let direction: i64 = if player_won { 1 } else { -1 };
    let (depth_step, time_step, skill_step, error_step) = match (lopsided, player_won) {
        (true, true) => (2, 200, 1.0, 0.02),
        (true, false) => (2, 200, 1.0, 0.03),
        (false, _) => (1, 100, 0.5, 0.01),
    };

    let depth = settings.search_depth as i64 + direction * depth_step;
    let move_time = settings.move_time_ms as i64 + direction * time_step;
    let skill = settings.skill_level + direction as f32 * skill_step;
    let error = settings.error_rate - direction as f64 * error_step;

    DifficultySettings {
        search_depth: depth.clamp(MIN_DEPTH as i64, MAX_DEPTH as i64) as u32,
        move_time_ms: move_time.clamp(MIN_MOVE_TIME_MS as i64, MAX_MOVE_TIME_MS as i64) as u32,
        skill_level: skill.clamp(0.0, MAX_SKILL),
        error_rate: round_rate(error.clamp(0.0, MAX_ERROR_RATE)),
    }
}

// Keeps repeated +/- steps from drifting (0.03 - 0.02 != 0.01 in f64).
fn round_rate(rate: f64) -> f64 {
    (rate * 10_000.0).round() / 10_000.0
}

pub fn estimate_rating(settings: &DifficultySettings) -> i32 {
    let base = settings.skill_level as f64 * 100.0 + 800.0;
    (base - settings.error_rate * 500.0).round() as i32
}

pub fn should_make_error(settings: &DifficultySettings) -> bool {
    should_make_error_with(settings, &mut rand::rng())
}

/// Bernoulli draw at the settings' error rate.
pub fn should_make_error_with<R: Rng>(settings: &DifficultySettings, rng: &mut R) -> bool {
    rng.random::<f64>() < settings.error_rate
}

pub fn error_move_index(settings: &DifficultySettings) -> usize {
    error_move_index_with(settings, &mut rand::rng())
}

/// How far down a best-first candidate list to reach: 10-19 for a blunder,
/// 3-9 for a mistake, 1-3 for an inaccuracy. Zero error rate always picks
/// the best move.
pub fn error_move_index_with<R: Rng>(settings: &DifficultySettings, rng: &mut R) -> usize {
    let rate = settings.error_rate;
    if rate <= 0.0 {
        return 0;
    }
    if rng.random::<f64>() < rate * 0.5 {
        10 + (rng.random::<f64>() * 10.0) as usize
    } else if rng.random::<f64>() < rate {
        3 + (rng.random::<f64>() * 7.0) as usize
    } else {
        1 + (rng.random::<f64>() * 3.0) as usize
    }
}

pub fn quick_analysis_depth(settings: &DifficultySettings) -> u32 {
    settings.search_depth.saturating_sub(5).max(10)
}

pub fn full_analysis_depth() -> u32 {
    FULL_ANALYSIS_DEPTH
}

/// Per-move budget under a clock: a share of the remaining time, never more
/// than the band's move time.
pub fn move_time_for_clock(
    remaining_ms: u64,
    moves_remaining: u32,
    settings: &DifficultySettings,
) -> u64 {
    let share = remaining_ms / (moves_remaining as u64 + 10);
    share.min(settings.move_time_ms as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DifficultyPreset {
    VeryEasy,
    Easy,
    Medium,
    Hard,
    VeryHard,
    Master,
}

impl DifficultyPreset {
    pub const ALL: [DifficultyPreset; 6] = [
        DifficultyPreset::VeryEasy,
        DifficultyPreset::Easy,
        DifficultyPreset::Medium,
        DifficultyPreset::Hard,
        DifficultyPreset::VeryHard,
        DifficultyPreset::Master,
    ];

    pub fn rating(&self) -> u32 {
        match self {
            DifficultyPreset::VeryEasy => 800,
            DifficultyPreset::Easy => 1200,
            DifficultyPreset::Medium => 1500,
            DifficultyPreset::Hard => 1800,
            DifficultyPreset::VeryHard => 2200,
            DifficultyPreset::Master => 2500,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DifficultyPreset::VeryEasy => "Very Easy (800)",
            DifficultyPreset::Easy => "Easy (1200)",
            DifficultyPreset::Medium => "Medium (1500)",
            DifficultyPreset::Hard => "Hard (1800)",
            DifficultyPreset::VeryHard => "Very Hard (2200)",
            DifficultyPreset::Master => "Master (2500)",
        }
    }

    pub fn settings(&self) -> DifficultySettings {
        calculate(self.rating())
    }
}
