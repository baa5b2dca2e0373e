//! Elo delta calculation. Pure; the 100-point floor is applied by the store
//! at write time, not here.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    AWins,
    BWins,
    Draw,
}

fn k_factor(games_played: i32) -> f64 {
    if games_played < 10 {
        32.0
    } else if games_played < 30 {
        24.0
    } else {
        16.0
    }
}

/// Integer rating deltas for players A and B.
pub fn elo_deltas(
    rating_a: i32,
    games_a: i32,
    rating_b: i32,
    games_b: i32,
    result: MatchResult,
) -> (i32, i32) {
    let expected_a = 1.0 / (1.0 + 10f64.powf(f64::from(rating_b - rating_a) / 400.0));
    let expected_b = 1.0 - expected_a;

    let (score_a, score_b) = match result {
        MatchResult::AWins => (1.0, 0.0),
        MatchResult::BWins => (0.0, 1.0),
        MatchResult::Draw => (0.5, 0.5),
    };

    let delta_a = (k_factor(games_a) * (score_a - expected_a)).round() as i32;
    let delta_b = (k_factor(games_b) * (score_b - expected_b)).round() as i32;
    (delta_a, delta_b)
}
