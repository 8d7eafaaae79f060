use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{MovieId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMovieElo {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub elo_rating: f64,
    pub matches_played: i32,
    pub wins: i32,
    pub losses: i32,
    pub last_updated: OffsetDateTime,
}

pub const DEFAULT_ELO: f64 = 1200.0;
const EXPECTED_SCORE_DENOM: f64 = 400.0;

/// Adaptive K-factor based on experience (spec §4.3).
pub fn k_factor(matches_played: i32) -> f64 {
    if matches_played < 10 {
        40.0
    } else if matches_played < 25 {
        32.0
    } else {
        24.0
    }
}

/// Standard Elo update for a single pairwise result. `k` is the winner's
/// K-factor; the loser's own K-factor is applied symmetrically by the
/// caller if the two players' experience differs (here both "players" are
/// movies rated against the same user, so a single k is used for both).
pub fn update_elo(winner_rating: f64, loser_rating: f64, k: f64) -> (f64, f64) {
    let expected_winner = 1.0 / (1.0 + 10f64.powf((loser_rating - winner_rating) / EXPECTED_SCORE_DENOM));
    let expected_loser = 1.0 - expected_winner;

    let winner_delta = k * (1.0 - expected_winner);
    let loser_delta = k * (0.0 - expected_loser);

    (round_half_up(winner_rating + winner_delta), round_half_up(loser_rating + loser_delta))
}

/// Commutative half-up rounding to the nearest integer-valued f64, per
/// spec §8.8 (`winner_delta = -loser_delta` must hold ignoring rounding).
fn round_half_up(value: f64) -> f64 {
    (value + 0.5 * value.signum()).trunc()
}

/// A single pick produces one Elo match: `(selected_movie, rejected_movie)`
/// for the same user. Returns the two updated ratings.
pub fn apply_pick_result(
    selected: &UserMovieElo,
    rejected: &UserMovieElo,
) -> (f64, f64) {
    let matches_played = selected.matches_played.max(rejected.matches_played);
    let k = k_factor(matches_played);
    update_elo(selected.elo_rating, rejected.elo_rating, k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equal_ratings_split_evenly() {
        let (w, l) = update_elo(1200.0, 1200.0, 32.0);
        assert_eq!(w - 1200.0, -(l - 1200.0));
        assert!(w > 1200.0);
        assert!(l < 1200.0);
    }

    #[test]
    fn k_factor_tiers() {
        assert_eq!(k_factor(0), 40.0);
        assert_eq!(k_factor(9), 40.0);
        assert_eq!(k_factor(10), 32.0);
        assert_eq!(k_factor(24), 32.0);
        assert_eq!(k_factor(25), 24.0);
        assert_eq!(k_factor(100), 24.0);
    }

    proptest! {
        /// Corollary of property 8's exact-before-rounding symmetry: a
        /// winner's rating never decreases and a loser's never increases,
        /// for any rating pair and any positive K-factor.
        #[test]
        fn winner_never_loses_ground(winner in 0i32..3000, loser in 0i32..3000, k in 1.0f64..50.0) {
            let (w, l) = update_elo(winner as f64, loser as f64, k);
            prop_assert!(w >= winner as f64);
            prop_assert!(l <= loser as f64);
        }

        /// Ratings never move past a K-factor-bounded delta for any input pair.
        #[test]
        fn elo_update_stays_bounded(winner in 0i32..3000, loser in 0i32..3000, k in 1.0f64..50.0) {
            let (w, l) = update_elo(winner as f64, loser as f64, k);
            prop_assert!(w >= winner as f64 - k && w <= winner as f64 + k);
            prop_assert!(l >= loser as f64 - k && l <= loser as f64 + k);
        }
    }
}
