use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ids::{MovieId, UserId};
use crate::movie::{merge_watchlists, Movie};
use crate::pick::BracketPick;

pub const MIN_CATALOG_SIZE: usize = 4;

/// A pair of movies in a specific round. `movie_b` is absent only for a
/// first-round bye (an empty opponent slot, not a placeholder entry —
/// `movie_a` simply advances without a pick being required).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: String,
    pub round_number: i32,
    pub movie_a: Movie,
    pub movie_b: Option<Movie>,
}

impl Match {
    pub fn is_bye(&self) -> bool {
        self.movie_b.is_none()
    }

    pub fn contains(&self, movie_id: &MovieId) -> bool {
        self.movie_a.id == *movie_id || self.movie_b.as_ref().is_some_and(|m| m.id == *movie_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub tournament_id: String,
    pub total_rounds: i32,
    pub current_round: i32,
    pub matches: Vec<Match>,
    pub final_movies: Option<(Movie, Movie)>,
    pub is_final_round: bool,
}

impl Tournament {
    pub fn matches_in_round(&self, round: i32) -> impl Iterator<Item = &Match> {
        self.matches.iter().filter(move |m| m.round_number == round)
    }

    pub fn find_match(&self, match_id: &str) -> Option<&Match> {
        self.matches.iter().find(|m| m.match_id == match_id)
    }
}

fn match_id(round: i32, index: usize) -> String {
    format!("r{round}-m{}", index + 1)
}

/// Deterministic seeding: shared movies (picked by both users) first, then
/// by descending popularity, tie-breaking by ascending movie id. Pure
/// function of its inputs so both clients reach identical ordering without
/// negotiating with the server.
fn seed(mut movies: Vec<Movie>) -> Vec<Movie> {
    movies.sort_by(|a, b| {
        b.is_shared()
            .cmp(&a.is_shared())
            .then_with(|| {
                b.popularity
                    .unwrap_or(f64::MIN)
                    .partial_cmp(&a.popularity.unwrap_or(f64::MIN))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    });
    movies
}

/// Generates a round-1 bracket from two users' watchlists (spec §4.4).
/// `watchlist_a`/`watchlist_b` must already carry `source_user_ids` set to
/// each contributing user before calling this.
pub fn generate_bracket(
    tournament_id: String,
    watchlist_a: Vec<Movie>,
    watchlist_b: Vec<Movie>,
) -> CoreResult<Tournament> {
    let merged = merge_watchlists(&watchlist_a, &watchlist_b);
    build_bracket(tournament_id, merged)
}

/// Deterministic placeholder catalog used only when `test_mode` is enabled
/// in server configuration and the real merged catalog is too small. Never
/// reachable from user input (spec §4.4 step 3).
pub fn synthetic_test_catalog(user_a: UserId, user_b: UserId) -> Vec<Movie> {
    (1..=4)
        .map(|n| Movie {
            id: MovieId(format!("test-movie-{n}")),
            title: format!("Test Movie {n}"),
            poster_path: None,
            source_user_ids: if n % 2 == 0 {
                [user_a, user_b].into_iter().collect()
            } else {
                [user_a].into_iter().collect()
            },
            popularity: Some(f64::from(n)),
        })
        .collect()
}

fn build_bracket(tournament_id: String, merged: Vec<Movie>) -> CoreResult<Tournament> {
    let n = merged.len();
    if n < MIN_CATALOG_SIZE {
        return Err(CoreError::InsufficientCatalog);
    }

    let seeded = seed(merged);
    let total_rounds = n.next_power_of_two().trailing_zeros() as i32;
    let bracket_size = 1usize << total_rounds;
    let num_byes = bracket_size - n;

    // Top `num_byes` seeds skip round 1 (bye matches); the rest are paired
    // mirrored (strongest remaining seed vs weakest remaining seed).
    let (bye_seeds, paired_seeds) = seeded.split_at(num_byes);

    let mut matches = Vec::with_capacity(bracket_size / 2);
    for movie in bye_seeds {
        let idx = matches.len();
        matches.push(Match {
            match_id: match_id(1, idx),
            round_number: 1,
            movie_a: movie.clone(),
            movie_b: None,
        });
    }

    let pair_count = paired_seeds.len() / 2;
    for i in 0..pair_count {
        let idx = matches.len();
        matches.push(Match {
            match_id: match_id(1, idx),
            round_number: 1,
            movie_a: paired_seeds[i].clone(),
            movie_b: Some(paired_seeds[paired_seeds.len() - 1 - i].clone()),
        });
    }

    let is_final_round = total_rounds == 1;
    Ok(Tournament {
        tournament_id,
        total_rounds,
        current_round: 1,
        matches,
        final_movies: None,
        is_final_round,
    })
}

/// Outcome of resolving one match: the winning movie and whether the two
/// pickers actually agreed (vs. the tie-break having been applied).
pub struct MatchOutcome {
    pub match_id: String,
    pub winner: Movie,
    pub agreed: bool,
}

/// Resolves the winner of a single contested match. `elo_of` looks up a
/// user's Elo rating for a movie (callers default missing rows to 1200).
fn resolve_match(
    m: &Match,
    picks: &[&BracketPick],
    elo_of: &dyn Fn(UserId, &MovieId) -> f64,
) -> MatchOutcome {
    if m.is_bye() {
        return MatchOutcome {
            match_id: m.match_id.clone(),
            winner: m.movie_a.clone(),
            agreed: true,
        };
    }
    let movie_b = m.movie_b.as_ref().expect("non-bye match has movie_b");

    let selections: Vec<&MovieId> = picks.iter().map(|p| &p.selected_movie_id).collect();
    let agreed = selections.windows(2).all(|w| w[0] == w[1]);

    let winner = if agreed {
        if *selections[0] == m.movie_a.id { m.movie_a.clone() } else { movie_b.clone() }
    } else {
        let combined_a: f64 = picks.iter().map(|p| elo_of(p.user_id, &m.movie_a.id)).sum();
        let combined_b: f64 = picks.iter().map(|p| elo_of(p.user_id, &movie_b.id)).sum();
        if combined_a > combined_b {
            m.movie_a.clone()
        } else if combined_b > combined_a {
            movie_b.clone()
        } else if m.movie_a.id <= movie_b.id {
            m.movie_a.clone()
        } else {
            movie_b.clone()
        }
    };

    MatchOutcome { match_id: m.match_id.clone(), winner, agreed }
}

/// Advances the tournament from its current round to the next, given every
/// pick submitted for the current round. Precondition (checked by the
/// action processor, not here): every non-bye match in the current round
/// has at least two picks.
pub fn advance_round(
    tournament: &Tournament,
    picks_by_match: &std::collections::HashMap<String, Vec<&BracketPick>>,
    elo_of: &dyn Fn(UserId, &MovieId) -> f64,
) -> (Tournament, Vec<MatchOutcome>) {
    let current = tournament.current_round;
    let current_matches: Vec<&Match> = tournament.matches_in_round(current).collect();

    let outcomes: Vec<MatchOutcome> = current_matches
        .iter()
        .map(|m| {
            let empty = Vec::new();
            let picks = picks_by_match.get(&m.match_id).unwrap_or(&empty);
            resolve_match(m, picks, elo_of)
        })
        .collect();

    let advancing: Vec<Movie> = outcomes.iter().map(|o| o.winner.clone()).collect();

    if advancing.len() == 1 {
        // Should not happen in practice: the round with exactly one match
        // is already marked final and resolves directly to a winner.
        let mut next = tournament.clone();
        next.is_final_round = true;
        return (next, outcomes);
    }

    let next_round = current + 1;
    let mut next_matches = tournament.matches.clone();
    for (i, pair) in advancing.chunks(2).enumerate() {
        next_matches.push(Match {
            match_id: match_id(next_round, i),
            round_number: next_round,
            movie_a: pair[0].clone(),
            movie_b: pair.get(1).cloned(),
        });
    }

    let next_match_count = advancing.len() / 2;
    let is_final_round = next_match_count == 1;
    let final_movies = if is_final_round {
        let pair = advancing.chunks(2).next().expect("at least one pair");
        Some((pair[0].clone(), pair[1].clone()))
    } else {
        None
    };

    let next = Tournament {
        tournament_id: tournament.tournament_id.clone(),
        total_rounds: tournament.total_rounds,
        current_round: next_round,
        matches: next_matches,
        final_movies,
        is_final_round,
    };

    (next, outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MovieId;

    fn movie(id: &str, users: &[UserId]) -> Movie {
        Movie {
            id: MovieId(id.to_owned()),
            title: id.to_owned(),
            poster_path: None,
            source_user_ids: users.iter().copied().collect(),
            popularity: None,
        }
    }

    #[test]
    fn four_movies_yields_two_rounds_two_matches() {
        let u1 = UserId::new();
        let u2 = UserId::new();
        let a = vec![movie("m1", &[u1]), movie("m2", &[u1])];
        let b = vec![movie("m3", &[u2]), movie("m4", &[u2])];
        let t = generate_bracket("t1".into(), a, b).unwrap();
        assert_eq!(t.total_rounds, 2);
        assert_eq!(t.matches_in_round(1).count(), 2);
        assert!(!t.is_final_round);
        let ids: std::collections::BTreeSet<_> =
            t.matches_in_round(1).flat_map(|m| vec![m.movie_a.id.clone(), m.movie_b.clone().unwrap().id]).collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn below_minimum_is_rejected() {
        let u1 = UserId::new();
        let a = vec![movie("m1", &[u1])];
        let b = vec![movie("m2", &[u1])];
        assert_eq!(generate_bracket("t".into(), a, b), Err(CoreError::InsufficientCatalog));
    }

    #[test]
    fn five_movies_have_three_byes_and_four_round_one_slots() {
        let u1 = UserId::new();
        let a = vec![movie("m1", &[u1]), movie("m2", &[u1]), movie("m3", &[u1])];
        let b = vec![movie("m4", &[u1]), movie("m5", &[u1])];
        let t = generate_bracket("t".into(), a, b).unwrap();
        assert_eq!(t.total_rounds, 3);
        assert_eq!(t.matches_in_round(1).count(), 4);
        assert_eq!(t.matches_in_round(1).filter(|m| m.is_bye()).count(), 3);
    }

    #[test]
    fn seeding_is_deterministic() {
        let u1 = UserId::new();
        let u2 = UserId::new();
        let a = vec![movie("m2", &[u1]), movie("m1", &[u1])];
        let b = vec![movie("m3", &[u2]), movie("m4", &[u2])];
        let t1 = generate_bracket("t".into(), a.clone(), b.clone()).unwrap();
        let t2 = generate_bracket("t".into(), a, b).unwrap();
        assert_eq!(t1.matches, t2.matches);
    }

    #[test]
    fn disagreement_resolves_by_elo_then_smaller_id() {
        let u1 = UserId::new();
        let u2 = UserId::new();
        let a = vec![movie("m1", &[u1]), movie("m2", &[u1])];
        let b = vec![movie("m3", &[u2]), movie("m4", &[u2])];
        let t = generate_bracket("t".into(), a, b).unwrap();
        let m = t.matches_in_round(1).next().unwrap();
        let p1 = BracketPick {
            room_id: crate::ids::RoomId::new(),
            user_id: u1,
            round_number: 1,
            match_id: m.match_id.clone(),
            movie_a_id: m.movie_a.id.clone(),
            movie_b_id: m.movie_b.clone().unwrap().id,
            selected_movie_id: m.movie_a.id.clone(),
            response_time_ms: None,
            created_at: time::OffsetDateTime::now_utc(),
        };
        let mut p2 = p1.clone();
        p2.user_id = u2;
        p2.selected_movie_id = m.movie_b.clone().unwrap().id;
        let mut picks_by_match = std::collections::HashMap::new();
        let p1r = &p1;
        let p2r = &p2;
        picks_by_match.insert(m.match_id.clone(), vec![p1r, p2r]);
        let outcome = resolve_match(m, &[p1r, p2r], &|_, _| 1200.0);
        assert!(!outcome.agreed);
        let expected = std::cmp::min(m.movie_a.id.clone(), m.movie_b.clone().unwrap().id);
        assert_eq!(outcome.winner.id, expected);
    }
}
