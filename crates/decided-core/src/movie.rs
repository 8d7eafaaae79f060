use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::{MovieId, UserId};

/// A catalog movie as merged into a room's shared pool. `source_user_ids`
/// records who contributed it — used for seeding (shared picks first) and
/// tie-break decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub poster_path: Option<String>,
    pub source_user_ids: BTreeSet<UserId>,
    /// Optional popularity/vote signal from the catalog, used as a seeding
    /// tie-break when two movies are not shared by both users.
    pub popularity: Option<f64>,
}

impl Movie {
    pub fn is_shared(&self) -> bool {
        self.source_user_ids.len() >= 2
    }
}

/// Merge two users' watchlists into a single deduplicated pool, unioning
/// `source_user_ids` for movies both users carry. Pure and order-preserving
/// only insofar as the bracket engine re-sorts the result during seeding.
pub fn merge_watchlists(a: &[Movie], b: &[Movie]) -> Vec<Movie> {
    let mut merged: Vec<Movie> = Vec::with_capacity(a.len() + b.len());
    for movie in a.iter().chain(b.iter()) {
        if let Some(existing) = merged.iter_mut().find(|m: &&mut Movie| m.id == movie.id) {
            existing.source_user_ids.extend(movie.source_user_ids.iter().copied());
            if existing.popularity.is_none() {
                existing.popularity = movie.popularity;
            }
        } else {
            merged.push(movie.clone());
        }
    }
    merged
}
