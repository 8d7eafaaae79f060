use decided_core::elo::{DEFAULT_ELO, UserMovieElo};
use decided_core::ids::{MovieId, UserId};
use diesel::prelude::*;
use diesel::Connection;
use time::OffsetDateTime;

use crate::schema::user_movie_elo;
use crate::{DataError, DataResult};

#[derive(Identifiable, Insertable, Queryable, AsChangeset, Debug, Clone)]
#[diesel(table_name = user_movie_elo, primary_key(user_id, movie_id))]
struct DbUserMovieElo {
    user_id: uuid::Uuid,
    movie_id: String,
    elo_rating: f64,
    matches_played: i32,
    wins: i32,
    losses: i32,
    last_updated: OffsetDateTime,
}

impl DbUserMovieElo {
    fn into_core(self) -> UserMovieElo {
        UserMovieElo {
            user_id: UserId::from(self.user_id),
            movie_id: MovieId::from(self.movie_id),
            elo_rating: self.elo_rating,
            matches_played: self.matches_played,
            wins: self.wins,
            losses: self.losses,
            last_updated: self.last_updated,
        }
    }
}

fn default_row(user_id: UserId, movie_id: &MovieId) -> UserMovieElo {
    UserMovieElo {
        user_id,
        movie_id: movie_id.clone(),
        elo_rating: DEFAULT_ELO,
        matches_played: 0,
        wins: 0,
        losses: 0,
        last_updated: OffsetDateTime::now_utc(),
    }
}

pub fn get_or_default(conn: &mut PgConnection, user_id: UserId, movie_id: &MovieId) -> DataResult<UserMovieElo> {
    let found = user_movie_elo::table
        .find((user_id.as_uuid(), movie_id.as_str()))
        .first::<DbUserMovieElo>(conn)
        .optional()?;
    Ok(found.map(DbUserMovieElo::into_core).unwrap_or_else(|| default_row(user_id, movie_id)))
}

/// Read-modify-write under a row lock (spec §4.1 `upsert_elo`):
/// `mutate` receives the current rating (or the default if unseen) and
/// returns the new rating, win/loss delta is inferred from which of the
/// pick's two calls is the winner via `is_win`.
pub fn upsert_elo(
    conn: &mut PgConnection,
    user_id: UserId,
    movie_id: &MovieId,
    is_win: bool,
    mutate: impl FnOnce(f64, i32) -> f64,
) -> DataResult<UserMovieElo> {
    conn.transaction(|conn| {
        let locked = user_movie_elo::table
            .find((user_id.as_uuid(), movie_id.as_str()))
            .for_update()
            .first::<DbUserMovieElo>(conn)
            .optional()?;

        let current = locked.map(DbUserMovieElo::into_core).unwrap_or_else(|| default_row(user_id, movie_id));
        let new_rating = mutate(current.elo_rating, current.matches_played);
        let row = DbUserMovieElo {
            user_id: user_id.as_uuid(),
            movie_id: movie_id.as_str().to_owned(),
            elo_rating: new_rating,
            matches_played: current.matches_played + 1,
            wins: current.wins + if is_win { 1 } else { 0 },
            losses: current.losses + if is_win { 0 } else { 1 },
            last_updated: OffsetDateTime::now_utc(),
        };
        let upserted: DbUserMovieElo = diesel::insert_into(user_movie_elo::table)
            .values(&row)
            .on_conflict((user_movie_elo::user_id, user_movie_elo::movie_id))
            .do_update()
            .set(&row)
            .get_result(conn)?;
        Ok::<_, DataError>(upserted.into_core())
    })
}
