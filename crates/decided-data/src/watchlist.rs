use decided_core::ids::{MovieId, RoomId, UserId};
use decided_core::watchlist::{AddedFrom, WatchListEntry};
use diesel::prelude::*;
use time::OffsetDateTime;

use crate::schema::watchlist_entries;
use crate::DataResult;

#[derive(Identifiable, Insertable, Queryable, AsChangeset, Debug, Clone)]
#[diesel(table_name = watchlist_entries, primary_key(user_id, movie_id))]
struct DbWatchListEntry {
    user_id: uuid::Uuid,
    movie_id: String,
    title: String,
    movie_data: Option<serde_json::Value>,
    added_from: String,
    decided_together_room_id: Option<uuid::Uuid>,
    pending_rating: bool,
    is_watched: bool,
    watched_at: Option<OffsetDateTime>,
    rating: Option<f32>,
}

fn added_from_str(added_from: AddedFrom) -> &'static str {
    match added_from {
        AddedFrom::Survey => "survey",
        AddedFrom::Search => "search",
        AddedFrom::Manual => "manual",
        AddedFrom::DecidedTogether => "decided_together",
    }
}

impl From<&WatchListEntry> for DbWatchListEntry {
    fn from(entry: &WatchListEntry) -> Self {
        Self {
            user_id: entry.user_id.as_uuid(),
            movie_id: entry.movie_id.as_str().to_owned(),
            title: entry.title.clone(),
            movie_data: entry.movie_data.clone(),
            added_from: added_from_str(entry.added_from).to_owned(),
            decided_together_room_id: entry.decided_together_room_id.map(|id| id.as_uuid()),
            pending_rating: entry.pending_rating,
            is_watched: entry.is_watched,
            watched_at: entry.watched_at,
            rating: entry.rating,
        }
    }
}

/// Transactional batch upsert (spec §4.1 `upsert_watchlist_entries`): each
/// pair is keyed on `(user_id, movie_id)`, re-adding an existing entry
/// leaves its watched/rating state untouched.
pub fn upsert_watchlist_entries(conn: &mut PgConnection, entries: &[WatchListEntry]) -> DataResult<()> {
    use diesel::Connection;

    conn.transaction(|conn| {
        for entry in entries {
            let row = DbWatchListEntry::from(entry);
            diesel::insert_into(watchlist_entries::table)
                .values(&row)
                .on_conflict((watchlist_entries::user_id, watchlist_entries::movie_id))
                .do_nothing()
                .execute(conn)?;
        }
        Ok::<_, crate::DataError>(())
    })
}

pub fn mark_watched(conn: &mut PgConnection, user_id: UserId, movie_id: &MovieId, rating: Option<f32>) -> DataResult<()> {
    diesel::update(watchlist_entries::table.find((user_id.as_uuid(), movie_id.as_str())))
        .set((
            watchlist_entries::is_watched.eq(true),
            watchlist_entries::watched_at.eq(OffsetDateTime::now_utc()),
            watchlist_entries::rating.eq(rating),
            watchlist_entries::pending_rating.eq(false),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn list_for_user(conn: &mut PgConnection, user_id: UserId) -> DataResult<Vec<WatchListEntry>> {
    let rows = watchlist_entries::table
        .filter(watchlist_entries::user_id.eq(user_id.as_uuid()))
        .load::<DbWatchListEntry>(conn)?;
    Ok(rows
        .into_iter()
        .map(|row| WatchListEntry {
            user_id: UserId::from(row.user_id),
            movie_id: MovieId::from(row.movie_id),
            title: row.title,
            movie_data: row.movie_data,
            added_from: match row.added_from.as_str() {
                "survey" => AddedFrom::Survey,
                "search" => AddedFrom::Search,
                "manual" => AddedFrom::Manual,
                _ => AddedFrom::DecidedTogether,
            },
            decided_together_room_id: row.decided_together_room_id.map(RoomId::from),
            pending_rating: row.pending_rating,
            is_watched: row.is_watched,
            watched_at: row.watched_at,
            rating: row.rating,
        })
        .collect())
}
