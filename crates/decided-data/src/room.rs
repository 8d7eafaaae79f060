use std::collections::BTreeSet;

use decided_core::ids::{MovieId, RoomCode, RoomId, UserId};
use decided_core::pick::{BracketPick, MatchCompletion};
use decided_core::room::{Participant, Room, RoomStatus, Winner};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel::Connection;
use time::OffsetDateTime;

use crate::schema::*;
use crate::{DataError, DataResult};

#[derive(Identifiable, Insertable, Queryable, AsChangeset, Debug, Clone)]
#[diesel(table_name = rooms, primary_key(id))]
pub struct DbRoom {
    pub id: uuid::Uuid,
    pub code: String,
    pub owner_user_id: uuid::Uuid,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub closed_at: Option<OffsetDateTime>,
    pub tournament: Option<serde_json::Value>,
    pub winner: Option<serde_json::Value>,
    pub state_version: i64,
}

impl DbRoom {
    fn status(&self) -> RoomStatus {
        match self.status.as_str() {
            "waiting" => RoomStatus::Waiting,
            "active" => RoomStatus::Active,
            "completed" => RoomStatus::Completed,
            _ => RoomStatus::Abandoned,
        }
    }

    pub fn into_core(self) -> DataResult<Room> {
        Ok(Room {
            room_id: RoomId::from(self.id),
            code: RoomCode(self.code),
            owner_user_id: UserId::from(self.owner_user_id),
            status: self.status(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            closed_at: self.closed_at,
            tournament: self
                .tournament
                .map(|v| serde_json::from_value(v).map_err(DataError::from))
                .transpose()?,
            winner: self
                .winner
                .map(|v| serde_json::from_value(v).map_err(DataError::from))
                .transpose()?,
        })
    }
}

fn status_str(status: RoomStatus) -> &'static str {
    match status {
        RoomStatus::Waiting => "waiting",
        RoomStatus::Active => "active",
        RoomStatus::Completed => "completed",
        RoomStatus::Abandoned => "abandoned",
    }
}

#[derive(Identifiable, Insertable, Queryable, AsChangeset, Debug, Clone)]
#[diesel(table_name = participants, primary_key(room_id, user_id))]
pub struct DbParticipant {
    pub room_id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub display_name: String,
    pub joined_at: OffsetDateTime,
    pub left_at: Option<OffsetDateTime>,
    pub is_active: bool,
    pub current_match_index: i32,
    pub completed_match_ids: serde_json::Value,
}

impl DbParticipant {
    pub fn into_core(self) -> DataResult<Participant> {
        Ok(Participant {
            room_id: RoomId::from(self.room_id),
            user_id: UserId::from(self.user_id),
            display_name: self.display_name,
            joined_at: self.joined_at,
            left_at: self.left_at,
            is_active: self.is_active,
            current_match_index: self.current_match_index,
            completed_match_ids: serde_json::from_value(self.completed_match_ids)?,
        })
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = bracket_picks)]
pub struct NewDbBracketPick<'a> {
    pub room_id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub round_number: i32,
    pub match_id: &'a str,
    pub movie_a_id: &'a str,
    pub movie_b_id: &'a str,
    pub selected_movie_id: &'a str,
    pub response_time_ms: Option<i32>,
    pub created_at: OffsetDateTime,
}

#[derive(Queryable, Debug, Clone)]
struct DbBracketPickRow {
    #[diesel(column_name = id)]
    _id: i64,
    room_id: uuid::Uuid,
    user_id: uuid::Uuid,
    round_number: i32,
    match_id: String,
    movie_a_id: String,
    movie_b_id: String,
    selected_movie_id: String,
    response_time_ms: Option<i32>,
    created_at: OffsetDateTime,
}

impl DbBracketPickRow {
    fn into_core(self) -> BracketPick {
        BracketPick {
            room_id: RoomId::from(self.room_id),
            user_id: UserId::from(self.user_id),
            round_number: self.round_number,
            match_id: self.match_id,
            movie_a_id: MovieId::from(self.movie_a_id),
            movie_b_id: MovieId::from(self.movie_b_id),
            selected_movie_id: MovieId::from(self.selected_movie_id),
            response_time_ms: self.response_time_ms,
            created_at: self.created_at,
        }
    }
}

/// Creates a room, failing with `DataError::Diesel` on a `rooms_code_key`
/// uniqueness violation, which the caller (`decided-server`) translates to
/// `CoreError::InvalidInput("room code collision")`.
pub fn create_room(conn: &mut PgConnection, owner_user_id: UserId, code: &RoomCode) -> DataResult<Room> {
    let row = DbRoom {
        id: uuid::Uuid::new_v4(),
        code: code.0.clone(),
        owner_user_id: owner_user_id.as_uuid(),
        status: status_str(RoomStatus::Waiting).to_owned(),
        created_at: OffsetDateTime::now_utc(),
        started_at: None,
        completed_at: None,
        closed_at: None,
        tournament: None,
        winner: None,
        state_version: 0,
    };
    let inserted: DbRoom = diesel::insert_into(rooms::table)
        .values(&row)
        .get_result(conn)?;
    inserted.into_core()
}

pub fn code_exists(conn: &mut PgConnection, code: &RoomCode) -> DataResult<bool> {
    let query = rooms::table.filter(rooms::code.eq(&code.0));
    Ok(diesel_exists!(query, conn)?)
}

pub fn get_room_by_code(conn: &mut PgConnection, code: &RoomCode) -> DataResult<Room> {
    rooms::table
        .filter(rooms::code.eq(&code.0))
        .first::<DbRoom>(conn)
        .map_err(|e| map_not_found(e))?
        .into_core()
}

pub fn get_room(conn: &mut PgConnection, room_id: RoomId) -> DataResult<Room> {
    rooms::table
        .find(room_id.as_uuid())
        .first::<DbRoom>(conn)
        .map_err(|e| map_not_found(e))?
        .into_core()
}

/// Rooms the idle sweeper needs to consider: anything not yet `completed`
/// or `abandoned` (spec §4.7).
pub fn list_non_terminal_rooms(conn: &mut PgConnection) -> DataResult<Vec<Room>> {
    rooms::table
        .filter(rooms::status.eq(status_str(RoomStatus::Waiting)).or(rooms::status.eq(status_str(RoomStatus::Active))))
        .load::<DbRoom>(conn)?
        .into_iter()
        .map(DbRoom::into_core)
        .collect()
}

fn map_not_found(err: diesel::result::Error) -> DataError {
    match err {
        diesel::result::Error::NotFound => DataError::NotFound,
        other => DataError::from(other),
    }
}

/// Inserts or reactivates a participant row. Fails `RoomFull` (surfaced as
/// `diesel::result::Error::RollbackTransaction` translated upstream) if two
/// distinct active participants already exist.
pub fn upsert_participant(conn: &mut PgConnection, room_id: RoomId, user_id: UserId, display_name: String) -> DataResult<Participant> {
    conn.transaction(|conn| {
        let active_count: i64 = participants::table
            .filter(participants::room_id.eq(room_id.as_uuid()))
            .filter(participants::is_active.eq(true))
            .filter(participants::user_id.ne(user_id.as_uuid()))
            .count()
            .get_result(conn)?;
        if active_count >= 2 {
            return Err(diesel::result::Error::RollbackTransaction);
        }

        let now = OffsetDateTime::now_utc();
        let row = DbParticipant {
            room_id: room_id.as_uuid(),
            user_id: user_id.as_uuid(),
            display_name,
            joined_at: now,
            left_at: None,
            is_active: true,
            current_match_index: 0,
            completed_match_ids: serde_json::json!([]),
        };
        let upserted: DbParticipant = diesel::insert_into(participants::table)
            .values(&row)
            .on_conflict((participants::room_id, participants::user_id))
            .do_update()
            .set((
                participants::is_active.eq(true),
                participants::left_at.eq::<Option<OffsetDateTime>>(None),
                participants::display_name.eq(excluded(participants::display_name)),
            ))
            .get_result(conn)?;
        Ok(upserted)
    })
    .map_err(DataError::from)?
    .into_core()
}

pub fn deactivate_participant(conn: &mut PgConnection, room_id: RoomId, user_id: UserId) -> DataResult<()> {
    diesel::update(
        participants::table
            .filter(participants::room_id.eq(room_id.as_uuid()))
            .filter(participants::user_id.eq(user_id.as_uuid())),
    )
    .set((
        participants::is_active.eq(false),
        participants::left_at.eq(OffsetDateTime::now_utc()),
    ))
    .execute(conn)?;
    Ok(())
}

pub fn list_participants(conn: &mut PgConnection, room_id: RoomId, active_only: bool) -> DataResult<Vec<Participant>> {
    let mut query = participants::table.filter(participants::room_id.eq(room_id.as_uuid())).into_boxed();
    if active_only {
        query = query.filter(participants::is_active.eq(true));
    }
    query
        .load::<DbParticipant>(conn)?
        .into_iter()
        .map(DbParticipant::into_core)
        .collect()
}

/// Inserts a pick, relying on the `(room_id, user_id, match_id)` unique
/// index to make first-writer-wins authoritative (spec §4.1).
pub fn insert_pick(conn: &mut PgConnection, pick: &BracketPick) -> DataResult<()> {
    let new_row = NewDbBracketPick {
        room_id: pick.room_id.as_uuid(),
        user_id: pick.user_id.as_uuid(),
        round_number: pick.round_number,
        match_id: &pick.match_id,
        movie_a_id: pick.movie_a_id.as_str(),
        movie_b_id: pick.movie_b_id.as_str(),
        selected_movie_id: pick.selected_movie_id.as_str(),
        response_time_ms: pick.response_time_ms,
        created_at: pick.created_at,
    };
    match diesel::insert_into(bracket_picks::table).values(&new_row).execute(conn) {
        Ok(_) => Ok(()),
        Err(diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _)) => {
            Err(DataError::DuplicatePick)
        }
        Err(e) => Err(DataError::from(e)),
    }
}

pub fn list_picks(conn: &mut PgConnection, room_id: RoomId, round_number: Option<i32>) -> DataResult<Vec<BracketPick>> {
    let mut query = bracket_picks::table
        .filter(bracket_picks::room_id.eq(room_id.as_uuid()))
        .into_boxed();
    if let Some(round) = round_number {
        query = query.filter(bracket_picks::round_number.eq(round));
    }
    let rows: Vec<DbBracketPickRow> = query
        .select((
            bracket_picks::id,
            bracket_picks::room_id,
            bracket_picks::user_id,
            bracket_picks::round_number,
            bracket_picks::match_id,
            bracket_picks::movie_a_id,
            bracket_picks::movie_b_id,
            bracket_picks::selected_movie_id,
            bracket_picks::response_time_ms,
            bracket_picks::created_at,
        ))
        .load(conn)?;
    Ok(rows.into_iter().map(DbBracketPickRow::into_core).collect())
}

pub fn insert_match_completion(conn: &mut PgConnection, completion: &MatchCompletion) -> DataResult<()> {
    diesel::insert_into(match_completions::table)
        .values((
            match_completions::room_id.eq(completion.room_id.as_uuid()),
            match_completions::match_id.eq(&completion.match_id),
            match_completions::round_number.eq(completion.round_number),
            match_completions::completed_at.eq(completion.completed_at),
            match_completions::next_match_id.eq(&completion.next_match_id),
        ))
        .on_conflict((match_completions::room_id, match_completions::match_id))
        .do_nothing()
        .execute(conn)?;
    Ok(())
}

pub fn list_completions(conn: &mut PgConnection, room_id: RoomId) -> DataResult<BTreeSet<String>> {
    let ids = match_completions::table
        .filter(match_completions::room_id.eq(room_id.as_uuid()))
        .select(match_completions::match_id)
        .load::<String>(conn)?;
    Ok(ids.into_iter().collect())
}

pub fn update_tournament(conn: &mut PgConnection, room_id: RoomId, tournament: &decided_core::bracket::Tournament) -> DataResult<()> {
    diesel::update(rooms::table.find(room_id.as_uuid()))
        .set(rooms::tournament.eq(serde_json::to_value(tournament)?))
        .execute(conn)?;
    Ok(())
}

/// Clears a room's embedded bracket document without touching its status
/// (spec §4.1). Not on the happy path of any action today — no flow
/// currently resets a room's tournament in place — but named as a store
/// primitive independent from the status transitions that happen to use it.
pub fn clear_tournament(conn: &mut PgConnection, room_id: RoomId) -> DataResult<()> {
    diesel::update(rooms::table.find(room_id.as_uuid()))
        .set(rooms::tournament.eq::<Option<serde_json::Value>>(None))
        .execute(conn)?;
    Ok(())
}

pub struct RoomStatusUpdate {
    pub status: RoomStatus,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub closed_at: Option<OffsetDateTime>,
}

pub fn update_room_status(conn: &mut PgConnection, room_id: RoomId, update: RoomStatusUpdate) -> DataResult<()> {
    diesel::update(rooms::table.find(room_id.as_uuid()))
        .set((
            rooms::status.eq(status_str(update.status)),
            rooms::started_at.eq(update.started_at),
            rooms::completed_at.eq(update.completed_at),
            rooms::closed_at.eq(update.closed_at),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn set_winner(conn: &mut PgConnection, room_id: RoomId, winner: &Winner) -> DataResult<()> {
    diesel::update(rooms::table.find(room_id.as_uuid()))
        .set(rooms::winner.eq(serde_json::to_value(winner)?))
        .execute(conn)?;
    Ok(())
}

#[derive(Identifiable, Insertable, Queryable, AsChangeset, Debug, Clone)]
#[diesel(table_name = rooms, primary_key(id))]
struct DbRoomVersion {
    id: uuid::Uuid,
    state_version: i64,
}

/// Reads the currently-committed `state_version` without pulling the rest
/// of the row — used by the server's state manager when rebuilding a
/// snapshot from scratch (spec §4.6 `rebuild_from_store`).
pub fn get_state_version(conn: &mut PgConnection, room_id: RoomId) -> DataResult<i64> {
    let row: DbRoomVersion = rooms::table
        .find(room_id.as_uuid())
        .select((rooms::id, rooms::state_version))
        .first(conn)
        .map_err(map_not_found)?;
    Ok(row.state_version)
}

/// Optimistic concurrency write (spec §4.6): fails `DataError::VersionConflict`
/// unless the stored `state_version` is exactly `expected_version - 1`.
pub fn upsert_state_snapshot(
    conn: &mut PgConnection,
    room_id: RoomId,
    expected_version: i64,
) -> DataResult<()> {
    let updated = diesel::update(
        rooms::table
            .filter(rooms::id.eq(room_id.as_uuid()))
            .filter(rooms::state_version.eq(expected_version - 1)),
    )
    .set(rooms::state_version.eq(expected_version))
    .execute(conn)?;
    if updated == 0 {
        return Err(DataError::VersionConflict);
    }
    Ok(())
}

pub fn append_history(conn: &mut PgConnection, room_id: RoomId, event_type: &str, event_data: serde_json::Value) -> DataResult<()> {
    diesel::insert_into(room_history_events::table)
        .values((
            room_history_events::room_id.eq(room_id.as_uuid()),
            room_history_events::event_type.eq(event_type),
            room_history_events::event_data.eq(event_data),
            room_history_events::created_at.eq(OffsetDateTime::now_utc()),
        ))
        .execute(conn)?;
    Ok(())
}

/// All-or-nothing write for a resolved pick (spec §4.1 composite
/// transaction `commit_pick_advance`).
pub fn commit_pick_advance(
    conn: &mut PgConnection,
    room_id: RoomId,
    pick: &BracketPick,
    completions_to_insert: &[MatchCompletion],
    new_tournament: Option<&decided_core::bracket::Tournament>,
    new_status: Option<RoomStatusUpdate>,
    winner: Option<&Winner>,
    expected_version: i64,
) -> DataResult<()> {
    conn.transaction(|conn| {
        insert_pick(conn, pick)?;
        for completion in completions_to_insert {
            insert_match_completion(conn, completion)?;
        }
        if let Some(tournament) = new_tournament {
            update_tournament(conn, room_id, tournament)?;
        }
        if let Some(status) = new_status {
            update_room_status(conn, room_id, status)?;
        }
        if let Some(winner) = winner {
            set_winner(conn, room_id, winner)?;
        }
        upsert_state_snapshot(conn, room_id, expected_version)?;
        Ok::<_, DataError>(())
    })
}

/// All-or-nothing write for tournament completion (spec §4.1 composite
/// transaction `commit_complete_and_reward`): records the winner, moves the
/// room to `completed`, seeds both participants' watchlists with the winning
/// movie, and bumps the snapshot version — all or nothing.
pub fn commit_complete_and_reward(
    conn: &mut PgConnection,
    room_id: RoomId,
    winner: &Winner,
    watchlist_entries: &[decided_core::watchlist::WatchListEntry],
    final_status: RoomStatusUpdate,
    expected_version: i64,
) -> DataResult<()> {
    conn.transaction(|conn| {
        set_winner(conn, room_id, winner)?;
        update_room_status(conn, room_id, final_status)?;
        crate::watchlist::upsert_watchlist_entries(conn, watchlist_entries)?;
        upsert_state_snapshot(conn, room_id, expected_version)?;
        Ok::<_, DataError>(())
    })
}
