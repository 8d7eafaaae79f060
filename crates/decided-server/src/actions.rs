//! The action processor (spec §4.5): the sole writer of room state. Every
//! public function here runs its store work under the room's coordinator
//! lock, commits atomically, rebuilds the snapshot, and publishes the
//! broadcast event(s) that follow from the commit — in that order, never
//! the reverse.

use std::collections::HashMap;
use std::sync::OnceLock;

use dashmap::DashMap;
use decided_core::bracket::{self, Tournament};
use decided_core::error::CoreError;
use decided_core::event::RoomEvent;
use decided_core::ids::{MovieId, RoomCode, RoomId, UserId};
use decided_core::movie::Movie;
use decided_core::pick::{BracketPick, MatchCompletion};
use decided_core::room::{Room, RoomStatus, Winner};
use decided_core::snapshot::{RoomView, UserProgress};
use decided_core::watchlist::WatchListEntry;
use decided_data::room::RoomStatusUpdate;
use decided_data::{DataError, DataResult, PgPooledConnection};
use diesel::{Connection, PgConnection};
use rand::Rng;
use time::OffsetDateTime;

use crate::{coordinator, elo_worker, state_manager, AppError, AppResult};

#[derive(Debug, Clone)]
pub struct PickRequest {
    pub match_id: String,
    pub round_number: i32,
    pub movie_a_id: MovieId,
    pub movie_b_id: MovieId,
    pub selected_movie_id: MovieId,
    pub response_time_ms: Option<i32>,
    pub idempotency_key: Option<String>,
}

/// Last response per `(room_id, "action:key")`, so a re-delivered action
/// with the same idempotency key echoes the original result instead of
/// re-executing (spec §4.5). Entries for a room are dropped once it goes
/// terminal, alongside its coordinator lock and broadcast channel.
static IDEMPOTENCY: OnceLock<DashMap<(RoomId, String), RoomView>> = OnceLock::new();

fn idempotency_cache() -> &'static DashMap<(RoomId, String), RoomView> {
    IDEMPOTENCY.get_or_init(DashMap::new)
}

fn blocking_err(join_err: tokio::task::JoinError) -> AppError {
    AppError::from(std::io::Error::other(join_err.to_string()))
}

fn connect() -> DataResult<PgPooledConnection> {
    decided_data::connect().map_err(DataError::from)
}

/// Bumps `state_version` by exactly one past whatever is currently
/// committed, inside the caller's transaction (spec I2).
fn bump_version(conn: &mut PgConnection, room_id: RoomId) -> DataResult<i64> {
    let current = decided_data::room::get_state_version(conn, room_id)?;
    let next = current + 1;
    decided_data::room::upsert_state_snapshot(conn, room_id, next)?;
    Ok(next)
}

fn require_active_participant(
    room: &Room,
    participants: &[decided_core::room::Participant],
    user_id: UserId,
) -> Result<(), CoreError> {
    room.require_active()?;
    if !participants.iter().any(|p| p.user_id == user_id && p.is_active) {
        return Err(CoreError::NotParticipant);
    }
    Ok(())
}

/// Rebuilds the authoritative snapshot, caches it, publishes `events`, then
/// returns the view personalized for `viewer`. Always runs in this order:
/// the broadcast must never race ahead of what a fresh `GET /state` would
/// see.
async fn finish(room_id: RoomId, viewer: UserId, events: Vec<RoomEvent>) -> AppResult<RoomView> {
    let snapshot = tokio::task::spawn_blocking(move || {
        let mut conn = connect()?;
        state_manager::rebuild_from_store(&mut conn, room_id)
    })
    .await
    .map_err(blocking_err)??;

    state_manager::get().save(snapshot.clone());
    for event in events {
        append_history_fire_and_forget(room_id, &event);
        crate::broadcast::get().publish(room_id, event);
    }

    let picked = tokio::task::spawn_blocking(move || {
        let mut conn = connect()?;
        state_manager::picked_match_ids(&mut conn, room_id, viewer)
    })
    .await
    .map_err(blocking_err)??;

    Ok(snapshot.personalize(viewer, &picked))
}

/// Records `event` to `room_history` (spec §4.1 "fire-and-forget semantics
/// allowed"). Runs detached from the action's own transaction: a history
/// write failure must never fail the action it's recording.
fn append_history_fire_and_forget(room_id: RoomId, event: &RoomEvent) {
    let Ok(value) = serde_json::to_value(event) else { return };
    let event_type = value.get("event").and_then(|v| v.as_str()).unwrap_or("unknown").to_owned();
    tokio::spawn(async move {
        let result = tokio::task::spawn_blocking(move || -> DataResult<()> {
            let mut conn = connect()?;
            decided_data::room::append_history(&mut conn, room_id, &event_type, value)
        })
        .await;
        if let Ok(Err(err)) = result {
            tracing::warn!(error = %err, %room_id, "failed to append room history");
        }
    });
}

fn random_code() -> RoomCode {
    let mut rng = rand::thread_rng();
    let code: String = (0..decided_core::ids::ROOM_CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..decided_core::ids::ROOM_CODE_ALPHABET.len());
            decided_core::ids::ROOM_CODE_ALPHABET[idx] as char
        })
        .collect();
    RoomCode(code)
}

/// Fallback display name when the client joins without one (spec §4.2's
/// event table requires `user_name`, but auth is out of scope and the
/// identity provider only resolves a bare `UserId`).
fn default_display_name(user_id: UserId) -> String {
    format!("Player-{}", &user_id.to_string()[..6])
}

fn generate_unique_code(conn: &mut PgConnection) -> DataResult<RoomCode> {
    for _ in 0..10 {
        let candidate = random_code();
        if !decided_data::room::code_exists(conn, &candidate)? {
            return Ok(candidate);
        }
    }
    Err(DataError::internal("exhausted room code attempts"))
}

pub async fn create_room(owner_id: UserId, display_name: Option<String>) -> AppResult<RoomView> {
    let display_name = display_name.unwrap_or_else(|| default_display_name(owner_id));
    let room_id = tokio::task::spawn_blocking(move || {
        let mut conn = connect()?;
        conn.transaction::<_, DataError, _>(|conn| {
            let code = generate_unique_code(conn)?;
            let room = decided_data::room::create_room(conn, owner_id, &code)?;
            decided_data::room::upsert_participant(conn, room.room_id, owner_id, display_name)?;
            bump_version(conn, room.room_id)?;
            Ok(room.room_id)
        })
    })
    .await
    .map_err(blocking_err)??;

    finish(room_id, owner_id, Vec::new()).await
}

fn resolve_room_id(code: &RoomCode) -> DataResult<RoomId> {
    let mut conn = connect()?;
    Ok(decided_data::room::get_room_by_code(&mut conn, code)?.room_id)
}

pub async fn join_room(code: RoomCode, user_id: UserId, display_name: Option<String>) -> AppResult<RoomView> {
    let display_name = display_name.unwrap_or_else(|| default_display_name(user_id));
    let room_id = tokio::task::spawn_blocking({
        let code = code.clone();
        move || resolve_room_id(&code)
    })
    .await
    .map_err(blocking_err)??;

    coordinator::get()
        .mutate(room_id, move || async move {
            let event = tokio::task::spawn_blocking(move || -> DataResult<RoomEvent> {
                let mut conn = connect()?;
                conn.transaction::<_, DataError, _>(|conn| {
                    let room = decided_data::room::get_room(conn, room_id)?;
                    let active = decided_data::room::list_participants(conn, room_id, true)?;

                    if let Some(existing) = active.iter().find(|p| p.user_id == user_id) {
                        let version = decided_data::room::get_state_version(conn, room_id)?;
                        return Ok(RoomEvent::UserJoined {
                            state_version: version,
                            user_id,
                            user_name: existing.display_name.clone(),
                            participant_count: active.len() as i32,
                            room_status: room.status,
                        });
                    }

                    decided_core::room::validate_join(&room, active.len())?;
                    let participant = decided_data::room::upsert_participant(conn, room_id, user_id, display_name)?;
                    let version = bump_version(conn, room_id)?;
                    let count = decided_data::room::list_participants(conn, room_id, true)?.len() as i32;
                    Ok(RoomEvent::UserJoined {
                        state_version: version,
                        user_id,
                        user_name: participant.display_name,
                        participant_count: count,
                        room_status: room.status,
                    })
                })
            })
            .await
            .map_err(blocking_err)??;

            finish(room_id, user_id, vec![event]).await
        })
        .await
}

pub async fn leave_room(code: RoomCode, user_id: UserId) -> AppResult<RoomView> {
    let room_id = tokio::task::spawn_blocking({
        let code = code.clone();
        move || resolve_room_id(&code)
    })
    .await
    .map_err(blocking_err)??;

    coordinator::get()
        .mutate(room_id, move || async move {
            let (events, became_abandoned) = tokio::task::spawn_blocking(move || -> DataResult<(Vec<RoomEvent>, bool)> {
                let mut conn = connect()?;
                conn.transaction::<_, DataError, _>(|conn| {
                    let room = decided_data::room::get_room(conn, room_id)?;
                    decided_data::room::deactivate_participant(conn, room_id, user_id)?;
                    let remaining = decided_data::room::list_participants(conn, room_id, true)?;

                    let abandon = match room.status {
                        RoomStatus::Waiting => remaining.is_empty(),
                        RoomStatus::Active => true,
                        RoomStatus::Completed | RoomStatus::Abandoned => false,
                    };
                    let new_status = if abandon { RoomStatus::Abandoned } else { room.status };
                    if abandon {
                        decided_data::room::update_room_status(
                            conn,
                            room_id,
                            RoomStatusUpdate {
                                status: RoomStatus::Abandoned,
                                started_at: room.started_at,
                                completed_at: None,
                                closed_at: Some(OffsetDateTime::now_utc()),
                            },
                        )?;
                    }

                    let version = bump_version(conn, room_id)?;
                    let mut events = vec![RoomEvent::UserLeft {
                        state_version: version,
                        user_id,
                        participant_count: remaining.len() as i32,
                        room_status: new_status,
                    }];
                    if abandon {
                        events.push(RoomEvent::RoomStatusChanged {
                            state_version: version,
                            old_status: room.status,
                            new_status,
                            metadata: serde_json::json!({ "reason": "participant_left" }),
                        });
                    }
                    Ok((events, abandon))
                })
            })
            .await
            .map_err(blocking_err)??;

            let view = finish(room_id, user_id, events).await?;
            if became_abandoned {
                crate::broadcast::get().forget(room_id);
                coordinator::get().forget(room_id);
            }
            Ok(view)
        })
        .await
}

fn entries_to_movies(entries: Vec<WatchListEntry>, user_id: UserId) -> Vec<Movie> {
    entries
        .into_iter()
        .filter(|e| !e.is_watched)
        .map(|e| {
            let poster_path = e.movie_data.as_ref().and_then(|v| v.get("poster_path")).and_then(|v| v.as_str()).map(str::to_owned);
            let popularity = e.movie_data.as_ref().and_then(|v| v.get("popularity")).and_then(|v| v.as_f64());
            Movie {
                id: e.movie_id,
                title: e.title,
                poster_path,
                source_user_ids: [user_id].into_iter().collect(),
                popularity,
            }
        })
        .collect()
}

pub async fn start_room(code: RoomCode, user_id: UserId) -> AppResult<RoomView> {
    let room_id = tokio::task::spawn_blocking({
        let code = code.clone();
        move || resolve_room_id(&code)
    })
    .await
    .map_err(blocking_err)??;
    let test_mode = crate::config::get().test_mode;

    coordinator::get()
        .mutate(room_id, move || async move {
            let event = tokio::task::spawn_blocking(move || -> DataResult<RoomEvent> {
                let mut conn = connect()?;
                conn.transaction::<_, DataError, _>(|conn| {
                    let room = decided_data::room::get_room(conn, room_id)?;
                    let active = decided_data::room::list_participants(conn, room_id, true)?;
                    decided_core::room::validate_start(&room, user_id, active.len())?;

                    let mut ids = active.iter().map(|p| p.user_id);
                    let user_a = ids.next().expect("validate_start guarantees two participants");
                    let user_b = ids.next().expect("validate_start guarantees two participants");

                    let movies_a = entries_to_movies(decided_data::watchlist::list_for_user(conn, user_a)?, user_a);
                    let movies_b = entries_to_movies(decided_data::watchlist::list_for_user(conn, user_b)?, user_b);

                    let tournament_id = uuid::Uuid::new_v4().to_string();
                    let tournament = match bracket::generate_bracket(tournament_id.clone(), movies_a, movies_b) {
                        Ok(t) => t,
                        Err(CoreError::InsufficientCatalog) if test_mode => {
                            let synthetic = bracket::synthetic_test_catalog(user_a, user_b);
                            bracket::generate_bracket(tournament_id, synthetic, Vec::new())?
                        }
                        Err(e) => return Err(DataError::from(e)),
                    };

                    decided_data::room::update_tournament(conn, room_id, &tournament)?;
                    decided_data::room::update_room_status(
                        conn,
                        room_id,
                        RoomStatusUpdate {
                            status: RoomStatus::Active,
                            started_at: Some(OffsetDateTime::now_utc()),
                            completed_at: None,
                            closed_at: None,
                        },
                    )?;
                    let version = bump_version(conn, room_id)?;

                    Ok(RoomEvent::TournamentStarted {
                        state_version: version,
                        tournament_id: tournament.tournament_id.clone(),
                        total_rounds: tournament.total_rounds,
                        total_movies: tournament.matches.len() as i32 * 2,
                        matchups: tournament.matches_in_round(1).cloned().collect(),
                    })
                })
            })
            .await
            .map_err(blocking_err)??;

            finish(room_id, user_id, vec![event]).await
        })
        .await
}

fn elo_lookup(conn: &mut PgConnection) -> impl Fn(UserId, &MovieId) -> f64 + '_ {
    move |user_id, movie_id| {
        decided_data::elo::get_or_default(conn, user_id, movie_id).map(|e| e.elo_rating).unwrap_or(decided_core::elo::DEFAULT_ELO)
    }
}

/// Pick handling (spec §4.5's full contract). A duplicate submission of an
/// already-recorded `(room, user, match)` is not an error: the caller's
/// idempotent view is returned instead.
pub async fn submit_pick(code: RoomCode, user_id: UserId, request: PickRequest) -> AppResult<RoomView> {
    let room_id = tokio::task::spawn_blocking({
        let code = code.clone();
        move || resolve_room_id(&code)
    })
    .await
    .map_err(blocking_err)??;

    if let Some(key) = &request.idempotency_key {
        if let Some(cached) = idempotency_cache().get(&(room_id, format!("pick:{key}"))) {
            return Ok(cached.clone());
        }
    }

    let key = request.idempotency_key.clone();
    let view = coordinator::get().mutate(room_id, move || async move { apply_pick(room_id, user_id, request).await }).await?;

    if let Some(key) = key {
        idempotency_cache().insert((room_id, format!("pick:{key}")), view.clone());
    }
    Ok(view)
}

enum PickOutcome {
    Duplicate,
    Applied { events: Vec<RoomEvent> },
}

async fn apply_pick(room_id: RoomId, user_id: UserId, request: PickRequest) -> AppResult<RoomView> {
    let outcome = tokio::task::spawn_blocking(move || apply_pick_blocking(room_id, user_id, request)).await.map_err(blocking_err)??;

    match outcome {
        PickOutcome::Duplicate => {
            let (snapshot, picked) = tokio::task::spawn_blocking(move || -> DataResult<_> {
                let mut conn = connect()?;
                let snapshot = state_manager::rebuild_from_store(&mut conn, room_id).map_err(|_| DataError::internal("rebuild failed"))?;
                let picked = state_manager::picked_match_ids(&mut conn, room_id, user_id).map_err(|_| DataError::internal("picked lookup failed"))?;
                Ok((snapshot, picked))
            })
            .await
            .map_err(blocking_err)??;
            Ok(snapshot.personalize(user_id, &picked))
        }
        PickOutcome::Applied { events } => finish(room_id, user_id, events).await,
    }
}

/// Everything up to and including the composite store commit, run on a
/// blocking thread. Duplicate-pick detection happens by inspecting the
/// round's existing picks rather than attempting the insert twice: the
/// actual insert only ever happens once, inside `commit_pick_advance` /
/// `commit_complete_and_reward`.
fn apply_pick_blocking(room_id: RoomId, user_id: UserId, request: PickRequest) -> AppResult<PickOutcome> {
    let mut conn = connect()?;

    let room = decided_data::room::get_room(&mut conn, room_id)?;
    let participants = decided_data::room::list_participants(&mut conn, room_id, false)?;
    require_active_participant(&room, &participants, user_id)?;

    let tournament = room.tournament.clone().ok_or(CoreError::RoomNotActive)?;
    let m = tournament.find_match(&request.match_id).ok_or(CoreError::MatchNotInCurrentRound)?.clone();
    if m.round_number != tournament.current_round {
        return Err(AppError::from(CoreError::MatchNotInCurrentRound));
    }
    if !m.contains(&request.selected_movie_id) {
        return Err(AppError::from(CoreError::MovieNotInMatch));
    }

    let picks_before = decided_data::room::list_picks(&mut conn, room_id, Some(tournament.current_round))?;
    if picks_before.iter().any(|p| p.match_id == request.match_id && p.user_id == user_id) {
        return Ok(PickOutcome::Duplicate);
    }

    let movie_b_id = m.movie_b.as_ref().map(|m| m.id.clone()).unwrap_or_else(|| m.movie_a.id.clone());
    let pick = BracketPick {
        room_id,
        user_id,
        round_number: m.round_number,
        match_id: request.match_id.clone(),
        movie_a_id: m.movie_a.id.clone(),
        movie_b_id,
        selected_movie_id: request.selected_movie_id.clone(),
        response_time_ms: request.response_time_ms,
        created_at: OffsetDateTime::now_utc(),
    };

    let existing_completions = decided_data::room::list_completions(&mut conn, room_id)?;
    let match_now_complete = picks_before.iter().filter(|p| p.match_id == request.match_id).count() + 1 >= 2
        && !existing_completions.contains(&request.match_id);

    let mut completions_to_insert = Vec::new();
    if match_now_complete {
        completions_to_insert.push(MatchCompletion {
            room_id,
            match_id: request.match_id.clone(),
            round_number: m.round_number,
            completed_at: OffsetDateTime::now_utc(),
            next_match_id: None,
        });
    }

    let mut all_completions = existing_completions;
    if match_now_complete {
        all_completions.insert(request.match_id.clone());
    }
    let round_matches: Vec<_> = tournament.matches_in_round(tournament.current_round).cloned().collect();
    let round_now_complete = round_matches.iter().all(|rm| rm.is_bye() || all_completions.contains(&rm.match_id));

    let next_version = decided_data::room::get_state_version(&mut conn, room_id)? + 1;
    let progress_total = round_matches.iter().filter(|rm| !rm.is_bye()).count() as i32;
    let progress_user_picks = picks_before.iter().filter(|p| p.user_id == user_id).count() as i32 + 1;

    let mut events = vec![RoomEvent::PickMade {
        state_version: next_version,
        user_id,
        match_id: request.match_id.clone(),
        round_number: m.round_number,
        progress: UserProgress { user_picks: progress_user_picks, total_picks: progress_total },
    }];

    if !round_now_complete {
        decided_data::retry::retry_transient(3, || {
            decided_data::room::commit_pick_advance(&mut conn, room_id, &pick, &completions_to_insert, None, None, None, next_version)
        })?;
        enqueue_elo_job(&pick);
        return Ok(PickOutcome::Applied { events });
    }

    // Every non-bye match in the current round now has both picks in. Fold
    // this pick in alongside what's already stored and resolve the round —
    // `advance_round` handles both "produce round N+1" and, when the round
    // just resolved was already final, "this round's one outcome is the
    // winner" (it returns the original tournament with `is_final_round`
    // left set and `current_round` unchanged in that case).
    let mut picks_for_round = decided_data::room::list_picks(&mut conn, room_id, Some(tournament.current_round))?;
    picks_for_round.push(pick.clone());
    let mut picks_by_match: HashMap<String, Vec<&BracketPick>> = HashMap::new();
    for p in &picks_for_round {
        picks_by_match.entry(p.match_id.clone()).or_default().push(p);
    }

    let lookup = elo_lookup(&mut conn);
    let (advanced, outcomes) = bracket::advance_round(&tournament, &picks_by_match, &lookup);

    if tournament.is_final_round {
        let outcome = outcomes.first().expect("final round has exactly one match");
        let winner = Winner { movie_id: outcome.winner.id.clone(), title: outcome.winner.title.clone(), poster_path: outcome.winner.poster_path.clone() };

        let watchlist_entries: Vec<WatchListEntry> = participants
            .iter()
            .filter(|p| p.is_active)
            .map(|p| WatchListEntry::decided_together(p.user_id, winner.movie_id.clone(), winner.title.clone(), room_id))
            .collect();

        let final_version = next_version + 1;
        decided_data::retry::retry_transient(3, || {
            decided_data::room::commit_pick_advance(&mut conn, room_id, &pick, &completions_to_insert, None, None, None, next_version)
        })?;
        decided_data::retry::retry_transient(3, || {
            decided_data::room::commit_complete_and_reward(
                &mut conn,
                room_id,
                &winner,
                &watchlist_entries,
                RoomStatusUpdate {
                    status: RoomStatus::Completed,
                    started_at: room.started_at,
                    completed_at: Some(OffsetDateTime::now_utc()),
                    closed_at: None,
                },
                final_version,
            )
        })?;

        events.push(RoomEvent::TournamentCompleted {
            state_version: final_version,
            winner,
            completed_at: OffsetDateTime::now_utc(),
            added_to_watchlists: true,
        });
        enqueue_elo_job(&pick);
        return Ok(PickOutcome::Applied { events });
    }

    let new_tournament: Tournament = advanced;
    if new_tournament.is_final_round {
        let final_movies = new_tournament.final_movies.clone().expect("final round carries final_movies");
        events.push(RoomEvent::FinalRoundStarted {
            state_version: next_version,
            round_number: new_tournament.current_round,
            final_movies: [final_movies.0, final_movies.1],
            next_round_matchups: new_tournament.matches_in_round(new_tournament.current_round).cloned().collect(),
        });
    } else {
        events.push(RoomEvent::RoundCompleted {
            state_version: next_version,
            round_number: tournament.current_round,
            next_round_matchups: new_tournament.matches_in_round(new_tournament.current_round).cloned().collect(),
        });
    }

    decided_data::retry::retry_transient(3, || {
        decided_data::room::commit_pick_advance(
            &mut conn,
            room_id,
            &pick,
            &completions_to_insert,
            Some(&new_tournament),
            None,
            None,
            next_version,
        )
    })?;
    enqueue_elo_job(&pick);
    Ok(PickOutcome::Applied { events })
}

/// Queues the Elo update this pick implies: the selected movie beat the
/// rejected one for `pick.user_id`.
fn enqueue_elo_job(pick: &BracketPick) {
    let rejected_movie_id = if pick.selected_movie_id == pick.movie_a_id { pick.movie_b_id.clone() } else { pick.movie_a_id.clone() };
    elo_worker::enqueue(elo_worker::EloJob {
        user_id: pick.user_id,
        selected_movie_id: pick.selected_movie_id.clone(),
        rejected_movie_id,
    });
}

/// Sweeps rooms whose coordinator has seen no mutation for longer than the
/// configured timeout and abandons them (spec §4.7). Invoked periodically
/// from `main`.
pub async fn sweep_idle_rooms(waiting_timeout: std::time::Duration, inactivity_timeout: std::time::Duration) {
    let rooms = match tokio::task::spawn_blocking(|| -> DataResult<Vec<Room>> {
        let mut conn = connect()?;
        decided_data::room::list_non_terminal_rooms(&mut conn)
    })
    .await
    {
        Ok(Ok(rooms)) => rooms,
        Ok(Err(err)) => {
            tracing::error!(error = %err, "idle sweep failed to list rooms");
            return;
        }
        Err(err) => {
            tracing::error!(error = %err, "idle sweep task panicked");
            return;
        }
    };

    for room in rooms {
        let timeout = match room.status {
            RoomStatus::Waiting => waiting_timeout,
            RoomStatus::Active => inactivity_timeout,
            RoomStatus::Completed | RoomStatus::Abandoned => continue,
        };
        let Some(idle) = coordinator::get().idle_for(room.room_id) else { continue };
        if idle < timeout {
            continue;
        }

        let room_id = room.room_id;
        let old_status = room.status;
        let started_at = room.started_at;
        coordinator::get()
            .mutate(room_id, move || async move {
                let outcome = tokio::task::spawn_blocking(move || -> DataResult<i64> {
                    let mut conn = connect()?;
                    conn.transaction::<_, DataError, _>(|conn| {
                        decided_data::room::update_room_status(
                            conn,
                            room_id,
                            RoomStatusUpdate {
                                status: RoomStatus::Abandoned,
                                started_at,
                                completed_at: None,
                                closed_at: Some(OffsetDateTime::now_utc()),
                            },
                        )?;
                        bump_version(conn, room_id)
                    })
                })
                .await;

                match outcome {
                    Ok(Ok(state_version)) => {
                        crate::broadcast::get().publish(
                            room_id,
                            RoomEvent::RoomStatusChanged {
                                state_version,
                                old_status,
                                new_status: RoomStatus::Abandoned,
                                metadata: serde_json::json!({ "reason": "timeout" }),
                            },
                        );
                        state_manager::get().clear_cache(room_id);
                        crate::broadcast::get().forget(room_id);
                        coordinator::get().forget(room_id);
                    }
                    Ok(Err(err)) => tracing::error!(error = %err, %room_id, "idle sweep failed to abandon room"),
                    Err(err) => tracing::error!(error = %err, %room_id, "idle sweep task panicked"),
                }
            })
            .await;
    }
}
