//! The HTTP surface (spec §6.1). Every handler resolves the room code to a
//! room, authenticates via [`crate::hoops`], and delegates the actual
//! mutation to [`crate::actions`] — this module only shapes requests and
//! responses.

use std::convert::Infallible;
use std::time::Duration;

use decided_core::error::CoreError;
use decided_core::ids::{MovieId, RoomCode, RoomId, UserId};
use decided_core::room::RoomStatus;
use decided_core::snapshot::RoomView;
use futures_util::StreamExt;
use salvo::prelude::*;
use salvo::sse::{self, SseEvent};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;

use crate::{actions, hoops, AppError, AppResult, DepotExt};

pub fn router() -> Router {
    Router::new()
        .hoop(hoops::ensure_accept)
        .hoop(hoops::limit_size)
        .push(
            Router::with_path("rooms")
                .hoop(hoops::verify_token)
                .post(create_room)
                .push(
                    Router::with_path("{code}")
                        .push(Router::with_path("join").post(join_room))
                        .push(Router::with_path("leave").delete(leave_room))
                        .push(Router::with_path("start").post(start_room))
                        .push(Router::with_path("pick").patch(submit_pick))
                        .push(Router::with_path("state").get(get_state))
                        .push(Router::with_path("current-match").get(get_current_match))
                        .push(Router::with_path("stream").get(stream_room)),
                ),
        )
}

fn path_code(req: &mut Request) -> AppResult<RoomCode> {
    let raw = req.param::<String>("code").ok_or_else(|| AppError::from(CoreError::InvalidInput("missing room code".into())))?;
    RoomCode::parse(&raw).ok_or_else(|| AppError::from(CoreError::InvalidInput("malformed room code".into())))
}

#[derive(Debug, Serialize)]
struct RoomCodeResBody {
    room_code: String,
}

#[derive(Debug, Default, Deserialize)]
struct DisplayNameReqBody {
    display_name: Option<String>,
}

async fn parse_display_name(req: &mut Request) -> Option<String> {
    req.parse_json::<DisplayNameReqBody>().await.ok().and_then(|b| b.display_name)
}

#[handler]
async fn create_room(req: &mut Request, depot: &mut Depot, res: &mut Response) -> AppResult<()> {
    let user_id = depot.user_id()?;
    let display_name = parse_display_name(req).await;
    let view = actions::create_room(user_id, display_name).await?;
    res.render(Json(RoomCodeResBody { room_code: view.room.code.to_string() }));
    Ok(())
}

#[derive(Debug, Serialize)]
struct ParticipantCountResBody {
    participant_count: i32,
}

#[handler]
async fn join_room(req: &mut Request, depot: &mut Depot, res: &mut Response) -> AppResult<()> {
    let user_id = depot.user_id()?;
    let code = path_code(req)?;
    let display_name = parse_display_name(req).await;
    let view = actions::join_room(code, user_id, display_name).await?;
    res.render(Json(ParticipantCountResBody { participant_count: view.room.participants.iter().filter(|p| p.is_active).count() as i32 }));
    Ok(())
}

#[derive(Debug, Serialize)]
struct LeaveResBody {
    participant_count: i32,
    room_status: RoomStatus,
}

#[handler]
async fn leave_room(req: &mut Request, depot: &mut Depot, res: &mut Response) -> AppResult<()> {
    let user_id = depot.user_id()?;
    let code = path_code(req)?;
    let view = actions::leave_room(code, user_id).await?;
    res.render(Json(LeaveResBody {
        participant_count: view.room.participants.iter().filter(|p| p.is_active).count() as i32,
        room_status: view.room.status,
    }));
    Ok(())
}

#[handler]
async fn start_room(req: &mut Request, depot: &mut Depot, res: &mut Response) -> AppResult<()> {
    let user_id = depot.user_id()?;
    let code = path_code(req)?;
    let view = actions::start_room(code, user_id).await?;
    res.render(Json(serde_json::json!({ "tournament": view.tournament })));
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PickReqBody {
    match_id: String,
    round_number: i32,
    movie_a_id: MovieId,
    movie_b_id: MovieId,
    selected_movie_id: MovieId,
    response_time_ms: Option<i32>,
    idempotency_key: Option<String>,
}

#[handler]
async fn submit_pick(req: &mut Request, depot: &mut Depot, res: &mut Response) -> AppResult<()> {
    let user_id = depot.user_id()?;
    let code = path_code(req)?;
    let body: PickReqBody = req.parse_json().await.map_err(|e| AppError::from(CoreError::InvalidInput(e.to_string())))?;
    let request = actions::PickRequest {
        match_id: body.match_id,
        round_number: body.round_number,
        movie_a_id: body.movie_a_id,
        movie_b_id: body.movie_b_id,
        selected_movie_id: body.selected_movie_id,
        response_time_ms: body.response_time_ms,
        idempotency_key: body.idempotency_key,
    };
    let view = actions::submit_pick(code, user_id, request).await?;
    let progress = view.user_view.as_ref().map(|uv| uv.progress.clone());
    let can_advance_round = view.user_view.as_ref().is_some_and(|uv| uv.current_match.is_none());
    res.render(Json(serde_json::json!({ "progress": progress, "can_advance_round": can_advance_round })));
    Ok(())
}

fn room_id_for(code: &RoomCode) -> AppResult<RoomId> {
    let mut conn = decided_data::connect().map_err(decided_data::DataError::from)?;
    Ok(decided_data::room::get_room_by_code(&mut conn, code)?.room_id)
}

fn personalized_view(room_id: RoomId, user_id: UserId) -> AppResult<RoomView> {
    let mut conn = decided_data::connect().map_err(decided_data::DataError::from)?;
    let snapshot = crate::state_manager::load(&mut conn, room_id)?;
    let picked = crate::state_manager::picked_match_ids(&mut conn, room_id, user_id)?;
    Ok(snapshot.personalize(user_id, &picked))
}

#[handler]
async fn get_state(req: &mut Request, depot: &mut Depot, res: &mut Response) -> AppResult<()> {
    let user_id = depot.user_id()?;
    let code = path_code(req)?;
    let view = tokio::task::spawn_blocking(move || {
        let room_id = room_id_for(&code)?;
        personalized_view(room_id, user_id)
    })
    .await
    .map_err(|e| AppError::from(std::io::Error::other(e.to_string())))??;
    res.render(Json(view));
    Ok(())
}

#[handler]
async fn get_current_match(req: &mut Request, depot: &mut Depot, res: &mut Response) -> AppResult<()> {
    let user_id = depot.user_id()?;
    let code = path_code(req)?;
    let view = tokio::task::spawn_blocking(move || {
        let room_id = room_id_for(&code)?;
        personalized_view(room_id, user_id)
    })
    .await
    .map_err(|e| AppError::from(std::io::Error::other(e.to_string())))??;

    let (current_match, completed_count, total_count) = match &view.user_view {
        Some(uv) => (uv.current_match.clone(), uv.progress.user_picks, uv.progress.total_picks),
        None => (None, 0, 0),
    };
    res.render(Json(serde_json::json!({
        "current_match": current_match,
        "completed_count": completed_count,
        "total_count": total_count,
    })));
    Ok(())
}

/// Streams the room's live event feed (spec §6.3): the first frame is the
/// full personalized snapshot, after which every broadcast event for the
/// room is forwarded verbatim, interleaved with heartbeat comments so
/// intermediaries don't time the connection out.
#[handler]
async fn stream_room(req: &mut Request, depot: &mut Depot, res: &mut Response) -> AppResult<()> {
    let user_id = depot.user_id()?;
    let code = path_code(req)?;
    let room_id = tokio::task::spawn_blocking(move || room_id_for(&code))
        .await
        .map_err(|e| AppError::from(std::io::Error::other(e.to_string())))??;

    let initial = tokio::task::spawn_blocking(move || personalized_view(room_id, user_id))
        .await
        .map_err(|e| AppError::from(std::io::Error::other(e.to_string())))??;
    let initial_json = serde_json::to_string(&initial)?;

    crate::broadcast::get().track(room_id, user_id);
    let rx = crate::broadcast::get().subscribe(room_id);
    let heartbeat_interval = Duration::from_secs(crate::config::get().heartbeat_interval_secs);

    let events = BroadcastStream::new(rx).filter_map(|item| async move {
        match item {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => Some(Ok::<_, Infallible>(SseEvent::default().text(json))),
                Err(_) => None,
            },
            Err(_lagged) => Some(Ok(SseEvent::default().comment("lagged, some events were dropped"))),
        }
    });

    let heartbeats = tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(heartbeat_interval))
        .map(|_| Ok::<_, Infallible>(SseEvent::default().comment("heartbeat")));

    let initial_frame = tokio_stream::once(Ok::<_, Infallible>(SseEvent::default().text(initial_json)));
    let stream = WithPresenceGuard {
        inner: initial_frame.chain(tokio_stream::StreamExt::merge(events, heartbeats)),
        _guard: PresenceGuard { room_id, user_id },
    };

    sse::streaming(res, stream).ok();
    Ok(())
}

/// Untracks presence once the stream is dropped (client disconnect or
/// server shutdown), rather than right after [`sse::streaming`] returns —
/// that call only hands the stream to the response body, it doesn't drive
/// it to completion.
struct PresenceGuard {
    room_id: RoomId,
    user_id: UserId,
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        crate::broadcast::get().untrack(self.room_id, self.user_id);
    }
}

struct WithPresenceGuard<S> {
    inner: S,
    _guard: PresenceGuard,
}

impl<S: futures_util::Stream + Unpin> futures_util::Stream for WithPresenceGuard<S> {
    type Item = S::Item;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.inner).poll_next(cx)
    }
}
