// @generated manually, mirrors the migrations in migrations/.

diesel::table! {
    rooms (id) {
        id -> Uuid,
        code -> Text,
        owner_user_id -> Uuid,
        status -> Text,
        created_at -> Timestamptz,
        started_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        closed_at -> Nullable<Timestamptz>,
        tournament -> Nullable<Jsonb>,
        winner -> Nullable<Jsonb>,
        state_version -> Int8,
    }
}

diesel::table! {
    participants (room_id, user_id) {
        room_id -> Uuid,
        user_id -> Uuid,
        display_name -> Text,
        joined_at -> Timestamptz,
        left_at -> Nullable<Timestamptz>,
        is_active -> Bool,
        current_match_index -> Int4,
        completed_match_ids -> Jsonb,
    }
}

diesel::table! {
    bracket_picks (id) {
        id -> Int8,
        room_id -> Uuid,
        user_id -> Uuid,
        round_number -> Int4,
        match_id -> Text,
        movie_a_id -> Text,
        movie_b_id -> Text,
        selected_movie_id -> Text,
        response_time_ms -> Nullable<Int4>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    match_completions (room_id, match_id) {
        room_id -> Uuid,
        match_id -> Text,
        round_number -> Int4,
        completed_at -> Timestamptz,
        next_match_id -> Nullable<Text>,
    }
}

diesel::table! {
    room_history_events (id) {
        id -> Int8,
        room_id -> Uuid,
        event_type -> Text,
        event_data -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    user_movie_elo (user_id, movie_id) {
        user_id -> Uuid,
        movie_id -> Text,
        elo_rating -> Float8,
        matches_played -> Int4,
        wins -> Int4,
        losses -> Int4,
        last_updated -> Timestamptz,
    }
}

diesel::table! {
    watchlist_entries (user_id, movie_id) {
        user_id -> Uuid,
        movie_id -> Text,
        title -> Text,
        movie_data -> Nullable<Jsonb>,
        added_from -> Text,
        decided_together_room_id -> Nullable<Uuid>,
        pending_rating -> Bool,
        is_watched -> Bool,
        watched_at -> Nullable<Timestamptz>,
        rating -> Nullable<Float4>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    rooms,
    participants,
    bracket_picks,
    match_completions,
    room_history_events,
    user_movie_elo,
    watchlist_entries,
);
