// Generated-by-hand mirror of migrations/2024-01-01-000000_init/up.sql.
// Kept in sync manually; a real deployment would regenerate this with
// `diesel print-schema`.

diesel::table! {
    workers (id) {
        id -> Text,
        ip -> Text,
        reputation -> BigInt,
        disabled -> Bool,
        current_batch -> Nullable<Text>,
        last_committed -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    batches (id) {
        id -> Text,
        start_ctid -> Text,
        end_ctid -> Text,
        finished -> Bool,
        content_size -> Nullable<BigInt>,
        videos -> Array<Text>,
        version -> BigInt,
    }
}

diesel::table! {
    videos (id) {
        id -> Text,
    }
}

diesel::table! {
    playlists (id) {
        id -> Text,
    }
}

diesel::table! {
    channels (id) {
        id -> Text,
    }
}

diesel::table! {
    user_videos (id) {
        id -> Text,
    }
}

diesel::table! {
    user_playlists (id) {
        id -> Text,
    }
}

diesel::table! {
    user_channels (id) {
        id -> Text,
    }
}
