// @generated from embedded migrations; see crates/data/migrations/.

diesel::table! {
    devices (id) {
        id -> BigInt,
        user_id -> Text,
        device_id -> Text,
        registration_ip -> Text,
        registration_date -> BigInt,
    }
}

diesel::table! {
    enc_history_entries (id) {
        id -> BigInt,
        encrypted_data -> Binary,
        nonce -> Binary,
        device_id -> Text,
        user_id -> Text,
        date -> BigInt,
        encrypted_id -> Text,
        read_count -> Integer,
    }
}

diesel::table! {
    dump_requests (id) {
        id -> BigInt,
        user_id -> Text,
        requesting_device_id -> Text,
        request_time -> BigInt,
    }
}

diesel::table! {
    deletion_requests (id) {
        id -> BigInt,
        user_id -> Text,
        destination_device_id -> Text,
        send_time -> BigInt,
        messages_json -> Text,
        read_count -> Integer,
    }
}

diesel::table! {
    usage_data (id) {
        id -> BigInt,
        user_id -> Text,
        device_id -> Text,
        last_used -> BigInt,
        last_ip -> Text,
        num_entries_handled -> BigInt,
        last_queried -> BigInt,
        num_queries -> BigInt,
        version -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(devices, enc_history_entries, dump_requests, deletion_requests, usage_data,);
