diesel::table! {
    records (id) {
        id -> Integer,
        table_name -> Text,
        user_id -> Text,
        data -> Text,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
