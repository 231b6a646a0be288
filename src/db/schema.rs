table! {
    comments (id) {
        id -> Integer,
        post_id -> Integer,
        author_id -> Integer,
        text -> Text,
        created -> Timestamp,
    }
}

table! {
    follows (id) {
        id -> Integer,
        user_id -> Integer,
        author_id -> Integer,
    }
}

table! {
    groups (id) {
        id -> Integer,
        title -> Text,
        slug -> Text,
        description -> Text,
    }
}

table! {
    posts (id) {
        id -> Integer,
        text -> Text,
        pub_date -> Timestamp,
        image -> Nullable<Text>,
        group_id -> Nullable<Integer>,
        author_id -> Integer,
    }
}

table! {
    users (id) {
        id -> Integer,
        username -> Text,
        first_name -> Text,
        last_name -> Text,
        password_hash -> Text,
    }
}

joinable!(comments -> posts (post_id));
joinable!(comments -> users (author_id));
joinable!(posts -> groups (group_id));
joinable!(posts -> users (author_id));

allow_tables_to_appear_in_same_query!(comments, follows, groups, posts, users);
