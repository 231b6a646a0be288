use chrono::{Duration, NaiveDateTime, Utc};
use diesel::insert_into;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;
use std::cell::Cell;
use std::path::PathBuf;
use tempfile::TempDir;

use crate::cache::PageCache;
use crate::comment::NewComment;
use crate::config::Config;
use crate::db::schema::{comments, posts, users};
use crate::db::Pool;
use crate::group::{self, Group, NewGroup};
use crate::post::{NewPost, Post};
use crate::users::models::{NewUser, User};

pub const PASSWORD: &str = "correct-horse-battery";

/// A rocket backed by its own SQLite file, plus helpers to seed it.
pub struct TestApp {
    pub client: Client,
    _dir: TempDir,
    base: NaiveDateTime,
    tick: Cell<i64>,
}

impl TestApp {
    pub fn new() -> TestApp {
        TestApp::with_pool(10)
    }

    /// A pool of `size` connections that gives up after one second.
    pub fn with_pool(size: u32) -> TestApp {
        let dir = tempfile::tempdir().expect("temp dir");
        let figment = rocket::Config::figment()
            .merge(("database_url", dir.path().join("test.sqlite3").display().to_string()))
            .merge(("media_root", dir.path().join("media").display().to_string()))
            .merge(("cache_ttl", 20))
            .merge(("pool_size", size))
            .merge(("pool_timeout", 1))
            .merge(("log_level", "off"));
        let rocket = crate::build_rocket(figment).expect("rocket builds");
        let client = Client::tracked(rocket).expect("valid rocket instance");
        TestApp {
            client,
            _dir: dir,
            base: Utc::now().naive_utc() - Duration::days(1),
            tick: Cell::new(0),
        }
    }

    /// Strictly increasing timestamps in the past, so seeded rows sort in
    /// creation order.
    fn next_timestamp(&self) -> NaiveDateTime {
        let tick = self.tick.get() + 1;
        self.tick.set(tick);
        self.base + Duration::seconds(tick)
    }

    pub fn conn(&self) -> PooledConnection<ConnectionManager<SqliteConnection>> {
        self.client
            .rocket()
            .state::<Pool>()
            .expect("pool is managed")
            .get()
            .expect("connection")
    }

    pub fn media_root(&self) -> PathBuf {
        self.client
            .rocket()
            .state::<Config>()
            .expect("config is managed")
            .media_root
            .clone()
    }

    pub fn cache(&self) -> &PageCache {
        self.client
            .rocket()
            .state::<PageCache>()
            .expect("cache is managed")
    }

    pub fn create_user(&self, username: &str) -> User {
        self.create_user_named(username, "", "")
    }

    pub fn create_user_named(&self, username: &str, first_name: &str, last_name: &str) -> User {
        let new_user = NewUser {
            username: username.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            password_hash: User::make_password(PASSWORD).unwrap(),
        };
        insert_into(users::table)
            .values(&new_user)
            .returning(User::as_returning())
            .get_result(&mut self.conn())
            .unwrap()
    }

    pub fn create_group(&self, title: &str) -> Group {
        let new_group = NewGroup::new(title, None, &format!("All about {}", title));
        group::create_group(&mut self.conn(), &new_group).unwrap()
    }

    pub fn create_post(&self, author: &User, text: &str, group: Option<&Group>) -> Post {
        let new_post = NewPost {
            text: text.to_string(),
            pub_date: self.next_timestamp(),
            image: None,
            group_id: group.map(|group| group.id),
            author_id: author.id,
        };
        insert_into(posts::table)
            .values(&new_post)
            .returning(Post::as_returning())
            .get_result(&mut self.conn())
            .unwrap()
    }

    pub fn create_comment(&self, post: &Post, author: &User, text: &str) {
        let new_comment = NewComment {
            post_id: post.id,
            author_id: author.id,
            text: text.to_string(),
            created: self.next_timestamp(),
        };
        insert_into(comments::table)
            .values(&new_comment)
            .execute(&mut self.conn())
            .unwrap();
    }

    /// Logs `user` in; the tracked client keeps the session cookie.
    pub fn login(&self, user: &User) {
        let response = self
            .client
            .post("/auth/login/")
            .header(ContentType::Form)
            .body(format!("username={}&password={}", user.username, PASSWORD))
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);
    }
}
