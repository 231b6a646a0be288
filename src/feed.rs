//! Feed assembly: a scope of posts cut into fixed-size pages, newest first.

use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use std::cmp;

use crate::db::schema::{follows, posts};
use crate::post::{Post, PostView};

pub const PAGE_SIZE: i64 = 10;

/// Which posts a feed is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Group(i32),
    Author(i32),
    /// Posts by every author the given user follows.
    FollowedBy(i32),
}

/// Missing or non-numeric tokens mean the first page.
pub fn page_number(token: Option<&str>) -> i64 {
    token
        .and_then(|token| token.trim().parse::<i64>().ok())
        .unwrap_or(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub number: i64,
    pub num_pages: i64,
    pub count: i64,
}

impl Window {
    /// Clamps the requested page to the nearest page that exists. An empty
    /// scope still has one (empty) page.
    pub fn resolve(count: i64, token: Option<&str>) -> Window {
        let num_pages = cmp::max(1, (count + PAGE_SIZE - 1) / PAGE_SIZE);
        let number = page_number(token).clamp(1, num_pages);
        Window {
            number,
            num_pages,
            count,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1) * PAGE_SIZE
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub number: i64,
    pub num_pages: i64,
    pub count: i64,
    pub has_next: bool,
    pub has_previous: bool,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(window: Window, items: Vec<T>) -> Self {
        Page {
            number: window.number,
            num_pages: window.num_pages,
            count: window.count,
            has_next: window.number < window.num_pages,
            has_previous: window.number > 1,
            items,
        }
    }
}

fn scoped(scope: Scope) -> posts::BoxedQuery<'static, Sqlite> {
    let query = posts::table.into_boxed();
    match scope {
        Scope::All => query,
        Scope::Group(group_id) => query.filter(posts::group_id.eq(group_id)),
        Scope::Author(author_id) => query.filter(posts::author_id.eq(author_id)),
        Scope::FollowedBy(user_id) => query.filter(
            posts::author_id.eq_any(
                follows::table
                    .filter(follows::user_id.eq(user_id))
                    .select(follows::author_id),
            ),
        ),
    }
}

pub fn count(connection: &mut SqliteConnection, scope: Scope) -> QueryResult<i64> {
    scoped(scope).count().get_result(connection)
}

fn ordered(scope: Scope) -> posts::BoxedQuery<'static, Sqlite> {
    scoped(scope).order((posts::pub_date.desc(), posts::id.desc()))
}

/// Every post by one author, newest first.
pub fn posts_by_author(connection: &mut SqliteConnection, author_id: i32) -> QueryResult<Vec<Post>> {
    ordered(Scope::Author(author_id))
        .select(Post::as_select())
        .load(connection)
}

/// Every post in one group, newest first.
pub fn posts_by_group(connection: &mut SqliteConnection, group_id: i32) -> QueryResult<Vec<Post>> {
    ordered(Scope::Group(group_id))
        .select(Post::as_select())
        .load(connection)
}

pub fn load_window(
    connection: &mut SqliteConnection,
    scope: Scope,
    window: Window,
) -> QueryResult<Vec<Post>> {
    ordered(scope)
        .limit(PAGE_SIZE)
        .offset(window.offset())
        .select(Post::as_select())
        .load(connection)
}

/// Resolves the page token against the size of the scope and loads only that
/// page, with authors and groups attached.
pub fn paginate(
    connection: &mut SqliteConnection,
    scope: Scope,
    token: Option<&str>,
) -> QueryResult<Page<PostView>> {
    let window = Window::resolve(count(connection, scope)?, token);
    load_page(connection, scope, window)
}

/// Loads an already resolved window.
pub fn load_page(
    connection: &mut SqliteConnection,
    scope: Scope,
    window: Window,
) -> QueryResult<Page<PostView>> {
    let posts = load_window(connection, scope, window)?;
    let items = PostView::attach(connection, posts)?;
    Ok(Page::new(window, items))
}
