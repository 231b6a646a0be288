//! The follow graph: directed "user follows author" edges.
//!
//! The pair `(user_id, author_id)` is unique in the store, so inserting an
//! edge that already exists is a no-op rather than an error.

use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::{delete, insert_into, select};
use rocket::Either;
use rocket::get;
use rocket::http::uri::Origin;
use rocket::serde::json::Json;
use tracing::info;

use crate::db::schema::follows;
use crate::db::DbConnection;
use crate::feed::{self, Page, Scope};
use crate::gate::{self, Action};
use crate::post::PostView;
use crate::types::PageResult;
use crate::users::Session;
use crate::users::models::User;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = follows)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Follow {
    pub id: i32,
    pub user_id: i32,
    pub author_id: i32,
}

/// Returns whether a new edge was created.
pub fn follow(connection: &mut SqliteConnection, follower: &User, target: &User) -> QueryResult<bool> {
    let inserted = insert_into(follows::table)
        .values((
            follows::user_id.eq(follower.id),
            follows::author_id.eq(target.id),
        ))
        .on_conflict((follows::user_id, follows::author_id))
        .do_nothing()
        .execute(connection)?;
    if inserted > 0 {
        info!(user_id = follower.id, author_id = target.id, "follow edge created");
    }
    Ok(inserted > 0)
}

/// Removes the edge if there is one. Never creates anything.
pub fn unfollow(connection: &mut SqliteConnection, follower: &User, target: &User) -> QueryResult<bool> {
    let removed = delete(
        follows::table
            .filter(follows::user_id.eq(follower.id))
            .filter(follows::author_id.eq(target.id)),
    )
    .execute(connection)?;
    if removed > 0 {
        info!(user_id = follower.id, author_id = target.id, "follow edge removed");
    }
    Ok(removed > 0)
}

pub fn is_following(connection: &mut SqliteConnection, follower: &User, target: &User) -> QueryResult<bool> {
    select(exists(
        follows::table
            .filter(follows::user_id.eq(follower.id))
            .filter(follows::author_id.eq(target.id)),
    ))
    .get_result(connection)
}

pub fn following_count(connection: &mut SqliteConnection, user: &User) -> QueryResult<i64> {
    follows::table
        .filter(follows::user_id.eq(user.id))
        .count()
        .get_result(connection)
}

pub fn followers_count(connection: &mut SqliteConnection, user: &User) -> QueryResult<i64> {
    follows::table
        .filter(follows::author_id.eq(user.id))
        .count()
        .get_result(connection)
}

pub fn followed_author_ids(connection: &mut SqliteConnection, follower: &User) -> QueryResult<Vec<i32>> {
    follows::table
        .filter(follows::user_id.eq(follower.id))
        .order(follows::author_id.asc())
        .select(follows::author_id)
        .load(connection)
}

/// Posts by everyone `follower` follows, newest first. The follower's own
/// posts only show up if they follow themselves.
pub fn feed_for(
    connection: &mut SqliteConnection,
    follower: &User,
    token: Option<&str>,
) -> QueryResult<Page<PostView>> {
    feed::paginate(connection, Scope::FollowedBy(follower.id), token)
}

#[derive(Debug, Serialize)]
pub struct FollowPage {
    page: Page<PostView>,
}

#[get("/follow?<page>")]
pub fn follow_index(
    mut connection: DbConnection,
    session: Session,
    origin: &Origin<'_>,
    page: Option<&str>,
) -> PageResult<FollowPage> {
    let actor = session.user(&mut connection)?;
    let user = match gate::admit(Action::Follow, actor, origin.path().as_str()) {
        Ok(user) => user,
        Err(redirect) => return Ok(Either::Right(redirect)),
    };
    let page = feed_for(&mut connection, &user, page)?;
    Ok(Either::Left(Json(FollowPage { page })))
}
