use rocket::get;
use rocket::http::uri::Origin;
use rocket::response::Redirect;
use rocket::serde::json::Json;
use tracing::debug;

use crate::db::DbConnection;
use crate::feed::{self, Page, Scope};
use crate::follow;
use crate::gate::{self, Action};
use crate::post::PostView;
use crate::types::{ApiError, ApiResult};
use crate::users::Session;
use crate::users::models::{Author, User};

#[derive(Debug, Serialize)]
pub struct ProfilePage {
    author: Author,
    post_count: i64,
    following: bool,
    following_count: i64,
    followers_count: i64,
    page: Page<PostView>,
}

fn profile_url(username: &str) -> String {
    format!("/profile/{}/", username)
}

#[get("/profile/<username>?<page>")]
pub fn profile(
    mut connection: DbConnection,
    session: Session,
    username: &str,
    page: Option<&str>,
) -> ApiResult<ProfilePage> {
    let actor = session.user(&mut connection)?;
    let author = User::load_by_name(username, &mut connection)?;
    let page = feed::paginate(&mut connection, Scope::Author(author.id), page)?;
    let following = match actor {
        Some(current) => follow::is_following(&mut connection, &current, &author)?,
        None => false,
    };

    Ok(Json(ProfilePage {
        author: author.author(),
        post_count: page.count,
        following,
        following_count: follow::following_count(&mut connection, &author)?,
        followers_count: follow::followers_count(&mut connection, &author)?,
        page,
    }))
}

#[get("/profile/<username>/follow")]
pub fn profile_follow(
    mut connection: DbConnection,
    session: Session,
    origin: &Origin<'_>,
    username: &str,
) -> Result<Redirect, ApiError> {
    let actor = session.user(&mut connection)?;
    let current = match gate::admit(Action::Follow, actor, origin.path().as_str()) {
        Ok(user) => user,
        Err(redirect) => return Ok(redirect),
    };
    let author = User::load_by_name(username, &mut connection)?;
    if current.id == author.id {
        debug!(user_id = current.id, "ignoring self-follow");
    } else {
        follow::follow(&mut connection, &current, &author)?;
    }
    Ok(Redirect::to(profile_url(&author.username)))
}

#[get("/profile/<username>/unfollow")]
pub fn profile_unfollow(
    mut connection: DbConnection,
    session: Session,
    origin: &Origin<'_>,
    username: &str,
) -> Result<Redirect, ApiError> {
    let actor = session.user(&mut connection)?;
    let current = match gate::admit(Action::Follow, actor, origin.path().as_str()) {
        Ok(user) => user,
        Err(redirect) => return Ok(redirect),
    };
    let author = User::load_by_name(username, &mut connection)?;
    if current.id != author.id {
        follow::unfollow(&mut connection, &current, &author)?;
    }
    Ok(Redirect::to(profile_url(&author.username)))
}
