//! Who may do what to a post.
//!
//! Every check here is pure: the caller loads the actor and the post, and the
//! gate only answers with a decision. A denial is never an error page, it is
//! a place to send the browser instead.

use rocket::response::Redirect;

use crate::post::Post;
use crate::users::models::User;

pub const LOGIN_PATH: &str = "/auth/login/";

#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    Create,
    Edit(&'a Post),
    Delete(&'a Post),
    Comment,
    /// Following, unfollowing and reading the personal feed.
    Follow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied { location: String },
}

pub fn login_url(next: &str) -> String {
    format!("{}?next={}", LOGIN_PATH, next)
}

pub fn post_url(post_id: i32) -> String {
    format!("/posts/{}/", post_id)
}

pub fn authorize(action: Action<'_>, actor: Option<&User>, requested: &str) -> Decision {
    match (action, actor) {
        (Action::Edit(post), Some(user)) | (Action::Delete(post), Some(user)) => {
            if post.author_id == user.id {
                Decision::Allowed
            } else {
                Decision::Denied {
                    location: post_url(post.id),
                }
            }
        }
        // Anonymous visitors do not get a login prompt for someone else's
        // post, they are sent back to read it.
        (Action::Edit(post), None) | (Action::Delete(post), None) => Decision::Denied {
            location: post_url(post.id),
        },
        (_, Some(_)) => Decision::Allowed,
        (_, None) => Decision::Denied {
            location: login_url(requested),
        },
    }
}

/// Runs `authorize` and hands the actor back when the action is allowed.
pub fn admit(action: Action<'_>, actor: Option<User>, requested: &str) -> Result<User, Redirect> {
    match (authorize(action, actor.as_ref(), requested), actor) {
        (Decision::Allowed, Some(user)) => Ok(user),
        (Decision::Denied { location }, _) => Err(Redirect::to(location)),
        (Decision::Allowed, None) => Err(Redirect::to(login_url(requested))),
    }
}
