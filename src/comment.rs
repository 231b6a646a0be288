use chrono::{NaiveDateTime, Utc};
use diesel::insert_into;
use diesel::prelude::*;
use rocket::form::Form;
use rocket::http::uri::Origin;
use rocket::response::Redirect;
use rocket::{post, FromForm};
use tracing::{debug, info};

use crate::db::schema::{comments, users};
use crate::db::{DbConnection, LoadById};
use crate::gate::{self, Action};
use crate::post::Post;
use crate::types::ApiError;
use crate::users::Session;
use crate::users::models::{Author, User};
use crate::utils::serialize_date;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = comments)]
#[diesel(belongs_to(Post))]
#[diesel(belongs_to(User, foreign_key = author_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Comment {
    pub id: i32,
    pub post_id: i32,
    pub author_id: i32,
    pub text: String,
    pub created: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment {
    pub post_id: i32,
    pub author_id: i32,
    pub text: String,
    pub created: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    id: i32,
    text: String,
    #[serde(serialize_with = "serialize_date")]
    created: NaiveDateTime,
    author: Author,
}

impl From<(Comment, User)> for CommentView {
    fn from(comment_and_author: (Comment, User)) -> Self {
        let (comment, author) = comment_and_author;
        CommentView {
            id: comment.id,
            text: comment.text,
            created: comment.created,
            author: author.author(),
        }
    }
}

/// Comments under a post, newest first.
pub fn comments_for(connection: &mut SqliteConnection, post: &Post) -> QueryResult<Vec<CommentView>> {
    let rows = Comment::belonging_to(post)
        .inner_join(users::table)
        .order((comments::created.desc(), comments::id.desc()))
        .select((Comment::as_select(), User::as_select()))
        .load::<(Comment, User)>(connection)?;
    Ok(rows.into_iter().map(CommentView::from).collect())
}

#[derive(Debug, FromForm)]
pub struct CommentForm {
    #[field(default = String::new())]
    text: String,
}

#[post("/posts/<id>/comment", data = "<form>")]
pub fn add_comment(
    mut connection: DbConnection,
    session: Session,
    origin: &Origin<'_>,
    id: i32,
    form: Form<CommentForm>,
) -> Result<Redirect, ApiError> {
    let actor = session.user(&mut connection)?;
    let user = match gate::admit(Action::Comment, actor, origin.path().as_str()) {
        Ok(user) => user,
        Err(redirect) => return Ok(redirect),
    };
    let post = Post::load_by_id(id, &mut connection)?;

    // an empty comment is dropped and the reader lands back on the post
    if form.text.trim().is_empty() {
        debug!(post_id = post.id, "ignoring blank comment");
        return Ok(Redirect::to(gate::post_url(post.id)));
    }

    let new_comment = NewComment {
        post_id: post.id,
        author_id: user.id,
        text: form.into_inner().text,
        created: Utc::now().naive_utc(),
    };
    insert_into(comments::table)
        .values(&new_comment)
        .execute(&mut *connection)?;
    info!(post_id = post.id, author_id = user.id, "comment added");
    Ok(Redirect::to(gate::post_url(post.id)))
}
