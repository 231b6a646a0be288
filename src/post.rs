use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::{delete as diesel_delete, insert_into, update as diesel_update};
use rocket::Either;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::uri::Origin;
use rocket::response::content::RawJson;
use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::{get, post, FromForm, State};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::cache::PageCache;
use crate::comment::{self, CommentView};
use crate::config::Config;
use crate::db::schema::{groups, posts, users};
use crate::db::{DbConnection, LoadById};
use crate::feed::{self, Page, Scope, Window};
use crate::gate::{self, Action};
use crate::group::Group;
use crate::media;
use crate::types::{ApiError, ApiResult, PageResult, Validate, ValidationError};
use crate::users::Session;
use crate::users::models::{Author, User};
use crate::utils::serialize_date;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = posts)]
#[diesel(belongs_to(User, foreign_key = author_id))]
#[diesel(belongs_to(Group))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Post {
    pub id: i32,
    pub text: String,
    pub pub_date: NaiveDateTime,
    pub image: Option<String>,
    pub group_id: Option<i32>,
    pub author_id: i32,
}

impl LoadById for Post {
    fn load_by_id(post_id: i32, connection: &mut SqliteConnection) -> QueryResult<Post> {
        posts::table
            .find(post_id)
            .select(Post::as_select())
            .get_result(connection)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = posts)]
pub struct NewPost {
    pub text: String,
    pub pub_date: NaiveDateTime,
    pub image: Option<String>,
    pub group_id: Option<i32>,
    pub author_id: i32,
}

/// Text and group are always written; a missing group clears it.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = posts)]
#[diesel(treat_none_as_null = true)]
struct PostChanges {
    text: String,
    group_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct PostView {
    pub id: i32,
    pub text: String,
    #[serde(serialize_with = "serialize_date")]
    pub pub_date: NaiveDateTime,
    pub image: Option<String>,
    pub author: Author,
    pub group: Option<Group>,
}

impl PostView {
    pub fn new(post: Post, author: Author, group: Option<Group>) -> Self {
        PostView {
            id: post.id,
            text: post.text,
            pub_date: post.pub_date,
            image: post.image.as_deref().map(media::url),
            author,
            group,
        }
    }

    /// Looks up authors and groups for a batch of posts with one query each
    /// and keeps the order of `posts`.
    pub fn attach(connection: &mut SqliteConnection, posts: Vec<Post>) -> QueryResult<Vec<PostView>> {
        let author_ids: Vec<i32> = posts.iter().map(|post| post.author_id).collect();
        let group_ids: Vec<i32> = posts.iter().filter_map(|post| post.group_id).collect();

        let authors = users::table
            .filter(users::id.eq_any(author_ids))
            .select(User::as_select())
            .load(connection)?
            .into_iter()
            .map(|user| (user.id, user.author()))
            .collect::<HashMap<_, _>>();
        let groups = groups::table
            .filter(groups::id.eq_any(group_ids))
            .select(Group::as_select())
            .load(connection)?
            .into_iter()
            .map(|group| (group.id, group))
            .collect::<HashMap<_, _>>();

        posts
            .into_iter()
            .map(|post| {
                let author = authors
                    .get(&post.author_id)
                    .cloned()
                    .ok_or(DieselError::NotFound)?;
                let group = post.group_id.and_then(|id| groups.get(&id).cloned());
                Ok(PostView::new(post, author, group))
            })
            .collect()
    }
}

#[derive(Debug, FromForm)]
pub struct PostForm<'r> {
    #[field(default = String::new())]
    text: String,
    group: Option<String>,
    image: Option<TempFile<'r>>,
}

impl<'r> PostForm<'r> {
    fn echo(&self) -> Value {
        json!({ "text": self.text, "group": self.group })
    }

    /// The selected group id. Only meaningful after validation.
    fn group_id(&self) -> Option<i32> {
        self.group
            .as_deref()
            .map(str::trim)
            .filter(|group| !group.is_empty())
            .and_then(|group| group.parse().ok())
    }
}

impl<'r> Validate for PostForm<'r> {
    type Error = ApiError;
    fn validate(self, connection: &mut SqliteConnection) -> Result<Self, Self::Error> {
        let mut errors = ValidationError::default();
        if self.text.trim().is_empty() {
            errors.add_error("text", "This field is required.");
        }

        let selected = self.group.as_deref().map(str::trim).unwrap_or("");
        if !selected.is_empty() {
            match selected.parse::<i32>() {
                Ok(group_id) if Group::exists(group_id, connection)? => {}
                _ => errors.add_error("group", "Select a valid choice."),
            }
        }

        if errors.empty() {
            Ok(self)
        } else {
            Err(errors.with_form(self.echo()))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PostFormPage {
    form: Value,
    groups: Vec<Group>,
    is_edit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    post: Option<PostView>,
}

#[derive(Debug, Serialize)]
pub struct PostDetail {
    post: PostView,
    post_count: i64,
    comments: Vec<CommentView>,
    form: Value,
}

#[derive(Debug, Serialize)]
struct IndexPage {
    page: Page<PostView>,
}

/// Keyed by the page actually served, so out-of-range tokens share the
/// entry of the page they clamp to.
pub fn index_cache_key(window: &Window) -> String {
    format!("index:page={}", window.number)
}

#[get("/?<page>")]
pub fn index(
    mut connection: DbConnection,
    cache: &State<PageCache>,
    page: Option<&str>,
) -> Result<RawJson<String>, ApiError> {
    let window = Window::resolve(feed::count(&mut connection, Scope::All)?, page);
    let key = index_cache_key(&window);
    if let Some(body) = cache.get(&key) {
        debug!(key = %key, "serving cached home page");
        return Ok(RawJson(body));
    }

    let page = feed::load_page(&mut connection, Scope::All, window)?;
    let body = serde_json::to_string(&IndexPage { page })?;
    cache.set(key, body.clone());
    Ok(RawJson(body))
}

#[get("/posts/<id>")]
pub fn detail(mut connection: DbConnection, id: i32) -> ApiResult<PostDetail> {
    let post = Post::load_by_id(id, &mut connection)?;
    let post_count = feed::count(&mut connection, Scope::Author(post.author_id))?;
    let comments = comment::comments_for(&mut connection, &post)?;
    let post = PostView::attach(&mut connection, vec![post])?
        .pop()
        .ok_or(ApiError::NotFound)?;

    Ok(Json(PostDetail {
        post,
        post_count,
        comments,
        form: json!({ "text": "" }),
    }))
}

#[get("/create")]
pub fn create_form(
    mut connection: DbConnection,
    session: Session,
    origin: &Origin<'_>,
) -> PageResult<PostFormPage> {
    let actor = session.user(&mut connection)?;
    if let Err(redirect) = gate::admit(Action::Create, actor, origin.path().as_str()) {
        return Ok(Either::Right(redirect));
    }
    Ok(Either::Left(Json(PostFormPage {
        form: json!({ "text": "", "group": null }),
        groups: Group::all(&mut connection)?,
        is_edit: false,
        post: None,
    })))
}

#[post("/create", data = "<form>")]
pub async fn create(
    mut connection: DbConnection,
    session: Session,
    origin: &Origin<'_>,
    config: &State<Config>,
    form: Form<PostForm<'_>>,
) -> Result<Redirect, ApiError> {
    let actor = session.user(&mut connection)?;
    let user = match gate::admit(Action::Create, actor, origin.path().as_str()) {
        Ok(user) => user,
        Err(redirect) => return Ok(redirect),
    };
    let mut form = form.into_inner().validate(&mut connection)?;
    let image = match form.image.as_mut() {
        Some(file) => media::store_image(file, &config.media_root).await?,
        None => None,
    };

    let new_post = NewPost {
        text: form.text.clone(),
        pub_date: Utc::now().naive_utc(),
        image,
        group_id: form.group_id(),
        author_id: user.id,
    };
    let post = insert_into(posts::table)
        .values(&new_post)
        .returning(Post::as_returning())
        .get_result(&mut *connection)?;
    info!(post_id = post.id, author_id = user.id, "post created");
    Ok(Redirect::to(format!("/profile/{}/", user.username)))
}

#[get("/posts/<id>/edit")]
pub fn edit_form(
    mut connection: DbConnection,
    session: Session,
    origin: &Origin<'_>,
    id: i32,
) -> PageResult<PostFormPage> {
    let actor = session.user(&mut connection)?;
    let post = Post::load_by_id(id, &mut connection)?;
    if let Err(redirect) = gate::admit(Action::Edit(&post), actor, origin.path().as_str()) {
        return Ok(Either::Right(redirect));
    }

    let form = json!({ "text": post.text, "group": post.group_id });
    let groups = Group::all(&mut connection)?;
    let post = PostView::attach(&mut connection, vec![post])?.pop();
    Ok(Either::Left(Json(PostFormPage {
        form,
        groups,
        is_edit: true,
        post,
    })))
}

#[post("/posts/<id>/edit", data = "<form>")]
pub async fn edit(
    mut connection: DbConnection,
    session: Session,
    origin: &Origin<'_>,
    config: &State<Config>,
    id: i32,
    form: Form<PostForm<'_>>,
) -> Result<Redirect, ApiError> {
    let actor = session.user(&mut connection)?;
    let post = Post::load_by_id(id, &mut connection)?;
    if let Err(redirect) = gate::admit(Action::Edit(&post), actor, origin.path().as_str()) {
        debug!(post_id = post.id, "edit refused, sending back to the post");
        return Ok(redirect);
    }

    let mut form = form.into_inner().validate(&mut connection)?;
    let changes = PostChanges {
        text: form.text.clone(),
        group_id: form.group_id(),
    };
    diesel_update(&post)
        .set(&changes)
        .execute(&mut *connection)?;

    if let Some(file) = form.image.as_mut() {
        if let Some(image) = media::store_image(file, &config.media_root).await? {
            diesel_update(&post)
                .set(posts::image.eq(image))
                .execute(&mut *connection)?;
        }
    }

    info!(post_id = post.id, "post edited");
    Ok(Redirect::to(gate::post_url(post.id)))
}

/// Removing a post leaves any cached home page as it was until the cache
/// entry expires or is cleared.
#[post("/posts/<id>/delete")]
pub fn delete(
    mut connection: DbConnection,
    session: Session,
    origin: &Origin<'_>,
    id: i32,
) -> Result<Redirect, ApiError> {
    let actor = session.user(&mut connection)?;
    let post = Post::load_by_id(id, &mut connection)?;
    let user = match gate::admit(Action::Delete(&post), actor, origin.path().as_str()) {
        Ok(user) => user,
        Err(redirect) => return Ok(redirect),
    };

    diesel_delete(&post).execute(&mut *connection)?;
    info!(post_id = post.id, "post deleted");
    Ok(Redirect::to(format!("/profile/{}/", user.username)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::follows;
    use crate::follow;
    use crate::test_utils::TestApp;
    use rocket::http::{ContentType, Status};

    #[test]
    fn home_page_is_paginated() {
        let app = TestApp::new();
        let leo = app.create_user("leo");
        for n in 0..13 {
            app.create_post(&leo, &format!("post {}", n), None);
        }

        let first: Value = app.client.get("/").dispatch().into_json().unwrap();
        let second: Value = app.client.get("/?page=2").dispatch().into_json().unwrap();
        let beyond: Value = app.client.get("/?page=3").dispatch().into_json().unwrap();
        let garbage: Value = app.client.get("/?page=abc").dispatch().into_json().unwrap();

        assert_eq!(first["page"]["items"].as_array().unwrap().len(), 10);
        assert_eq!(second["page"]["items"].as_array().unwrap().len(), 3);
        assert_eq!(beyond["page"]["number"], 2);
        assert_eq!(beyond["page"]["items"], second["page"]["items"]);
        assert_eq!(garbage["page"]["number"], 1);
    }

    #[test]
    fn deleted_post_stays_on_cached_home_page_until_clear() {
        let app = TestApp::new();
        let leo = app.create_user("leo");
        let post = app.create_post(&leo, "soon gone", None);

        let before = app.client.get("/").dispatch().into_string().unwrap();
        assert!(before.contains("soon gone"));

        app.login(&leo);
        let response = app
            .client
            .post(format!("/posts/{}/delete/", post.id))
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);
        let mut conn = app.conn();
        assert!(Post::load_by_id(post.id, &mut conn).is_err());

        let stale = app.client.get("/").dispatch().into_string().unwrap();
        assert_eq!(stale, before);

        app.cache().clear();

        let fresh = app.client.get("/").dispatch().into_string().unwrap();
        assert!(!fresh.contains("soon gone"));
    }

    #[test]
    fn out_of_range_pages_share_one_cache_entry() {
        let app = TestApp::new();
        let leo = app.create_user("leo");
        app.create_post(&leo, "only post", None);

        for page in 1..=200 {
            let response = app.client.get(format!("/?page={}", page)).dispatch();
            assert_eq!(response.status(), Status::Ok);
        }
        app.client.get("/?page=-7").dispatch();
        app.client.get("/?page=junk").dispatch();

        assert_eq!(app.cache().len(), 1);
    }

    #[test]
    fn detail_shows_post_author_count_and_comments() {
        let app = TestApp::new();
        let leo = app.create_user("leo");
        let kim = app.create_user("kim");
        let post = app.create_post(&leo, "first", None);
        app.create_post(&leo, "second", None);
        app.create_comment(&post, &kim, "older");
        app.create_comment(&post, &leo, "newer");

        let response = app.client.get(format!("/posts/{}/", post.id)).dispatch();
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["post"]["text"], "first");
        assert_eq!(body["post"]["author"]["username"], "leo");
        assert_eq!(body["post_count"], 2);
        assert_eq!(body["comments"][0]["text"], "newer");
        assert_eq!(body["comments"][1]["author"]["username"], "kim");
    }

    #[test]
    fn missing_post_is_not_found() {
        let app = TestApp::new();
        let response = app.client.get("/posts/404/").dispatch();
        assert_eq!(response.status(), Status::NotFound);
    }

    #[test]
    fn anonymous_create_redirects_to_login() {
        let app = TestApp::new();
        let response = app.client.get("/create/").dispatch();
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(
            response.headers().get_one("Location"),
            Some("/auth/login/?next=/create/")
        );

        let response = app
            .client
            .post("/create/")
            .header(ContentType::Form)
            .body("text=sneaky")
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);
        let mut conn = app.conn();
        assert_eq!(feed::count(&mut conn, Scope::All).unwrap(), 0);
    }

    #[test]
    fn author_creates_post_in_group() {
        let app = TestApp::new();
        let leo = app.create_user("leo");
        let cats = app.create_group("Cats");
        app.login(&leo);

        let response = app
            .client
            .post("/create/")
            .header(ContentType::Form)
            .body(format!("text=Hello%20cats&group={}", cats.id))
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(response.headers().get_one("Location"), Some("/profile/leo/"));

        let mut conn = app.conn();
        let page = feed::paginate(&mut conn, Scope::Group(cats.id), None).unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.items[0].text, "Hello cats");
        assert_eq!(page.items[0].author.username, "leo");
    }

    // 1x1 transparent GIF
    const SMALL_GIF: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x21,
        0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00,
        0x01, 0x00, 0x00, 0x02, 0x00, 0x3b,
    ];

    fn multipart_post(text: &str, file_name: &str, image: &[u8]) -> (ContentType, Vec<u8>) {
        let boundary = "yatube-test-boundary";
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"text\"\r\n\r\n{text}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file}\"\r\n\
             Content-Type: image/gif\r\n\r\n",
            b = boundary,
            text = text,
            file = file_name,
        )
        .into_bytes();
        body.extend_from_slice(image);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        let content_type =
            ContentType::new("multipart", "form-data").with_params(("boundary", boundary));
        (content_type, body)
    }

    #[test]
    fn create_with_image_stores_and_serves_it() {
        let app = TestApp::new();
        let leo = app.create_user("leo");
        app.login(&leo);

        let (content_type, body) = multipart_post("With a picture", "small.gif", SMALL_GIF);
        let response = app
            .client
            .post("/create/")
            .header(content_type)
            .body(body)
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);

        let mut conn = app.conn();
        let page = feed::paginate(&mut conn, Scope::Author(leo.id), None).unwrap();
        assert_eq!(page.count, 1);
        let url = page.items[0].image.clone().expect("post has an image");
        assert!(url.starts_with("/media/posts/"));
        assert!(url.ends_with(".gif"));

        let relative = url.trim_start_matches("/media/");
        let stored = app.media_root().join(relative);
        assert_eq!(std::fs::read(&stored).unwrap(), SMALL_GIF);

        let detail: Value = app
            .client
            .get(format!("/posts/{}/", page.items[0].id))
            .dispatch()
            .into_json()
            .unwrap();
        assert_eq!(detail["post"]["image"], url.as_str());

        let response = app.client.get(url.clone()).dispatch();
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_bytes().unwrap(), SMALL_GIF);
    }

    #[test]
    fn edit_with_image_replaces_it() {
        let app = TestApp::new();
        let leo = app.create_user("leo");
        let post = app.create_post(&leo, "plain", None);
        app.login(&leo);

        let (content_type, body) = multipart_post("now with a picture", "small.gif", SMALL_GIF);
        let response = app
            .client
            .post(format!("/posts/{}/edit/", post.id))
            .header(content_type)
            .body(body)
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);

        let mut conn = app.conn();
        let edited = Post::load_by_id(post.id, &mut conn).unwrap();
        assert_eq!(edited.text, "now with a picture");
        let image = edited.image.expect("image stored");
        assert!(image.starts_with("posts/"));
        assert!(app.media_root().join(&image).is_file());
    }

    #[test]
    fn blank_text_re_renders_the_form() {
        let app = TestApp::new();
        let leo = app.create_user("leo");
        app.login(&leo);

        let response = app
            .client
            .post("/create/")
            .header(ContentType::Form)
            .body("text=%20%20%20&group=999")
            .dispatch();
        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["form"]["text"], "   ");
        assert!(body["errors"]["text"].is_array());
        assert!(body["errors"]["group"].is_array());

        let mut conn = app.conn();
        assert_eq!(feed::count(&mut conn, Scope::All).unwrap(), 0);
    }

    #[test]
    fn author_edits_own_post() {
        let app = TestApp::new();
        let leo = app.create_user("leo");
        let cats = app.create_group("Cats");
        let post = app.create_post(&leo, "draft", Some(&cats));
        app.login(&leo);

        let form: Value = app
            .client
            .get(format!("/posts/{}/edit/", post.id))
            .dispatch()
            .into_json()
            .unwrap();
        assert_eq!(form["is_edit"], true);
        assert_eq!(form["form"]["text"], "draft");

        let response = app
            .client
            .post(format!("/posts/{}/edit/", post.id))
            .header(ContentType::Form)
            .body("text=final&group=")
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(
            response.headers().get_one("Location"),
            Some(format!("/posts/{}/", post.id).as_str())
        );

        let mut conn = app.conn();
        let edited = Post::load_by_id(post.id, &mut conn).unwrap();
        assert_eq!(edited.text, "final");
        assert_eq!(edited.group_id, None);
        assert_eq!(edited.pub_date, post.pub_date);
    }

    #[test]
    fn someone_else_editing_is_sent_back_to_the_post() {
        let app = TestApp::new();
        let leo = app.create_user("leo");
        let kim = app.create_user("kim");
        let post = app.create_post(&leo, "mine", None);
        app.login(&kim);

        let expected = format!("/posts/{}/", post.id);
        let response = app
            .client
            .get(format!("/posts/{}/edit/", post.id))
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(response.headers().get_one("Location"), Some(expected.as_str()));

        let response = app
            .client
            .post(format!("/posts/{}/edit/", post.id))
            .header(ContentType::Form)
            .body("text=hijacked")
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(response.headers().get_one("Location"), Some(expected.as_str()));

        let mut conn = app.conn();
        assert_eq!(Post::load_by_id(post.id, &mut conn).unwrap().text, "mine");
    }

    #[test]
    fn someone_else_cannot_delete() {
        let app = TestApp::new();
        let leo = app.create_user("leo");
        let kim = app.create_user("kim");
        let post = app.create_post(&leo, "mine", None);
        app.login(&kim);

        let response = app
            .client
            .post(format!("/posts/{}/delete/", post.id))
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);
        let mut conn = app.conn();
        assert!(Post::load_by_id(post.id, &mut conn).is_ok());
    }

    #[test]
    fn deleting_an_author_removes_their_posts() {
        let app = TestApp::new();
        let leo = app.create_user("leo");
        let kim = app.create_user("kim");
        let post = app.create_post(&leo, "by leo", None);
        let kims_post = app.create_post(&kim, "by kim", None);
        app.create_comment(&post, &kim, "by kim");
        app.create_comment(&kims_post, &leo, "by leo");
        let mut conn = app.conn();
        follow::follow(&mut conn, &leo, &kim).unwrap();
        follow::follow(&mut conn, &kim, &leo).unwrap();

        diesel::delete(users::table.find(leo.id))
            .execute(&mut conn)
            .unwrap();

        assert_eq!(feed::count(&mut conn, Scope::All).unwrap(), 1);
        assert_eq!(feed::count(&mut conn, Scope::Author(leo.id)).unwrap(), 0);
        assert!(comment::comments_for(&mut conn, &post).unwrap().is_empty());
        assert!(comment::comments_for(&mut conn, &kims_post).unwrap().is_empty());
        let edges: i64 = follows::table.count().get_result(&mut conn).unwrap();
        assert_eq!(edges, 0);
        assert_eq!(follow::followers_count(&mut conn, &kim).unwrap(), 0);
    }
}
