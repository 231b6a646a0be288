use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::{insert_into, select};
use rocket::form::Form;
use rocket::http::{Cookie, CookieJar};
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::{get, post, FromForm};
use serde_json::{json, Value};
use std::convert::Infallible;
use tracing::{debug, error, info};

use crate::db::{DbConnection, LoadById};
use crate::types::{ApiError, ApiResult, Validate, ValidationError};
use crate::utils::local_path;

pub mod models;
mod utils;

use self::utils::*;

pub const SESSION_COOKIE: &str = "user_id";

/// The user id carried by the private session cookie. Reading it never
/// touches the database; handlers resolve the user on their own connection
/// with [`Session::user`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    user_id: Option<i32>,
}

impl Session {
    /// The logged-in user, or `None` for anonymous requests and sessions
    /// whose account no longer exists.
    pub fn user(&self, connection: &mut SqliteConnection) -> QueryResult<Option<models::User>> {
        let user_id = match self.user_id {
            Some(user_id) => user_id,
            None => return Ok(None),
        };
        match models::User::load_by_id(user_id, connection) {
            Ok(user) => Ok(Some(user)),
            Err(DieselError::NotFound) => {
                debug!(user_id, "session points at a deleted user");
                Ok(None)
            }
            Err(e) => {
                error!(user_id, error = %e, "failed to load session user");
                Err(e)
            }
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let user_id = request
            .cookies()
            .get_private(SESSION_COOKIE)
            .and_then(|cookie| cookie.value().parse::<i32>().ok());
        Outcome::Success(Session { user_id })
    }
}

#[derive(Debug, FromForm)]
pub struct Registration {
    #[field(default = String::new())]
    username: String,
    #[field(default = String::new())]
    first_name: String,
    #[field(default = String::new())]
    last_name: String,
    #[field(default = String::new())]
    password: String,
}

impl Registration {
    fn echo(&self) -> Value {
        json!({
            "username": self.username,
            "first_name": self.first_name,
            "last_name": self.last_name,
        })
    }
}

impl Validate for Registration {
    type Error = ApiError;
    fn validate(self, connection: &mut SqliteConnection) -> Result<Self, Self::Error> {
        use crate::db::schema::users::dsl::*;
        let mut errors = ValidationError::default();

        if let Err(e) = validate_username_re(&self.username) {
            errors.merge(e);
        }
        if let Err(e) = validate_password(&self.password) {
            errors.merge(e);
        }

        let username_exists = select(exists(users.filter(username.eq(&self.username))))
            .get_result::<bool>(connection)?;
        if username_exists {
            errors.add_error("username", "username already exists");
        }

        if errors.empty() {
            Ok(self)
        } else {
            Err(errors.with_form(self.echo()))
        }
    }
}

#[post("/signup", data = "<registration>")]
pub fn signup(
    mut connection: DbConnection,
    jar: &CookieJar<'_>,
    registration: Form<Registration>,
) -> Result<Redirect, ApiError> {
    use crate::db::schema::users::dsl::*;

    let registration = registration.into_inner().validate(&mut connection)?;
    let new_user = models::NewUser {
        username: registration.username.clone(),
        first_name: registration.first_name.trim().to_string(),
        last_name: registration.last_name.trim().to_string(),
        password_hash: models::User::make_password(&registration.password)?,
    };

    let user = insert_into(users)
        .values(&new_user)
        .returning(models::User::as_returning())
        .get_result(&mut *connection)?;
    jar.add_private(Cookie::new(SESSION_COOKIE, user.id.to_string()));
    info!(user_id = user.id, username = %user.username, "user signed up");
    Ok(Redirect::to("/"))
}

#[derive(Debug, FromForm)]
pub struct Credentials<'r> {
    #[field(default = "")]
    username: &'r str,
    #[field(default = "")]
    password: &'r str,
    next: Option<&'r str>,
}

#[get("/login?<next>")]
pub fn login_form(next: Option<&str>) -> ApiResult<Value> {
    Ok(Json(json!({
        "form": { "username": "", "password": "" },
        "next": local_path(next),
    })))
}

#[post("/login", data = "<credentials>")]
pub fn login(
    mut connection: DbConnection,
    jar: &CookieJar<'_>,
    credentials: Form<Credentials<'_>>,
) -> Result<Redirect, ApiError> {
    let rejected = || {
        ValidationError::from("__all__", "Invalid username or password").with_form(json!({
            "username": credentials.username,
            "next": local_path(credentials.next),
        }))
    };

    let user = match models::User::load_by_name(credentials.username, &mut connection) {
        Ok(user) => user,
        Err(DieselError::NotFound) => return Err(rejected()),
        Err(e) => return Err(e.into()),
    };
    if !user.verify_password(credentials.password)? {
        return Err(rejected());
    }

    jar.add_private(Cookie::new(SESSION_COOKIE, user.id.to_string()));
    info!(user_id = user.id, "user logged in");
    Ok(Redirect::to(local_path(credentials.next)))
}

#[get("/logout")]
pub fn logout(jar: &CookieJar<'_>) -> Redirect {
    jar.remove_private(Cookie::from(SESSION_COOKIE));
    Redirect::to("/")
}
