use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use diesel::prelude::*;
use rand::rngs::OsRng;
use tracing::error;

use crate::db::schema::users;
use crate::db::LoadById;
use crate::types::ApiError;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

/// What other people see of a user next to a post or comment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Author {
    pub username: String,
    pub full_name: String,
}

impl User {
    pub fn make_password(password: &str) -> Result<String, ApiError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                error!(error = %e, "failed to hash password");
                ApiError::Internal
            })
    }

    pub fn verify_password(&self, password_to_verify: &str) -> Result<bool, ApiError> {
        let parsed = PasswordHash::new(&self.password_hash).map_err(|e| {
            error!(user_id = self.id, error = %e, "stored password hash is malformed");
            ApiError::Internal
        })?;
        Ok(Argon2::default()
            .verify_password(password_to_verify.as_bytes(), &parsed)
            .is_ok())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn author(&self) -> Author {
        Author {
            username: self.username.clone(),
            full_name: self.full_name(),
        }
    }

    pub fn load_by_name(name: &str, connection: &mut SqliteConnection) -> QueryResult<User> {
        use crate::db::schema::users::dsl::*;
        users
            .filter(username.eq(name))
            .select(User::as_select())
            .get_result(connection)
    }
}

impl LoadById for User {
    fn load_by_id(user_id: i32, connection: &mut SqliteConnection) -> QueryResult<User> {
        users::table
            .find(user_id)
            .select(User::as_select())
            .get_result(connection)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}
