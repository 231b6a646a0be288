use diesel::result::Error as DieselError;
use diesel::SqliteConnection;
use rocket::Either;
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Redirect, Responder};
use rocket::serde::json::Json;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Error as IoError;
use tracing::error;
use crate::utils::try_respond;

pub trait Validate
where
    Self: Sized,
{
    type Error;
    fn validate(self, connection: &mut SqliteConnection) -> Result<Self, Self::Error>;
}

#[derive(Debug)]
pub enum ApiError {
    Diesel(DieselError),
    Validation {
        form: Option<Value>,
        errors: ValidationError,
    },
    Internal,
    NotFound,
}

impl From<DieselError> for ApiError {
    fn from(err: DieselError) -> ApiError {
        ApiError::Diesel(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(errors: ValidationError) -> ApiError {
        ApiError::Validation { form: None, errors }
    }
}

impl From<IoError> for ApiError {
    fn from(err: IoError) -> ApiError {
        error!(error = %err, "i/o failure while handling request");
        ApiError::Internal
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> ApiError {
        error!(error = %err, "failed to render document");
        ApiError::Internal
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// A document, or somewhere else to go.
pub type PageResult<T> = Result<Either<Json<T>, Redirect>, ApiError>;

#[derive(Debug, Serialize, Default, PartialEq)]
pub struct ValidationError(BTreeMap<String, Vec<String>>);

impl ValidationError {
    pub fn add_error<K: Into<String>, V: Into<String>>(&mut self, key: K, val: V) {
        let entry = self.0.entry(key.into()).or_default();
        entry.push(val.into());
    }

    pub fn from<K: Into<String>, V: Into<String>>(key: K, val: V) -> Self {
        let mut error = ValidationError::default();
        error.add_error(key, val);
        error
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn merge(&mut self, other: ValidationError) {
        for (key, errors) in other.0.into_iter() {
            let entry = self.0.entry(key).or_default();
            entry.extend(errors);
        }
    }

    pub fn empty(&self) -> bool {
        self.len() == 0
    }

    pub fn field(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(|errors| errors.as_slice())
    }

    /// Pairs the errors with the submitted form so the caller can show the
    /// form again with what the user typed.
    pub fn with_form(self, form: Value) -> ApiError {
        ApiError::Validation {
            form: Some(form),
            errors: self,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        match self {
            ApiError::Diesel(error) => match error {
                DieselError::NotFound => Err(Status::NotFound),
                other => {
                    error!(error = %other, path = %req.uri(), "database error");
                    Err(Status::InternalServerError)
                }
            },

            ApiError::Validation { form, errors } => {
                let body = json!({ "form": form, "errors": errors });
                try_respond(req, &body, Status::UnprocessableEntity)
            }

            ApiError::NotFound => Err(Status::NotFound),
            ApiError::Internal => Err(Status::InternalServerError),
        }
    }
}
