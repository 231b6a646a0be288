use chrono::{NaiveDateTime, SecondsFormat};
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use serde::Serializer;
use serde_json::Value;

pub fn try_respond<'r>(req: &'r Request<'_>, json: &Value, status: Status) -> response::Result<'static> {
    let response = Json(json.clone()).respond_to(req)?;
    Response::build_from(response).status(status).ok()
}

pub fn serialize_date<S>(date: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = date.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true);
    serializer.serialize_str(&s)
}

/// Keeps only local paths so a crafted `next` parameter cannot send the
/// browser to another host after login.
pub fn local_path(next: Option<&str>) -> String {
    match next {
        Some(path)
            if path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\") =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}
