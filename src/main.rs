#[macro_use]
extern crate diesel;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate serde_derive;

mod about;
mod cache;
mod comment;
mod config;
mod db;
mod feed;
mod follow;
mod gate;
mod group;
mod media;
mod post;
mod profile;
mod types;
mod users;
mod utils;

#[cfg(test)]
mod test_utils;

use rocket::figment::Figment;
use rocket::fs::FileServer;
use rocket::request::Request;
use rocket::serde::json::Value;
use rocket::{catch, catchers, launch, routes, Build, Rocket};
use serde_json::json;
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cache::PageCache;
use crate::config::Config;

#[catch(422)]
fn unprocessable(_req: &Request) -> Value {
    json!({
        "errors": [
            "malformed form submission"
        ]
    })
}

#[catch(404)]
fn not_found(_req: &Request) -> Value {
    json!({
        "errors": [
            "entity not found"
        ]
    })
}

#[catch(500)]
fn internal_error(_req: &Request) -> Value {
    json!({
        "errors": [
            "internal server error"
        ]
    })
}

pub fn build_rocket(figment: Figment) -> db::Result<Rocket<Build>> {
    let config = Config::from_figment(&figment)?;
    let pool = db::init_pool(&config.database_url()?, config.pool_size, config.pool_timeout())?;
    fs::create_dir_all(config.media_root.join(media::POST_IMAGES))?;
    info!(
        media_root = %config.media_root.display(),
        cache_ttl = config.cache_ttl,
        "configured yatube"
    );

    Ok(rocket::custom(figment)
        .manage(pool)
        .manage(PageCache::new(config.cache_ttl()))
        .mount(
            "/",
            routes![
                post::index,
                post::detail,
                post::create_form,
                post::create,
                post::edit_form,
                post::edit,
                post::delete,
                comment::add_comment,
                group::group_posts,
                profile::profile,
                profile::profile_follow,
                profile::profile_unfollow,
                follow::follow_index,
            ],
        )
        .mount(
            "/auth",
            routes![users::signup, users::login_form, users::login, users::logout],
        )
        .mount("/about", routes![about::author, about::tech])
        .mount("/media", FileServer::from(config.media_root.clone()))
        .manage(config)
        .register("/", catchers![not_found, unprocessable, internal_error]))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[launch]
fn rocket() -> _ {
    init_tracing();
    build_rocket(config::figment()).expect("failed to configure the application")
}
