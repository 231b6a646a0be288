use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection};
use diesel::result::Error as DieselError;
use diesel::sqlite::SqliteConnection;
use diesel::QueryResult;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest};
use rocket::{Request, State};
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tracing::{info, warn};

pub mod schema;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

// An alias to the type for a pool of Diesel SQLite connections.
pub type Pool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

pub struct DbConnection(pub r2d2::PooledConnection<ConnectionManager<SqliteConnection>>);

error_chain! {
    foreign_links {
        Var(::std::env::VarError);
        R2D2(r2d2::Error);
        Diesel(DieselError);
        Io(::std::io::Error);
        Config(::rocket::figment::Error);
    }

    errors {
        Migration(reason: String) {
            description("database migration failed")
            display("database migration failed: {}", reason)
        }
    }
}

/// Attempts to retrieve a single connection from the managed database pool. If
/// no pool is currently managed, fails with an `InternalServerError` status. If
/// no connections are available, fails with a `ServiceUnavailable` status.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for DbConnection {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<DbConnection, ()> {
        let pool = match request.guard::<&State<Pool>>().await {
            Outcome::Success(pool) => pool,
            _ => return Outcome::Error((Status::InternalServerError, ())),
        };
        match pool.get() {
            Ok(conn) => Outcome::Success(DbConnection(conn)),
            Err(e) => {
                warn!(error = %e, "connection pool exhausted");
                Outcome::Error((Status::ServiceUnavailable, ()))
            }
        }
    }
}

// For the convenience of using a &DbConnection as a &SqliteConnection.
impl Deref for DbConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DbConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Per-connection pragmas. SQLite keeps foreign key enforcement off unless
/// every connection asks for it, and the cascade rules live in the schema.
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> ::std::result::Result<(), diesel::r2d2::Error> {
        let pragmas = format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            self.busy_timeout.as_millis()
        );
        conn.batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Builds the pool and brings the schema up to date. A request that waits
/// longer than `timeout` for a connection is refused with 503.
pub fn init_pool(database_url: &str, max_size: u32, timeout: Duration) -> Result<Pool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_timeout(timeout)
        .connection_customizer(Box::new(ConnectionOptions {
            busy_timeout: Duration::from_secs(5),
        }))
        .build(manager)?;
    run_migrations(&pool)?;
    Ok(pool)
}

pub fn run_migrations(pool: &Pool) -> Result<()> {
    let mut connection = pool.get()?;
    let applied = connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::from(ErrorKind::Migration(e.to_string())))?
        .len();
    info!(applied, "database schema is up to date");
    Ok(())
}

pub trait LoadById
where
    Self: Sized,
{
    fn load_by_id(id: i32, connection: &mut SqliteConnection) -> QueryResult<Self>;
}
