use actix::prelude::*;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, NO_PARAMS};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::auth::User;
use crate::errors::JobStoreError;
use crate::job::{Job, JobFields};

pub mod query;

mod migrate {
    use refinery::embed_migrations;
    embed_migrations!("src/database/migrations");
}

/// Maximum number of rows a job listing returns.
pub const LIST_LIMIT: i64 = 10;

/// Connection pool limits. Every open connection lives on its own
/// `SyncArbiter` thread, so `max_open` is also the number of database
/// threads.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolPolicy {
    pub max_idle: usize,
    pub max_open: usize,
    pub max_idle_time_secs: u64,
    pub max_lifetime_secs: u64,
    pub query_timeout_secs: u64,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            max_idle: 5,
            max_open: 10,
            max_idle_time_secs: 1,
            max_lifetime_secs: 30,
            query_timeout_secs: 5,
        }
    }
}

impl PoolPolicy {
    pub fn max_idle_time(&self) -> Duration {
        Duration::from_secs(self.max_idle_time_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), JobStoreError> {
        let reason = if self.max_open == 0 {
            Some("pool.max_open must be at least 1")
        } else if self.max_idle > self.max_open {
            Some("pool.max_idle cannot exceed pool.max_open")
        } else if self.query_timeout_secs == 0 {
            Some("pool.query_timeout_secs must be at least 1")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(JobStoreError::InvalidConfig {
                reason: reason.to_owned(),
            }),
            None => Ok(()),
        }
    }
}

struct Slot {
    connection: Connection,
    opened_at: Instant,
    released_at: Instant,
}

pub struct Database {
    path: String,
    policy: PoolPolicy,
    // Connections currently parked across all pool threads.
    idle: Arc<AtomicUsize>,
    schema_ready: Arc<Mutex<bool>>,
    slot: Option<Slot>,
}

impl Database {
    fn new(
        path: String,
        policy: PoolPolicy,
        idle: Arc<AtomicUsize>,
        schema_ready: Arc<Mutex<bool>>,
    ) -> Self {
        Self {
            path,
            policy,
            idle,
            schema_ready,
            slot: None,
        }
    }

    /// Starts `policy.max_open` database threads sharing one idle budget.
    /// Connections are opened lazily, so starting never fails.
    pub fn start(path: &str, policy: PoolPolicy) -> Addr<Database> {
        let path = path.to_owned();
        let threads = policy.max_open;
        let idle = Arc::new(AtomicUsize::new(0));
        let schema_ready = Arc::new(Mutex::new(false));

        SyncArbiter::start(threads, move || {
            Database::new(
                path.clone(),
                policy.clone(),
                idle.clone(),
                schema_ready.clone(),
            )
        })
    }

    fn open(&self) -> Result<Slot, JobStoreError> {
        let mut connection =
            Connection::open(&self.path).map_err(|err| JobStoreError::Connect { source: err })?;

        connection
            .busy_timeout(self.policy.query_timeout())
            .map_err(|err| JobStoreError::Connect { source: err })?;

        self.ensure_schema(&mut connection)?;

        debug!("Opened database connection to {}", &self.path);
        let now = Instant::now();
        Ok(Slot {
            connection,
            opened_at: now,
            released_at: now,
        })
    }

    // Retried on every new connection until it succeeds once.
    fn ensure_schema(&self, connection: &mut Connection) -> Result<(), JobStoreError> {
        let mut ready = self
            .schema_ready
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !*ready {
            debug!("Running database migrations");
            migrate::migrations::runner()
                .run(connection)
                .map_err(|err| JobStoreError::Migrate { source: err })?;
            *ready = true;
        }

        Ok(())
    }

    fn is_fresh(&self, slot: &Slot) -> bool {
        slot.released_at.elapsed() < self.policy.max_idle_time()
            && slot.opened_at.elapsed() < self.policy.max_lifetime()
    }

    fn checkout(&mut self) -> Result<Slot, JobStoreError> {
        if let Some(slot) = self.slot.take() {
            self.idle.fetch_sub(1, Ordering::SeqCst);

            if self.is_fresh(&slot) {
                return Ok(slot);
            }
            debug!("Recycling expired database connection");
        }

        self.open()
    }

    fn checkin(&mut self, mut slot: Slot) {
        if slot.opened_at.elapsed() >= self.policy.max_lifetime() {
            debug!("Closing database connection, lifetime exceeded");
            return;
        }

        let max_idle = self.policy.max_idle;
        let reserved = self
            .idle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |idle| {
                if idle < max_idle {
                    Some(idle + 1)
                } else {
                    None
                }
            })
            .is_ok();

        if reserved {
            slot.released_at = Instant::now();
            self.slot = Some(slot);
        } else {
            debug!("Closing database connection, idle pool is full");
        }
    }

    fn with_connection<T, F>(&mut self, run: F) -> Result<T, JobStoreError>
    where
        F: FnOnce(&Connection) -> Result<T, JobStoreError>,
    {
        let slot = self.checkout()?;
        let result = run(&slot.connection);
        self.checkin(slot);
        result
    }
}

impl Actor for Database {
    type Context = SyncContext<Self>;

    fn started(&mut self, _ctx: &mut SyncContext<Self>) {
        debug!("Database thread started");
    }

    fn stopped(&mut self, _ctx: &mut SyncContext<Self>) {
        if self.slot.take().is_some() {
            self.idle.fetch_sub(1, Ordering::SeqCst);
        }
        debug!("Disconnected from database");
    }
}

fn query_error(err: rusqlite::Error) -> JobStoreError {
    JobStoreError::Query { source: err }
}

fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        email: row.get(3)?,
        kind: row.get(4)?,
        category: row.get(5)?,
        location: row.get(6)?,
        created_at: row.get(7)?,
        expires: row.get(8)?,
    })
}

#[derive(Message)]
#[rtype(result = "Result<(), JobStoreError>")]
pub struct Ping;

impl Handler<Ping> for Database {
    type Result = Result<(), JobStoreError>;

    fn handle(&mut self, _msg: Ping, _ctx: &mut SyncContext<Self>) -> Self::Result {
        self.with_connection(|connection| {
            connection
                .query_row("SELECT 1", NO_PARAMS, |row| row.get::<_, i64>(0))
                .map(|_| ())
                .map_err(query_error)
        })
    }
}

#[derive(Message)]
#[rtype(result = "Result<Vec<Job>, JobStoreError>")]
pub struct ListJobs;

impl Handler<ListJobs> for Database {
    type Result = Result<Vec<Job>, JobStoreError>;

    fn handle(&mut self, _msg: ListJobs, _ctx: &mut SyncContext<Self>) -> Self::Result {
        self.with_connection(|connection| {
            let mut statement = connection.prepare(query::LIST_JOBS).map_err(query_error)?;
            let jobs = statement
                .query_map(params![LIST_LIMIT], job_from_row)
                .map_err(query_error)?
                .collect::<rusqlite::Result<Vec<Job>>>()
                .map_err(query_error)?;

            Ok(jobs)
        })
    }
}

#[derive(Message)]
#[rtype(result = "Result<Job, JobStoreError>")]
pub struct GetJob {
    pub id: i64,
}

impl Handler<GetJob> for Database {
    type Result = Result<Job, JobStoreError>;

    fn handle(&mut self, msg: GetJob, _ctx: &mut SyncContext<Self>) -> Self::Result {
        let id = msg.id;
        self.with_connection(|connection| {
            connection
                .query_row(query::GET_JOB_BY_ID, params![id], job_from_row)
                .optional()
                .map_err(query_error)?
                .ok_or(JobStoreError::NotFound { id })
        })
    }
}

#[derive(Message)]
#[rtype(result = "Result<i64, JobStoreError>")]
pub struct InsertJob {
    pub fields: JobFields,
}

impl Handler<InsertJob> for Database {
    type Result = Result<i64, JobStoreError>;

    fn handle(&mut self, msg: InsertJob, _ctx: &mut SyncContext<Self>) -> Self::Result {
        let job = msg.fields;
        self.with_connection(|connection| {
            let inserted = connection
                .execute(
                    query::INSERT_JOB,
                    params![
                        job.title,
                        job.description,
                        job.email,
                        job.kind(),
                        job.category(),
                        job.location()
                    ],
                )
                .map_err(query_error)?;

            if inserted == 0 {
                return Err(JobStoreError::NothingInserted {});
            }

            Ok(connection.last_insert_rowid())
        })
    }
}

#[derive(Message)]
#[rtype(result = "Result<(), JobStoreError>")]
pub struct UpdateJob {
    pub id: i64,
    pub fields: JobFields,
}

impl Handler<UpdateJob> for Database {
    type Result = Result<(), JobStoreError>;

    fn handle(&mut self, msg: UpdateJob, _ctx: &mut SyncContext<Self>) -> Self::Result {
        let UpdateJob { id, fields: job } = msg;
        self.with_connection(|connection| {
            let updated = connection
                .execute(
                    query::UPDATE_JOB,
                    params![
                        id,
                        job.title,
                        job.description,
                        job.email,
                        job.kind(),
                        job.category(),
                        job.location()
                    ],
                )
                .map_err(query_error)?;

            match updated {
                0 => Err(JobStoreError::NotFound { id }),
                _ => Ok(()),
            }
        })
    }
}

#[derive(Message)]
#[rtype(result = "Result<(), JobStoreError>")]
pub struct DeleteJob {
    pub id: i64,
}

impl Handler<DeleteJob> for Database {
    type Result = Result<(), JobStoreError>;

    fn handle(&mut self, msg: DeleteJob, _ctx: &mut SyncContext<Self>) -> Self::Result {
        let id = msg.id;
        self.with_connection(|connection| {
            let deleted = connection
                .execute(query::DELETE_JOB, params![id])
                .map_err(query_error)?;

            match deleted {
                0 => Err(JobStoreError::NotFound { id }),
                _ => Ok(()),
            }
        })
    }
}

#[derive(Message)]
#[rtype(result = "Result<User, JobStoreError>")]
pub struct FindUser {
    pub username: String,
}

impl Handler<FindUser> for Database {
    type Result = Result<User, JobStoreError>;

    fn handle(&mut self, msg: FindUser, _ctx: &mut SyncContext<Self>) -> Self::Result {
        let username = msg.username;
        self.with_connection(|connection| {
            connection
                .query_row(query::GET_USER_BY_USERNAME, params![username], |row| {
                    Ok(User {
                        username: row.get(0)?,
                        password: row.get(1)?,
                    })
                })
                .optional()
                .map_err(query_error)?
                .ok_or_else(|| JobStoreError::UnknownUser {
                    username: username.clone(),
                })
        })
    }
}

#[derive(Message)]
#[rtype(result = "Result<(), JobStoreError>")]
pub struct InsertUser {
    pub user: User,
}

impl Handler<InsertUser> for Database {
    type Result = Result<(), JobStoreError>;

    fn handle(&mut self, msg: InsertUser, _ctx: &mut SyncContext<Self>) -> Self::Result {
        let user = msg.user;
        self.with_connection(|connection| {
            let result = connection.execute(
                query::INSERT_USER,
                params![user.username, user.password],
            );

            match result {
                Ok(0) => Err(JobStoreError::NothingInserted {}),
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(failure, _))
                    if failure.code == ErrorCode::ConstraintViolation =>
                {
                    Err(JobStoreError::UsernameTaken {
                        username: user.username.clone(),
                    })
                }
                Err(err) => Err(query_error(err)),
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn temp_database(policy: PoolPolicy, idle: &Arc<AtomicUsize>) -> Database {
        let path = std::env::temp_dir().join(format!("jobstore-pool-{}.db", nanoid::nanoid!()));

        Database::new(
            path.to_string_lossy().into_owned(),
            policy,
            idle.clone(),
            Arc::new(Mutex::new(false)),
        )
    }

    #[test]
    fn test_default_policy() {
        let policy = PoolPolicy::default();

        assert_eq!(policy.max_idle, 5);
        assert_eq!(policy.max_open, 10);
        assert_eq!(policy.max_idle_time(), Duration::from_secs(1));
        assert_eq!(policy.max_lifetime(), Duration::from_secs(30));
        assert_eq!(policy.query_timeout(), Duration::from_secs(5));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_rejects_idle_above_open() {
        let policy = PoolPolicy {
            max_idle: 11,
            ..PoolPolicy::default()
        };

        assert!(matches!(
            policy.validate(),
            Err(JobStoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_connection_is_parked_until_idle_budget_is_full() {
        let policy = PoolPolicy {
            max_idle: 1,
            max_idle_time_secs: 60,
            ..PoolPolicy::default()
        };
        let idle = Arc::new(AtomicUsize::new(0));
        let mut first = temp_database(policy.clone(), &idle);
        let mut second = temp_database(policy, &idle);

        first.with_connection(|_| Ok(())).unwrap();
        assert!(first.slot.is_some());
        assert_eq!(idle.load(Ordering::SeqCst), 1);

        second.with_connection(|_| Ok(())).unwrap();
        assert!(second.slot.is_none());
        assert_eq!(idle.load(Ordering::SeqCst), 1);

        let parked = first.checkout().unwrap();
        assert_eq!(idle.load(Ordering::SeqCst), 0);
        first.checkin(parked);
        assert_eq!(idle.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expired_connection_is_not_parked() {
        let policy = PoolPolicy {
            max_lifetime_secs: 0,
            ..PoolPolicy::default()
        };
        let idle = Arc::new(AtomicUsize::new(0));
        let mut database = temp_database(policy, &idle);

        database.with_connection(|_| Ok(())).unwrap();

        assert!(database.slot.is_none());
        assert_eq!(idle.load(Ordering::SeqCst), 0);
    }

    fn mark(database: &mut Database) {
        database
            .with_connection(|connection| {
                connection
                    .execute_batch("CREATE TEMP TABLE marker (id INTEGER)")
                    .map_err(query_error)
            })
            .unwrap();
    }

    fn has_marker(slot: &Slot) -> bool {
        slot.connection.prepare("SELECT id FROM marker").is_ok()
    }

    #[test]
    fn test_fresh_idle_connection_is_reused() {
        let policy = PoolPolicy {
            max_idle_time_secs: 60,
            ..PoolPolicy::default()
        };
        let idle = Arc::new(AtomicUsize::new(0));
        let mut database = temp_database(policy, &idle);

        mark(&mut database);
        let slot = database.checkout().unwrap();

        assert!(has_marker(&slot));
        assert_eq!(idle.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_idle_connection_is_recycled_at_checkout() {
        let policy = PoolPolicy {
            max_idle_time_secs: 0,
            ..PoolPolicy::default()
        };
        let idle = Arc::new(AtomicUsize::new(0));
        let mut database = temp_database(policy, &idle);

        mark(&mut database);
        assert!(database.slot.is_some());
        assert_eq!(idle.load(Ordering::SeqCst), 1);

        let slot = database.checkout().unwrap();
        assert!(!has_marker(&slot));
        assert!(database.slot.is_none());
        assert_eq!(idle.load(Ordering::SeqCst), 0);

        database.checkin(slot);
        assert_eq!(idle.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unreachable_database_fails_with_connect_error() {
        let idle = Arc::new(AtomicUsize::new(0));
        let mut database = Database::new(
            "/nonexistent/jobstore/jobs.db".to_owned(),
            PoolPolicy::default(),
            idle,
            Arc::new(Mutex::new(false)),
        );

        let result = database.with_connection(|_| Ok(()));

        assert!(matches!(result, Err(JobStoreError::Connect { .. })));
    }
}
