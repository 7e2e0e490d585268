use actix::dev::ToEnvelope;
use actix::prelude::*;
use std::path::Path;
use std::time::Duration;

use crate::auth::User;
use crate::database::{self, Database, PoolPolicy};
use crate::errors::JobStoreError;
use crate::job::{Job, JobFields, RequiredFields};

/// Handle to the job listing database. Cloning it is cheap, every clone talks
/// to the same connection pool.
#[derive(Clone)]
pub struct JobStore {
    database: Addr<Database>,
    deadline: Duration,
}

impl JobStore {
    /// Starts the connection pool and probes the database once. An
    /// unreachable database is logged and the store is returned anyway, its
    /// operations fail until the database becomes reachable.
    pub async fn connect(path: &str, policy: PoolPolicy) -> Self {
        if let Some(dir) = Path::new(path).parent() {
            if let Err(err) = std::fs::create_dir_all(dir) {
                warn!("Failed to create database directory {:?}: {}", dir, err);
            }
        }

        let store = Self {
            deadline: policy.query_timeout(),
            database: Database::start(path, policy),
        };

        match store.ping().await {
            Ok(()) => info!("Database at {} is reachable", path),
            Err(err) => warn!("Unable to reach database at {}: {}", path, err),
        }

        store
    }

    async fn call<M, T>(&self, msg: M) -> Result<T, JobStoreError>
    where
        M: Message<Result = Result<T, JobStoreError>> + Send + 'static,
        T: Send + 'static,
        Database: Handler<M>,
        <Database as Actor>::Context: ToEnvelope<Database, M>,
    {
        match self.database.send(msg).timeout(self.deadline).await {
            Ok(result) => result,
            Err(MailboxError::Timeout) => Err(JobStoreError::Timeout {
                after: self.deadline,
            }),
            Err(MailboxError::Closed) => Err(JobStoreError::Unavailable {}),
        }
    }

    pub async fn ping(&self) -> Result<(), JobStoreError> {
        self.call(database::Ping).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>, JobStoreError> {
        self.call(database::ListJobs).await
    }

    pub async fn get_one_job(&self, id: i64) -> Result<Job, JobStoreError> {
        self.call(database::GetJob { id }).await
    }

    /// Inserts a new listing and returns its id.
    pub async fn create_job_listing(&self, job: &JobFields) -> Result<i64, JobStoreError> {
        job.validate(RequiredFields::Core)?;

        self.call(database::InsertJob {
            fields: job.clone(),
        })
        .await
    }

    /// Overwrites every writable field of listing `id`.
    pub async fn edit_a_job_listing(&self, job: &JobFields, id: i64) -> Result<(), JobStoreError> {
        job.validate(RequiredFields::Core)?;

        self.call(database::UpdateJob {
            id,
            fields: job.clone(),
        })
        .await
    }

    pub async fn delete_a_job_listing(&self, id: i64) -> Result<(), JobStoreError> {
        self.call(database::DeleteJob { id }).await
    }

    pub async fn find_user(&self, username: &str) -> Result<User, JobStoreError> {
        self.call(database::FindUser {
            username: username.to_owned(),
        })
        .await
    }

    /// Stores a user whose password is already hashed.
    pub async fn create_user(&self, user: User) -> Result<(), JobStoreError> {
        self.call(database::InsertUser { user }).await
    }
}
