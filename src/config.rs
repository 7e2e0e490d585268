use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::auth::MAX_SESSION_HOURS;
use crate::database::PoolPolicy;
use crate::errors::JobStoreError;
use crate::job::RequiredFields;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DATABASE_DIR: &str = "~/.jobstore";
const DATABASE_FILE: &str = "jobstore.db";

/// Contents of the `.jobstorerc` TOML file. Everything is optional, command
/// line arguments take precedence.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigFile {
    pub port: Option<u16>,
    pub database: Option<String>,
    pub secret: Option<String>,
    pub pool: PoolPolicy,
    pub jobs: JobsConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct JobsConfig {
    pub required_fields: RequiredFields,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub bcrypt_cost: u32,
    pub session_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: bcrypt::DEFAULT_COST,
            session_hours: 24,
        }
    }
}

impl ConfigFile {
    /// Reads the file at `path`. A missing file is only an error when the
    /// user pointed at it explicitly.
    pub fn read(path: &str, explicit: bool) -> Result<Self, JobStoreError> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(err) if err.kind() == ErrorKind::NotFound && !explicit => {
                debug!("No configuration file at {}, using defaults", path);
                Ok(Self::default())
            }
            Err(err) => Err(JobStoreError::ReadConfigFile { source: err }),
        }
    }

    pub fn parse(contents: &str) -> Result<Self, JobStoreError> {
        let config: ConfigFile =
            toml::from_str(contents).map_err(|err| JobStoreError::ParseConfigFile { source: err })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), JobStoreError> {
        self.pool.validate()?;

        if self.auth.bcrypt_cost < 4 || self.auth.bcrypt_cost > 31 {
            return Err(JobStoreError::InvalidConfig {
                reason: "auth.bcrypt_cost must be between 4 and 31".to_owned(),
            });
        }

        if self.auth.session_hours < 1 || self.auth.session_hours > MAX_SESSION_HOURS {
            return Err(JobStoreError::InvalidConfig {
                reason: format!(
                    "auth.session_hours must be between 1 and {}",
                    MAX_SESSION_HOURS
                ),
            });
        }

        Ok(())
    }
}

/// Request-independent state shared by every handler.
#[derive(Debug, Clone)]
pub struct Context {
    pub secret: String,
    pub required_fields: RequiredFields,
    pub bcrypt_cost: u32,
    pub session_hours: i64,
}

impl Context {
    pub fn new(secret: String, config: &ConfigFile) -> Self {
        Self {
            secret,
            required_fields: config.jobs.required_fields,
            bcrypt_cost: config.auth.bcrypt_cost,
            session_hours: config.auth.session_hours,
        }
    }
}

/// Path of the SQLite file inside the database directory.
pub fn database_file(dir: &str) -> String {
    let dir = shellexpand::tilde(dir).into_owned();

    Path::new(&dir)
        .join(DATABASE_FILE)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ConfigFile::parse("").unwrap();

        assert_eq!(config.port, None);
        assert_eq!(config.pool, PoolPolicy::default());
        assert_eq!(config.jobs.required_fields, RequiredFields::Extended);
        assert_eq!(config.auth.session_hours, 24);
    }

    #[test]
    fn test_parses_every_section() {
        let config = ConfigFile::parse(
            r#"
            port = 9000
            database = "/var/lib/jobstore"
            secret = "shh"

            [pool]
            max_idle = 2
            max_open = 4
            query_timeout_secs = 2

            [jobs]
            required_fields = "core"

            [auth]
            bcrypt_cost = 6
            "#,
        )
        .unwrap();

        assert_eq!(config.port, Some(9000));
        assert_eq!(config.database.as_deref(), Some("/var/lib/jobstore"));
        assert_eq!(config.secret.as_deref(), Some("shh"));
        assert_eq!(config.pool.max_idle, 2);
        assert_eq!(config.pool.max_open, 4);
        assert_eq!(config.pool.max_lifetime_secs, 30);
        assert_eq!(config.jobs.required_fields, RequiredFields::Core);
        assert_eq!(config.auth.bcrypt_cost, 6);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            ConfigFile::parse("[pool]\nmax_open = 0"),
            Err(JobStoreError::InvalidConfig { .. })
        ));
        assert!(matches!(
            ConfigFile::parse("[auth]\nbcrypt_cost = 2"),
            Err(JobStoreError::InvalidConfig { .. })
        ));
        assert!(matches!(
            ConfigFile::parse("[auth]\nsession_hours = 0"),
            Err(JobStoreError::InvalidConfig { .. })
        ));
        assert!(matches!(
            ConfigFile::parse("[auth]\nsession_hours = 10000000000"),
            Err(JobStoreError::InvalidConfig { .. })
        ));
        assert!(matches!(
            ConfigFile::parse("port = \"eighty\""),
            Err(JobStoreError::ParseConfigFile { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let path = "/nonexistent/.jobstorerc";

        assert!(ConfigFile::read(path, false).is_ok());
        assert!(matches!(
            ConfigFile::read(path, true),
            Err(JobStoreError::ReadConfigFile { .. })
        ));
    }

    #[test]
    fn test_database_file() {
        assert_eq!(database_file("/tmp/jobs"), "/tmp/jobs/jobstore.db");
    }
}
