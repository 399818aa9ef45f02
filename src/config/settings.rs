//! Database endpoint settings.

use sqlx::postgres::PgConnectOptions;

use crate::core::{MalaError, Result};

const DEFAULT_HOST: &str = "/var/run/postgresql";
const DEFAULT_PORT: u16 = 5432;
const DEFAULT_NAME: &str = "mala";
const DEFAULT_USER: &str = "mala_user";

/// PostgreSQL connection settings.
///
/// Defaults target a local socket-mounted server; every field is
/// overridable through `MALA_DB_*` environment variables. The password has
/// no default and must come from `MALA_DB_PASS`.
#[derive(Debug, Clone)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl DbSettings {
    pub fn from_env() -> Result<Self> {
        let password = std::env::var("MALA_DB_PASS")
            .map_err(|_| MalaError::Config("MALA_DB_PASS is not set".into()))?;
        let port = match std::env::var("MALA_DB_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| MalaError::Config(format!("Bad MALA_DB_PORT: {raw}")))?,
            Err(_) => DEFAULT_PORT,
        };
        Ok(Self {
            host: std::env::var("MALA_DB_HOST").unwrap_or_else(|_| DEFAULT_HOST.into()),
            port,
            dbname: std::env::var("MALA_DB_NAME").unwrap_or_else(|_| DEFAULT_NAME.into()),
            user: std::env::var("MALA_DB_USER").unwrap_or_else(|_| DEFAULT_USER.into()),
            password,
        })
    }

    /// Connection options for one dedicated worker connection.
    ///
    /// A host starting with '/' is a Unix socket directory.
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.dbname);
        if self.host.starts_with('/') {
            options.socket(&self.host)
        } else {
            options.host(&self.host)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_unset_fields() {
        // Construct directly; from_env is exercised end to end by the binary.
        let settings = DbSettings {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            dbname: DEFAULT_NAME.into(),
            user: DEFAULT_USER.into(),
            password: "hunter2".into(),
        };
        assert_eq!(settings.dbname, "mala");
        assert!(settings.host.starts_with('/'));
    }
}
