use crate::util::errors::{Error, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::fmt;

pub const DEFAULT_DATABASE: &str = "postgres";
pub const DEFAULT_PORT: u16 = 5432;
// The sidecar shares the pod network namespace with postgres
pub const LOCAL_HOST: &str = "localhost";

/// Name of the secret CNPG generates with the superuser credentials.
///
/// The superuser is needed because `pg_stat_activity` only shows an ordinary
/// role its own sessions.
pub fn superuser_secret_name(cluster_name: &str) -> String {
    format!("{}-superuser", cluster_name)
}

/// Connection information for the local PostgreSQL instance
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl Credentials {
    pub fn from_secret(secret: &Secret) -> Result<Self> {
        let name = secret.name_any();
        let data = secret
            .data
            .as_ref()
            .ok_or_else(|| Error::MetadataMissing(format!("secret {} has no data", name)))?;

        let value = |key: &str| -> Result<Option<String>> {
            data.get(key)
                .map(|bytes| {
                    String::from_utf8(bytes.0.clone())
                        .map_err(|_| Error::DecodingError(format!("invalid UTF-8 in {} of secret {}", key, name)))
                })
                .transpose()
        };
        let required = |key: &str| -> Result<String> {
            value(key)?
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::MetadataMissing(format!("{} not found in secret {}", key, name)))
        };

        let username = required("username")?;
        let password = required("password")?;
        let database = match value("dbname")? {
            Some(db) if !db.is_empty() && db != "*" => db,
            _ => DEFAULT_DATABASE.to_string(),
        };
        let port = match value("port")? {
            Some(port) => port
                .trim()
                .parse::<u16>()
                .map_err(|e| Error::InvalidArgument(format!("invalid port {:?} in secret {}: {}", port, name, e)))?,
            None => DEFAULT_PORT,
        };

        Ok(Credentials {
            username,
            password,
            database,
            host: LOCAL_HOST.to_string(),
            port,
        })
    }

    /// Keyword/value connection string, TLS required, as psql and libpq take it.
    pub fn conn_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode=require",
            quote(&self.host),
            self.port,
            quote(&self.username),
            quote(&self.password),
            quote(&self.database)
        )
    }
}

// libpq quoting: single quotes around values that are empty or contain
// whitespace, with backslash escapes for quotes and backslashes
fn quote(value: &str) -> String {
    if !value.is_empty() && !value.chars().any(|c| c.is_whitespace() || c == '\'' || c == '\\') {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}
