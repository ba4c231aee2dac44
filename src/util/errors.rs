use std::io;
use thiserror::Error;

// SQLSTATE codes returned when the superuser password was rotated under us
const INVALID_PASSWORD: &str = "28P01";
const INVALID_AUTHORIZATION: &str = "28000";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("NotFound: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The update was rejected because another pod holds the primary role.
    #[error("NotPrimary: {0}")]
    NotPrimary(String),

    #[error("MetadataMissing: {0}")]
    MetadataMissing(String),

    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),

    #[error("DecodingError: {0}")]
    DecodingError(String),

    #[error("DatabaseError: {0}")]
    DatabaseError(#[source] sqlx::Error),

    #[error("ConfigError: {0}")]
    ConfigError(String),

    #[error("MetricsError: {0}")]
    MetricsError(#[source] prometheus::Error),
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::KubeError(_) => "kube",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::NotPrimary(_) => "not_primary",
            Error::MetadataMissing(_) => "metadata_missing",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::DecodingError(_) => "decoding",
            Error::DatabaseError(_) => "database",
            Error::ConfigError(_) => "config",
            Error::MetricsError(_) => "metrics",
        }
        .to_string()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_not_primary(&self) -> bool {
        matches!(self, Error::NotPrimary(_))
    }

    /// Whether the database could not be reached or refused our credentials.
    ///
    /// The pool retries refused connections until its acquire timeout, so a
    /// pool timeout is reported in the same class.
    pub fn is_connection_refused(&self) -> bool {
        match self {
            Error::DatabaseError(sqlx::Error::Io(e)) => e.kind() == io::ErrorKind::ConnectionRefused,
            Error::DatabaseError(sqlx::Error::PoolTimedOut) => true,
            Error::DatabaseError(sqlx::Error::Database(e)) => {
                matches!(e.code().as_deref(), Some(INVALID_PASSWORD) | Some(INVALID_AUTHORIZATION))
            }
            _ => false,
        }
    }
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(resp) if resp.code == 404 => Error::NotFound(resp.message),
            kube::Error::Api(resp) if resp.code == 409 => Error::Conflict(resp.message),
            e => Error::KubeError(e),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::DatabaseError(e)
    }
}

impl From<prometheus::Error> for Error {
    fn from(e: prometheus::Error) -> Self {
        Error::MetricsError(e)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
