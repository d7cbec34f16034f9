//! Error taxonomy shared by the importer, the query layer, and the server.
//!
//! | Variant | Raised when | Handling |
//! |---------|-------------|----------|
//! | [`Error::Config`] | base path missing, bad settings | fatal, CLI exits nonzero |
//! | [`Error::NotFound`] | network/channel directory or log file absent | unit skipped / HTTP 404 |
//! | [`Error::Decode`] | a log file cannot be read | file skipped |
//! | [`Error::Persistence`] | a database statement fails | batch abandoned / HTTP 500 |
//! | [`Error::Validation`] | required parameter missing or malformed | HTTP 400 |
//! | [`Error::Unauthorized`] | no or expired session | HTTP 401 |

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to read {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("{0}")]
    Validation(String),

    #[error("not authenticated")]
    Unauthorized,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }
}
