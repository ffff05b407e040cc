//! warden-core's own error type.
use std::path::PathBuf;

/// Errors raised by the supervision engine.
///
/// Most of the engine's operations never produce one of these: a disallowed
/// call from the wrong state is a silent no-op (see the guards in
/// [`crate::state`]), and background task failures are logged and absorbed
/// rather than propagated. This enum only covers the "or-raise" guard
/// variants and the handful of genuinely fallible setup operations (command
/// templating, log sink creation).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An "or-raise" guard rejected a call because the entity wasn't in one
    /// of the allowed states.
    #[error("{entity} is in state {state}, which doesn't allow this operation")]
    BadState { entity: String, state: String },

    /// Control-plane only: operation referred to a name that doesn't exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Control-plane only: operation tried to create something that already exists.
    #[error("{0} already exists")]
    Conflict(String),

    /// Control-plane only: a request body was missing a required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The OS refused to spawn the configured program.
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    /// Command templating failed, e.g. an unresolvable handlebars expression.
    #[error("failed to render command template: {0}")]
    Templating(String),

    #[error("I/O error at path {0:?} while {1}: {2}")]
    IoPath(PathBuf, &'static str, #[source] std::io::Error),

    #[error("I/O error while {0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("unexpected I/O error")]
    RawIo(#[from] std::io::Error),

    #[error("error while reading configuration:\n{0}")]
    ConfigDeserialization(String),
}

impl Error {
    pub fn bad_state(entity: impl Into<String>, state: impl std::fmt::Debug) -> Self {
        Error::BadState {
            entity: entity.into(),
            state: format!("{state:?}"),
        }
    }
}
