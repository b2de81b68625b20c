use thiserror::Error;

/// Failures surfaced by the Rémi cloud client.
#[derive(Error, Debug)]
pub enum RemiError {
    /// The login endpoint rejected the credentials, or returned
    /// something other than a session.
    #[error("login failed: {0}")]
    Auth(String),

    /// A required entry is missing from the face table.
    #[error("{0}")]
    Precondition(String),

    /// Any non-200 response from a generic read or write.
    #[error("request {path} status {status}: {message}")]
    Api {
        path: String,
        status: u16,
        message: String,
    },

    /// Writing the enabled flag of a server-side event failed.
    #[error("failed to toggle event {setting_id}: {reason}")]
    Toggle { setting_id: String, reason: String },

    #[error("not logged in; call login() first")]
    NotLoggedIn,

    #[error("transport: {0:#}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Json(String),
}

impl RemiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
