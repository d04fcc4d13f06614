use thiserror::Error;

// === AuthError ===

/// Errors reported by the session store or the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The identity provider refused the sign-in.
    #[error("Sign-in rejected: {0}")]
    ProviderRejected(String),
    /// The auth server answered with an error; the message is shown as-is.
    #[error("{0}")]
    Store(String),
    /// The provider redirect did not carry a usable session.
    #[error("Invalid sign-in callback: {0}")]
    InvalidCallback(String),
    /// Reading or writing the locally persisted session failed.
    #[error("Session storage error: {0}")]
    Storage(String),
    /// The auth server could not be reached.
    #[error("Authentication network error: {0}")]
    Network(String),
    /// The system browser could not be opened on the provider page.
    #[error("Could not open the sign-in page: {0}")]
    BrowserLaunch(String),
}

impl AuthError {
    /// True for failures worth retrying: the auth server was not reached or
    /// answered with a server-side error. Everything else is a definite answer.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }
}

// === ValidationError ===

/// Malformed local input, caught before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The operation needs an active session.
    #[error("You must be signed in to do that")]
    NotSignedIn,
    /// The title was empty after trimming.
    #[error("Bookmark title cannot be empty")]
    EmptyTitle,
    /// The address is not an absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

// === PersistenceError ===

/// Errors from the record service, whether the server rejected the request
/// or the request never made it there.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// The server rejected the request. `message` is the server-provided text.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    /// Transport-level failure (connection, TLS, timeout).
    #[error("Network error: {0}")]
    Network(String),
    /// The response body did not match the expected shape.
    #[error("Unexpected response from server: {0}")]
    Decode(String),
    /// The local storage engine failed.
    #[error("Storage error: {0}")]
    Storage(String),
    /// No access token is available for the request.
    #[error("Not signed in")]
    Unauthenticated,
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        PersistenceError::Storage(err.to_string())
    }
}

impl From<AuthError> for PersistenceError {
    /// A request could not get credentials. Transport failures stay
    /// transport failures; anything else means there is no usable session.
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Network(message) => PersistenceError::Network(message),
            AuthError::Storage(message) => PersistenceError::Storage(message),
            _ => PersistenceError::Unauthenticated,
        }
    }
}

impl From<reqwest::Error> for PersistenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PersistenceError::Decode(err.to_string())
        } else {
            PersistenceError::Network(err.to_string())
        }
    }
}

// === SyncError ===

/// Any error surfaced by the sync controller. Its `Display` output is the
/// text stored in the controller's last-error slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    #[error("Settings I/O error: {0}")]
    IoError(String),
    /// Failed to serialize or deserialize settings.
    #[error("Settings serialization error: {0}")]
    SerializationError(String),
    /// The provided settings key is invalid.
    #[error("Invalid settings key: {0}")]
    InvalidKey(String),
    /// The provided settings value is invalid.
    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
}
