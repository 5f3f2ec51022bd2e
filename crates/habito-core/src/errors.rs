/// Core error type.
///
/// Adapter crates map their specific failures into this type so the router
/// can render a user-facing message per kind.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("habit name is empty")]
    EmptyName,

    #[error("duplicate habit: {name}")]
    DuplicateName { name: String },

    #[error("plan limit reached ({limit} habits)")]
    LimitReached { limit: usize },

    #[error("no habit matches selector: {selector}")]
    NotFound { selector: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Domain failures are expected and map to a specific user-facing reply;
    /// everything else means the operation itself broke.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Error::EmptyName
                | Error::DuplicateName { .. }
                | Error::LimitReached { .. }
                | Error::NotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
