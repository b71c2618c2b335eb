use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionsError {
    #[error("invalid owner id '{0}': must be a UUID")]
    InvalidOwner(String),

    #[error("invalid action id '{0}': must be a UUID")]
    InvalidActionId(String),

    #[error("unknown status '{0}'")]
    InvalidStatus(String),

    #[error("the status query parameter only supports single values")]
    MultipleStatusValues,

    #[error("unable to parse timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("datetime query parameters only support start and end values")]
    MalformedRange,

    #[error("only a single query parameter is supported")]
    ConflictingFilters,

    #[error("action details are required")]
    MissingDetails,

    #[error("action {0} is already completed")]
    AlreadyCompleted(uuid::Uuid),

    #[error("stored record does not match the action schema: {0}")]
    Decode(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ActionsError {
    /// True for errors raised at the input boundary, before any store access.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidOwner(_)
                | Self::InvalidActionId(_)
                | Self::InvalidStatus(_)
                | Self::MultipleStatusValues
                | Self::InvalidTimestamp(_)
                | Self::MalformedRange
                | Self::ConflictingFilters
                | Self::MissingDetails
        )
    }
}

pub type Result<T> = std::result::Result<T, ActionsError>;
