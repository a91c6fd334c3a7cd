//! Error types
//!
//! Definition problems surface while a model loads; everything else is a
//! call-time error naming the resource type and operation involved.
//! Collaborator (client) failures pass through untouched.

/// Crate-wide result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the resource engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or inconsistent static definition.
    #[error("invalid definition for {resource} at `{field}': {message}")]
    Definition {
        resource: String,
        field: String,
        message: String,
    },

    #[error("resource type `{0}' not defined")]
    UnknownResource(String),

    #[error("operation `{operation}' not defined on {resource}")]
    UnknownOperation { resource: String, operation: String },

    #[error("data attribute `{attribute}' not defined on {resource}")]
    UnknownAttribute { resource: String, attribute: String },

    #[error("{resource}#{operation} requires argument `{argument}'")]
    MissingArgument {
        resource: String,
        operation: String,
        argument: String,
    },

    #[error("{resource} is missing identifier `{identifier}'")]
    MissingIdentifier { resource: String, identifier: String },

    #[error("{resource} does not declare identifier `{identifier}'")]
    UnexpectedIdentifier { resource: String, identifier: String },

    /// A data attribute was read before any successful load.
    #[error("{resource}: `{attribute}' read before the resource was loaded")]
    NotLoaded { resource: String, attribute: String },

    #[error("{resource}#{waiter} entered a failure state on attempt {attempt}")]
    WaiterFailed {
        resource: String,
        waiter: String,
        attempt: u32,
    },

    #[error("{resource}#{waiter} gave up after {attempts} attempts")]
    WaiterTimeout {
        resource: String,
        waiter: String,
        attempts: u32,
    },

    #[error("{resource}#{operation}: unexpected response: {message}")]
    MalformedResponse {
        resource: String,
        operation: String,
        message: String,
    },

    #[error("{resource}#{operation}: batch items disagree on `{target}'")]
    BatchConflict {
        resource: String,
        operation: String,
        target: String,
    },

    /// A batch was handed an instance of another resource type.
    #[error("{expected}#{operation} batch given a {found} instance")]
    ResourceMismatch {
        operation: String,
        expected: String,
        found: String,
    },

    #[error("service `{0}' is already registered")]
    DuplicateService(String),

    /// Error returned by the client collaborator, unchanged.
    #[error(transparent)]
    Client(anyhow::Error),
}

impl Error {
    pub(crate) fn definition(
        resource: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Definition {
            resource: resource.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Borrow the collaborator error, if this is one
    pub fn client_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Client(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_definition(&self) -> bool {
        matches!(self, Self::Definition { .. })
    }
}
