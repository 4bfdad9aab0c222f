//! Unified error types.

/// The error type returned by arbor's fallible operations.
///
/// Application-level errors (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: binding to a port or accepting a connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A route pattern the trie refuses to register.
///
/// Routes are registered once at startup, so [`Router`](crate::Router) turns
/// every `RouteError` into a panic carrying this message.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum RouteError {
    #[error("routing pattern must begin with '/' in `{0}`")]
    MissingLeadingSlash(String),

    #[error("route param closing delimiter '}}' is missing in `{0}`")]
    UnclosedParam(String),

    #[error("route param name is empty in `{0}`")]
    EmptyParamName(String),

    #[error("wildcard '*' must be the last value in route `{0}`")]
    WildcardNotLast(String),

    #[error("invalid regexp `{regex}` in route `{pattern}`: {reason}")]
    InvalidRegex { pattern: String, regex: String, reason: String },

    #[error("route param `{key}` is used twice in `{pattern}`")]
    DuplicateParam { pattern: String, key: String },

    #[error("route `{method} {pattern}` is already registered")]
    Duplicate { method: String, pattern: String },
}
