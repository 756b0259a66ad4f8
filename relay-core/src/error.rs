//! Error types for Relay.

use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error carrying an HTTP status code, surfaced verbatim by the
/// built-in error return handler (see `relay_std::ErrorReturnHandler`).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HttpError {
    /// The status code transports should report for this error.
    pub status: u16,
    /// Human-readable message placed in the `message` field of the JSON body.
    pub message: String,
    /// The underlying cause, if any.
    #[source]
    pub cause: Option<BoxError>,
}

impl HttpError {
    /// Build an `HttpError` with an explicit status and message.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach a source error.
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// `404 Not Found`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    /// `400 Bad Request`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    /// `401 Unauthorized`.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, message)
    }

    /// `500 Internal Server Error`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }
}

/// Errors raised while building the dependency container or resolving a
/// component from it (§4.1).
#[derive(Debug, Error)]
pub enum ContainerError {
    /// A constructor was registered whose signature doesn't satisfy the
    /// single-return-value contract. Rust's type system rejects this at
    /// compile time for the typed path; this variant exists for the
    /// dynamic/erased registration path.
    #[error("constructor for {type_name} must produce exactly one value")]
    InvalidConstructor {
        /// The offending component type's name.
        type_name: &'static str,
    },

    /// No constructor is registered for the requested type.
    #[error("no constructor registered for {type_name}")]
    NoConstructor {
        /// The component type that could not be resolved.
        type_name: &'static str,
    },

    /// The type is already on the current resolution path (cycle).
    #[error("cyclic dependency detected while resolving {type_name}")]
    Cycle {
        /// The component type where the cycle was detected.
        type_name: &'static str,
    },
}

/// Errors raised while registering routes or matching an incoming request
/// against the route table (§4.2).
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Two registered patterns for the same method could match the same
    /// incoming path. Fatal at boot.
    #[error("ambiguous route: {new} conflicts with already-registered {existing} for method {method}")]
    Ambiguous {
        /// The HTTP method shared by both patterns.
        method: String,
        /// The pattern being registered.
        new: String,
        /// The pattern it conflicts with.
        existing: String,
    },

    /// No registered route matches the incoming (method, path).
    #[error("no route matches {method} {path}")]
    NotFound {
        /// The request method.
        method: String,
        /// The request path.
        path: String,
    },

    /// A `GlobalPrefix` violates the §4.8 constraints.
    #[error("invalid global prefix {prefix:?}: {reason}")]
    InvalidPrefix {
        /// The offending prefix string.
        prefix: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// The top-level error produced by one pipeline invocation (§4.6/§7).
///
/// Every other error type in this crate converges on `RelayError` at the
/// pipeline boundary so response mapping has a single uniform shape to work
/// with: an HTTP-ish status plus a message, or "not handled" (routing miss).
#[derive(Debug, Error)]
pub enum RelayError {
    /// Carries an explicit status + message (`HttpError`, or a handler that
    /// returned one directly).
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The router found no matching handler.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// The container failed to resolve a constructor or controller.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// Argument extraction failed for a declared parameter.
    #[error("failed to resolve argument {index} ({type_name}): {source}")]
    Resolution {
        /// 0-based index of the offending parameter.
        index: usize,
        /// The parameter's declared type name.
        type_name: &'static str,
        /// The underlying resolver error.
        #[source]
        source: BoxError,
    },

    /// No `ArgumentResolver` claimed a declared parameter.
    #[error("no ArgumentResolver registered for parameter {index} ({type_name})")]
    NoResolver {
        /// 0-based index of the unresolved parameter.
        index: usize,
        /// The parameter's declared type name.
        type_name: &'static str,
    },

    /// No `ReturnValueHandler` claimed a non-nil return value.
    #[error("no ReturnValueHandler registered for return value of type {type_name}")]
    NoReturnHandler {
        /// The concrete return-value type name.
        type_name: &'static str,
    },

    /// Any other error surfaced by handler logic, mapped to 500.
    #[error(transparent)]
    Other(#[from] BoxError),
}

impl RelayError {
    /// The status code transports should report for this error.
    pub fn status(&self) -> u16 {
        match self {
            RelayError::Http(e) => e.status,
            RelayError::Routing(RoutingError::NotFound { .. }) => 404,
            RelayError::Routing(_) => 500,
            RelayError::Container(_) => 500,
            RelayError::Resolution { .. } => 400,
            RelayError::NoResolver { .. } => 500,
            RelayError::NoReturnHandler { .. } => 500,
            RelayError::Other(_) => 500,
        }
    }

    /// The message placed in the uniform `{"message": ...}` error body.
    pub fn message(&self) -> String {
        self.to_string()
    }
}
