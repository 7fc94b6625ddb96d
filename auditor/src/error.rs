//! Error types and result definitions for audit operations.
//!
//! Provides an error system with classification, aggregation, and captured
//! callsite metadata. The [`AuditError`] type supports single errors, errors
//! with additional detail, and multiple aggregated errors from concurrent
//! range checks.

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for audit operations using [`AuditError`] as the error type.
pub type AuditResult<T> = Result<T, AuditError>;

/// Detailed payload stored for single [`AuditError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
}

/// Main error type for audit operations.
///
/// [`AuditError`] can represent a single classified error or multiple
/// aggregated errors, which is how failures from concurrent range workers are
/// surfaced together.
#[derive(Debug, Clone)]
pub struct AuditError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding the classification and metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors, mainly from parallel worker failures.
    Many {
        errors: Vec<AuditError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur during an audit run.
///
/// The taxonomy matters for control flow: connection failures are fatal to the
/// run, query failures downgrade only their branch, and timeouts are retried
/// once before escalation.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection errors, fatal to the whole run when raised at connect time.
    PrimaryConnectionFailed,
    ReplicaConnectionFailed,
    ConnectionLost,

    // Query errors, fatal only for the branch that raised them.
    QueryFailed,
    QueryTimeout,
    SchemaError,
    AuthenticationFailed,

    // Configuration and validation errors.
    ConfigError,
    InvalidKeyRange,

    // IO and encryption errors.
    IoError,
    EncryptionError,

    // Worker lifecycle errors.
    WorkerPanic,

    // Unknown / uncategorized.
    Unknown,
}

impl AuditError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] if the list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the
    /// modified instance.
    ///
    /// Has no effect on aggregated errors because aggregates forward the first
    /// contained error as their source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Creates an [`AuditError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        let location = Location::caller();

        AuditError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location,
            }),
        }
    }
}

impl PartialEq for AuditError {
    fn eq(&self, other: &AuditError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail: {detail}")?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = format!("{error}");
                    for (line_index, line) in rendered.lines().enumerate() {
                        if line_index == 0 {
                            write!(f, "\n  {}. {}", index + 1, line)?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for AuditError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            // Aggregated errors forward the first contained error as their source.
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates an [`AuditError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for AuditError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> AuditError {
        AuditError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`AuditError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for AuditError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> AuditError {
        AuditError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates an [`AuditError`] from a vector of errors for aggregation.
///
/// If the vector contains exactly one error, returns that error directly
/// without wrapping it.
impl<E> From<Vec<E>> for AuditError
where
    E: Into<AuditError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> AuditError {
        let location = Location::caller();

        let mut errors: Vec<AuditError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            return errors.pop().expect("just checked length is 1");
        }

        AuditError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`std::io::Error`] to [`AuditError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for AuditError {
    #[track_caller]
    fn from(err: std::io::Error) -> AuditError {
        let detail = err.to_string();
        let source = Arc::new(err);
        AuditError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`rustls::Error`] to [`AuditError`] with [`ErrorKind::EncryptionError`].
impl From<rustls::Error> for AuditError {
    #[track_caller]
    fn from(err: rustls::Error) -> AuditError {
        let detail = err.to_string();
        let source = Arc::new(err);
        AuditError::from_components(
            ErrorKind::EncryptionError,
            Cow::Borrowed("TLS configuration failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`tokio::time::error::Elapsed`] to [`AuditError`] with [`ErrorKind::QueryTimeout`].
impl From<tokio::time::error::Elapsed> for AuditError {
    #[track_caller]
    fn from(err: tokio::time::error::Elapsed) -> AuditError {
        let source = Arc::new(err);
        AuditError::from_components(
            ErrorKind::QueryTimeout,
            Cow::Borrowed("Query timed out"),
            None,
            Some(source),
        )
    }
}

/// Converts [`tokio_postgres::Error`] to [`AuditError`] with the appropriate error kind.
///
/// Maps errors based on Postgres SQLSTATE codes so that branch-local failures
/// are classified correctly. A missing SQLSTATE means the connection itself
/// broke.
impl From<tokio_postgres::Error> for AuditError {
    #[track_caller]
    fn from(err: tokio_postgres::Error) -> AuditError {
        use tokio_postgres::error::SqlState;

        let (kind, description) = match err.code() {
            Some(sqlstate) => match *sqlstate {
                // Connection errors (08xxx).
                SqlState::CONNECTION_EXCEPTION
                | SqlState::CONNECTION_DOES_NOT_EXIST
                | SqlState::CONNECTION_FAILURE
                | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
                | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION => {
                    (ErrorKind::ConnectionLost, "Postgres connection failed")
                }

                // Authentication errors (28xxx).
                SqlState::INVALID_AUTHORIZATION_SPECIFICATION | SqlState::INVALID_PASSWORD => (
                    ErrorKind::AuthenticationFailed,
                    "Postgres authentication failed",
                ),

                // Schema/object not found errors (42xxx). An undefined function
                // usually means the server predates the aggregate functions the
                // checksum queries rely on.
                SqlState::UNDEFINED_TABLE
                | SqlState::UNDEFINED_COLUMN
                | SqlState::UNDEFINED_FUNCTION
                | SqlState::UNDEFINED_SCHEMA => {
                    (ErrorKind::SchemaError, "Postgres schema object not found")
                }

                // Syntax and access errors (42xxx).
                SqlState::SYNTAX_ERROR
                | SqlState::SYNTAX_ERROR_OR_ACCESS_RULE_VIOLATION
                | SqlState::INSUFFICIENT_PRIVILEGE => {
                    (ErrorKind::QueryFailed, "Postgres syntax or access error")
                }

                // Operator intervention (57xxx). Statement timeouts surface as
                // query cancellation.
                SqlState::QUERY_CANCELED => (ErrorKind::QueryTimeout, "Postgres query canceled"),
                SqlState::ADMIN_SHUTDOWN | SqlState::CRASH_SHUTDOWN => {
                    (ErrorKind::ConnectionLost, "Postgres server shut down")
                }

                // Resource errors (53xxx).
                SqlState::INSUFFICIENT_RESOURCES
                | SqlState::OUT_OF_MEMORY
                | SqlState::TOO_MANY_CONNECTIONS => {
                    (ErrorKind::ConnectionLost, "Postgres resource limitation")
                }

                // Default for other SQL states.
                _ => (ErrorKind::QueryFailed, "Postgres error"),
            },
            // No SQL state means the connection itself failed.
            None => (ErrorKind::ConnectionLost, "Postgres connection failed"),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        AuditError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}
