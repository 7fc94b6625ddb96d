use thiserror::Error;

/// Errors reported when validating configuration values.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// TLS is enabled but no trusted root certificates were provided.
    #[error("trusted root certificates must be provided when TLS is enabled")]
    MissingTrustedRootCerts,

    /// A field failed a constraint check.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
