use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio_postgres::{Config as TokioPgConnectOptions, config::SslMode as TokioPgSslMode};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Static Postgres session options applied to every auditor connection.
///
/// Pinning these guarantees that the textual rendering of rows, which the
/// checksum queries hash, is identical on both endpoints regardless of how each
/// server is configured.
pub struct DefaultPgConnectionOptions;

impl DefaultPgConnectionOptions {
    /// Returns the options as a string suitable for the tokio-postgres `options` parameter.
    ///
    /// Returns a space-separated list of `-c key=value` pairs.
    pub fn to_options_string() -> String {
        "-c datestyle=ISO -c intervalstyle=postgres -c extra_float_digits=3 -c client_encoding=UTF8 -c timezone=UTC"
            .to_string()
    }
}

/// Configuration for connecting to a Postgres database.
///
/// This struct holds all necessary connection parameters and settings for one
/// side of the audit (primary or replica).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    /// Port number on which the Postgres server is listening.
    pub port: u16,
    /// Name of the Postgres database to connect to.
    pub name: String,
    /// Username for authenticating with the Postgres server.
    pub username: String,
    /// Password for the specified user. This field is sensitive and redacted in debug output.
    pub password: Option<SerializableSecretString>,
    /// TLS configuration for secure connections.
    #[serde(default)]
    pub tls: TlsConfig,
}

/// TLS settings for secure Postgres connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    #[serde(default)]
    pub trusted_root_certs: String,
    /// Whether TLS is enabled for the connection.
    #[serde(default)]
    pub enabled: bool,
}

impl TlsConfig {
    /// Validates the [`TlsConfig`].
    ///
    /// If [`TlsConfig::enabled`] is true, this method checks that
    /// [`TlsConfig::trusted_root_certs`] is not empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// Converts a [`PgConnectionConfig`] into driver-specific connect options.
///
/// Only tokio-postgres is used in this workspace, but keeping the conversion
/// behind a trait keeps the connection settings centralized should another
/// driver ever be needed.
pub trait IntoConnectOptions<Output> {
    /// Creates connection options configured with all parameters including the
    /// database name.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<TokioPgConnectOptions> for PgConnectionConfig {
    fn with_db(&self) -> TokioPgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            TokioPgSslMode::Require
        } else {
            TokioPgSslMode::Prefer
        };

        let mut config = TokioPgConnectOptions::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.username)
            .dbname(&self.name)
            .options(&DefaultPgConnectionOptions::to_options_string())
            .ssl_mode(ssl_mode);

        if let Some(password) = &self.password {
            config.password(password.expose_secret());
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_without_tls() -> PgConnectionConfig {
        PgConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "orders".to_string(),
            username: "auditor".to_string(),
            password: None,
            tls: TlsConfig::default(),
        }
    }

    #[test]
    fn options_string_pins_row_rendering() {
        let options = DefaultPgConnectionOptions::to_options_string();

        assert!(options.contains("datestyle=ISO"));
        assert!(options.contains("extra_float_digits=3"));
        assert!(options.contains("timezone=UTC"));
    }

    #[test]
    fn with_db_carries_all_connection_parameters() {
        let options: TokioPgConnectOptions = config_without_tls().with_db();

        assert_eq!(options.get_dbname(), Some("orders"));
        assert_eq!(options.get_user(), Some("auditor"));
        assert_eq!(options.get_ports(), &[5432]);
    }

    #[test]
    fn tls_validation_requires_certs_when_enabled() {
        let tls = TlsConfig {
            trusted_root_certs: String::new(),
            enabled: true,
        };

        assert!(tls.validate().is_err());
        assert!(TlsConfig::default().validate().is_ok());
    }
}
