//! Audit source backed by a live Postgres connection.

use std::io::BufReader;
use std::sync::Arc;

use config::shared::{IntoConnectOptions, PgConnectionConfig};
use pg_escape::quote_identifier;
use postgres::types::TableName;
use rustls::ClientConfig;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, Config, Connection, NoTls, Socket};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{Instrument, debug, error, info};

use crate::audit_error;
use crate::error::{AuditResult, ErrorKind};
use crate::source::base::{AuditSource, SourceSide};
use crate::types::{Fingerprint, Key, KeyBounds, KeyRange};

/// Spawns a background task to monitor a Postgres connection until it terminates.
fn spawn_postgres_connection<T>(connection: Connection<Socket, T::Stream>)
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let span = tracing::Span::current();
    let task = async move {
        match connection.await {
            Err(err) => error!("an error occurred during the postgres connection: {}", err),
            Ok(()) => info!("postgres connection terminated successfully"),
        }
    }
    .instrument(span);

    // The `Client` terminates the connection when dropped, so the `JoinHandle`
    // does not need to be tracked.
    tokio::spawn(task);
}

fn connect_error_kind(side: SourceSide) -> ErrorKind {
    match side {
        SourceSide::Primary => ErrorKind::PrimaryConnectionFailed,
        SourceSide::Replica => ErrorKind::ReplicaConnectionFailed,
    }
}

/// An [`AuditSource`] that issues one read-only SQL statement per operation
/// over a single Postgres connection.
///
/// Fingerprints are computed server-side from `md5(row::text)` aggregated
/// with `BIT_XOR`, so only three 64-bit values travel per range regardless of
/// how many rows it covers. Requires Postgres 14 or newer for `BIT_XOR`.
#[derive(Debug, Clone)]
pub struct PgAuditSource {
    client: Arc<Client>,
    side: SourceSide,
}

impl PgAuditSource {
    /// Establishes a connection to Postgres. The connection uses TLS if
    /// configured in the supplied [`PgConnectionConfig`].
    pub async fn connect(
        pg_connection_config: PgConnectionConfig,
        side: SourceSide,
    ) -> AuditResult<Self> {
        match pg_connection_config.tls.enabled {
            true => PgAuditSource::connect_tls(pg_connection_config, side).await,
            false => PgAuditSource::connect_no_tls(pg_connection_config, side).await,
        }
    }

    /// Establishes a connection to Postgres without TLS encryption.
    async fn connect_no_tls(
        pg_connection_config: PgConnectionConfig,
        side: SourceSide,
    ) -> AuditResult<Self> {
        let config: Config = pg_connection_config.with_db();

        let (client, connection) = config.connect(NoTls).await.map_err(|err| {
            audit_error!(
                connect_error_kind(side),
                "failed to connect to postgres",
                side,
                source: err
            )
        })?;

        spawn_postgres_connection::<NoTls>(connection);

        info!(%side, "successfully connected to postgres without tls");

        Ok(PgAuditSource {
            client: Arc::new(client),
            side,
        })
    }

    /// Establishes a TLS-encrypted connection to Postgres.
    async fn connect_tls(
        pg_connection_config: PgConnectionConfig,
        side: SourceSide,
    ) -> AuditResult<Self> {
        let mut root_store = rustls::RootCertStore::empty();
        let mut root_certs_reader =
            BufReader::new(pg_connection_config.tls.trusted_root_certs.as_bytes());
        for cert in rustls_pemfile::certs(&mut root_certs_reader) {
            let cert = cert?;
            root_store.add(cert).map_err(|err| {
                audit_error!(
                    ErrorKind::EncryptionError,
                    "failed to load trusted root certificate",
                    source: err
                )
            })?;
        }

        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let config: Config = pg_connection_config.with_db();
        let (client, connection) = config
            .connect(MakeRustlsConnect::new(tls_config))
            .await
            .map_err(|err| {
                audit_error!(
                    connect_error_kind(side),
                    "failed to connect to postgres",
                    side,
                    source: err
                )
            })?;

        spawn_postgres_connection::<MakeRustlsConnect>(connection);

        info!(%side, "successfully connected to postgres with tls");

        Ok(PgAuditSource {
            client: Arc::new(client),
            side,
        })
    }

    /// Checks if the underlying connection is closed.
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

impl AuditSource for PgAuditSource {
    async fn key_bounds(
        &self,
        table: &TableName,
        key_column: &str,
    ) -> AuditResult<Option<KeyBounds>> {
        let statement = format!(
            "SELECT MIN({key})::BIGINT, MAX({key})::BIGINT, COUNT(*)::BIGINT FROM {table}",
            key = quote_identifier(key_column),
            table = table.as_quoted_identifier(),
        );
        debug!(side = %self.side, %statement, "probing key bounds");

        let row = self.client.query_one(&statement, &[]).await?;
        let min: Option<Key> = row.get(0);
        let max: Option<Key> = row.get(1);
        let rows: i64 = row.get(2);

        let (Some(min), Some(max)) = (min, max) else {
            return Ok(None);
        };

        Ok(Some(KeyBounds {
            min,
            max,
            rows: rows as u64,
        }))
    }

    async fn count_rows(
        &self,
        table: &TableName,
        key_column: &str,
        range: KeyRange,
    ) -> AuditResult<u64> {
        let Some((low, high)) = range.effective_bounds() else {
            return Ok(0);
        };

        let statement = format!(
            "SELECT COUNT(*)::BIGINT FROM {table} WHERE {key} >= $1 AND {key} <= $2",
            key = quote_identifier(key_column),
            table = table.as_quoted_identifier(),
        );
        debug!(side = %self.side, %statement, %range, "counting rows in range");

        let row = self.client.query_one(&statement, &[&low, &high]).await?;
        let count: i64 = row.get(0);

        Ok(count as u64)
    }

    async fn range_fingerprint(
        &self,
        table: &TableName,
        key_column: &str,
        range: KeyRange,
    ) -> AuditResult<Fingerprint> {
        let Some((low, high)) = range.effective_bounds() else {
            return Ok(Fingerprint::default());
        };

        // `md5(t::text)` digests the full row through its text rendering, which
        // the session options pin to a deterministic format. The two digest
        // halves are folded independently so a collision must hit 128 bits.
        let statement = format!(
            "SELECT COUNT(*)::BIGINT, \
             COALESCE(BIT_XOR(('x' || substr(digest, 1, 16))::bit(64)::bigint), 0), \
             COALESCE(BIT_XOR(('x' || substr(digest, 17, 16))::bit(64)::bigint), 0) \
             FROM (SELECT md5(t::text) AS digest FROM {table} t \
             WHERE t.{key} >= $1 AND t.{key} <= $2) AS d",
            key = quote_identifier(key_column),
            table = table.as_quoted_identifier(),
        );
        debug!(side = %self.side, %statement, %range, "fingerprinting range");

        let row = self.client.query_one(&statement, &[&low, &high]).await?;
        let rows: i64 = row.get(0);
        let digest_lo: i64 = row.get(1);
        let digest_hi: i64 = row.get(2);

        Ok(Fingerprint {
            rows: rows as u64,
            digest_lo: digest_lo as u64,
            digest_hi: digest_hi as u64,
        })
    }

    async fn fetch_row(
        &self,
        table: &TableName,
        key_column: &str,
        key: Key,
    ) -> AuditResult<Option<String>> {
        let statement = format!(
            "SELECT t::text FROM {table} t WHERE t.{key} = $1",
            key = quote_identifier(key_column),
            table = table.as_quoted_identifier(),
        );
        debug!(side = %self.side, %statement, key, "fetching single row");

        let row = self.client.query_opt(&statement, &[&key]).await?;

        Ok(row.map(|row| row.get(0)))
    }

    async fn max_updated_at(&self, table: &TableName) -> AuditResult<Option<f64>> {
        let statement = format!(
            "SELECT EXTRACT(EPOCH FROM MAX(updated_at))::FLOAT8 FROM {table}",
            table = table.as_quoted_identifier(),
        );
        debug!(side = %self.side, %statement, "probing max updated_at");

        let row = self.client.query_one(&statement, &[]).await?;

        Ok(row.get(0))
    }
}
