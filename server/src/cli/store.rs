use std::path::PathBuf;

use clap::Args;
use error_stack::ResultExt;
use ledger_store::{PostgresStoreOptions, TlsConfiguration};

use crate::error::{LedgerError, Result};

#[derive(Args, Clone, Debug, Default)]
pub struct StoreArgs {
    /// Connection string to the PostgreSQL server.
    ///
    /// Blocks are kept in memory if not set.
    #[arg(
        long = "store.connection-string",
        env = "LEDGER_STORE_CONNECTION_STRING"
    )]
    pub connection_string: Option<String>,
    /// Number of connections in the pool.
    #[arg(long = "store.pool-size", env = "LEDGER_STORE_POOL_SIZE", default_value = "10")]
    pub pool_size: usize,
    /// Replace connections older than this, e.g. `30m`.
    #[arg(
        long = "store.max-connection-lifetime",
        env = "LEDGER_STORE_MAX_CONNECTION_LIFETIME"
    )]
    pub max_connection_lifetime: Option<String>,
    /// Number of attempts to connect at startup.
    #[arg(
        long = "store.connect-attempts",
        env = "LEDGER_STORE_CONNECT_ATTEMPTS",
        default_value = "5"
    )]
    pub connect_attempts: u32,
    /// Delay before retrying to connect. Doubles after each attempt.
    #[arg(
        long = "store.connect-retry-delay",
        env = "LEDGER_STORE_CONNECT_RETRY_DELAY",
        default_value = "3s"
    )]
    pub connect_retry_delay: String,
    /// Enable TLS when connecting to the PostgreSQL server.
    #[arg(long = "store.tls", env = "LEDGER_STORE_TLS")]
    pub tls: bool,
    /// Path to the PEM-formatted X509 TLS certificate file.
    #[arg(long = "store.tls-certificate", env = "LEDGER_STORE_TLS_CERTIFICATE")]
    pub tls_certificate: Option<String>,
    /// Disable system root certificates.
    #[arg(
        long = "store.tls-disable-system-roots",
        env = "LEDGER_STORE_TLS_DISABLE_SYSTEM_ROOTS"
    )]
    pub tls_disable_system_roots: Option<bool>,
    /// Disable certificate validation.
    #[arg(
        long = "store.tls-accept-invalid-certificates",
        env = "LEDGER_STORE_TLS_ACCEPT_INVALID_CERTIFICATES"
    )]
    pub tls_accept_invalid_certificates: Option<bool>,
    /// Disable hostname validation.
    #[arg(
        long = "store.tls-accept-invalid-hostnames",
        env = "LEDGER_STORE_TLS_ACCEPT_INVALID_HOSTNAMES"
    )]
    pub tls_accept_invalid_hostnames: Option<bool>,
    /// Use Server Name Indication (SNI).
    #[arg(long = "store.tls-use-sni", env = "LEDGER_STORE_TLS_USE_SNI")]
    pub tls_use_sni: Option<bool>,
}

impl StoreArgs {
    /// Returns the PostgreSQL options, or `None` to keep blocks in memory.
    pub fn to_store_options(&self) -> Result<Option<PostgresStoreOptions>> {
        let Some(connection_string) = self.connection_string.as_ref() else {
            return Ok(None);
        };

        let max_connection_lifetime = match self.max_connection_lifetime.as_ref() {
            None => None,
            Some(lifetime) => Some(duration_str::parse_std(lifetime).or_else(|err| {
                Err(LedgerError::Configuration)
                    .attach_printable("failed to parse max connection lifetime")
                    .attach_printable(format!("error: {}", err))
            })?),
        };

        let connect_retry_delay =
            duration_str::parse_std(&self.connect_retry_delay).or_else(|err| {
                Err(LedgerError::Configuration)
                    .attach_printable("failed to parse connect retry delay")
                    .attach_printable(format!("error: {}", err))
            })?;

        let tls = if self.tls {
            TlsConfiguration::Tls {
                certificate: self.tls_certificate.as_ref().map(PathBuf::from),
                accept_invalid_certificates: self.tls_accept_invalid_certificates,
                disable_system_roots: self.tls_disable_system_roots,
                accept_invalid_hostnames: self.tls_accept_invalid_hostnames,
                use_sni: self.tls_use_sni,
            }
        } else {
            TlsConfiguration::NoTls
        };

        let mut options = PostgresStoreOptions::new(connection_string);
        options.tls = tls;
        options.pool_size = self.pool_size.max(1);
        options.max_connection_lifetime = max_connection_lifetime;
        options.connect_attempts = self.connect_attempts.max(1);
        options.connect_retry_delay = connect_retry_delay;

        Ok(Some(options))
    }
}
