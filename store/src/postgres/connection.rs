use std::{path::PathBuf, time::Duration};

use error_stack::{Result, ResultExt};
use exponential_backoff::Backoff;
use native_tls::{Certificate, TlsConnector};
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{info, warn};

use crate::StoreError;

const MAX_CONNECT_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default)]
pub enum TlsConfiguration {
    #[default]
    NoTls,
    Tls {
        certificate: Option<PathBuf>,
        accept_invalid_certificates: Option<bool>,
        disable_system_roots: Option<bool>,
        accept_invalid_hostnames: Option<bool>,
        use_sni: Option<bool>,
    },
}

/// Opens new database connections with the configured TLS settings.
#[derive(Clone)]
pub struct Connector {
    config: Config,
    tls: Option<MakeTlsConnector>,
}

impl Connector {
    pub async fn new(config: Config, tls: &TlsConfiguration) -> Result<Self, StoreError> {
        let tls = match tls {
            TlsConfiguration::NoTls => {
                info!("using insecure connection");
                None
            }
            TlsConfiguration::Tls {
                certificate,
                accept_invalid_certificates,
                disable_system_roots,
                accept_invalid_hostnames,
                use_sni,
            } => {
                info!("configure tls connection");
                let mut builder = TlsConnector::builder();

                if let Some(certificate) = certificate {
                    let pem = tokio::fs::read(certificate)
                        .await
                        .change_context(StoreError::Configuration)
                        .attach_printable_lazy(|| {
                            format!("failed to read tls certificate at {certificate:?}")
                        })?;
                    let certificate = Certificate::from_pem(&pem)
                        .change_context(StoreError::Configuration)
                        .attach_printable("failed to build certificate from PEM file")?;
                    builder.add_root_certificate(certificate);
                }

                if let Some(accept_invalid_certificates) = accept_invalid_certificates {
                    builder.danger_accept_invalid_certs(*accept_invalid_certificates);
                }

                if let Some(disable_system_roots) = disable_system_roots {
                    builder.disable_built_in_roots(*disable_system_roots);
                }

                if let Some(accept_invalid_hostnames) = accept_invalid_hostnames {
                    builder.danger_accept_invalid_hostnames(*accept_invalid_hostnames);
                }

                if let Some(use_sni) = use_sni {
                    builder.use_sni(*use_sni);
                }

                let connector = builder
                    .build()
                    .change_context(StoreError::Configuration)
                    .attach_printable("failed to build tls connector")?;
                Some(MakeTlsConnector::new(connector))
            }
        };

        Ok(Self { config, tls })
    }

    /// Opens a new connection and spawns its driver task.
    pub async fn connect(&self) -> Result<Client, StoreError> {
        // The connection types differ between branches, so each one spawns its own.
        let client = match &self.tls {
            None => {
                let (client, connection) = self
                    .config
                    .connect(NoTls)
                    .await
                    .change_context(StoreError::Connection)
                    .attach_printable("failed to connect to postgres (no tls)")?;
                tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        warn!(err = ?err, "postgres connection closed with error");
                    }
                });
                client
            }
            Some(connector) => {
                let (client, connection) = self
                    .config
                    .connect(connector.clone())
                    .await
                    .change_context(StoreError::Connection)
                    .attach_printable("failed to connect to postgres (tls)")?;
                tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        warn!(err = ?err, "postgres connection closed with error");
                    }
                });
                client
            }
        };

        Ok(client)
    }

    /// Opens a connection, retrying with exponential backoff.
    ///
    /// Makes at most `attempts` connection attempts, the first one immediately.
    pub async fn connect_with_retry(
        &self,
        attempts: u32,
        initial_delay: Duration,
    ) -> Result<Client, StoreError> {
        let attempts = attempts.max(1);
        let backoff = connect_backoff(attempts, initial_delay);

        for (retry, delay) in (&backoff).into_iter().enumerate() {
            match self.connect().await {
                Ok(client) => return Ok(client),
                Err(err) => {
                    warn!(
                        attempt = retry + 1,
                        delay = ?delay,
                        err = ?err,
                        "failed to connect to postgres, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.connect()
            .await
            .attach_printable_lazy(|| format!("giving up after {attempts} connection attempts"))
    }
}

/// Delays between connection attempts, capped at one minute.
fn connect_backoff(attempts: u32, initial_delay: Duration) -> Backoff {
    let max_delay = initial_delay.max(MAX_CONNECT_DELAY);
    let mut backoff = Backoff::new(attempts - 1, initial_delay, Some(max_delay));
    backoff.set_factor(2);
    backoff
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn test_connect_with_retry_gives_up() {
        // Nothing listens on the discard port.
        let config = Config::from_str("postgresql://postgres@127.0.0.1:9/postgres").unwrap();
        let connector = Connector::new(config, &TlsConfiguration::NoTls)
            .await
            .unwrap();

        let err = connector
            .connect_with_retry(3, Duration::from_millis(1))
            .await
            .unwrap_err();

        assert_matches!(err.current_context(), StoreError::Connection);
        let giving_up = err
            .frames()
            .filter_map(|frame| frame.downcast_ref::<String>())
            .any(|message| message.contains("giving up after 3 connection attempts"));
        assert!(giving_up);
    }
}
