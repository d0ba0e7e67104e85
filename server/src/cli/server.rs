use std::net::SocketAddr;

use clap::Args;
use error_stack::ResultExt;

use crate::error::{LedgerError, Result};

#[derive(Args, Clone, Debug)]
pub struct ServerArgs {
    /// Address the HTTP server listens on.
    #[arg(
        long = "server.address",
        env = "LEDGER_SERVER_ADDRESS",
        default_value = "0.0.0.0:8080"
    )]
    pub address: String,
}

impl ServerArgs {
    pub fn to_socket_addr(&self) -> Result<SocketAddr> {
        self.address
            .parse::<SocketAddr>()
            .change_context(LedgerError::Configuration)
            .attach_printable("failed to parse server address")
            .attach_printable_lazy(|| format!("address: {}", self.address))
    }
}
