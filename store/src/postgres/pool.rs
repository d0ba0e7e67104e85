use std::{
    ops::{Deref, DerefMut},
    time::{Duration, Instant},
};

use async_channel::{Receiver, Sender};
use error_stack::{Result, ResultExt};
use tokio_postgres::Client;
use tracing::debug;

use super::connection::Connector;
use crate::StoreError;

/// A fixed-size connection pool.
///
/// The pool holds one slot per connection. Checking out blocks until a slot is
/// free. Empty slots, closed connections and connections older than the
/// maximum lifetime are replaced with a fresh connection on checkout.
pub struct Pool {
    connector: Connector,
    max_lifetime: Option<Duration>,
    tx: Sender<Option<Slot>>,
    rx: Receiver<Option<Slot>>,
}

struct Slot {
    client: Client,
    created_at: Instant,
}

/// A connection checked out from the [Pool]. Returned to the pool on drop.
pub struct PooledClient {
    slot: Option<Slot>,
    tx: Sender<Option<Slot>>,
}

impl Pool {
    /// Creates a pool of `size` slots, seeded with an already open connection.
    pub fn new(
        connector: Connector,
        size: usize,
        max_lifetime: Option<Duration>,
        initial: Client,
    ) -> Self {
        let size = size.max(1);
        let (tx, rx) = async_channel::bounded(size);

        let slot = Slot {
            client: initial,
            created_at: Instant::now(),
        };
        // The channel has room for every slot.
        let _ = tx.try_send(Some(slot));
        for _ in 1..size {
            let _ = tx.try_send(None);
        }

        Self {
            connector,
            max_lifetime,
            tx,
            rx,
        }
    }

    pub async fn get(&self) -> Result<PooledClient, StoreError> {
        let slot = self
            .rx
            .recv()
            .await
            .change_context(StoreError::Connection)
            .attach_printable("connection pool closed")?;

        let slot = match slot {
            Some(slot) if self.is_usable(&slot) => slot,
            _ => {
                debug!("opening new pooled connection");
                match self.connector.connect().await {
                    Ok(client) => Slot {
                        client,
                        created_at: Instant::now(),
                    },
                    Err(err) => {
                        // Give the slot back so the pool doesn't shrink.
                        let _ = self.tx.try_send(None);
                        return Err(err);
                    }
                }
            }
        };

        Ok(PooledClient {
            slot: Some(slot),
            tx: self.tx.clone(),
        })
    }

    fn is_usable(&self, slot: &Slot) -> bool {
        if slot.client.is_closed() {
            return false;
        }

        match self.max_lifetime {
            Some(max_lifetime) => slot.created_at.elapsed() < max_lifetime,
            None => true,
        }
    }
}

impl Deref for PooledClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        match &self.slot {
            Some(slot) => &slot.client,
            None => unreachable!("pooled client used after release"),
        }
    }
}

impl DerefMut for PooledClient {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.slot {
            Some(slot) => &mut slot.client,
            None => unreachable!("pooled client used after release"),
        }
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        let _ = self.tx.try_send(self.slot.take());
    }
}
