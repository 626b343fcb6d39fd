//! A bounded set of authenticated sessions shared by concurrent senders.
//!
//! Capacity is enforced by a FIFO semaphore: each live session, idle or in
//! use, corresponds to at most one permit, and callers waiting for a permit
//! are served in arrival order. The slot table is a plain mutex held only for
//! bookkeeping, never across network I/O.

use std::{
    fmt,
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use herald_common::{config::PoolConfig, internal};
use herald_smtp::{Message, client::SmtpSession};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{
    DeliveryError, Mailer, SystemError, TemporaryError, Transport,
    mailer::{close, open_session},
};

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub in_use: usize,
    pub max_connections: usize,
}

struct IdleSession {
    session: SmtpSession,
    last_used: Instant,
}

#[derive(Default)]
struct Slots {
    idle: Vec<IdleSession>,
    in_use: usize,
    closed: bool,
}

struct Inner {
    mailer: Mailer,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    slots: Mutex<Slots>,
}

/// Cheap to clone; clones share the same sessions.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// A session checked out of the pool.
///
/// Hand it back with [`ConnectionPool::release`]. Dropping it instead closes
/// the underlying connection and frees its slot.
pub struct PooledConnection {
    pub session: SmtpSession,
    lease: Lease,
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection").finish_non_exhaustive()
    }
}

/// Slot bookkeeping for one checked-out session; dropping it frees the slot.
struct Lease {
    pool: Arc<Inner>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.pool.slots.lock().in_use -= 1;
    }
}

impl ConnectionPool {
    /// Creates an empty pool; sessions are dialed on demand.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config.max_connections` is zero.
    pub fn new(mailer: Mailer, config: PoolConfig) -> Result<Self, DeliveryError> {
        if config.max_connections == 0 {
            return Err(SystemError::Configuration(
                "max_connections must be at least 1".to_string(),
            )
            .into());
        }

        Ok(Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(config.max_connections)),
                mailer,
                config,
                slots: Mutex::new(Slots::default()),
            }),
        })
    }

    #[must_use]
    pub fn mailer(&self) -> &Mailer {
        &self.inner.mailer
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let slots = self.inner.slots.lock();
        PoolStats {
            idle: slots.idle.len(),
            in_use: slots.in_use,
            max_connections: self.inner.config.max_connections,
        }
    }

    /// Checks out a session, reusing an idle one when available and dialing
    /// (and authenticating) a new one otherwise. Waits in FIFO order while
    /// the pool is at capacity.
    ///
    /// # Errors
    ///
    /// - [`TemporaryError::PoolTimeout`] if the configured acquire timeout
    ///   elapses first.
    /// - [`SystemError::PoolClosed`] once [`Self::close`] has been called.
    /// - Any dial or authentication failure for a new session.
    #[tracing::instrument(skip(self), fields(server = %self.inner.mailer.config().address()))]
    pub async fn acquire(&self) -> Result<PooledConnection, DeliveryError> {
        let permit = self.wait_for_permit().await?;

        let reused = {
            let mut slots = self.inner.slots.lock();
            if slots.closed {
                return Err(SystemError::PoolClosed.into());
            }
            slots.in_use += 1;
            slots.idle.pop()
        };

        let lease = Lease {
            pool: Arc::clone(&self.inner),
            _permit: permit,
        };

        if let Some(idle) = reused {
            internal!(
                "Reusing session idle for {:?}",
                idle.last_used.elapsed()
            );
            return Ok(PooledConnection {
                session: idle.session,
                lease,
            });
        }

        internal!(level = DEBUG, "Opening pooled session");
        // On failure the lease drops here and frees the slot.
        let session = open_session(self.inner.mailer.config()).await?;
        Ok(PooledConnection { session, lease })
    }

    async fn wait_for_permit(&self) -> Result<OwnedSemaphorePermit, DeliveryError> {
        let acquire = Arc::clone(&self.inner.permits).acquire_owned();

        let permit = match self.inner.config.acquire_timeout() {
            Some(limit) => tokio::time::timeout(limit, acquire)
                .await
                .map_err(|_| TemporaryError::PoolTimeout(limit))?,
            None => acquire.await,
        };

        permit.map_err(|_| SystemError::PoolClosed.into())
    }

    /// Returns a session to the idle set. After [`Self::close`] the session
    /// is shut down instead.
    ///
    /// # Errors
    ///
    /// Hands `connection` back untouched if it was checked out of a different
    /// pool; neither pool's state changes.
    #[allow(clippy::result_large_err)]
    pub async fn release(&self, connection: PooledConnection) -> Result<(), PooledConnection> {
        if !Arc::ptr_eq(&connection.lease.pool, &self.inner) {
            internal!(level = DEBUG, "Refusing release of a connection from another pool");
            return Err(connection);
        }

        self.put_back(connection).await;
        Ok(())
    }

    async fn put_back(&self, connection: PooledConnection) {
        let PooledConnection { session, lease } = connection;
        let rejected = {
            let mut slots = self.inner.slots.lock();
            if slots.closed {
                Some(session)
            } else {
                slots.idle.push(IdleSession {
                    session,
                    last_used: Instant::now(),
                });
                None
            }
        };
        drop(lease);

        if let Some(session) = rejected {
            close(session).await;
        }
    }

    /// Closes a checked-out session for good, freeing its slot.
    pub async fn discard(&self, connection: PooledConnection) {
        let PooledConnection { session, lease } = connection;
        drop(lease);
        close(session).await;
    }

    /// Builds, signs and sends `message` over a pooled session.
    ///
    /// After a protocol-level refusal the transaction is reset and the
    /// session returned to the pool; after a network failure it is dropped.
    ///
    /// # Errors
    ///
    /// As [`Self::acquire`], plus the failure of the mail transaction itself.
    pub async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        let built = self.inner.mailer.prepare(message)?;
        let mut connection = self.acquire().await?;

        let result = connection
            .session
            .send(built.sender(), built.recipients(), &built.to_bytes())
            .await;

        match result {
            Ok(()) => {
                self.put_back(connection).await;
                Ok(())
            }
            Err(err) if err.is_transport() => {
                internal!(level = DEBUG, "Dropping pooled session after: {err}");
                drop(connection);
                Err(err.into())
            }
            Err(err) => {
                match connection.session.reset().await {
                    Ok(()) => self.put_back(connection).await,
                    Err(reset) if reset.is_transport() => drop(connection),
                    Err(reset) => {
                        internal!(level = DEBUG, "Closing pooled session after failed RSET: {reset}");
                        self.discard(connection).await;
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Stops handing out sessions and quits every idle one. Waiting and
    /// future `acquire` calls fail with [`SystemError::PoolClosed`];
    /// sessions still checked out are closed when released.
    pub async fn close(&self) {
        self.inner.permits.close();
        let idle = {
            let mut slots = self.inner.slots.lock();
            slots.closed = true;
            std::mem::take(&mut slots.idle)
        };

        internal!(level = DEBUG, "Closing {} idle pooled sessions", idle.len());
        for entry in idle {
            close(entry.session).await;
        }
    }
}

#[async_trait]
impl Transport for ConnectionPool {
    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        Self::send(self, message).await
    }
}
