//! Top-level configuration, loaded from RON.
//!
//! ```ron
//! (
//!     session: (
//!         host: "smtp.example.com",
//!         port: 587,
//!         from: "noreply@example.com",
//!         credentials: Some((username: "mailer", password: "secret")),
//!         tls: (mode: starttls),
//!         auth: login,
//!     ),
//!     pool: (max_connections: 4, acquire_timeout_ms: Some(5000)),
//!     queue: (workers: 2, messages_per_second: 5.0, retry_count: 2),
//!     dkim: Some((domain: "example.com", selector: "mail", private_key: "/etc/herald/dkim.pem")),
//! )
//! ```

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use herald_common::config::{DkimConfig, PoolConfig, QueueConfig, SessionConfig};
use herald_delivery::{ConnectionPool, DeliveryError, Mailer, Results, SendQueue, Transport};
use herald_smtp::{DkimError, DkimIdentity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("Invalid {section} config: {reason}")]
    Invalid {
        section: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Dkim(#[from] DkimError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Herald {
    pub session: SessionConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub dkim: Option<DkimConfig>,
}

impl Herald {
    #[must_use]
    pub fn new(session: SessionConfig) -> Self {
        Self {
            session,
            pool: PoolConfig::default(),
            queue: QueueConfig::default(),
            dkim: None,
        }
    }

    /// Reads and validates a RON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or
    /// describes an unusable pool or queue.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_ron(&content)
    }

    /// Parses and validates a RON configuration string.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or describes an unusable
    /// pool or queue.
    pub fn from_ron(content: &str) -> Result<Self, ConfigError> {
        let herald: Self = ron::from_str(content)?;
        herald.validate()?;
        Ok(herald)
    }

    /// Checks the settings that cannot be expressed in the types alone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.host.is_empty() {
            return Err(ConfigError::Invalid {
                section: "session",
                reason: "host must not be empty".to_string(),
            });
        }
        if self.pool.max_connections == 0 {
            return Err(ConfigError::Invalid {
                section: "pool",
                reason: "max_connections must be at least 1".to_string(),
            });
        }
        self.queue
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                section: "queue",
                reason,
            })
    }

    /// A one-shot mailer, loading the DKIM key if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the DKIM key cannot be read or parsed.
    pub fn mailer(&self) -> Result<Mailer, ConfigError> {
        let mailer = Mailer::new(self.session.clone());
        match &self.dkim {
            Some(dkim) => Ok(mailer.with_dkim(DkimIdentity::from_config(dkim)?)),
            None => Ok(mailer),
        }
    }

    /// A connection pool sized by `pool`.
    ///
    /// # Errors
    ///
    /// As [`Self::mailer`].
    pub fn pool(&self) -> Result<ConnectionPool, ConfigError> {
        Ok(ConnectionPool::new(self.mailer()?, self.pool)?)
    }

    /// Starts a send queue delivering through a fresh connection pool. Must
    /// be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// As [`Self::mailer`].
    pub fn queue(&self) -> Result<(SendQueue, Results), ConfigError> {
        self.queue_over(Arc::new(self.pool()?))
    }

    /// Starts a send queue delivering through `transport`.
    ///
    /// # Errors
    ///
    /// Returns an error if `queue` cannot drive a queue.
    pub fn queue_over(
        &self,
        transport: Arc<dyn Transport>,
    ) -> Result<(SendQueue, Results), ConfigError> {
        Ok(SendQueue::start(transport, self.queue)?)
    }
}
