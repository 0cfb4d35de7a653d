//! ScyllaDB client and connection management

use crate::error::PersistenceError;
use crate::schema;
use ragchat_config::PersistenceConfig;
use scylla::{Session, SessionBuilder};
use std::sync::Arc;

/// ScyllaDB configuration
#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u8,
}

impl Default for ScyllaConfig {
    fn default() -> Self {
        Self::from(&PersistenceConfig::default())
    }
}

impl From<&PersistenceConfig> for ScyllaConfig {
    fn from(config: &PersistenceConfig) -> Self {
        Self {
            hosts: config.scylla_hosts.clone(),
            keyspace: config.keyspace.clone(),
            replication_factor: config.replication_factor,
        }
    }
}

/// ScyllaDB client wrapper
#[derive(Clone)]
pub struct ScyllaClient {
    session: Arc<Session>,
    config: ScyllaConfig,
}

impl ScyllaClient {
    /// Connect to ScyllaDB cluster
    pub async fn connect(config: ScyllaConfig) -> Result<Self, PersistenceError> {
        tracing::info!(hosts = ?config.hosts, keyspace = %config.keyspace, "Connecting to ScyllaDB");

        let session = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .build()
            .await?;

        Ok(Self {
            session: Arc::new(session),
            config,
        })
    }

    /// Ensure keyspace and tables exist
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        schema::create_keyspace(
            &self.session,
            &self.config.keyspace,
            self.config.replication_factor,
        )
        .await?;
        schema::create_tables(&self.session, &self.config.keyspace).await?;
        tracing::info!(keyspace = %self.config.keyspace, "Schema ensured");
        Ok(())
    }

    /// Get the underlying session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Get keyspace name
    pub fn keyspace(&self) -> &str {
        &self.config.keyspace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_persistence_settings() {
        let settings = PersistenceConfig {
            enabled: true,
            scylla_hosts: vec!["10.0.0.1:9042".to_string(), "10.0.0.2:9042".to_string()],
            keyspace: "chat_prod".to_string(),
            replication_factor: 3,
        };

        let config = ScyllaConfig::from(&settings);
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.keyspace, "chat_prod");
        assert_eq!(config.replication_factor, 3);
    }
}
