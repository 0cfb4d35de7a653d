//! ScyllaDB schema creation
//!
//! Timestamps are stored as BIGINT epoch milliseconds.

use scylla::Session;
use crate::error::PersistenceError;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(session: &Session, keyspace: &str, replication_factor: u8) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session.query_unpaged(query, &[]).await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Table definitions, in creation order
fn table_statements(keyspace: &str) -> Vec<(&'static str, String)> {
    vec![
        ("users", format!(r#"
            CREATE TABLE IF NOT EXISTS {}.users (
                user_id TEXT,
                created_at BIGINT,
                last_active BIGINT,
                PRIMARY KEY (user_id)
            )
        "#, keyspace)),
        ("chat_sessions", format!(r#"
            CREATE TABLE IF NOT EXISTS {}.chat_sessions (
                session_id TEXT,
                user_id TEXT,
                status TEXT,
                created_at BIGINT,
                last_activity BIGINT,
                PRIMARY KEY (session_id)
            )
        "#, keyspace)),
        // Lookup of a user's sessions
        ("sessions_by_user", format!(r#"
            CREATE TABLE IF NOT EXISTS {}.sessions_by_user (
                user_id TEXT,
                session_id TEXT,
                created_at BIGINT,
                PRIMARY KEY ((user_id), session_id)
            )
        "#, keyspace)),
        // Newest first, so LIMIT reads the most recent turns
        ("chat_messages", format!(r#"
            CREATE TABLE IF NOT EXISTS {}.chat_messages (
                session_id TEXT,
                timestamp BIGINT,
                message_id UUID,
                user_id TEXT,
                query TEXT,
                response TEXT,
                score FLOAT,
                metadata_json TEXT,
                PRIMARY KEY ((session_id), timestamp, message_id)
            ) WITH CLUSTERING ORDER BY (timestamp DESC, message_id DESC)
        "#, keyspace)),
        ("query_decomposition", format!(r#"
            CREATE TABLE IF NOT EXISTS {}.query_decomposition (
                message_id UUID,
                original_query TEXT,
                sub_questions LIST<TEXT>,
                created_at BIGINT,
                PRIMARY KEY (message_id)
            )
        "#, keyspace)),
    ]
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    for (name, statement) in table_statements(keyspace) {
        session.query_unpaged(statement, &[]).await
            .map_err(|e| PersistenceError::SchemaError(format!("Failed to create {} table: {}", name, e)))?;
    }

    tracing::info!("All tables created successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_statements_use_keyspace() {
        let statements = table_statements("ragchat_test");
        let names: Vec<_> = statements.iter().map(|(name, _)| *name).collect();

        assert_eq!(
            names,
            vec!["users", "chat_sessions", "sessions_by_user", "chat_messages", "query_decomposition"]
        );
        for (name, statement) in &statements {
            assert!(statement.contains(&format!("ragchat_test.{}", name)));
        }
    }
}
