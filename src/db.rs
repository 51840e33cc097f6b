//! Database connection module
use surrealdb::{Surreal, engine::any::Any};

use crate::config::{DatabaseAuthMethod, DatabaseConfig};

/// Connects to the configured SurrealDB instance and selects its namespace and database.
#[tracing::instrument(skip(config), fields(url = %config.database_url))]
pub async fn connect(config: &DatabaseConfig) -> surrealdb::Result<Surreal<Any>> {
    tracing::info!("Connecting to database at {}", config.database_url);
    let db = surrealdb::engine::any::connect(config.database_url.as_str()).await?;

    match config.db_auth_method {
        DatabaseAuthMethod::Root => {
            tracing::info!("Signing in as root user");
            db.signin(surrealdb::opt::auth::Root {
                username: config.root_username.as_deref().unwrap_or("root"),
                password: config.root_password.as_deref().unwrap_or("root"),
            })
            .await?;
        }
        DatabaseAuthMethod::None => {
            tracing::info!("No authentication configured");
        }
    }

    tracing::info!(
        "Using namespace '{}' and database '{}'",
        config.db_namespace,
        config.db_database
    );
    db.use_ns(config.db_namespace.as_str())
        .use_db(config.db_database.as_str())
        .await?;

    tracing::info!("Database initialization complete");
    Ok(db)
}

/// Throwaway in-memory database for tests.
#[cfg(test)]
pub async fn connect_memory() -> Surreal<Any> {
    let config = DatabaseConfig {
        database_url: "mem://".to_string(),
        db_auth_method: DatabaseAuthMethod::None,
        root_username: None,
        root_password: None,
        db_namespace: "test".to_string(),
        db_database: "test".to_string(),
    };
    connect(&config)
        .await
        .expect("Failed to open in-memory database")
}
