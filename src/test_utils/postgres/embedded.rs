use postgresql_embedded::PostgreSQL;

use crate::postgres::PgOptions;

/// A running embedded `PostgreSQL` instance.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    pub database_url: String,
    /// Validated options pointing at the test database.
    pub options: PgOptions,
}

/// Set up an embedded `PostgreSQL` instance and create `db_name` on it.
///
/// # Errors
/// Returns an error if the embedded server cannot be set up or started, if the
/// database cannot be created, or if the resulting URL does not validate.
pub async fn setup_postgres_embedded(
    db_name: &str,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    let mut postgresql = PostgreSQL::default();

    // bundled binaries, no download
    postgresql.setup().await?;
    postgresql.start().await?;

    let port = postgresql.settings().port;
    let host = postgresql.settings().host.clone();
    let user = postgresql.settings().username.clone();
    let password = postgresql.settings().password.clone();

    postgresql.create_database(db_name).await?;

    let database_url = format!("postgres://{user}:{password}@{host}:{port}/{db_name}");
    let options = PgOptions::from_url(&database_url)?;
    tracing::info!(port, db_name, "embedded postgres started");

    Ok(EmbeddedPostgres {
        postgresql,
        port,
        database_url,
        options,
    })
}

/// Stop a previously started embedded `PostgreSQL` instance.
pub async fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres { postgresql, .. } = postgres;
    if let Err(err) = postgresql.stop().await {
        tracing::debug!(error = %err, "embedded postgres did not stop cleanly");
    }
}
