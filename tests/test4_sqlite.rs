#![cfg(feature = "sqlite")]

use std::sync::Arc;

use sql_conn_manager::prelude::*;
use sql_conn_manager::sqlite::DEFAULT_STATEMENT_CACHE_CAPACITY;
use tempfile::TempDir;

fn sqlite_manager(dir: &TempDir) -> Arc<ConnectionManager<SqliteBackend>> {
    let path = dir.path().join("shop.db");
    let backend = SqliteBackend::new(SqliteOptions::new(path.to_string_lossy().into_owned()));
    Arc::new(ConnectionManager::new(backend))
}

async fn create_schema(manager: &ConnectionManager<SqliteBackend>) -> Result<(), SqlConnError> {
    manager
        .execute_update(
            "CREATE TABLE IF NOT EXISTS client (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, vip INTEGER NOT NULL DEFAULT 0)",
            &no_params(),
        )
        .await?;
    Ok(())
}

#[tokio::test]
async fn crud_through_the_manager() -> Result<(), SqlConnError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = sqlite_manager(&dir);
    create_schema(&manager).await?;

    for name in ["ada", "grace", "edsger"] {
        let inserted = manager
            .execute_update(
                "INSERT INTO client (name, vip) VALUES (?1, ?2)",
                &|p: &mut BoundParams| -> Result<(), SqlConnError> {
                    p.push(name).push(name == "grace");
                    Ok(())
                },
            )
            .await?;
        assert_eq!(inserted, 1);
    }

    let renamed = manager
        .execute_update(
            "UPDATE client SET name = ?1 WHERE name = ?2",
            &vec![RowValues::from("dijkstra"), RowValues::from("edsger")],
        )
        .await?;
    assert_eq!(renamed, 1);

    let rows = manager
        .execute_query("SELECT id, name, vip FROM client ORDER BY id", &no_params())
        .await?;
    assert_eq!(rows.len(), 3);
    let names: Vec<&str> = rows
        .results
        .iter()
        .filter_map(|row| row.get("name").and_then(RowValues::as_text))
        .collect();
    assert_eq!(names, ["ada", "grace", "dijkstra"]);
    assert_eq!(rows.results[1].get("vip").and_then(RowValues::as_bool), Some(&true));

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn statements_are_cached_per_connection() -> Result<(), SqlConnError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = sqlite_manager(&dir);
    create_schema(&manager).await?;

    let sql = "SELECT count(*) AS n FROM client";
    let first = manager.prepare(sql).await?;
    let second = manager.prepare(sql).await?;
    assert!(Arc::ptr_eq(&first, &second));

    manager.force_reconnect().await?;
    let third = manager.prepare(sql).await?;
    assert!(!Arc::ptr_eq(&first, &third));
    assert!(first.is_closed());
    assert_eq!(third.connection_id(), 2);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn insert_returns_generated_keys() -> Result<(), SqlConnError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = sqlite_manager(&dir);
    create_schema(&manager).await?;

    let sql = "INSERT INTO client (name) VALUES (?1)";
    let first = manager
        .execute_returning_keys(sql, &vec![RowValues::from("ada")])
        .await?;
    let second = manager
        .execute_returning_keys(sql, &vec![RowValues::from("grace")])
        .await?;

    let id_of = |rs: &ResultSet| rs.first().and_then(|row| row.get("id")).and_then(RowValues::as_int).copied();
    assert_eq!(id_of(&first), Some(1));
    assert_eq!(id_of(&second), Some(2));
    assert_eq!(second.rows_affected, 1);

    let keyed = manager.prepare_with(sql, PrepareVariant::ReturnGeneratedKeys).await?;
    assert!(keyed.raw().query().ends_with("RETURNING *"));
    let plain = manager.prepare(sql).await?;
    assert_eq!(plain.raw().query(), sql);
    // schema statement, keyed insert, plain insert
    assert_eq!(manager.cached_statements(), 3);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn stopped_worker_is_replaced_on_next_call() -> Result<(), SqlConnError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = sqlite_manager(&dir);
    create_schema(&manager).await?;

    // warm the cache, then stop the worker behind the manager's back
    let stmt = manager.prepare("INSERT INTO client (name) VALUES (?1)").await?;
    manager.backend().close(stmt.connection().raw()).await?;

    let err = manager
        .execute_prepared(&stmt, &BoundParams::from(vec![RowValues::from("lost")]))
        .await
        .unwrap_err();
    assert!(err.is_recoverable());

    let inserted = manager
        .execute_update(
            "INSERT INTO client (name) VALUES (?1)",
            &vec![RowValues::from("kept")],
        )
        .await?;
    assert_eq!(inserted, 1);
    assert_eq!(manager.current_connection_id(), Some(2));

    let rows = manager
        .execute_query("SELECT name FROM client", &no_params())
        .await?;
    assert_eq!(rows.len(), 1);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn syntax_error_is_fatal() -> Result<(), SqlConnError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = sqlite_manager(&dir);

    let err = manager
        .execute_query("SELEC * FROM client", &no_params())
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Fatal);
    assert!(matches!(err, SqlConnError::SqliteError(_)));
    assert_eq!(manager.stats().connections_opened, 1);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn shutdown_then_reuse_sees_persisted_rows() -> Result<(), SqlConnError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = sqlite_manager(&dir);
    create_schema(&manager).await?;
    manager
        .execute_update("INSERT INTO client (name) VALUES ('ada')", &no_params())
        .await?;

    manager.shutdown().await;
    manager.shutdown().await;

    let rows = manager
        .execute_query("SELECT name FROM client", &no_params())
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(manager.current_connection_id(), Some(2));

    manager.shutdown().await;
    Ok(())
}

async fn run_many_distinct_statements(
    manager: &ConnectionManager<SqliteBackend>,
    distinct: i64,
) -> Result<(), SqlConnError> {
    let mut prepared = Vec::new();
    for i in 0..distinct {
        prepared.push((i, manager.prepare(&format!("SELECT ?1 + {i} AS v")).await?));
    }
    // second pass runs statements the worker may already have evicted
    for _ in 0..2 {
        for (i, stmt) in &prepared {
            let mut params = BoundParams::new();
            params.push(100_i64);
            let rows = manager.query_prepared(stmt, &params).await?;
            assert_eq!(rows.results[0].get("v").and_then(RowValues::as_int), Some(&(100 + i)));
        }
    }
    Ok(())
}

#[tokio::test]
async fn more_distinct_queries_than_the_driver_default_stay_cached() -> Result<(), SqlConnError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = sqlite_manager(&dir);
    assert_eq!(
        manager.backend().options().statement_cache_capacity,
        DEFAULT_STATEMENT_CACHE_CAPACITY
    );

    run_many_distinct_statements(&manager, 40).await?;
    for i in 0..40 {
        manager.prepare(&format!("SELECT ?1 + {i} AS v")).await?;
    }
    let stats = manager.stats();
    assert_eq!(stats.cache_misses, 40);
    assert_eq!(stats.cache_hits, 40);
    assert_eq!(manager.cached_statements(), 40);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn statements_evicted_from_a_small_cache_recompile() -> Result<(), SqlConnError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tiny.db");
    let options = SqliteOptions::builder(path.to_string_lossy().into_owned())
        .statement_cache_capacity(2)
        .finish();
    let manager = ConnectionManager::new(SqliteBackend::new(options));

    run_many_distinct_statements(&manager, 6).await?;

    manager.shutdown().await;
    Ok(())
}
