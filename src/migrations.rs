//! Embedded database migrations
//!
//! SQL files are compiled into the binary; applied names are tracked in a
//! `_migrations` table.

use crate::db::DbPool;

/// All migrations in order, each as (filename, sql_content)
pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_create_profiles.sql",
        include_str!("../migrations/001_create_profiles.sql"),
    ),
    (
        "002_create_sessions.sql",
        include_str!("../migrations/002_create_sessions.sql"),
    ),
];

/// Applies pending migrations in order. Each one commits together with its
/// `_migrations` row.
pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let mut conn = pool.get()?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )?;

    let mut applied = 0;
    for (name, sql) in MIGRATIONS {
        let done: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM _migrations WHERE name = ?1)",
            [name],
            |row| row.get(0),
        )?;
        if done {
            tracing::debug!(migration = name, "migrate: already applied");
            continue;
        }

        tracing::info!(migration = name, "migrate: applying");
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
        tx.commit()?;
        applied += 1;
    }

    tracing::info!(applied, total = MIGRATIONS.len(), "migrate: up to date");
    Ok(())
}

/// Applies every migration without tracking, for fresh in-memory databases.
pub fn run_migrations_for_tests(pool: &DbPool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = pool.get()?;

    for (_filename, sql) in MIGRATIONS {
        conn.execute_batch(sql)?;
    }

    Ok(())
}
