use crate::catalog;
use crate::repository::DbPool;
use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

pub async fn establish_connection(database_url: &str) -> Result<DbPool> {
    let db_url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{}", database_url)
    };

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    // In-memory databases exist per connection; a single-connection pool
    // keeps every query on the same database.
    let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS languages (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            runtime TEXT NOT NULL,
            version TEXT NOT NULL,
            file_name TEXT NOT NULL,
            template_code TEXT NOT NULL,
            default_time_limit_ms INTEGER NOT NULL,
            default_memory_mb INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            language_id TEXT NOT NULL,
            source_code TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'ACTIVE'
                CHECK (status IN ('ACTIVE', 'INACTIVE')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (language_id) REFERENCES languages(id) ON DELETE RESTRICT
        );

        CREATE TABLE IF NOT EXISTS executions (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            status TEXT NOT NULL
                CHECK (status IN ('QUEUED', 'RUNNING', 'COMPLETED', 'FAILED', 'TIMEOUT')),
            stdout TEXT,
            stderr TEXT,
            execution_time_ms INTEGER,
            exit_code INTEGER,
            timeout BOOLEAN NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            started_at TEXT,
            finished_at TEXT,
            FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_executions_session_id ON executions(session_id);
        CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status);
        CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at);

        CREATE TRIGGER IF NOT EXISTS trg_sessions_updated_at
        AFTER UPDATE OF language_id, source_code, status ON sessions
        FOR EACH ROW
        BEGIN
            UPDATE sessions
            SET updated_at = strftime('%Y-%m-%d %H:%M:%f+00:00', 'now')
            WHERE id = NEW.id;
        END;

        CREATE TRIGGER IF NOT EXISTS trg_languages_updated_at
        AFTER UPDATE OF name, runtime, version, file_name, template_code ON languages
        FOR EACH ROW
        BEGIN
            UPDATE languages
            SET updated_at = strftime('%Y-%m-%d %H:%M:%f+00:00', 'now')
            WHERE id = NEW.id;
        END;
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert the language catalogue. Existing rows are left untouched, so an
/// operator edit to a seeded row survives restarts.
pub async fn seed_languages(
    pool: &DbPool,
    default_time_limit_ms: i64,
    default_memory_mb: i64,
) -> Result<()> {
    let now = Utc::now();

    for seed in catalog::SEED_LANGUAGES {
        let commands = catalog::commands_for(seed.runtime)
            .ok_or_else(|| anyhow::anyhow!("No catalogue entry for runtime {}", seed.runtime))?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO languages
                (id, name, runtime, version, file_name, template_code,
                 default_time_limit_ms, default_memory_mb, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(seed.id)
        .bind(seed.name)
        .bind(seed.runtime)
        .bind(seed.version)
        .bind(commands.file_name)
        .bind(seed.template_code)
        .bind(default_time_limit_ms)
        .bind(default_memory_mb)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    }

    Ok(())
}
