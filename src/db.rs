use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::config::DbConfig;

/// Tables the metrics read from; `check-db` reports a row count for each.
pub const KEY_TABLES: [&str; 4] = ["cita", "especialidad", "horarios", "usuarios"];

/// Builds the shared pool. Connections are opened on first use so the
/// process starts even while the database is unreachable.
pub fn connect_pool(config: &DbConfig) -> PgPool {
    PgPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(config.acquire_timeout())
        .test_before_acquire(true)
        .connect_lazy_with(config.connect_options())
}

#[derive(Debug, Clone)]
pub struct TableCount {
    pub table: &'static str,
    /// `None` when the table does not exist.
    pub rows: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub server_version: String,
    pub tables: Vec<String>,
    pub counts: Vec<TableCount>,
}

impl Diagnostics {
    pub fn appointments(&self) -> Option<i64> {
        self.counts
            .iter()
            .find(|count| count.table == "cita")
            .and_then(|count| count.rows)
    }
}

pub async fn diagnose(pool: &PgPool) -> anyhow::Result<Diagnostics> {
    let server_version: String = sqlx::query("SELECT version() AS version")
        .fetch_one(pool)
        .await?
        .try_get("version")?;

    let rows = sqlx::query(
        r#"
        SELECT table_name::text AS table_name
        FROM information_schema.tables
        WHERE table_schema = 'public'
        ORDER BY table_name
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in rows {
        tables.push(row.try_get("table_name")?);
    }

    let mut counts = Vec::with_capacity(KEY_TABLES.len());
    for table in KEY_TABLES {
        let rows = if tables.iter().any(|name| name == table) {
            // Table names come from KEY_TABLES, not from input.
            let count: i64 = sqlx::query(&format!("SELECT COUNT(*) AS total FROM {table}"))
                .fetch_one(pool)
                .await?
                .try_get("total")?;
            Some(count)
        } else {
            None
        };
        counts.push(TableCount { table, rows });
    }

    Ok(Diagnostics {
        server_version,
        tables,
        counts,
    })
}
