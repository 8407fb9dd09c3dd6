//! LanceDB connection helpers for the passage table.

use anyhow::Result;
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::{connect, Connection};

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

/// Row count of the passage table; handy for index health checks.
pub async fn passage_count(conn: &Connection, table: &str) -> Result<usize> {
    let names = conn.table_names().execute().await?;
    if !names.contains(&table.to_string()) {
        return Ok(0);
    }
    let t = conn.open_table(table).execute().await?;
    let mut stream = t.query().execute().await?;
    let mut count = 0usize;
    while let Some(batch) = stream.try_next().await? {
        count += batch.num_rows();
    }
    Ok(count)
}
