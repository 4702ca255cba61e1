//! SQLite-backed row source.

use std::str::FromStr;

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Sqlite, SqlitePool};

use crate::error::SourceError;

/// A value bound to a query placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Real(f64),
    Text(String),
    Null,
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

/// A parameterized query whose rows are mapped into records on demand.
#[derive(Clone)]
pub struct SqlRowSource {
    pool: SqlitePool,
    query: String,
    binds: Vec<SqlValue>,
}

impl SqlRowSource {
    /// Opens (creating if missing) a SQLite database file and returns its pool.
    pub async fn open(path: &str) -> Result<SqlitePool, SourceError> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        tracing::info!(path = path, "Row source database opened");
        Ok(pool)
    }

    /// Creates a source for `query` on an existing pool.
    pub fn new(pool: SqlitePool, query: impl Into<String>) -> Self {
        Self {
            pool,
            query: query.into(),
            binds: Vec::new(),
        }
    }

    /// Binds the next positional parameter.
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.binds.push(value.into());
        self
    }

    /// Streams rows lazily, mapping each through `map`.
    pub fn rows<'a, T, F>(&'a self, map: F) -> BoxStream<'a, Result<T, SourceError>>
    where
        T: Send + 'a,
        F: Fn(&SqliteRow) -> Result<T, SourceError> + Send + 'a,
    {
        self.query()
            .fetch(&self.pool)
            .map(move |row| row.map_err(SourceError::from).and_then(|row| map(&row)))
            .boxed()
    }

    /// Maps and collects every row.
    pub async fn collect_all<'a, T, F>(&'a self, map: F) -> Result<Vec<T>, SourceError>
    where
        T: Send + 'a,
        F: Fn(&SqliteRow) -> Result<T, SourceError> + Send + 'a,
    {
        self.rows(map).try_collect().await
    }

    /// Runs the query as a statement and returns the number of affected rows.
    pub async fn execute(&self) -> Result<u64, SourceError> {
        let result = self.query().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Runs the statement once per parameter row in a single transaction.
    ///
    /// Each row's values are bound after the source's own binds. Either every
    /// row is committed or none is. Returns the total number of affected rows.
    pub async fn execute_batch<R>(&self, rows: R) -> Result<u64, SourceError>
    where
        R: IntoIterator<Item = Vec<SqlValue>>,
    {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0u64;
        let mut statements = 0usize;

        for params in rows {
            let result = bind_values(
                sqlx::query(&self.query),
                self.binds.iter().chain(params.iter()),
            )
            .execute(&mut *tx)
            .await?;
            affected += result.rows_affected();
            statements += 1;
        }

        tx.commit().await?;
        tracing::debug!(
            statements = statements,
            affected = affected,
            "Committed batched statement"
        );
        Ok(affected)
    }

    fn query(&self) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        bind_values(sqlx::query(&self.query), self.binds.iter())
    }
}

fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: impl Iterator<Item = &'q SqlValue>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Null => query.bind(Option::<i64>::None),
        };
    }
    query
}
