use crate::repo::RepoError;

/// Marker for the supported connection pools. The repo layer is written once
/// against the postgres pool and generated for sqlite with
/// `conditional-trait-gen`, so the trait itself stays minimal.
pub trait Pool: Clone + Send + Sync + 'static {}

pub mod postgres {
    use super::Pool;
    use crate::config::DbPostgresConfig;
    use crate::metrics::db::record_db_query;
    use crate::repo::RepoError;
    use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgQueryResult, PgRow};
    use sqlx::query::{Query, QueryAs};
    use sqlx::{FromRow, PgPool, Postgres, Transaction};
    use std::time::Instant;

    #[derive(Clone)]
    pub struct PostgresPool {
        pool: PgPool,
    }

    impl PostgresPool {
        pub async fn configured(config: &DbPostgresConfig) -> Result<Self, sqlx::Error> {
            let mut options = PgConnectOptions::new()
                .host(&config.host)
                .port(config.port)
                .database(&config.database)
                .username(&config.username)
                .password(&config.password);
            if let Some(schema) = &config.schema {
                options = options.options([("search_path", schema.as_str())]);
            }
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options)
                .await?;
            Ok(Self { pool })
        }

        pub fn with_ro(&self, svc: &'static str, api: &'static str) -> PostgresLabelledApi {
            PostgresLabelledApi {
                svc,
                api,
                pool: self.pool.clone(),
            }
        }

        pub fn with_rw(&self, svc: &'static str, api: &'static str) -> PostgresLabelledApi {
            PostgresLabelledApi {
                svc,
                api,
                pool: self.pool.clone(),
            }
        }
    }

    impl Pool for PostgresPool {}

    pub async fn migrate(
        config: &DbPostgresConfig,
        migrator: &sqlx::migrate::Migrator,
    ) -> Result<(), RepoError> {
        let pool = PostgresPool::configured(config)
            .await
            .map_err(RepoError::from)?;
        migrator.run(&pool.pool).await?;
        Ok(())
    }

    pub struct PostgresLabelledApi {
        svc: &'static str,
        api: &'static str,
        pool: PgPool,
    }

    impl PostgresLabelledApi {
        pub async fn execute(
            &self,
            query: Query<'_, Postgres, PgArguments>,
        ) -> Result<PgQueryResult, RepoError> {
            let start = Instant::now();
            self.record(start, query.execute(&self.pool).await)
        }

        pub async fn fetch_optional_as<T>(
            &self,
            query: QueryAs<'_, Postgres, T, PgArguments>,
        ) -> Result<Option<T>, RepoError>
        where
            T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
        {
            let start = Instant::now();
            self.record(start, query.fetch_optional(&self.pool).await)
        }

        pub async fn fetch_one_as<T>(
            &self,
            query: QueryAs<'_, Postgres, T, PgArguments>,
        ) -> Result<T, RepoError>
        where
            T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
        {
            let start = Instant::now();
            self.record(start, query.fetch_one(&self.pool).await)
        }

        pub async fn fetch_all_as<T>(
            &self,
            query: QueryAs<'_, Postgres, T, PgArguments>,
        ) -> Result<Vec<T>, RepoError>
        where
            T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
        {
            let start = Instant::now();
            self.record(start, query.fetch_all(&self.pool).await)
        }

        pub async fn begin(&self) -> Result<PostgresLabelledTransaction, RepoError> {
            let tx = self.pool.begin().await.map_err(RepoError::from)?;
            Ok(PostgresLabelledTransaction {
                svc: self.svc,
                api: self.api,
                tx,
            })
        }

        fn record<R>(
            &self,
            start: Instant,
            result: Result<R, sqlx::Error>,
        ) -> Result<R, RepoError> {
            record_db_query("postgres", self.svc, self.api, start.elapsed(), result.is_ok());
            result.map_err(|err| {
                tracing::error!(svc = self.svc, api = self.api, "DB query failed: {err}");
                err.into()
            })
        }
    }

    pub struct PostgresLabelledTransaction {
        svc: &'static str,
        api: &'static str,
        tx: Transaction<'static, Postgres>,
    }

    impl PostgresLabelledTransaction {
        pub async fn execute(
            &mut self,
            query: Query<'_, Postgres, PgArguments>,
        ) -> Result<PgQueryResult, RepoError> {
            let start = Instant::now();
            let result = query.execute(&mut *self.tx).await;
            self.record(start, result)
        }

        pub async fn fetch_one_as<T>(
            &mut self,
            query: QueryAs<'_, Postgres, T, PgArguments>,
        ) -> Result<T, RepoError>
        where
            T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
        {
            let start = Instant::now();
            let result = query.fetch_one(&mut *self.tx).await;
            self.record(start, result)
        }

        pub async fn fetch_optional_as<T>(
            &mut self,
            query: QueryAs<'_, Postgres, T, PgArguments>,
        ) -> Result<Option<T>, RepoError>
        where
            T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
        {
            let start = Instant::now();
            let result = query.fetch_optional(&mut *self.tx).await;
            self.record(start, result)
        }

        pub async fn commit(self) -> Result<(), RepoError> {
            self.tx.commit().await.map_err(RepoError::from)
        }

        pub async fn rollback(self) -> Result<(), RepoError> {
            self.tx.rollback().await.map_err(RepoError::from)
        }

        fn record<R>(
            &self,
            start: Instant,
            result: Result<R, sqlx::Error>,
        ) -> Result<R, RepoError> {
            record_db_query("postgres", self.svc, self.api, start.elapsed(), result.is_ok());
            result.map_err(|err| {
                tracing::error!(svc = self.svc, api = self.api, "DB query failed: {err}");
                err.into()
            })
        }
    }
}

pub mod sqlite {
    use super::Pool;
    use crate::config::DbSqliteConfig;
    use crate::metrics::db::record_db_query;
    use crate::repo::RepoError;
    use sqlx::query::{Query, QueryAs};
    use sqlx::sqlite::{
        SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions,
        SqliteQueryResult, SqliteRow,
    };
    use sqlx::{FromRow, Sqlite, SqlitePool as RawSqlitePool, Transaction};
    use std::str::FromStr;
    use std::time::Instant;

    #[derive(Clone)]
    pub struct SqlitePool {
        pool: RawSqlitePool,
    }

    impl SqlitePool {
        pub async fn configured(config: &DbSqliteConfig) -> Result<Self, sqlx::Error> {
            let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.database))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);
            let pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options)
                .await?;
            Ok(Self { pool })
        }

        pub fn with_ro(&self, svc: &'static str, api: &'static str) -> SqliteLabelledApi {
            SqliteLabelledApi {
                svc,
                api,
                pool: self.pool.clone(),
            }
        }

        pub fn with_rw(&self, svc: &'static str, api: &'static str) -> SqliteLabelledApi {
            SqliteLabelledApi {
                svc,
                api,
                pool: self.pool.clone(),
            }
        }
    }

    impl Pool for SqlitePool {}

    pub async fn migrate(
        config: &DbSqliteConfig,
        migrator: &sqlx::migrate::Migrator,
    ) -> Result<(), RepoError> {
        let pool = SqlitePool::configured(config)
            .await
            .map_err(RepoError::from)?;
        migrator.run(&pool.pool).await?;
        Ok(())
    }

    pub struct SqliteLabelledApi {
        svc: &'static str,
        api: &'static str,
        pool: RawSqlitePool,
    }

    impl SqliteLabelledApi {
        pub async fn execute<'q>(
            &self,
            query: Query<'q, Sqlite, SqliteArguments<'q>>,
        ) -> Result<SqliteQueryResult, RepoError> {
            let start = Instant::now();
            self.record(start, query.execute(&self.pool).await)
        }

        pub async fn fetch_optional_as<'q, T>(
            &self,
            query: QueryAs<'q, Sqlite, T, SqliteArguments<'q>>,
        ) -> Result<Option<T>, RepoError>
        where
            T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        {
            let start = Instant::now();
            self.record(start, query.fetch_optional(&self.pool).await)
        }

        pub async fn fetch_one_as<'q, T>(
            &self,
            query: QueryAs<'q, Sqlite, T, SqliteArguments<'q>>,
        ) -> Result<T, RepoError>
        where
            T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        {
            let start = Instant::now();
            self.record(start, query.fetch_one(&self.pool).await)
        }

        pub async fn fetch_all_as<'q, T>(
            &self,
            query: QueryAs<'q, Sqlite, T, SqliteArguments<'q>>,
        ) -> Result<Vec<T>, RepoError>
        where
            T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        {
            let start = Instant::now();
            self.record(start, query.fetch_all(&self.pool).await)
        }

        pub async fn begin(&self) -> Result<SqliteLabelledTransaction, RepoError> {
            let tx = self.pool.begin().await.map_err(RepoError::from)?;
            Ok(SqliteLabelledTransaction {
                svc: self.svc,
                api: self.api,
                tx,
            })
        }

        fn record<R>(
            &self,
            start: Instant,
            result: Result<R, sqlx::Error>,
        ) -> Result<R, RepoError> {
            record_db_query("sqlite", self.svc, self.api, start.elapsed(), result.is_ok());
            result.map_err(|err| {
                tracing::error!(svc = self.svc, api = self.api, "DB query failed: {err}");
                err.into()
            })
        }
    }

    pub struct SqliteLabelledTransaction {
        svc: &'static str,
        api: &'static str,
        tx: Transaction<'static, Sqlite>,
    }

    impl SqliteLabelledTransaction {
        pub async fn execute<'q>(
            &mut self,
            query: Query<'q, Sqlite, SqliteArguments<'q>>,
        ) -> Result<SqliteQueryResult, RepoError> {
            let start = Instant::now();
            let result = query.execute(&mut *self.tx).await;
            self.record(start, result)
        }

        pub async fn fetch_one_as<'q, T>(
            &mut self,
            query: QueryAs<'q, Sqlite, T, SqliteArguments<'q>>,
        ) -> Result<T, RepoError>
        where
            T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        {
            let start = Instant::now();
            let result = query.fetch_one(&mut *self.tx).await;
            self.record(start, result)
        }

        pub async fn fetch_optional_as<'q, T>(
            &mut self,
            query: QueryAs<'q, Sqlite, T, SqliteArguments<'q>>,
        ) -> Result<Option<T>, RepoError>
        where
            T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        {
            let start = Instant::now();
            let result = query.fetch_optional(&mut *self.tx).await;
            self.record(start, result)
        }

        pub async fn commit(self) -> Result<(), RepoError> {
            self.tx.commit().await.map_err(RepoError::from)
        }

        pub async fn rollback(self) -> Result<(), RepoError> {
            self.tx.rollback().await.map_err(RepoError::from)
        }

        fn record<R>(
            &self,
            start: Instant,
            result: Result<R, sqlx::Error>,
        ) -> Result<R, RepoError> {
            record_db_query("sqlite", self.svc, self.api, start.elapsed(), result.is_ok());
            result.map_err(|err| {
                tracing::error!(svc = self.svc, api = self.api, "DB query failed: {err}");
                err.into()
            })
        }
    }
}
