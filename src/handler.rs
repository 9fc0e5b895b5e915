use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backend::ConnectionPool;
use crate::classify::ErrorClassifier;
use crate::config::PluginConfig;
use crate::convert::ConverterRegistry;
use crate::error::{DomainError, HanaframeError};
use crate::logging::Timer;
use crate::macro_engine::{self, HanaDialect, MacroDialect};
use crate::materialize::{self, Interrupt, ResultTable, RowLimit};

pub use crate::macro_engine::TimeRange;

/// One logical query: SQL with macros, the dashboard time range and interval.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub sql: String,
    pub time_range: TimeRange,
    pub interval: Duration,
    /// Zero or `None` falls back to the configured limit.
    pub row_limit: Option<usize>,
    pub cancel: Option<CancellationToken>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>, time_range: TimeRange, interval: Duration) -> Self {
        Self {
            sql: sql.into(),
            time_range,
            interval,
            row_limit: None,
            cancel: None,
        }
    }

    pub fn with_row_limit(mut self, limit: usize) -> Self {
        self.row_limit = Some(limit);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Per-request lifecycle. Nothing is retried; a failure in any stage ends the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Idle,
    Expanding,
    Executing,
    Materializing,
    Done,
    Failed,
}

/// Runs queries against a shared pool. Holds no per-request state, so one
/// handler can serve concurrent callers.
pub struct QueryHandler<P, D = HanaDialect> {
    pool: Arc<P>,
    registry: Arc<ConverterRegistry>,
    classifier: ErrorClassifier,
    config: PluginConfig,
    dialect: D,
    query_timeout: Option<Duration>,
}

impl<P: ConnectionPool> QueryHandler<P, HanaDialect> {
    pub fn new(pool: Arc<P>, registry: Arc<ConverterRegistry>, config: PluginConfig) -> Self {
        Self::with_dialect(pool, registry, config, HanaDialect)
    }
}

impl<P: ConnectionPool, D: MacroDialect> QueryHandler<P, D> {
    pub fn with_dialect(
        pool: Arc<P>,
        registry: Arc<ConverterRegistry>,
        config: PluginConfig,
        dialect: D,
    ) -> Self {
        let classifier = ErrorClassifier::new(config.error_messages.clone());
        Self {
            pool,
            registry,
            classifier,
            config,
            dialect,
            query_timeout: None,
        }
    }

    /// Deadline covering execution and materialization of each request.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout).filter(|t| !t.is_zero());
        self
    }

    /// Expand, execute and materialize. Every failure is classified exactly once.
    pub fn run(&self, request: &QueryRequest) -> Result<ResultTable, DomainError> {
        let timer = Timer::start();
        let mut stage = QueryStage::Idle;

        match self.execute(request, &mut stage, &timer) {
            Ok(table) => {
                tracing::debug!(
                    stage = ?QueryStage::Done,
                    rows = table.row_count(),
                    elapsed_ms = timer.elapsed_ms() as u64,
                    "query finished"
                );
                Ok(table)
            }
            Err(err) => {
                let classified = self.classifier.classify(&err);
                tracing::error!(
                    stage = ?QueryStage::Failed,
                    failed_in = ?stage,
                    kind = ?classified.kind,
                    code = classified.code,
                    error = %classified.verbose_message,
                    elapsed_ms = timer.elapsed_ms() as u64,
                    "query failed"
                );
                Err(classified)
            }
        }
    }

    fn execute(
        &self,
        request: &QueryRequest,
        stage: &mut QueryStage,
        timer: &Timer,
    ) -> Result<ResultTable, HanaframeError> {
        *stage = QueryStage::Expanding;
        let sql = macro_engine::expand(
            &request.sql,
            &request.time_range,
            request.interval,
            &self.dialect,
        )?;
        tracing::debug!(stage = ?stage, elapsed_ms = timer.elapsed_ms() as u64, sql = %sql, "macros expanded");

        let limit = RowLimit::resolve(request.row_limit, self.config.row_limit);
        let interrupt = Interrupt::new(request.cancel.clone(), self.query_timeout);
        interrupt.check()?;

        *stage = QueryStage::Executing;
        tracing::debug!(stage = ?stage, limit = limit.get(), "executing");
        self.pool
            .with_cursor(&sql, interrupt.remaining_secs(), |cursor| {
                *stage = QueryStage::Materializing;
                tracing::debug!(
                    stage = ?QueryStage::Materializing,
                    columns = cursor.columns().len(),
                    elapsed_ms = timer.elapsed_ms() as u64,
                    "cursor open"
                );
                materialize::materialize(cursor, &self.registry, limit, &interrupt)
            })
    }
}
