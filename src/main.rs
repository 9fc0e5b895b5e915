use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::Parser;
use hanaframe::backend::hana::HanaPool;
use hanaframe::classify::ErrorClassifier;
use hanaframe::cli::{Cli, Command, HealthArgs, QueryArgs};
use hanaframe::convert::ConverterRegistry;
use hanaframe::handler::{QueryHandler, QueryRequest, TimeRange};
use hanaframe::health::{HealthProber, Privilege};
use hanaframe::logging::{self, Timer};
use hanaframe::materialize::RowLimit;
use hanaframe::{config, format, macro_engine, output};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Request interval used when `--interval auto` is given.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Load .env file (optional, ignore if missing)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logging::init(cli.verbose);

    let code = match cli.command {
        Command::Query(ref args) => query(args, cli.verbose, cli.config.as_ref()).await,
        Command::Health(ref args) => health(args, cli.verbose, cli.config.as_ref()).await,
    };
    process::exit(code);
}

async fn query(args: &QueryArgs, verbose: bool, config_path: Option<&PathBuf>) -> i32 {
    let app_config = match config::load(
        &args.connection,
        args.limit,
        args.timeout,
        verbose,
        config_path,
    ) {
        Ok(c) => c,
        Err(err) => return setup_failure(err),
    };

    let request = match build_request(args, Utc::now()) {
        Ok(r) => r,
        Err(err) => return setup_failure(format!("{err:#}")),
    };
    let limit = RowLimit::resolve(request.row_limit, app_config.plugin.row_limit);

    let pool = Arc::new(HanaPool::new(&app_config.datasource));
    let handler = QueryHandler::new(
        pool,
        Arc::new(ConverterRegistry::hana()),
        app_config.plugin.clone(),
    )
    .with_query_timeout(Duration::from_secs(app_config.query_timeout_secs));

    let cancel = CancellationToken::new();
    let request = request.with_cancel(cancel.clone());
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watcher.cancel();
        }
    });

    tracing::debug!(url = %app_config.datasource.url, "running query");
    let timer = Timer::start();
    let result = tokio::task::spawn_blocking(move || handler.run(&request)).await;
    cancel.cancel();

    let table = match result {
        Ok(Ok(table)) => table,
        Ok(Err(err)) => {
            output::print_error(&err);
            return 1;
        }
        Err(join) => return setup_failure(format!("query task failed: {join}")),
    };
    tracing::debug!(
        rows = table.row_count(),
        elapsed_ms = timer.elapsed_ms() as u64,
        "query complete"
    );

    if let Some(message) = output::truncation_message(&table, limit) {
        output::print_truncation_warning(&message);
    }
    match format::to_json(&table) {
        Ok(rendered) => {
            output::print_result(&rendered);
            0
        }
        Err(err) => setup_failure(err),
    }
}

async fn health(args: &HealthArgs, verbose: bool, config_path: Option<&PathBuf>) -> i32 {
    let app_config = match config::load(&args.connection, None, None, verbose, config_path) {
        Ok(c) => c,
        Err(err) => return setup_failure(err),
    };

    let pool = Arc::new(HanaPool::new(&app_config.datasource));
    let prober = HealthProber::new(
        pool,
        ErrorClassifier::new(app_config.plugin.error_messages.clone()),
        &app_config.datasource,
    );
    let privilege = Privilege::from_role(&args.role);

    let status = match tokio::task::spawn_blocking(move || prober.probe(privilege)).await {
        Ok(status) => status,
        Err(join) => return setup_failure(format!("health task failed: {join}")),
    };

    match format::health_to_json(&status) {
        Ok(rendered) => output::print_result(&rendered),
        Err(err) => return setup_failure(err),
    }
    if status.is_ok() { 0 } else { 1 }
}

fn setup_failure(err: impl std::fmt::Display) -> i32 {
    output::print_setup_error(&err.to_string());
    1
}

// --- Helpers ---

fn build_request(args: &QueryArgs, now: DateTime<Utc>) -> anyhow::Result<QueryRequest> {
    let sql = resolve_sql(args)?;
    let from = parse_time(&args.from, now).context("invalid --from")?;
    let to = parse_time(&args.to, now).context("invalid --to")?;
    if from > to {
        bail!("--from must not be after --to");
    }
    let interval = macro_engine::parse_interval(&args.interval, DEFAULT_INTERVAL)
        .context("invalid --interval")?;

    let mut request = QueryRequest::new(sql, TimeRange::new(from, to), interval);
    request.row_limit = args.limit;
    Ok(request)
}

fn resolve_sql(args: &QueryArgs) -> anyhow::Result<String> {
    if let Some(ref sql) = args.sql {
        return Ok(sql.clone());
    }
    if let Some(ref path) = args.sql_file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("cannot read SQL file {}", path.display()));
    }
    bail!("no SQL provided (use positional argument or --file)")
}

/// `now`, `now-<interval>` or an RFC 3339 timestamp.
fn parse_time(input: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let input = input.trim();
    if input == "now" {
        return Ok(now);
    }
    if let Some(offset) = input.strip_prefix("now-") {
        let offset = macro_engine::parse_interval(offset, DEFAULT_INTERVAL)?;
        let offset = chrono::Duration::from_std(offset)?;
        return now
            .checked_sub_signed(offset)
            .context("time offset out of range");
    }
    Ok(DateTime::parse_from_rfc3339(input)?.with_timezone(&Utc))
}
