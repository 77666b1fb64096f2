//! dblink CLI - inspect, page through and migrate a database over one link.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use dblink::core::identifier::split_qualified;
use dblink::core::{ColumnMeta, Cursor, Row};
use dblink::paging::PageSource;
use dblink::{
    CachedScroller, CallResult, Config, DataLink, DbError, DescribeOptions, DriverCatalog,
    Introspector, Migrator, Pager, SqlValue, Table, TableInfo, TableKind,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "dblink")]
#[command(about = "Inspect, page through and migrate a database")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "dblink.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tables, views and other relations in the configured schema
    Tables {
        /// Kinds to list, comma separated: table, view, other (default: all)
        #[arg(long, value_delimiter = ',')]
        types: Vec<TableKind>,
    },

    /// Describe columns, keys and optionally indices of tables
    Describe {
        /// Table names, optionally schema-qualified
        #[arg(required = true)]
        tables: Vec<String>,

        /// Include unique and normal indices
        #[arg(long)]
        indices: bool,

        /// Count rows of each table
        #[arg(long)]
        row_count: bool,
    },

    /// Show foreign keys referencing the given tables
    Relationships {
        /// Referenced table names
        #[arg(required = true)]
        tables: Vec<String>,
    },

    /// Bring live tables in line with a YAML list of desired tables
    Sync {
        /// YAML file holding a list of table definitions
        #[arg(long)]
        desired: PathBuf,

        /// Print the statements without running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Print one page of a query's result
    Page {
        /// Query to page through
        #[arg(long)]
        query: String,

        /// Rows per page (default: paging.page_size from the config)
        #[arg(long)]
        page_size: Option<usize>,

        /// Zero-based page index
        #[arg(long, default_value = "0")]
        page: i64,
    },

    /// Scroll through a query's result window by window
    Scroll {
        /// Query to scroll through
        #[arg(long)]
        query: String,

        /// First row of the first window; negative counts from the end
        /// when paging.allow_negative_rows is set
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        start: i64,

        /// Number of windows to show
        #[arg(long, default_value = "1")]
        windows: usize,
    },

    /// Call a stored procedure with positional arguments
    Call {
        /// Procedure name, optionally schema-qualified
        procedure: String,

        /// Argument values; integers, decimals and `null` are recognized
        args: Vec<String>,
    },

    /// Test the database connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), DbError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let catalog = DriverCatalog::with_builtins();
    let mut link = catalog.create_link(&config.data_source)?;
    let cancel_token = setup_signal_handler();

    let result = dispatch(
        cli.command,
        cli.output_json,
        &config,
        &catalog,
        &mut link,
        &cancel_token,
    )
    .await;

    if let Err(e) = link.close().await {
        warn!("Closing connection failed: {}", e);
    }
    result
}

async fn dispatch(
    command: Commands,
    output_json: bool,
    config: &Config,
    catalog: &DriverCatalog,
    link: &mut DataLink,
    cancel: &CancellationToken,
) -> Result<(), DbError> {
    let dialect = catalog.dialect_for(config)?;
    let schema = config.data_source.schema.clone();

    match command {
        Commands::Tables { types } => {
            let tables = Introspector::new(link, dialect.as_ref(), schema)
                .list_tables(&types, cancel)
                .await?;
            if output_json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                for table in &tables {
                    println!("{:<8} {}", format!("{:?}", table.kind).to_lowercase(), table.full_name());
                }
                println!("\n{} relations", tables.len());
            }
        }

        Commands::Describe {
            tables,
            indices,
            row_count,
        } => {
            let infos = table_infos(&tables, &schema);
            let report = Introspector::new(link, dialect.as_ref(), schema)
                .describe_tables(&infos, DescribeOptions { indices, row_count })
                .await;

            if output_json {
                println!("{}", serde_json::to_string_pretty(&report.tables)?);
            } else {
                for table in &report.tables {
                    print_table(table);
                }
                for (name, reason) in &report.skipped {
                    println!("Skipped {}: {}", name, reason);
                }
            }
            if report.tables.is_empty() && !report.skipped.is_empty() {
                return Err(DbError::introspection(
                    report.skipped[0].0.clone(),
                    "no table could be described",
                ));
            }
        }

        Commands::Relationships { tables } => {
            let infos = table_infos(&tables, &schema);
            let relationships = Introspector::new(link, dialect.as_ref(), schema)
                .derive_relationships(&infos)
                .await?;
            if output_json {
                println!("{}", serde_json::to_string_pretty(&relationships)?);
            } else {
                for rel in &relationships {
                    let pairs: Vec<String> = rel
                        .columns
                        .iter()
                        .map(|(pk, fk)| format!("{}.{} <- {}.{}", rel.pk_table, pk, rel.fk_table, fk))
                        .collect();
                    println!("{}: {}", rel.name, pairs.join(", "));
                }
            }
        }

        Commands::Sync { desired, dry_run } => {
            let content = std::fs::read_to_string(&desired)?;
            let mut desired_tables: Vec<Table> = serde_yaml::from_str(&content)?;
            for table in &mut desired_tables {
                if table.schema.is_empty() {
                    table.schema = schema.clone();
                }
            }

            let set = Introspector::new(link, dialect.as_ref(), schema.clone())
                .pair_changes(desired_tables, cancel)
                .await?;
            let mut migrator =
                Migrator::new(link, dialect.as_ref()).case_sensitive(config.schema.case_sensitive);

            if dry_run {
                let statements = migrator.plan(&set.changes).await?;
                if output_json {
                    let value = serde_json::json!({
                        "statements": statements,
                        "skipped": set.skipped,
                    });
                    println!("{}", serde_json::to_string_pretty(&value)?);
                } else {
                    for statement in &statements {
                        println!("{};\n", statement);
                    }
                    println!("{} statements planned", statements.len());
                    for (table, reason) in &set.skipped {
                        println!("Skipped {}: {}", table, reason);
                    }
                }
                return Ok(());
            }

            let report = migrator.synchronize_set(set).await?;
            if output_json {
                let value = serde_json::json!({
                    "statements_issued": report.statements_issued,
                    "tables_changed": report.tables_changed,
                    "tables_unchanged": report.tables_unchanged,
                    "failed": report.failed,
                    "skipped": report.skipped,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Schema sync completed");
                println!("  Statements: {}", report.statements_issued);
                println!("  Tables changed: {}", report.tables_changed);
                println!("  Tables unchanged: {}", report.tables_unchanged);
                for (table, error) in &report.failed {
                    println!("  Failed {}: {}", table, error);
                }
                for (table, reason) in &report.skipped {
                    println!("  Skipped {}: {}", table, reason);
                }
            }
            if !report.failed.is_empty() {
                return Err(DbError::Driver(format!(
                    "{} table(s) failed to synchronize",
                    report.failed.len()
                )));
            }
        }

        Commands::Page {
            query,
            page_size,
            page,
        } => {
            let page_size = page_size.unwrap_or(config.paging.page_size);
            let mut pager = Pager::open(link, &query, &[], page_size).await?;
            let result = pager.goto_page(page).await;
            let columns = pager.columns().to_vec();
            let total = pager.total_rows();
            let max_page = pager.max_page_index();
            pager.close().await?;
            let rows = result?;

            if output_json {
                let value = serde_json::json!({
                    "page": page,
                    "max_page_index": max_page,
                    "total_rows": total,
                    "start_row": rows.start,
                    "columns": columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                    "rows": rows.rows,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_rows(&columns, &rows.rows);
                println!("\nPage {} of {} ({} rows total)", page, max_page, total);
            }
        }

        Commands::Scroll {
            query,
            start,
            windows,
        } => {
            let mut scroller = CachedScroller::open(link, &query, &[], &config.paging).await?;
            let columns = scroller.inner().columns().to_vec();
            scroller.set_position(start);
            let result = scroll_windows(&mut scroller, windows).await;
            let stats = scroller.stats().await;
            scroller.close().await?;
            let pages = result?;
            info!(
                "Page cache: {} hits, {} misses, {} evictions",
                stats.hits, stats.misses, stats.evictions
            );

            if output_json {
                let value = serde_json::json!({
                    "columns": columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                    "windows": pages
                        .iter()
                        .map(|p| serde_json::json!({ "start": p.start, "rows": p.rows }))
                        .collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                for page in &pages {
                    println!("-- rows from {} --", page.start);
                    print_rows(&columns, &page.rows);
                }
            }
        }

        Commands::Call { procedure, args } => {
            let mut descriptor = Introspector::new(link, dialect.as_ref(), schema)
                .describe_procedure(&procedure)
                .await?;
            let values: Vec<SqlValue> = args.iter().map(String::as_str).map(parse_arg).collect();
            let result = link.call(descriptor.bind().args(values)).await?;

            let outputs: Vec<(String, SqlValue)> = descriptor
                .params
                .iter()
                .filter(|p| p.direction.is_output())
                .map(|p| (p.name.clone(), p.value.clone()))
                .collect();

            match result {
                CallResult::None => {
                    if !output_json {
                        println!("{} completed", descriptor.name);
                    }
                    print_outputs(&outputs, output_json)?;
                }
                CallResult::Scalar(value) => {
                    if output_json {
                        println!("{}", serde_json::to_string_pretty(&value)?);
                    } else {
                        println!("{}", value);
                    }
                    print_outputs(&outputs, output_json)?;
                }
                CallResult::Cursor(mut cursor) => {
                    let columns = cursor.columns().to_vec();
                    let batch = config.paging.page_size.max(1);
                    let mut rows = Vec::new();
                    loop {
                        let fetched = cursor.fetch(batch).await?;
                        let done = fetched.len() < batch;
                        rows.extend(fetched);
                        if done {
                            break;
                        }
                    }
                    cursor.close().await?;
                    if output_json {
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    } else {
                        print_rows(&columns, &rows);
                    }
                }
            }
        }

        Commands::HealthCheck => {
            let started = Instant::now();
            let result = link.ping().await;
            let latency_ms = started.elapsed().as_millis() as u64;

            if output_json {
                let value = serde_json::json!({
                    "data_source": link.name(),
                    "connected": result.is_ok(),
                    "latency_ms": latency_ms,
                    "error": result.as_ref().err().map(|e| e.to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  {} ({}): {} ({}ms)",
                    link.name(),
                    config.data_source.r#type,
                    if result.is_ok() { "OK" } else { "FAILED" },
                    latency_ms
                );
                if let Err(ref e) = result {
                    println!("    Error: {}", e);
                }
            }
            result?;
        }
    }

    Ok(())
}

/// The current window, then up to `windows - 1` following ones.
async fn scroll_windows<S: PageSource>(
    source: &mut S,
    windows: usize,
) -> Result<Vec<std::sync::Arc<dblink::Page>>, DbError> {
    let mut pages = Vec::with_capacity(windows);
    if windows == 0 {
        return Ok(pages);
    }
    pages.push(source.current().await?);
    while pages.len() < windows {
        match source.next().await? {
            Some(page) => pages.push(page),
            None => break,
        }
    }
    Ok(pages)
}

fn table_infos(names: &[String], default_schema: &str) -> Vec<TableInfo> {
    names
        .iter()
        .map(|name| {
            let (schema, table) = split_qualified(name);
            TableInfo {
                schema: (if schema.is_empty() { default_schema } else { schema }).to_string(),
                name: table.to_string(),
                kind: TableKind::Table,
            }
        })
        .collect()
}

/// Integers, decimals and `null` become typed values; anything else is text.
fn parse_arg(arg: &str) -> SqlValue {
    if arg.eq_ignore_ascii_case("null") {
        return SqlValue::Null;
    }
    if let Ok(v) = arg.parse::<i64>() {
        return SqlValue::I64(v);
    }
    if let Ok(v) = arg.parse::<f64>() {
        return SqlValue::F64(v);
    }
    SqlValue::Text(arg.to_string())
}

fn print_table(table: &Table) {
    println!("{}", table.full_name());
    for column in &table.columns {
        let size = match (column.length, column.scale) {
            (l, _) if l <= 0 => String::new(),
            (l, 0) => format!("({})", l),
            (l, s) => format!("({},{})", l, s),
        };
        let mut line = format!("  {:<24} {}{}", column.name, column.sql_type, size);
        if !column.nullable {
            line.push_str(" NOT NULL");
        }
        if column.auto_increment {
            line.push_str(" AUTO_INCREMENT");
        }
        if let Some(default) = &column.default {
            line.push_str(&format!(" DEFAULT {}", default.to_sql()));
        }
        println!("{}", line);
    }
    for index in &table.indexes {
        println!("  {:?} {} ({})", index.kind, index.name, index.columns.join(", "));
    }
    if let Some(count) = table.row_count {
        println!("  {} rows", count);
    }
    println!();
}

fn print_rows(columns: &[ColumnMeta], rows: &[Row]) {
    let header: Vec<&str> = columns.iter().map(|c| c.label.as_str()).collect();
    println!("{}", header.join("\t"));
    for row in rows {
        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        println!("{}", cells.join("\t"));
    }
}

fn print_outputs(outputs: &[(String, SqlValue)], output_json: bool) -> Result<(), DbError> {
    if outputs.is_empty() {
        return Ok(());
    }
    if output_json {
        println!("{}", serde_json::to_string_pretty(outputs)?);
    } else {
        for (name, value) in outputs {
            println!("  {} = {}", name, value);
        }
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, label) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping...", label);
                    token.cancel();
                });
            }
            Err(e) => warn!("Failed to install {} handler: {}", label, e),
        }
    }

    cancel_token
}

/// Cancel the returned token on Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping...");
            token.cancel();
        }
    });

    cancel_token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arg_types() {
        assert_eq!(parse_arg("42"), SqlValue::I64(42));
        assert_eq!(parse_arg("1.5"), SqlValue::F64(1.5));
        assert_eq!(parse_arg("NULL"), SqlValue::Null);
        assert_eq!(parse_arg("abc"), SqlValue::Text("abc".into()));
    }

    #[test]
    fn test_table_infos_apply_default_schema() {
        let infos = table_infos(&["users".into(), "audit.events".into()], "public");
        assert_eq!(infos[0].full_name(), "public.users");
        assert_eq!(infos[1].full_name(), "audit.events");
    }
}
