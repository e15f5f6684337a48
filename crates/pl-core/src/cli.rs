//! Command-line interface for the `playlog` binary.
//!
//! Provides schema, provision, teardown, consolidate, ingest, query, and
//! stats subcommands over a directory-backed keyspace.

use crate::catalog::{
    create_keyspace_cql, create_table_cql, drop_keyspace_cql, drop_table_cql, insert_cql, Catalog,
};
use crate::collect::{consolidate, discover_files, CollectError};
use crate::exit_codes::ExitCode;
use crate::ingest::Ingestor;
use crate::logging::{command_span, LogFormat};
use crate::query::{Query, QueryResolver, QueryResult};
use arrow::array::{ArrayRef, StringArray, UInt64Array};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use clap::{Args, Parser, Subcommand};
use pl_common::{Error, OutputFormat, Result, SCHEMA_VERSION};
use pl_config::{
    resolve_config, ConfigOverrides, ConfigPaths, ConfigSource, PlayLogConfig, RowPolicy,
};
use pl_storage::{DirectoryStore, Replication, StoreGateway};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Load play-event logs into query-optimized tables and answer the
/// canonical questions.
#[derive(Parser, Debug)]
#[command(name = "playlog", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Config file (JSON); falls back to PLAYLOG_CONFIG, then the user config dir
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Root directory of the store
    #[arg(long, global = true, env = "PLAYLOG_DATA_DIR", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Keyspace holding the tables
    #[arg(long, global = true, env = "PLAYLOG_KEYSPACE")]
    pub keyspace: Option<String>,

    /// Output format for command results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Log line format (logs go to stderr)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print keyspace and table statements
    Schema,
    /// Recreate the keyspace and its tables from scratch
    Provision,
    /// Drop the tables
    Teardown {
        /// Drop the keyspace as well
        #[arg(long)]
        drop_keyspace: bool,
    },
    /// Merge raw event files into one projected CSV
    Consolidate {
        /// Directory of raw event files
        #[arg(long, env = "PLAYLOG_INPUT_DIR", value_name = "DIR")]
        input: Option<PathBuf>,
        /// Consolidated CSV to write
        #[arg(long, env = "PLAYLOG_FULL_CSV", value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Load events into every table
    Ingest {
        /// CSV file or directory of CSV files (default: the consolidated CSV)
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,
        /// What to do with rows that fail validation
        #[arg(long, value_enum)]
        on_malformed: Option<RowPolicy>,
    },
    /// Answer one of the canonical questions
    #[command(subcommand)]
    Query(QueryCommand),
    /// Row counts per table
    Stats,
}

#[derive(Subcommand, Debug, Clone)]
pub enum QueryCommand {
    /// Artist, title, and length of the song at a session position
    Q1 {
        #[arg(long, default_value_t = 338)]
        session_id: i32,
        #[arg(long, default_value_t = 4)]
        item_in_session: i32,
    },
    /// Songs a user played in a session, in play order
    Q2 {
        #[arg(long, default_value_t = 10)]
        user_id: i32,
        #[arg(long, default_value_t = 182)]
        session_id: i32,
    },
    /// Everyone who played a song
    Q3 {
        #[arg(long, default_value = "All Hands Against His Own")]
        song_title: String,
    },
}

impl From<QueryCommand> for Query {
    fn from(cmd: QueryCommand) -> Self {
        match cmd {
            QueryCommand::Q1 {
                session_id,
                item_in_session,
            } => Query::SongInSession {
                session_id,
                item_in_session,
            },
            QueryCommand::Q2 {
                user_id,
                session_id,
            } => Query::UserSession {
                user_id,
                session_id,
            },
            QueryCommand::Q3 { song_title } => Query::SongListeners { song_title },
        }
    }
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Schema => "schema",
            Commands::Provision => "provision",
            Commands::Teardown { .. } => "teardown",
            Commands::Consolidate { .. } => "consolidate",
            Commands::Ingest { .. } => "ingest",
            Commands::Query(_) => "query",
            Commands::Stats => "stats",
        }
    }
}

/// Resolved configuration plus the output format of this invocation.
struct Context {
    config: PlayLogConfig,
    format: OutputFormat,
    catalog: Catalog,
}

impl Context {
    fn replication(&self) -> Replication {
        Replication {
            strategy: self.config.store.replication_strategy.clone(),
            factor: self.config.store.replication_factor.clone(),
        }
    }

    /// Open the provisioned keyspace, warning on a layout mismatch.
    fn open_store(&self) -> Result<DirectoryStore> {
        let store = DirectoryStore::open(&self.config.store.data_dir, &self.config.store.keyspace)?;
        let expected = self.catalog.fingerprint();
        match store.manifest().catalog_fingerprint.as_deref() {
            Some(found) if found != expected => warn!(
                keyspace = store.keyspace(),
                found,
                expected = %expected,
                "keyspace was provisioned from a different table layout"
            ),
            _ => {}
        }
        Ok(store)
    }

    fn emit(&self, json: serde_json::Value, table: impl FnOnce() -> Result<String>) -> Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json)?),
            OutputFormat::Table => println!("{}", table()?),
        }
        Ok(())
    }
}

/// Run one parsed invocation.
pub fn run(cli: Cli) -> Result<ExitCode> {
    let overrides = ConfigOverrides {
        data_dir: cli.global.data_dir.clone(),
        keyspace: cli.global.keyspace.clone(),
        ..Default::default()
    };
    let (config, source) = resolve_config(&ConfigPaths::from_env(cli.global.config.clone()), overrides)?;
    if let ConfigSource::Defaults = source {
        info!("no config file found, using defaults");
    }

    let ctx = Context {
        config,
        format: cli.global.format,
        catalog: Catalog::standard(),
    };
    let span = command_span(cli.command.name(), &ctx.config.store.keyspace);
    let _guard = span.enter();

    match cli.command {
        Commands::Schema => schema(&ctx),
        Commands::Provision => provision(&ctx),
        Commands::Teardown { drop_keyspace } => teardown(&ctx, drop_keyspace),
        Commands::Consolidate { input, output } => run_consolidate(&ctx, input, output),
        Commands::Ingest {
            input,
            on_malformed,
        } => ingest(&ctx, input, on_malformed),
        Commands::Query(cmd) => query(&ctx, cmd.into()),
        Commands::Stats => stats(&ctx),
    }
}

fn schema(ctx: &Context) -> Result<ExitCode> {
    let store = &ctx.config.store;
    let keyspace = create_keyspace_cql(
        &store.keyspace,
        &store.replication_strategy,
        &store.replication_factor,
    );
    let queries: Vec<(&'static str, String)> = Query::canonical()
        .iter()
        .map(|q| (q.label(), q.cql()))
        .collect();

    let json = json!({
        "schema_version": SCHEMA_VERSION,
        "keyspace": {
            "create": keyspace,
            "drop": drop_keyspace_cql(&store.keyspace),
        },
        "catalog_fingerprint": ctx.catalog.fingerprint(),
        "tables": ctx.catalog.schemas().iter().map(|s| json!({
            "name": s.name,
            "partition_key": s.partition_key,
            "clustering_key": s.clustering_key,
            "columns": s.columns,
            "create": create_table_cql(s),
            "drop": drop_table_cql(&s.name),
            "insert": insert_cql(s),
        })).collect::<Vec<_>>(),
        "queries": queries.iter().map(|(label, cql)| json!({
            "query": label,
            "select": cql,
        })).collect::<Vec<_>>(),
    });

    ctx.emit(json, || {
        let mut out = vec![keyspace.clone()];
        out.extend(ctx.catalog.create_statements());
        out.extend(ctx.catalog.insert_statements());
        out.extend(queries.iter().map(|(label, cql)| format!("-- {label}\n{cql}")));
        Ok(out.join("\n\n"))
    })?;
    Ok(ExitCode::Clean)
}

fn provision(ctx: &Context) -> Result<ExitCode> {
    let store_cfg = &ctx.config.store;
    DirectoryStore::drop_keyspace(&store_cfg.data_dir, &store_cfg.keyspace)?;
    DirectoryStore::create_keyspace(&store_cfg.data_dir, &store_cfg.keyspace, ctx.replication())?;

    let mut store = DirectoryStore::open(&store_cfg.data_dir, &store_cfg.keyspace)?;
    ctx.catalog.drop_all(&mut store)?;
    ctx.catalog.create_all(&mut store)?;
    store.set_catalog_fingerprint(&ctx.catalog.fingerprint())?;
    let tables = store.table_names();
    store.close()?;
    info!(keyspace = %store_cfg.keyspace, tables = tables.len(), "keyspace provisioned");

    ctx.emit(
        json!({
            "schema_version": SCHEMA_VERSION,
            "keyspace": store_cfg.keyspace,
            "data_dir": store_cfg.data_dir,
            "tables": tables,
        }),
        || {
            Ok(format!(
                "provisioned keyspace {} with tables: {}",
                store_cfg.keyspace,
                tables.join(", ")
            ))
        },
    )?;
    Ok(ExitCode::Clean)
}

fn teardown(ctx: &Context, drop_keyspace: bool) -> Result<ExitCode> {
    let store_cfg = &ctx.config.store;
    let mut store = ctx.open_store()?;
    ctx.catalog.drop_all(&mut store)?;
    store.close()?;
    if drop_keyspace {
        DirectoryStore::drop_keyspace(&store_cfg.data_dir, &store_cfg.keyspace)?;
    }

    ctx.emit(
        json!({
            "schema_version": SCHEMA_VERSION,
            "keyspace": store_cfg.keyspace,
            "dropped_tables": ctx.catalog.table_names().collect::<Vec<_>>(),
            "dropped_keyspace": drop_keyspace,
        }),
        || {
            let mut line = format!("dropped tables in keyspace {}", store_cfg.keyspace);
            if drop_keyspace {
                line.push_str(" and the keyspace itself");
            }
            Ok(line)
        },
    )?;
    Ok(ExitCode::Clean)
}

fn run_consolidate(
    ctx: &Context,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let input = input.unwrap_or_else(|| ctx.config.ingest.data_directory.clone());
    let output = output.unwrap_or_else(|| ctx.config.ingest.consolidated_csv.clone());

    let files = discover_files(&input)?;
    if files.is_empty() {
        return Err(CollectError::NoInput(input).into());
    }
    let report = consolidate(&files, &ctx.config.mapping, &output)?;

    ctx.emit(
        json!({ "schema_version": SCHEMA_VERSION, "consolidate": report }),
        || {
            Ok(format!(
                "{} rows from {} files written to {} ({} without artist dropped)",
                report.written,
                report.files,
                report.output.display(),
                report.discarded
            ))
        },
    )?;
    Ok(ExitCode::Clean)
}

fn ingest(ctx: &Context, input: Option<PathBuf>, on_malformed: Option<RowPolicy>) -> Result<ExitCode> {
    let input = input.unwrap_or_else(|| ctx.config.ingest.consolidated_csv.clone());
    let policy = on_malformed.unwrap_or(ctx.config.ingest.on_malformed);

    let files = discover_files(&input)?;
    if files.is_empty() {
        return Err(CollectError::NoInput(input).into());
    }

    let mut store = ctx.open_store()?;
    let report = Ingestor::new(&ctx.catalog, policy).ingest_files(&mut store, &files, &ctx.config.mapping)?;
    store.close()?;

    ctx.emit(
        json!({ "schema_version": SCHEMA_VERSION, "ingest": report }),
        || {
            Ok(format!(
                "run {}: {} events from {} records in {} files ({} writes, {} discarded, {} malformed)",
                report.run_id,
                report.events,
                report.records,
                report.files,
                report.writes,
                report.discarded,
                report.malformed
            ))
        },
    )?;

    Ok(if report.malformed > 0 {
        ExitCode::RowsSkipped
    } else {
        ExitCode::Clean
    })
}

fn query(ctx: &Context, query: Query) -> Result<ExitCode> {
    let store = ctx.open_store()?;
    let result: QueryResult = QueryResolver::new(&store, &ctx.catalog).resolve(&query)?;
    store.close()?;

    ctx.emit(
        json!({
            "schema_version": SCHEMA_VERSION,
            "query": result.query,
            "table": result.table,
            "cql": query.cql(),
            "rows": result.rows_json(),
        }),
        || result.render_table().map_err(render_error),
    )?;
    Ok(ExitCode::Clean)
}

fn stats(ctx: &Context) -> Result<ExitCode> {
    let store = ctx.open_store()?;
    let mut counts = Vec::new();
    for table in ctx.catalog.table_names() {
        counts.push((table.to_string(), store.row_count(table)? as u64));
    }
    store.close()?;

    ctx.emit(
        json!({
            "schema_version": SCHEMA_VERSION,
            "keyspace": ctx.config.store.keyspace,
            "tables": counts.iter().map(|(table, rows)| json!({"table": table, "rows": rows})).collect::<Vec<_>>(),
        }),
        || {
            let names = StringArray::from_iter_values(counts.iter().map(|(t, _)| t.as_str()));
            let rows = UInt64Array::from_iter_values(counts.iter().map(|(_, n)| *n));
            let batch = RecordBatch::try_from_iter([
                ("table", Arc::new(names) as ArrayRef),
                ("rows", Arc::new(rows) as ArrayRef),
            ])
            .map_err(render_error)?;
            Ok(pretty_format_batches(&[batch]).map_err(render_error)?.to_string())
        },
    )?;
    Ok(ExitCode::Clean)
}

fn render_error(err: arrow::error::ArrowError) -> Error {
    Error::Io(std::io::Error::other(err))
}
