//! Command-line front end over a JSON-lines-backed table.
//!
//! State lives in a data directory: `schema.json` (table schema),
//! `indexes.json` (registered secondary indexes), and `table.jsonl` (the
//! append-only write log). Every invocation replays the log into memory,
//! re-registers the indexes, and waits for their backfills before serving
//! the requested operation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use strata_core::{
    IndexSchema, Item, KeyDefinition, KeyType, KeyValue, Projection, QueryRequest, SortPredicate,
    TableSchema, Value,
};
use strata_engine::{BulkLoader, EngineConfig, JsonLineDataStore, QueryEngine, TableStore};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Key-value storage engine with secondary indexes", long_about = None)]
struct Args {
    /// Data directory holding the table schema, index registry, and log.
    #[arg(long, env = "STRATA_DATA_DIR", default_value = "./strata-data")]
    data_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the table schema in the data directory.
    CreateTable {
        /// Table name.
        #[arg(long)]
        name: String,
        /// Partition key as `attribute:type` (type: string, number, binary).
        #[arg(long)]
        partition_key: String,
        /// Optional sort key as `attribute:type`.
        #[arg(long)]
        sort_key: Option<String>,
    },
    /// Bulk-load a JSON array document into the table.
    Load {
        /// Path to the JSON document.
        file: PathBuf,
    },
    /// Fetch one item by primary key.
    Get {
        /// Partition key value.
        #[arg(long)]
        partition: String,
        /// Sort key value, for tables with a sort key.
        #[arg(long)]
        sort: Option<String>,
    },
    /// Run a hash-equality query with an optional range predicate.
    Query {
        /// Secondary index to query; omit for the primary index.
        #[arg(long)]
        index: Option<String>,
        /// Hash (partition) key value.
        #[arg(long)]
        hash: String,
        /// Exact-match range predicate.
        #[arg(long, conflicts_with_all = ["begins_with", "between"])]
        eq: Option<String>,
        /// Prefix range predicate (string range attributes only).
        #[arg(long, conflicts_with = "between")]
        begins_with: Option<String>,
        /// Inclusive range predicate: low then high.
        #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"])]
        between: Option<Vec<String>>,
        /// Page size.
        #[arg(long)]
        limit: Option<usize>,
        /// Delay between pages in milliseconds.
        #[arg(long, default_value_t = 0)]
        page_delay_ms: u64,
    },
    /// Scan the whole table in primary-key order, page by page.
    Scan {
        /// Page size.
        #[arg(long)]
        limit: Option<usize>,
        /// Delay between pages in milliseconds.
        #[arg(long, default_value_t = 0)]
        page_delay_ms: u64,
    },
    /// Register a secondary index and backfill it from existing items.
    CreateIndex {
        /// Index name.
        #[arg(long)]
        name: String,
        /// Hash key as `attribute:type`.
        #[arg(long)]
        hash_key: String,
        /// Optional range key as `attribute:type`.
        #[arg(long)]
        range_key: Option<String>,
        /// Projection policy.
        #[arg(long, value_enum, default_value_t = ProjectionArg::All)]
        projection: ProjectionArg,
        /// Attributes to project with `--projection include`.
        #[arg(long = "include", value_name = "ATTRIBUTE")]
        include: Vec<String>,
    },
    /// Remove a secondary index.
    DropIndex {
        /// Index name.
        #[arg(long)]
        name: String,
    },
    /// List registered indexes and their state.
    ListIndexes,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProjectionArg {
    All,
    KeysOnly,
    Include,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let paths = DataPaths::new(&args.data_dir);

    if let Command::CreateTable {
        name,
        partition_key,
        sort_key,
    } = &args.command
    {
        return create_table(&paths, name, partition_key, sort_key.as_deref());
    }

    let (store, mut registry) = open_table(&paths).await?;

    match args.command {
        Command::CreateTable { .. } => unreachable!("handled above"),
        Command::Load { file } => {
            let document = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let written = BulkLoader::new(&store).load_json(&document).await?;
            store.flush().await?;
            println!("loaded {written} items");
        }
        Command::Get { partition, sort } => {
            let schema = store.schema().clone();
            let partition = parse_key(&schema.partition_key, &partition)?;
            let sort = match (&schema.sort_key, sort) {
                (Some(def), Some(raw)) => Some(parse_key(def, &raw)?),
                _ => None,
            };
            let item = store.get(partition, sort)?;
            println!("{}", render(&item));
        }
        Command::Query {
            index,
            hash,
            eq,
            begins_with,
            between,
            limit,
            page_delay_ms,
        } => {
            let (hash_def, range_def) = key_definitions(&store, index.as_deref())?;
            let hash_value = parse_key(&hash_def, &hash)?;
            let mut request = match index {
                None => QueryRequest::primary(hash_def.name.clone(), hash_value),
                Some(name) => QueryRequest::on_index(name, hash_def.name.clone(), hash_value),
            };
            if let Some(predicate) = range_predicate(range_def.as_ref(), eq, begins_with, between)?
            {
                let def = range_def.context("selected index has no range key")?;
                request = request.with_range(def.name, predicate);
            }
            if let Some(limit) = limit {
                request = request.with_limit(limit);
            }
            run_pages(page_delay_ms, |cursor| {
                let mut request = request.clone();
                request.cursor = cursor;
                QueryEngine::new(&store).query(&request)
            })
            .await?;
        }
        Command::Scan {
            limit,
            page_delay_ms,
        } => {
            run_pages(page_delay_ms, |cursor| {
                QueryEngine::new(&store).scan(limit, cursor.as_deref())
            })
            .await?;
        }
        Command::CreateIndex {
            name,
            hash_key,
            range_key,
            projection,
            include,
        } => {
            let schema = IndexSchema {
                name,
                hash_key: parse_key_definition(&hash_key)?,
                range_key: range_key.as_deref().map(parse_key_definition).transpose()?,
                projection: match projection {
                    ProjectionArg::All => Projection::All,
                    ProjectionArg::KeysOnly => Projection::KeysOnly,
                    ProjectionArg::Include => Projection::Include(include),
                },
            };
            store.create_index(schema.clone())?.wait().await?;
            registry.push(schema);
            save_registry(&paths, &registry)?;
            println!("index created and backfilled");
        }
        Command::DropIndex { name } => {
            store.drop_index(&name)?;
            registry.retain(|schema| schema.name != name);
            save_registry(&paths, &registry)?;
            println!("index dropped");
        }
        Command::ListIndexes => {
            for description in store.list_indexes() {
                let schema = &description.schema;
                let range = schema
                    .range_key
                    .as_ref()
                    .map_or_else(String::new, |def| format!(", range {}", def.name));
                println!(
                    "{} (hash {}{range}) — {:?}, {} entries",
                    schema.name, schema.hash_key.name, description.status, description.entries
                );
            }
        }
    }
    Ok(())
}

struct DataPaths {
    schema: PathBuf,
    indexes: PathBuf,
    log: PathBuf,
    dir: PathBuf,
}

impl DataPaths {
    fn new(dir: &Path) -> Self {
        Self {
            schema: dir.join("schema.json"),
            indexes: dir.join("indexes.json"),
            log: dir.join("table.jsonl"),
            dir: dir.to_path_buf(),
        }
    }
}

fn create_table(
    paths: &DataPaths,
    name: &str,
    partition_key: &str,
    sort_key: Option<&str>,
) -> anyhow::Result<()> {
    anyhow::ensure!(
        !paths.schema.exists(),
        "table already exists at {}",
        paths.dir.display()
    );
    let schema = TableSchema {
        name: name.to_string(),
        partition_key: parse_key_definition(partition_key)?,
        sort_key: sort_key.map(parse_key_definition).transpose()?,
    };
    std::fs::create_dir_all(&paths.dir)
        .with_context(|| format!("creating {}", paths.dir.display()))?;
    std::fs::write(&paths.schema, serde_json::to_vec_pretty(&schema)?)
        .with_context(|| format!("writing {}", paths.schema.display()))?;
    println!("table '{name}' created");
    Ok(())
}

async fn open_table(paths: &DataPaths) -> anyhow::Result<(TableStore, Vec<IndexSchema>)> {
    let schema_text = std::fs::read_to_string(&paths.schema).with_context(|| {
        format!(
            "no table at {} (run create-table first)",
            paths.dir.display()
        )
    })?;
    let schema: TableSchema = serde_json::from_str(&schema_text)
        .with_context(|| format!("parsing {}", paths.schema.display()))?;

    let data_store = Arc::new(JsonLineDataStore::open(&paths.log).await?);
    let store = TableStore::open(schema, data_store, Vec::new(), EngineConfig::default()).await?;

    let registry = load_registry(paths)?;
    for index in &registry {
        store.create_index(index.clone())?.wait().await?;
    }
    Ok((store, registry))
}

fn load_registry(paths: &DataPaths) -> anyhow::Result<Vec<IndexSchema>> {
    if !paths.indexes.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(&paths.indexes)
        .with_context(|| format!("reading {}", paths.indexes.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", paths.indexes.display()))
}

fn save_registry(paths: &DataPaths, registry: &[IndexSchema]) -> anyhow::Result<()> {
    std::fs::write(&paths.indexes, serde_json::to_vec_pretty(registry)?)
        .with_context(|| format!("writing {}", paths.indexes.display()))
}

/// Parses `attribute:type` into a key definition.
fn parse_key_definition(raw: &str) -> anyhow::Result<KeyDefinition> {
    let (name, key_type) = raw
        .split_once(':')
        .context("key definitions take the form attribute:type")?;
    let key_type = match key_type {
        "string" => KeyType::String,
        "number" => KeyType::Number,
        "binary" => KeyType::Binary,
        other => anyhow::bail!("unknown key type '{other}' (expected string, number, or binary)"),
    };
    Ok(KeyDefinition::new(name, key_type))
}

/// Parses a raw CLI argument into a key scalar of the declared type.
fn parse_key(def: &KeyDefinition, raw: &str) -> anyhow::Result<KeyValue> {
    match def.key_type {
        KeyType::String => Ok(KeyValue::String(raw.to_string())),
        KeyType::Number => {
            let number: f64 = raw
                .parse()
                .with_context(|| format!("'{}' expects a number, got '{raw}'", def.name))?;
            Ok(KeyValue::Number(number))
        }
        KeyType::Binary => Ok(KeyValue::Binary(raw.as_bytes().to_vec())),
    }
}

/// Resolves the hash/range key definitions of the query target.
fn key_definitions(
    store: &TableStore,
    index: Option<&str>,
) -> anyhow::Result<(KeyDefinition, Option<KeyDefinition>)> {
    match index {
        None => {
            let schema = store.schema();
            Ok((schema.partition_key.clone(), schema.sort_key.clone()))
        }
        Some(name) => {
            let state = store.indexes().get(name)?;
            let schema = state.schema();
            Ok((schema.hash_key.clone(), schema.range_key.clone()))
        }
    }
}

fn range_predicate(
    range_def: Option<&KeyDefinition>,
    eq: Option<String>,
    begins_with: Option<String>,
    between: Option<Vec<String>>,
) -> anyhow::Result<Option<SortPredicate>> {
    let Some(def) = range_def else {
        anyhow::ensure!(
            eq.is_none() && begins_with.is_none() && between.is_none(),
            "the query target has no range key"
        );
        return Ok(None);
    };
    if let Some(raw) = eq {
        return Ok(Some(SortPredicate::Eq(parse_key(def, &raw)?)));
    }
    if let Some(prefix) = begins_with {
        return Ok(Some(SortPredicate::BeginsWith(prefix)));
    }
    if let Some(bounds) = between {
        let [low, high] = bounds.as_slice() else {
            anyhow::bail!("--between takes exactly two values");
        };
        return Ok(Some(SortPredicate::Between(
            parse_key(def, low)?,
            parse_key(def, high)?,
        )));
    }
    Ok(None)
}

/// Drives a paginated read to completion, printing each page.
async fn run_pages<F>(page_delay_ms: u64, mut fetch: F) -> anyhow::Result<()>
where
    F: FnMut(Option<String>) -> Result<strata_core::QueryPage, strata_engine::EngineError>,
{
    let mut cursor: Option<String> = None;
    let mut total = 0;
    loop {
        let page = fetch(cursor.take())?;
        total += page.items.len();
        for item in &page.items {
            println!("{}", render(item));
        }
        match page.next_cursor {
            Some(next) if page.has_more => {
                cursor = Some(next);
                if page_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(page_delay_ms)).await;
                }
            }
            _ => break,
        }
    }
    tracing::info!(total, "read finished");
    Ok(())
}

fn render(item: &Item) -> String {
    Value::Map(item.clone()).to_json().to_string()
}
