//! Operator CLI for a swarm-memory namespace
//!
//! Opens the namespace at `--path`, runs one command, and shuts the manager
//! down so any change is written back to `state.json`.
//!
//! # Usage
//!
//! ```bash
//! swarm-memctl --path ./memory --namespace ns1 put cfg '{"a": 1}' --type configuration
//! swarm-memctl --path ./memory --namespace ns1 get cfg --metadata
//! swarm-memctl --path ./memory backup
//! swarm-memctl --config memory.toml serve
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use swarm_memory::{
    DeleteOptions, EntryType, ExportFormat, MemoryManager, MemoryQuery, MemorySearchOptions,
    PartitionOptions, RetrieveOptions, StoreOptions,
};
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file (fields of the memory config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Persistence directory (overrides SWARM_MEMORY_PATH)
    #[arg(long, global = true)]
    path: Option<PathBuf>,

    /// Namespace to open (overrides SWARM_MEMORY_NAMESPACE)
    #[arg(long, global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print usage statistics
    Stats,
    /// Print the value stored under a key
    Get {
        key: String,
        #[arg(long)]
        partition: Option<String>,
        /// Print the whole entry instead of just the value
        #[arg(long, default_value_t = false)]
        metadata: bool,
    },
    /// Store a value (parsed as JSON, falling back to a plain string)
    Put {
        key: String,
        value: String,
        #[arg(long)]
        partition: Option<String>,
        #[arg(long = "type")]
        entry_type: Option<EntryType>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        ttl_ms: Option<u64>,
    },
    /// Delete the first entry with a key
    Delete {
        key: String,
        #[arg(long)]
        partition: Option<String>,
    },
    /// Prior versions of an entry, oldest first
    History {
        key: String,
        #[arg(long)]
        partition: Option<String>,
    },
    /// List entries matching filters
    Query {
        #[arg(long)]
        partition: Option<String>,
        #[arg(long = "type")]
        entry_type: Option<EntryType>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Term search over keys, tags, and types
    Search {
        text: String,
        #[arg(long, default_value_t = false)]
        fuzzy: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Dump the namespace
    Export {
        #[arg(long, default_value = "json")]
        format: ExportFormat,
    },
    /// Take a checksummed backup
    Backup,
    /// List backups, newest first
    Backups,
    /// Replace current state with a backup
    Restore { backup_id: String },
    /// List partitions
    Partitions,
    /// Create a partition
    CreatePartition {
        name: String,
        #[arg(long = "type")]
        entry_type: Option<EntryType>,
        #[arg(long)]
        ttl_ms: Option<u64>,
        #[arg(long, default_value_t = false)]
        read_only: bool,
    },
    /// Delete a partition and, with --force, its entries
    DeletePartition {
        name: String,
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Keep the namespace open with background sync, backup, and cleanup
    /// until Ctrl-C
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let memory_config = config::resolve(
        cli.config.as_deref(),
        &config::Overrides {
            namespace: cli.namespace.clone(),
            path: cli.path.clone(),
        },
    )?;
    if !memory_config.is_persistent() {
        warn!("No persistence path set; changes will not outlive this process");
    }

    let manager = MemoryManager::new(memory_config).context("Failed to build memory manager")?;
    manager
        .initialize()
        .await
        .context("Failed to initialize memory namespace")?;

    let outcome = run(&manager, cli.command).await;
    let closed = manager.shutdown().await.context("Shutdown failed");
    outcome?;
    closed
}

async fn run(manager: &Arc<MemoryManager>, command: Command) -> Result<()> {
    match command {
        Command::Stats => print_json(&manager.get_statistics()?),
        Command::Get {
            key,
            partition,
            metadata,
        } => {
            let mut opts = RetrieveOptions::new();
            if let Some(p) = partition.as_deref() {
                opts = opts.partition(p);
            }
            if metadata {
                opts = opts.with_metadata();
            }
            match manager.retrieve(&key, opts)? {
                Some(value) => print_json(&value),
                None => anyhow::bail!("No entry with key '{}'", key),
            }
        }
        Command::Put {
            key,
            value,
            partition,
            entry_type,
            tags,
            owner,
            ttl_ms,
        } => {
            let value = parse_value(&value);
            let mut opts = StoreOptions::new().tags(tags.iter().map(String::as_str).collect());
            if let Some(p) = partition.as_deref() {
                opts = opts.partition(p);
            }
            if let Some(t) = entry_type {
                opts = opts.entry_type(t);
            }
            if let Some(o) = owner.as_deref() {
                opts = opts.owner(o);
            }
            if let Some(ms) = ttl_ms {
                opts = opts.ttl(Duration::from_millis(ms));
            }
            let id = manager.store(&key, &value, opts)?;
            println!("{}", id);
            Ok(())
        }
        Command::Delete { key, partition } => {
            let mut opts = DeleteOptions::new();
            if let Some(p) = partition.as_deref() {
                opts = opts.partition(p);
            }
            if !manager.delete(&key, opts)? {
                anyhow::bail!("No entry with key '{}'", key);
            }
            info!(key = %key, "Entry deleted");
            Ok(())
        }
        Command::History { key, partition } => {
            print_json(&manager.history(&key, partition.as_deref())?)
        }
        Command::Query {
            partition,
            entry_type,
            tags,
            owner,
            limit,
        } => {
            let mut query = MemoryQuery::new().tags(tags.iter().map(String::as_str).collect());
            if let Some(p) = partition.as_deref() {
                query = query.partition(p);
            }
            if let Some(t) = entry_type {
                query = query.entry_type(t);
            }
            if let Some(o) = owner.as_deref() {
                query = query.owner(o);
            }
            if let Some(n) = limit {
                query = query.page(0, n);
            }
            print_json(&manager.query(&query)?)
        }
        Command::Search { text, fuzzy, limit } => {
            let mut opts = MemorySearchOptions::new(&text);
            if fuzzy {
                opts = opts.fuzzy();
            }
            if let Some(n) = limit {
                opts = opts.limit(n);
            }
            print_json(&manager.search(&opts)?)
        }
        Command::Export { format } => {
            println!("{}", manager.export_memory(format)?);
            Ok(())
        }
        Command::Backup => {
            let id = manager.create_backup().await?;
            println!("{}", id);
            Ok(())
        }
        Command::Backups => print_json(&manager.list_backups().await?),
        Command::Restore { backup_id } => {
            let restored = manager
                .restore_from_backup(&backup_id)
                .await
                .with_context(|| format!("Failed to restore backup {}", backup_id))?;
            info!(backup_id = %backup_id, entries = restored, "Backup restored");
            Ok(())
        }
        Command::Partitions => print_json(&manager.list_partitions()?),
        Command::CreatePartition {
            name,
            entry_type,
            ttl_ms,
            read_only,
        } => {
            let opts = PartitionOptions {
                ttl_ms,
                read_only,
                ..PartitionOptions::of_type(entry_type.unwrap_or(EntryType::Knowledge))
            };
            print_json(&manager.create_partition(&name, opts)?)
        }
        Command::DeletePartition { name, force } => {
            let removed = manager.delete_partition(&name, force)?;
            info!(partition = %name, entries_removed = removed, "Partition deleted");
            Ok(())
        }
        Command::Serve => {
            info!(namespace = %manager.config().namespace, "Serving; press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutting down");
            Ok(())
        }
    }
}

/// JSON if it parses, otherwise the raw text as a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("{\"a\": 1}"), json!({"a": 1}));
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("plain text"), json!("plain text"));
    }

    #[test]
    fn test_cli_parses_put() {
        let cli = Cli::try_parse_from([
            "swarm-memctl",
            "--namespace",
            "ns1",
            "put",
            "cfg",
            "{\"a\":1}",
            "--type",
            "configuration",
            "--tag",
            "x",
            "--tag",
            "y",
        ])
        .unwrap();
        assert_eq!(cli.namespace.as_deref(), Some("ns1"));
        match cli.command {
            Command::Put {
                key,
                entry_type,
                tags,
                ..
            } => {
                assert_eq!(key, "cfg");
                assert_eq!(entry_type, Some(EntryType::Configuration));
                assert_eq!(tags, vec!["x", "y"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_export_format() {
        assert!(Cli::try_parse_from(["swarm-memctl", "export", "--format", "xml"]).is_err());
    }

    #[tokio::test]
    async fn test_run_put_then_get() {
        let manager = MemoryManager::new(swarm_memory::MemoryConfig {
            cleanup_interval_secs: 0,
            ..swarm_memory::MemoryConfig::for_namespace("cli")
        })
        .unwrap();
        manager.initialize().await.unwrap();

        run(
            &manager,
            Command::Put {
                key: "k".to_string(),
                value: "[1, 2]".to_string(),
                partition: None,
                entry_type: None,
                tags: vec![],
                owner: None,
                ttl_ms: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            manager.retrieve("k", RetrieveOptions::new()).unwrap(),
            Some(json!([1, 2]))
        );

        let missing = run(
            &manager,
            Command::Get {
                key: "absent".to_string(),
                partition: None,
                metadata: false,
            },
        )
        .await;
        assert!(missing.is_err());
    }
}
