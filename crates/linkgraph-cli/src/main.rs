//! Link graph operator CLI.
//!
//! Provides the `linkgraph` binary with subcommands for inspecting and
//! maintaining a link graph store. The store is selected by URI via
//! `--store` or the `LINKGRAPH_STORE` environment variable:
//! - `memory://` (ephemeral, mostly useful for trying commands out)
//! - `sqlite::memory:`
//! - `sqlite://<path>` (default: `sqlite://linkgraph.db`)
//!
//! Results are printed to stdout as JSON, one entity per line. Logs go to
//! stderr.

use std::io::{self, Write};
use std::process;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use linkgraph_core::{Edge, Link, LinkId, PartitionError, PartitionRange};
use linkgraph_storage::{open_graph, Graph, GraphIterator, SqliteOptions, StorageError, StoreUri};

/// Inspect and maintain a link graph store.
#[derive(Debug, Parser)]
#[command(name = "linkgraph", about = "Inspect and maintain a link graph store")]
struct Cli {
    /// Store URI: memory://, sqlite::memory: or sqlite://<path>.
    #[arg(
        long,
        global = true,
        env = "LINKGRAPH_STORE",
        default_value = "sqlite://linkgraph.db"
    )]
    store: String,

    /// Rows fetched per page by SQLite range scans.
    #[arg(long, global = true, default_value_t = linkgraph_storage::config::DEFAULT_PAGE_SIZE)]
    page_size: usize,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Insert a link, or bump the retrieval time of an existing one.
    UpsertLink {
        url: String,

        /// RFC 3339 retrieval time (default: now).
        #[arg(long)]
        retrieved_at: Option<DateTime<Utc>>,
    },

    /// Print a single link by ID.
    FindLink { id: LinkId },

    /// List links in a partition that were retrieved before a cutoff.
    Links {
        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Insert an edge, or refresh an existing one.
    UpsertEdge { src: LinkId, dst: LinkId },

    /// List edges whose source is in a partition, updated before a cutoff.
    Edges {
        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Delete edges from SRC that were not refreshed since a cutoff.
    RemoveStaleEdges {
        src: LinkId,

        /// RFC 3339 cutoff; edges updated strictly before it are removed.
        #[arg(long)]
        before: DateTime<Utc>,
    },
}

/// Partition and cutoff selection shared by the scan commands.
#[derive(Debug, Args)]
struct ScanArgs {
    /// Zero-based partition to scan.
    #[arg(long, default_value_t = 0)]
    partition: usize,

    /// Total number of partitions the identifier space is split into.
    #[arg(long, default_value_t = 1)]
    partitions: usize,

    /// RFC 3339 cutoff (default: now).
    #[arg(long)]
    before: Option<DateTime<Utc>>,
}

/// Failures surfaced to the operator.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),

    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CliError {
    /// Exit code: 1 = lookup, integrity or argument error, 3 = I/O error.
    /// Malformed command lines never get here; clap exits with 2 for those.
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Storage(StorageError::Backend { .. }) | CliError::Output(_) => 3,
            _ => 1,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_writer(io::stderr).init();

    if let Err(err) = run(cli) {
        eprintln!("Error: {}", err);
        process::exit(err.exit_code());
    }
}

/// Opens the configured store and executes one command against it.
fn run(cli: Cli) -> Result<(), CliError> {
    let uri: StoreUri = cli.store.parse()?;
    let options = SqliteOptions {
        page_size: cli.page_size,
        ..SqliteOptions::default()
    };
    let graph = open_graph(&uri, &options)?;
    tracing::debug!(%uri, command = ?cli.command, "running command");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(graph.as_ref(), cli.command, &mut out)?;
    out.flush()?;
    Ok(())
}

fn execute(graph: &dyn Graph, command: Commands, out: &mut impl Write) -> Result<(), CliError> {
    match command {
        Commands::UpsertLink { url, retrieved_at } => {
            let mut link = Link::new(url, retrieved_at.unwrap_or_else(Utc::now));
            graph.upsert_link(&mut link)?;
            print_json(out, &link)
        }
        Commands::FindLink { id } => print_json(out, &graph.find_link(id)?),
        Commands::Links { scan } => {
            let (from, to, before) = scan.bounds()?;
            let mut links = graph.links(from, to, before)?;
            print_all(out, links.as_mut())
        }
        Commands::UpsertEdge { src, dst } => {
            let mut edge = Edge::new(src, dst);
            graph.upsert_edge(&mut edge)?;
            print_json(out, &edge)
        }
        Commands::Edges { scan } => {
            let (from, to, before) = scan.bounds()?;
            let mut edges = graph.edges(from, to, before)?;
            print_all(out, edges.as_mut())
        }
        Commands::RemoveStaleEdges { src, before } => {
            graph.remove_stale_edges(src, before)?;
            Ok(())
        }
    }
}

impl ScanArgs {
    fn bounds(&self) -> Result<(LinkId, LinkId, DateTime<Utc>), CliError> {
        let range = PartitionRange::full(self.partitions)?;
        let (from, to) = range.extents(self.partition)?;
        Ok((from, to, self.before.unwrap_or_else(Utc::now)))
    }
}

fn print_json(out: &mut impl Write, value: &impl Serialize) -> Result<(), CliError> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Streams every remaining item of `it` as one JSON line each.
fn print_all<T: Serialize>(
    out: &mut impl Write,
    it: &mut (dyn GraphIterator<Item = T> + Send + '_),
) -> Result<(), CliError> {
    while it.advance() {
        if let Some(item) = it.current() {
            print_json(out, &item)?;
        }
    }
    if let Some(err) = it.take_error() {
        return Err(err.into());
    }
    it.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkgraph_storage::InMemoryGraph;

    fn run_command(graph: &dyn Graph, args: &[&str]) -> Result<String, CliError> {
        let cli = Cli::try_parse_from(std::iter::once("linkgraph").chain(args.iter().copied()))
            .expect("arguments should parse");
        let mut out = Vec::new();
        execute(graph, cli.command, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn parses_store_from_flag() {
        let cli = Cli::try_parse_from(["linkgraph", "--store", "memory://", "links"]).unwrap();
        assert_eq!(cli.store, "memory://");
        assert!(matches!(cli.command, Commands::Links { .. }));
    }

    #[test]
    fn upsert_then_find_link() {
        let graph = InMemoryGraph::new();
        let printed = run_command(
            &graph,
            &["upsert-link", "http://example.com", "--retrieved-at", "2024-01-01T00:00:00Z"],
        )
        .unwrap();
        let link: serde_json::Value = serde_json::from_str(printed.trim()).unwrap();
        let id = link["id"].as_str().unwrap().to_string();

        let printed = run_command(&graph, &["find-link", &id]).unwrap();
        let found: serde_json::Value = serde_json::from_str(printed.trim()).unwrap();
        assert_eq!(found["url"], "http://example.com");
    }

    #[test]
    fn links_prints_one_line_per_link() {
        let graph = InMemoryGraph::new();
        for url in ["http://a", "http://b", "http://c"] {
            run_command(&graph, &["upsert-link", url, "--retrieved-at", "2024-01-01T00:00:00Z"])
                .unwrap();
        }

        let printed = run_command(&graph, &["links", "--before", "2024-01-02T00:00:00Z"]).unwrap();
        assert_eq!(printed.lines().count(), 3);

        // Partitions split the same set without overlap.
        let mut total = 0;
        for i in ["0", "1"] {
            let printed = run_command(
                &graph,
                &["links", "--partition", i, "--partitions", "2", "--before", "2024-01-02T00:00:00Z"],
            )
            .unwrap();
            total += printed.lines().count();
        }
        assert_eq!(total, 3);
    }

    #[test]
    fn errors_map_to_exit_codes() {
        let graph = InMemoryGraph::new();
        let missing = LinkId::new_random().to_string();

        let err = run_command(&graph, &["find-link", &missing]).unwrap_err();
        assert_eq!(err.exit_code(), 1);

        let err = run_command(&graph, &["upsert-edge", &missing, &missing]).unwrap_err();
        assert!(matches!(err, CliError::Storage(StorageError::UnknownEdgeLinks { .. })));
        assert_eq!(err.exit_code(), 1);

        let err = run_command(&graph, &["links", "--partition", "2", "--partitions", "2"]).unwrap_err();
        assert!(matches!(err, CliError::Partition(_)));
    }
}
