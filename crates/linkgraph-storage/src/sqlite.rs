//! SQLite implementation of [`Graph`].
//!
//! [`SqliteGraph`] persists the link graph in a SQLite database with WAL
//! mode, foreign keys and automatic schema migrations. Every operation is a
//! single statement, so atomicity comes from SQLite's native upsert rather
//! than explicit transactions.
//!
//! Range scans stream: the returned iterator fetches one page of rows at a
//! time using keyset pagination on the primary key, taking the connection
//! lock only while a page is read.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row};
use uuid::Uuid;

use linkgraph_core::{Edge, EdgeId, Link, LinkId};

use crate::config::SqliteOptions;
use crate::error::{BackendError, StorageError};
use crate::ids::{self, IdSource, MAX_ID_ATTEMPTS};
use crate::traits::{EdgeIterator, Graph, GraphIterator, LinkIterator};

// On a duplicate URL keep the stored id and the later of the two timestamps.
const UPSERT_LINK_QUERY: &str = "
    INSERT INTO links (id, url, retrieved_at) VALUES (?1, ?2, ?3)
    ON CONFLICT (url) DO UPDATE SET retrieved_at = MAX(links.retrieved_at, excluded.retrieved_at)
    RETURNING id, retrieved_at";

const FIND_LINK_QUERY: &str = "SELECT url, retrieved_at FROM links WHERE id = ?1";

const LINKS_PAGE_QUERY: &str = "
    SELECT id, url, retrieved_at FROM links
    WHERE id >= ?1 AND id < ?2 AND retrieved_at < ?3 AND (?4 IS NULL OR id > ?4)
    ORDER BY id LIMIT ?5";

// On a duplicate (src, dst) pair only refresh updated_at.
const UPSERT_EDGE_QUERY: &str = "
    INSERT INTO edges (id, src, dst, updated_at) VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT (src, dst) DO UPDATE SET updated_at = excluded.updated_at
    RETURNING id, updated_at";

const EDGES_PAGE_QUERY: &str = "
    SELECT id, src, dst, updated_at FROM edges
    WHERE src >= ?1 AND src < ?2 AND updated_at < ?3 AND (?4 IS NULL OR id > ?4)
    ORDER BY id LIMIT ?5";

const REMOVE_STALE_EDGES_QUERY: &str = "DELETE FROM edges WHERE src = ?1 AND updated_at < ?2";

/// SQLite-backed implementation of [`Graph`].
///
/// The connection sits behind a mutex so the store can be shared between
/// threads; each operation holds it for one statement.
pub struct SqliteGraph {
    conn: Mutex<Connection>,
    ids: IdSource,
    page_size: usize,
}

impl SqliteGraph {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn open(path: &str, options: &SqliteOptions) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path, options.busy_timeout)?;
        Ok(Self::from_connection(conn, options))
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::in_memory_with(&SqliteOptions::default())
    }

    pub fn in_memory_with(options: &SqliteOptions) -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(Self::from_connection(conn, options))
    }

    fn from_connection(conn: Connection, options: &SqliteOptions) -> Self {
        SqliteGraph {
            conn: Mutex::new(conn),
            ids: IdSource::default(),
            page_size: options.page_size.max(1),
        }
    }

    /// Replaces the source of identifiers for newly created rows.
    pub fn with_id_source(mut self, ids: IdSource) -> Self {
        self.ids = ids;
        self
    }

    /// Closes the underlying connection, reporting any error SQLite raises
    /// while doing so. Dropping the store closes it silently.
    pub fn close(self) -> Result<(), StorageError> {
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, err)| StorageError::backend("close", err))
    }
}

impl Graph for SqliteGraph {
    fn upsert_link(&self, link: &mut Link) -> Result<(), StorageError> {
        const OP: &str = "upsert link";
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(UPSERT_LINK_QUERY)
            .map_err(StorageError::during(OP))?;

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.ids.next_id();
            let result = stmt.query_row(
                params![id_param(&id), link.url, to_micros(link.retrieved_at)],
                |row| Ok((uuid_column(row, 0)?, time_column(row, 1)?)),
            );
            match result.map_err(|err| translate_error(OP, err)) {
                Ok((id, retrieved_at)) => {
                    link.id = LinkId(id);
                    link.retrieved_at = retrieved_at;
                    return Ok(());
                }
                Err(Failure::IdCollision(_)) => {
                    tracing::warn!(%id, op = OP, "identifier collision, drawing another");
                }
                Err(failure) => return Err(failure.into_storage(OP)),
            }
        }
        Err(ids::exhausted(OP))
    }

    fn find_link(&self, id: LinkId) -> Result<Link, StorageError> {
        const OP: &str = "find link";
        let conn = self.conn.lock();
        let found = conn
            .query_row(FIND_LINK_QUERY, params![id_param(&id.0)], |row| {
                Ok(Link {
                    id,
                    url: row.get(0)?,
                    retrieved_at: time_column(row, 1)?,
                })
            })
            .optional()
            .map_err(|err| translate_error(OP, err).into_storage(OP))?;

        found.ok_or(StorageError::NotFound { id })
    }

    fn links(
        &self,
        from: LinkId,
        to: LinkId,
        retrieved_before: DateTime<Utc>,
    ) -> Result<LinkIterator<'_>, StorageError> {
        Ok(Box::new(PagedIterator::<Link>::new(
            self,
            from,
            to,
            retrieved_before,
        )))
    }

    fn upsert_edge(&self, edge: &mut Edge) -> Result<(), StorageError> {
        const OP: &str = "upsert edge";
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(UPSERT_EDGE_QUERY)
            .map_err(StorageError::during(OP))?;

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.ids.next_id();
            let result = stmt.query_row(
                params![
                    id_param(&id),
                    id_param(&edge.source.0),
                    id_param(&edge.destination.0),
                    to_micros(Utc::now()),
                ],
                |row| Ok((uuid_column(row, 0)?, time_column(row, 1)?)),
            );
            match result.map_err(|err| translate_error(OP, err)) {
                Ok((id, updated_at)) => {
                    edge.id = EdgeId(id);
                    edge.updated_at = updated_at;
                    return Ok(());
                }
                Err(Failure::IdCollision(_)) => {
                    tracing::warn!(%id, op = OP, "identifier collision, drawing another");
                }
                Err(Failure::MissingEdgeLinks(_)) => {
                    return Err(StorageError::UnknownEdgeLinks {
                        src: edge.source,
                        dst: edge.destination,
                    })
                }
                Err(failure) => return Err(failure.into_storage(OP)),
            }
        }
        Err(ids::exhausted(OP))
    }

    fn edges(
        &self,
        from: LinkId,
        to: LinkId,
        updated_before: DateTime<Utc>,
    ) -> Result<EdgeIterator<'_>, StorageError> {
        Ok(Box::new(PagedIterator::<Edge>::new(
            self,
            from,
            to,
            updated_before,
        )))
    }

    fn remove_stale_edges(
        &self,
        from: LinkId,
        updated_before: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        const OP: &str = "remove stale edges";
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                REMOVE_STALE_EDGES_QUERY,
                params![id_param(&from.0), cutoff_micros(updated_before)],
            )
            .map_err(|err| translate_error(OP, err).into_storage(OP))?;
        tracing::debug!(%from, removed, "removed stale edges");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error translation
// ---------------------------------------------------------------------------

/// What a failed statement means to the caller.
#[derive(Debug)]
enum Failure {
    /// A freshly drawn identifier already exists; retry with another.
    IdCollision(rusqlite::Error),
    /// A foreign key pointed at a link that does not exist.
    MissingEdgeLinks(rusqlite::Error),
    Other(StorageError),
}

impl Failure {
    /// Used where the failure has no special meaning for the operation.
    fn into_storage(self, op: &'static str) -> StorageError {
        match self {
            Failure::IdCollision(err) | Failure::MissingEdgeLinks(err) => {
                StorageError::backend(op, err)
            }
            Failure::Other(err) => err,
        }
    }
}

/// Maps a rusqlite error into the shared vocabulary. This is the only place
/// that looks at SQLite result codes.
fn translate_error(op: &'static str, err: rusqlite::Error) -> Failure {
    if let rusqlite::Error::FromSqlConversionFailure(column, _, cause) = &err {
        let reason = format!("column {column}: {cause}");
        return Failure::Other(StorageError::backend(op, BackendError::MalformedRow { reason }));
    }

    let constraint = match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            Some(e.extended_code)
        }
        _ => None,
    };
    match constraint {
        Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => Failure::IdCollision(err),
        Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => Failure::MissingEdgeLinks(err),
        _ => Failure::Other(StorageError::backend(op, err)),
    }
}

// ---------------------------------------------------------------------------
// Column encoding
// ---------------------------------------------------------------------------

fn id_param(id: &Uuid) -> &[u8] {
    id.as_bytes().as_slice()
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: Vec<u8> = row.get(idx)?;
    Uuid::from_slice(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e)))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {micros} out of range").into(),
        )
    })
}

/// Timestamps are stored as UTC microseconds; sub-microsecond precision is
/// dropped.
fn to_micros(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

/// Rounds a cutoff up to the next microsecond so that `stored < cutoff`
/// keeps meaning "strictly before" for cutoffs with nanosecond parts.
fn cutoff_micros(t: DateTime<Utc>) -> i64 {
    let micros = t.timestamp_micros();
    if t.timestamp_subsec_nanos() % 1_000 != 0 {
        micros.saturating_add(1)
    } else {
        micros
    }
}

// ---------------------------------------------------------------------------
// Iteration
// ---------------------------------------------------------------------------

/// A row type that can be scanned page by page in primary key order.
trait PagedRow: Sized {
    const OP: &'static str;
    const PAGE_QUERY: &'static str;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Primary key of the row, used as the keyset cursor.
    fn key(&self) -> Uuid;
}

impl PagedRow for Link {
    const OP: &'static str = "links";
    const PAGE_QUERY: &'static str = LINKS_PAGE_QUERY;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Link {
            id: LinkId(uuid_column(row, 0)?),
            url: row.get(1)?,
            retrieved_at: time_column(row, 2)?,
        })
    }

    fn key(&self) -> Uuid {
        self.id.0
    }
}

impl PagedRow for Edge {
    const OP: &'static str = "edges";
    const PAGE_QUERY: &'static str = EDGES_PAGE_QUERY;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Edge {
            id: EdgeId(uuid_column(row, 0)?),
            source: LinkId(uuid_column(row, 1)?),
            destination: LinkId(uuid_column(row, 2)?),
            updated_at: time_column(row, 3)?,
        })
    }

    fn key(&self) -> Uuid {
        self.id.0
    }
}

/// Streaming iterator over a range scan.
///
/// Rows are pulled lazily one page at a time. Each page reflects the
/// committed state at the moment it is read.
struct PagedIterator<'a, T> {
    graph: &'a SqliteGraph,
    from: LinkId,
    to: LinkId,
    cutoff: i64,
    /// Key of the last row fetched so far.
    cursor: Option<Uuid>,
    page: VecDeque<T>,
    current: Option<T>,
    exhausted: bool,
    closed: bool,
    err: Option<StorageError>,
}

impl<'a, T: PagedRow> PagedIterator<'a, T> {
    fn new(graph: &'a SqliteGraph, from: LinkId, to: LinkId, before: DateTime<Utc>) -> Self {
        PagedIterator {
            graph,
            from,
            to,
            cutoff: cutoff_micros(before),
            cursor: None,
            page: VecDeque::new(),
            current: None,
            exhausted: false,
            closed: false,
            err: None,
        }
    }

    fn fetch_page(&mut self) -> Result<(), StorageError> {
        let graph = self.graph;
        let limit = graph.page_size;
        let cursor = self.cursor.map(|c| c.as_bytes().to_vec());

        let conn = graph.conn.lock();
        let mut stmt = conn
            .prepare_cached(T::PAGE_QUERY)
            .map_err(StorageError::during(T::OP))?;
        let rows = stmt
            .query_map(
                params![
                    id_param(&self.from.0),
                    id_param(&self.to.0),
                    self.cutoff,
                    cursor,
                    limit as i64,
                ],
                T::from_row,
            )
            .map_err(StorageError::during(T::OP))?;

        let mut fetched = 0;
        for row in rows {
            let item = row.map_err(|err| translate_error(T::OP, err).into_storage(T::OP))?;
            self.page.push_back(item);
            fetched += 1;
        }
        tracing::trace!(op = T::OP, fetched, "fetched page");

        if fetched < limit {
            self.exhausted = true;
        }
        if let Some(last) = self.page.back() {
            self.cursor = Some(last.key());
        }
        Ok(())
    }
}

impl<T: PagedRow + Clone> GraphIterator for PagedIterator<'_, T> {
    type Item = T;

    fn advance(&mut self) -> bool {
        self.current = None;
        if self.closed || self.err.is_some() {
            return false;
        }

        if self.page.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch_page() {
                self.err = Some(err);
                return false;
            }
        }

        self.current = self.page.pop_front();
        self.current.is_some()
    }

    fn current(&self) -> Option<T> {
        self.current.clone()
    }

    fn error(&self) -> Option<&StorageError> {
        self.err.as_ref()
    }

    fn take_error(&mut self) -> Option<StorageError> {
        self.err.take()
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.closed = true;
        self.page.clear();
        self.current = None;
        Ok(())
    }
}
