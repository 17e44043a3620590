//! SQLite backing store.
//!
//! Each call checks a connection out of an r2d2 pool, runs one storage
//! statement on the tokio blocking pool, and returns the connection when the
//! guard drops. Reads go to the read-only [`ReaderPool`] when the provider is
//! configured with `use_read_only_intent`.

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ErrorCode, InterruptHandle};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::reader::{ReaderError, ReaderPool};
use super::schema::{
    apply_pragmas, clear_storage_key, initialize_schema, list_storage_keys,
    read_from_storage_key, write_to_storage_key, KeyInfo,
};
use super::{BackingStore, StoredRecord};
use crate::config::StorageOptions;
use crate::error::StorageError;
use crate::now_millis;

/// SQLite-backed grain state store.
#[derive(Clone)]
pub struct SqliteStore {
    writer: Pool<SqliteConnectionManager>,
    reader: Option<ReaderPool>,
    path: String,
    busy_timeout: Duration,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("read_only_intent", &self.reader.is_some())
            .finish()
    }
}

impl SqliteStore {
    /// Open connection pools for the database named by the options.
    ///
    /// The database file is created if missing; the schema is created by
    /// [`BackingStore::initialize`].
    pub fn open(options: &StorageOptions) -> Result<Self, StorageError> {
        options.validate()?;

        let manager = SqliteConnectionManager::file(&options.connection_string);
        let writer = Pool::builder()
            .max_size(options.pool_size)
            .connection_customizer(Box::new(WriterConnectionCustomizer {
                busy_timeout: options.busy_timeout,
            }))
            .build(manager)?;

        let reader = if options.use_read_only_intent {
            let pool = ReaderPool::new(
                &options.connection_string,
                options.reader_pool_size,
                options.busy_timeout,
            )
            .map_err(|e| match e {
                ReaderError::PoolCreation(e) => StorageError::Pool(e),
                ReaderError::Database(e) => StorageError::Database(e),
            })?;
            Some(pool)
        } else {
            None
        };

        tracing::debug!(
            path = %options.connection_string,
            read_only_intent = options.use_read_only_intent,
            "Opened SQLite grain store"
        );

        Ok(Self {
            writer,
            reader,
            path: options.connection_string.clone(),
            busy_timeout: options.busy_timeout,
        })
    }

    /// List every stored key with its version, in key order.
    pub async fn list_keys(&self) -> Result<Vec<KeyInfo>, StorageError> {
        let pool = self.read_pool().clone();
        run_cancellable(pool, self.busy_timeout, &CancellationToken::new(), |conn| {
            list_storage_keys(conn)
        })
        .await
    }

    fn read_pool(&self) -> &Pool<SqliteConnectionManager> {
        self.reader.as_ref().map_or(&self.writer, ReaderPool::pool)
    }
}

#[async_trait]
impl BackingStore for SqliteStore {
    async fn initialize(&self) -> Result<(), StorageError> {
        let cancel = CancellationToken::new();
        run_cancellable(self.writer.clone(), self.busy_timeout, &cancel, |conn| {
            initialize_schema(conn)
        })
        .await
    }

    async fn read(
        &self,
        grain_key: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredRecord, StorageError> {
        let grain_key = grain_key.to_string();
        run_cancellable(self.read_pool().clone(), self.busy_timeout, cancel, move |conn| {
            read_from_storage_key(conn, &grain_key)
        })
        .await
    }

    async fn write(
        &self,
        grain_key: &str,
        expected: Option<i64>,
        payload: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Option<i64>, StorageError> {
        let grain_key = grain_key.to_string();
        run_cancellable(self.writer.clone(), self.busy_timeout, cancel, move |conn| {
            write_to_storage_key(conn, &grain_key, expected, &payload, now_millis())
        })
        .await
    }

    async fn clear(
        &self,
        grain_key: &str,
        expected: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<Option<i64>, StorageError> {
        let grain_key = grain_key.to_string();
        run_cancellable(self.writer.clone(), self.busy_timeout, cancel, move |conn| {
            clear_storage_key(conn, &grain_key, expected, now_millis())
        })
        .await
    }
}

/// Slot through which a cancelled caller can interrupt the running statement.
///
/// The blocking task empties the slot before it releases its connection, so
/// an interrupt can never reach a connection that went back to the pool.
type InterruptSlot = Arc<Mutex<Option<InterruptHandle>>>;

/// How long one attempt waits on a locked database before the caller's
/// cancellation token is checked again.
const BUSY_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Run one statement on a pooled connection off the async workers.
///
/// A locked database is retried in [`BUSY_POLL_INTERVAL`] slices until
/// `busy_timeout` runs out, so a cancelled caller never sits out the whole
/// timeout. On cancellation a running statement is interrupted, which rolls
/// it back. A statement that committed before the interrupt landed is
/// reported as success; any failure after cancellation is `Cancelled`.
async fn run_cancellable<T, F>(
    pool: Pool<SqliteConnectionManager>,
    busy_timeout: Duration,
    cancel: &CancellationToken,
    mut f: F,
) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnMut(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(StorageError::Cancelled);
    }

    let slot: InterruptSlot = Arc::new(Mutex::new(None));
    let task_slot = Arc::clone(&slot);
    let task_cancel = cancel.clone();

    let mut task = tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
        let mut conn = pool.get()?;
        conn.busy_timeout(BUSY_POLL_INTERVAL)?;
        *lock(&task_slot) = Some(conn.get_interrupt_handle());

        let deadline = Instant::now() + busy_timeout;
        let result = loop {
            if task_cancel.is_cancelled() {
                break Err(StorageError::Cancelled);
            }
            match f(&mut *conn) {
                Err(e) if is_busy(&e) && Instant::now() < deadline => continue,
                other => break other.map_err(map_interrupted),
            }
        };

        lock(&task_slot).take();
        result
    });

    tokio::select! {
        joined = &mut task => joined?,
        () = cancel.cancelled() => {
            if let Some(handle) = lock(&slot).as_ref() {
                handle.interrupt();
            }
            // A failed statement rolled back, so nothing was applied.
            task.await?.map_err(|_| StorageError::Cancelled)
        }
    }
}

fn lock(slot: &InterruptSlot) -> std::sync::MutexGuard<'_, Option<InterruptHandle>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::DatabaseBusy
    )
}

fn map_interrupted(err: rusqlite::Error) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted => {
            StorageError::Cancelled
        }
        other => StorageError::Database(other),
    }
}

/// Connection customizer that applies writer pragmas.
#[derive(Debug)]
struct WriterConnectionCustomizer {
    busy_timeout: Duration,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for WriterConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        apply_pragmas(conn, self.busy_timeout)
    }
}
