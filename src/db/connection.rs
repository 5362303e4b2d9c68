use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error};
use rusqlite::Connection;
use tokio::sync::oneshot;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DatabaseInner {
    fn worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stops the worker thread. Returns `false` if it was already stopped.
    fn shutdown(&self) -> bool {
        let Some(handle) = self.worker().take() else {
            return false;
        };
        if let Err(err) = self.sender.send(DbCommand::Shutdown) {
            error!("Failed to send shutdown to DB thread: {err}");
        }
        if let Err(join_err) = handle.join() {
            error!("Failed to join DB thread: {join_err:?}");
        }
        true
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// SQLite connection owned by a dedicated worker thread.
///
/// Callers hand closures to [`Database::execute`]; they run in submission
/// order on the worker, so writes land in the order they were issued.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("tagsweep-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if ready_tx.send(Ok(())).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                if let Err((_, err)) = conn.close() {
                    error!("Failed to close SQLite connection: {err}");
                }
                debug!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        debug!("Database opened at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Runs `task` on the worker thread and waits for its result.
    ///
    /// Must not be called from inside an async task; the controller runs on a
    /// blocking thread.
    pub fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .blocking_recv()
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Flushes outstanding work and closes the connection. Later calls to
    /// [`execute`](Self::execute) fail.
    pub fn close(&self) -> bool {
        self.inner.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executes_in_order_and_fails_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("nested").join("t.db")).unwrap();

        db.execute(|conn| {
            conn.execute_batch("CREATE TABLE t (v INTEGER NOT NULL);")?;
            Ok(())
        })
        .unwrap();
        for v in 0..5 {
            db.execute(move |conn| {
                conn.execute("INSERT INTO t (v) VALUES (?1)", [v])?;
                Ok(())
            })
            .unwrap();
        }
        let values: Vec<i64> = db
            .execute(|conn| {
                let mut stmt = conn.prepare("SELECT v FROM t ORDER BY rowid")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                Ok(rows.collect::<rusqlite::Result<Vec<i64>>>()?)
            })
            .unwrap();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);

        assert!(db.close());
        assert!(!db.close());
        assert!(db.execute(|_| Ok(())).is_err());
    }
}
