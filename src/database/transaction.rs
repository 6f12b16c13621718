//! Ambient Transaction Scope
//!
//! A task-local slot carries "the current transaction, if any" for one
//! logical operation. [`TransactionManager::run_in_scope`] opens a transaction
//! when none is ambient, or joins the ambient one, and every store resolves
//! its connection through [`TransactionManager::resolve_connection`].
//!
//! The slot follows the future that installed it, not the thread that polls
//! it, so concurrent operations never observe each other's transaction.
//! Tasks started with `tokio::spawn` do not inherit the slot and fall back to
//! autocommit connections.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use log::{debug, error};
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard};

type PgTransaction = Transaction<'static, Postgres>;

tokio::task_local! {
    static AMBIENT_TRANSACTION: TransactionHandle;
}

/// Shared handle to the transaction owned by the outermost scope
#[derive(Clone)]
struct TransactionHandle {
    slot: Arc<Mutex<Option<PgTransaction>>>,
}

impl TransactionHandle {
    fn new(tx: PgTransaction) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(tx))),
        }
    }

    async fn commit(&self) -> Result<(), sqlx::Error> {
        match self.slot.lock().await.take() {
            Some(tx) => tx.commit().await,
            None => Err(transaction_finished()),
        }
    }

    async fn rollback(&self) -> Result<(), sqlx::Error> {
        match self.slot.lock().await.take() {
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        }
    }
}

fn transaction_finished() -> sqlx::Error {
    sqlx::Error::Protocol("ambient transaction already finished".to_string())
}

/// Connection resolved for one data-access call
///
/// Either the ambient transaction (held exclusively until dropped) or an
/// autocommit connection checked out of the pool.
pub enum DbConn {
    Transaction(OwnedMappedMutexGuard<Option<PgTransaction>, PgTransaction>),
    Pool(PoolConnection<Postgres>),
}

impl DbConn {
    /// Executor to hand to `sqlx` queries
    pub fn executor(&mut self) -> &mut PgConnection {
        match self {
            DbConn::Transaction(tx) => &mut ***tx,
            DbConn::Pool(conn) => &mut **conn,
        }
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self, DbConn::Transaction(_))
    }
}

/// Owns the pool and the ambient transaction protocol
#[derive(Clone)]
pub struct TransactionManager {
    pool: PgPool,
}

impl TransactionManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// True when the calling operation runs inside a transaction scope
    pub fn in_transaction() -> bool {
        AMBIENT_TRANSACTION.try_with(|_| ()).is_ok()
    }

    /// Run `work` as one atomic unit
    ///
    /// Nested calls join the ambient transaction; only the outermost call
    /// commits (on `Ok`) or rolls back (on `Err`). Dropping the returned
    /// future before completion drops the transaction, which rolls it back.
    pub async fn run_in_scope<F, Fut, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<sqlx::Error> + Display,
    {
        if Self::in_transaction() {
            debug!("Reusing existing transaction");
            return work().await;
        }

        let handle = TransactionHandle::new(self.pool.begin().await?);
        let outcome = AMBIENT_TRANSACTION.scope(handle.clone(), work()).await;

        match outcome {
            Ok(value) => {
                handle.commit().await?;
                debug!("Transaction completed successfully");
                Ok(value)
            }
            Err(err) => {
                error!("Transaction failed, rolling back: {}", err);
                if let Err(rollback_err) = handle.rollback().await {
                    error!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Resolve the connection for one data-access call
    ///
    /// Returns the ambient transaction when there is one, otherwise an
    /// autocommit pool connection.
    pub async fn resolve_connection(&self) -> Result<DbConn, sqlx::Error> {
        match AMBIENT_TRANSACTION.try_with(|handle| handle.clone()) {
            Ok(handle) => {
                let guard = handle.slot.lock_owned().await;
                OwnedMutexGuard::try_map(guard, |slot| slot.as_mut())
                    .map(DbConn::Transaction)
                    .map_err(|_| transaction_finished())
            }
            Err(_) => Ok(DbConn::Pool(self.pool.acquire().await?)),
        }
    }
}
