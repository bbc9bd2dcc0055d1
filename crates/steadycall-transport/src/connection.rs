//! Connection manager.
//!
//! Owns one connection handle and the stub built on it.
//!
//! # Architecture
//!
//! The current [`StubHandle`] lives behind an [`ArcSwap`]:
//! - **Lock-free reads**: [`current_stub`](ConnectionManager::current_stub)
//!   clones an `Arc` out of the swap slot
//! - **Copy-on-write replacement**: rebuilds build a new handle and swap it
//!   in; calls that captured the old handle finish against it
//! - **Serialised writers**: rebuilds and the lazy first connect hold an
//!   async mutex so only one connect runs at a time
//!
//! A replaced connection is never closed explicitly. It is dropped when the
//! last in-flight call holding its stub completes.

use crate::traits::Connector;
use arc_swap::ArcSwap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use steadycall_core::{Failure, TransportFault};
use tokio::sync::Mutex;

/// A stub together with the connection it was built on.
///
/// Dereferences to the stub.
pub struct StubHandle<C: Connector> {
    stub: C::Stub,
    connection: Arc<C::Connection>,
    connection_generation: u64,
    stub_generation: u64,
}

impl<C: Connector> StubHandle<C> {
    /// The stub.
    pub fn stub(&self) -> &C::Stub {
        &self.stub
    }

    /// The connection this stub was built on.
    pub fn connection(&self) -> &Arc<C::Connection> {
        &self.connection
    }

    /// Generation of the connection; bumps on every connection rebuild.
    pub fn connection_generation(&self) -> u64 {
        self.connection_generation
    }

    /// Generation of the stub on its connection; resets to 0 with each new
    /// connection and bumps on every stub rebuild.
    pub fn stub_generation(&self) -> u64 {
        self.stub_generation
    }
}

impl<C: Connector> Deref for StubHandle<C> {
    type Target = C::Stub;

    fn deref(&self) -> &C::Stub {
        &self.stub
    }
}

impl<C: Connector> fmt::Debug for StubHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubHandle")
            .field("connection_generation", &self.connection_generation)
            .field("stub_generation", &self.stub_generation)
            .finish_non_exhaustive()
    }
}

enum Slot<C: Connector> {
    /// Nothing connected yet; the next reader connects lazily.
    Empty,
    Ready(Arc<StubHandle<C>>),
    /// The last rebuild failed. Reported once, then reset to `Empty`.
    Broken(TransportFault),
}

/// Owns the connection handle and its stub.
///
/// Shared across concurrent logical calls; every operation takes `&self`.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    slot: ArcSwap<Slot<C>>,
    writer: Mutex<()>,
    generations: AtomicU64,
}

impl<C: Connector> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connection_generation", &self.connection_generation())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager that connects lazily on the first
    /// [`current_stub`](Self::current_stub).
    #[must_use]
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            slot: ArcSwap::from_pointee(Slot::Empty),
            writer: Mutex::new(()),
            generations: AtomicU64::new(0),
        }
    }

    /// Create a manager and connect immediately.
    ///
    /// # Errors
    ///
    /// Returns the fault if the initial connection fails.
    pub async fn connect(connector: C) -> Result<Self, TransportFault> {
        let manager = Self::new(connector);
        let connection = manager.connector.connect().await?;
        manager.install(Arc::new(connection));
        Ok(manager)
    }

    /// The connector in use.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Generation of the live connection, `None` if not connected.
    pub fn connection_generation(&self) -> Option<u64> {
        match &**self.slot.load() {
            Slot::Ready(handle) => Some(handle.connection_generation),
            Slot::Empty | Slot::Broken(_) => None,
        }
    }

    /// Return the live stub, connecting first if nothing is connected.
    ///
    /// Repeated calls return the same handle until a rebuild replaces it.
    ///
    /// # Errors
    ///
    /// Returns a transport failure if the lazy connect fails, or if the most
    /// recent rebuild failed. A failed rebuild is reported exactly once, to
    /// whichever caller reads next. Under concurrency that may be another
    /// logical call than the one whose retry triggered the rebuild; every
    /// other caller connects afresh.
    pub async fn current_stub(&self) -> Result<Arc<StubHandle<C>>, Failure> {
        if let Some(handle) = self.claim()? {
            return Ok(handle);
        }

        let _writer = self.writer.lock().await;
        // Another caller may have connected while we waited.
        if let Some(handle) = self.claim()? {
            return Ok(handle);
        }

        let connection = self.connector.connect().await.map_err(Failure::Transport)?;
        Ok(self.install(Arc::new(connection)))
    }

    /// The ready handle, the pending rebuild failure, or `None` when nothing
    /// is connected. Only the reader that swaps a `Broken` slot out gets its
    /// failure.
    fn claim(&self) -> Result<Option<Arc<StubHandle<C>>>, Failure> {
        loop {
            let slot = self.slot.load_full();
            match &*slot {
                Slot::Ready(handle) => return Ok(Some(Arc::clone(handle))),
                Slot::Empty => return Ok(None),
                Slot::Broken(fault) => {
                    let previous = self.slot.compare_and_swap(&slot, Arc::new(Slot::Empty));
                    if Arc::ptr_eq(&*previous, &slot) {
                        return Err(Failure::Transport(fault.clone()));
                    }
                }
            }
        }
    }

    /// Replace the stub with a new one built on the same connection.
    ///
    /// Falls back to [`rebuild_connection`](Self::rebuild_connection) when
    /// there is no live connection to build on.
    ///
    /// # Errors
    ///
    /// Only fails through the fallback reconnect.
    pub async fn rebuild_stub(&self) -> Result<Arc<StubHandle<C>>, TransportFault> {
        let _writer = self.writer.lock().await;
        let current = self.slot.load_full();
        let Slot::Ready(handle) = &*current else {
            return self.reconnect_locked().await;
        };

        let rebuilt = Arc::new(StubHandle {
            stub: self.connector.stub(&handle.connection),
            connection: Arc::clone(&handle.connection),
            connection_generation: handle.connection_generation,
            stub_generation: handle.stub_generation + 1,
        });
        self.slot.store(Arc::new(Slot::Ready(Arc::clone(&rebuilt))));

        tracing::debug!(
            connection_generation = rebuilt.connection_generation,
            stub_generation = rebuilt.stub_generation,
            "stub rebuilt"
        );
        Ok(rebuilt)
    }

    /// Drop the current connection, establish a new one and build a stub on
    /// it.
    ///
    /// # Errors
    ///
    /// Returns the connect fault. The fault is also recorded so the next
    /// [`current_stub`](Self::current_stub) reports it as the outcome of the
    /// next attempt.
    pub async fn rebuild_connection(&self) -> Result<Arc<StubHandle<C>>, TransportFault> {
        let _writer = self.writer.lock().await;
        self.reconnect_locked().await
    }

    async fn reconnect_locked(&self) -> Result<Arc<StubHandle<C>>, TransportFault> {
        match self.connector.connect().await {
            Ok(connection) => {
                let handle = self.install(Arc::new(connection));
                tracing::info!(
                    connection_generation = handle.connection_generation,
                    "connection rebuilt"
                );
                Ok(handle)
            }
            Err(fault) => {
                tracing::warn!(error = %fault, "connection rebuild failed");
                self.slot.store(Arc::new(Slot::Broken(fault.clone())));
                Err(fault)
            }
        }
    }

    fn install(&self, connection: Arc<C::Connection>) -> Arc<StubHandle<C>> {
        let handle = Arc::new(StubHandle {
            stub: self.connector.stub(&connection),
            connection,
            connection_generation: self.generations.fetch_add(1, Ordering::Relaxed) + 1,
            stub_generation: 0,
        });
        self.slot.store(Arc::new(Slot::Ready(Arc::clone(&handle))));
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use steadycall_core::SocketErrorKind;

    /// Connector whose connections are numbered; fails while `refuse` > 0.
    #[derive(Default)]
    struct Counting {
        connects: AtomicU32,
        refuse: AtomicU32,
    }

    #[async_trait]
    impl Connector for Counting {
        type Connection = u32;
        type Stub = (u32, u32);

        async fn connect(&self) -> Result<u32, TransportFault> {
            let refusals = self.refuse.load(Ordering::SeqCst);
            if refusals > 0 {
                self.refuse.store(refusals - 1, Ordering::SeqCst);
                return Err(TransportFault::new(SocketErrorKind::ConnectionRefused, "refused"));
            }
            Ok(self.connects.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn stub(&self, connection: &Arc<u32>) -> (u32, u32) {
            (**connection, next_stub_id())
        }
    }

    fn next_stub_id() -> u32 {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        NEXT.fetch_add(1, Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_lazy_connect_on_first_use() {
        let manager = ConnectionManager::new(Counting::default());
        assert_eq!(manager.connection_generation(), None);

        let first = manager.current_stub().await.unwrap();
        let again = manager.current_stub().await.unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(manager.connector().connects.load(Ordering::SeqCst), 1);
        assert_eq!(manager.connection_generation(), Some(1));
    }

    #[tokio::test]
    async fn test_rebuild_stub_keeps_connection() {
        let manager = ConnectionManager::connect(Counting::default()).await.unwrap();
        let before = manager.current_stub().await.unwrap();

        manager.rebuild_stub().await.unwrap();
        let after = manager.current_stub().await.unwrap();

        assert!(Arc::ptr_eq(before.connection(), after.connection()));
        assert_eq!(before.connection_generation(), after.connection_generation());
        assert_eq!(after.stub_generation(), before.stub_generation() + 1);
        assert_ne!(before.stub().1, after.stub().1);
        assert_eq!(manager.connector().connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rebuild_connection_replaces_connection() {
        let manager = ConnectionManager::connect(Counting::default()).await.unwrap();
        let before = manager.current_stub().await.unwrap();

        manager.rebuild_connection().await.unwrap();
        let after = manager.current_stub().await.unwrap();

        assert!(!Arc::ptr_eq(before.connection(), after.connection()));
        assert_eq!(after.connection_generation(), before.connection_generation() + 1);
        assert_eq!(after.stub_generation(), 0);
        assert_eq!(**after.connection(), 2);
        // The old handle still works for whoever captured it.
        assert_eq!(**before.connection(), 1);
    }

    #[tokio::test]
    async fn test_failed_rebuild_surfaces_on_next_read_once() {
        let manager = ConnectionManager::connect(Counting::default()).await.unwrap();
        manager.connector().refuse.store(1, Ordering::SeqCst);

        let fault = manager.rebuild_connection().await.unwrap_err();
        assert_eq!(fault.kind, SocketErrorKind::ConnectionRefused);

        let reported = manager.current_stub().await.unwrap_err();
        assert_eq!(reported, Failure::Transport(fault));

        let recovered = manager.current_stub().await.unwrap();
        assert_eq!(**recovered.connection(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failed_rebuild_reaches_exactly_one_reader() {
        let manager = Arc::new(ConnectionManager::connect(Counting::default()).await.unwrap());
        manager.connector().refuse.store(1, Ordering::SeqCst);
        manager.rebuild_connection().await.unwrap_err();

        let readers: Vec<_> = (0..16)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.current_stub().await.is_err() })
            })
            .collect();
        let mut failures = 0;
        for reader in readers {
            if reader.await.unwrap() {
                failures += 1;
            }
        }

        assert_eq!(failures, 1);
        assert_eq!(manager.connector().connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rebuild_stub_without_connection_reconnects() {
        let manager = ConnectionManager::new(Counting::default());
        let handle = manager.rebuild_stub().await.unwrap();
        assert_eq!(handle.connection_generation(), 1);
    }

    #[tokio::test]
    async fn test_lazy_connect_failure_is_not_sticky() {
        let connector = Counting::default();
        connector.refuse.store(1, Ordering::SeqCst);
        let manager = ConnectionManager::new(connector);

        assert!(matches!(
            manager.current_stub().await,
            Err(Failure::Transport(_))
        ));
        assert!(manager.current_stub().await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_connects_once() {
        let manager = Arc::new(ConnectionManager::new(Counting::default()));
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.current_stub().await.map(|h| h.connection_generation()) })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 1);
        }
        assert_eq!(manager.connector().connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_race_rebuilds() {
        let manager = Arc::new(ConnectionManager::connect(Counting::default()).await.unwrap());

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    for _ in 0..100 {
                        let handle = manager.current_stub().await.unwrap();
                        assert_eq!(handle.stub().0, **handle.connection());
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            manager.rebuild_connection().await.unwrap();
            manager.rebuild_stub().await.unwrap();
        }
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(manager.connection_generation(), Some(21));
    }
}
