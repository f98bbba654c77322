//! Synchronization primitives.
//!
//! All primitives are the Tokio ones: `Send + Sync`, async-aware, and safe to
//! hold across `.await` points. Short critical sections that never await use
//! `std::sync` locks instead (see `singleflight`).
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{Mutex, Semaphore};
//!
//! async fn example() {
//!     let mutex = Mutex::new(42);
//!     *mutex.lock().await += 1;
//!
//!     let permits = Semaphore::new(3);
//!     let _permit = permits.acquire().await.unwrap();
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Barrier, Mutex, MutexGuard, Notify, OwnedSemaphorePermit, RwLock,
    RwLockReadGuard, RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::CancellationToken;
