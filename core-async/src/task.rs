//! Task spawning and execution.

pub use tokio::task::{spawn_blocking, yield_now, JoinError, JoinHandle};

/// Spawns a new asynchronous task on the ambient Tokio runtime.
///
/// # Examples
///
/// ```rust
/// use core_async::task;
///
/// async fn example() {
///     let handle = task::spawn(async { 7 });
///     assert_eq!(handle.await.unwrap(), 7);
/// }
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
