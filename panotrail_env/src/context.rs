//! Core environment context trait for a navigation session.

use async_trait::async_trait;
use std::time::Duration;

/// The session's view of time.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - virtual clock advanced by `sleep()`
#[async_trait]
pub trait SessionContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// Used once per session to let the viewer surface lay out before the
    /// viewer engine is initialized.
    async fn sleep(&self, duration: Duration);
}
