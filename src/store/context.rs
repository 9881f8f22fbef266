//! Caller context: cancellation token and deadline carried into every I/O call

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::types::{LedgerdayError, Result};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancellation token shared between a caller and a running invocation
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<CancelState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            // register before checking so a concurrent cancel is not missed
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Deadline-bearing context handed to every engine entry point
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// No deadline, never cancelled unless the token is fired
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the caller has already given up
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LedgerdayError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(LedgerdayError::Cancelled);
        }
        Ok(())
    }

    /// Run one I/O operation under this context.
    ///
    /// The operation is abandoned with `Cancelled` when the token fires or the
    /// deadline passes first. A completed operation's result is returned even
    /// if cancellation arrives right after.
    pub async fn guard<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, op)
                    .await
                    .map_err(|_| LedgerdayError::Cancelled)?,
                None => op.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(LedgerdayError::Cancelled),
            result = bounded => result,
        }
    }

    /// Run one write under this context.
    ///
    /// Cancellation and the deadline are honored only before the write
    /// starts. Once started it runs to completion and its own result is
    /// returned, so a reported error never hides a committed write.
    pub async fn commit<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        op.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_passes_result_through() {
        let ctx = Context::background();
        let value = ctx.guard(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_guard_passes_error_through() {
        let ctx = Context::background();
        let err = ctx
            .guard(async { Err::<(), _>(LedgerdayError::StoreRead("boom".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerdayError::StoreRead(_)));
    }

    #[tokio::test]
    async fn test_guard_rejects_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = Context::background().with_cancel(token);

        let err = ctx.guard(async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, LedgerdayError::Cancelled));
    }

    #[tokio::test]
    async fn test_guard_times_out_pending_operation() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let err = ctx
            .guard(std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerdayError::Cancelled));
    }

    #[tokio::test]
    async fn test_guard_interrupted_by_cancel() {
        let token = CancellationToken::new();
        let ctx = Context::background().with_cancel(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let err = ctx
            .guard(std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerdayError::Cancelled));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_runs_past_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(5));
        let value = ctx
            .commit(async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(3)
            })
            .await
            .unwrap();
        assert_eq!(value, 3);
        assert!(ctx.check().is_err());
    }

    #[tokio::test]
    async fn test_commit_rejected_before_start() {
        let token = CancellationToken::new();
        let ctx = Context::background().with_cancel(token.clone());
        ctx.token().cancel();
        assert!(token.is_cancelled());

        let started = AtomicBool::new(false);
        let err = ctx
            .commit(async {
                started.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerdayError::Cancelled));
        assert!(!started.load(Ordering::SeqCst));
    }

    #[test]
    fn test_deadline_accessor() {
        assert!(Context::background().deadline().is_none());

        let at = Instant::now() + Duration::from_secs(60);
        let ctx = Context::background().with_deadline(at);
        assert_eq!(ctx.deadline(), Some(at));
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn test_check_expired_deadline() {
        let ctx = Context::background().with_deadline(Instant::now());
        assert!(matches!(ctx.check(), Err(LedgerdayError::Cancelled)));
    }
}
