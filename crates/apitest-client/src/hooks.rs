//! Ordered hook runner shared by the setup and teardown phases.
//!
//! A hook runs against a subject (the request for setup, the response for
//! teardown) and may hand back a [`Cleanup`]. Cleanups are registered the
//! moment their hook returns, so a later hook failing still cleans up after
//! the earlier ones.

use crate::error::ApiError;
use apitest_log::spans::hook_span;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

/// Boxed cleanup callback.
pub type BoxCleanup<T> = Box<dyn Cleanup<T>>;

/// What a hook returns: an optional cleanup, or the reason it failed.
pub type HookResult<T> = anyhow::Result<Option<BoxCleanup<T>>>;

/// Which half of the lifecycle a hook belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// Before the request is sent.
    Setup,
    /// After a response was obtained.
    Teardown,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Setup => f.write_str("setup"),
            HookPhase::Teardown => f.write_str("teardown"),
        }
    }
}

/// A lifecycle hook.
///
/// Plain closures `Fn(&mut T) -> HookResult<T>` implement this trait;
/// implement it by hand for hooks that need to await.
#[async_trait]
pub trait Hook<T: Send + 'static>: Send + Sync {
    /// Run the hook against its subject.
    async fn run(&self, subject: &mut T) -> HookResult<T>;
}

#[async_trait]
impl<T, F> Hook<T> for F
where
    T: Send + 'static,
    F: Fn(&mut T) -> HookResult<T> + Send + Sync,
{
    async fn run(&self, subject: &mut T) -> HookResult<T> {
        self(subject)
    }
}

/// Callback invoked once the phase that registered it is over.
///
/// `error` is `None` when the phase (and, for setup, the request) succeeded.
/// Closures returning `anyhow::Result<()>` implement this trait.
#[async_trait]
pub trait Cleanup<T: Send + 'static>: Send {
    /// Consume the cleanup.
    async fn cleanup(self: Box<Self>, error: Option<&ApiError>, subject: &mut T) -> anyhow::Result<()>;
}

#[async_trait]
impl<T, F> Cleanup<T> for F
where
    T: Send + 'static,
    F: FnOnce(Option<&ApiError>, &mut T) -> anyhow::Result<()> + Send,
{
    async fn cleanup(self: Box<Self>, error: Option<&ApiError>, subject: &mut T) -> anyhow::Result<()> {
        (*self)(error, subject)
    }
}

/// Wrap a closure as the cleanup returned from a hook.
///
/// ```ignore
/// request.setup(|_req| {
///     let user = seed_user()?;
///     Ok(cleanup(move |_error, _req| drop_user(user)))
/// });
/// ```
pub fn cleanup<T, F>(f: F) -> Option<BoxCleanup<T>>
where
    T: Send + 'static,
    F: FnOnce(Option<&ApiError>, &mut T) + Send + 'static,
{
    try_cleanup(move |error: Option<&ApiError>, subject: &mut T| -> anyhow::Result<()> {
        f(error, subject);
        Ok(())
    })
}

/// Wrap a fallible closure as the cleanup returned from a hook.
pub fn try_cleanup<T, F>(f: F) -> Option<BoxCleanup<T>>
where
    T: Send + 'static,
    F: FnOnce(Option<&ApiError>, &mut T) -> anyhow::Result<()> + Send + 'static,
{
    Some(Box::new(f))
}

/// Executes hooks in registration order and their cleanups in reverse.
pub struct HookRunner<T: Send + 'static> {
    phase: HookPhase,
    hooks: Vec<Arc<dyn Hook<T>>>,
    cleanups: Vec<BoxCleanup<T>>,
    cleaned_up: bool,
}

impl<T: Send + 'static> HookRunner<T> {
    /// Create a runner over a snapshot of hooks.
    pub fn new(phase: HookPhase, hooks: Vec<Arc<dyn Hook<T>>>) -> Self {
        Self {
            phase,
            hooks,
            cleanups: Vec::new(),
            cleaned_up: false,
        }
    }

    /// Phase this runner serves.
    pub fn phase(&self) -> HookPhase {
        self.phase
    }

    /// Number of hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether there are no hooks.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Cleanups registered and not yet invoked.
    pub fn pending_cleanups(&self) -> usize {
        self.cleanups.len()
    }

    /// Run every hook in order, stopping at the first failure.
    ///
    /// Cleanups registered before the failure stay pending; the caller is
    /// expected to follow up with [`HookRunner::cleanup`].
    pub async fn run(&mut self, subject: &mut T) -> Result<(), ApiError> {
        let phase = self.phase;
        let span = hook_span(&phase.to_string());

        async {
            for (index, hook) in self.hooks.iter().enumerate() {
                match hook.run(subject).await {
                    Ok(Some(cleanup)) => self.cleanups.push(cleanup),
                    Ok(None) => {}
                    Err(error) => {
                        tracing::debug!(%phase, index, error = %error, "hook failed");
                        return Err(ApiError::Hook { phase, error });
                    }
                }
            }
            tracing::debug!(%phase, hooks = self.hooks.len(), "hooks completed");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Invoke pending cleanups, last registered first. Runs at most once.
    ///
    /// With `error` set, cleanup failures are logged and dropped so that the
    /// original error is the one reported. Without it, every cleanup still
    /// runs and the first failure is returned.
    pub async fn cleanup(&mut self, error: Option<&ApiError>, subject: &mut T) -> Result<(), ApiError> {
        if self.cleaned_up {
            return Ok(());
        }
        self.cleaned_up = true;

        let phase = self.phase;
        let mut first_failure = None;

        while let Some(cleanup) = self.cleanups.pop() {
            if let Err(failure) = cleanup.cleanup(error, subject).await {
                if error.is_some() || first_failure.is_some() {
                    tracing::warn!(%phase, error = %failure, "cleanup failed");
                } else {
                    first_failure = Some(failure);
                }
            }
        }

        match first_failure {
            Some(error) => Err(ApiError::Cleanup { phase, error }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn push(log: &Log, entry: &str) {
        log.lock().push(entry.to_string());
    }

    fn recording_hook(log: &Log, name: &'static str) -> Arc<dyn Hook<u32>> {
        let log = log.clone();
        Arc::new(move |subject: &mut u32| -> HookResult<u32> {
            *subject += 1;
            push(&log, name);
            let log = log.clone();
            Ok(cleanup(move |error: Option<&ApiError>, _: &mut u32| {
                let suffix = if error.is_some() { " (error)" } else { "" };
                push(&log, &format!("{} cleanup{}", name, suffix));
            }))
        })
    }

    fn failing_hook(log: &Log) -> Arc<dyn Hook<u32>> {
        let log = log.clone();
        Arc::new(move |_: &mut u32| -> HookResult<u32> {
            push(&log, "failing");
            anyhow::bail!("boom")
        })
    }

    struct FailingCleanup(&'static str);

    #[async_trait]
    impl Cleanup<u32> for FailingCleanup {
        async fn cleanup(self: Box<Self>, _: Option<&ApiError>, _: &mut u32) -> anyhow::Result<()> {
            anyhow::bail!(self.0)
        }
    }

    struct AsyncHook(Log);

    #[async_trait]
    impl Hook<u32> for AsyncHook {
        async fn run(&self, subject: &mut u32) -> HookResult<u32> {
            tokio::task::yield_now().await;
            *subject *= 10;
            push(&self.0, "async");
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_hooks_run_in_order_and_cleanups_in_reverse() {
        let log = Log::default();
        let mut runner = HookRunner::new(
            HookPhase::Setup,
            vec![recording_hook(&log, "first"), recording_hook(&log, "second")],
        );
        let mut subject = 0;

        runner.run(&mut subject).await.unwrap();
        assert_eq!(runner.pending_cleanups(), 2);
        runner.cleanup(None, &mut subject).await.unwrap();

        assert_eq!(subject, 2);
        assert_eq!(
            *log.lock(),
            vec!["first", "second", "second cleanup", "first cleanup"]
        );
    }

    #[tokio::test]
    async fn test_failure_stops_run_and_keeps_earlier_cleanups() {
        let log = Log::default();
        let mut runner = HookRunner::new(
            HookPhase::Teardown,
            vec![
                recording_hook(&log, "first"),
                failing_hook(&log),
                recording_hook(&log, "never"),
            ],
        );
        let mut subject = 0;

        let error = runner.run(&mut subject).await.unwrap_err();
        assert_eq!(error.hook_phase(), Some(HookPhase::Teardown));
        assert_eq!(error.to_string(), "teardown hook failed: boom");

        runner.cleanup(Some(&error), &mut subject).await.unwrap();
        assert_eq!(*log.lock(), vec!["first", "failing", "first cleanup (error)"]);
    }

    #[tokio::test]
    async fn test_cleanup_runs_once() {
        let log = Log::default();
        let mut runner = HookRunner::new(HookPhase::Setup, vec![recording_hook(&log, "only")]);
        let mut subject = 0;

        runner.run(&mut subject).await.unwrap();
        runner.cleanup(None, &mut subject).await.unwrap();
        runner.cleanup(None, &mut subject).await.unwrap();

        assert_eq!(*log.lock(), vec!["only", "only cleanup"]);
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_reported_without_prior_error() {
        let log = Log::default();
        let failing: Arc<dyn Hook<u32>> = Arc::new(|_: &mut u32| -> HookResult<u32> {
            Ok(Some(Box::new(FailingCleanup("cannot drop table"))))
        });
        let mut runner = HookRunner::new(
            HookPhase::Setup,
            vec![recording_hook(&log, "first"), failing],
        );
        let mut subject = 0;

        runner.run(&mut subject).await.unwrap();
        let error = runner.cleanup(None, &mut subject).await.unwrap_err();

        assert_eq!(error.to_string(), "setup cleanup failed: cannot drop table");
        // The remaining cleanup still ran.
        assert_eq!(*log.lock(), vec!["first", "first cleanup"]);
    }

    #[tokio::test]
    async fn test_closure_cleanup_failure_is_reported() {
        let log = Log::default();
        let failing: Arc<dyn Hook<u32>> = Arc::new(|_: &mut u32| -> HookResult<u32> {
            Ok(try_cleanup(|_: Option<&ApiError>, subject: &mut u32| {
                anyhow::ensure!(*subject == 0, "subject still has {} rows", subject);
                Ok(())
            }))
        });
        let mut runner = HookRunner::new(
            HookPhase::Teardown,
            vec![recording_hook(&log, "first"), failing],
        );
        let mut subject = 0;

        runner.run(&mut subject).await.unwrap();
        let error = runner.cleanup(None, &mut subject).await.unwrap_err();

        assert_eq!(error.to_string(), "teardown cleanup failed: subject still has 1 rows");
        assert_eq!(*log.lock(), vec!["first", "first cleanup"]);
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_swallowed_when_already_failing() {
        let failing: Arc<dyn Hook<u32>> = Arc::new(|_: &mut u32| -> HookResult<u32> {
            Ok(Some(Box::new(FailingCleanup("ignored"))))
        });
        let mut runner = HookRunner::new(HookPhase::Setup, vec![failing]);
        let mut subject = 0;
        runner.run(&mut subject).await.unwrap();

        let original = ApiError::Timeout;
        assert!(runner.cleanup(Some(&original), &mut subject).await.is_ok());
    }

    #[tokio::test]
    async fn test_async_hooks() {
        let log = Log::default();
        let mut runner = HookRunner::new(
            HookPhase::Setup,
            vec![recording_hook(&log, "sync"), Arc::new(AsyncHook(log.clone()))],
        );
        let mut subject = 0;

        runner.run(&mut subject).await.unwrap();

        assert_eq!(subject, 10);
        assert_eq!(*log.lock(), vec!["sync", "async"]);
        assert_eq!(runner.len(), 2);
        assert!(!runner.is_empty());
    }

    #[tokio::test]
    async fn test_empty_runner() {
        let mut runner: HookRunner<u32> = HookRunner::new(HookPhase::Teardown, Vec::new());
        let mut subject = 7;

        runner.run(&mut subject).await.unwrap();
        runner.cleanup(None, &mut subject).await.unwrap();

        assert!(runner.is_empty());
        assert_eq!(runner.phase(), HookPhase::Teardown);
        assert_eq!(subject, 7);
    }

    #[test]
    fn test_closure_hooks_never_yield() {
        let log = Log::default();
        let mut runner = HookRunner::new(HookPhase::Setup, vec![recording_hook(&log, "sync")]);
        let mut subject = 0;

        {
            let mut run = tokio_test::task::spawn(runner.run(&mut subject));
            tokio_test::assert_ready_ok!(run.poll());
        }
        {
            let mut cleanup = tokio_test::task::spawn(runner.cleanup(None, &mut subject));
            tokio_test::assert_ready_ok!(cleanup.poll());
        }

        assert_eq!(*log.lock(), vec!["sync", "sync cleanup"]);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(HookPhase::Setup.to_string(), "setup");
        assert_eq!(HookPhase::Teardown.to_string(), "teardown");
    }
}
