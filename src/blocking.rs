//! Blocking bridge: run the async client from synchronous code.
//!
//! A blocking call has to work in three situations:
//!
//! | [`ExecutionContext`] | What we do |
//! |----------------------|------------|
//! | `NoRuntime`      | create this thread's runtime, then drive the future on it |
//! | `IdleRuntime`    | drive the future on this thread's existing runtime |
//! | `RunningRuntime` | run the future on a scoped worker thread with a fresh runtime |
//!
//! Calling `block_on` from inside a running tokio runtime panics ("Cannot
//! start a runtime from within a runtime"), hence the worker thread in the
//! third case. The calling thread blocks until the worker finishes.
//!
//! The context is passed in explicitly; [`ExecutionContext::detect`] is the
//! usual way to obtain it. Keeping detection separate from execution makes
//! the strategy choice a pure function ([`BridgeStrategy::for_context`]).

use crate::error::ClientError;
use std::cell::OnceCell;
use std::future::Future;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

thread_local! {
    static THREAD_RUNTIME: OnceCell<Runtime> = const { OnceCell::new() };
}

/// The calling thread's relationship to a tokio runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    /// No runtime is running here and none has been created for this thread.
    NoRuntime,
    /// This thread owns a runtime from an earlier blocking call; it is not running.
    IdleRuntime,
    /// The caller is inside a running runtime (an async fn, a spawned task,
    /// or `block_on`).
    RunningRuntime,
}

impl ExecutionContext {
    /// Inspect the current thread.
    pub fn detect() -> Self {
        if Handle::try_current().is_ok() {
            ExecutionContext::RunningRuntime
        } else if THREAD_RUNTIME.with(|cell| cell.get().is_some()) {
            ExecutionContext::IdleRuntime
        } else {
            ExecutionContext::NoRuntime
        }
    }
}

/// How a blocking call will be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStrategy {
    /// Drive the future on the thread-local runtime.
    ThreadLocal,
    /// Hand the future to a worker thread with its own runtime.
    WorkerThread,
}

impl BridgeStrategy {
    pub fn for_context(context: ExecutionContext) -> Self {
        match context {
            ExecutionContext::NoRuntime | ExecutionContext::IdleRuntime => BridgeStrategy::ThreadLocal,
            ExecutionContext::RunningRuntime => BridgeStrategy::WorkerThread,
        }
    }
}

/// Run `future` to completion and return its result on the calling thread.
///
/// Errors from the future come back unchanged. A panic in the worker
/// thread is resumed on the caller.
pub fn block_on<T, F>(context: ExecutionContext, future: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>> + Send,
    T: Send,
{
    match BridgeStrategy::for_context(context) {
        BridgeStrategy::ThreadLocal => THREAD_RUNTIME.with(|cell| {
            let runtime = match cell.get() {
                Some(rt) => rt,
                None => {
                    let rt = new_runtime()?;
                    debug!("Created thread-local runtime for blocking calls");
                    cell.get_or_init(|| rt)
                }
            };
            runtime.block_on(future)
        }),
        BridgeStrategy::WorkerThread => {
            debug!("Inside a running runtime; offloading blocking call to a worker thread");
            std::thread::scope(|scope| {
                let worker = scope.spawn(move || new_runtime()?.block_on(future));
                match worker.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            })
        }
    }
}

/// Convenience: detect the context and run `future`.
pub fn run<T, F>(future: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>> + Send,
    T: Send,
{
    block_on(ExecutionContext::detect(), future)
}

/// Single-threaded runtime with I/O and timers.
fn new_runtime() -> Result<Runtime, ClientError> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ClientError::conversion(format!("Failed to create tokio runtime: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Duration;

    #[test]
    fn strategy_is_a_function_of_context() {
        assert_eq!(
            BridgeStrategy::for_context(ExecutionContext::NoRuntime),
            BridgeStrategy::ThreadLocal
        );
        assert_eq!(
            BridgeStrategy::for_context(ExecutionContext::IdleRuntime),
            BridgeStrategy::ThreadLocal
        );
        assert_eq!(
            BridgeStrategy::for_context(ExecutionContext::RunningRuntime),
            BridgeStrategy::WorkerThread
        );
    }

    #[test]
    fn creates_then_reuses_thread_local_runtime() {
        // Fresh thread so other tests on this thread cannot interfere.
        std::thread::spawn(|| {
            assert_eq!(ExecutionContext::detect(), ExecutionContext::NoRuntime);
            let v = run(async { Ok::<_, ClientError>(1) }).unwrap();
            assert_eq!(v, 1);
            assert_eq!(ExecutionContext::detect(), ExecutionContext::IdleRuntime);
            let v = run(async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                Ok::<_, ClientError>(2)
            })
            .unwrap();
            assert_eq!(v, 2);
        })
        .join()
        .unwrap();
    }

    #[tokio::test]
    async fn detects_running_runtime_and_offloads() {
        assert_eq!(ExecutionContext::detect(), ExecutionContext::RunningRuntime);
        let caller = std::thread::current().id();
        let worker = run(async { Ok::<_, ClientError>(std::thread::current().id()) }).unwrap();
        assert_ne!(caller, worker);
    }

    #[test]
    fn errors_pass_through_unchanged() {
        let err = ClientError::timeout("Request timed out after 1s").with_detail("url", "http://x/convert");
        let expected = err.clone();
        let got = run(async move { Err::<(), _>(err) }).unwrap_err();
        assert_eq!(got, expected);
        assert_eq!(got.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn errors_pass_through_from_worker_thread() {
        let got = tokio_test::block_on(async {
            run(async { Err::<(), _>(ClientError::invalid_input("nope").with_detail("field", "text")) })
        })
        .unwrap_err();
        assert_eq!(got.kind(), ErrorKind::InvalidInput);
        assert_eq!(got.details()["field"], "text");
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn worker_panics_are_resumed() {
        let fail = true;
        let _ = block_on(ExecutionContext::RunningRuntime, async move {
            if fail {
                panic!("boom");
            }
            Ok::<(), ClientError>(())
        });
    }
}
