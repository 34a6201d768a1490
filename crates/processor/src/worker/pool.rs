//! Worker pool for task execution
//!
//! Each registration gets a fixed number of workers sharing the receiving
//! end of the task channel. A worker handles one task at a time and survives
//! handler errors and panics.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Once};

use camunda_client::{ExternalTaskService, LockedExternalTask};
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument};

use crate::context::{BpmnError, TaskContext, TaskFailure};
use crate::error::{ErrorLogger, ProcessorError};

/// Boxed future returned by a handler
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Task handler function type
pub type TaskHandler = Arc<dyn Fn(TaskContext) -> HandlerFuture + Send + Sync>;

/// Shared receiving end of the task channel
pub(crate) type TaskReceiver = Arc<Mutex<mpsc::Receiver<LockedExternalTask>>>;

/// Result of running a handler behind the fault boundary
#[derive(Debug)]
pub enum Invocation {
    /// The handler returned normally and reported its own outcome
    Ok,
    /// The handler returned an error
    BusinessError(anyhow::Error),
    /// The handler panicked
    Fault { message: String, backtrace: String },
}

thread_local! {
    /// Backtrace of the last panic on this thread, taken by [`invoke`]
    static PANIC_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a panic hook that records the backtrace before unwinding starts
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture();
            PANIC_BACKTRACE.with(|cell| *cell.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

/// Run a handler, turning panics into [`Invocation::Fault`]
///
/// The fault carries the backtrace of the panic site. Unwinding finishes
/// inside the same poll, so the hook and this function share a thread.
pub async fn invoke(handler: &TaskHandler, ctx: TaskContext) -> Invocation {
    install_panic_hook();

    // The handler call itself may panic before returning a future
    let result = AssertUnwindSafe(async move { handler(ctx).await })
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(())) => Invocation::Ok,
        Ok(Err(err)) => Invocation::BusinessError(err),
        Err(payload) => {
            let backtrace = PANIC_BACKTRACE
                .with(|cell| cell.borrow_mut().take())
                .unwrap_or_else(Backtrace::force_capture);
            Invocation::Fault {
                message: panic_message(payload.as_ref()),
                backtrace: backtrace.to_string(),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Invoke the handler for one task and report errors it left unreported
///
/// An error or panic after the handler already completed, failed or raised
/// a BPMN error is logged but not reported again.
#[instrument(skip_all, fields(task_id = %ctx.task_id(), topic = %ctx.topic_name()))]
pub(crate) async fn handle_task(handler: &TaskHandler, ctx: TaskContext, error_logger: &ErrorLogger) {
    let task_id = ctx.task_id().to_string();

    let invocation = invoke(handler, ctx.clone()).await;
    let reported = ctx.outcome().is_some_and(|outcome| outcome.is_terminal());

    match invocation {
        Invocation::Ok => {
            debug!("Handler finished");
        }
        Invocation::BusinessError(err) if reported => {
            error_logger(&ProcessorError::Task {
                task_id,
                message: err.to_string(),
            });
        }
        Invocation::BusinessError(err) => match err.downcast::<BpmnError>() {
            Ok(bpmn) => {
                info!(code = %bpmn.code, "Handler raised BPMN error");
                if let Err(source) = ctx.handle_bpmn_error(bpmn).await {
                    error_logger(&ProcessorError::Report {
                        task_id,
                        operation: "bpmn error",
                        source,
                    });
                }
            }
            Err(err) => {
                let message = err.to_string();
                error_logger(&ProcessorError::Task {
                    task_id: task_id.clone(),
                    message: message.clone(),
                });
                if let Err(source) = ctx.handle_failure(TaskFailure::new(message)).await {
                    error_logger(&ProcessorError::Report {
                        task_id,
                        operation: "handle failure",
                        source,
                    });
                }
            }
        },
        Invocation::Fault { message, backtrace } => {
            let message = format!("fatal error in task: {message}");
            let details = format!("{message}\nStack trace: {backtrace}");
            error_logger(&ProcessorError::Fault {
                task_id: task_id.clone(),
                message: message.clone(),
                backtrace,
            });
            if reported {
                return;
            }
            let failure = TaskFailure::new(message).with_details(details);
            if let Err(source) = ctx.handle_failure(failure).await {
                error_logger(&ProcessorError::Report {
                    task_id,
                    operation: "handle failure",
                    source,
                });
            }
        }
    }
}

/// Spawn `size` workers (at least one) draining `receiver`
pub(crate) fn spawn_workers(
    tracker: &TaskTracker,
    size: usize,
    receiver: TaskReceiver,
    handler: TaskHandler,
    service: Arc<dyn ExternalTaskService>,
    error_logger: ErrorLogger,
) -> usize {
    let size = size.max(1);
    for index in 0..size {
        tracker.spawn(run_worker(
            index,
            receiver.clone(),
            handler.clone(),
            service.clone(),
            error_logger.clone(),
        ));
    }
    size
}

async fn run_worker(
    index: usize,
    receiver: TaskReceiver,
    handler: TaskHandler,
    service: Arc<dyn ExternalTaskService>,
    error_logger: ErrorLogger,
) {
    loop {
        // Lock only for the receive; other workers can take tasks while this one runs
        let task = receiver.lock().await.recv().await;
        let Some(task) = task else {
            break;
        };

        let ctx = TaskContext::new(task, service.clone());
        handle_task(&handler, ctx, &error_logger).await;
    }
    debug!(worker = index, "Worker stopped");
}

/// Wrap a closure returning any `Send` future as a [`TaskHandler`]
pub(crate) fn boxed_handler<F, Fut>(handler: F) -> TaskHandler
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(handler(ctx)) as HandlerFuture)
}
