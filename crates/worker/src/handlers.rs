//! Demo handlers

use std::time::Duration;

use camunda_client::Variable;
use camunda_processor::{TaskCompletion, TaskContext};
use tracing::{info, warn};

/// Simulated work per task
pub const WORK_DELAY: Duration = Duration::from_secs(1);

/// Log `word`, then complete the task with `status = true`
pub async fn greet(ctx: TaskContext, word: &'static str, work: Duration) -> anyhow::Result<()> {
    info!(
        task_id = %ctx.task_id(),
        worker_id = %ctx.worker_id(),
        topic = %ctx.topic_name(),
        "Running task"
    );

    tokio::time::sleep(work).await;
    info!("{word}");

    let completion = TaskCompletion::new().with_variable("status", Variable::boolean(true));
    match ctx.complete(completion).await {
        Ok(()) => info!(task_id = %ctx.task_id(), "Task completed"),
        // The lock is gone, so there is nothing left to report
        Err(err) => warn!(task_id = %ctx.task_id(), error = %err, "Failed to complete task"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use camunda_client::{
        ExternalTaskService, FetchAndLock, FetchAndLockTopic, InMemoryExternalTaskService,
        NewTask, RecordedCall, TaskStatus,
    };

    async fn locked(service: &Arc<InMemoryExternalTaskService>, topic: &str) -> TaskContext {
        let query = FetchAndLock {
            worker_id: "hello-world-worker".to_string(),
            max_tasks: 1,
            use_priority: None,
            async_response_timeout: None,
            topics: vec![FetchAndLockTopic::new(topic).with_lock_duration(5000)],
        };
        let task = service.fetch_and_lock(&query).await.unwrap().remove(0);
        TaskContext::new(task, service.clone())
    }

    #[tokio::test]
    async fn test_greet_completes_with_status() {
        let service = Arc::new(InMemoryExternalTaskService::new());
        let id = service.add_task(NewTask::new("PrintHello"));
        let ctx = locked(&service, "PrintHello").await;

        greet(ctx, "Hello", Duration::ZERO).await.unwrap();

        let task = service.task(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.variables["status"].as_bool(), Some(true));
    }

    #[tokio::test]
    async fn test_greet_tolerates_lost_lock() {
        let service = Arc::new(InMemoryExternalTaskService::new());
        let id = service.add_task(NewTask::new("PrintWorld"));
        let ctx = locked(&service, "PrintWorld").await;
        service.expire_lock(&id);

        greet(ctx, "World", Duration::ZERO).await.unwrap();

        assert!(matches!(service.calls()[0], RecordedCall::Complete { .. }));
        assert_ne!(service.task(&id).unwrap().status, TaskStatus::Completed);
    }
}
