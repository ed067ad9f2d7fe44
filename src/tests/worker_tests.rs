//! tests/worker_tests.rs
//! Pruebas de `MigrationWorker` con un executor en memoria.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use actix_rt::test;
    use serde_json::json;

    use crate::models::callback_model::{CallbackContext, CallbackHook, CallbackOutcome, CallbackResult};
    use crate::models::job_model::MigrationStatus;
    use crate::models::migration_model::{ScriptPayload, ScriptType};
    use crate::services::callback_service::{CallbackRegistry, FnCallback};
    use crate::services::progress_service::{ProgressEvent, ProgressHub};
    use crate::services::worker_service::TIME_LIMIT_MESSAGE;
    use crate::tests::support::{memory_state, tenant, worker, RecordingExecutor};

    fn script(filename: &str, content: &str) -> ScriptPayload {
        ScriptPayload {
            filename: filename.to_string(),
            content: content.to_string(),
            version: "001".to_string(),
            description: "test".to_string(),
            script_type: ScriptType::Migration,
        }
    }

    fn scripts() -> Vec<ScriptPayload> {
        vec![
            script("V001__a.sql", "CREATE TABLE a (id INT);"),
            script("V002__b.sql", "CREATE TABLE b (id INT);"),
        ]
    }

    #[test]
    async fn applies_all_scripts_in_order() {
        let state = memory_state().await;
        state.create_job("job-1", None, &[tenant("acme")]).await.unwrap();
        let executor = Arc::new(RecordingExecutor::new());
        let hub = ProgressHub::new();
        let worker = worker(&state, CallbackRegistry::new(), executor.clone(), &hub, Duration::from_secs(5));

        let result = worker
            .apply_migration_to_tenant("job-1", &tenant("acme"), &scripts(), false)
            .await;

        assert_eq!(result.status, MigrationStatus::Success);
        assert_eq!(result.scripts_applied, vec!["V001__a.sql", "V002__b.sql"]);
        assert!(result.error_message.is_none());
        assert!(result.duration_seconds.is_some());
        assert_eq!(
            executor.executed(),
            vec![
                ("acme".to_string(), "CREATE TABLE a (id INT);".to_string()),
                ("acme".to_string(), "CREATE TABLE b (id INT);".to_string()),
            ]
        );

        let job = state.get_job("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, MigrationStatus::Success);
        assert_eq!(job.tenant_results["acme"].scripts_applied, result.scripts_applied);
    }

    #[test]
    async fn dry_run_touches_nothing() {
        let state = memory_state().await;
        state.create_job("job-1", None, &[tenant("acme")]).await.unwrap();
        let executor = Arc::new(RecordingExecutor::new());
        let hub = ProgressHub::new();
        let worker = worker(&state, CallbackRegistry::new(), executor.clone(), &hub, Duration::from_secs(5));

        let result = worker
            .apply_migration_to_tenant("job-1", &tenant("acme"), &scripts(), true)
            .await;

        assert_eq!(result.status, MigrationStatus::Success);
        assert_eq!(result.scripts_applied.len(), 2);
        assert!(executor.executed().is_empty());
    }

    #[test]
    async fn executor_error_fails_tenant_and_runs_on_error() {
        let state = memory_state().await;
        state.create_job("job-1", None, &[tenant("acme")]).await.unwrap();
        let seen_errors = Arc::new(Mutex::new(Vec::new()));

        let mut callbacks = CallbackRegistry::new();
        let sink = seen_errors.clone();
        callbacks.register(
            CallbackHook::OnError,
            Arc::new(FnCallback::new("collect", move |ctx: &CallbackContext| {
                sink.lock().unwrap().push(ctx.metadata["error"].clone());
                Ok(CallbackOutcome::Continue)
            })),
        );

        let hub = ProgressHub::new();
        let worker = worker(
            &state,
            callbacks,
            Arc::new(RecordingExecutor::failing_for(&["acme"])),
            &hub,
            Duration::from_secs(5),
        );

        let result = worker
            .apply_migration_to_tenant("job-1", &tenant("acme"), &scripts(), false)
            .await;

        assert_eq!(result.status, MigrationStatus::Failed);
        assert!(result.scripts_applied.is_empty());
        let message = result.error_message.clone().unwrap();
        assert!(message.contains("already exists"), "{}", message);
        assert_eq!(seen_errors.lock().unwrap().as_slice(), &[json!(message)]);

        let job = state.get_job("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, MigrationStatus::Failed);
        assert_eq!(job.failed_tenants, 1);
    }

    #[test]
    async fn before_tenant_failure_aborts_tenant() {
        let state = memory_state().await;
        state.create_job("job-1", None, &[tenant("acme")]).await.unwrap();

        let mut callbacks = CallbackRegistry::new();
        callbacks.register(
            CallbackHook::BeforeTenant,
            Arc::new(FnCallback::new("gate", |_ctx: &CallbackContext| {
                Ok(CallbackOutcome::Result(CallbackResult::fail("maintenance window closed")))
            })),
        );

        let executor = Arc::new(RecordingExecutor::new());
        let hub = ProgressHub::new();
        let worker = worker(&state, callbacks, executor.clone(), &hub, Duration::from_secs(5));

        let result = worker
            .apply_migration_to_tenant("job-1", &tenant("acme"), &scripts(), false)
            .await;

        assert_eq!(result.status, MigrationStatus::Failed);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Before tenant callback failed: maintenance window closed")
        );
        assert!(executor.executed().is_empty());
    }

    #[test]
    async fn before_script_can_skip_scripts() {
        let state = memory_state().await;
        state.create_job("job-1", None, &[tenant("acme")]).await.unwrap();

        let mut callbacks = CallbackRegistry::new();
        callbacks.register(
            CallbackHook::BeforeScript,
            Arc::new(FnCallback::new("skip_first", |ctx: &CallbackContext| {
                if ctx.current_script_index == 0 {
                    Ok(CallbackOutcome::Result(CallbackResult::skip(None)))
                } else {
                    Ok(CallbackOutcome::Continue)
                }
            })),
        );
        callbacks.register(
            CallbackHook::AfterScript,
            Arc::new(FnCallback::new("stamp", |ctx: &CallbackContext| {
                let mut data = HashMap::new();
                let filename = ctx.script.as_ref().map(|s| s.filename.clone()).unwrap_or_default();
                data.insert("last_script".to_string(), json!(filename));
                Ok(CallbackOutcome::Data(data))
            })),
        );

        let executor = Arc::new(RecordingExecutor::new());
        let hub = ProgressHub::new();
        let worker = worker(&state, callbacks, executor.clone(), &hub, Duration::from_secs(5));

        let result = worker
            .apply_migration_to_tenant("job-1", &tenant("acme"), &scripts(), false)
            .await;

        assert_eq!(result.status, MigrationStatus::Success);
        assert_eq!(result.scripts_skipped, vec!["V001__a.sql"]);
        assert_eq!(result.scripts_applied, vec!["V002__b.sql"]);
        assert_eq!(result.callback_metadata["last_script"], json!("V002__b.sql"));
        assert_eq!(executor.executed().len(), 1);
    }

    #[test]
    async fn slow_tenant_hits_time_limit() {
        let state = memory_state().await;
        state.create_job("job-1", None, &[tenant("acme")]).await.unwrap();
        let hub = ProgressHub::new();
        let worker = worker(
            &state,
            CallbackRegistry::new(),
            Arc::new(RecordingExecutor::with_delay(Duration::from_secs(5))),
            &hub,
            Duration::from_millis(50),
        );

        let result = worker
            .apply_migration_to_tenant("job-1", &tenant("acme"), &scripts(), false)
            .await;

        assert_eq!(result.status, MigrationStatus::Failed);
        assert_eq!(result.error_message.as_deref(), Some(TIME_LIMIT_MESSAGE));
    }

    #[test]
    async fn broadcasts_tenant_progress() {
        let state = memory_state().await;
        state.create_job("job-1", None, &[tenant("acme")]).await.unwrap();
        let hub = ProgressHub::new();
        let mut subscription = hub.subscribe("job-1");
        let worker = worker(
            &state,
            CallbackRegistry::new(),
            Arc::new(RecordingExecutor::new()),
            &hub,
            Duration::from_secs(5),
        );

        worker
            .apply_migration_to_tenant("job-1", &tenant("acme"), &scripts(), false)
            .await;

        assert_eq!(
            subscription.recv().await,
            Some(ProgressEvent::TenantProgress {
                tenant_id: "acme".to_string(),
                scripts_completed: 1,
                total_scripts: 2,
            })
        );
        assert_eq!(
            subscription.recv().await,
            Some(ProgressEvent::TenantProgress {
                tenant_id: "acme".to_string(),
                scripts_completed: 2,
                total_scripts: 2,
            })
        );
    }

    #[test]
    async fn finalize_reports_summary_and_runs_after_job() {
        let state = memory_state().await;
        state
            .create_job("job-1", None, &[tenant("a"), tenant("b")])
            .await
            .unwrap();
        let summary_seen = Arc::new(Mutex::new(None));

        let mut callbacks = CallbackRegistry::new();
        let sink = summary_seen.clone();
        callbacks.register(
            CallbackHook::AfterJob,
            Arc::new(FnCallback::new("summary", move |ctx: &CallbackContext| {
                *sink.lock().unwrap() = Some(ctx.metadata["failed_tenants"].clone());
                Ok(CallbackOutcome::Continue)
            })),
        );

        let hub = ProgressHub::new();
        let worker = worker(
            &state,
            callbacks,
            Arc::new(RecordingExecutor::failing_for(&["b"])),
            &hub,
            Duration::from_secs(5),
        );
        worker.apply_migration_to_tenant("job-1", &tenant("a"), &scripts(), false).await;
        worker.apply_migration_to_tenant("job-1", &tenant("b"), &scripts(), false).await;

        let finalized = worker.finalize_migration_job("job-1").await.unwrap().unwrap();
        assert_eq!(finalized.status, MigrationStatus::Partial);
        assert_eq!(finalized.summary.total, 2);
        assert_eq!(finalized.summary.successful, 1);
        assert_eq!(finalized.summary.failed, 1);
        assert_eq!(*summary_seen.lock().unwrap(), Some(json!(1)));

        assert!(worker.finalize_migration_job("missing").await.unwrap().is_none());
    }

    #[test]
    async fn rollback_runs_scripts_in_reverse() {
        let state = memory_state().await;
        let executor = Arc::new(RecordingExecutor::new());
        let hub = ProgressHub::new();
        let worker = worker(&state, CallbackRegistry::new(), executor.clone(), &hub, Duration::from_secs(5));

        let rollback = vec![
            script("R001__a.sql", "DROP TABLE a;"),
            script("R002__b.sql", "DROP TABLE b;"),
        ];
        let outcome = worker.rollback_migration("job-1", &tenant("acme"), &rollback).await;

        assert!(outcome.success);
        assert!(outcome.error.is_none());
        let contents: Vec<String> = executor.executed().into_iter().map(|(_, c)| c).collect();
        assert_eq!(contents, vec!["DROP TABLE b;", "DROP TABLE a;"]);

        let failing = worker_for_failure(&state, &hub);
        let outcome = failing.rollback_migration("job-1", &tenant("acme"), &rollback).await;
        assert!(!outcome.success);
        assert_eq!(outcome.tenant_id, "acme");
        assert!(outcome.error.is_some());
    }

    fn worker_for_failure(
        state: &crate::services::state_service::StateManager,
        hub: &ProgressHub,
    ) -> crate::services::worker_service::MigrationWorker {
        worker(
            state,
            CallbackRegistry::new(),
            Arc::new(RecordingExecutor::failing_for(&["acme"])),
            hub,
            Duration::from_secs(5),
        )
    }
}
