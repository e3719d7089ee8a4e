//! End-to-end tests for supervised processes
//!
//! These exercise the public handle surface against real commands, covering
//! the full lifecycle: creation, queries, signalling, deadlines, triggers,
//! and post-completion behavior.

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

fn opts(args: &[&str]) -> CreateOptions {
    CreateOptions::new(args.to_vec())
}

#[tokio::test]
async fn test_successful_command_reports_success() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let handle = spawn_process(&cancel, opts(&["true"])).unwrap();

    assert_eq!(handle.wait(&ctx).await.unwrap(), 0);

    let info = handle.info(&ctx).await;
    assert!(info.complete);
    assert!(info.successful);
    assert!(!info.is_running);
    assert_eq!(info.exit_code, 0);
    assert!(info.pid > 0);
    assert!(!info.timeout_triggered);
}

#[tokio::test]
async fn test_failing_command_reports_failure() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let handle = spawn_process(&cancel, opts(&["false"])).unwrap();

    let err = handle.wait(&ctx).await.unwrap_err();
    assert!(!err.is_canceled());

    let info = handle.info(&ctx).await;
    assert!(info.complete);
    assert!(!info.successful);
    assert!(info.exit_code > 0);
}

#[tokio::test]
async fn test_killed_command_reports_signal_death() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let handle = spawn_process(&cancel, opts(&["sleep", "1"])).unwrap();

    handle.signal(&ctx, Signal::Kill).await.unwrap();
    let err = handle.wait(&ctx).await.unwrap_err();
    assert!(!err.is_canceled());

    let info = handle.info(&ctx).await;
    assert!(info.complete);
    assert!(!info.successful);
    assert_eq!(info.exit_code, -1);
}

#[tokio::test]
async fn test_deadline_kills_the_process() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let mut options = opts(&["sleep", "10"]);
    options.timeout_secs = 1;

    let started = std::time::Instant::now();
    let handle = spawn_process(&cancel, options).unwrap();
    let err = handle.wait(&ctx).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(!err.is_canceled());
    assert!(err.to_string().contains("deadline"), "unexpected error: {err}");
    assert!(elapsed >= Duration::from_millis(900), "returned too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "returned too late: {elapsed:?}");

    let info = handle.info(&ctx).await;
    assert!(info.timeout_triggered);
    assert!(!info.successful);
    assert_eq!(info.exit_code, -1);
}

#[tokio::test]
async fn test_stdout_capture_through_handle() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let mut options = opts(&["echo", "-n", "hello"]);
    options.stdout = OutputSpec::Capture;

    let handle = spawn_process(&cancel, options).unwrap();
    handle.wait(&ctx).await.unwrap();

    assert_eq!(handle.stdout().unwrap().to_string_lossy(), "hello");
    assert!(handle.stderr().is_none());
}

#[tokio::test]
async fn test_stdin_bytes_reach_the_child() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let mut options = opts(&["tee"]);
    options.stdin = StdinSpec::Bytes(b"hello".to_vec());
    options.stdout = OutputSpec::Capture;

    let handle = spawn_process(&cancel, options).unwrap();
    handle.wait(&ctx).await.unwrap();

    assert_eq!(handle.stdout().unwrap().to_string_lossy(), "hello");
}

#[tokio::test]
async fn test_working_directory_applies() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let mut options = opts(&["pwd"]);
    options.working_directory = Some("/".to_string());
    options.stdout = OutputSpec::Capture;

    let handle = spawn_process(&cancel, options).unwrap();
    handle.wait(&ctx).await.unwrap();

    assert_eq!(handle.stdout().unwrap().to_string_lossy(), "/\n");
}

#[tokio::test]
async fn test_environment_applies() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let mut options = opts(&["env"]);
    options.environment = vec!["WARDEN_TEST_VAR=42".to_string()];
    options.stdout = OutputSpec::Capture;

    let handle = spawn_process(&cancel, options).unwrap();
    handle.wait(&ctx).await.unwrap();

    let output = handle.stdout().unwrap().to_string_lossy();
    assert!(output.contains("WARDEN_TEST_VAR=42"), "missing var in {output}");
}

#[tokio::test]
async fn test_trigger_observes_final_snapshot() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let handle = spawn_process(&cancel, opts(&["sleep", "1"])).unwrap();

    let seen: Arc<Mutex<Option<ProcessInfo>>> = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    handle
        .register_trigger(&ctx, move |info| {
            *sink.lock().unwrap() = Some(info);
        })
        .await
        .unwrap();

    handle.wait(&ctx).await.unwrap();

    let observed = seen.lock().unwrap().clone().expect("trigger did not fire");
    assert!(observed.complete);
    assert!(observed.successful);

    // Registration after completion fails and the late trigger never fires.
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let err = handle
        .register_trigger(&ctx, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyComplete(_)));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_triggers_fire_in_registration_order() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let handle = spawn_process(&cancel, opts(&["sleep", "1"])).unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    for index in 0..3 {
        let sink = order.clone();
        handle
            .register_trigger(&ctx, move |_| sink.lock().unwrap().push(index))
            .await
            .unwrap();
    }

    handle.wait(&ctx).await.unwrap();
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_panicking_trigger_does_not_skip_the_next_one() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let handle = spawn_process(&cancel, opts(&["sleep", "1"])).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    handle
        .register_trigger(&ctx, |_| panic!("boom"))
        .await
        .unwrap();
    let sink = fired.clone();
    handle
        .register_trigger(&ctx, move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    handle.wait(&ctx).await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fired_caller_token_short_circuits_queries() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let handle = spawn_process(&cancel, opts(&["sleep", "10"])).unwrap();

    let fired = CancellationToken::new();
    fired.cancel();

    assert!(!handle.info(&fired).await.complete);
    assert!(!handle.running(&fired).await);
    assert!(handle
        .signal(&fired, Signal::Terminate)
        .await
        .unwrap_err()
        .is_canceled());
    assert!(handle
        .register_trigger(&fired, |_| {})
        .await
        .unwrap_err()
        .is_canceled());
    assert!(handle.wait(&fired).await.unwrap_err().is_canceled());

    // The process itself is unaffected by caller cancellations.
    assert!(handle.running(&ctx).await);

    cancel.cancel();
    let err = handle.wait(&ctx).await.unwrap_err();
    assert!(!err.is_canceled());
    assert_eq!(handle.info(&ctx).await.exit_code, -1);
}

#[tokio::test]
async fn test_caller_cancellation_ends_only_that_wait() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let handle = spawn_process(&cancel, opts(&["sleep", "10"])).unwrap();

    let cctx = CancellationToken::new();
    let canceller = cctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = handle.wait(&cctx).await.unwrap_err();
    assert!(err.is_canceled());
    assert!(handle.running(&ctx).await);

    cancel.cancel();
    let _ = handle.wait(&ctx).await;
}

#[tokio::test]
async fn test_running_lifecycle() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let handle = spawn_process(&cancel, opts(&["sleep", "1"])).unwrap();

    assert!(handle.running(&ctx).await);
    assert!(!handle.complete(&ctx));
    let info = handle.info(&ctx).await;
    assert!(info.is_running);
    assert!(!info.complete);
    assert!(info.pid > 0);

    handle.wait(&ctx).await.unwrap();
    assert!(!handle.running(&ctx).await);
    assert!(handle.complete(&ctx));
}

#[tokio::test]
async fn test_reads_return_promptly_after_completion() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();
    let handle = spawn_process(&cancel, opts(&["true"])).unwrap();
    handle.wait(&ctx).await.unwrap();

    // A token nobody ever cancels must not block post-completion reads.
    let idle = CancellationToken::new();
    let info = timeout(Duration::from_secs(1), handle.info(&idle))
        .await
        .expect("info blocked after completion");
    assert!(info.complete);

    let running = timeout(Duration::from_secs(1), handle.running(&idle))
        .await
        .expect("running blocked after completion");
    assert!(!running);

    assert!(handle.complete(&idle));

    let err = timeout(Duration::from_secs(1), handle.signal(&idle, Signal::Kill))
        .await
        .expect("signal blocked after completion")
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyComplete(_)));

    // The captured outcome is returned from every subsequent wait.
    assert_eq!(handle.wait(&idle).await.unwrap(), 0);
}

#[tokio::test]
async fn test_process_ids() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();

    let generated = spawn_process(&cancel, opts(&["true"])).unwrap();
    assert!(!generated.id().is_empty());

    let mut options = opts(&["true"]);
    options.id = Some("my-proc".to_string());
    let named = spawn_process(&cancel, options).unwrap();
    assert_eq!(named.id(), "my-proc");
    assert_eq!(named.info(&ctx).await.id, "my-proc");
    assert_ne!(generated.id(), named.id());
}

#[tokio::test]
async fn test_concurrent_waiters_all_complete() {
    let cancel = CancellationToken::new();
    let handle = spawn_process(&cancel, opts(&["sleep", "1"])).unwrap();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let waiter = handle.clone();
        tasks.push(tokio::spawn(async move {
            let ctx = CancellationToken::new();
            waiter.wait(&ctx).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 0);
    }
}

#[tokio::test]
async fn test_creation_errors_produce_no_process() {
    let cancel = CancellationToken::new();

    let err = spawn_process(&cancel, CreateOptions::default()).unwrap_err();
    assert!(matches!(err, CoreError::ConfigurationError(_)));

    let err = spawn_process(&cancel, opts(&["warden-no-such-binary-xyz"])).unwrap_err();
    assert!(matches!(err, CoreError::StartError(_)));
}

#[tokio::test]
async fn test_spawn_fails_when_already_cancelled() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = spawn_process(&cancel, opts(&["true"])).unwrap_err();
    assert!(err.is_canceled());
}
