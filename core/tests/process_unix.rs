//! Integration tests for Unix process supervision
//!
//! These tests exercise the crate's public surface the way an external
//! consumer would: create a process from options, observe it through the
//! handle, signal it, and read its final state.

#![cfg(unix)]

use tokio_util::sync::CancellationToken;
use warden_core::executor::{Executor, LocalExecutor};
use warden_core::output::{OutputSink, SafeBuffer};
use warden_core::{spawn_process, CreateOptions, OutputSpec, Signal};

fn options(args: &[&str]) -> CreateOptions {
    CreateOptions::new(args.to_vec())
}

#[tokio::test]
async fn test_full_lifecycle_through_public_surface() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();

    let mut opts = options(&["echo", "-n", "supervised"]);
    opts.stdout = OutputSpec::Capture;
    let handle = spawn_process(&cancel, opts).expect("failed to create process");

    assert_eq!(handle.wait(&ctx).await.expect("process failed"), 0);
    assert_eq!(handle.stdout().unwrap().to_string_lossy(), "supervised");

    let info = handle.info(&ctx).await;
    assert!(info.complete);
    assert!(info.successful);
    assert!(!info.host.is_empty());
}

#[tokio::test]
async fn test_sigterm_ends_a_sleeping_process() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();

    let handle = spawn_process(&cancel, options(&["sleep", "10"])).unwrap();
    assert!(handle.running(&ctx).await);

    handle.signal(&ctx, Signal::Terminate).await.unwrap();
    let err = handle.wait(&ctx).await.unwrap_err();
    assert!(!err.is_canceled());

    let info = handle.info(&ctx).await;
    assert!(!info.successful);
    assert_eq!(info.exit_code, -1);
}

#[tokio::test]
async fn test_owner_cancellation_kills_the_process_tree_member() {
    let cancel = CancellationToken::new();
    let ctx = CancellationToken::new();

    let handle = spawn_process(&cancel, options(&["sleep", "10"])).unwrap();
    cancel.cancel();

    let err = handle.wait(&ctx).await.unwrap_err();
    assert!(!err.is_canceled());
    assert!(handle.complete(&ctx));
    assert_eq!(handle.info(&ctx).await.exit_code, -1);
}

#[tokio::test]
async fn test_executor_is_usable_directly() {
    let cancel = CancellationToken::new();
    let stdout = SafeBuffer::new();

    let mut exec = LocalExecutor::new(
        cancel.clone(),
        vec!["echo".to_string(), "-n".to_string(), "direct".to_string()],
    );
    exec.set_stdout(OutputSink::Buffer(stdout.clone())).unwrap();
    exec.start().unwrap();
    exec.wait().await.unwrap();

    assert!(exec.success());
    assert_eq!(exec.exit_code(), 0);
    assert_eq!(exec.signal_info(), (-1, false));
    assert_eq!(stdout.to_string_lossy(), "direct");
    exec.close().unwrap();
}
