//! Executor behaviour against ordinary POSIX utilities.

use std::time::{Duration, Instant};

use fct_common::Cancel;
use fct_exec::{ExecError, Executor, JobError, Spec};

#[tokio::test]
async fn foreground_success() {
    let mut ex = Executor::new();
    let job = ex.run("true", [""; 0]).await.expect("job runs");
    assert!(job.err().is_none());
    assert!(job.status().is_some_and(|s| s.success()));
    assert_eq!(ex.err(), Ok(()));
}

#[tokio::test]
async fn run_line_captures_stdout() {
    let mut ex = Executor::new();
    let job = ex.run_line("echo hello   world").await.unwrap();
    assert_eq!(job.command(), "echo hello world");
    assert_eq!(job.stdout_lossy(), "hello world\n");
}

#[tokio::test]
async fn stdin_is_delivered_and_closed() {
    let mut ex = Executor::new();
    let spec = Spec::default().with_stdin("some input\n");
    let job = ex.run_spec(spec, "cat", [""; 0]).await.unwrap();
    assert_eq!(job.stdout(), b"some input\n");
}

#[tokio::test]
async fn large_output_does_not_deadlock() {
    // far more than a pipe buffer on both streams
    let mut ex = Executor::new();
    let script = "head -c 1000000 /dev/zero; head -c 1000000 /dev/zero >&2";
    let job = tokio::time::timeout(Duration::from_secs(20), ex.run("sh", ["-c", script]))
        .await
        .expect("output is drained while the process runs")
        .unwrap();
    assert_eq!(job.stdout().len(), 1_000_000);
    assert_eq!(job.stderr().len(), 1_000_000);
}

#[tokio::test]
async fn failure_is_counted_and_gates_later_jobs() {
    let mut ex = Executor::new();
    let job = ex.run("false", [""; 0]).await.unwrap();
    assert!(matches!(job.err(), Some(JobError::Exit(_))));
    assert_eq!(ex.errors(), 1);

    assert!(ex.run("true", [""; 0]).await.is_none(), "skipped after a failure");
    assert_eq!(ex.jobs().len(), 1);

    let err = ex.err().unwrap_err();
    assert_eq!(err, ExecError::Failed { count: 1 });
    assert_eq!(err.to_string(), "1 jobs with nonzero exit status");
}

#[tokio::test]
async fn ignore_errors_keeps_submitting() {
    let mut ex = Executor::default();
    ex.ignore_errors = true;
    ex.run("false", [""; 0]).await;
    ex.run("false", [""; 0]).await;
    assert!(ex.run("true", [""; 0]).await.is_some());
    assert_eq!(ex.errors(), 2);
}

#[tokio::test]
async fn ignored_job_is_not_counted() {
    let mut ex = Executor::new();
    let spec = Spec {
        ignore_errors: true,
        ..Default::default()
    };
    let job = ex.run_spec(spec, "false", [""; 0]).await.unwrap();
    assert!(job.err().is_none());
    assert_eq!(ex.err(), Ok(()));
}

#[tokio::test]
async fn missing_program_and_empty_line_fail() {
    let mut ex = Executor::default();
    ex.ignore_errors = true;
    let job = ex.run("definitely-not-a-command-xyz", [""; 0]).await.unwrap();
    assert!(matches!(job.err(), Some(JobError::Spawn(_))));
    let job = ex.run_line("   ").await.unwrap();
    assert!(matches!(job.err(), Some(JobError::EmptyCommand)));
    assert_eq!(ex.errors(), 2);
}

#[tokio::test]
async fn deadline_kills_foreground_job() {
    let mut ex = Executor::new();
    let spec = Spec::default().with_cancel(Cancel::new().with_timeout(Duration::from_millis(100)));
    let started = Instant::now();
    let job = ex.run_spec(spec, "sleep", ["30"]).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(job.err().is_some());
    assert_eq!(ex.errors(), 1);
}

#[tokio::test]
async fn interrupt_then_wait_returns() {
    let mut ex = Executor::new();
    let job = ex.run_spec(Spec::background(), "sleep", ["30"]).await.unwrap();
    assert!(job.pid().is_some());
    assert!(job.is_running());

    ex.interrupt();
    ex.interrupt();
    tokio::time::timeout(Duration::from_secs(10), ex.wait())
        .await
        .expect("wait returns after interrupt");

    // SIGINT terminates sleep, which is a failed exit
    assert_eq!(ex.errors(), 1);
    assert!(!ex.jobs()[0].is_running());

    // signalling exited jobs is a no-op
    ex.interrupt();
    ex.kill();
    ex.kill();
    assert_eq!(ex.errors(), 1);
}

#[tokio::test]
async fn wait_is_idempotent() {
    let mut ex = Executor::default();
    ex.ignore_errors = true;
    ex.run_spec(Spec::background(), "false", [""; 0]).await;
    ex.wait().await;
    assert_eq!(ex.errors(), 1);
    ex.wait().await;
    assert_eq!(ex.errors(), 1);
}

#[tokio::test]
async fn background_output_is_collected_on_wait() {
    let mut ex = Executor::new();
    ex.run_spec(Spec::background(), "echo", ["later"]).await;
    assert!(ex.jobs()[0].stdout().is_empty());
    ex.wait().await;
    assert_eq!(ex.jobs()[0].stdout_lossy(), "later\n");
    assert_eq!(ex.err(), Ok(()));
}

#[tokio::test]
async fn no_wait_jobs_are_skipped_by_wait_and_killable() {
    let mut ex = Executor::new();
    ex.run_spec(Spec::daemon(), "sleep", ["30"]).await;

    tokio::time::timeout(Duration::from_secs(2), ex.wait())
        .await
        .expect("no_wait job is not waited for");
    assert!(ex.jobs()[0].is_running());

    ex.kill();
    let deadline = Instant::now() + Duration::from_secs(10);
    while ex.jobs()[0].is_running() {
        assert!(Instant::now() < deadline, "kill did not stop the job");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // never waited, so never counted
    assert_eq!(ex.err(), Ok(()));
}
