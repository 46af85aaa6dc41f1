#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bytes::Bytes;
use keystone::tasks::{
    Executor, ExecutorConfig, FileWriteTask, FusionTask, Outcome, ProcessExecutor, ProcessSettings,
    ScriptTask, TaskDefinition,
};

/// Fusion runs as `<exe> RUN ZBSPEC <fpgm>`. With `/bin/sh` as the exe, sh
/// reads `./RUN` from the working directory as its script, so a stub never
/// has to be an executable file.
fn executor(dir: &Path, timeout: Duration) -> ProcessExecutor {
    let settings = ProcessSettings {
        working_dir: dir.to_path_buf(),
        timeout,
    };
    ProcessExecutor::new(ExecutorConfig {
        fusion_exe: PathBuf::from("/bin/sh"),
        fusion: settings.clone(),
        script: settings,
    })
}

fn fusion(fpgm: &str) -> TaskDefinition {
    TaskDefinition::Fusion(FusionTask {
        fpgm: fpgm.to_string(),
    })
}

fn sh(script: &str) -> TaskDefinition {
    TaskDefinition::Script(ScriptTask {
        command: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
    })
}

fn pid_alive(pid: &str) -> bool {
    std::process::Command::new("kill")
        .args(["-0", pid])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

// ── Fusion ────────────────────────────────────────────────────────

#[tokio::test]
async fn fusion_stub_prints_ok() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("RUN"), "echo ok\n").unwrap();

    let outcome = executor(dir.path(), Duration::from_secs(10))
        .run(&fusion("demo"), Bytes::new())
        .await
        .unwrap();

    match outcome {
        Outcome::Completed(output) => {
            assert_eq!(output.exit_code, 0);
            assert!(output.stdout.contains("ok"));
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn fusion_receives_fixed_flags_then_fpgm() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("RUN"), "printf '%s|%s' \"$1\" \"$2\"\n").unwrap();

    let outcome = executor(dir.path(), Duration::from_secs(10))
        .run(&fusion("NIGHTLY"), Bytes::new())
        .await
        .unwrap();

    match outcome {
        Outcome::Completed(output) => assert_eq!(output.stdout, "ZBSPEC|NIGHTLY"),
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn fusion_fpgm_is_a_single_argument() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("RUN"), "printf '%s' \"$#\"\n").unwrap();

    let outcome = executor(dir.path(), Duration::from_secs(10))
        .run(&fusion("two words; rm -rf x"), Bytes::new())
        .await
        .unwrap();

    match outcome {
        Outcome::Completed(output) => assert_eq!(output.stdout, "2"),
        other => panic!("expected Completed, got {other:?}"),
    }
}

// ── Script ────────────────────────────────────────────────────────

#[tokio::test]
async fn script_runs_in_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = executor(dir.path(), Duration::from_secs(10))
        .run(&sh("pwd -P"), Bytes::new())
        .await
        .unwrap();

    let expected = fs::canonicalize(dir.path()).unwrap();
    match outcome {
        Outcome::Completed(output) => {
            assert_eq!(output.stdout.trim(), expected.to_str().unwrap())
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn script_nonzero_exit_is_failure_with_output() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = executor(dir.path(), Duration::from_secs(10))
        .run(&sh("printf partial; printf oops >&2; exit 3"), Bytes::new())
        .await
        .unwrap();

    match outcome {
        Outcome::Failed(output) => {
            assert_eq!(output.exit_code, 3);
            assert_eq!(output.stdout, "partial");
            assert_eq!(output.stderr, "oops");
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn script_killed_by_signal_reports_minus_one() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = executor(dir.path(), Duration::from_secs(10))
        .run(&sh("kill -9 $$"), Bytes::new())
        .await
        .unwrap();

    match outcome {
        Outcome::Failed(output) => assert_eq!(output.exit_code, -1),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn large_output_is_captured_in_full() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = executor(dir.path(), Duration::from_secs(10))
        .run(&sh("head -c 200000 /dev/zero | tr '\\0' x"), Bytes::new())
        .await
        .unwrap();

    match outcome {
        Outcome::Completed(output) => {
            // chunk boundaries show up as single spaces
            let payload: String = output.stdout.chars().filter(|c| *c != ' ').collect();
            assert_eq!(payload.len(), 200_000);
            assert!(payload.chars().all(|c| c == 'x'));
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn body_is_ignored_for_process_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = executor(dir.path(), Duration::from_secs(10))
        .run(&sh("cat"), Bytes::from_static(b"should not arrive"))
        .await
        .unwrap();

    match outcome {
        Outcome::Completed(output) => assert_eq!(output.stdout, ""),
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_program_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let task = TaskDefinition::Script(ScriptTask {
        command: "/definitely/not/here".to_string(),
        args: vec![],
    });

    let result = executor(dir.path(), Duration::from_secs(10))
        .run(&task, Bytes::new())
        .await;
    assert!(result.unwrap_err().to_string().contains("failed to spawn"));
}

// ── Timeout ───────────────────────────────────────────────────────

#[tokio::test]
async fn timeout_kills_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let limit = Duration::from_millis(300);
    let started = Instant::now();

    let outcome = executor(dir.path(), limit)
        .run(&sh("echo $$ > pid; exec sleep 30"), Bytes::new())
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::TimedOut { limit });
    assert!(started.elapsed() < Duration::from_secs(5));

    let pid = fs::read_to_string(dir.path().join("pid")).unwrap();
    assert!(!pid_alive(pid.trim()), "process {} still running", pid.trim());
}

/// Whether `pid` is still running. An exited but unreaped process counts as gone.
#[cfg(target_os = "linux")]
fn running(pid: &str) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat
            .rsplit_once(") ")
            .is_some_and(|(_, rest)| rest.starts_with('Z')),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn timeout_kills_background_children() {
    let dir = tempfile::tempdir().unwrap();
    let limit = Duration::from_millis(300);

    let outcome = executor(dir.path(), limit)
        .run(&sh("sleep 30 & echo $! > pid; wait"), Bytes::new())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::TimedOut { limit });

    let pid = fs::read_to_string(dir.path().join("pid")).unwrap();
    let pid = pid.trim();
    let deadline = Instant::now() + Duration::from_secs(3);
    while running(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!running(pid), "background process {pid} outlived the timeout");
}

#[tokio::test]
async fn fast_process_beats_its_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = executor(dir.path(), Duration::from_secs(5))
        .run(&sh("sleep 0.1; echo done"), Bytes::new())
        .await
        .unwrap();
    assert!(outcome.is_success());
}

// ── File write ────────────────────────────────────────────────────

fn write_to(path: &Path) -> TaskDefinition {
    TaskDefinition::WriteFile(FileWriteTask {
        destination: path.to_path_buf(),
    })
}

#[tokio::test]
async fn write_file_round_trips_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("payload.bin");
    let body: Vec<u8> = (0..=255u8).chain(b"\n{\"k\": 1}\r\n".iter().copied()).collect();

    let outcome = executor(dir.path(), Duration::from_secs(10))
        .run(&write_to(&dest), Bytes::from(body.clone()))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        Outcome::Written {
            path: dest.clone(),
            bytes: body.len()
        }
    );
    assert_eq!(fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn write_file_overwrites_existing() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("payload.json");
    fs::write(&dest, "a much longer previous content").unwrap();

    executor(dir.path(), Duration::from_secs(10))
        .run(&write_to(&dest), Bytes::from_static(b"new"))
        .await
        .unwrap();

    assert_eq!(fs::read_to_string(&dest).unwrap(), "new");
}

#[tokio::test]
async fn write_file_into_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("missing").join("payload.json");

    let outcome = executor(dir.path(), Duration::from_secs(10))
        .run(&write_to(&dest), Bytes::from_static(b"data"))
        .await
        .unwrap();

    match outcome {
        Outcome::WriteFailed { path, error } => {
            assert_eq!(path, dest);
            assert!(!error.is_empty());
        }
        other => panic!("expected WriteFailed, got {other:?}"),
    }
}
