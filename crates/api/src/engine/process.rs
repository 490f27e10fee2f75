//! One OS process per job.
//!
//! The worker gets its [`WorkerRequest`] on stdin and answers with one
//! event per stdout line. Whatever happens inside it (a native abort in the
//! model runtime, an OOM kill) ends that process only; the server notices
//! through the missing terminal line and the exit status.
//!
//! On Unix the worker leads its own process group. Whatever is left in that
//! group when the launcher returns or is dropped, such as an engine CLI
//! orphaned by a killed worker, is killed with it.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use cadence_cloud::StorageConfig;
use cadence_core::job::SynthesisJob;
use cadence_core::status_channel::StatusSender;
use cadence_core::synthesis::EngineConfig;
use cadence_worker::protocol::{decode_event, WorkerRequest};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::config::ServerConfig;
use crate::engine::launcher::{JobLauncher, LaunchError};

/// Spawns the worker binary for every job.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
    storage: StorageConfig,
    engine: EngineConfig,
    work_dir: PathBuf,
}

impl ProcessLauncher {
    pub fn new(
        program: PathBuf,
        storage: StorageConfig,
        engine: EngineConfig,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            program,
            args: Vec::new(),
            storage,
            engine,
            work_dir,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.worker_bin.clone(),
            config.storage.clone(),
            config.engine.clone(),
            config.work_dir.clone(),
        )
    }

    /// Extra arguments passed to the worker program.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn request_for(&self, job: SynthesisJob) -> WorkerRequest {
        WorkerRequest {
            job,
            storage: self.storage.clone(),
            engine: self.engine.clone(),
            work_dir: self.work_dir.clone(),
        }
    }
}

#[async_trait]
impl JobLauncher for ProcessLauncher {
    async fn run(&self, job: SynthesisJob, events: StatusSender) -> Result<(), LaunchError> {
        let job_id = job.id;
        let payload = serde_json::to_vec(&self.request_for(job))
            .map_err(|e| LaunchError::Protocol(e.to_string()))?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(LaunchError::Spawn)?;
        let _group = WorkerGroup::new(child.id());

        tracing::info!(job_id = %job_id, pid = child.id(), "Worker process spawned");

        if let Some(mut stdin) = child.stdin.take() {
            // A worker that dies before reading its request surfaces below
            // as a missing terminal event.
            if let Err(e) = stdin.write_all(&payload).await {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to send worker request");
            }
        }

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match decode_event(&line) {
                        Ok(event) => {
                            tracing::debug!(
                                job_id = %job_id,
                                status = event.status(),
                                "Worker event"
                            );
                            events.send(event);
                        }
                        Err(e) => tracing::warn!(
                            job_id = %job_id,
                            line = %line,
                            error = %e,
                            "Ignoring malformed worker line"
                        ),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Worker stdout read failed");
                        break;
                    }
                }
            }
        }

        let status = child.wait().await.map_err(LaunchError::Spawn)?;
        tracing::info!(job_id = %job_id, %status, "Worker process exited");

        if events.terminal_sent() {
            Ok(())
        } else {
            Err(LaunchError::Crashed(status.to_string()))
        }
    }
}

/// The worker's process group, killed on drop.
///
/// Declared after the child so it drops first, while a still-running
/// leader keeps the group id reserved.
struct WorkerGroup {
    pgid: Option<u32>,
}

impl WorkerGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.and_then(|pid| libc::pid_t::try_from(pid).ok()) {
            // Safety: killpg takes plain integers and reports a group that no
            // longer exists through errno.
            let killed = unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0;
            if killed {
                tracing::warn!(pgid, "Killed processes left in worker group");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use cadence_core::job::AudioRequest;
    use cadence_core::job_events::{Stage, StatusEvent};
    use cadence_core::status_channel::status_channel;

    use super::*;

    fn launcher(script: &str) -> ProcessLauncher {
        ProcessLauncher::new(
            PathBuf::from("bash"),
            StorageConfig::Local {
                root: PathBuf::from("/srv/store"),
            },
            EngineConfig {
                program: "python3".into(),
                args: vec!["run_tts.py".into()],
                checkpoint_dir: PathBuf::from("checkpoints"),
                timeout_secs: None,
            },
            PathBuf::from("output"),
        )
        .with_args(["-c", script])
    }

    fn job() -> SynthesisJob {
        SynthesisJob::from_request(AudioRequest {
            text_prompt: "hello".into(),
            audio_ref_key: "voices/ref.wav".into(),
        })
    }

    /// Whether `pid` is alive. A killed orphan counts as gone once it is a
    /// zombie waiting for init to reap it.
    #[cfg(target_os = "linux")]
    fn is_running(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .is_some_and(|(_, rest)| !rest.trim_start().starts_with('Z')),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    async fn wait_until_gone(pid: u32) -> bool {
        for _ in 0..100 {
            if !is_running(pid) {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        false
    }

    #[cfg(target_os = "linux")]
    fn read_pid(path: &std::path::Path) -> u32 {
        std::fs::read_to_string(path).unwrap().trim().parse().unwrap()
    }

    async fn run(script: &str) -> (Result<(), LaunchError>, Vec<StatusEvent>) {
        let (tx, mut rx) = status_channel();
        let result = launcher(script).run(job(), tx).await;
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event);
        }
        (result, seen)
    }

    #[tokio::test]
    async fn relays_worker_lines_in_order() {
        let (result, seen) = run(
            r#"cat > /dev/null
echo '{"status":"downloading_reference"}'
echo '{"status":"loading_model"}'
echo '{"status":"completed","s3_url":"file:///srv/store/x.wav"}'"#,
        )
        .await;

        result.unwrap();
        assert_eq!(
            seen,
            vec![
                StatusEvent::Stage(Stage::FetchingReference),
                StatusEvent::Stage(Stage::LoadingModel),
                StatusEvent::Completed {
                    s3_url: "file:///srv/store/x.wav".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn worker_receives_the_job_request() {
        let (result, seen) = run(
            r#"req=$(cat)
case "$req" in
  *'"text_prompt":"hello"'*) echo '{"status":"completed","s3_url":"ok"}' ;;
  *) echo '{"status":"error","error":"no request"}' ;;
esac"#,
        )
        .await;

        result.unwrap();
        assert_eq!(seen, vec![StatusEvent::Completed { s3_url: "ok".into() }]);
    }

    #[tokio::test]
    async fn failed_job_with_nonzero_exit_is_not_a_crash() {
        let (result, seen) = run(
            r#"cat > /dev/null
echo '{"status":"error","error":"synthesis failed: boom"}'
exit 1"#,
        )
        .await;

        result.unwrap();
        assert_eq!(seen, vec![StatusEvent::failed("synthesis failed: boom")]);
    }

    #[tokio::test]
    async fn killed_worker_is_reported_as_crash() {
        let (result, seen) = run(
            r#"cat > /dev/null
echo '{"status":"loading_model"}'
kill -9 $$"#,
        )
        .await;

        assert_eq!(seen, vec![StatusEvent::Stage(Stage::LoadingModel)]);
        assert_matches!(result, Err(LaunchError::Crashed(status)) if status.contains("signal"));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn engine_orphaned_by_a_killed_worker_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("engine.pid");
        let (result, _) = run(&format!(
            r#"cat > /dev/null
sleep 30 > /dev/null 2>&1 &
echo $! > '{}'
kill -9 $$"#,
            pid_file.display()
        ))
        .await;

        assert_matches!(result, Err(LaunchError::Crashed(_)));
        let engine = read_pid(&pid_file);
        assert!(wait_until_gone(engine).await, "engine process {engine} survived");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropping_a_running_launch_kills_the_whole_group() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("engine.pid");
        let script = format!(
            r#"cat > /dev/null
sleep 30 > /dev/null 2>&1 &
echo $! > '{}'
echo '{{"status":"loading_model"}}'
wait"#,
            pid_file.display()
        );
        let (tx, mut rx) = status_channel();
        let launcher = launcher(&script);
        let handle = tokio::spawn(async move { launcher.run(job(), tx).await });

        assert_eq!(rx.recv().await, Some(StatusEvent::Stage(Stage::LoadingModel)));
        let engine = read_pid(&pid_file);
        assert!(is_running(engine));

        handle.abort();
        let _ = handle.await;
        assert!(wait_until_gone(engine).await, "engine process {engine} survived");
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let (result, seen) = run(
            r#"cat > /dev/null
echo 'Loading weights...'
echo
echo '{"status":"completed","s3_url":"u"}'"#,
        )
        .await;

        result.unwrap();
        assert_eq!(seen, vec![StatusEvent::Completed { s3_url: "u".into() }]);
    }

    #[tokio::test]
    async fn missing_binary_fails_to_spawn() {
        let (tx, _rx) = status_channel();
        let launcher = ProcessLauncher::new(
            PathBuf::from("/nonexistent/cadence-worker"),
            StorageConfig::Local {
                root: PathBuf::from("/srv/store"),
            },
            EngineConfig {
                program: "python3".into(),
                args: Vec::new(),
                checkpoint_dir: PathBuf::from("checkpoints"),
                timeout_secs: None,
            },
            PathBuf::from("output"),
        );

        assert_matches!(launcher.run(job(), tx).await, Err(LaunchError::Spawn(_)));
    }
}
