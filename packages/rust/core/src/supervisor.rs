//! Build tool supervisor.
//!
//! Spawns the static-site build tool against a workspace, drains stdout and
//! stderr concurrently (forwarding each line to the log and keeping a bounded
//! tail for diagnostics), and maps the exit status to a [`BuildOutcome`].

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use sitebuilder_shared::{BuildOutcome, BuilderConfig, Result, SiteBuilderError};

/// Lines kept per stream for diagnostics.
const MAX_CAPTURED_LINES: usize = 500;

/// How long to wait for output pipes to close once the tool has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(10);

/// Log target for forwarded build tool output.
const TOOL_LOG_TARGET: &str = "sitebuilder::build_tool";

/// Runs the configured build tool. Stateless between calls.
#[derive(Debug, Clone)]
pub struct BuildSupervisor {
    config: BuilderConfig,
}

impl BuildSupervisor {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    /// Run the build tool to completion.
    pub async fn build(&self, workspace_root: &Path, output_dir: &Path) -> Result<BuildOutcome> {
        self.build_until(workspace_root, output_dir, std::future::pending())
            .await
    }

    /// Run the build tool until it exits or `cancel` resolves.
    ///
    /// On cancellation the tool's whole process group is killed and
    /// [`SiteBuilderError::BuildCancelled`] is returned with the reason
    /// `cancel` produced.
    #[instrument(skip_all, fields(cmd = %self.config.command, root = %workspace_root.display()))]
    pub async fn build_until<F>(
        &self,
        workspace_root: &Path,
        output_dir: &Path,
        cancel: F,
    ) -> Result<BuildOutcome>
    where
        F: Future<Output = String>,
    {
        let args = self.config.render_args(workspace_root, output_dir);
        info!(args = ?args, "spawning build tool");

        let mut command = Command::new(&self.config.command);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }
        // Own process group, so cancellation reaches the tool's children too.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| SiteBuilderError::BuildSpawn {
            command: self.config.command.clone(),
            source: e,
        })?;

        // Process group id; equal to the tool's pid.
        let pgid = child.id();
        let stdout = child.stdout.take().ok_or_else(|| self.spawn_error("stdout not captured"))?;
        let stderr = child.stderr.take().ok_or_else(|| self.spawn_error("stderr not captured"))?;
        let stdout = StreamCapture::spawn(stdout, "stdout");
        let stderr = StreamCapture::spawn(stderr, "stderr");

        tokio::pin!(cancel);
        let waited = tokio::select! {
            status = child.wait() => Ok(status),
            reason = &mut cancel => Err(reason),
        };

        // Whatever the tool left running would keep the pipes open.
        terminate(&mut child, pgid).await;
        let (stdout, stderr) = tokio::join!(
            stdout.finish(DRAIN_GRACE),
            stderr.finish(DRAIN_GRACE)
        );

        let status = match waited {
            Ok(status) => status.map_err(|e| SiteBuilderError::BuildSpawn {
                command: self.config.command.clone(),
                source: e,
            })?,
            Err(reason) => {
                warn!(%reason, "build tool cancelled");
                return Err(SiteBuilderError::BuildCancelled { reason });
            }
        };
        let exit_code = status.code();

        if exit_code == Some(0) {
            info!(out = %output_dir.display(), "build tool succeeded");
            return Ok(BuildOutcome {
                success: true,
                artifact_path: Some(output_dir.to_path_buf()),
                exit_code,
                diagnostics: String::new(),
            });
        }

        warn!(?exit_code, stderr_lines = stderr.len(), "build tool failed");
        let diagnostics = if stderr.is_empty() {
            stdout.into_text()
        } else {
            stderr.into_text()
        };

        Ok(BuildOutcome {
            success: false,
            artifact_path: None,
            exit_code,
            diagnostics,
        })
    }

    fn spawn_error(&self, msg: &str) -> SiteBuilderError {
        SiteBuilderError::BuildSpawn {
            command: self.config.command.clone(),
            source: std::io::Error::other(msg.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Output capture
// ---------------------------------------------------------------------------

/// Bounded tail of one output stream.
#[derive(Debug, Default)]
struct CapturedOutput {
    lines: VecDeque<String>,
    dropped: usize,
}

impl CapturedOutput {
    fn push(&mut self, line: String) {
        if self.lines.len() == MAX_CAPTURED_LINES {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(line);
    }

    fn len(&self) -> usize {
        self.lines.len() + self.dropped
    }

    fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }

    fn into_text(self) -> String {
        let mut text = String::new();
        if self.dropped > 0 {
            text.push_str(&format!("[... {} earlier lines omitted ...]\n", self.dropped));
        }
        let lines: Vec<String> = self.lines.into();
        text.push_str(&lines.join("\n"));
        text
    }
}

/// Output of one stream, filled by a background drain task.
///
/// Lines land in shared state as they are read, so giving up on the task
/// still leaves everything read so far.
struct StreamCapture {
    output: Arc<Mutex<CapturedOutput>>,
    task: JoinHandle<()>,
}

impl StreamCapture {
    fn spawn<R>(reader: R, stream: &'static str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let output = Arc::new(Mutex::new(CapturedOutput::default()));
        let task = tokio::spawn(drain(reader, stream, output.clone()));
        Self { output, task }
    }

    /// Wait up to `grace` for EOF, then return what was captured.
    async fn finish(mut self, grace: Duration) -> CapturedOutput {
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "output drain task failed"),
            Err(_) => {
                warn!("output pipe still open after the build tool exited; abandoning it");
                self.task.abort();
            }
        }
        std::mem::take(&mut *lock(&self.output))
    }
}

fn lock(output: &Mutex<CapturedOutput>) -> MutexGuard<'_, CapturedOutput> {
    output.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Read a stream line by line until EOF.
async fn drain<R>(reader: R, stream: &'static str, output: Arc<Mutex<CapturedOutput>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                debug!(target: TOOL_LOG_TARGET, stream, "{line}");
                lock(&output).push(line.to_string());
            }
            Err(e) => {
                warn!(stream, error = %e, "failed reading build tool output");
                break;
            }
        }
    }
}

/// Kill everything left in the tool's process group, then reap the tool.
async fn terminate(child: &mut Child, pgid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = pgid {
        kill_process_group(pgid);
    }
    #[cfg(not(unix))]
    let _ = pgid;
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill build tool");
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        warn!(pgid, "process group id out of range");
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => debug!(pgid, "killed build tool process group"),
        Err(Errno::ESRCH) => debug!(pgid, "build tool process group already gone"),
        Err(e) => warn!(pgid, error = %e, "failed to kill build tool process group"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Instant;
    use uuid::Uuid;

    fn temp_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sb-build-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sh(script: &str) -> BuildSupervisor {
        BuildSupervisor::new(BuilderConfig {
            command: "sh".into(),
            args: vec![
                "-c".into(),
                script.into(),
                "sh".into(),
                "{root}".into(),
                "{out}".into(),
            ],
            working_dir: None,
            timeout_secs: 0,
        })
    }

    #[tokio::test]
    async fn exit_zero_is_success() {
        let root = temp_root();
        let out = root.join("dist");
        let outcome = sh(r#"mkdir -p "$2" && echo "<html></html>" > "$2/index.html""#)
            .build(&root, &out)
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.artifact_path.as_deref(), Some(out.as_path()));
        assert!(out.join("index.html").is_file());
    }

    #[tokio::test]
    async fn non_zero_exit_captures_stderr() {
        let root = temp_root();
        let outcome = sh("echo building; echo 'error: missing config' >&2; exit 1")
            .build(&root, &root.join("dist"))
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(1));
        assert!(outcome.artifact_path.is_none());
        assert!(outcome.diagnostics.contains("error: missing config"));
        assert!(!outcome.diagnostics.contains("building"));
    }

    #[tokio::test]
    async fn stdout_is_used_when_stderr_is_silent() {
        let root = temp_root();
        let outcome = sh("echo 'config not found'; exit 3")
            .build(&root, &root.join("dist"))
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
        assert!(outcome.diagnostics.contains("config not found"));
    }

    #[tokio::test]
    async fn placeholders_reach_the_tool() {
        let root = temp_root();
        let outcome = sh(r#"echo "root=$1 out=$2" >&2; exit 2"#)
            .build(&root, &root.join("dist"))
            .await
            .unwrap();

        let expected = format!("root={} out={}", root.display(), root.join("dist").display());
        assert!(outcome.diagnostics.contains(&expected));
    }

    #[tokio::test]
    async fn large_output_on_both_streams_does_not_deadlock() {
        let root = temp_root();
        let script = "i=0; while [ $i -lt 20000 ]; do echo \"out $i\"; echo \"err $i\" >&2; i=$((i+1)); done; exit 1";
        let outcome = tokio::time::timeout(
            Duration::from_secs(60),
            sh(script).build(&root, &root.join("dist")),
        )
        .await
        .expect("build should not hang")
        .unwrap();

        assert!(!outcome.success);
        assert!(outcome.diagnostics.starts_with("[... "));
        assert!(outcome.diagnostics.ends_with("err 19999"));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let root = temp_root();
        let supervisor = BuildSupervisor::new(BuilderConfig {
            command: "sitebuilder-no-such-tool".into(),
            args: vec![],
            working_dir: None,
            timeout_secs: 0,
        });

        let err = supervisor.build(&root, &root.join("dist")).await.unwrap_err();
        assert!(matches!(err, SiteBuilderError::BuildSpawn { .. }));
        assert_eq!(err.category(), sitebuilder_shared::FailureCategory::BuildError);
    }

    #[tokio::test]
    async fn cancellation_kills_the_process_group() {
        let root = temp_root();
        let pid_file = root.join("grandchild.pid");
        let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());

        let started = Instant::now();
        let err = sh(&script)
            .build_until(&root, &root.join("dist"), async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                "timed out".to_string()
            })
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(15));
        match err {
            SiteBuilderError::BuildCancelled { reason } => assert_eq!(reason, "timed out"),
            other => panic!("expected BuildCancelled, got {other:?}"),
        }

        #[cfg(target_os = "linux")]
        {
            let pid = std::fs::read_to_string(&pid_file).unwrap();
            assert!(exits_soon(pid.trim()).await, "grandchild {} survived cancellation", pid.trim());
        }
    }

    #[cfg(target_os = "linux")]
    async fn exits_soon(pid: &str) -> bool {
        for _ in 0..20 {
            if !process_alive(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    /// Zombies count as dead; nothing may reap them inside a container.
    #[cfg(target_os = "linux")]
    fn process_alive(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| !rest.trim_start().starts_with('Z')),
            Err(_) => false,
        }
    }

    #[tokio::test]
    async fn leftover_background_process_does_not_hide_diagnostics() {
        let root = temp_root();
        let pid_file = root.join("background.pid");
        let script = format!(
            "echo 'error: missing config' >&2; sleep 30 & echo $! > '{}'; exit 1",
            pid_file.display()
        );

        let started = Instant::now();
        let outcome = sh(&script)
            .build(&root, &root.join("dist"))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(1));
        assert!(outcome.diagnostics.contains("error: missing config"));

        #[cfg(target_os = "linux")]
        {
            let pid = std::fs::read_to_string(&pid_file).unwrap();
            assert!(exits_soon(pid.trim()).await, "background process outlived the build");
        }
    }

    #[tokio::test]
    async fn abandoned_stream_keeps_lines_already_read() {
        use tokio::io::AsyncWriteExt;

        let (mut writer, reader) = tokio::io::duplex(1024);
        let capture = StreamCapture::spawn(reader, "stderr");
        writer.write_all(b"error: first\nerror: second\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The writer stays open, so the drain never sees EOF.
        let captured = capture.finish(Duration::from_millis(200)).await;
        assert_eq!(captured.into_text(), "error: first\nerror: second");
        drop(writer);
    }

    #[test]
    fn captured_output_is_bounded() {
        let mut captured = CapturedOutput::default();
        for i in 0..(MAX_CAPTURED_LINES + 5) {
            captured.push(format!("line {i}"));
        }
        assert_eq!(captured.len(), MAX_CAPTURED_LINES + 5);
        let text = captured.into_text();
        assert!(text.starts_with("[... 5 earlier lines omitted ...]"));
        assert!(!text.contains("line 4\n"));
        assert!(text.ends_with(&format!("line {}", MAX_CAPTURED_LINES + 4)));
    }
}
