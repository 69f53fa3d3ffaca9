//! # OS process plumbing.
//!
//! Spawns one child per service, captures its output, and exposes a
//! [`ProcessHandle`] for signaling and awaiting exit.
//!
//! ```text
//! spawn(descriptor)
//!   ├─► Command (own process group on unix, stdin null, stdout/stderr piped)
//!   ├─► reader(stdout) ─► OutputBuffer + Event::OutputLine  (FIFO per stream)
//!   ├─► reader(stderr) ─► OutputBuffer + Event::OutputLine
//!   └─► Launched { child, handle }
//!
//! wait_exit(child):
//!   select! {
//!     child.wait()      → exit status
//!     kill.cancelled()  → SIGKILL to the group + start_kill() → exit status
//!   }
//!   drain readers (bounded) → ExitInfo
//! ```

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::record::SharedOutput;
use crate::events::{Bus, Event, EventKind, OutputStream};
use crate::services::ServiceDescriptor;

/// Upper bound for flushing captured output after the process is gone.
/// Grandchildren that inherited the pipes may keep them open indefinitely.
const READER_DRAIN: Duration = Duration::from_millis(250);

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if killed by one (unix).
    pub signal: Option<i32>,
    /// True if the exit followed a stop request or global shutdown.
    pub requested: bool,
}

impl ExitInfo {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
            requested: false,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(sig)) => write!(f, "killed by signal {sig}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Opaque handle to a live child: pid, kill switch and exit notification.
#[derive(Clone, Debug)]
pub(crate) struct ProcessHandle {
    pub pid: Option<u32>,
    kill: CancellationToken,
    exit: watch::Receiver<Option<ExitInfo>>,
}

impl ProcessHandle {
    /// Sends the graceful termination signal (SIGTERM to the process group).
    ///
    /// Without unix signals this degrades to the forceful path.
    pub fn terminate(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            signal_group(pid, nix::sys::signal::Signal::SIGTERM);
            return;
        }
        self.kill.cancel();
    }

    /// Requests forceful termination; the exit watcher performs the kill.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    /// True once the exit of this instance has been confirmed and handled.
    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// Resolves once the exit has been confirmed and handled.
    pub async fn wait(&self) -> ExitInfo {
        let mut rx = self.exit.clone();
        let res = rx.wait_for(Option::is_some).await;
        match res {
            Ok(v) => v.unwrap_or_default(),
            Err(_closed) => ExitInfo::default(),
        }
    }
}

/// A freshly spawned child and the pieces needed to supervise it.
pub(crate) struct Launched {
    pub child: Child,
    pub handle: ProcessHandle,
    pub exit_tx: watch::Sender<Option<ExitInfo>>,
    pub kill: CancellationToken,
    pub readers: Vec<JoinHandle<()>>,
}

/// Spawns the descriptor's command and wires output capture.
pub(crate) fn spawn(
    desc: &ServiceDescriptor,
    output: SharedOutput,
    bus: &Bus,
) -> std::io::Result<Launched> {
    let mut std_cmd = std::process::Command::new(desc.program());
    std_cmd
        .args(desc.args())
        .envs(desc.env())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = desc.working_dir() {
        std_cmd.current_dir(dir);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_cmd.process_group(0);
    }

    let mut cmd = Command::from(std_cmd);
    cmd.kill_on_drop(true);
    let mut child = cmd.spawn()?;

    let key: Arc<str> = Arc::from(desc.key());
    let mut readers = Vec::with_capacity(2);
    if let Some(out) = child.stdout.take() {
        readers.push(spawn_reader(out, OutputStream::Stdout, key.clone(), output.clone(), bus.clone()));
    }
    if let Some(err) = child.stderr.take() {
        readers.push(spawn_reader(err, OutputStream::Stderr, key, output, bus.clone()));
    }

    let kill = CancellationToken::new();
    let (exit_tx, exit_rx) = watch::channel(None);
    let handle = ProcessHandle {
        pid: child.id(),
        kill: kill.clone(),
        exit: exit_rx,
    };

    Ok(Launched {
        child,
        handle,
        exit_tx,
        kill,
        readers,
    })
}

/// Waits for the child to exit, killing it when `kill` fires.
pub(crate) async fn wait_exit(
    mut child: Child,
    kill: CancellationToken,
    readers: Vec<JoinHandle<()>>,
) -> ExitInfo {
    let status = tokio::select! {
        res = child.wait() => res,
        _ = kill.cancelled() => {
            #[cfg(unix)]
            if let Some(pid) = child.id() {
                signal_group(pid, nix::sys::signal::Signal::SIGKILL);
            }
            if let Err(err) = child.start_kill() {
                tracing::debug!(error = %err, "start_kill failed");
            }
            child.wait().await
        }
    };

    let _ = tokio::time::timeout(READER_DRAIN, join_all(readers)).await;

    match status {
        Ok(status) => ExitInfo::from_status(status),
        Err(err) => {
            tracing::warn!(error = %err, "failed to collect exit status");
            ExitInfo::default()
        }
    }
}

fn spawn_reader<R>(
    reader: R,
    stream: OutputStream,
    key: Arc<str>,
    output: SharedOutput,
    bus: Bus,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(|c| c == '\n' || c == '\r')
                        .to_string();
                    output.lock().push(stream, line.clone());
                    bus.publish(
                        Event::new(EventKind::OutputLine)
                            .with_service(key.clone())
                            .with_output(stream, line),
                    );
                }
                Err(err) => {
                    tracing::debug!(service = %key, %stream, error = %err, "output stream closed");
                    break;
                }
            }
        }
    })
}

/// Signals the whole process group led by `pid`; falls back to the pid alone.
#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(pid as i32);
    match killpg(pid, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => {
            tracing::debug!(%pid, ?signal, error = %err, "killpg failed; signaling pid");
            if let Err(err) = kill(pid, signal) {
                if err != Errno::ESRCH {
                    tracing::warn!(%pid, ?signal, error = %err, "failed to signal process");
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::record::OutputBuffer;
    use parking_lot::Mutex;

    fn shell(key: &str, script: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(key, "sh").with_args(["-c", script])
    }

    #[tokio::test]
    async fn captures_both_streams_in_order() {
        let bus = Bus::new(64);
        let output = Arc::new(Mutex::new(OutputBuffer::new(16)));
        let desc = shell("echo", "echo one; echo two; echo oops >&2");

        let launched = spawn(&desc, output.clone(), &bus).unwrap();
        let info = wait_exit(launched.child, launched.kill, launched.readers).await;
        assert_eq!(info.code, Some(0));

        let lines = output.lock().snapshot();
        let stdout: Vec<&str> = lines
            .iter()
            .filter(|l| l.stream == OutputStream::Stdout)
            .map(|l| l.line.as_str())
            .collect();
        assert_eq!(stdout, ["one", "two"]);
        assert!(lines
            .iter()
            .any(|l| l.stream == OutputStream::Stderr && l.line == "oops"));
    }

    #[tokio::test]
    async fn applies_env_overlay_and_working_dir() {
        let bus = Bus::new(64);
        let output = Arc::new(Mutex::new(OutputBuffer::new(16)));
        let dir = std::env::temp_dir();
        let desc = shell("env", "echo $STACKVISOR_TEST; pwd")
            .with_env("STACKVISOR_TEST", "overlay")
            .with_working_dir(&dir);

        let launched = spawn(&desc, output.clone(), &bus).unwrap();
        wait_exit(launched.child, launched.kill, launched.readers).await;

        let lines = output.lock().snapshot();
        assert_eq!(lines[0].line, "overlay");
        let reported = std::fs::canonicalize(&lines[1].line).unwrap();
        assert_eq!(reported, std::fs::canonicalize(&dir).unwrap());
    }

    #[tokio::test]
    async fn kill_switch_terminates_child() {
        let bus = Bus::new(8);
        let output = Arc::new(Mutex::new(OutputBuffer::new(4)));
        let desc = shell("sleepy", "exec sleep 30");

        let launched = spawn(&desc, output, &bus).unwrap();
        launched.kill.cancel();
        let info = wait_exit(launched.child, launched.kill, launched.readers).await;
        assert_eq!(info.signal, Some(9));
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let bus = Bus::new(8);
            let output = Arc::new(Mutex::new(OutputBuffer::new(4)));
            let desc = ServiceDescriptor::new("ghost", "/definitely/not/a/binary");
            assert!(spawn(&desc, output, &bus).is_err());
        });
    }
}
