//! Execution wrapper for invoking `rclone`.
//!
//! Shell integration stays here so the tool implementation can be tested with
//! fake binaries and deterministic output parsing.

use log::debug;
use rclone_decrypt_core::error::{DecryptError, DecryptResult};
use rclone_decrypt_core::CancelToken;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// rclone exits with 128 + signal number when it handles SIGINT itself.
const EXIT_SIGINT: i32 = 130;
#[cfg(unix)]
const SIGINT: i32 = 2;

#[derive(Debug, Clone)]
pub(crate) struct RcloneCommand {
    binary: PathBuf,
    timeout: Duration,
    cancel: CancelToken,
}

#[derive(Debug)]
pub(crate) struct Output {
    pub(crate) stdout: String,
    pub(crate) stderr: String,
    pub(crate) status: i32,
}

impl Output {
    pub(crate) fn success(&self) -> bool {
        self.status == 0
    }

    /// Exit code, or `None` when the process died from a signal.
    pub(crate) fn exit_code(&self) -> Option<i32> {
        (self.status >= 0).then_some(self.status)
    }

    /// Prefer stderr; rclone writes its errors there.
    pub(crate) fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        let stdout = self.stdout.trim();
        if !stderr.is_empty() {
            stderr.to_string()
        } else {
            stdout.to_string()
        }
    }
}

impl RcloneCommand {
    pub(crate) fn new(binary: PathBuf, timeout: Duration, cancel: CancelToken) -> Self {
        Self {
            binary,
            timeout,
            cancel,
        }
    }

    pub(crate) fn binary(&self) -> &Path {
        &self.binary
    }

    /// `rclone <verb> --config <config> <args...>`
    pub(crate) fn run_verb(
        &self,
        verb: &str,
        config: &Path,
        args: &[&str],
    ) -> DecryptResult<Output> {
        let mut command = Command::new(&self.binary);
        command.arg(verb).arg("--config").arg(config).args(args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        debug!(
            "invoking: {} {verb} --config {} {}",
            self.binary.display(),
            config.display(),
            args.join(" ")
        );

        let mut child = command.spawn()?;
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        self.wait_with_timeout(child, verb, stdout_pipe, stderr_pipe)
    }

    fn wait_with_timeout(
        &self,
        mut child: Child,
        verb: &str,
        stdout_pipe: Option<ChildStdout>,
        stderr_pipe: Option<ChildStderr>,
    ) -> DecryptResult<Output> {
        let start = Instant::now();
        let stdout_handle = spawn_output_reader(stdout_pipe);
        let stderr_handle = spawn_output_reader(stderr_pipe);
        let mut exit_status = None;

        while start.elapsed() <= self.timeout {
            if let Some(status) = child.try_wait()? {
                exit_status = Some(status);
                break;
            }
            if self.cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DecryptError::Interrupted);
            }
            thread::sleep(POLL_INTERVAL);
        }

        let Some(status) = exit_status else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(DecryptError::Timeout(format!(
                "{} {verb} timed out after {:?}",
                self.binary.display(),
                self.timeout
            )));
        };

        // A terminal Ctrl-C reaches rclone too, often before our own
        // handler has set the token.
        if interrupted_by_user(&status) {
            self.cancel.cancel();
            return Err(DecryptError::Interrupted);
        }

        let stdout = stdout_handle
            .join()
            .map_err(|_| DecryptError::Io(reader_panicked("stdout")))??;
        let stderr = stderr_handle
            .join()
            .map_err(|_| DecryptError::Io(reader_panicked("stderr")))??;

        Ok(Output {
            stdout,
            stderr,
            status: status.code().unwrap_or(-1),
        })
    }
}

fn interrupted_by_user(status: &ExitStatus) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if status.signal() == Some(SIGINT) {
            return true;
        }
    }
    status.code() == Some(EXIT_SIGINT)
}

fn reader_panicked(stream: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("{stream} reader thread panicked"),
    )
}

fn spawn_output_reader<R>(pipe: Option<R>) -> thread::JoinHandle<DecryptResult<String>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || -> DecryptResult<String> {
        if let Some(mut reader) = pipe {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            Ok(String::from_utf8_lossy(&buf).to_string())
        } else {
            Ok(String::new())
        }
    })
}

/// Turn a failed `copy` into an actionable message.
pub(crate) fn classify_copy_failure(source: &str, dest: &Path, output: &Output) -> String {
    let trimmed = output.diagnostic();
    let lower = trimmed.to_ascii_lowercase();
    let diagnostic = if trimmed.is_empty() {
        "no additional output".to_string()
    } else {
        trimmed
    };
    let code = output.status;

    if lower.contains("message authentication failed")
        || lower.contains("bad password")
        || lower.contains("failed to authenticate decrypted block")
    {
        return format!(
            "rclone could not decrypt `{source}` (exit code {code}): {diagnostic}. The crypt password or salt for this remote does not match the files"
        );
    }

    if lower.contains("directory not found")
        || lower.contains("no such file")
        || lower.contains("not found")
    {
        return format!(
            "rclone found nothing to decrypt through `{source}` (exit code {code}): {diagnostic}. The staged files may not belong to this remote"
        );
    }

    if lower.contains("permission denied") || lower.contains("operation not permitted") {
        return format!(
            "rclone could not write decrypted files from `{source}` to {} (exit code {code}): {diagnostic}",
            dest.display()
        );
    }

    format!("rclone copy from `{source}` failed (exit code {code}): {diagnostic}")
}
