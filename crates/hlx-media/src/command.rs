//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::future::pending;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult, STDERR_TAIL_LINES};
use crate::progress::{parse_progress_line, FfmpegProgress, ParsedLine, ProgressCallback};

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Read the input as an FFmpeg concat list.
    pub fn concat_demuxer(self) -> Self {
        self.input_arg("-f")
            .input_arg("concat")
            .input_arg("-safe")
            .input_arg("0")
    }

    /// Copy all streams without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Move the moov atom to the front so outputs stream immediately.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-nostdin".to_string());
        args.push("-v".to_string());
        args.push("error".to_string());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.iter().cloned());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.iter().cloned());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking and cancellation.
pub struct FfmpegRunner {
    /// Encoder binary to execute
    program: PathBuf,
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl FfmpegRunner {
    /// Create a runner for the given encoder binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cancel_rx: None,
            timeout_secs: None,
            progress_callback: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Run an FFmpeg command to completion.
    ///
    /// The child is killed when the cancellation signal fires or the timeout
    /// elapses. Non-progress stderr lines are kept for the error diagnostic.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        if is_cancelled(self.cancel_rx.as_ref()) {
            return Err(MediaError::Cancelled);
        }

        let args = cmd.build_args();
        debug!("Running encoder: {} {}", self.program.display(), args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::encode_failed("Encoder stderr was not captured", None, None))?;
        let callback = self.progress_callback.clone();

        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            let mut current = FfmpegProgress::default();
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = reader.next_line().await {
                match parse_progress_line(&line, &mut current) {
                    ParsedLine::Block(progress) => {
                        if let Some(cb) = &callback {
                            cb(progress);
                        }
                    }
                    ParsedLine::Field => {}
                    ParsedLine::Other => {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
            }

            Vec::from(tail).join("\n")
        });

        let status = match self.wait_for_completion(&mut child).await {
            Ok(status) => status,
            Err(e) => {
                // Grandchildren may still hold the pipe open after a kill.
                stderr_task.abort();
                return Err(e);
            }
        };
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::encode_failed(
                "FFmpeg exited with non-zero status",
                Some(stderr_tail).filter(|s| !s.is_empty()),
                status.code(),
            ))
        }
    }

    /// Wait for the child, racing cancellation and the optional timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<std::process::ExitStatus> {
        let timeout = async {
            match self.timeout_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            status = child.wait() => Ok(status?),
            _ = wait_for_cancel(self.cancel_rx.clone()) => {
                info!("Encoder cancelled, killing process");
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill encoder process: {}", e);
                }
                Err(MediaError::Cancelled)
            }
            _ = timeout => {
                let secs = self.timeout_secs.unwrap_or_default();
                warn!("Encoder timed out after {} seconds, killing process", secs);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill encoder process: {}", e);
                }
                Err(MediaError::Timeout(secs))
            }
        }
    }
}

fn is_cancelled(rx: Option<&watch::Receiver<bool>>) -> bool {
    rx.map(|rx| *rx.borrow()).unwrap_or(false)
}

/// Resolve once the cancellation flag is set. Never resolves without a
/// receiver, or after the sender is gone.
pub async fn wait_for_cancel(rx: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = rx else {
        return pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return pending().await;
        }
    }
}

/// Locate FFmpeg on the PATH.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .duration(30.0)
            .output_args(["-c:v", "libx264"]);

        let args = cmd.build_args();
        let i = args.iter().position(|a| a == "-i").unwrap();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert!(ss < i, "seek must come before the input");
        assert_eq!(args[ss + 1], "10.000");
        assert!(args.contains(&"libx264".to_string()));
        assert_eq!(args.last().unwrap(), "output.mp4");
    }

    #[test]
    fn test_concat_builder() {
        let args = FfmpegCommand::new("list.txt", "out.mp4")
            .concat_demuxer()
            .codec_copy()
            .build_args();
        let joined = args.join(" ");
        assert!(joined.contains("-f concat -safe 0 -i list.txt -c copy out.mp4"));
    }

    #[tokio::test]
    async fn test_wait_for_cancel_fires() {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(wait_for_cancel(Some(rx)));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancel should resolve")
            .unwrap();
    }

    #[test]
    fn test_wait_for_cancel_pending_until_set() {
        let (tx, rx) = watch::channel(false);
        let mut fut = tokio_test::task::spawn(wait_for_cancel(Some(rx)));

        tokio_test::assert_pending!(fut.poll());
        tx.send(true).unwrap();
        assert!(fut.is_woken());
        tokio_test::assert_ready!(fut.poll());
    }

    #[tokio::test]
    async fn test_wait_for_cancel_already_set() {
        let (_tx, rx) = watch::channel(true);
        tokio::time::timeout(Duration::from_secs(1), wait_for_cancel(Some(rx)))
            .await
            .expect("pre-set cancel should resolve immediately");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_reports_failure_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ffmpeg");
        std::fs::write(&script, "#!/bin/sh\necho 'progress=continue' >&2\necho 'bad input' >&2\nexit 3\n")
            .unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cmd = FfmpegCommand::new("in.mp4", dir.path().join("out.mp4"));
        let err = FfmpegRunner::new(&script).run(&cmd).await.unwrap_err();
        match err {
            MediaError::EncodeFailed { stderr, exit_code, .. } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr.as_deref(), Some("bad input"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_kills_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-ffmpeg");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let (tx, rx) = watch::channel(false);
        let cmd = FfmpegCommand::new("in.mp4", dir.path().join("out.mp4"));
        let runner = FfmpegRunner::new(&script).with_cancel(rx);

        let handle = tokio::spawn(async move { runner.run(&cmd).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("runner should stop promptly")
            .unwrap();
        assert!(matches!(result, Err(MediaError::Cancelled)));
    }
}
