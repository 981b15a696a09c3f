//! Subprocess runner and FFmpeg command builder.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{parse_progress_line, FfmpegProgress};

/// Only the tail of stderr is kept for error reporting.
const STDERR_TAIL_BYTES: usize = 16 * 1024;

/// Captured output of a finished tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs external tools with an optional timeout and cancellation signal.
///
/// A timed-out or cancelled tool is killed and reported as
/// [`MediaError::Timeout`] or [`MediaError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout: Option<Duration>,
}

impl ToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Attach a cancellation signal if one is present.
    pub fn with_cancel_opt(self, cancel_rx: Option<watch::Receiver<bool>>) -> Self {
        match cancel_rx {
            Some(rx) => self.with_cancel(rx),
            None => self,
        }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_timeout_secs(self, secs: u64) -> Self {
        self.with_timeout(Duration::from_secs(secs))
    }

    /// Run a tool and fail on a non-zero exit status.
    pub async fn run(&self, program: &str, args: &[String]) -> MediaResult<ToolOutput> {
        let output = self.output(program, args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(failure(program, output))
        }
    }

    /// Run a tool and return its output whatever the exit status.
    pub async fn output(&self, program: &str, args: &[String]) -> MediaResult<ToolOutput> {
        self.execute(program, args, |_| {}).await
    }

    /// Run a tool, handing each stderr line to `on_line`, and fail on a non-zero exit.
    pub async fn run_streaming<F>(
        &self,
        program: &str,
        args: &[String],
        on_line: F,
    ) -> MediaResult<ToolOutput>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let output = self.execute(program, args, on_line).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(failure(program, output))
        }
    }

    async fn execute<F>(&self, program: &str, args: &[String], mut on_line: F) -> MediaResult<ToolOutput>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let path = check_tool(program)?;
        debug!("Running {} {}", program, args.join(" "));

        let mut child = Command::new(path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("stderr not captured"))?;

        let stdout_task = tokio::spawn(async move {
            let mut buf = String::new();
            stdout.read_to_string(&mut buf).await.map(|_| buf)
        });

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                on_line(&line);
                tail.push_str(&line);
                tail.push('\n');
                if tail.len() > STDERR_TAIL_BYTES * 2 {
                    let cut = tail.len() - STDERR_TAIL_BYTES;
                    let cut = (cut..tail.len()).find(|i| tail.is_char_boundary(*i)).unwrap_or(cut);
                    tail.drain(..cut);
                }
            }
            tail
        });

        let status = self.wait(&mut child, program).await?;

        let stdout = stdout_task
            .await
            .map_err(|e| MediaError::internal(format!("stdout reader panicked: {}", e)))??;
        let stderr = stderr_task
            .await
            .map_err(|e| MediaError::internal(format!("stderr reader panicked: {}", e)))?;

        Ok(ToolOutput {
            stdout,
            stderr,
            exit_code: status.code(),
        })
    }

    /// Wait for the child, killing it on cancellation or timeout.
    async fn wait(&self, child: &mut Child, program: &str) -> MediaResult<ExitStatus> {
        let mut cancel_rx = self.cancel_rx.clone();

        if cancel_rx.as_ref().is_some_and(|rx| *rx.borrow()) {
            let _ = child.kill().await;
            return Err(MediaError::Cancelled);
        }

        let cancelled = async {
            match cancel_rx.as_mut() {
                Some(rx) => loop {
                    if rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                    if *rx.borrow() {
                        break;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };

        let deadline = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            status = child.wait() => WaitOutcome::Exited(status),
            _ = cancelled => WaitOutcome::Cancelled,
            _ = deadline => WaitOutcome::TimedOut,
        };

        match outcome {
            WaitOutcome::Exited(status) => Ok(status?),
            WaitOutcome::Cancelled => {
                info!("{} cancelled, killing process", program);
                let _ = child.kill().await;
                Err(MediaError::Cancelled)
            }
            WaitOutcome::TimedOut => {
                let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                warn!("{} timed out after {} seconds, killing process", program, secs);
                let _ = child.kill().await;
                Err(MediaError::Timeout {
                    tool: program.to_string(),
                    secs,
                })
            }
        }
    }
}

enum WaitOutcome {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut,
}

fn failure(program: &str, output: ToolOutput) -> MediaError {
    MediaError::tool_failed(
        program,
        format!("exited with status {:?}", output.exit_code),
        Some(output.stderr),
        output.exit_code,
    )
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    /// Output path, or `None` to discard output (`-f null -`)
    output: Option<PathBuf>,
    input_args: Vec<String>,
    output_args: Vec<String>,
    log_level: String,
    report_progress: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: Some(output.as_ref().to_path_buf()),
            input_args: Vec::new(),
            output_args: Vec::new(),
            log_level: "error".to_string(),
            report_progress: true,
        }
    }

    /// Command that decodes the input and discards the result.
    pub fn analyze(input: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: None,
            input_args: Vec::new(),
            output_args: Vec::new(),
            log_level: "error".to_string(),
            report_progress: false,
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

    /// Set seek position (before input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set audio filter.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Move the moov atom to the front for progressive playback.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
        ];

        if self.report_progress {
            args.push("-progress".to_string());
            args.push("pipe:2".to_string());
        }

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.iter().cloned());

        match &self.output {
            Some(path) => args.push(path.to_string_lossy().to_string()),
            None => args.extend(["-f".to_string(), "null".to_string(), "-".to_string()]),
        }

        args
    }
}

/// Runner for FFmpeg commands with progress tracking.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    runner: ToolRunner,
}

impl FfmpegRunner {
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<ToolOutput> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with a progress callback.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<ToolOutput>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        let mut current = FfmpegProgress::default();
        self.runner
            .run_streaming("ffmpeg", &cmd.build_args(), move |line| {
                if let Some(progress) = parse_progress_line(line, &mut current) {
                    progress_callback(progress);
                }
            })
            .await
    }

    /// Run an FFmpeg command and return its output even when it exits non-zero.
    pub async fn capture(&self, cmd: &FfmpegCommand) -> MediaResult<ToolOutput> {
        self.runner.output("ffmpeg", &cmd.build_args()).await
    }
}

/// Resolve a tool on PATH.
pub fn check_tool(program: &str) -> MediaResult<PathBuf> {
    which::which(program).map_err(|_| MediaError::ToolNotFound(program.to_string()))
}

/// First line of `<program> <version_flag>`, for health reporting.
pub async fn tool_version(program: &str, version_flag: &str) -> MediaResult<String> {
    let output = ToolRunner::new()
        .with_timeout_secs(10)
        .run(program, &[version_flag.to_string()])
        .await?;
    Ok(output.stdout.lines().next().unwrap_or_default().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .duration(30.0)
            .video_codec("libx264")
            .crf(20)
            .faststart();

        let args = cmd.build_args();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert!(ss < input && input < t);
        assert_eq!(args[ss + 1], "10.000");
        assert!(args.contains(&"+faststart".to_string()));
        assert_eq!(args.last().unwrap(), "output.mp4");
        assert!(args.contains(&"pipe:2".to_string()));
    }

    #[test]
    fn test_analyze_command_discards_output() {
        let args = FfmpegCommand::analyze("in.mp4")
            .audio_filter("astats")
            .build_args();
        assert_eq!(&args[args.len() - 3..], ["-f", "null", "-"]);
        assert!(!args.contains(&"-progress".to_string()));
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let err = ToolRunner::new()
            .run("definitely-not-a-real-tool-hookclip", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ToolNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let err = ToolRunner::new()
            .with_timeout(Duration::from_millis(100))
            .run("sleep", &["5".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_process() {
        let (tx, rx) = watch::channel(false);
        let runner = ToolRunner::new().with_cancel(rx);
        let handle = tokio::spawn(async move { runner.run("sleep", &["5".to_string()]).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_tool_failure() {
        let err = ToolRunner::new().run("false", &[]).await.unwrap_err();
        assert!(matches!(err, MediaError::ToolFailed { exit_code: Some(1), .. }));

        let output = ToolRunner::new().output("false", &[]).await.unwrap();
        assert!(!output.success());
    }
}
