//! External transcoding child process.
//!
//! Raw video units are written to the child's stdin; its stdout carries
//! an MJPEG stream for [`FrameDecoder`](super::FrameDecoder).

use std::process::Stdio;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ScreenflowError;

/// How to launch the transcoder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Executable name or path.
    pub program: String,
    /// Container/codec of the incoming video units.
    pub input_format: String,
    /// Output frame rate.
    pub fps: u32,
    /// Additional arguments inserted before the output options.
    pub extra_args: Vec<String>,
    /// Replaces the generated argument list entirely when set.
    pub args: Option<Vec<String>>,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            input_format: "h264".to_string(),
            fps: 30,
            extra_args: Vec::new(),
            args: None,
        }
    }
}

impl TranscoderConfig {
    /// Full argument list for the child.
    pub fn command_args(&self) -> Vec<String> {
        if let Some(args) = &self.args {
            return args.clone();
        }
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            self.input_format.as_str(),
            "-i",
            "pipe:0",
            "-vf",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(format!("fps={}", self.fps));
        args.extend(self.extra_args.iter().cloned());
        args.extend(
            ["-c:v", "mjpeg", "-f", "mjpeg", "pipe:1"]
                .iter()
                .map(|s| s.to_string()),
        );
        args
    }
}

/// A running transcoder. The child is killed when this is dropped.
#[derive(Debug)]
pub struct Transcoder {
    child: Child,
}

impl Transcoder {
    /// Spawn the child with piped stdin/stdout.
    pub fn spawn(config: &TranscoderConfig) -> Result<Self, ScreenflowError> {
        let args = config.command_args();
        let child = Command::new(&config.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScreenflowError::Transcoder(format!("spawn {}: {e}", config.program)))?;

        debug!(program = %config.program, ?args, pid = child.id(), "transcoder started");
        Ok(Self { child })
    }

    pub fn take_stdin(&mut self) -> Result<ChildStdin, ScreenflowError> {
        self.child
            .stdin
            .take()
            .ok_or_else(|| ScreenflowError::Transcoder("stdin already taken".into()))
    }

    pub fn take_stdout(&mut self) -> Result<ChildStdout, ScreenflowError> {
        self.child
            .stdout
            .take()
            .ok_or_else(|| ScreenflowError::Transcoder("stdout already taken".into()))
    }

    /// Kill the child and reap it.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            // Already exited.
            debug!(error = %e, "transcoder kill");
        }
    }
}

/// Copy raw video units into the transcoder until the source closes or
/// `cancel` fires. Stdin is closed on return so the child can flush.
pub async fn feed_loop(
    mut stdin: ChildStdin,
    mut video_rx: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
) -> Result<(), ScreenflowError> {
    let mut units: u64 = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            unit = video_rx.recv() => match unit {
                Some(unit) => {
                    stdin.write_all(&unit).await?;
                    units += 1;
                }
                None => {
                    warn!(units, "video source closed");
                    break;
                }
            }
        }
    }
    stdin.shutdown().await.ok();
    debug!(units, "feed loop finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_args_match_mjpeg_pipeline() {
        let args = TranscoderConfig::default().command_args();
        assert_eq!(
            args,
            vec![
                "-hide_banner", "-loglevel", "error", "-f", "h264", "-i", "pipe:0", "-vf",
                "fps=30", "-c:v", "mjpeg", "-f", "mjpeg", "pipe:1",
            ]
        );
    }

    #[test]
    fn extra_args_precede_output() {
        let cfg = TranscoderConfig {
            fps: 10,
            extra_args: vec!["-threads".into(), "2".into()],
            ..Default::default()
        };
        let args = cfg.command_args();
        let threads = args.iter().position(|a| a == "-threads").unwrap();
        let codec = args.iter().position(|a| a == "-c:v").unwrap();
        assert!(threads < codec);
        assert!(args.contains(&"fps=10".to_string()));
    }

    #[test]
    fn explicit_args_replace_generated() {
        let cfg = TranscoderConfig {
            program: "cat".into(),
            args: Some(vec![]),
            ..Default::default()
        };
        assert!(cfg.command_args().is_empty());
    }

    #[tokio::test]
    async fn missing_program_is_transcoder_error() {
        let cfg = TranscoderConfig {
            program: "/nonexistent/screenflow-transcoder".into(),
            ..Default::default()
        };
        let err = Transcoder::spawn(&cfg).unwrap_err();
        assert!(matches!(err, ScreenflowError::Transcoder(_)));
    }
}
