//! ffmpeg-backed RTSP frame source
//!
//! Pulls the camera feed by spawning `ffmpeg` with the RTSP input and an
//! MJPEG pipe output, then recovers individual JPEG frames from stdout by
//! scanning for the SOI/EOI markers. Decoding H.264 in-process buys nothing
//! here: the frames get re-served as JPEG anyway, and ffmpeg's RTSP stack
//! handles every camera quirk we have met.

use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

use crate::config::redact_url;
use crate::error::{Error, Result};

use super::source::{FrameReader, FrameSource};

/// JPEG start-of-image marker
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Spawns one ffmpeg process per connection attempt.
#[derive(Debug, Clone)]
pub struct FfmpegSource {
    /// JPEG quality passed as `-q:v` (2-31, lower is better)
    pub quality: u8,
    /// RTSP transport, `tcp` unless the camera insists on UDP
    pub transport: String,
}

impl FfmpegSource {
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            transport: "tcp".into(),
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegSource {
    type Reader = FfmpegReader;

    async fn open(&self, url: &str) -> Result<FfmpegReader> {
        tracing::debug!(url = %redact_url(url), "Spawning ffmpeg for RTSP pull");

        let quality = self.quality.to_string();
        let mut child = Command::new("ffmpeg")
            .args([
                "-fflags",
                "+nobuffer+discardcorrupt",
                "-flags",
                "low_delay",
                "-rtsp_transport",
                &self.transport,
                "-i",
                url,
                "-f",
                "mjpeg",
                "-q:v",
                &quality,
                "-an",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Network(format!("failed to spawn ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Network("ffmpeg stdout unavailable".into()))?;

        Ok(FfmpegReader {
            child,
            stdout: BufReader::new(stdout),
            pending: Vec::new(),
        })
    }
}

/// One live ffmpeg pipe.
pub struct FfmpegReader {
    child: Child,
    stdout: BufReader<ChildStdout>,
    pending: Vec<u8>,
}

impl FfmpegReader {
    async fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let n = self.stdout.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Network("ffmpeg pipe closed".into()));
        }
        self.pending.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}

/// Pull the next complete JPEG out of the buffer, if one is there.
///
/// Drops any garbage before the next SOI, then waits for the matching EOI.
/// Both markers can land split across read chunks, so the scan always runs
/// over the buffered tail and never discards a trailing lone `0xFF`.
fn scan_frame(pending: &mut Vec<u8>) -> Option<Bytes> {
    match find_marker(pending, JPEG_SOI, 0) {
        Some(start) => {
            if start > 0 {
                pending.drain(..start);
            }
            let end = find_marker(pending, JPEG_EOI, 2)?;
            let frame: Vec<u8> = pending.drain(..end + 2).collect();
            Some(Bytes::from(frame))
        }
        None => {
            if pending.len() > 1 {
                let keep = pending.len() - 1;
                pending.drain(..keep);
            }
            None
        }
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if haystack.len() < from + 2 {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|p| p + from)
}

#[async_trait]
impl FrameReader for FfmpegReader {
    async fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            if let Some(frame) = scan_frame(&mut self.pending) {
                return Ok(frame);
            }
            self.fill().await?;
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(error = %e, "ffmpeg already gone on close");
        }
        let _ = self.child.wait().await;
    }
}
