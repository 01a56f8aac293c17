//! # Frame Client
//!
//! Captures single still frames from the vehicle's video stream. Each capture runs an `ffmpeg`
//! process which reads the stream, writes one JPEG frame to its stdout and exits. The process is
//! killed if no frame is produced within the capture timeout.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::{
    io::Read,
    process::{Child, Command, ExitStatus, Stdio},
    sync::mpsc::{channel, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

use crate::params::{CaptureParams, VehicleParams};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of still frames.
pub trait FrameSource: Send {
    /// Capture one frame, blocking until it is available or the capture fails.
    fn capture(&mut self) -> Result<Frame, FrameClientError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single captured frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Time at which the capture finished
    pub timestamp: DateTime<Utc>,

    /// JPEG encoded frame data
    pub data: Vec<u8>,
}

/// Frame source running `ffmpeg` on the vehicle's UDP video stream.
pub struct FfmpegFrameClient {
    ffmpeg_path: String,

    stream_url: String,

    timeout: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FrameClientError {
    #[error("Could not start the capture process: {0}")]
    SpawnError(std::io::Error),

    #[error("Could not read the capture process output: {0}")]
    ReadError(std::io::Error),

    #[error("No frame was captured in {0:?}")]
    Timeout(Duration),

    #[error("The capture process failed with {0}")]
    CaptureFailed(ExitStatus),

    #[error("The capture process exited without producing a frame")]
    NoFrame,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FfmpegFrameClient {
    pub fn new(vehicle: &VehicleParams, capture: &CaptureParams) -> Self {
        Self {
            ffmpeg_path: capture.ffmpeg_path.clone(),
            stream_url: format!("udp://{}:{}", vehicle.address, vehicle.video_port),
            timeout: util::time::secs_to_duration(capture.timeout_s),
        }
    }

    fn spawn(&self) -> Result<Child, FrameClientError> {
        Command::new(&self.ffmpeg_path)
            .args(&["-loglevel", "error", "-i", self.stream_url.as_str()])
            .args(&["-frames:v", "1", "-f", "image2pipe", "-vcodec", "mjpeg", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(FrameClientError::SpawnError)
    }
}

impl FrameSource for FfmpegFrameClient {
    fn capture(&mut self) -> Result<Frame, FrameClientError> {
        let start = Instant::now();
        let mut child = self.spawn()?;

        let mut stdout = match child.stdout.take() {
            Some(s) => s,
            None => {
                kill(&mut child);
                return Err(FrameClientError::NoFrame);
            }
        };

        // Read on a separate thread so the timeout can be enforced
        let (tx, rx) = channel();
        thread::spawn(move || {
            let mut data = Vec::new();
            let result = stdout.read_to_end(&mut data).map(|_| data);
            tx.send(result).ok();
        });

        let data = match rx.recv_timeout(self.timeout) {
            Ok(Ok(d)) => d,
            Ok(Err(e)) => {
                kill(&mut child);
                return Err(FrameClientError::ReadError(e));
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                kill(&mut child);
                return Err(FrameClientError::Timeout(self.timeout));
            }
        };

        // Stdout is closed so the process is exiting
        let status = child.wait().map_err(FrameClientError::ReadError)?;
        if !status.success() {
            return Err(FrameClientError::CaptureFailed(status));
        }
        if data.is_empty() {
            return Err(FrameClientError::NoFrame);
        }

        debug!(
            "Captured {} byte frame in {:.03} s",
            data.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(Frame {
            timestamp: Utc::now(),
            data,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("Could not kill the capture process: {}", e);
    }
    child.wait().ok();
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
