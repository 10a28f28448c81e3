use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProctoringSettings;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,
    #[error("No camera available: {0}")]
    Unavailable(String),
    #[error("Camera stream is not attached")]
    NotAttached,
    #[error("No frame available yet")]
    NoFrame,
    #[error("Frame could not be decoded: {0}")]
    Decode(String),
}

/// Video-only capture request with a preferred resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub audio: bool,
}

impl VideoConstraints {
    pub fn video_only(ideal_width: u32, ideal_height: u32) -> Self {
        Self {
            ideal_width,
            ideal_height,
            audio: false,
        }
    }
}

/// Media-capture boundary. Implementations own the actual device or stream.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Requests the stream and attaches it to the video sink.
    async fn open(&self, constraints: &VideoConstraints) -> Result<(), CameraError>;

    /// Frame size reported by the sink, `(0, 0)` until the first frame.
    fn frame_size(&self) -> (u32, u32);

    /// Whether at least one video track is still live.
    fn has_live_track(&self) -> bool;

    fn grab_frame(&self) -> Result<RgbaImage, CameraError>;

    /// Stops every track and detaches the sink.
    fn stop(&self);

    /// Asynchronous setup failure (e.g. permission denied after `open`).
    fn setup_error(&self) -> Option<CameraError> {
        None
    }
}

/// Owns the camera stream for one session. The only component that starts or
/// stops tracks.
pub struct CameraSession {
    device: Arc<dyn CameraDevice>,
    constraints: VideoConstraints,
    ready_timeout: Duration,
    poll_interval: Duration,
    attached: AtomicBool,
}

impl CameraSession {
    pub fn new(device: Arc<dyn CameraDevice>, settings: &ProctoringSettings) -> Self {
        Self {
            device,
            constraints: VideoConstraints::video_only(settings.preferred_width, settings.preferred_height),
            ready_timeout: settings.camera_ready_timeout(),
            poll_interval: settings.camera_poll(),
            attached: AtomicBool::new(false),
        }
    }

    /// Opens the stream and waits, bounded by the ready timeout, for the sink
    /// to report a non-zero frame size.
    pub async fn acquire(&self) -> bool {
        if self.is_live() {
            debug!("Camera already attached and live");
            return true;
        }

        info!(
            "📷 Requesting camera stream ({}x{})",
            self.constraints.ideal_width, self.constraints.ideal_height
        );

        if let Err(e) = self.device.open(&self.constraints).await {
            warn!("❌ Camera request failed: {}", e);
            self.device.stop();
            return false;
        }
        self.attached.store(true, Ordering::SeqCst);

        let device = Arc::clone(&self.device);
        let poll = self.poll_interval;
        let wait_for_frames = async move {
            loop {
                if let Some(e) = device.setup_error() {
                    warn!("❌ Camera setup failed: {}", e);
                    return false;
                }
                let (width, height) = device.frame_size();
                if width > 0 && height > 0 {
                    info!("✅ Camera ready at {}x{}", width, height);
                    return true;
                }
                tokio::time::sleep(poll).await;
            }
        };

        match tokio::time::timeout(self.ready_timeout, wait_for_frames).await {
            Ok(true) => true,
            Ok(false) => {
                self.release();
                false
            }
            Err(_) => {
                warn!("❌ Camera produced no frames within {:?}", self.ready_timeout);
                self.release();
                false
            }
        }
    }

    pub fn is_live(&self) -> bool {
        self.attached.load(Ordering::SeqCst) && self.device.has_live_track()
    }

    pub fn grab_frame(&self) -> Result<RgbaImage, CameraError> {
        if !self.attached.load(Ordering::SeqCst) {
            return Err(CameraError::NotAttached);
        }
        self.device.grab_frame()
    }

    /// Safe to call any number of times.
    pub fn release(&self) {
        if self.attached.swap(false, Ordering::SeqCst) {
            self.device.stop();
            info!("📷 Camera released");
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}
