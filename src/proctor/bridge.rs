use async_trait::async_trait;
use image::RgbaImage;
use log::{debug, info, warn};
use parking_lot::Mutex;

use super::camera::{CameraDevice, CameraError, VideoConstraints};
use super::frame::decode_data_url;

type OpenHook = Box<dyn Fn(&VideoConstraints) + Send + Sync>;

#[derive(Default)]
struct BridgeState {
    requested: Option<VideoConstraints>,
    live: bool,
    width: u32,
    height: u32,
    latest: Option<RgbaImage>,
    setup_error: Option<CameraError>,
}

/// Camera whose stream lives outside this process (the desktop webview owns
/// `getUserMedia`). Frames and track state are pushed in; `open` only fires
/// the request hook.
#[derive(Default)]
pub struct BridgedCamera {
    state: Mutex<BridgeState>,
    on_open: Option<OpenHook>,
}

impl BridgedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_open_hook(hook: impl Fn(&VideoConstraints) + Send + Sync + 'static) -> Self {
        Self {
            state: Mutex::new(BridgeState::default()),
            on_open: Some(Box::new(hook)),
        }
    }

    pub fn push_frame(&self, frame: RgbaImage) -> Result<(u32, u32), CameraError> {
        let mut state = self.state.lock();
        if state.requested.is_none() {
            return Err(CameraError::NotAttached);
        }
        let (width, height) = frame.dimensions();
        state.width = width;
        state.height = height;
        state.live = true;
        state.latest = Some(frame);
        Ok((width, height))
    }

    pub fn push_frame_data_url(&self, data_url: &str) -> Result<(u32, u32), CameraError> {
        let frame = decode_data_url(data_url).map_err(CameraError::Decode)?;
        self.push_frame(frame)
    }

    /// Track state as seen by the stream owner (`readyState == "live"`).
    pub fn report_track_state(&self, live: bool) {
        let mut state = self.state.lock();
        if state.live && !live {
            warn!("⚠️ Camera track reported ended");
        }
        state.live = live;
    }

    pub fn report_setup_failure(&self, error: CameraError) {
        warn!("❌ Camera setup failure reported: {}", error);
        let mut state = self.state.lock();
        state.live = false;
        state.setup_error = Some(error);
    }
}

#[async_trait]
impl CameraDevice for BridgedCamera {
    async fn open(&self, constraints: &VideoConstraints) -> Result<(), CameraError> {
        {
            let mut state = self.state.lock();
            *state = BridgeState {
                requested: Some(*constraints),
                ..BridgeState::default()
            };
        }
        if let Some(hook) = &self.on_open {
            hook(constraints);
        }
        debug!("Camera request forwarded to stream owner");
        Ok(())
    }

    fn frame_size(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.width, state.height)
    }

    fn has_live_track(&self) -> bool {
        self.state.lock().live
    }

    fn grab_frame(&self) -> Result<RgbaImage, CameraError> {
        self.state.lock().latest.clone().ok_or(CameraError::NoFrame)
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        if state.requested.take().is_some() {
            info!("📷 Bridged camera detached");
        }
        state.live = false;
        state.latest = None;
        state.width = 0;
        state.height = 0;
    }

    fn setup_error(&self) -> Option<CameraError> {
        self.state.lock().setup_error.clone()
    }
}
