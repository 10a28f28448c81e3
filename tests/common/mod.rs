#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use parking_lot::Mutex;

use proctordesk_lib::assessment::{OptionLetter, Question};
use proctordesk_lib::config::ProctoringSettings;
use proctordesk_lib::database::{self, AssessmentResult, DatabaseError, ResultSink};
use proctordesk_lib::proctor::{CameraDevice, CameraError, FaceAnalyzer, FaceError, VideoConstraints};
use proctordesk_lib::session::{SessionConfig, SessionDeps};

pub const REFERENCE: [f32; 3] = [1.0, 0.0, 0.0];

/// In-memory camera. Produces 640x480 frames once opened until the track is killed.
#[derive(Default)]
pub struct FakeCamera {
    opened: AtomicBool,
    live: AtomicBool,
    fail_open: bool,
    never_ready: bool,
    pub open_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
}

impl FakeCamera {
    pub fn working() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self {
            fail_open: true,
            ..Self::default()
        })
    }

    /// Opens fine but never reports a frame size.
    pub fn stalled() -> Arc<Self> {
        Arc::new(Self {
            never_ready: true,
            ..Self::default()
        })
    }

    pub fn kill_track(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn open(&self, _constraints: &VideoConstraints) -> Result<(), CameraError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(CameraError::PermissionDenied);
        }
        self.opened.store(true, Ordering::SeqCst);
        self.live.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn frame_size(&self) -> (u32, u32) {
        if self.is_open() && !self.never_ready {
            (640, 480)
        } else {
            (0, 0)
        }
    }

    fn has_live_track(&self) -> bool {
        self.is_open() && self.live.load(Ordering::SeqCst)
    }

    fn grab_frame(&self) -> Result<RgbaImage, CameraError> {
        if !self.is_open() {
            return Err(CameraError::NoFrame);
        }
        Ok(RgbaImage::from_pixel(8, 8, image::Rgba([120, 110, 100, 255])))
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.opened.store(false, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
    }
}

/// What the scripted analyzer reports for every frame.
#[derive(Clone, Debug)]
pub struct FaceScript {
    pub faces: Result<usize, String>,
    pub embedding: Result<Option<Vec<f32>>, String>,
}

impl FaceScript {
    pub fn candidate() -> Self {
        Self {
            faces: Ok(1),
            embedding: Ok(Some(REFERENCE.to_vec())),
        }
    }

    pub fn stranger() -> Self {
        Self {
            faces: Ok(1),
            embedding: Ok(Some(vec![0.0, 1.0, 0.0])),
        }
    }
}

pub struct ScriptedAnalyzer {
    script: Mutex<FaceScript>,
    pub calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    pub fn new(script: FaceScript) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, script: FaceScript) {
        *self.script.lock() = script;
    }
}

#[async_trait]
impl FaceAnalyzer for ScriptedAnalyzer {
    async fn detect_faces(&self, _frame: &RgbaImage) -> Result<usize, FaceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.lock().faces.clone().map_err(FaceError::Detection)
    }

    async fn extract_embedding(&self, _frame: &RgbaImage) -> Result<Option<Vec<f32>>, FaceError> {
        self.script.lock().embedding.clone().map_err(FaceError::Embedding)
    }
}

/// Records every submitted result. Optionally fails the next call.
#[derive(Default)]
pub struct RecordingSink {
    pub results: Mutex<Vec<AssessmentResult>>,
    pub calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn submit_result(&self, result: &AssessmentResult) -> database::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Keeps a second submit racing against this one.
        tokio::time::sleep(Duration::from_millis(50)).await;
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(DatabaseError::Rejected {
                status: 503,
                body: "backend unavailable".to_string(),
            });
        }
        self.results.lock().push(result.clone());
        Ok(())
    }
}

pub fn question(id: &str, subject: &str, correct: OptionLetter, duration_secs: u32) -> Question {
    Question {
        id: id.to_string(),
        prompt: format!("Question {}", id),
        options: ["alpha".into(), "beta".into(), "gamma".into(), "delta".into()],
        correct,
        subject: subject.to_string(),
        duration_secs,
    }
}

/// Three questions over two subjects, 90 seconds in total.
pub fn question_set() -> Vec<Question> {
    vec![
        question("q1", "Math", OptionLetter::A, 30),
        question("q2", "Physics", OptionLetter::B, 30),
        question("q3", "Math", OptionLetter::C, 30),
    ]
}

pub fn session_config(reference: Vec<f32>) -> SessionConfig {
    SessionConfig {
        candidate_email: "candidate@example.com".to_string(),
        discipline: "Engineering".to_string(),
        reference_embedding: reference,
        subcategories: Vec::new(),
        proctoring: ProctoringSettings::default(),
    }
}

pub struct Harness {
    pub camera: Arc<FakeCamera>,
    pub analyzer: Arc<ScriptedAnalyzer>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_camera(FakeCamera::working())
    }

    pub fn with_camera(camera: Arc<FakeCamera>) -> Self {
        Self {
            camera,
            analyzer: ScriptedAnalyzer::new(FaceScript::candidate()),
            sink: RecordingSink::new(),
        }
    }

    pub fn deps(&self) -> SessionDeps {
        SessionDeps {
            camera: self.camera.clone(),
            analyzer: self.analyzer.clone(),
            sink: self.sink.clone(),
        }
    }
}
