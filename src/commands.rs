use std::sync::Arc;

use anyhow::Result;
use log::{error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tauri::{AppHandle, Builder, Emitter, Manager, State, WindowEvent};

use crate::assessment::OptionLetter;
use crate::config::AppConfig;
use crate::database::{connect_backend, load_question_set};
use crate::profile::{LocalProfile, ProfileStore};
use crate::proctor::{BridgedCamera, CameraError, RemoteFaceAnalyzer};
use crate::session::{AssessmentOutcome, SessionConfig, SessionDeps, SessionOrchestrator, SessionView, SubmitTrigger};

pub fn run() -> Result<()> {
    let config = AppConfig::load()?;
    info!("ProctorDesk starting up...");

    Builder::default()
        .invoke_handler(tauri::generate_handler![
            load_profile,
            enroll_reference,
            set_subcategories,
            prepare_session,
            start_assessment,
            select_answer,
            next_question,
            previous_question,
            submit_assessment,
            retry_submission,
            session_view,
            end_session,
            // Camera bridge: the webview owns the media stream
            push_camera_frame,
            report_camera_state,
            report_camera_error
        ])
        .setup(move |app| {
            let data_dir = config.storage.resolve_data_dir();
            let handle = app.handle().clone();
            let camera = Arc::new(BridgedCamera::with_open_hook(move |constraints| {
                if let Err(e) = handle.emit("camera-request", *constraints) {
                    error!("Failed to request camera from webview: {}", e);
                }
            }));

            info!("✅ Local profile store at {}", data_dir.display());
            app.manage(DesktopState {
                profiles: ProfileStore::new(&data_dir),
                config,
                camera,
                session: Mutex::new(None),
            });
            Ok(())
        })
        .on_window_event(|window, event| {
            if let WindowEvent::Destroyed = event {
                if let Some(state) = window.try_state::<DesktopState>() {
                    if let Some(session) = state.session.lock().take() {
                        session.shutdown();
                    }
                }
            }
        })
        .run(tauri::generate_context!())?;

    Ok(())
}

struct DesktopState {
    config: AppConfig,
    profiles: ProfileStore,
    camera: Arc<BridgedCamera>,
    session: Mutex<Option<Arc<SessionOrchestrator>>>,
}

impl DesktopState {
    fn current_session(&self) -> Result<Arc<SessionOrchestrator>, String> {
        self.session
            .lock()
            .clone()
            .ok_or_else(|| "No assessment session has been prepared".to_string())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrepareSessionPayload {
    email: String,
    discipline: String,
}

#[tauri::command]
fn load_profile(state: State<'_, DesktopState>) -> Result<LocalProfile, String> {
    state.profiles.load().map_err(|e| e.to_string())
}

#[tauri::command]
fn enroll_reference(embedding: Vec<f32>, state: State<'_, DesktopState>) -> Result<LocalProfile, String> {
    info!("Enrolling reference embedding ({} dimensions)", embedding.len());
    state.profiles.enroll_reference(embedding).map_err(|e| {
        error!("Failed to enroll reference embedding: {}", e);
        e.to_string()
    })
}

#[tauri::command]
fn set_subcategories(subcategories: Vec<String>, state: State<'_, DesktopState>) -> Result<LocalProfile, String> {
    state.profiles.set_subcategories(subcategories).map_err(|e| e.to_string())
}

#[tauri::command]
async fn prepare_session(
    payload: PrepareSessionPayload,
    app_handle: AppHandle,
    state: State<'_, DesktopState>,
) -> Result<SessionView, String> {
    info!("Preparing assessment for {} ({})", payload.email, payload.discipline);

    if let Some(previous) = state.session.lock().take() {
        previous.shutdown();
    }

    let profile = state
        .profiles
        .load()
        .map_err(|e| format!("Failed to load local profile: {}", e))?;
    let face_service = state
        .config
        .backend
        .face_service_url
        .clone()
        .ok_or_else(|| "Face service URL is not configured".to_string())?;

    let (source, sink) = connect_backend(&state.config).await.map_err(|e| e.to_string())?;
    let questions = load_question_set(source.as_ref(), &payload.discipline, &profile.subcategories)
        .await
        .map_err(|e| e.to_string())?;

    let proctoring = state.config.proctoring.clone();
    let analyzer = Arc::new(RemoteFaceAnalyzer::new(
        face_service,
        state.config.backend.api_key.clone(),
        proctoring.snapshot_jpeg_quality,
    ));
    let config = SessionConfig::from_profile(payload.email, payload.discipline, &profile, proctoring);
    let deps = SessionDeps {
        camera: state.camera.clone(),
        analyzer,
        sink,
    };

    let session = Arc::new(SessionOrchestrator::new(config, questions, deps).map_err(|e| e.to_string())?);
    forward_stage_changes(&app_handle, &session);
    forward_save_states(&app_handle, &session);

    let view = session.view();
    *state.session.lock() = Some(session);
    Ok(view)
}

fn forward_stage_changes(app_handle: &AppHandle, session: &SessionOrchestrator) {
    let mut stages = session.subscribe();
    let app_handle = app_handle.clone();
    tauri::async_runtime::spawn(async move {
        while stages.changed().await.is_ok() {
            let stage = *stages.borrow_and_update();
            if let Err(e) = app_handle.emit("session-stage", stage) {
                error!("Failed to emit stage change: {}", e);
            }
        }
    });
}

// Automatic submits have no caller to reject, so failed saves surface here.
fn forward_save_states(app_handle: &AppHandle, session: &SessionOrchestrator) {
    let mut saves = session.subscribe_saves();
    let app_handle = app_handle.clone();
    tauri::async_runtime::spawn(async move {
        while saves.changed().await.is_ok() {
            let save = *saves.borrow_and_update();
            if let Err(e) = app_handle.emit("session-save", save) {
                error!("Failed to emit save state: {}", e);
            }
        }
    });
}

#[tauri::command]
async fn start_assessment(state: State<'_, DesktopState>) -> Result<SessionView, String> {
    let session = state.current_session()?;
    session.start_assessment().await.map_err(|e| {
        warn!("Assessment could not start: {}", e);
        e.to_string()
    })?;
    Ok(session.view())
}

#[tauri::command]
fn select_answer(index: usize, letter: String, state: State<'_, DesktopState>) -> Result<SessionView, String> {
    let letter = letter.parse::<OptionLetter>().map_err(|e| e.to_string())?;
    let session = state.current_session()?;
    session.select_answer(index, letter).map_err(|e| e.to_string())?;
    Ok(session.view())
}

// Async so the opportunistic snapshot is spawned on the runtime.
#[tauri::command]
async fn next_question(state: State<'_, DesktopState>) -> Result<SessionView, String> {
    let session = state.current_session()?;
    session.advance().map_err(|e| e.to_string())?;
    Ok(session.view())
}

#[tauri::command]
fn previous_question(state: State<'_, DesktopState>) -> Result<SessionView, String> {
    let session = state.current_session()?;
    session.retreat().map_err(|e| e.to_string())?;
    Ok(session.view())
}

#[tauri::command]
async fn submit_assessment(state: State<'_, DesktopState>) -> Result<AssessmentOutcome, String> {
    let session = state.current_session()?;
    session.submit(SubmitTrigger::Manual).await.map_err(|e| {
        error!("Submission failed: {}", e);
        e.to_string()
    })
}

#[tauri::command]
async fn retry_submission(state: State<'_, DesktopState>) -> Result<AssessmentOutcome, String> {
    let session = state.current_session()?;
    session.retry_persist().await.map_err(|e| e.to_string())
}

#[tauri::command]
fn session_view(state: State<'_, DesktopState>) -> Result<SessionView, String> {
    Ok(state.current_session()?.view())
}

#[tauri::command]
fn end_session(state: State<'_, DesktopState>) {
    if let Some(session) = state.session.lock().take() {
        info!("Ending assessment session");
        session.shutdown();
    }
}

#[tauri::command]
fn push_camera_frame(data_url: String, state: State<'_, DesktopState>) -> Result<(u32, u32), String> {
    state.camera.push_frame_data_url(&data_url).map_err(|e| e.to_string())
}

#[tauri::command]
fn report_camera_state(live: bool, state: State<'_, DesktopState>) {
    state.camera.report_track_state(live);
}

#[tauri::command]
fn report_camera_error(message: String, denied: bool, state: State<'_, DesktopState>) {
    warn!("Webview camera setup failed: {}", message);
    let error = if denied {
        CameraError::PermissionDenied
    } else {
        CameraError::Unavailable(message)
    };
    state.camera.report_setup_failure(error);
}
