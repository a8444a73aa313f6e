//! Live-camera capture session.
//!
//! A [`CaptureSession`] owns the one exclusively-held external resource in
//! the crate: the device stream. It is the only place a stream is opened or
//! stopped, and every exit path (close, restart, retry, drop) stops the
//! current stream before anything else happens.
//!
//! ```text
//!                 ┌──────── restart ────────┐
//!                 ▼                         │
//! open ──▶ Initializing ──(Ready)──▶ Ready ─┘
//!                 │
//!                 └──(Failed)──▶ Error ──retry──▶ Initializing
//!
//! any state ──close──▶ Closed
//! ```
//!
//! Readiness is an event delivered by the stream, never a polled flag:
//! a session is not `Ready` until [`CaptureSession::on_event`] has applied
//! [`DeviceEvent::Ready`].

use crate::config::MAX_UPLOAD_BYTES;
use crate::error::{CaptureFailure, LabelScanError};
use crate::pipeline::encode::encode_still;
use crate::pipeline::input::{capture_filename, stage_bytes_with_mime, MediaType, StagedInput};
use async_trait::async_trait;
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

// ── Device contract ──────────────────────────────────────────────────────

/// Which camera to prefer when several are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear camera on phones and tablets.
    Environment,
    User,
}

/// What the session asks the device for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            ideal_width: 1920,
            ideal_height: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    PermissionDenied,
    NotFound,
    Other,
}

/// A failure reported by a capture device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(DeviceErrorKind::Other, message)
    }

    /// Map to the operator-facing failure class.
    pub fn classify(&self) -> CaptureFailure {
        match self.kind {
            DeviceErrorKind::PermissionDenied => CaptureFailure::PermissionDenied,
            DeviceErrorKind::NotFound => CaptureFailure::NoDevice,
            DeviceErrorKind::Other => CaptureFailure::Unknown {
                detail: self.message.clone(),
            },
        }
    }
}

/// Asynchronous signals from an open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The first frame is available.
    Ready,
    Failed(DeviceError),
}

/// Something that can open a video stream.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, DeviceError>;
}

/// An open, exclusively-held video stream.
#[async_trait]
pub trait VideoStream: Send {
    /// Wait for the next device event. `None` means the stream ended.
    async fn next_event(&mut self) -> Option<DeviceEvent>;

    /// Whether the device exposes an illumination (torch) control.
    fn torch_supported(&self) -> bool;

    async fn set_torch(&mut self, on: bool) -> Result<(), DeviceError>;

    /// Render the current live frame.
    fn grab_frame(&mut self) -> Result<DynamicImage, DeviceError>;

    /// Release the device. Must be idempotent.
    fn stop(&mut self);
}

// ── Session ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Initializing,
    Ready,
    Error(CaptureFailure),
    Closed,
}

impl CaptureState {
    fn name(&self) -> &'static str {
        match self {
            CaptureState::Initializing => "initializing",
            CaptureState::Ready => "ready",
            CaptureState::Error(_) => "in error",
            CaptureState::Closed => "closed",
        }
    }
}

/// Camera lifecycle feeding still frames to the extraction pipeline.
pub struct CaptureSession {
    device: Arc<dyn CaptureDevice>,
    constraints: StreamConstraints,
    stream: Option<Box<dyn VideoStream>>,
    state: CaptureState,
    torch_on: bool,
}

impl CaptureSession {
    /// Create a session without touching the device.
    pub fn new(device: Arc<dyn CaptureDevice>, constraints: StreamConstraints) -> Self {
        Self {
            device,
            constraints,
            stream: None,
            state: CaptureState::Initializing,
            torch_on: false,
        }
    }

    /// Create a session and request the stream. The session is left in
    /// `Initializing` (or `Error`); call [`await_ready`](Self::await_ready)
    /// to wait for the device.
    pub async fn open(device: Arc<dyn CaptureDevice>, constraints: StreamConstraints) -> Self {
        let mut session = Self::new(device, constraints);
        session.start().await;
        session
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == CaptureState::Ready
    }

    pub fn torch_on(&self) -> bool {
        self.torch_on
    }

    /// Capability query; false whenever there is no live stream.
    pub fn torch_supported(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.torch_supported())
    }

    /// Release any held stream, then request a fresh one.
    pub async fn start(&mut self) {
        self.release();
        self.state = CaptureState::Initializing;
        self.torch_on = false;

        debug!(
            "Requesting {:?} stream at {}x{}",
            self.constraints.facing, self.constraints.ideal_width, self.constraints.ideal_height
        );
        match self.device.open(&self.constraints).await {
            Ok(stream) => self.stream = Some(stream),
            Err(e) => self.fail(e),
        }
    }

    /// Apply a device event.
    ///
    /// `Ready` only has an effect while `Initializing`. `Failed` moves a
    /// live session (initializing or ready) to `Error` and releases the stream.
    pub fn on_event(&mut self, event: DeviceEvent) {
        let live = matches!(self.state, CaptureState::Initializing | CaptureState::Ready);
        match event {
            DeviceEvent::Ready if self.state == CaptureState::Initializing => {
                info!("Camera ready");
                self.state = CaptureState::Ready;
            }
            DeviceEvent::Failed(e) if live => self.fail(e),
            event => debug!("Ignoring {event:?} while {}", self.state.name()),
        }
    }

    /// Drive stream events until the session leaves `Initializing`.
    pub async fn await_ready(&mut self) -> &CaptureState {
        while self.state == CaptureState::Initializing {
            let event = match self.stream.as_mut() {
                Some(stream) => stream.next_event().await,
                None => break,
            };
            match event {
                Some(event) => self.on_event(event),
                None => self.fail(DeviceError::other("stream ended before the first frame")),
            }
        }
        &self.state
    }

    /// Re-attempt acquisition after a failure.
    pub async fn retry(&mut self) -> Result<&CaptureState, LabelScanError> {
        if !matches!(self.state, CaptureState::Error(_)) {
            return Err(self.invalid("retry the camera"));
        }
        self.start().await;
        Ok(self.await_ready().await)
    }

    /// Tear down the live stream and acquire a new one.
    pub async fn restart(&mut self) -> Result<&CaptureState, LabelScanError> {
        if self.state != CaptureState::Ready {
            return Err(self.invalid("restart the camera"));
        }
        self.start().await;
        Ok(self.await_ready().await)
    }

    /// Close the session from any state, releasing the device.
    pub fn close(&mut self) {
        self.release();
        self.torch_on = false;
        self.state = CaptureState::Closed;
    }

    /// Toggle the torch. Best effort: unsupported devices are a no-op and a
    /// failed toggle is logged without changing session state.
    ///
    /// Returns whether the torch is on afterwards.
    pub async fn toggle_torch(&mut self) -> bool {
        if self.state != CaptureState::Ready {
            return self.torch_on;
        }
        let Some(stream) = self.stream.as_mut() else {
            return self.torch_on;
        };
        if !stream.torch_supported() {
            return self.torch_on;
        }

        let next = !self.torch_on;
        match stream.set_torch(next).await {
            Ok(()) => self.torch_on = next,
            Err(e) => warn!("Torch toggle failed: {e}"),
        }
        self.torch_on
    }

    /// Encode the current frame as a JPEG still, staged like an upload.
    pub fn capture_still(&mut self) -> Result<StagedInput, LabelScanError> {
        if self.state != CaptureState::Ready {
            return Err(LabelScanError::CaptureNotReady);
        }
        let stream = self.stream.as_mut().ok_or(LabelScanError::CaptureNotReady)?;

        let frame = stream
            .grab_frame()
            .map_err(|e| LabelScanError::FrameCapture(e.to_string()))?;
        let jpeg = encode_still(&frame).map_err(|e| LabelScanError::FrameCapture(e.to_string()))?;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let name = capture_filename(millis);
        info!("Captured still {name} ({} bytes)", jpeg.len());
        stage_bytes_with_mime(&name, MediaType::Jpeg.mime_type(), &jpeg, MAX_UPLOAD_BYTES)
    }

    fn fail(&mut self, error: DeviceError) {
        warn!("Camera error: {error}");
        self.release();
        self.torch_on = false;
        self.state = CaptureState::Error(error.classify());
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            debug!("Camera stream released");
        }
    }

    fn invalid(&self, action: &'static str) -> LabelScanError {
        LabelScanError::InvalidTransition {
            state: self.state.name(),
            action,
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

// ── File-backed device ───────────────────────────────────────────────────

/// A device whose live frame is an image file on disk.
///
/// Useful for kiosk snapshot feeds and tests: the file is re-read on every
/// grab, so an external process can keep overwriting it. No torch.
#[derive(Debug, Clone)]
pub struct FileFrameDevice {
    path: PathBuf,
}

impl FileFrameDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CaptureDevice for FileFrameDevice {
    async fn open(&self, _constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, DeviceError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(DeviceError::new(
                    DeviceErrorKind::NotFound,
                    format!("{} is not a file", self.path.display()),
                ))
            }
            Err(e) => {
                let kind = match e.kind() {
                    std::io::ErrorKind::NotFound => DeviceErrorKind::NotFound,
                    std::io::ErrorKind::PermissionDenied => DeviceErrorKind::PermissionDenied,
                    _ => DeviceErrorKind::Other,
                };
                return Err(DeviceError::new(kind, format!("{}: {e}", self.path.display())));
            }
        }

        Ok(Box::new(FileFrameStream {
            path: self.path.clone(),
            announced: false,
            stopped: false,
        }))
    }
}

struct FileFrameStream {
    path: PathBuf,
    announced: bool,
    stopped: bool,
}

impl FileFrameStream {
    fn read_frame(&self) -> Result<DynamicImage, DeviceError> {
        if self.stopped {
            return Err(DeviceError::other("stream stopped"));
        }
        image::open(&self.path)
            .map_err(|e| DeviceError::other(format!("{}: {e}", self.path.display())))
    }
}

#[async_trait]
impl VideoStream for FileFrameStream {
    async fn next_event(&mut self) -> Option<DeviceEvent> {
        if self.announced || self.stopped {
            return None;
        }
        self.announced = true;
        Some(match self.read_frame() {
            Ok(_) => DeviceEvent::Ready,
            Err(e) => DeviceEvent::Failed(e),
        })
    }

    fn torch_supported(&self) -> bool {
        false
    }

    async fn set_torch(&mut self, _on: bool) -> Result<(), DeviceError> {
        Err(DeviceError::other("file-backed device has no torch"))
    }

    fn grab_frame(&mut self) -> Result<DynamicImage, DeviceError> {
        self.read_frame()
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Device whose streams replay a scripted list of events.
    #[derive(Default)]
    struct Scripted {
        opens: AtomicUsize,
        stops: Arc<AtomicUsize>,
        open_results: Mutex<VecDeque<Result<Vec<DeviceEvent>, DeviceError>>>,
        torch: bool,
        torch_fails: bool,
    }

    impl Scripted {
        fn with(results: Vec<Result<Vec<DeviceEvent>, DeviceError>>) -> Self {
            Self {
                open_results: Mutex::new(results.into()),
                ..Default::default()
            }
        }
        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
        fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    struct ScriptedStream {
        events: VecDeque<DeviceEvent>,
        stops: Arc<AtomicUsize>,
        stopped: bool,
        torch: bool,
        torch_fails: bool,
    }

    #[async_trait]
    impl CaptureDevice for Scripted {
        async fn open(&self, _c: &StreamConstraints) -> Result<Box<dyn VideoStream>, DeviceError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let next = self
                .open_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![DeviceEvent::Ready]));
            let events = next?;
            Ok(Box::new(ScriptedStream {
                events: events.into(),
                stops: self.stops.clone(),
                stopped: false,
                torch: self.torch,
                torch_fails: self.torch_fails,
            }))
        }
    }

    #[async_trait]
    impl VideoStream for ScriptedStream {
        async fn next_event(&mut self) -> Option<DeviceEvent> {
            self.events.pop_front()
        }
        fn torch_supported(&self) -> bool {
            self.torch
        }
        async fn set_torch(&mut self, _on: bool) -> Result<(), DeviceError> {
            if self.torch_fails {
                Err(DeviceError::other("torch busy"))
            } else {
                Ok(())
            }
        }
        fn grab_frame(&mut self) -> Result<DynamicImage, DeviceError> {
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]))))
        }
        fn stop(&mut self) {
            if !self.stopped {
                self.stopped = true;
                self.stops.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    async fn ready_session(device: Arc<Scripted>) -> CaptureSession {
        let mut s = CaptureSession::open(device, StreamConstraints::default()).await;
        s.await_ready().await;
        s
    }

    #[tokio::test]
    async fn not_ready_until_event() {
        let device = Arc::new(Scripted::default());
        let mut s = CaptureSession::open(device.clone(), StreamConstraints::default()).await;
        assert_eq!(s.state(), &CaptureState::Initializing);
        assert!(matches!(s.capture_still(), Err(LabelScanError::CaptureNotReady)));
        s.on_event(DeviceEvent::Ready);
        assert!(s.is_ready());
    }

    #[tokio::test]
    async fn permission_denied_then_retry() {
        let device = Arc::new(Scripted::with(vec![
            Err(DeviceError::new(DeviceErrorKind::PermissionDenied, "NotAllowedError")),
            Ok(vec![DeviceEvent::Ready]),
        ]));
        let mut s = ready_session(device.clone()).await;
        assert_eq!(s.state(), &CaptureState::Error(CaptureFailure::PermissionDenied));

        let state = s.retry().await.unwrap().clone();
        assert_eq!(state, CaptureState::Ready);
        assert_eq!(device.opens(), 2);
    }

    #[tokio::test]
    async fn failure_event_releases_stream() {
        let device = Arc::new(Scripted::with(vec![Ok(vec![DeviceEvent::Failed(
            DeviceError::new(DeviceErrorKind::NotFound, "NotFoundError"),
        )])]));
        let s = ready_session(device.clone()).await;
        assert_eq!(s.state(), &CaptureState::Error(CaptureFailure::NoDevice));
        assert_eq!(device.stops(), 1);
    }

    #[tokio::test]
    async fn stream_ending_early_is_unknown_failure() {
        let device = Arc::new(Scripted::with(vec![Ok(vec![])]));
        let s = ready_session(device).await;
        assert!(matches!(s.state(), CaptureState::Error(CaptureFailure::Unknown { .. })));
    }

    #[tokio::test]
    async fn restart_releases_before_reacquiring() {
        let device = Arc::new(Scripted::default());
        let mut s = ready_session(device.clone()).await;
        s.restart().await.unwrap();
        assert!(s.is_ready());
        assert_eq!(device.opens(), 2);
        assert_eq!(device.stops(), 1);
    }

    #[tokio::test]
    async fn close_and_drop_release_every_stream() {
        let device = Arc::new(Scripted::default());
        let mut s = ready_session(device.clone()).await;
        s.close();
        assert_eq!(s.state(), &CaptureState::Closed);
        assert_eq!(device.stops(), 1);

        let s = ready_session(device.clone()).await;
        drop(s);
        assert_eq!(device.stops(), 2);
        assert_eq!(device.opens(), device.stops());
    }

    #[tokio::test]
    async fn retry_only_from_error() {
        let device = Arc::new(Scripted::default());
        let mut s = ready_session(device).await;
        assert!(matches!(
            s.retry().await,
            Err(LabelScanError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn torch_without_capability_is_noop() {
        let device = Arc::new(Scripted::default());
        let mut s = ready_session(device).await;
        assert!(!s.torch_supported());
        assert!(!s.toggle_torch().await);
    }

    #[tokio::test]
    async fn torch_toggles_when_supported() {
        let device = Arc::new(Scripted {
            torch: true,
            ..Default::default()
        });
        let mut s = ready_session(device).await;
        assert!(s.toggle_torch().await);
        assert!(!s.toggle_torch().await);
    }

    #[tokio::test]
    async fn torch_failure_keeps_state() {
        let device = Arc::new(Scripted {
            torch: true,
            torch_fails: true,
            ..Default::default()
        });
        let mut s = ready_session(device).await;
        assert!(!s.toggle_torch().await);
        assert!(s.is_ready());
    }

    #[tokio::test]
    async fn still_is_named_jpeg() {
        let device = Arc::new(Scripted::default());
        let mut s = ready_session(device).await;
        let still = s.capture_still().unwrap();
        assert!(still.filename.starts_with("captured-label-"));
        assert!(still.filename.ends_with(".jpg"));
        assert_eq!(still.media_type, MediaType::Jpeg);
        assert!(s.is_ready());
    }

    #[test]
    fn default_constraints_prefer_rear_camera() {
        let c = StreamConstraints::default();
        assert_eq!(c.facing, FacingMode::Environment);
        assert_eq!((c.ideal_width, c.ideal_height), (1920, 1080));
    }

    #[tokio::test]
    async fn missing_frame_file_is_no_device() {
        let device = Arc::new(FileFrameDevice::new("/definitely/not/here.jpg"));
        let s = CaptureSession::open(device, StreamConstraints::default()).await;
        assert_eq!(s.state(), &CaptureState::Error(CaptureFailure::NoDevice));
    }
}
