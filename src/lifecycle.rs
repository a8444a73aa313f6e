//! Processing lifecycle: the observable state machine around one extraction.
//!
//! ```text
//!            submit_upload (stages, stays Idle)
//!               ┌───┐
//!               ▼   │
//!  clear ──▶  Idle ─┴─trigger──▶ Processing ──ok──▶ Success(result)
//!               ▲                    │
//!               │                    └──fail──▶ Error(message)
//!               └────── dismiss_error ─────────────┘
//!
//!  any state ──clear──▶ Idle (staged input and result discarded)
//! ```
//!
//! A camera still skips the staging step: [`LabelPipeline::submit_capture`]
//! stages and triggers in one call.
//!
//! At most one extraction is outstanding. A trigger while one is in flight
//! is rejected, never queued. A `clear` during processing returns the state
//! to `Idle` at once; the outstanding attempt's outcome is discarded when it
//! arrives, and the single-flight guard holds until then. Dropping a
//! `trigger` future releases the guard; if nothing cleared the pipeline in
//! the meantime it returns to `Idle` with the input still staged.
//!
//! Hosts observe state through [`LabelPipeline::subscribe`]; transitions are
//! the only way the state changes.

use crate::capture::CaptureSession;
use crate::config::ExtractionConfig;
use crate::error::LabelScanError;
use crate::extract::{recognize_labels, resolve_service};
use crate::output::ExtractionResult;
use crate::pipeline::input::{self, StagedInput};
use crate::pipeline::service::RecognitionService;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The pipeline's observable status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Processing,
    Success(ExtractionResult),
    /// Operator-facing failure message.
    Error(String),
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Processing => "processing",
            PipelineState::Success(_) => "showing a result",
            PipelineState::Error(_) => "in error",
        }
    }

    pub fn result(&self) -> Option<&ExtractionResult> {
        match self {
            PipelineState::Success(r) => Some(r),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            PipelineState::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Inner {
    staged: Option<StagedInput>,
    /// Bumped by every submit and clear; an outcome whose generation is
    /// stale is dropped.
    generation: u64,
    in_flight: bool,
}

/// Coordinates staging, extraction and the resulting state.
pub struct LabelPipeline {
    service: Arc<dyn RecognitionService>,
    config: ExtractionConfig,
    state_tx: watch::Sender<PipelineState>,
    inner: Mutex<Inner>,
}

impl LabelPipeline {
    pub fn new(service: Arc<dyn RecognitionService>, config: ExtractionConfig) -> Self {
        let (state_tx, _) = watch::channel(PipelineState::Idle);
        Self {
            service,
            config,
            state_tx,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Build a pipeline whose service is resolved from `config`.
    pub fn from_config(config: ExtractionConfig) -> Result<Self, LabelScanError> {
        let service = resolve_service(&config)?;
        Ok(Self::new(service, config))
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> PipelineState {
        self.state_tx.borrow().clone()
    }

    /// Receive every subsequent state change.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state_tx.subscribe()
    }

    /// The currently staged input, if any.
    pub fn staged(&self) -> Option<StagedInput> {
        self.lock().staged.clone()
    }

    /// Stage an already-validated input, replacing anything staged before
    /// and dropping any prior result or error.
    pub fn submit_upload(&self, staged: StagedInput) -> Result<(), LabelScanError> {
        let mut inner = self.lock();
        if inner.in_flight {
            return Err(LabelScanError::ExtractionInFlight);
        }
        info!("Staged {} ({} bytes)", staged.filename, staged.size_bytes);
        inner.staged = Some(staged);
        inner.generation += 1;
        self.set_state(PipelineState::Idle);
        Ok(())
    }

    /// Validate and stage an in-memory upload. A rejected file leaves the
    /// pipeline untouched.
    pub fn submit_bytes(&self, name: &str, bytes: &[u8]) -> Result<(), LabelScanError> {
        let staged = input::stage_bytes(name, bytes, self.config.max_upload_bytes)?;
        self.submit_upload(staged)
    }

    /// Validate and stage a local path or URL.
    pub async fn submit_path(&self, input_str: &str) -> Result<(), LabelScanError> {
        let staged = input::stage_input(
            input_str,
            self.config.max_upload_bytes,
            self.config.download_timeout_secs,
        )
        .await?;
        self.submit_upload(staged)
    }

    /// Run the extraction for the staged input.
    ///
    /// Only valid from `Idle` with something staged. The service outcome is
    /// reported through the state (and returned), not as `Err`: `Err` means
    /// the trigger itself was refused.
    pub async fn trigger(&self) -> Result<PipelineState, LabelScanError> {
        let (staged, generation) = {
            let mut inner = self.lock();
            if inner.in_flight {
                return Err(LabelScanError::ExtractionInFlight);
            }
            if *self.state_tx.borrow() != PipelineState::Idle {
                return Err(self.invalid("start an extraction"));
            }
            let staged = inner.staged.clone().ok_or(LabelScanError::NothingStaged)?;
            inner.in_flight = true;
            self.set_state(PipelineState::Processing);
            (staged, inner.generation)
        };
        let mut flight = InFlight {
            pipeline: self,
            generation,
            settled: false,
        };

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_extraction_start(&staged.filename, staged.mime_type());
        }

        let outcome = recognize_labels(self.service.as_ref(), &staged, &self.config).await;

        let mut inner = self.lock();
        inner.in_flight = false;
        flight.settled = true;
        if inner.generation != generation {
            debug!("Discarding outcome for {}: cleared while processing", staged.filename);
            return Ok(self.state());
        }

        let next = match outcome {
            Ok(labels) => {
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_extraction_complete(&staged.filename, labels.len());
                }
                PipelineState::Success(ExtractionResult {
                    filename: staged.filename.clone(),
                    labels,
                })
            }
            Err(e) => {
                warn!("Extraction failed for {}: {}", staged.filename, e);
                let message = e.user_message();
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_extraction_error(&staged.filename, &message);
                }
                PipelineState::Error(message)
            }
        };
        self.set_state(next.clone());
        Ok(next)
    }

    /// Stage a camera still and extract it immediately.
    pub async fn submit_capture(&self, still: StagedInput) -> Result<PipelineState, LabelScanError> {
        self.submit_upload(still)?;
        self.trigger().await
    }

    /// Take a still from a ready session, close the session, and extract.
    pub async fn capture_and_extract(
        &self,
        session: &mut CaptureSession,
    ) -> Result<PipelineState, LabelScanError> {
        if self.lock().in_flight {
            return Err(LabelScanError::ExtractionInFlight);
        }
        let still = session.capture_still()?;
        session.close();
        self.submit_capture(still).await
    }

    /// "Try again": leave `Error` for `Idle`, keeping the staged input so
    /// the operator can re-trigger without re-uploading.
    pub fn dismiss_error(&self) -> Result<(), LabelScanError> {
        let _inner = self.lock();
        if !matches!(*self.state_tx.borrow(), PipelineState::Error(_)) {
            return Err(self.invalid("dismiss an error"));
        }
        self.set_state(PipelineState::Idle);
        Ok(())
    }

    /// New scan: discard staged input and any result, from any state.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.staged = None;
        inner.generation += 1;
        self.set_state(PipelineState::Idle);
    }

    fn set_state(&self, state: PipelineState) {
        debug!("Pipeline → {}", state.name());
        self.state_tx.send_replace(state);
    }

    fn invalid(&self, action: &'static str) -> LabelScanError {
        LabelScanError::InvalidTransition {
            state: self.state_tx.borrow().name(),
            action,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Releases the single-flight guard when a `trigger` future is dropped
/// before the service answers.
struct InFlight<'a> {
    pipeline: &'a LabelPipeline,
    generation: u64,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut inner = self.pipeline.lock();
        inner.in_flight = false;
        if inner.generation == self.generation
            && *self.pipeline.state_tx.borrow() == PipelineState::Processing
        {
            warn!("Extraction abandoned before the service answered");
            self.pipeline.set_state(PipelineState::Idle);
        }
    }
}
