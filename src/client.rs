//! Inference client driving the upload → submit → fetch pipeline
//!
//! Each `classify` call owns its own `PipelineRun`; the client itself only holds
//! shared, immutable configuration, the transport, and the in-flight counter.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::{
    config::ClientConfig,
    error::{ClientError, ErrorKind, PipelineError, PipelineResult},
    io_struct::{PredictRequest, UPLOAD_FIELD_NAME, decode_result, decode_submit, decode_upload},
    transport::{HttpTransport, Transport, UploadFile},
    types::{
        ClassificationOutcome, DisplayState, ImagePayload, JobHandle, PipelineState, Stage,
        UploadHandle,
    },
};

#[derive(Clone)]
pub struct InferenceClient {
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
    in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for InferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceClient")
            .field("base_url", &self.config.base_url)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl InferenceClient {
    /// Validate the config and build a client backed by `HttpTransport`.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: Arc::new(config),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// True while at least one invocation has not reached `Done`
    pub fn is_in_flight(&self) -> bool {
        self.in_flight() > 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run the whole pipeline for one image.
    ///
    /// Always resolves to exactly one outcome; errors never escape.
    pub async fn classify(&self, image: ImagePayload) -> ClassificationOutcome {
        self.classify_with_cancel(image, CancellationToken::new())
            .await
    }

    /// Like `classify`, but stops at the current stage once `cancel` fires.
    pub async fn classify_with_cancel(
        &self,
        image: ImagePayload,
        cancel: CancellationToken,
    ) -> ClassificationOutcome {
        let guard = InFlightGuard::new(self.in_flight.clone());
        self.run(image, cancel, None, guard).await
    }

    /// Run the pipeline on a background task.
    ///
    /// The in-flight flag is raised before this returns. Dropping the handle
    /// cancels the invocation.
    pub fn spawn(&self, image: ImagePayload) -> ClassificationHandle {
        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let guard = InFlightGuard::new(self.in_flight.clone());

        let client = self.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let outcome = client.run(image, token, Some(state_tx), guard).await;
            // receiver gone means nobody is waiting any more
            let _ = outcome_tx.send(outcome);
        });

        ClassificationHandle {
            state: state_rx,
            outcome: outcome_rx,
            _abandon: cancel.clone().drop_guard(),
            cancel,
        }
    }

    async fn run(
        &self,
        image: ImagePayload,
        cancel: CancellationToken,
        observer: Option<watch::Sender<PipelineState>>,
        _guard: InFlightGuard,
    ) -> ClassificationOutcome {
        let mut run = PipelineRun::new(observer);
        info!(
            "Classification {} started ({} bytes, {})",
            run.id,
            image.len(),
            image.media_type()
        );

        run.advance(PipelineState::Uploading);
        let upload = match self
            .run_stage(Stage::Upload, &cancel, self.upload(&image))
            .await
        {
            Ok(handle) => handle,
            Err(e) => return run.fail(Stage::Upload, e),
        };
        debug!("Classification {} uploaded as {}", run.id, upload);

        run.advance(PipelineState::Submitting);
        let job = match self
            .run_stage(Stage::Submit, &cancel, self.submit(&upload))
            .await
        {
            Ok(job) => job,
            Err(e) => return run.fail(Stage::Submit, e),
        };
        debug!("Classification {} submitted as job {}", run.id, job);

        run.advance(PipelineState::Fetching);
        match self
            .run_stage(Stage::Fetch, &cancel, self.fetch(&job))
            .await
        {
            Ok(label) => run.succeed(label),
            Err(e) => run.fail(Stage::Fetch, e),
        }
    }

    fn stage_timeout(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Upload => self.config.upload_timeout,
            Stage::Submit => self.config.submit_timeout,
            Stage::Fetch => self.config.fetch_timeout,
        }
    }

    /// Bound a stage by its time budget and the cancellation token.
    async fn run_stage<T>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        fut: impl Future<Output = PipelineResult<T>>,
    ) -> PipelineResult<T> {
        let budget = self.stage_timeout(stage);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            result = tokio::time::timeout(budget, fut) => {
                result.unwrap_or(Err(PipelineError::Timeout(budget)))
            }
        }
    }

    async fn upload(&self, image: &ImagePayload) -> PipelineResult<UploadHandle> {
        image.validate()?;

        let file = UploadFile {
            field_name: UPLOAD_FIELD_NAME,
            file_name: image
                .filename()
                .unwrap_or(&self.config.upload_filename)
                .to_string(),
            media_type: image.media_type().to_string(),
            content: image.content().clone(),
        };
        let response = self
            .transport
            .upload(&self.config.upload_url(), file)
            .await?
            .error_for_status()?;
        decode_upload(&response.body)
    }

    async fn submit(&self, handle: &UploadHandle) -> PipelineResult<JobHandle> {
        let body = serde_json::to_value(PredictRequest::for_upload(handle))?;
        let response = self
            .transport
            .post_json(&self.config.predict_url(), &body)
            .await?
            .error_for_status()?;
        decode_submit(&response.body)
    }

    async fn fetch(&self, job: &JobHandle) -> PipelineResult<String> {
        let url = self
            .config
            .result_url(job)
            .map_err(|e| PipelineError::Transport(e.to_string()))?;
        let response = self.transport.get(&url).await?.error_for_status()?;
        decode_result(
            &response.body,
            response.is_event_stream(),
            self.config.fetch_mode,
        )
    }
}

/// State of one invocation, mirrored to an optional observer
struct PipelineRun {
    id: Uuid,
    state: PipelineState,
    observer: Option<watch::Sender<PipelineState>>,
    started_at: Instant,
}

impl PipelineRun {
    fn new(observer: Option<watch::Sender<PipelineState>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: PipelineState::Idle,
            observer,
            started_at: Instant::now(),
        }
    }

    fn advance(&mut self, next: PipelineState) {
        if !self.state.can_transition_to(&next) {
            error!(
                "Classification {} refused transition {} -> {}",
                self.id,
                self.state.name(),
                next.name()
            );
            return;
        }
        debug!(
            "Classification {}: {} -> {}",
            self.id,
            self.state.name(),
            next.name()
        );
        if let Some(observer) = &self.observer {
            observer.send_replace(next.clone());
        }
        self.state = next;
    }

    fn succeed(mut self, label: String) -> ClassificationOutcome {
        info!(
            "Classification {} completed in {:?}: {}",
            self.id,
            self.started_at.elapsed(),
            label
        );
        let outcome = ClassificationOutcome::Success { label };
        self.advance(PipelineState::Done(outcome.clone()));
        outcome
    }

    fn fail(mut self, stage: Stage, error: PipelineError) -> ClassificationOutcome {
        warn!(
            "Classification {} failed at {} stage after {:?}: {}",
            self.id,
            stage,
            self.started_at.elapsed(),
            error
        );
        let outcome = ClassificationOutcome::failure(stage, &error);
        self.advance(PipelineState::Done(outcome.clone()));
        outcome
    }
}

/// RAII guard for the in-flight counter
///
/// Decrements on drop, so cancelled or panicking invocations are released too.
struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl InFlightGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { counter }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Caller-side view of a spawned invocation
pub struct ClassificationHandle {
    state: watch::Receiver<PipelineState>,
    outcome: oneshot::Receiver<ClassificationOutcome>,
    cancel: CancellationToken,
    _abandon: DropGuard,
}

impl ClassificationHandle {
    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    pub fn display_state(&self) -> DisplayState {
        DisplayState::from(&*self.state.borrow())
    }

    /// Wait for the next state change. Returns `None` once the pipeline is gone.
    pub async fn state_changed(&mut self) -> Option<PipelineState> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn outcome(self) -> ClassificationOutcome {
        let ClassificationHandle {
            state,
            outcome,
            _abandon,
            ..
        } = self;
        match outcome.await {
            Ok(outcome) => outcome,
            Err(_) => {
                let stage = state.borrow().stage().unwrap_or(Stage::Upload);
                ClassificationOutcome::Failure {
                    stage,
                    kind: ErrorKind::Cancelled,
                    message: "classification task ended without an outcome".to_string(),
                }
            }
        }
    }
}
