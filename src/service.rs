use crate::animation::FRAME_INTERVAL;
use crate::bubble::{Bubble, BubbleOptions, BubbleOutcome};
use crate::capture::{CaptureSession, ConsentToken, SETTLE_DELAY, ScreenCapturer};
use crate::config::{BubbleServiceConfig, ConfigStore};
use crate::error::PipelineError;
use crate::geometry::{DisplayMetrics, Point};
use crate::gesture::TouchEvent;
use crate::overlay::WindowHost;
use crate::pipeline::{PipelineEvent, PipelineState};
use crate::recognition::{Recognition, TextRecognizer};
use crate::replies::{ReplyFetcher, ReplySuggestion};
use crate::reply_card::{AUTO_DISMISS_DELAY, Clipboard, DismissReason, ReplyCard};
use crate::scanning::ScanningOverlay;
use crate::skins::{BubbleSkin, ScanningSkin};
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// What the host app answered to a capture consent request.
#[derive(Debug)]
pub enum ConsentResult {
    Granted(ConsentToken),
    Denied,
}

#[derive(Debug)]
pub enum ServiceCommand {
    Configure(BubbleServiceConfig),
    PushReplies(Vec<String>),
    Consent(ConsentResult),
    BubbleTouch(TouchEvent),
    CopyReply(usize),
    CloseCard,
    Stop,
}

/// Notifications for the host app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Started,
    /// The host must surface the system consent dialog and answer with
    /// [`ServiceCommand::Consent`].
    ConsentRequested,
    TextCaptured {
        text: String,
        captured_at: DateTime<Utc>,
    },
    RepliesShown {
        replies: Vec<ReplySuggestion>,
    },
    CaptureError {
        message: String,
    },
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub settle: Duration,
    pub frame_interval: Duration,
    pub auto_dismiss: Duration,
    pub bubble_skin: BubbleSkin,
    pub scanning_skin: ScanningSkin,
    pub snap_to_edge: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            settle: SETTLE_DELAY,
            frame_interval: FRAME_INTERVAL,
            auto_dismiss: AUTO_DISMISS_DELAY,
            bubble_skin: BubbleSkin::default(),
            scanning_skin: ScanningSkin::default(),
            snap_to_edge: false,
        }
    }
}

/// Platform seams the service drives.
#[derive(Clone)]
pub struct ServiceDeps {
    pub host: Arc<dyn WindowHost>,
    pub capturer: Arc<dyn ScreenCapturer>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub fetcher: Arc<dyn ReplyFetcher>,
    pub clipboard: Arc<dyn Clipboard>,
    pub store: ConfigStore,
}

#[derive(Debug)]
enum Step {
    SessionOpened(CaptureSession),
    FrameCaptured,
    TextRecognized(String),
    RepliesReady(Vec<ReplySuggestion>),
    Failed(PipelineError),
    CardDismissed(DismissReason),
}

/// Progress from a background stage, tagged with the run that produced it so
/// late results from an abandoned run are dropped.
#[derive(Debug)]
struct StageMessage {
    run: u64,
    step: Step,
}

struct ScanJob {
    run: u64,
    capturer: Arc<dyn ScreenCapturer>,
    recognizer: Arc<dyn TextRecognizer>,
    fetcher: Arc<dyn ReplyFetcher>,
    store: ConfigStore,
    metrics: DisplayMetrics,
    settle: Duration,
    progress: mpsc::UnboundedSender<StageMessage>,
}

impl ScanJob {
    fn report(&self, step: Step) {
        let _ = self.progress.send(StageMessage {
            run: self.run,
            step,
        });
    }

    async fn run(self, consent: ConsentToken) {
        let step = match self.execute(consent).await {
            Ok(replies) => Step::RepliesReady(replies),
            Err(err) => Step::Failed(err),
        };
        self.report(step);
    }

    async fn execute(&self, consent: ConsentToken) -> Result<Vec<ReplySuggestion>, PipelineError> {
        let session = CaptureSession::open(self.capturer.as_ref(), consent, self.metrics).await?;
        self.report(Step::SessionOpened(session.clone()));
        let grabbed = session.grab_frame(self.settle).await;
        session.release();
        let frame = grabbed?;
        self.report(Step::FrameCaptured);

        let recognition = self.recognizer.recognize(&frame).await.map_err(|err| {
            warn!("text recognition failed: {err:#}");
            PipelineError::RecognitionFailed(format!("text recognition failed: {err}"))
        })?;
        let Recognition::Text(text) = recognition else {
            return Err(PipelineError::NoTextFound);
        };
        self.report(Step::TextRecognized(text.clone()));

        let config = self.store.load().map_err(|err| {
            warn!("{err:#}");
            PipelineError::NotConfigured
        })?;
        if !config.is_configured() {
            return Err(PipelineError::NotConfigured);
        }
        self.fetcher.fetch(&text, &config).await
    }
}

struct ServiceLoop {
    deps: ServiceDeps,
    options: ServiceOptions,
    events: Option<mpsc::UnboundedSender<HostEvent>>,
    state_tx: watch::Sender<PipelineState>,
    progress_tx: mpsc::UnboundedSender<StageMessage>,
    state: PipelineState,
    run: u64,
    bubble: Option<Bubble>,
    scanning: ScanningOverlay,
    card: Option<ReplyCard>,
    session: Option<CaptureSession>,
    in_flight: Option<JoinHandle<()>>,
    stop_when_idle: bool,
}

impl ServiceLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ServiceCommand>,
        mut progress: mpsc::UnboundedReceiver<StageMessage>,
    ) {
        info!("reply bubble service started");
        self.emit(HostEvent::Started);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ServiceCommand::Stop) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(message) = progress.recv() => self.handle_progress(message),
            }

            if self.stop_when_idle && self.state.is_idle() {
                info!("bubble dismissed, stopping service");
                break;
            }
        }

        self.teardown();
    }

    fn handle_command(&mut self, command: ServiceCommand) {
        match command {
            ServiceCommand::Configure(config) => match self.deps.store.save(&config) {
                Ok(()) => info!("configuration saved (tone {})", config.tone),
                Err(err) => warn!("failed to save configuration: {err:#}"),
            },
            ServiceCommand::PushReplies(texts) => self.push_replies(texts),
            ServiceCommand::Consent(result) => {
                if self.state != PipelineState::AwaitingConsent {
                    debug!("ignoring consent result while {}", self.state);
                    return;
                }
                match result {
                    ConsentResult::Granted(token) => self.begin_capture(token),
                    ConsentResult::Denied => self.fail(PipelineEvent::ConsentDenied),
                }
            }
            ServiceCommand::BubbleTouch(event) => {
                let outcome = self
                    .bubble
                    .as_ref()
                    .and_then(|bubble| bubble.handle_touch(event));
                match outcome {
                    Some(BubbleOutcome::Tap) => self.on_tap(),
                    Some(BubbleOutcome::Dismiss) => {
                        if let Some(mut bubble) = self.bubble.take() {
                            bubble.teardown();
                        }
                        // Nothing is in flight until consent arrives.
                        if self.state == PipelineState::AwaitingConsent {
                            self.advance(PipelineEvent::Reset);
                        }
                        self.stop_when_idle = true;
                    }
                    None => {}
                }
            }
            ServiceCommand::CopyReply(index) => match self.card.as_mut() {
                Some(card) => {
                    if let Err(err) = card.copy(index) {
                        warn!("copy failed: {err:#}");
                    }
                }
                None => debug!("no reply card to copy from"),
            },
            ServiceCommand::CloseCard => {
                if let Some(card) = self.card.as_mut() {
                    card.close();
                }
            }
            ServiceCommand::Stop => {}
        }
    }

    fn on_tap(&mut self) {
        if self.state.accepts_tap() {
            self.run += 1;
            self.advance(PipelineEvent::Tap);
        } else if self.state.repeats_consent_on_tap() {
            debug!("consent still pending, asking again");
        } else {
            debug!("ignoring tap while {}", self.state);
            return;
        }
        if !self.emit(HostEvent::ConsentRequested) {
            warn!("no host is listening for consent requests");
            self.fail(PipelineEvent::ConsentDenied);
        }
    }

    fn begin_capture(&mut self, consent: ConsentToken) {
        if !self.advance(PipelineEvent::ConsentGranted) {
            return;
        }
        self.scanning.show();
        let job = ScanJob {
            run: self.run,
            capturer: self.deps.capturer.clone(),
            recognizer: self.deps.recognizer.clone(),
            fetcher: self.deps.fetcher.clone(),
            store: self.deps.store.clone(),
            metrics: self.deps.host.display_metrics(),
            settle: self.options.settle,
            progress: self.progress_tx.clone(),
        };
        self.in_flight = Some(tokio::spawn(job.run(consent)));
    }

    fn handle_progress(&mut self, message: StageMessage) {
        if message.run != self.run {
            if let Step::SessionOpened(session) = message.step {
                session.release();
            }
            debug!("dropping progress from abandoned run {}", message.run);
            return;
        }

        match message.step {
            Step::SessionOpened(session) => {
                if self.state == PipelineState::Capturing {
                    self.session = Some(session);
                } else {
                    session.release();
                }
            }
            Step::FrameCaptured => {
                self.release_session();
                self.advance(PipelineEvent::FrameCaptured);
            }
            Step::TextRecognized(text) => {
                if self.advance(PipelineEvent::TextRecognized) {
                    self.emit(HostEvent::TextCaptured {
                        text,
                        captured_at: Utc::now(),
                    });
                }
            }
            Step::RepliesReady(replies) => {
                if self.advance(PipelineEvent::RepliesReady) {
                    self.in_flight = None;
                    self.scanning.hide();
                    info!("showing {} reply suggestions", replies.len());
                    self.show_card(replies);
                }
            }
            Step::Failed(err) => self.fail(PipelineEvent::Failed(err)),
            Step::CardDismissed(reason) => {
                if self.advance(PipelineEvent::CardDismissed) {
                    debug!("reply card closed ({reason:?})");
                    self.card = None;
                }
            }
        }
    }

    /// Ends the current run: hides feedback, releases capture, reports, then idles.
    fn fail(&mut self, event: PipelineEvent) {
        if !self.advance(event) {
            return;
        }
        let PipelineState::Error(err) = self.state.clone() else {
            return;
        };

        self.abort_in_flight();
        self.scanning.hide();
        self.release_session();
        if err.is_soft() {
            info!("scan ended: {err}");
        } else {
            warn!("scan failed: {err}");
        }
        self.emit(HostEvent::CaptureError {
            message: err.to_string(),
        });
        self.advance(PipelineEvent::ErrorReported);
    }

    fn push_replies(&mut self, texts: Vec<String>) {
        self.abort_in_flight();
        self.release_session();
        self.scanning.hide();
        if let Some(mut card) = self.card.take() {
            card.teardown();
        }
        self.run += 1;
        self.advance(PipelineEvent::RepliesPushed);
        self.show_card(ReplySuggestion::from_texts(texts));
    }

    fn show_card(&mut self, replies: Vec<ReplySuggestion>) {
        let progress = self.progress_tx.clone();
        let run = self.run;
        self.emit(HostEvent::RepliesShown {
            replies: replies.clone(),
        });
        let card = ReplyCard::show(
            self.deps.host.clone(),
            self.deps.clipboard.clone(),
            replies,
            self.options.auto_dismiss,
            move |reason| {
                let _ = progress.send(StageMessage {
                    run,
                    step: Step::CardDismissed(reason),
                });
            },
        );
        if card.is_shown() {
            self.card = Some(card);
        } else {
            warn!("reply card could not be shown");
            self.advance(PipelineEvent::CardDismissed);
        }
    }

    fn advance(&mut self, event: PipelineEvent) -> bool {
        let Some(next) = self.state.next(&event) else {
            debug!("{event:?} does not apply while {}", self.state);
            return false;
        };
        debug!("pipeline {} -> {}", self.state, next);
        self.state = next.clone();
        self.state_tx.send_replace(next);
        true
    }

    fn emit(&self, event: HostEvent) -> bool {
        self.events
            .as_ref()
            .is_some_and(|events| events.send(event).is_ok())
    }

    fn abort_in_flight(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }

    fn release_session(&mut self) {
        if let Some(session) = self.session.take()
            && session.release()
        {
            debug!("capture session released");
        }
    }

    fn teardown(&mut self) {
        self.abort_in_flight();
        self.release_session();
        self.scanning.hide();
        if let Some(mut card) = self.card.take() {
            card.teardown();
        }
        if let Some(mut bubble) = self.bubble.take() {
            bubble.teardown();
        }
        self.advance(PipelineEvent::Reset);
        info!("reply bubble service stopped");
        self.emit(HostEvent::Stopped);
    }
}

/// Shows the bubble and starts the command loop. Must run inside a tokio runtime.
pub fn spawn_service(
    deps: ServiceDeps,
    options: ServiceOptions,
    events: Option<mpsc::UnboundedSender<HostEvent>>,
) -> ServiceHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(PipelineState::Idle);

    let bubble = Bubble::show(
        deps.host.clone(),
        options.bubble_skin.build(),
        BubbleOptions {
            frame_interval: options.frame_interval,
            snap_to_edge: options.snap_to_edge,
        },
    );
    let scanning = ScanningOverlay::with_frame_interval(
        deps.host.clone(),
        options.scanning_skin.build(),
        options.frame_interval,
    );

    let service = ServiceLoop {
        deps,
        options,
        events,
        state_tx,
        progress_tx,
        state: PipelineState::Idle,
        run: 0,
        bubble: Some(bubble),
        scanning,
        card: None,
        session: None,
        in_flight: None,
        stop_when_idle: false,
    };
    let task = tokio::spawn(service.run(command_rx, progress_rx));

    ServiceHandle {
        commands: command_tx,
        state: state_rx,
        task,
    }
}

/// A running service instance.
#[derive(Debug)]
pub struct ServiceHandle {
    commands: mpsc::UnboundedSender<ServiceCommand>,
    state: watch::Receiver<PipelineState>,
    task: JoinHandle<()>,
}

impl ServiceHandle {
    /// Returns `false` once the service has stopped.
    pub fn send(&self, command: ServiceCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn commands(&self) -> mpsc::UnboundedSender<ServiceCommand> {
        self.commands.clone()
    }

    /// Touches the bubble without moving.
    pub fn tap(&self) -> bool {
        tap_bubble(&self.commands)
    }

    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Asks the service to stop and waits for its teardown to finish.
    pub async fn stop(self) {
        let _ = self.commands.send(ServiceCommand::Stop);
        self.join().await;
    }

    pub async fn join(self) {
        if let Err(err) = self.task.await {
            warn!("service task ended abnormally: {err}");
        }
    }
}

/// Sends a touch-down/up pair at one point, which the bubble reads as a tap.
pub fn tap_bubble(commands: &mpsc::UnboundedSender<ServiceCommand>) -> bool {
    let now = Instant::now();
    let point = Point::default();
    commands
        .send(ServiceCommand::BubbleTouch(TouchEvent::down(point, now)))
        .is_ok()
        && commands
            .send(ServiceCommand::BubbleTouch(TouchEvent::up(point, now)))
            .is_ok()
}

/// Host-side entry point: owns at most one running service.
pub struct BubbleController {
    deps: ServiceDeps,
    options: ServiceOptions,
    events: Option<mpsc::UnboundedSender<HostEvent>>,
    handle: Option<ServiceHandle>,
}

impl BubbleController {
    pub fn new(deps: ServiceDeps, options: ServiceOptions) -> Self {
        Self {
            deps,
            options,
            events: None,
            handle: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<HostEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Starts the service unless it is already running. Returns whether a new
    /// instance was started.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            debug!("service already running");
            return false;
        }
        self.handle = Some(spawn_service(
            self.deps.clone(),
            self.options.clone(),
            self.events.clone(),
        ));
        true
    }

    pub async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop().await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(ServiceHandle::is_running)
    }

    pub fn handle(&self) -> Option<&ServiceHandle> {
        self.handle.as_ref()
    }

    /// Persists `config`; the service reads it fresh on its next fetch.
    pub fn configure(&self, config: &BubbleServiceConfig) -> Result<()> {
        self.deps.store.save(config)
    }

    pub fn push_replies(&self, replies: Vec<String>) -> bool {
        self.send(ServiceCommand::PushReplies(replies))
    }

    pub fn send(&self, command: ServiceCommand) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| handle.send(command))
    }
}
