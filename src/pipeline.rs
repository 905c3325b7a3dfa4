use crate::error::PipelineError;
use std::fmt;

/// Where the scan flow currently is. Exactly one run can be past `Idle` at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    AwaitingConsent,
    Capturing,
    Recognizing,
    FetchingReplies,
    Displaying,
    Error(PipelineError),
}

/// Inputs that move the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Tap,
    ConsentGranted,
    ConsentDenied,
    FrameCaptured,
    TextRecognized,
    RepliesReady,
    /// Suggestions delivered from outside the capture flow.
    RepliesPushed,
    Failed(PipelineError),
    ErrorReported,
    CardDismissed,
    Reset,
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::AwaitingConsent => "awaiting-consent",
            PipelineState::Capturing => "capturing",
            PipelineState::Recognizing => "recognizing",
            PipelineState::FetchingReplies => "fetching-replies",
            PipelineState::Displaying => "displaying",
            PipelineState::Error(_) => "error",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, PipelineState::Idle)
    }

    /// Only an idle pipeline starts a new run on tap.
    pub fn accepts_tap(&self) -> bool {
        self.is_idle()
    }

    /// A consent request left unanswered is asked again on the next tap.
    pub fn repeats_consent_on_tap(&self) -> bool {
        matches!(self, PipelineState::AwaitingConsent)
    }

    /// States during which the scanning overlay is on screen.
    pub fn shows_scanning(&self) -> bool {
        matches!(
            self,
            PipelineState::Capturing | PipelineState::Recognizing | PipelineState::FetchingReplies
        )
    }

    /// States from which a failure ends the run.
    pub fn can_fail(&self) -> bool {
        matches!(
            self,
            PipelineState::AwaitingConsent
                | PipelineState::Capturing
                | PipelineState::Recognizing
                | PipelineState::FetchingReplies
        )
    }

    /// The state `event` leads to, or `None` when the event does not apply here.
    pub fn next(&self, event: &PipelineEvent) -> Option<PipelineState> {
        use PipelineEvent as E;
        use PipelineState as S;

        let next = match (self, event) {
            (_, E::Reset) => S::Idle,
            (_, E::RepliesPushed) => S::Displaying,
            (S::Idle, E::Tap) => S::AwaitingConsent,
            (S::AwaitingConsent, E::ConsentGranted) => S::Capturing,
            (S::AwaitingConsent, E::ConsentDenied) => S::Error(PipelineError::ConsentDenied),
            (S::Capturing, E::FrameCaptured) => S::Recognizing,
            (S::Recognizing, E::TextRecognized) => S::FetchingReplies,
            (S::FetchingReplies, E::RepliesReady) => S::Displaying,
            (state, E::Failed(err)) if state.can_fail() => S::Error(err.clone()),
            (S::Error(_), E::ErrorReported) => S::Idle,
            (S::Displaying, E::CardDismissed) => S::Idle,
            _ => return None,
        };
        Some(next)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Error(err) => write!(f, "error ({err})"),
            state => f.write_str(state.name()),
        }
    }
}
