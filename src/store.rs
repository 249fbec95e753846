use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::platform::ObjectUri;

/// Why a download attempt did not produce a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadFailure {
    /// The backend answered with a non-success status.
    Status { code: u16, reason: String },
    /// The request or the body read failed before a status could be judged.
    Transport(String),
}

impl fmt::Display for DownloadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadFailure::Status { code, reason } => {
                write!(f, "Failed to download file: ({}) {}", code, reason)
            }
            DownloadFailure::Transport(cause) => write!(f, "Failed to download file: {}", cause),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadState {
    pub loading: bool,
    pub error: Option<DownloadFailure>,
    pub download_uri: Option<ObjectUri>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentState {
    pub subtitle: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    pub download: DownloadState,
    pub content: ContentState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetDownloadLoading(bool),
    SetDownloadError(Option<DownloadFailure>),
    SetDownloadUri(Option<ObjectUri>),
    SetContentSubtitle(String),
}

pub fn reduce(state: &mut AppState, action: Action) {
    match action {
        Action::SetDownloadLoading(loading) => state.download.loading = loading,
        Action::SetDownloadError(error) => state.download.error = error,
        Action::SetDownloadUri(uri) => state.download.download_uri = uri,
        Action::SetContentSubtitle(subtitle) => state.content.subtitle = subtitle,
    }
}

/// Shared UI state. `dispatch` is the only way to change it; readers get
/// snapshots, or every dispatched action in order through `subscribe`.
#[derive(Clone)]
pub struct Store {
    state: Arc<Mutex<AppState>>,
    actions: broadcast::Sender<Action>,
}

impl Store {
    const ACTION_BUFFER: usize = 64;

    pub fn new() -> Self {
        let (actions, _) = broadcast::channel(Self::ACTION_BUFFER);
        Self {
            state: Arc::new(Mutex::new(AppState::default())),
            actions,
        }
    }

    pub fn dispatch(&self, action: Action) {
        tracing::debug!(?action, "dispatch");
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            reduce(&mut state, action.clone());
        }
        // nobody listening is fine
        let _ = self.actions.send(action);
    }

    pub fn state(&self) -> AppState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Action> {
        self.actions.subscribe()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
