use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use url::Url;

use crate::config::{AppConfig, LibxConfig};
use crate::download::Downloader;
use crate::platform::{Navigation, Platform, Toast};
use crate::provider::{AccessToken, Provider};
use crate::store::{reduce, Action, AppState, Store};

/// Where the page currently is. A new location means a fresh mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation(Url);

impl PageLocation {
    pub fn new(url: Url) -> Self {
        Self(url)
    }

    /// Same origin, path `/`, no query.
    pub fn root(&self) -> Self {
        let mut url = self.0.clone();
        url.set_path("/");
        url.set_query(None);
        url.set_fragment(None);
        Self(url)
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    fn query_value(&self, name: &str) -> Option<String> {
        self.0
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

impl fmt::Display for PageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who the page is logged in as, if anyone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSelection {
    Anonymous,
    Authorized {
        provider: Provider,
        token: AccessToken,
    },
}

impl SessionSelection {
    /// Reads `spotify_token` then `apple_token`; when both are present the
    /// Apple one wins. Empty values count as absent.
    pub fn from_location(location: &PageLocation) -> Self {
        let mut selection = SessionSelection::Anonymous;
        for provider in [Provider::Spotify, Provider::Apple] {
            if let Some(token) = location.query_value(provider.token_param()) {
                if !token.is_empty() {
                    selection = SessionSelection::Authorized {
                        provider,
                        token: AccessToken::new(token),
                    };
                }
            }
        }
        selection
    }

    pub fn token_for(&self, provider: Provider) -> Option<&AccessToken> {
        match self {
            SessionSelection::Authorized {
                provider: selected,
                token,
            } if *selected == provider => Some(token),
            _ => None,
        }
    }
}

/// Error code the backend appends when its side of the OAuth exchange fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LandingError {
    NoCode,
    TokenExchangeFailed,
    AuthFailed(Provider),
    Other(String),
}

impl LandingError {
    pub fn from_location(location: &PageLocation) -> Option<Self> {
        let code = location.query_value("error")?;
        Some(match code.as_str() {
            "" => return None,
            "no_code" => LandingError::NoCode,
            "token_exchange_failed" => LandingError::TokenExchangeFailed,
            "spotify_auth_failed" => LandingError::AuthFailed(Provider::Spotify),
            "apple_auth_failed" => LandingError::AuthFailed(Provider::Apple),
            _ => LandingError::Other(code),
        })
    }
}

impl fmt::Display for LandingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LandingError::NoCode => f.write_str("Login was cancelled before it finished."),
            LandingError::TokenExchangeFailed => {
                f.write_str("Could not complete the login, please try again.")
            }
            LandingError::AuthFailed(provider) => {
                write!(f, "{} login failed.", provider.display_name())
            }
            LandingError::Other(code) => write!(f, "Login failed ({}).", code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    LoggedOut,
    LoggedIn,
    Downloading,
    Finished,
    Failed,
}

impl ButtonState {
    pub fn label(&self, provider: Provider) -> String {
        match self {
            ButtonState::LoggedOut => format!("Login with {}", provider.display_name()),
            ButtonState::Downloading => "Downloading...".to_string(),
            ButtonState::LoggedIn | ButtonState::Finished | ButtonState::Failed => {
                "Download".to_string()
            }
        }
    }
}

pub enum Click {
    /// The page is leaving for the provider login.
    Redirect(String),
    /// A download attempt is running; it resolves to the return-home timer.
    Download(JoinHandle<Option<JoinHandle<()>>>),
    /// A download for this provider is already running.
    Ignored,
}

/// Toasts for one state change. Each fires on the edge only, so repeated
/// renders of the same state stay quiet.
pub fn notifications(prev: &AppState, next: &AppState) -> Vec<Toast> {
    let auto_close = Duration::from_secs(AppConfig::TOAST_AUTO_CLOSE_SECS);
    let mut toasts = vec![];
    if next.download.loading && !prev.download.loading {
        toasts.push(Toast::info("Downloading your library.", auto_close));
    }
    if next.download.download_uri.is_some()
        && next.download.download_uri != prev.download.download_uri
    {
        toasts.push(Toast::success("Download finished!", auto_close));
    }
    if next.download.error.is_some() && next.download.error != prev.download.error {
        toasts.push(Toast::error("Failed to download library."));
    }
    toasts
}

/// The index page: two provider buttons over the shared download state.
pub struct IndexView {
    location: PageLocation,
    selection: SessionSelection,
    config: Arc<LibxConfig>,
    store: Store,
    platform: Arc<dyn Platform>,
    downloader: Downloader,
    seen: AppState,
}

impl IndexView {
    pub fn mount(
        location: PageLocation,
        config: Arc<LibxConfig>,
        store: Store,
        platform: Arc<dyn Platform>,
    ) -> Self {
        let selection = SessionSelection::from_location(&location);
        tracing::debug!(%location, ?selection, "mount");
        let downloader = Downloader::new(config.clone(), store.clone(), platform.clone());
        store.dispatch(Action::SetContentSubtitle(
            AppConfig::CONTENT_SUBTITLE.to_string(),
        ));
        if let Some(error) = LandingError::from_location(&location) {
            tracing::warn!(?error, "landed with an error");
            platform.toast(Toast::error(error.to_string()));
        }
        let seen = store.state();
        Self {
            location,
            selection,
            config,
            store,
            platform,
            downloader,
            seen,
        }
    }

    pub fn location(&self) -> &PageLocation {
        &self.location
    }

    pub fn selection(&self) -> &SessionSelection {
        &self.selection
    }

    pub fn subtitle(&self) -> String {
        self.store.state().content.subtitle
    }

    pub fn button_state(&self, provider: Provider) -> ButtonState {
        if self.selection.token_for(provider).is_none() {
            return ButtonState::LoggedOut;
        }
        let download = self.store.state().download;
        if download.loading {
            ButtonState::Downloading
        } else if download.error.is_some() {
            ButtonState::Failed
        } else if download.download_uri.is_some() {
            ButtonState::Finished
        } else {
            ButtonState::LoggedIn
        }
    }

    pub fn button_label(&self, provider: Provider) -> String {
        self.button_state(provider).label(provider)
    }

    pub fn click(&self, provider: Provider) -> Click {
        let token = match self.selection.token_for(provider) {
            Some(token) => token.clone(),
            None => {
                let url = provider.authorize_url(self.config.credentials(provider));
                tracing::info!(%provider, "redirecting to provider login");
                self.platform.navigate(Navigation::External(url.clone()));
                return Click::Redirect(url);
            }
        };
        if self.button_state(provider) == ButtonState::Downloading {
            tracing::debug!(%provider, "download already running");
            return Click::Ignored;
        }
        let downloader = self.downloader.clone();
        Click::Download(tokio::spawn(async move {
            downloader.download_file(&token, provider).await
        }))
    }

    /// Folds one dispatched action into what the view has rendered and
    /// raises the toasts for it.
    pub fn observe(&mut self, action: Action) -> Vec<Toast> {
        let prev = self.seen.clone();
        reduce(&mut self.seen, action);
        let toasts = notifications(&prev, &self.seen);
        for toast in &toasts {
            self.platform.toast(toast.clone());
        }
        toasts
    }
}
