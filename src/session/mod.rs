use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use error_stack::{IntoReport, ResultExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::{AppConfig, LibxConfig};
use crate::dialoguer::Dialoguer;
use crate::landing::{landed_location, local_origin, LandingListener};
use crate::platform::{DesktopPlatform, Navigation};
use crate::provider::{AccessToken, Provider};
use crate::session::commands::PageCommands;
use crate::store::{Action, Store};
use crate::view::{Click, IndexView, PageLocation, SessionSelection};

pub mod commands;

#[derive(Debug)]
pub struct SessionError;

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Session error")
    }
}

impl std::error::Error for SessionError {}

pub type SessionResult<T> = error_stack::Result<T, SessionError>;

/// The terminal page: mounts the index view, routes clicks, and re-mounts
/// on every full navigation.
pub struct Session {
    config: Arc<LibxConfig>,
    store: Store,
    platform: Arc<DesktopPlatform>,
    navigations: mpsc::UnboundedReceiver<Navigation>,
}

impl Session {
    pub fn new(config: LibxConfig) -> SessionResult<Self> {
        let (sender, navigations) = mpsc::unbounded_channel();
        let platform = DesktopPlatform::new(config.download_dir.clone(), sender)
            .change_context(SessionError)?;
        Ok(Self {
            config: Arc::new(config),
            store: Store::new(),
            platform: Arc::new(platform),
            navigations,
        })
    }

    /// Interactive page. `login` presses that provider's button right after
    /// the first mount.
    pub async fn open(
        mut self,
        location: Option<PageLocation>,
        mut login: Option<Provider>,
    ) -> SessionResult<()> {
        let listener =
            LandingListener::bind(self.config.landing_port).change_context(SessionError)?;
        let mut location = location.unwrap_or_else(|| listener.origin());

        loop {
            let mut view = self.mount(location.clone());
            let mut actions = self.store.subscribe();
            println!("{}", view.subtitle().bold());
            if let SessionSelection::Authorized { provider, .. } = view.selection() {
                println!("Logged in with {}", provider.display_name().green());
            }

            let command = match login.take() {
                Some(provider) => PageCommands::Press(provider),
                None => {
                    let options = PageCommands::get_options(&view);
                    let labels = options
                        .iter()
                        .map(|(_, label)| label.clone())
                        .collect::<Vec<_>>();
                    let selection =
                        Dialoguer::select("libx", &labels).change_context(SessionError)?;
                    PageCommands::get_selection(&options, selection)
                }
            };

            let provider = match command {
                PageCommands::Quit => return Ok(()),
                PageCommands::Press(provider) => provider,
            };

            match view.click(provider) {
                Click::Redirect(url) => {
                    tracing::debug!(%provider, %url, "waiting for the login to land");
                    location = Self::wait_for_login(&listener).await?;
                }
                Click::Download(task) => {
                    Self::render_until_settled(&mut view, &mut actions, task).await?;
                    self.wait_for_root().await;
                    location = view.location().root();
                }
                Click::Ignored => {}
            }
        }
    }

    /// Downloads once with a known token, then waits out the return-home
    /// timer unless `wait` is false.
    pub async fn download(
        mut self,
        provider: Provider,
        token: AccessToken,
        wait: bool,
    ) -> SessionResult<()> {
        let mut location = local_origin(self.config.landing_port)
            .change_context(SessionError)?
            .url()
            .clone();
        location
            .query_pairs_mut()
            .append_pair(provider.token_param(), token.secret());
        let mut view = self.mount(PageLocation::new(location));
        let mut actions = self.store.subscribe();

        match view.click(provider) {
            Click::Download(task) => {
                Self::render_until_settled(&mut view, &mut actions, task).await?;
            }
            Click::Redirect(_) | Click::Ignored => {
                return Err(SessionError)
                    .into_report()
                    .attach_printable(format!("{} token was empty", provider.display_name()));
            }
        }

        if wait {
            self.wait_for_root().await;
        }
        match self.store.state().download.error {
            Some(failure) => Err(SessionError)
                .into_report()
                .attach_printable(failure.to_string()),
            None => Ok(()),
        }
    }

    /// A full navigation starts from a fresh store, like a page reload.
    fn mount(&mut self, location: PageLocation) -> IndexView {
        self.store = Store::new();
        IndexView::mount(
            location,
            self.config.clone(),
            self.store.clone(),
            self.platform.clone(),
        )
    }

    /// Whichever comes first: the browser landing on the local listener, or
    /// the user pasting the address it landed on elsewhere.
    async fn wait_for_login(listener: &LandingListener) -> SessionResult<PageLocation> {
        println!(
            "Paste the address your browser lands on after the login, or wait for it on {}",
            listener.origin().to_string().cyan()
        );
        let timeout = Duration::from_secs(AppConfig::LANDING_TIMEOUT_SECS);
        let mut pasted = tokio::task::spawn_blocking(|| Dialoguer::input("Landed address"));
        tokio::select! {
            landed = listener.wait_for_landing(timeout) => {
                let location = landed.change_context(SessionError)?;
                println!("{}", "Login landed, press Enter to continue".green());
                // the prompt keeps the terminal until it gets its line
                if let Err(error) = pasted.await {
                    tracing::warn!(%error, "address prompt failed");
                }
                Ok(location)
            }
            input = &mut pasted => {
                let input = input
                    .into_report()
                    .change_context(SessionError)?
                    .change_context(SessionError)?;
                if input.is_empty() {
                    return listener
                        .wait_for_landing(timeout)
                        .await
                        .change_context(SessionError);
                }
                landed_location(&input).change_context(SessionError)
            }
        }
    }

    async fn render_until_settled(
        view: &mut IndexView,
        actions: &mut broadcast::Receiver<Action>,
        mut task: JoinHandle<Option<JoinHandle<()>>>,
    ) -> SessionResult<()> {
        loop {
            tokio::select! {
                action = actions.recv() => match action {
                    Ok(action) => {
                        view.observe(action);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "page fell behind the store");
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                },
                settled = &mut task => {
                    settled.into_report().change_context(SessionError)?;
                    break;
                }
            }
        }
        while let Ok(action) = actions.try_recv() {
            view.observe(action);
        }
        Ok(())
    }

    async fn wait_for_root(&mut self) {
        println!(
            "Returning home in {} seconds...",
            self.config.return_home_delay.as_secs()
        );
        while let Some(navigation) = self.navigations.recv().await {
            if navigation == Navigation::Root {
                return;
            }
        }
    }
}
