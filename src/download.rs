use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use colored::Colorize;
use error_stack::{AttachmentKind, FrameKind, Report, ResultExt};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{CONNECTION, CONTENT_TYPE};
use tokio::task::JoinHandle;

use crate::config::{AppConfig, LibxConfig};
use crate::platform::{Navigation, Platform};
use crate::provider::{AccessToken, Provider};
use crate::store::{Action, DownloadFailure, Store};

#[derive(Debug)]
pub struct DownloadError;

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Download error")
    }
}

impl std::error::Error for DownloadError {}

pub type DownloadResult<T> = error_stack::Result<T, DownloadError>;

/// `libx-<provider>-export-<uuid>.csv`
pub fn export_filename(provider: Provider) -> String {
    format!(
        "{}-{}-export-{}.csv",
        AppConfig::EXPORT_FILE_PREFIX,
        provider.as_str(),
        uuid::Uuid::new_v4()
    )
}

/// The token goes into the query as-is; the backend reads it back verbatim.
pub fn download_endpoint(
    origin: &str,
    provider: Provider,
    filename: &str,
    token: &AccessToken,
) -> String {
    format!(
        "{}/api/{}/download/{}?t={}",
        origin,
        provider.as_str(),
        filename,
        token.secret()
    )
}

/// Fetches a library export from the backend and hands it to the platform
/// to save, keeping the shared download state up to date.
#[derive(Clone)]
pub struct Downloader {
    config: Arc<LibxConfig>,
    store: Store,
    platform: Arc<dyn Platform>,
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(config: Arc<LibxConfig>, store: Store, platform: Arc<dyn Platform>) -> Self {
        Self {
            config,
            store,
            platform,
            client: reqwest::Client::new(),
        }
    }

    /// Runs one download attempt. Returns `None` without touching any state
    /// when the token is empty, otherwise the handle of the return-home timer
    /// that was scheduled after the attempt settled. Dropping the handle does
    /// not cancel the timer.
    pub async fn download_file(
        &self,
        token: &AccessToken,
        provider: Provider,
    ) -> Option<JoinHandle<()>> {
        if token.is_empty() {
            return None;
        }

        self.store.dispatch(Action::SetDownloadLoading(true));
        self.store.dispatch(Action::SetDownloadError(None));

        let filename = export_filename(provider);
        tracing::info!(%provider, %filename, "download started");

        match self.fetch(token, provider, &filename).await {
            Ok(body) => {
                if let Err(report) = self.save(body, &filename) {
                    tracing::warn!(?report, "failed to save export");
                    self.store
                        .dispatch(Action::SetDownloadError(Some(DownloadFailure::Transport(
                            describe(&report),
                        ))));
                }
            }
            Err(failure) => {
                tracing::warn!(%provider, %failure, "download failed");
                self.store.dispatch(Action::SetDownloadError(Some(failure)));
            }
        }

        self.store.dispatch(Action::SetDownloadLoading(false));
        Some(self.schedule_return_home())
    }

    async fn fetch(
        &self,
        token: &AccessToken,
        provider: Provider,
        filename: &str,
    ) -> Result<Bytes, DownloadFailure> {
        let origin = self
            .config
            .api_origin(provider)
            .map_err(|report| DownloadFailure::Transport(describe(&report)))?;
        let url = download_endpoint(&origin, provider, filename, token);

        let response = self
            .client
            .get(url)
            .header(CONTENT_TYPE, "text/csv")
            .header(CONNECTION, "keep-alive")
            .send()
            .await
            .map_err(|error| DownloadFailure::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadFailure::Status {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        self.read_body(response, filename).await
    }

    async fn read_body(
        &self,
        response: reqwest::Response,
        filename: &str,
    ) -> Result<Bytes, DownloadFailure> {
        let pb = match (self.config.show_progress, response.content_length()) {
            (false, _) => ProgressBar::hidden(),
            (true, Some(total_size)) => ProgressBar::new(total_size),
            (true, None) => ProgressBar::new_spinner(),
        };
        let style = ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.white/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
            .map_err(|error| DownloadFailure::Transport(error.to_string()))?
            .progress_chars("█  ");
        pb.set_style(style);
        pb.set_message(format!("Downloading {}", filename.cyan()));

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(item) = stream.next().await {
            let chunk = item.map_err(|error| DownloadFailure::Transport(error.to_string()))?;
            body.extend_from_slice(&chunk);
            pb.set_position(body.len() as u64);
        }
        pb.finish_and_clear();
        Ok(body.freeze())
    }

    fn save(&self, body: Bytes, filename: &str) -> DownloadResult<()> {
        let uri = self
            .platform
            .create_object_uri(body)
            .change_context(DownloadError)?;
        self.store.dispatch(Action::SetDownloadUri(Some(uri.clone())));
        let saved = self.platform.save(&uri, filename);
        self.platform.revoke(&uri);
        let path = saved.change_context(DownloadError)?;
        println!("{} saved to {}", filename.green(), path.display());
        Ok(())
    }

    fn schedule_return_home(&self) -> JoinHandle<()> {
        let platform = Arc::clone(&self.platform);
        let delay: Duration = self.config.return_home_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            platform.navigate(Navigation::Root);
        })
    }
}

impl fmt::Debug for Downloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Downloader")
            .field("return_home_delay", &self.config.return_home_delay)
            .finish()
    }
}

/// Most specific printable message of a report, for the error toast.
fn describe<C>(report: &Report<C>) -> String {
    report
        .frames()
        .find_map(|frame| match frame.kind() {
            FrameKind::Attachment(AttachmentKind::Printable(printable)) => {
                Some(printable.to_string())
            }
            _ => None,
        })
        .unwrap_or_else(|| report.to_string())
}
