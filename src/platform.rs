use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use colored::Colorize;
use error_stack::{IntoReport, Report, ResultExt};
use tokio::sync::mpsc;

#[derive(Debug)]
pub struct PlatformError;

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Platform error")
    }
}

impl std::error::Error for PlatformError {}

pub type PlatformResult<T> = error_stack::Result<T, PlatformError>;

/// Temporary reference to downloaded bytes held by the platform until revoked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUri(String);

impl ObjectUri {
    pub fn new_random() -> Self {
        Self(format!("blob:libx/{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Full navigation away from the page, e.g. to a provider login.
    External(String),
    /// Back to the page root, without query parameters.
    Root,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
    pub auto_close: Option<Duration>,
}

impl Toast {
    pub fn info(message: impl Into<String>, auto_close: Duration) -> Self {
        Self {
            kind: ToastKind::Info,
            message: message.into(),
            auto_close: Some(auto_close),
        }
    }

    pub fn success(message: impl Into<String>, auto_close: Duration) -> Self {
        Self {
            kind: ToastKind::Success,
            message: message.into(),
            auto_close: Some(auto_close),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Error,
            message: message.into(),
            auto_close: None,
        }
    }
}

/// Everything the page does to its host: navigation, saving files and
/// notifying the user.
pub trait Platform: Send + Sync {
    fn navigate(&self, navigation: Navigation);
    fn create_object_uri(&self, data: Bytes) -> PlatformResult<ObjectUri>;
    /// Saves the bytes behind `uri` as `filename` and returns where they landed.
    fn save(&self, uri: &ObjectUri, filename: &str) -> PlatformResult<PathBuf>;
    fn revoke(&self, uri: &ObjectUri);
    fn toast(&self, toast: Toast);
}

/// Terminal host: staged files under a temp dir, saves into the download
/// dir, root navigations forwarded to the session loop.
pub struct DesktopPlatform {
    staging_dir: PathBuf,
    download_dir: PathBuf,
    staged: Mutex<HashMap<ObjectUri, PathBuf>>,
    navigations: mpsc::UnboundedSender<Navigation>,
}

impl DesktopPlatform {
    pub fn new(
        download_dir: PathBuf,
        navigations: mpsc::UnboundedSender<Navigation>,
    ) -> PlatformResult<Self> {
        let staging_dir = std::env::temp_dir().join("libx-staging");
        fs::create_dir_all(&staging_dir)
            .into_report()
            .change_context(PlatformError)
            .attach_printable(format!(
                "Failed to create staging directory at {}",
                staging_dir.display()
            ))?;
        Ok(Self::with_staging_dir(staging_dir, download_dir, navigations))
    }

    pub fn with_staging_dir(
        staging_dir: PathBuf,
        download_dir: PathBuf,
        navigations: mpsc::UnboundedSender<Navigation>,
    ) -> Self {
        Self {
            staging_dir,
            download_dir,
            staged: Mutex::new(HashMap::new()),
            navigations,
        }
    }

    fn staged_path(&self, uri: &ObjectUri) -> PlatformResult<PathBuf> {
        let staged = self
            .staged
            .lock()
            .map_err(|_| Report::new(PlatformError).attach_printable("Staging table poisoned"))?;
        staged.get(uri).cloned().ok_or_else(|| {
            Report::new(PlatformError).attach_printable(format!("Unknown object uri {}", uri))
        })
    }

    fn save_path(&self, filename: &str) -> PathBuf {
        // the name comes from the download request, never a path
        let file_name = Path::new(filename)
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| filename.replace('/', ",").into());
        self.download_dir.join(file_name)
    }
}

impl Platform for DesktopPlatform {
    fn navigate(&self, navigation: Navigation) {
        if let Navigation::External(url) = &navigation {
            println!("Opening browser...");
            println!("If browser doesn't open, visit: {}", url.blue());
            if webbrowser::open(url).is_err() {
                println!("{}", "Failed to open browser automatically".yellow());
            }
        }
        if self.navigations.send(navigation).is_err() {
            tracing::debug!("navigation dropped, page already closed");
        }
    }

    fn create_object_uri(&self, data: Bytes) -> PlatformResult<ObjectUri> {
        let uri = ObjectUri::new_random();
        let path = self.staging_dir.join(format!("{}.part", uuid::Uuid::new_v4()));
        fs::write(&path, &data)
            .into_report()
            .change_context(PlatformError)
            .attach_printable(format!("Failed to stage download at {}", path.display()))?;
        self.staged
            .lock()
            .map_err(|_| Report::new(PlatformError).attach_printable("Staging table poisoned"))?
            .insert(uri.clone(), path);
        tracing::debug!(uri = uri.as_str(), bytes = data.len(), "staged download");
        Ok(uri)
    }

    fn save(&self, uri: &ObjectUri, filename: &str) -> PlatformResult<PathBuf> {
        let staged = self.staged_path(uri)?;
        fs::create_dir_all(&self.download_dir)
            .into_report()
            .change_context(PlatformError)
            .attach_printable(format!(
                "Failed to create download directory at {}",
                self.download_dir.display()
            ))?;
        let destination = self.save_path(filename);
        fs::copy(&staged, &destination)
            .into_report()
            .change_context(PlatformError)
            .attach_printable(format!("Failed to write {}", destination.display()))?;
        tracing::info!(path = %destination.display(), "export saved");
        Ok(destination)
    }

    fn revoke(&self, uri: &ObjectUri) {
        let removed = match self.staged.lock() {
            Ok(mut staged) => staged.remove(uri),
            Err(_) => None,
        };
        if let Some(path) = removed {
            if let Err(error) = fs::remove_file(&path) {
                tracing::warn!(%error, path = %path.display(), "failed to remove staged file");
            }
        }
    }

    fn toast(&self, toast: Toast) {
        match toast.kind {
            ToastKind::Info => {
                tracing::info!(message = %toast.message, "toast");
                println!("{}", toast.message.cyan());
            }
            ToastKind::Success => {
                tracing::info!(message = %toast.message, "toast");
                println!("{}", toast.message.green());
            }
            ToastKind::Error => {
                tracing::warn!(message = %toast.message, "toast");
                println!("{}", toast.message.red());
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Instant;

    use super::*;

    /// Everything a page did to its host, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Effect {
        Navigate(Navigation),
        CreateObjectUri(ObjectUri, usize),
        Save(ObjectUri, String),
        Revoke(ObjectUri),
        Toast(Toast),
    }

    #[derive(Default)]
    pub struct RecordingPlatform {
        effects: Mutex<Vec<(Instant, Effect)>>,
        fail_save: bool,
    }

    impl RecordingPlatform {
        pub fn failing_saves() -> Self {
            Self {
                effects: Mutex::new(vec![]),
                fail_save: true,
            }
        }

        pub fn effects(&self) -> Vec<Effect> {
            self.effects
                .lock()
                .unwrap()
                .iter()
                .map(|(_, effect)| effect.clone())
                .collect()
        }

        pub fn navigated_at(&self) -> Vec<(Instant, Navigation)> {
            self.effects
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(at, effect)| match effect {
                    Effect::Navigate(navigation) => Some((*at, navigation.clone())),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, effect: Effect) {
            self.effects.lock().unwrap().push((Instant::now(), effect));
        }
    }

    impl Platform for RecordingPlatform {
        fn navigate(&self, navigation: Navigation) {
            self.record(Effect::Navigate(navigation));
        }

        fn create_object_uri(&self, data: Bytes) -> PlatformResult<ObjectUri> {
            let uri = ObjectUri::new_random();
            self.record(Effect::CreateObjectUri(uri.clone(), data.len()));
            Ok(uri)
        }

        fn save(&self, uri: &ObjectUri, filename: &str) -> PlatformResult<PathBuf> {
            if self.fail_save {
                return Err(Report::new(PlatformError).attach_printable("disk full"));
            }
            self.record(Effect::Save(uri.clone(), filename.to_string()));
            Ok(PathBuf::from(filename))
        }

        fn revoke(&self, uri: &ObjectUri) {
            self.record(Effect::Revoke(uri.clone()));
        }

        fn toast(&self, toast: Toast) {
            self.record(Effect::Toast(toast));
        }
    }

    #[test]
    fn test_desktop_save_and_revoke() {
        let staging = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        let (sender, _receiver) = mpsc::unbounded_channel();
        let platform = DesktopPlatform::with_staging_dir(
            staging.path().to_path_buf(),
            downloads.path().to_path_buf(),
            sender,
        );

        let uri = platform
            .create_object_uri(Bytes::from_static(b"Type,Track Name\n"))
            .unwrap();
        assert!(uri.as_str().starts_with("blob:libx/"));
        let saved = platform.save(&uri, "libx-spotify-export-1.csv").unwrap();
        assert_eq!(saved, downloads.path().join("libx-spotify-export-1.csv"));
        assert_eq!(fs::read_to_string(&saved).unwrap(), "Type,Track Name\n");

        platform.revoke(&uri);
        assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
        assert!(platform.save(&uri, "again.csv").is_err());
        // the saved copy outlives the object uri
        assert!(saved.exists());
    }

    #[test]
    fn test_desktop_save_strips_directories() {
        let staging = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        let (sender, _receiver) = mpsc::unbounded_channel();
        let platform = DesktopPlatform::with_staging_dir(
            staging.path().to_path_buf(),
            downloads.path().to_path_buf(),
            sender,
        );
        let uri = platform.create_object_uri(Bytes::from_static(b"x")).unwrap();
        let saved = platform.save(&uri, "../../escape.csv").unwrap();
        assert_eq!(saved, downloads.path().join("escape.csv"));
    }

    #[test]
    fn test_desktop_root_navigation_reaches_session() {
        let staging = tempfile::tempdir().unwrap();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let platform = DesktopPlatform::with_staging_dir(
            staging.path().to_path_buf(),
            staging.path().to_path_buf(),
            sender,
        );
        platform.navigate(Navigation::Root);
        assert_eq!(receiver.try_recv().unwrap(), Navigation::Root);
    }
}
