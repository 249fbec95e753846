use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use error_stack::{IntoReport, Report, ResultExt};
use serde::Serialize;
use url::Url;

use crate::provider::Provider;
use crate::Suggestion;

/// `AppConfig` holds static configuration values for the application,
/// such as the provider authorization endpoints and fixed UI timings.
pub struct AppConfig;

impl AppConfig {
    /// Spotify authorization-code endpoint.
    pub const SPOTIFY_AUTHORIZE_URL: &'static str = "https://accounts.spotify.com/authorize";
    /// Scopes needed to read playlists and saved tracks/albums.
    pub const SPOTIFY_SCOPES: [&'static str; 2] = ["playlist-read-private", "user-library-read"];
    /// Sign in with Apple authorization endpoint.
    pub const APPLE_AUTHORIZE_URL: &'static str = "https://appleid.apple.com/auth/authorize";
    pub const APPLE_SCOPES: [&'static str; 2] = ["name", "email"];
    /// Prefix of every exported file name.
    pub const EXPORT_FILE_PREFIX: &'static str = "libx";
    pub const CONTENT_SUBTITLE: &'static str = "Download your music library.";
    /// Delay between the end of a download attempt and the navigation back home.
    pub const RETURN_HOME_DELAY_SECS: u64 = 10;
    pub const TOAST_AUTO_CLOSE_SECS: u64 = 10;
    pub const DEFAULT_LANDING_PORT: u16 = 8080;
    /// How long the landing listener waits for the backend redirect.
    pub const LANDING_TIMEOUT_SECS: u64 = 300;
}

#[derive(Debug)]
pub struct ConfigError;

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Config error")
    }
}

impl std::error::Error for ConfigError {}

pub type ConfigResult<T> = error_stack::Result<T, ConfigError>;

/// Client id and redirect uri registered with one provider. The redirect uri
/// is kept exactly as configured; the provider compares it byte for byte.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibxConfig {
    pub spotify: ProviderCredentials,
    pub apple: ProviderCredentials,
    /// Overrides the `https://<redirect-host>` origin of the download endpoint.
    pub api_origin: Option<Url>,
    pub download_dir: PathBuf,
    pub landing_port: u16,
    pub return_home_delay: Duration,
    #[serde(skip)]
    pub show_progress: bool,
}

impl LibxConfig {
    pub fn from_env() -> ConfigResult<Self> {
        dotenvy::dotenv().ok();

        let spotify = ProviderCredentials {
            client_id: Self::required_var(&["SPOTIFY_CLIENT_ID", "VITE_SPOTIFY_CLIENT_ID"])?,
            redirect_uri: Self::required_url(&[
                "SPOTIFY_REDIRECT_URI",
                "VITE_SPOTIFY_REDIRECT_URI",
            ])?,
        };
        let apple = ProviderCredentials {
            client_id: Self::required_var(&["APPLE_CLIENT_ID", "VITE_APPLE_CLIENT_ID"])?,
            redirect_uri: Self::required_url(&["APPLE_REDIRECT_URI", "VITE_APPLE_REDIRECT_URI"])?,
        };

        let api_origin = match env::var("LIBX_API_ORIGIN") {
            Ok(origin) if !origin.is_empty() => Some(
                Url::parse(&origin)
                    .into_report()
                    .change_context(ConfigError)
                    .attach_printable(format!("LIBX_API_ORIGIN is not a valid url: {}", origin))?,
            ),
            _ => None,
        };

        let download_dir = env::var("LIBX_DOWNLOAD_DIR")
            .map(PathBuf::from)
            .ok()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            spotify,
            apple,
            api_origin,
            download_dir,
            landing_port: Self::parsed_var("LIBX_LANDING_PORT", AppConfig::DEFAULT_LANDING_PORT)?,
            return_home_delay: Duration::from_secs(Self::parsed_var(
                "LIBX_RETURN_HOME_DELAY_SECS",
                AppConfig::RETURN_HOME_DELAY_SECS,
            )?),
            show_progress: true,
        })
    }

    pub fn credentials(&self, provider: Provider) -> &ProviderCredentials {
        match provider {
            Provider::Spotify => &self.spotify,
            Provider::Apple => &self.apple,
        }
    }

    /// Origin of the backend serving the download endpoint for `provider`.
    ///
    /// The backend lives on the same host as the provider redirect uri and is
    /// always reached over https unless `LIBX_API_ORIGIN` says otherwise.
    pub fn api_origin(&self, provider: Provider) -> ConfigResult<String> {
        if let Some(origin) = &self.api_origin {
            return Ok(origin.as_str().trim_end_matches('/').to_string());
        }
        let configured = &self.credentials(provider).redirect_uri;
        let redirect_uri = Url::parse(configured)
            .into_report()
            .change_context(ConfigError)
            .attach_printable(format!(
                "{} redirect uri is not a valid url: {}",
                provider.display_name(),
                configured
            ))?;
        let host = redirect_uri.host_str().ok_or_else(|| {
            Report::new(ConfigError).attach_printable(format!(
                "{} redirect uri has no host: {}",
                provider.display_name(),
                redirect_uri
            ))
        })?;
        Ok(match redirect_uri.port() {
            Some(port) => format!("https://{}:{}", host, port),
            None => format!("https://{}", host),
        })
    }

    fn required_var(names: &[&str]) -> ConfigResult<String> {
        names
            .iter()
            .find_map(|name| env::var(name).ok().filter(|value| !value.is_empty()))
            .ok_or_else(|| {
                Report::new(ConfigError)
                    .attach_printable(format!("{} environment variable not set", names[0]))
                    .attach(Suggestion(format!(
                        "add {}=<value> to the .env file next to the binary",
                        names[0]
                    )))
            })
    }

    /// Validated, but returned as configured.
    fn required_url(names: &[&str]) -> ConfigResult<String> {
        let value = Self::required_var(names)?;
        Url::parse(&value)
            .into_report()
            .change_context(ConfigError)
            .attach_printable(format!("{} is not a valid url: {}", names[0], value))?;
        Ok(value)
    }

    fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> ConfigResult<T> {
        match env::var(name) {
            Ok(value) if !value.is_empty() => value.parse::<T>().map_err(|_| {
                Report::new(ConfigError)
                    .attach_printable(format!("{} has an invalid value: {}", name, value))
            }),
            _ => Ok(default),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn test_config() -> LibxConfig {
        LibxConfig {
            spotify: ProviderCredentials {
                client_id: "spotify-client".to_string(),
                redirect_uri: "https://libx.stream/api/spotify/callback".to_string(),
            },
            apple: ProviderCredentials {
                client_id: "stream.libx.web".to_string(),
                redirect_uri: "https://api.libx.stream:8443/api/apple/callback".to_string(),
            },
            api_origin: None,
            download_dir: PathBuf::from("."),
            landing_port: AppConfig::DEFAULT_LANDING_PORT,
            return_home_delay: Duration::from_secs(AppConfig::RETURN_HOME_DELAY_SECS),
            show_progress: false,
        }
    }

    #[test]
    fn test_api_origin_uses_redirect_host() {
        let config = test_config();
        assert_eq!(
            config.api_origin(Provider::Spotify).unwrap(),
            "https://libx.stream"
        );
        assert_eq!(
            config.api_origin(Provider::Apple).unwrap(),
            "https://api.libx.stream:8443"
        );
    }

    #[test]
    fn test_api_origin_from_bare_redirect_origin() {
        let mut config = test_config();
        config.spotify.redirect_uri = "http://LOCALHOST:5000".to_string();
        assert_eq!(
            config.api_origin(Provider::Spotify).unwrap(),
            "https://localhost:5000"
        );
        config.spotify.redirect_uri = "not a url".to_string();
        assert!(config.api_origin(Provider::Spotify).is_err());
    }

    #[test]
    fn test_default_return_home_delay_is_ten_seconds() {
        assert_eq!(test_config().return_home_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_api_origin_override() {
        let mut config = test_config();
        config.api_origin = Some(Url::parse("http://127.0.0.1:5000/").unwrap());
        assert_eq!(
            config.api_origin(Provider::Apple).unwrap(),
            "http://127.0.0.1:5000"
        );
    }
}
