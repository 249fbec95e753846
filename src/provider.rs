use std::fmt;

use crate::config::{AppConfig, ProviderCredentials};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    clap::ValueEnum,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum Provider {
    Spotify,
    Apple,
}

impl Provider {
    /// Slug used in file names and api paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Spotify => "spotify",
            Provider::Apple => "apple",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Spotify => "Spotify",
            Provider::Apple => "Apple",
        }
    }

    /// Query parameter the backend uses to hand the token back to the page.
    pub fn token_param(&self) -> &'static str {
        match self {
            Provider::Spotify => "spotify_token",
            Provider::Apple => "apple_token",
        }
    }

    /// Full authorization url the page redirects to on login.
    pub fn authorize_url(&self, credentials: &ProviderCredentials) -> String {
        let redirect_uri = encode_uri_component(&credentials.redirect_uri);
        match self {
            Provider::Spotify => format!(
                "{}?response_type=code&client_id={}&redirect_uri={}&scope={}",
                AppConfig::SPOTIFY_AUTHORIZE_URL,
                credentials.client_id,
                redirect_uri,
                AppConfig::SPOTIFY_SCOPES.join("%20")
            ),
            Provider::Apple => format!(
                "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&response_mode=form_post",
                AppConfig::APPLE_AUTHORIZE_URL,
                credentials.client_id,
                redirect_uri,
                AppConfig::APPLE_SCOPES.join("%20")
            ),
        }
    }
}

/// Percent-encodes like the browser's `encodeURIComponent`, which keeps
/// `!'()*` unescaped on top of the RFC 3986 unreserved set.
pub fn encode_uri_component(value: &str) -> String {
    urlencoding::encode(value)
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%2A", "*")
}

/// Opaque bearer token handed back by the backend after the OAuth exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    fn credentials(client_id: &str, redirect_uri: &str) -> ProviderCredentials {
        ProviderCredentials {
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
        }
    }

    #[test]
    fn test_spotify_authorize_url() {
        let url = Provider::Spotify.authorize_url(&credentials(
            "a57ab1ceee1f4094b55924d3e228ae53",
            "https://libx.stream/api/spotify/callback",
        ));
        assert_eq!(
            url,
            "https://accounts.spotify.com/authorize?response_type=code&client_id=a57ab1ceee1f4094b55924d3e228ae53&redirect_uri=https%3A%2F%2Flibx.stream%2Fapi%2Fspotify%2Fcallback&scope=playlist-read-private%20user-library-read"
        );
    }

    #[test]
    fn test_apple_authorize_url() {
        let url = Provider::Apple.authorize_url(&credentials(
            "stream.libx.web",
            "https://libx.stream/api/apple/callback",
        ));
        assert_eq!(
            url,
            "https://appleid.apple.com/auth/authorize?response_type=code&client_id=stream.libx.web&redirect_uri=https%3A%2F%2Flibx.stream%2Fapi%2Fapple%2Fcallback&scope=name%20email&response_mode=form_post"
        );
    }

    #[test]
    fn test_redirect_uri_is_encoded_as_configured() {
        let url = Provider::Spotify.authorize_url(&credentials("id", "http://localhost:5000"));
        assert_eq!(
            url,
            "https://accounts.spotify.com/authorize?response_type=code&client_id=id&redirect_uri=http%3A%2F%2Flocalhost%3A5000&scope=playlist-read-private%20user-library-read"
        );
        let url = Provider::Apple.authorize_url(&credentials("id", "https://LibX.stream/cb"));
        assert!(
            url.contains("&redirect_uri=https%3A%2F%2FLibX.stream%2Fcb&"),
            "{}",
            url
        );
    }

    #[test]
    fn test_encode_uri_component_keeps_marks() {
        assert_eq!(encode_uri_component("a b!*'()~"), "a%20b!*'()~");
        assert_eq!(encode_uri_component("x?y=z&w"), "x%3Fy%3Dz%26w");
    }

    #[test]
    fn test_slugs_match_display() {
        for provider in Provider::iter() {
            assert_eq!(provider.to_string(), provider.as_str());
            assert!(provider.token_param().starts_with(provider.as_str()));
        }
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("BQDsecret");
        assert_eq!(format!("{:?}", token), "AccessToken(***)");
        assert_eq!(token.secret(), "BQDsecret");
    }
}
