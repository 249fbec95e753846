use std::fmt;
use std::time::{Duration, Instant};

use colored::Colorize;
use error_stack::{IntoReport, Report, ResultExt};
use tiny_http::{Header, Response, Server};
use url::Url;

use crate::provider::Provider;
use crate::view::PageLocation;
use crate::Suggestion;

#[derive(Debug)]
pub struct ListenerError;

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Landing listener error")
    }
}

impl std::error::Error for ListenerError {}

pub type ListenerResult<T> = error_stack::Result<T, ListenerError>;

const LANDING_HTML: &str = r#"
<html>
<head>
    <title>libx</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: linear-gradient(90deg, #000000 0%, #1DB954 100%);
        }
        .container {
            text-align: center;
            background: white;
            padding: 40px;
            border-radius: 10px;
        }
    </style>
</head>
<body>
    <div class="container">
        <h1>You're back!</h1>
        <p>You can close this window and return to libx.</p>
    </div>
</body>
</html>
"#;

/// Root of the local page served on `port`.
pub fn local_origin(port: u16) -> ListenerResult<PageLocation> {
    Url::parse(&format!("http://127.0.0.1:{}/", port))
        .into_report()
        .change_context(ListenerError)
        .map(PageLocation::new)
}

/// Page address the browser landed on after login, pasted by the user.
///
/// The backend redirects to its own host, so only the path and query are
/// checked.
pub fn landed_location(input: &str) -> ListenerResult<PageLocation> {
    let location = Url::parse(input.trim())
        .into_report()
        .change_context(ListenerError)
        .attach_printable(format!("Not a page address: {}", input))?;
    if !is_landing(&location) {
        return Err(Report::new(ListenerError)
            .attach_printable(format!("{} carries no token or error", location))
            .attach(Suggestion(format!(
                "paste the full address, it looks like https://<host>/?{}=...",
                Provider::Spotify.token_param()
            ))));
    }
    Ok(PageLocation::new(location))
}

fn is_landing(location: &Url) -> bool {
    location.path() == "/"
        && location.query_pairs().any(|(key, _)| {
            key == "error"
                || key == Provider::Spotify.token_param()
                || key == Provider::Apple.token_param()
        })
}

/// Local page the backend sends the browser back to after the OAuth exchange.
pub struct LandingListener {
    server: Server,
    origin: Url,
}

impl LandingListener {
    pub fn bind(port: u16) -> ListenerResult<Self> {
        let server = Server::http(("127.0.0.1", port)).map_err(|error| {
            Report::new(ListenerError)
                .attach_printable(format!("Failed to listen on port {}: {}", port, error))
        })?;
        let bound = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .unwrap_or(port);
        let origin = local_origin(bound)?.url().clone();
        Ok(Self { server, origin })
    }

    /// Page root, e.g. `http://127.0.0.1:8080/`.
    pub fn origin(&self) -> PageLocation {
        PageLocation::new(self.origin.clone())
    }

    /// Waits until the browser lands with a token or an error and returns
    /// that location. Anything else gets a 404.
    pub async fn wait_for_landing(&self, timeout: Duration) -> ListenerResult<PageLocation> {
        println!(
            "Waiting for the login to finish on {}",
            self.origin.as_str().cyan()
        );
        let start = Instant::now();

        loop {
            if start.elapsed() > timeout {
                println!("{}", "Login timeout!".red());
                return Err(Report::new(ListenerError)
                    .attach_printable(format!(
                        "No login landed within {} seconds",
                        timeout.as_secs()
                    ))
                    .attach(Suggestion(
                        "copy the address the browser landed on and run libx open --location '<address>'"
                            .to_string(),
                    )));
            }

            if let Ok(Some(request)) = self.server.recv_timeout(Duration::from_millis(100)) {
                let location = self
                    .origin
                    .join(request.url())
                    .into_report()
                    .change_context(ListenerError)?;
                tracing::debug!(path = location.path(), "landing request");

                if is_landing(&location) {
                    let header = Header::from_bytes(&b"Content-Type"[..], &b"text/html"[..])
                        .map_err(|_| Report::new(ListenerError))?;
                    let response = Response::from_string(LANDING_HTML).with_header(header);
                    if let Err(error) = request.respond(response) {
                        tracing::warn!(%error, "failed to answer landing request");
                    }
                    return Ok(PageLocation::new(location));
                }

                let response = Response::from_string("Not Found").with_status_code(404);
                if let Err(error) = request.respond(response) {
                    tracing::warn!(%error, "failed to answer landing request");
                }
            } else {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::AccessToken;
    use crate::view::SessionSelection;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_waits_for_token_landing() {
        let listener = LandingListener::bind(0).unwrap();
        let origin = listener.origin().url().clone();
        assert_ne!(origin.port(), Some(0));

        let browser = tokio::spawn(async move {
            let client = reqwest::Client::new();
            let favicon = client
                .get(origin.join("/favicon.ico").unwrap())
                .send()
                .await
                .unwrap();
            assert_eq!(favicon.status().as_u16(), 404);
            let root = client.get(origin.clone()).send().await.unwrap();
            assert_eq!(root.status().as_u16(), 404);
            let landed = client
                .get(origin.join("/?apple_token=t%2B1").unwrap())
                .send()
                .await
                .unwrap();
            assert_eq!(landed.status().as_u16(), 200);
        });

        let location = listener
            .wait_for_landing(Duration::from_secs(10))
            .await
            .unwrap();
        browser.await.unwrap();
        assert_eq!(
            SessionSelection::from_location(&location),
            SessionSelection::Authorized {
                provider: Provider::Apple,
                token: AccessToken::new("t+1"),
            }
        );
    }

    #[test]
    fn test_pasted_backend_address_is_a_landing() {
        let location =
            landed_location("  https://api.libx.stream/?spotify_token=BQD%2Bx  \n").unwrap();
        assert_eq!(location.url().host_str(), Some("api.libx.stream"));
        assert_eq!(
            SessionSelection::from_location(&location),
            SessionSelection::Authorized {
                provider: Provider::Spotify,
                token: AccessToken::new("BQD+x"),
            }
        );
        assert!(landed_location("https://libx.stream/?error=no_code").is_ok());
    }

    #[test]
    fn test_pasted_address_without_token_is_rejected() {
        assert!(landed_location("https://libx.stream/").is_err());
        assert!(landed_location("https://libx.stream/download?spotify_token=a").is_err());
        assert!(landed_location("spotify_token=abc").is_err());
    }

    #[tokio::test]
    async fn test_times_out_without_landing() {
        let listener = LandingListener::bind(0).unwrap();
        let result = listener.wait_for_landing(Duration::from_millis(10)).await;
        assert!(result.is_err());
    }
}
