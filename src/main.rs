use std::fmt;

use clap::{Parser, Subcommand};
use colored::Colorize;
use error_stack::fmt::{Charset, ColorMode};
use error_stack::{FutureExt, IntoReport, Report, ResultExt};
use inflector::Inflector;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::config::LibxConfig;
use crate::provider::{AccessToken, Provider};
use crate::session::Session;
use crate::view::PageLocation;

mod config;
mod dialoguer;
mod download;
mod landing;
mod platform;
mod provider;
mod session;
mod store;
mod view;

#[derive(Debug)]
pub struct LibxError;
impl fmt::Display for LibxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Libx error")
    }
}
impl std::error::Error for LibxError {}

pub type LibxResult<T> = error_stack::Result<T, LibxError>;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Download your music library")]
struct Cli {
    #[command(subcommand)]
    command: LibxCommands,
}

#[derive(Subcommand, Debug, PartialEq, Clone)]
enum LibxCommands {
    /// Opens the library page and waits for logins and downloads
    Open {
        /// Page location to mount, e.g. one carrying a spotify_token
        #[clap(long)]
        location: Option<String>,
    },
    /// Logs in with a provider and continues on the page once it lands
    Login {
        #[clap(value_enum)]
        provider: Provider,
    },
    /// Downloads the library export with a token you already hold
    Download {
        #[clap(value_enum)]
        provider: Provider,
        #[clap(long)]
        token: String,
        /// Exit right after the download instead of waiting for the return home
        #[clap(long, action)]
        no_wait: bool,
    },
    /// Prints the resolved configuration
    Config,
}

impl LibxCommands {
    pub async fn execute(&self) -> LibxResult<()> {
        let config = LibxConfig::from_env().change_context(LibxError)?;
        match self {
            LibxCommands::Open { location } => {
                let location = location
                    .as_deref()
                    .map(Self::parse_location)
                    .transpose()?;
                Session::new(config)
                    .change_context(LibxError)?
                    .open(location, None)
                    .change_context(LibxError)
                    .await
            }
            LibxCommands::Login { provider } => {
                Session::new(config)
                    .change_context(LibxError)?
                    .open(None, Some(*provider))
                    .change_context(LibxError)
                    .await
            }
            LibxCommands::Download {
                provider,
                token,
                no_wait,
            } => {
                Session::new(config)
                    .change_context(LibxError)?
                    .download(*provider, AccessToken::new(token.clone()), !*no_wait)
                    .change_context(LibxError)
                    .await
            }
            LibxCommands::Config => {
                let value = serde_json::to_value(&config)
                    .into_report()
                    .change_context(LibxError)?;
                println!("{}", "Current config:".bold());
                if let serde_json::Value::Object(fields) = value {
                    for (key, field) in fields {
                        println!("{}: {}", key.to_sentence_case().cyan(), field);
                    }
                }
                Ok(())
            }
        }
    }

    fn parse_location(location: &str) -> LibxResult<PageLocation> {
        Url::parse(location)
            .into_report()
            .change_context(LibxError)
            .attach_printable(format!("Invalid page location {}", location))
            .attach(Suggestion(
                "pass a full url, e.g. http://127.0.0.1:8080/?spotify_token=...".to_string(),
            ))
            .map(PageLocation::new)
    }
}

pub struct Suggestion(String);

impl Suggestion {
    pub fn set_report() {
        Report::set_charset(Charset::Utf8);
        Report::set_color_mode(ColorMode::Color);
        Report::install_debug_hook::<Self>(|Self(value), context| {
            context.push_body(format!("{}: {value}", "suggestion".yellow()))
        });
    }
}

async fn run() -> LibxResult<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("libx=info")),
        )
        .with_writer(std::io::stderr)
        .init();
    Suggestion::set_report();

    cli.command.execute().await
}

#[tokio::main]
async fn main() -> LibxResult<()> {
    run().await
}
