use std::fmt;

use dialoguer::{console::Term, theme::ColorfulTheme, Input, Select};
use error_stack::{IntoReport, Report, Result, ResultExt};

#[derive(Debug)]
pub struct DialoguerError;

impl fmt::Display for DialoguerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dialoguer error")
    }
}

impl std::error::Error for DialoguerError {}

/// Terminal prompts for the page menu, drawn on stderr.
#[derive(Debug, Clone)]
pub struct Dialoguer;

impl Dialoguer {
    /// Index of the chosen label. Escape counts as an error.
    pub fn select(prompt_text: &str, labels: &[String]) -> Result<usize, DialoguerError> {
        Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt_text)
            .items(labels)
            .default(0)
            .interact_on_opt(&Term::stderr())
            .into_report()
            .change_context(DialoguerError)?
            .ok_or_else(|| Report::new(DialoguerError).attach_printable("Menu closed"))
    }

    /// One trimmed line of text; an empty line is returned as is.
    pub fn input(prompt_text: &str) -> Result<String, DialoguerError> {
        let line = Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt_text)
            .allow_empty(true)
            .interact_text_on(&Term::stderr())
            .into_report()
            .change_context(DialoguerError)?;
        Ok(line.trim().to_string())
    }
}
