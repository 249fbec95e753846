use strum::IntoEnumIterator;

use crate::provider::Provider;
use crate::view::{ButtonState, IndexView};

/// One entry of the page menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCommands {
    Press(Provider),
    Quit,
}

impl PageCommands {
    /// Menu entries in render order, labelled from the current view.
    pub fn get_options(view: &IndexView) -> Vec<(Self, String)> {
        let mut options = Provider::iter()
            .map(|provider| {
                let label = match view.button_state(provider) {
                    ButtonState::LoggedOut => view.button_label(provider),
                    _ => format!("{} ({})", view.button_label(provider), provider.display_name()),
                };
                (PageCommands::Press(provider), label)
            })
            .collect::<Vec<_>>();
        options.push((PageCommands::Quit, "Quit".to_string()));
        options
    }

    pub fn get_selection(options: &[(Self, String)], selection: usize) -> Self {
        options
            .get(selection)
            .map(|(command, _)| *command)
            .unwrap_or(PageCommands::Quit)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use url::Url;

    use super::*;
    use crate::config::tests::test_config;
    use crate::platform::tests::RecordingPlatform;
    use crate::store::Store;
    use crate::view::PageLocation;

    #[test]
    fn test_options_follow_button_labels() {
        let view = IndexView::mount(
            PageLocation::new(Url::parse("http://127.0.0.1:8080/?spotify_token=abc").unwrap()),
            Arc::new(test_config()),
            Store::new(),
            Arc::new(RecordingPlatform::default()),
        );
        let options = PageCommands::get_options(&view);
        let labels = options
            .iter()
            .map(|(_, label)| label.as_str())
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["Download (Spotify)", "Login with Apple", "Quit"]);
        assert_eq!(
            PageCommands::get_selection(&options, 1),
            PageCommands::Press(Provider::Apple)
        );
        assert_eq!(PageCommands::get_selection(&options, 7), PageCommands::Quit);
    }
}
