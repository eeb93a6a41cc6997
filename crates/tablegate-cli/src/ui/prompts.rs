//! Interactive prompt utilities.

use dialoguer::{Confirm, theme::ColorfulTheme};

/// Prompt for confirmation (yes/no), defaulting to no.
pub fn confirm(prompt: &str) -> Result<bool, dialoguer::Error> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
}
