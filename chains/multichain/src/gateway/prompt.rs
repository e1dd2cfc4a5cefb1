use super::OperatorPrompt;
use anyhow::{Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Input;

/// Reads amounts from the terminal.
pub struct DialoguerPrompt;

impl OperatorPrompt for DialoguerPrompt {
    fn ask_amount(&self, prompt: &str) -> Result<f64> {
        let amount: f64 = Input::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .validate_with(|value: &f64| -> std::result::Result<(), &str> {
                if value.is_finite() && *value >= 0.0 {
                    Ok(())
                } else {
                    Err("Enter a non-negative number")
                }
            })
            .interact_text()
            .context("Failed to read amount")?;
        Ok(amount)
    }
}
