use anyhow::Result;
use clap::ValueEnum;
use dialoguer::{theme::ColorfulTheme, Select};
use std::fmt;

/// Top-level operations offered by the menu and by `--mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    Create,
    Warmup,
    Volume,
    Collector,
    ManualBridge,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::Warmup,
        Action::Volume,
        Action::Collector,
        Action::ManualBridge,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Action::Create => "Create wallet database",
            Action::Warmup => "Run warmup",
            Action::Volume => "Run volume",
            Action::Collector => "Run collector",
            Action::ManualBridge => "Run manual bridge",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn choose_action() -> Result<Action> {
    let items: Vec<String> = Action::ALL
        .iter()
        .enumerate()
        .map(|(i, action)| format!("{}. {}", i + 1, action))
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select mode")
        .default(0)
        .items(&items)
        .interact()?;

    Ok(Action::ALL[selection])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_flag_names() {
        let names: Vec<String> = Action::ALL
            .iter()
            .filter_map(|a| a.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["create", "warmup", "volume", "collector", "manual-bridge"]
        );
    }
}
