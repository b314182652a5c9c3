//! Terminal answers for the engine's questions.

use console::style;
use dialoguer::{Confirm as ConfirmPrompt, Input, Password, Select};
use paramsync::decision::{Confirm, Decision, NewParameter, RestoreCandidate};
use paramsync::model::ParameterType;

/// Asks on the terminal. Failed terminal interaction counts as "no".
pub struct TerminalDecision {
    default_key_id: Option<String>,
}

impl TerminalDecision {
    pub fn new(default_key_id: Option<String>) -> Self {
        Self { default_key_id }
    }

    fn ask_yes_no(&self, prompt: &str, default: bool) -> bool {
        ConfirmPrompt::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Prompt failed, treating as no");
                false
            })
    }
}

impl Decision for TerminalDecision {
    fn new_parameter(&mut self, name: &str) -> Option<NewParameter> {
        println!("{} {}", style("Missing:").yellow().bold(), name);
        if !self.ask_yes_no("Create it now?", true) {
            return None;
        }

        let secure = self.ask_yes_no("Store as SecureString?", false);
        let value = if secure {
            Password::new().with_prompt("Value").interact().ok()?
        } else {
            Input::<String>::new().with_prompt("Value").interact_text().ok()?
        };
        let description = Input::<String>::new()
            .with_prompt("Description")
            .allow_empty(true)
            .interact_text()
            .ok()?;

        let (kind, kms_key_id) = if secure {
            let mut input = Input::<String>::new().with_prompt("Key id");
            if let Some(default) = &self.default_key_id {
                input = input.default(default.clone());
            }
            (ParameterType::SecureString, Some(input.interact_text().ok()?))
        } else {
            (ParameterType::String, None)
        };

        Some(NewParameter {
            value,
            description,
            kind,
            kms_key_id,
        })
    }

    fn confirm(&mut self, question: Confirm<'_>) -> bool {
        self.ask_yes_no(&question.prompt(), question.default_answer())
    }

    fn placeholder_value(&mut self, placeholder: &str) -> Option<String> {
        Input::<String>::new()
            .with_prompt(format!("Value for ${{{}}}", placeholder))
            .allow_empty(true)
            .interact_text()
            .ok()
    }

    fn select_version(&mut self, name: &str, candidates: &[RestoreCandidate]) -> Option<usize> {
        let items: Vec<String> = candidates.iter().map(describe_candidate).collect();
        let picked = Select::new()
            .with_prompt(format!("Version of {} to restore", name))
            .items(&items)
            .default(0)
            .interact_opt()
            .ok()
            .flatten()?;

        if candidates[picked].value.is_none() {
            println!("{}", style("That version cannot be decrypted.").red());
            return None;
        }
        Some(picked)
    }
}

fn describe_candidate(candidate: &RestoreCandidate) -> String {
    let value = candidate
        .value
        .as_deref()
        .unwrap_or("<cannot decrypt>");
    format!(
        "v{}  {}  {}  {}",
        candidate.version,
        candidate.time.format("%Y-%m-%d %H:%M:%S"),
        candidate.user,
        value
    )
}

/// Reads a required value on the terminal when it was not given as a flag.
pub fn ask_text(prompt: &str) -> anyhow::Result<String> {
    Ok(Input::<String>::new().with_prompt(prompt).interact_text()?)
}
