//! Answering the gate's cleanup question from the terminal or from config.

use std::io::{self, BufRead, Write};

use refguard_core::{ConfirmChoice, Confirmation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmPolicy {
    /// Ask on the terminal.
    Prompt,
    /// Always clean up.
    Cleanup,
    /// Always refuse.
    Decline,
}

impl ConfirmPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Cleanup => "cleanup",
            Self::Decline => "decline",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "prompt" => Ok(Self::Prompt),
            "cleanup" => Ok(Self::Cleanup),
            "decline" => Ok(Self::Decline),
            _ => Err(format!(
                "Invalid confirmation policy: '{s}'. Must be one of: prompt, cleanup, decline"
            )),
        }
    }
}

/// [`Confirmation`] driven by a [`ConfirmPolicy`]. In `Prompt` mode the
/// message goes to `output` and a `y`/`yes` line on `input` means cleanup;
/// anything else, including end of input, declines.
pub struct PolicyConfirmation<R, W> {
    policy: ConfirmPolicy,
    input: R,
    output: W,
}

impl PolicyConfirmation<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio(policy: ConfirmPolicy) -> Self {
        Self::new(policy, io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> PolicyConfirmation<R, W> {
    pub fn new(policy: ConfirmPolicy, input: R, output: W) -> Self {
        Self {
            policy,
            input,
            output,
        }
    }

    fn ask(&mut self, message: &str) -> io::Result<ConfirmChoice> {
        write!(self.output, "{message} [y/N] ")?;
        self.output.flush()?;

        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => ConfirmChoice::Cleanup,
            _ => ConfirmChoice::Decline,
        })
    }
}

impl<R: BufRead, W: Write> Confirmation for PolicyConfirmation<R, W> {
    fn confirm(&mut self, message: &str) -> ConfirmChoice {
        let choice = match self.policy {
            ConfirmPolicy::Cleanup => ConfirmChoice::Cleanup,
            ConfirmPolicy::Decline => ConfirmChoice::Decline,
            ConfirmPolicy::Prompt => self.ask(message).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Could not read confirmation, declining");
                ConfirmChoice::Decline
            }),
        };
        tracing::info!(
            policy = self.policy.as_str(),
            choice = ?choice,
            "Cleanup confirmation answered"
        );
        choice
    }
}
