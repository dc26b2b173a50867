//! Dialog input for context actions: flags first, then the terminal.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use canvas_core::Prompter;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Answers prompts from command-line values, falling back to stdin.
pub struct TerminalPrompter {
    answers: Mutex<VecDeque<String>>,
    assume_yes: bool,
}

impl TerminalPrompter {
    pub fn new(answers: impl IntoIterator<Item = String>, assume_yes: bool) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            assume_yes,
        }
    }

    fn next_answer(&self) -> Option<String> {
        self.answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }
}

async fn read_line(question: &str) -> Option<String> {
    eprint!("{} ", question);
    let _ = std::io::stderr().flush();

    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    match stdin.read_line(&mut line).await {
        // EOF counts as a dismissed dialog
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn prompt(&self, message: &str, default: &str) -> Option<String> {
        if let Some(answer) = self.next_answer() {
            return Some(answer);
        }

        let question = if default.is_empty() {
            message.to_string()
        } else {
            format!("{} [{}]", message, default)
        };
        let line = read_line(&question).await?;
        if line.trim().is_empty() {
            Some(default.to_string())
        } else {
            Some(line)
        }
    }

    async fn confirm(&self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        match read_line(&format!("{} [y/N]", message)).await {
            Some(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            None => false,
        }
    }
}
