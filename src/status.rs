//! Persistent status line, alert log and the user-interaction seam.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use crate::error::ClientError;
use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    /// Color the status line is drawn in.
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Info => "green",
            Severity::Warning => "orange",
            Severity::Error => "red",
        }
    }

    fn log_level(&self) -> Level {
        match self {
            Severity::Info => Level::Info,
            Severity::Warning => Level::Warn,
            Severity::Error => Level::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

/// Modal alerts and yes/no prompts.
pub trait Interaction: Send + Sync {
    fn alert(&self, alert: &Alert);
    fn confirm(&self, prompt: &str) -> bool;
}

/// Terminal interaction: alerts go to stderr, prompts read a y/n line
/// from stdin. With `assume_yes` every prompt is accepted unasked.
pub struct ConsoleInteraction {
    pub assume_yes: bool,
}

impl Interaction for ConsoleInteraction {
    fn alert(&self, alert: &Alert) {
        eprintln!("!! {}\n   {}", alert.title, alert.message.replace('\n', "\n   "));
    }

    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        eprint!("{} [y/N] ", prompt);
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim(), "y" | "Y" | "yes")
    }
}

/// Interaction double: answers every prompt with `answer` and keeps
/// what it was shown.
pub struct RecordingInteraction {
    answer: bool,
    alerts: Mutex<Vec<Alert>>,
    prompts: Mutex<Vec<String>>,
}

impl RecordingInteraction {
    pub fn answering(answer: bool) -> Self {
        Self { answer, alerts: Mutex::new(Vec::new()), prompts: Mutex::new(Vec::new()) }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Interaction for RecordingInteraction {
    fn alert(&self, alert: &Alert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert.clone());
        }
    }

    fn confirm(&self, prompt: &str) -> bool {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.answer
    }
}

/// The page's status indicator. Every surfaced failure ends up here.
pub struct StatusBoard {
    current: Mutex<Option<Status>>,
    interaction: Arc<dyn Interaction>,
}

impl StatusBoard {
    pub fn new(interaction: Arc<dyn Interaction>) -> Self {
        Self { current: Mutex::new(None), interaction }
    }

    pub fn show(&self, message: &str, severity: Severity) {
        log(
            severity.log_level(),
            Domain::System,
            "status",
            obj(&[("msg", v_str(message)), ("severity", v_str(severity.as_str()))]),
        );
        if let Ok(mut current) = self.current.lock() {
            *current = Some(Status { message: message.to_string(), severity });
        }
    }

    /// Modal alert; the status line repeats it.
    pub fn alert(&self, title: &str, message: &str, severity: Severity) {
        self.interaction.alert(&Alert {
            title: title.to_string(),
            message: message.to_string(),
            severity,
        });
        self.show(&format!("{}: {}", title, message), severity);
    }

    /// Show a failure with the severity its kind calls for.
    pub fn report(&self, err: &ClientError) {
        match err {
            ClientError::Transport(e) => {
                self.show(&format!("Network or server error: {}", e), Severity::Error)
            }
            ClientError::Application { message, .. } => self.show(message, Severity::Warning),
            ClientError::Validation(message) => self.show(message, Severity::Warning),
        }
    }

    pub fn confirm(&self, prompt: &str) -> bool {
        self.interaction.confirm(prompt)
    }

    pub fn current(&self) -> Option<Status> {
        self.current.lock().ok().and_then(|c| c.clone())
    }
}
