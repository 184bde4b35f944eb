//! Headless display and input: replay a fixed list of intents and keep a
//! transcript of everything drawn.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, bail};

use super::{Display, InputSource, Intent, progress_line};

/// Plays back intents in order, then reports the input as closed.
pub struct ScriptedInput {
    intents: VecDeque<Intent>,
}

impl ScriptedInput {
    pub fn new(intents: impl IntoIterator<Item = Intent>) -> Self {
        Self {
            intents: intents.into_iter().collect(),
        }
    }
}

impl InputSource for ScriptedInput {
    fn poll(&mut self, _timeout: Duration) -> Result<Option<Intent>> {
        match self.intents.pop_front() {
            Some(intent) => Ok(Some(intent)),
            None => bail!("Input script exhausted"),
        }
    }
}

/// Shared view of what a [`TranscriptDisplay`] has drawn.
#[derive(Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<String>>>);

impl Transcript {
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        // a poisoned transcript is still readable
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, line: impl Into<String>) {
        self.lock().push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lock().iter().any(|line| line.contains(needle))
    }

    pub fn count(&self, needle: &str) -> usize {
        self.lock().iter().filter(|line| line.contains(needle)).count()
    }
}

/// Records drawing calls as plain text lines.
pub struct TranscriptDisplay {
    transcript: Transcript,
}

impl TranscriptDisplay {
    pub fn new() -> (Self, Transcript) {
        let transcript = Transcript::default();
        (
            Self {
                transcript: transcript.clone(),
            },
            transcript,
        )
    }
}

impl Display for TranscriptDisplay {
    fn clear(&mut self) -> Result<()> {
        self.transcript.push("[clear]");
        Ok(())
    }

    fn header(&mut self, app_version: &str, system_version: Option<&str>) -> Result<()> {
        self.transcript.push(format!("[header {}]", app_version));
        if let Some(version) = system_version {
            self.transcript
                .push(format!("Current System FW: {}", version));
        }
        Ok(())
    }

    fn clear_body(&mut self) -> Result<()> {
        self.transcript.push("[clear body]");
        Ok(())
    }

    fn list(&mut self, title: &str, items: &[String], selected: usize) -> Result<()> {
        self.transcript.push(title);
        for (i, item) in items.iter().enumerate() {
            let marker = if i == selected { ">" } else { " " };
            self.transcript.push(format!("{} {}", marker, item));
        }
        Ok(())
    }

    fn hints(&mut self, hints: &[&str]) -> Result<()> {
        for hint in hints {
            self.transcript.push(*hint);
        }
        Ok(())
    }

    fn prompt(&mut self, message: &str, hints: &[&str]) -> Result<()> {
        self.transcript.push(format!("? {}", message));
        self.hints(hints)
    }

    fn message(&mut self, line: &str) -> Result<()> {
        self.transcript.push(line);
        Ok(())
    }

    fn progress(&mut self, downloaded: u64, total: u64) -> Result<()> {
        if let Some(line) = progress_line(downloaded, total) {
            self.transcript.push(line);
        }
        Ok(())
    }

    fn clear_progress(&mut self) -> Result<()> {
        Ok(())
    }
}
