//! Presentation and input.
//!
//! The action runner and the menu only talk to the [`Display`] and
//! [`InputSource`] traits. [`terminal`] drives a real terminal through
//! crossterm; [`script`] replays intents and records output for headless
//! runs.

pub mod script;
pub mod terminal;

use std::time::Duration;

use anyhow::Result;

/// What the user asked for, independent of the physical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Up,
    Down,
    Confirm,
    Back,
    Exit,
}

/// Source of user intents.
pub trait InputSource {
    /// Wait up to `timeout` for the next intent. `Ok(None)` means nothing
    /// happened in time.
    fn poll(&mut self, timeout: Duration) -> Result<Option<Intent>>;
}

/// Text screen with a fixed header band and a body below it.
pub trait Display: Send {
    /// Wipe the whole screen. Used at major transitions only.
    fn clear(&mut self) -> Result<()>;

    /// Draw the header band. `system_version` adds the installed firmware
    /// line.
    fn header(&mut self, app_version: &str, system_version: Option<&str>) -> Result<()>;

    /// Wipe everything below the header.
    fn clear_body(&mut self) -> Result<()>;

    /// Selectable list with a title line above it.
    fn list(&mut self, title: &str, items: &[String], selected: usize) -> Result<()>;

    /// Key legend at the bottom of the body.
    fn hints(&mut self, hints: &[&str]) -> Result<()>;

    /// Question in the middle of the body, with its key legend.
    fn prompt(&mut self, message: &str, hints: &[&str]) -> Result<()>;

    /// Append a line of running output to the body.
    fn message(&mut self, line: &str) -> Result<()>;

    /// Download progress; nothing is drawn when `total` is unknown.
    fn progress(&mut self, downloaded: u64, total: u64) -> Result<()>;

    fn clear_progress(&mut self) -> Result<()>;
}

/// Progress text, or `None` when the total size is unknown.
pub fn progress_line(downloaded: u64, total: u64) -> Option<String> {
    if total == 0 {
        return None;
    }
    let percent = downloaded.min(total) * 100 / total;
    Some(format!(
        "Downloading... {}% ({} / {} bytes)",
        percent, downloaded, total
    ))
}

pub const CONFIRM_HINTS: [&str; 2] = ["Enter = Yes, continue", "Esc = No, cancel"];

/// Display and input bundled with the polling cadence.
pub struct Ui {
    display: Box<dyn Display>,
    input: Box<dyn InputSource>,
    poll_interval: Duration,
    app_version: String,
}

impl Ui {
    pub fn new(
        display: Box<dyn Display>,
        input: Box<dyn InputSource>,
        poll_interval: Duration,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            display,
            input,
            poll_interval,
            app_version: app_version.into(),
        }
    }

    pub fn display(&mut self) -> &mut dyn Display {
        self.display.as_mut()
    }

    pub fn header(&mut self, system_version: Option<&str>) -> Result<()> {
        self.display.header(&self.app_version, system_version)
    }

    /// Clear the screen and draw the header.
    pub fn fresh_screen(&mut self, system_version: Option<&str>) -> Result<()> {
        self.display.clear()?;
        self.header(system_version)
    }

    pub fn message(&mut self, line: &str) -> Result<()> {
        self.display.message(line)
    }

    /// Block until the user expresses any intent.
    pub fn next_intent(&mut self) -> Result<Intent> {
        loop {
            if let Some(intent) = self.input.poll(self.poll_interval)? {
                return Ok(intent);
            }
        }
    }

    /// Block until `wanted` is observed; everything else is ignored.
    pub fn wait_for(&mut self, wanted: Intent) -> Result<()> {
        while self.next_intent()? != wanted {}
        Ok(())
    }

    /// Yes/no question. Confirm answers yes, Back answers no.
    pub fn confirm(&mut self, message: &str) -> Result<bool> {
        self.display.prompt(message, &CONFIRM_HINTS)?;
        let answer = loop {
            match self.next_intent()? {
                Intent::Confirm => break true,
                Intent::Back => break false,
                _ => {}
            }
        };
        self.display.clear_body()?;
        Ok(answer)
    }
}

/// Selected position in a non-empty list, wrapping at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    index: usize,
    len: usize,
}

impl Selection {
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "selection over an empty list");
        Self { index: 0, len }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn up(&mut self) {
        self.index = (self.index + self.len - 1) % self.len;
    }

    pub fn down(&mut self) {
        self.index = (self.index + 1) % self.len;
    }

    /// Apply a directional intent; returns whether it was one.
    pub fn apply(&mut self, intent: Intent) -> bool {
        match intent {
            Intent::Up => self.up(),
            Intent::Down => self.down(),
            _ => return false,
        }
        true
    }
}
