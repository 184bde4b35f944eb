//! crossterm-backed screen and keyboard.
//!
//! The screen is an 80 column grid addressed by row. The header owns rows
//! 0-3; everything else is body. Partial redraws clear only the rows they
//! touch so menus do not flicker.

use std::io::{Stdout, Write, stdout};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{
    self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{execute, queue};

use super::{Display, InputSource, Intent, progress_line};

const WIDTH: usize = 80;
const RULE: &str = "========================================";

const BODY_TOP: u16 = 5;
const BODY_BOTTOM: u16 = 27;
const LIST_TOP: u16 = 7;
const PROMPT_ROW: u16 = 11;
const PROGRESS_ROW: u16 = 17;
const HINT_ROW: u16 = 23;

/// Raw mode plus alternate screen, restored on drop and on panic.
pub struct TerminalSession {
    _private: (),
}

impl TerminalSession {
    pub fn enter() -> Result<Self> {
        terminal::enable_raw_mode().context("Failed to enable raw mode; is this a TTY?")?;
        if let Err(e) = execute!(stdout(), EnterAlternateScreen, Hide) {
            let _ = terminal::disable_raw_mode();
            return Err(e).context("Failed to initialise terminal");
        }

        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            restore();
            previous(info);
        }));

        Ok(Self { _private: () })
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        restore();
    }
}

fn restore() {
    let _ = execute!(stdout(), Show, LeaveAlternateScreen);
    let _ = terminal::disable_raw_mode();
}

pub struct TerminalDisplay {
    out: Stdout,
    /// Next row used by [`Display::message`].
    cursor_row: u16,
}

impl TerminalDisplay {
    pub fn new() -> Self {
        Self {
            out: stdout(),
            cursor_row: BODY_TOP + 1,
        }
    }

    fn put(&mut self, row: u16, text: &str) -> Result<()> {
        let text: String = text.chars().take(WIDTH).collect();
        queue!(
            self.out,
            MoveTo(0, row),
            Clear(ClearType::CurrentLine),
            Print(text)
        )?;
        Ok(())
    }

    fn clear_rows(&mut self, start: u16, end: u16) -> Result<()> {
        for row in start..=end {
            queue!(self.out, MoveTo(0, row), Clear(ClearType::CurrentLine))?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TerminalDisplay {
    fn clear(&mut self) -> Result<()> {
        queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        self.cursor_row = BODY_TOP + 1;
        self.flush()
    }

    fn header(&mut self, app_version: &str, system_version: Option<&str>) -> Result<()> {
        self.put(0, RULE)?;
        self.put(1, &format!("     The Other Side Updater {}", app_version))?;
        match system_version {
            Some(version) => self.put(2, &format!("     Current System FW: {}", version))?,
            None => self.put(2, "")?,
        }
        self.put(3, RULE)?;
        self.flush()
    }

    fn clear_body(&mut self) -> Result<()> {
        self.clear_rows(BODY_TOP, BODY_BOTTOM)?;
        self.cursor_row = BODY_TOP + 1;
        self.flush()
    }

    fn list(&mut self, title: &str, items: &[String], selected: usize) -> Result<()> {
        self.put(BODY_TOP, title)?;
        self.clear_rows(LIST_TOP, HINT_ROW - 1)?;
        for (i, item) in items.iter().enumerate() {
            let marker = if i == selected { ">" } else { " " };
            self.put(LIST_TOP + i as u16, &format!("{} {}", marker, item))?;
        }
        self.flush()
    }

    fn hints(&mut self, hints: &[&str]) -> Result<()> {
        for (i, hint) in hints.iter().enumerate() {
            self.put(HINT_ROW + i as u16, hint)?;
        }
        self.flush()
    }

    fn prompt(&mut self, message: &str, hints: &[&str]) -> Result<()> {
        self.clear_rows(LIST_TOP + 2, HINT_ROW + 2)?;
        self.put(PROMPT_ROW, message)?;
        self.hints(hints)
    }

    fn message(&mut self, line: &str) -> Result<()> {
        if self.cursor_row == PROGRESS_ROW {
            self.cursor_row += 1;
        }
        if self.cursor_row > BODY_BOTTOM {
            self.clear_rows(BODY_TOP, BODY_BOTTOM)?;
            self.cursor_row = BODY_TOP + 1;
        }
        self.put(self.cursor_row, line)?;
        self.cursor_row += 1;
        self.flush()
    }

    fn progress(&mut self, downloaded: u64, total: u64) -> Result<()> {
        if let Some(line) = progress_line(downloaded, total) {
            self.put(PROGRESS_ROW, &line)?;
            self.flush()?;
        }
        Ok(())
    }

    fn clear_progress(&mut self) -> Result<()> {
        self.clear_rows(PROGRESS_ROW, PROGRESS_ROW)?;
        self.flush()
    }
}

/// Keyboard input mapped onto intents.
pub struct TerminalInput;

impl InputSource for TerminalInput {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Intent>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key) => Ok(map_key(key)),
            _ => Ok(None),
        }
    }
}

/// Map a key press onto an intent.
pub fn map_key(key: KeyEvent) -> Option<Intent> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return (key.code == KeyCode::Char('c')).then_some(Intent::Exit);
    }
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => Some(Intent::Up),
        KeyCode::Down | KeyCode::Char('j') => Some(Intent::Down),
        KeyCode::Enter | KeyCode::Char('a') => Some(Intent::Confirm),
        KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('b') => Some(Intent::Back),
        KeyCode::Char('+') | KeyCode::Char('q') => Some(Intent::Exit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(map_key(press(KeyCode::Up)), Some(Intent::Up));
        assert_eq!(map_key(press(KeyCode::Char('j'))), Some(Intent::Down));
        assert_eq!(map_key(press(KeyCode::Enter)), Some(Intent::Confirm));
        assert_eq!(map_key(press(KeyCode::Esc)), Some(Intent::Back));
        assert_eq!(map_key(press(KeyCode::Char('+'))), Some(Intent::Exit));
        assert_eq!(map_key(press(KeyCode::Char('x'))), None);
    }

    #[test]
    fn test_ctrl_c_exits() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_key(key), Some(Intent::Exit));

        let key = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::CONTROL);
        assert_eq!(map_key(key), None);
    }

    #[test]
    fn test_release_events_ignored() {
        let mut key = press(KeyCode::Enter);
        key.kind = KeyEventKind::Release;
        assert_eq!(map_key(key), None);
    }
}
