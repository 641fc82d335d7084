//! TUI event handling
//!
//! Polls crossterm for terminal events on the calling thread and maps key
//! presses to application actions.

use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::io;
use std::time::{Duration, Instant};

/// Terminal event types
#[derive(Debug, Clone)]
pub enum Event {
    /// Keyboard input event
    Key(KeyEvent),
    /// Terminal resize event
    Resize(u16, u16),
    /// Tick event for periodic redraws
    Tick,
}

/// User actions derived from keyboard input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Quit the application
    Quit,
    /// Move selection up
    Up,
    /// Move selection down
    Down,
    /// Select the previous value of the highlighted feature
    PreviousValue,
    /// Select the next value of the highlighted feature
    NextValue,
    /// Open the value picker, or pick/confirm inside a dialog
    Select,
    /// Confirm a pending dialog (y)
    Confirm,
    /// Write selections to the device
    Save,
    /// Re-open the device and rescan the catalog
    Refresh,
    /// Soft reset the device
    Reset,
    /// Factory reset the device
    FactoryReset,
    /// Show help dialog
    ShowHelp,
    /// Close dialog/popup
    CloseDialog,
    /// No action
    None,
}

impl From<KeyEvent> for Action {
    fn from(key: KeyEvent) -> Self {
        match key.code {
            // Quit
            KeyCode::Char('q') => Action::Quit,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
            KeyCode::Esc => Action::CloseDialog,

            // Navigation
            KeyCode::Up | KeyCode::Char('k') => Action::Up,
            KeyCode::Down | KeyCode::Char('j') => Action::Down,
            KeyCode::Left | KeyCode::Char('h') => Action::PreviousValue,
            KeyCode::Right | KeyCode::Char('l') => Action::NextValue,

            // Actions
            KeyCode::Enter => Action::Select,
            KeyCode::Char('y') => Action::Confirm,
            KeyCode::Char('s') => Action::Save,
            KeyCode::Char('r') => Action::Refresh,
            KeyCode::Char('R') => Action::Reset,
            KeyCode::Char('F') => Action::FactoryReset,
            KeyCode::Char('?') => Action::ShowHelp,

            _ => Action::None,
        }
    }
}

/// Blocking event source with a fixed tick rate
pub struct EventHandler {
    tick_rate: Duration,
    last_tick: Instant,
}

impl EventHandler {
    /// Create a new event handler
    pub fn new(tick_rate: Duration) -> Self {
        Self {
            tick_rate,
            last_tick: Instant::now(),
        }
    }

    /// Wait for the next event
    ///
    /// Returns `Event::Tick` when no input arrives before the next tick.
    pub fn next(&mut self) -> io::Result<Event> {
        loop {
            let timeout = self
                .tick_rate
                .checked_sub(self.last_tick.elapsed())
                .unwrap_or(Duration::ZERO);

            if event::poll(timeout)? {
                match event::read()? {
                    // Ignore key release events on some platforms
                    CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => {
                        return Ok(Event::Key(key));
                    }
                    CrosstermEvent::Resize(width, height) => {
                        return Ok(Event::Resize(width, height));
                    }
                    _ => {}
                }
            }

            if self.last_tick.elapsed() >= self.tick_rate {
                self.last_tick = Instant::now();
                return Ok(Event::Tick);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_action_from_key_quit() {
        assert_eq!(Action::from(key(KeyCode::Char('q'))), Action::Quit);
        assert_eq!(Action::from(key(KeyCode::Esc)), Action::CloseDialog);
    }

    #[test]
    fn test_action_ctrl_c_quit() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(Action::from(ctrl_c), Action::Quit);
        assert_eq!(Action::from(key(KeyCode::Char('c'))), Action::None);
    }

    #[test]
    fn test_action_from_key_navigation() {
        assert_eq!(Action::from(key(KeyCode::Up)), Action::Up);
        assert_eq!(Action::from(key(KeyCode::Char('k'))), Action::Up);
        assert_eq!(Action::from(key(KeyCode::Down)), Action::Down);
        assert_eq!(Action::from(key(KeyCode::Char('j'))), Action::Down);
        assert_eq!(Action::from(key(KeyCode::Left)), Action::PreviousValue);
        assert_eq!(Action::from(key(KeyCode::Char('h'))), Action::PreviousValue);
        assert_eq!(Action::from(key(KeyCode::Right)), Action::NextValue);
        assert_eq!(Action::from(key(KeyCode::Char('l'))), Action::NextValue);
    }

    #[test]
    fn test_action_from_key_actions() {
        assert_eq!(Action::from(key(KeyCode::Enter)), Action::Select);
        assert_eq!(Action::from(key(KeyCode::Char('s'))), Action::Save);
        assert_eq!(Action::from(key(KeyCode::Char('r'))), Action::Refresh);
        assert_eq!(Action::from(key(KeyCode::Char('R'))), Action::Reset);
        assert_eq!(Action::from(key(KeyCode::Char('F'))), Action::FactoryReset);
        assert_eq!(Action::from(key(KeyCode::Char('?'))), Action::ShowHelp);
        assert_eq!(Action::from(key(KeyCode::Char('y'))), Action::Confirm);
    }
}
