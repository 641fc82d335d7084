//! TUI application state
//!
//! Holds the device session and the interaction state, maps actions to
//! session operations, and runs the terminal event loop.

use anyhow::Result;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use protocol::{DeviceSession, FEATURES, FeatureId, FeatureSlot, UsbBus};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, Stdout};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::events::{Action, Event, EventHandler};
use super::ui;
use crate::config::TimingSettings;

/// Current dialog/popup being displayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    /// No dialog open
    None,
    /// Help dialog showing keybindings
    Help,
    /// Value picker for the highlighted feature
    SelectValue { cursor: usize },
    /// Confirm soft reset
    ConfirmReset,
    /// Confirm factory reset
    ConfirmFactoryReset,
}

/// Blocking device operation queued by an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Save,
    Refresh,
    Reset,
    FactoryReset,
}

impl Command {
    fn progress(self) -> &'static str {
        match self {
            Command::Save => "Saving...",
            Command::Refresh => "Reading device...",
            Command::Reset => "Resetting device...",
            Command::FactoryReset => "Restoring factory defaults...",
        }
    }
}

/// Outcome line shown below the feature table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

impl StatusMessage {
    fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// Application state
pub struct App<B: UsbBus> {
    /// Bus used to (re-)open the device
    bus: B,
    /// Open device and its catalog
    session: DeviceSession<B::Handle>,
    /// Settle times after resets
    timing: TimingSettings,
    /// Highlighted row of the feature table
    selected_index: usize,
    /// Current dialog being displayed
    dialog: Dialog,
    /// Selections changed since the last save or refresh
    modified: bool,
    /// Operation to run before the next redraw
    pending: Option<Command>,
    /// Outcome of the last action
    message: Option<StatusMessage>,
    /// Whether the app should quit
    should_quit: bool,
}

impl<B: UsbBus> App<B> {
    /// Create a new application instance
    pub fn new(bus: B, session: DeviceSession<B::Handle>, timing: TimingSettings) -> Self {
        Self {
            bus,
            session,
            timing,
            selected_index: 0,
            dialog: Dialog::None,
            modified: false,
            pending: None,
            message: None,
            should_quit: false,
        }
    }

    pub fn session(&self) -> &DeviceSession<B::Handle> {
        &self.session
    }

    /// Get the selected index
    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    /// Feature of the highlighted row
    pub fn selected_feature(&self) -> FeatureId {
        FEATURES[self.selected_index].id
    }

    /// Slot of the highlighted row
    pub fn selected_slot(&self) -> Option<&FeatureSlot> {
        self.session.catalog().slot(self.selected_feature())
    }

    /// Get the current dialog
    pub fn dialog(&self) -> &Dialog {
        &self.dialog
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn message(&self) -> Option<&StatusMessage> {
        self.message.as_ref()
    }

    pub fn pending(&self) -> Option<Command> {
        self.pending
    }

    /// Check if app should quit
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Handle user action
    ///
    /// Device operations are only queued here; `run_pending` executes them.
    pub fn handle_action(&mut self, action: Action) {
        match self.dialog.clone() {
            Dialog::None => self.handle_main_action(action),
            Dialog::Help => {
                if matches!(action, Action::CloseDialog | Action::Quit | Action::ShowHelp) {
                    self.dialog = Dialog::None;
                }
            }
            Dialog::SelectValue { cursor } => self.handle_picker_action(action, cursor),
            Dialog::ConfirmReset => self.handle_confirm_action(action, Command::Reset),
            Dialog::ConfirmFactoryReset => {
                self.handle_confirm_action(action, Command::FactoryReset)
            }
        }
    }

    fn handle_main_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::Up => {
                if self.selected_index > 0 {
                    self.selected_index -= 1;
                }
            }
            Action::Down => {
                if self.selected_index < FEATURES.len() - 1 {
                    self.selected_index += 1;
                }
            }
            Action::PreviousValue => self.cycle_value(false),
            Action::NextValue => self.cycle_value(true),
            Action::Select => {
                if let Some(slot) = self.selected_slot().filter(|slot| !slot.values.is_empty()) {
                    let cursor = slot.selected_position().unwrap_or(0);
                    self.dialog = Dialog::SelectValue { cursor };
                }
            }
            Action::Save => self.queue(Command::Save),
            Action::Refresh => self.queue(Command::Refresh),
            Action::Reset => {
                if self.session.is_open() {
                    self.dialog = Dialog::ConfirmReset;
                }
            }
            Action::FactoryReset => {
                if self.session.is_open() {
                    self.dialog = Dialog::ConfirmFactoryReset;
                }
            }
            Action::ShowHelp => self.dialog = Dialog::Help,
            Action::Confirm | Action::CloseDialog | Action::None => {}
        }
    }

    fn handle_picker_action(&mut self, action: Action, cursor: usize) {
        let count = self.selected_slot().map_or(0, |slot| slot.values.len());
        match action {
            Action::Up => {
                self.dialog = Dialog::SelectValue {
                    cursor: cursor.saturating_sub(1),
                };
            }
            Action::Down => {
                if cursor + 1 < count {
                    self.dialog = Dialog::SelectValue { cursor: cursor + 1 };
                }
            }
            Action::Select | Action::Confirm => {
                self.dialog = Dialog::None;
                let value = self
                    .selected_slot()
                    .and_then(|slot| slot.values.get(cursor))
                    .cloned();
                if let Some(value) = value {
                    self.apply_selection(&value);
                }
            }
            Action::CloseDialog | Action::Quit => self.dialog = Dialog::None,
            _ => {}
        }
    }

    fn handle_confirm_action(&mut self, action: Action, command: Command) {
        match action {
            Action::Select | Action::Confirm => {
                self.dialog = Dialog::None;
                self.queue(command);
            }
            Action::CloseDialog | Action::Quit => self.dialog = Dialog::None,
            _ => {}
        }
    }

    fn queue(&mut self, command: Command) {
        self.pending = Some(command);
        self.message = Some(StatusMessage::info(command.progress()));
    }

    /// Step the highlighted feature's selection through its values, wrapping
    fn cycle_value(&mut self, forward: bool) {
        let Some(slot) = self.selected_slot() else {
            return;
        };
        let count = slot.values.len();
        if count == 0 {
            return;
        }

        let next = match (slot.selected_position(), forward) {
            (Some(position), true) => (position + 1) % count,
            (Some(position), false) => (position + count - 1) % count,
            (None, true) => 0,
            (None, false) => count - 1,
        };
        let value = slot.values[next].clone();
        self.apply_selection(&value);
    }

    fn apply_selection(&mut self, value: &str) {
        let feature = self.selected_feature();
        if self.session.select(feature, value) {
            self.modified = true;
            debug!("{} = {}", feature, value);
            self.message = Some(StatusMessage::info(format!(
                "{} = {} (press s to save)",
                feature, value
            )));
        }
    }

    /// Execute the queued device operation, if any
    pub fn run_pending(&mut self) {
        let Some(command) = self.pending.take() else {
            return;
        };

        let result = match command {
            Command::Save => self.session.save(),
            Command::Refresh => self.session.initialize(&self.bus),
            Command::Reset => self
                .session
                .reset_and_reinitialize(&self.bus, self.timing.reset_settle()),
            Command::FactoryReset => self
                .session
                .factory_reset_and_reinitialize(&self.bus, self.timing.factory_reset_settle()),
        };

        self.message = Some(match result {
            Ok(()) => {
                self.modified = false;
                info!("{:?} completed", command);
                StatusMessage::info(match command {
                    Command::Save => "Configuration saved",
                    Command::Refresh => "Device configuration read",
                    Command::Reset => "Device reset",
                    Command::FactoryReset => "Factory defaults restored",
                })
            }
            Err(e) => {
                warn!("{:?} failed: {}", command, e);
                StatusMessage::error(e.to_string())
            }
        });
    }
}

/// Terminal wrapper for setup/teardown
pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Tui {
    /// Create and initialize the terminal
    pub fn new() -> Result<Self> {
        let backend = CrosstermBackend::new(io::stdout());
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }

    /// Enter TUI mode (raw mode, alternate screen)
    pub fn enter(&mut self) -> Result<()> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        self.terminal.hide_cursor()?;
        self.terminal.clear()?;
        Ok(())
    }

    /// Exit TUI mode (restore terminal state)
    pub fn exit(&mut self) -> Result<()> {
        disable_raw_mode()?;
        execute!(io::stdout(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }

    /// Draw the UI
    pub fn draw<B: UsbBus>(&mut self, app: &App<B>) -> Result<()> {
        self.terminal.draw(|frame| {
            ui::render(frame, app);
        })?;
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        // Best effort cleanup
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Run the TUI application
///
/// Opens the device once up front; a missing device is reported in the
/// message line and can be retried with refresh.
pub fn run<B: UsbBus>(bus: B, session: DeviceSession<B::Handle>, timing: TimingSettings) -> Result<()> {
    let mut tui = Tui::new()?;
    tui.enter()?;

    let mut app = App::new(bus, session, timing);
    app.queue(Command::Refresh);

    let mut events = EventHandler::new(Duration::from_millis(250));

    loop {
        if let Err(e) = tui.draw(&app) {
            error!("Failed to draw UI: {:#}", e);
            break;
        }

        // Drawn once with the progress message before blocking
        if app.pending().is_some() {
            app.run_pending();
            continue;
        }

        match events.next()? {
            Event::Key(key) => app.handle_action(Action::from(key)),
            Event::Resize(width, height) => {
                debug!("Terminal resized to {}x{}", width, height);
            }
            Event::Tick => {}
        }

        if app.should_quit() {
            break;
        }
    }

    tui.exit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{DeviceScript, MockBus};

    fn create_app(script: DeviceScript) -> App<MockBus> {
        let timing = TimingSettings {
            reset_settle_ms: 0,
            factory_reset_settle_ms: 0,
            batch_reset_settle_ms: 0,
        };
        let mut app = App::new(MockBus::new(script), DeviceSession::default(), timing);
        app.handle_action(Action::Refresh);
        app.run_pending();
        app
    }

    #[test]
    fn test_initial_refresh_opens_device() {
        let app = create_app(DeviceScript::audio_widget());

        assert!(app.session().is_open());
        assert_eq!(
            app.message(),
            Some(&StatusMessage::info("Device configuration read"))
        );
        assert_eq!(app.selected_feature(), FeatureId(0));
    }

    #[test]
    fn test_missing_device_reported() {
        let timing = TimingSettings::default();
        let mut app = App::new(MockBus::empty(), DeviceSession::default(), timing);
        app.handle_action(Action::Refresh);
        app.run_pending();

        let message = app.message().unwrap();
        assert!(message.is_error);
        assert_eq!(message.text, "Audio-Widget device not found");

        // reset needs an open device
        app.handle_action(Action::Reset);
        assert_eq!(app.dialog(), &Dialog::None);
    }

    #[test]
    fn test_navigation() {
        let mut app = create_app(DeviceScript::audio_widget());

        app.handle_action(Action::Up);
        assert_eq!(app.selected_index(), 0);

        for _ in 0..20 {
            app.handle_action(Action::Down);
        }
        assert_eq!(app.selected_index(), FEATURES.len() - 1);

        app.handle_action(Action::Up);
        assert_eq!(app.selected_feature(), FeatureId(8));
    }

    #[test]
    fn test_cycle_value_wraps() {
        let mut app = create_app(DeviceScript::audio_widget());
        let selected = |app: &App<MockBus>| app.selected_slot().unwrap().selected.clone();

        assert_eq!(selected(&app).as_deref(), Some("AB-1.x"));
        app.handle_action(Action::PreviousValue);
        assert_eq!(selected(&app).as_deref(), Some("QNKTC_future"));
        app.handle_action(Action::NextValue);
        assert_eq!(selected(&app).as_deref(), Some("AB-1.x"));
        app.handle_action(Action::NextValue);
        assert_eq!(selected(&app).as_deref(), Some("USB9023"));
        assert!(app.is_modified());
    }

    #[test]
    fn test_cycle_on_empty_feature_is_noop() {
        let mut app = create_app(DeviceScript::audio_widget());
        for _ in 0..5 {
            app.handle_action(Action::Down);
        }

        app.handle_action(Action::NextValue);
        assert!(!app.is_modified());
        app.handle_action(Action::Select);
        assert_eq!(app.dialog(), &Dialog::None);
    }

    #[test]
    fn test_value_picker() {
        let mut app = create_app(DeviceScript::audio_widget());
        app.handle_action(Action::Down);

        app.handle_action(Action::Select);
        // uac2_audio is the second value of ImageType
        assert_eq!(app.dialog(), &Dialog::SelectValue { cursor: 1 });

        app.handle_action(Action::Down);
        app.handle_action(Action::Down);
        app.handle_action(Action::Down);
        assert_eq!(app.dialog(), &Dialog::SelectValue { cursor: 3 });

        app.handle_action(Action::Select);
        assert_eq!(app.dialog(), &Dialog::None);
        assert_eq!(
            app.selected_slot().unwrap().selected.as_deref(),
            Some("uac2_dg8saq")
        );
    }

    #[test]
    fn test_value_picker_cancel() {
        let mut app = create_app(DeviceScript::audio_widget());

        app.handle_action(Action::Select);
        app.handle_action(Action::Down);
        app.handle_action(Action::CloseDialog);

        assert_eq!(app.dialog(), &Dialog::None);
        assert!(!app.is_modified());
        assert!(!app.should_quit());
    }

    #[test]
    fn test_save_writes_selection() {
        let mut app = create_app(DeviceScript::audio_widget());
        app.handle_action(Action::NextValue);

        app.handle_action(Action::Save);
        assert_eq!(app.pending(), Some(Command::Save));
        app.run_pending();

        assert_eq!(app.pending(), None);
        assert!(!app.is_modified());
        assert_eq!(app.bus.script().current.get(&0), Some(&1));
    }

    #[test]
    fn test_save_failure_shown() {
        let script = DeviceScript::audio_widget().failing_on(0x71, 3, 2);
        let mut app = create_app(script);

        app.handle_action(Action::Save);
        app.run_pending();

        let message = app.message().unwrap();
        assert!(message.is_error);
        assert_eq!(message.text, "Failed to save BoardType");
    }

    #[test]
    fn test_reset_requires_confirmation() {
        let mut app = create_app(DeviceScript::audio_widget());
        app.bus.log().clear();

        app.handle_action(Action::Reset);
        assert_eq!(app.dialog(), &Dialog::ConfirmReset);
        app.handle_action(Action::CloseDialog);
        assert_eq!(app.pending(), None);

        app.handle_action(Action::Reset);
        app.handle_action(Action::Confirm);
        assert_eq!(app.pending(), Some(Command::Reset));
        app.run_pending();

        assert_eq!(app.bus.log().setups()[0].request, 0x0F);
        assert!(app.session().is_open());
    }

    #[test]
    fn test_factory_reset_confirmed_with_enter() {
        let mut app = create_app(DeviceScript::audio_widget());
        app.bus.log().clear();

        app.handle_action(Action::FactoryReset);
        assert_eq!(app.dialog(), &Dialog::ConfirmFactoryReset);
        app.handle_action(Action::Select);
        app.run_pending();

        let setup = app.bus.log().setups()[0];
        assert_eq!((setup.request, setup.value), (0x41, 0xFF));
        assert_eq!(
            app.message(),
            Some(&StatusMessage::info("Factory defaults restored"))
        );
    }

    #[test]
    fn test_quit_closes_dialog_first() {
        let mut app = create_app(DeviceScript::audio_widget());

        app.handle_action(Action::ShowHelp);
        assert_eq!(app.dialog(), &Dialog::Help);

        app.handle_action(Action::Quit);
        assert_eq!(app.dialog(), &Dialog::None);
        assert!(!app.should_quit());

        app.handle_action(Action::Quit);
        assert!(app.should_quit());
    }
}
