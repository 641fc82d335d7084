//! TUI rendering with ratatui
//!
//! Layout: device status bar, feature table, message line and key help,
//! with dialogs drawn on top.

use protocol::{FEATURES, UsbBus};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap},
};

use super::app::{App, Dialog};

/// Main render function
pub fn render<B: UsbBus>(frame: &mut Frame, app: &App<B>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Status bar
            Constraint::Min(8),    // Feature table
            Constraint::Length(3), // Message line
            Constraint::Length(3), // Help bar
        ])
        .split(frame.area());

    render_status_bar(frame, app, chunks[0]);
    render_feature_table(frame, app, chunks[1]);
    render_message(frame, app, chunks[2]);
    render_help_bar(frame, chunks[3]);

    match app.dialog() {
        Dialog::None => {}
        Dialog::Help => render_help_dialog(frame),
        Dialog::SelectValue { cursor } => render_value_picker(frame, app, *cursor),
        Dialog::ConfirmReset => render_confirm_dialog(
            frame,
            " Confirm Reset ",
            "Reset the device and reload its configuration?",
        ),
        Dialog::ConfirmFactoryReset => render_confirm_dialog(
            frame,
            " Confirm Factory Reset ",
            "Restore factory defaults? All saved features are lost.",
        ),
    }
}

fn label(text: &str) -> Span<'static> {
    Span::styled(text.to_string(), Style::default().fg(Color::DarkGray))
}

fn key_hint(key: &'static str) -> Span<'static> {
    Span::styled(
        key,
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )
}

/// Render the status bar (top panel)
fn render_status_bar<B: UsbBus>(frame: &mut Frame, app: &App<B>, area: Rect) {
    let status_text = match app.session().identity() {
        Some(identity) => vec![
            label("Product: "),
            Span::styled(
                identity.product.clone().unwrap_or_default(),
                Style::default().fg(Color::Cyan),
            ),
            Span::raw("  |  "),
            label("Manufacturer: "),
            Span::styled(
                identity.manufacturer.clone().unwrap_or_default(),
                Style::default().fg(Color::White),
            ),
            Span::raw("  |  "),
            label("Serial: "),
            Span::styled(
                identity.serial_number.clone().unwrap_or_default(),
                Style::default().fg(Color::White),
            ),
            Span::raw("  |  "),
            Span::styled(
                format!(
                    "{:04x}:{:04x}",
                    identity.device.vendor_id, identity.device.product_id
                ),
                Style::default().fg(Color::Green),
            ),
        ],
        None => vec![Span::styled(
            "Audio-Widget device not found",
            Style::default().fg(Color::Red),
        )],
    };

    let status = Paragraph::new(Line::from(status_text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Audio-Widget Control ")
                .title_alignment(Alignment::Center)
                .border_style(Style::default().fg(Color::Blue)),
        )
        .alignment(Alignment::Center);

    frame.render_widget(status, area);
}

/// Render the feature table (center panel)
fn render_feature_table<B: UsbBus>(frame: &mut Frame, app: &App<B>, area: Rect) {
    let catalog = app.session().catalog();

    let header_cells = ["Feature", "Value", "Choices"].iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = FEATURES
        .iter()
        .map(|descriptor| {
            let slot = catalog.slot(descriptor.id);
            let count = slot.map_or(0, |slot| slot.values.len());
            let (value, value_style) = match slot.and_then(|slot| slot.selected.clone()) {
                Some(value) => (value, Style::default().fg(Color::Green)),
                None => ("-".to_string(), Style::default().fg(Color::DarkGray)),
            };

            Row::new(vec![
                Cell::from(descriptor.name),
                Cell::from(value).style(value_style),
                Cell::from(count.to_string()),
            ])
        })
        .collect();

    let title = if app.is_modified() {
        " Features (modified) "
    } else {
        " Features "
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(12), // Feature
            Constraint::Min(20),    // Value
            Constraint::Length(8),  // Choices
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Style::default().fg(Color::Blue)),
    )
    .row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    let mut state = TableState::default();
    state.select(Some(app.selected_index()));

    frame.render_stateful_widget(table, area, &mut state);
}

/// Render the outcome of the last action
fn render_message<B: UsbBus>(frame: &mut Frame, app: &App<B>, area: Rect) {
    let line = match app.message() {
        Some(message) if message.is_error => {
            Line::from(Span::styled(message.text.clone(), Style::default().fg(Color::Red)))
        }
        Some(message) => Line::from(Span::raw(message.text.clone())),
        None => Line::from(""),
    };

    let paragraph = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(paragraph, area);
}

/// Render the help bar (bottom panel)
fn render_help_bar(frame: &mut Frame, area: Rect) {
    let help_text = vec![
        key_hint("q"),
        Span::raw(" Quit  "),
        key_hint("j/k"),
        Span::raw(" Navigate  "),
        key_hint("h/l"),
        Span::raw(" Change  "),
        key_hint("Enter"),
        Span::raw(" Choose  "),
        key_hint("s"),
        Span::raw(" Save  "),
        key_hint("r"),
        Span::raw(" Refresh  "),
        key_hint("R"),
        Span::raw(" Reset  "),
        key_hint("?"),
        Span::raw(" Help"),
    ];

    let help = Paragraph::new(Line::from(help_text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .alignment(Alignment::Center);

    frame.render_widget(help, area);
}

/// Render the help dialog
fn render_help_dialog(frame: &mut Frame) {
    let area = centered_rect(60, 70, frame.area());

    let section = |title: &'static str| {
        Line::from(Span::styled(
            title,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ))
    };
    let entry = |keys: &'static str, text: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {:<13}", keys), Style::default().fg(Color::Cyan)),
            Span::raw(text),
        ])
    };

    let help_content = vec![
        section("Navigation"),
        Line::from(""),
        entry("Up / k", "Move selection up"),
        entry("Down / j", "Move selection down"),
        Line::from(""),
        section("Features"),
        Line::from(""),
        entry("Left / h", "Previous value"),
        entry("Right / l", "Next value"),
        entry("Enter", "Choose from all values"),
        entry("s", "Save selections to the device"),
        entry("r", "Re-read the device"),
        Line::from(""),
        section("Device"),
        Line::from(""),
        entry("R", "Reset device"),
        entry("F", "Restore factory defaults"),
        Line::from(""),
        entry("?", "Show this help"),
        entry("Esc", "Close dialog"),
        entry("q / Ctrl+C", "Quit"),
    ];

    let paragraph = Paragraph::new(help_content)
        .block(
            Block::default()
                .title(" Help ")
                .title_alignment(Alignment::Center)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

/// Render the value picker for the highlighted feature
fn render_value_picker<B: UsbBus>(frame: &mut Frame, app: &App<B>, cursor: usize) {
    let area = centered_rect(40, 50, frame.area());

    let Some(slot) = app.selected_slot() else {
        return;
    };
    let items: Vec<ListItem> = slot
        .values
        .iter()
        .map(|value| {
            let marker = if slot.selected.as_deref() == Some(value.as_str()) {
                "* "
            } else {
                "  "
            };
            ListItem::new(format!("{}{}", marker, value))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .title(format!(" {} ", app.selected_feature()))
                .title_alignment(Alignment::Center)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    state.select(Some(cursor));

    frame.render_widget(Clear, area);
    frame.render_stateful_widget(list, area, &mut state);
}

/// Render a yes/no confirmation dialog
fn render_confirm_dialog(frame: &mut Frame, title: &'static str, question: &'static str) {
    let area = centered_rect(40, 20, frame.area());

    let content = vec![
        Line::from(Span::styled(question, Style::default().fg(Color::White))),
        Line::from(""),
        Line::from(vec![
            Span::styled("y / Enter", Style::default().fg(Color::Red)),
            Span::raw(" to confirm"),
        ]),
        Line::from(vec![
            Span::styled("Esc", Style::default().fg(Color::Green)),
            Span::raw(" to cancel"),
        ]),
    ];

    let paragraph = Paragraph::new(content)
        .block(
            Block::default()
                .title(title)
                .title_alignment(Alignment::Center)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false });

    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

/// Helper function to create a centered rectangle
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingSettings;
    use crate::tui::events::Action;
    use common::test_utils::{DeviceScript, MockBus};
    use protocol::DeviceSession;
    use ratatui::{Terminal, backend::TestBackend};

    fn screen<B: UsbBus>(app: &App<B>) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();

        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_centered_rect() {
        let area = Rect::new(0, 0, 100, 50);
        let centered = centered_rect(50, 50, area);

        assert!(centered.x > 0);
        assert!(centered.y > 0);
        assert!(centered.width < 100);
        assert!(centered.height < 50);
    }

    #[test]
    fn test_render_without_device() {
        let app = App::new(MockBus::empty(), DeviceSession::default(), TimingSettings::default());
        let text = screen(&app);

        assert!(text.contains("Audio-Widget device not found"));
        assert!(text.contains("BoardType"));
        assert!(text.contains("LQuirkType"));
    }

    #[test]
    fn test_render_feature_table() {
        let mut app = App::new(
            MockBus::new(DeviceScript::audio_widget()),
            DeviceSession::default(),
            TimingSettings::default(),
        );
        app.handle_action(Action::Refresh);
        app.run_pending();
        let text = screen(&app);

        assert!(text.contains("Audio-Widget"));
        assert!(text.contains("SDR-Widget"));
        assert!(text.contains("16c0:03e8"));
        assert!(text.contains("uac2_audio"));
        assert!(text.contains("Device configuration read"));
    }

    #[test]
    fn test_render_value_picker() {
        let mut app = App::new(
            MockBus::new(DeviceScript::audio_widget()),
            DeviceSession::default(),
            TimingSettings::default(),
        );
        app.handle_action(Action::Refresh);
        app.run_pending();
        app.handle_action(Action::Select);
        let text = screen(&app);

        assert!(text.contains("* AB-1.x"));
        assert!(text.contains("QNKTC_future"));
    }
}
