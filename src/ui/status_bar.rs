use ratatui::{
    prelude::*,
    widgets::Paragraph,
};

use crate::app::App;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let enabled = Style::default().fg(Color::Black).bg(Color::Cyan);
    let disabled = Style::default().fg(Color::DarkGray).bg(Color::Black);

    let mut spans = vec![
        Span::styled(
            format!(" {} ", app.toggle_label()),
            if app.toggle_enabled() { enabled } else { disabled },
        ),
        Span::raw(" "),
        Span::styled(
            " Snapshot ",
            if app.snapshot_enabled() { enabled } else { disabled },
        ),
    ];

    if let Some(ref message) = app.status_message {
        spans.push(Span::styled(
            format!(" {} ", message),
            Style::default().fg(Color::Yellow),
        ));
    }

    // Key hints on the right
    let help_text = " space:camera s:snapshot q:quit ";
    let content_len: usize = spans.iter().map(|s| s.content.chars().count()).sum();
    let padding = (area.width as usize).saturating_sub(content_len + help_text.len());
    spans.push(Span::raw(" ".repeat(padding)));
    spans.push(Span::styled(help_text, Style::default().fg(Color::DarkGray)));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
