use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

use crate::app::{App, ModelStatus};

/// Model loading progress, and the place errors show up before the camera runs.
pub fn render_loader(frame: &mut Frame, app: &App, area: Rect) {
    let dialog_width = 44.min(area.width.saturating_sub(4));
    let dialog_height = 5.min(area.height.saturating_sub(2));

    let x = area.x + (area.width.saturating_sub(dialog_width)) / 2;
    let y = area.y + (area.height.saturating_sub(dialog_height)) / 2;
    let dialog_area = Rect::new(x, y, dialog_width, dialog_height);

    frame.render_widget(Clear, dialog_area);

    let (color, hint) = match app.model_status {
        ModelStatus::Loading => (Color::Cyan, ""),
        ModelStatus::Ready => (Color::Green, "Space to start the camera"),
        ModelStatus::Failed => (Color::Red, "q to quit"),
    };

    let step = match (app.model_status, app.load_step.as_deref()) {
        (ModelStatus::Ready, _) | (_, None) => String::new(),
        (_, Some(step)) => format!("model {}", step),
    };

    let text = vec![
        Line::from(Span::styled(
            app.loading_status.as_str(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(step, Style::default().fg(Color::DarkGray))),
        Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))),
    ];

    let paragraph = Paragraph::new(text)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(" moodcam ")
                .title_style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, dialog_area);
}
