use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};

use crate::app::App;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title("Faces");

    let mut lines = vec![Line::from(Span::styled(
        app.summary.count_label(),
        Style::default().add_modifier(Modifier::BOLD),
    ))];

    if app.summary.panel_visible() {
        lines.push(Line::from(""));
        for (expression, count) in app.summary.tally.iter() {
            let c = expression.color();
            lines.push(Line::from(vec![
                Span::styled("■ ", Style::default().fg(Color::Rgb(c[0], c[1], c[2]))),
                Span::raw(format!("{}: {}", expression, count)),
            ]));
        }
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
