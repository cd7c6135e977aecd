mod dialogs;
mod status_bar;
mod summary;
pub mod video;

use ratatui::prelude::*;

use crate::app::App;

/// Width of the expression summary column.
const SUMMARY_WIDTH: u16 = 24;

pub fn render(frame: &mut Frame, app: &mut App) {
    let area = frame.area();

    // Main layout: content area + status bar
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(SUMMARY_WIDTH)])
        .split(main_chunks[0]);

    video::render(frame, app, content_chunks[0]);
    summary::render(frame, app, content_chunks[1]);
    status_bar::render(frame, app, main_chunks[1]);

    if app.loader_visible {
        dialogs::render_loader(frame, app, area);
    }
}
