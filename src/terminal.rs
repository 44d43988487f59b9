// SPDX-License-Identifier: GPL-3.0-only

//! Terminal-based QR scanner
//!
//! Shows the decoded text on the top line and the camera feed in a
//! rounded, red-bordered square below it. The feed is rendered with Unicode
//! half-block characters for improved vertical resolution.

use crate::app::ScannerApp;
use crate::app::state::ScannerState;
use crate::backends::camera::types::{CameraFrame, FrameReceiver, PixelFormat, preview_channel};
use crate::constants::timing;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, BorderType, Paragraph, Widget},
};
use std::io::{self, stdout};
use tokio::runtime::Runtime;
use tracing::info;

/// Run the interactive scanner until the user quits
pub fn run(runtime: &Runtime, app: ScannerApp) -> Result<(), Box<dyn std::error::Error>> {
    let (sender, receiver) = preview_channel();
    let mut app = app.with_preview(sender);

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, runtime, &mut app, receiver);

    app.shutdown();

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    runtime: &Runtime,
    app: &mut ScannerApp,
    mut receiver: FrameReceiver,
) -> Result<(), Box<dyn std::error::Error>> {
    let permission = runtime.block_on(app.resume());
    info!(%permission, "Scanner resumed");

    let mut frame_widget = FrameWidget::new();
    let mut show_help = false;

    loop {
        // Drain all available frames to get the latest
        while let Ok(frame) = receiver.try_recv() {
            frame_widget.update_frame(frame);
        }

        let state = app.state().snapshot();
        terminal.draw(|f| {
            let [text_area, camera_area, status_area] = Layout::vertical([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .areas(f.area());

            f.render_widget(
                Paragraph::new(state.display_text.as_str())
                    .alignment(Alignment::Center)
                    .style(Style::default().add_modifier(Modifier::BOLD)),
                text_area,
            );

            if state.should_show_camera {
                let square = square_box(camera_area);
                let block = Block::bordered()
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(Color::Red));
                let inner = block.inner(square);
                f.render_widget(block, square);
                f.render_widget(&frame_widget, inner);
            }

            let message = if show_help {
                build_help_message()
            } else {
                build_status_message(&state)
            };
            f.render_widget(StatusBar { message: &message }, status_area);
        })?;

        // Handle input with timeout for frame updates
        if event::poll(timing::UI_TICK)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                break;
            }

            match key.code {
                KeyCode::Char('q') => break,
                KeyCode::Char('f') => {
                    show_help = false;
                    app.toggle_flash();
                }
                KeyCode::Char('l') => {
                    show_help = false;
                    app.switch_lens();
                    // Old lens frames are stale
                    frame_widget = FrameWidget::new();
                }
                KeyCode::Char('h') => show_help = !show_help,
                _ => {}
            }
        }
    }

    Ok(())
}

/// Largest centered box whose interior is square in half-block pixels
fn square_box(area: Rect) -> Rect {
    let inner_height = area.height.saturating_sub(2).min(area.width.saturating_sub(2) / 2);
    let width = inner_height * 2 + 2;
    let height = inner_height + 2;
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

fn build_status_message(state: &ScannerState) -> String {
    format!(
        "Camera: {} | Torch: {} | Lens: {} | 'f' torch | 'l' lens | 'h' help | 'q' quit",
        state.permission,
        if state.flash_on { "on" } else { "off" },
        state.lens,
    )
}

fn build_help_message() -> String {
    "f: Toggle torch | l: Switch lens | h: Toggle help | q/Ctrl+C: Quit".to_string()
}

/// Widget that renders a camera frame using half-block characters
struct FrameWidget {
    frame: Option<CameraFrame>,
}

impl FrameWidget {
    fn new() -> Self {
        Self { frame: None }
    }

    fn update_frame(&mut self, frame: CameraFrame) {
        self.frame = Some(frame);
    }
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        let Some(frame) = &self.frame else {
            let msg = "Waiting for camera...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            buf.set_string(x, y, msg, Style::default());
            return;
        };
        if frame.width == 0 || frame.height == 0 {
            return;
        }

        // Each cell covers one column and two rows of the frame
        let x_scale = frame.width as f64 / area.width as f64;
        let y_scale = frame.height as f64 / (area.height as f64 * 2.0);

        for ty in 0..area.height {
            for tx in 0..area.width {
                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                let top_color = sample_pixel(frame, src_x, src_y_top);
                let bottom_color = sample_pixel(frame, src_x, src_y_bottom);

                if let Some(cell) = buf.cell_mut((area.x + tx, area.y + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(top_color);
                    cell.set_bg(bottom_color);
                }
            }
        }
    }
}

fn sample_pixel(frame: &CameraFrame, x: u32, y: u32) -> Color {
    let (r, g, b) = sample_pixel_rgb(frame, x, y);
    Color::Rgb(r, g, b)
}

fn sample_pixel_rgb(frame: &CameraFrame, x: u32, y: u32) -> (u8, u8, u8) {
    let x = x.min(frame.width.saturating_sub(1));
    let y = y.min(frame.height.saturating_sub(1));
    let data = frame.data_slice();
    let idx = (y * frame.stride + x * frame.format.bytes_per_pixel()) as usize;

    match frame.format {
        PixelFormat::RGBA | PixelFormat::RGB24 => {
            if idx + 2 < data.len() {
                (data[idx], data[idx + 1], data[idx + 2])
            } else {
                (0, 0, 0)
            }
        }
        PixelFormat::Gray8 => {
            let v = data.get(idx).copied().unwrap_or(0);
            (v, v, v)
        }
    }
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let style = Style::default().fg(Color::White).bg(Color::DarkGray);
        buf.set_style(area, style);

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(area.x, area.y, text, style);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::LensFacing;
    use crate::permission::PermissionState;

    #[test]
    fn test_square_box_is_centered_and_square() {
        let area = Rect::new(0, 1, 100, 30);
        let square = square_box(area);
        assert_eq!(square.height, 30);
        assert_eq!(square.width, 58);
        assert_eq!(square.x, 21);

        // Narrow terminal limits by width
        let square = square_box(Rect::new(0, 0, 22, 40));
        assert_eq!((square.width, square.height), (22, 12));
    }

    #[test]
    fn test_frame_widget_renders_half_blocks() {
        // Top row white, bottom row black
        let frame = CameraFrame::from_packed(2, 2, PixelFormat::Gray8, vec![255, 255, 0, 0]);
        let mut widget = FrameWidget::new();
        widget.update_frame(frame);

        let area = Rect::new(0, 0, 2, 1);
        let mut buf = Buffer::empty(area);
        (&widget).render(area, &mut buf);

        let cell = &buf[(0, 0)];
        assert_eq!(cell.symbol(), "▀");
        assert_eq!(cell.fg, Color::Rgb(255, 255, 255));
        assert_eq!(cell.bg, Color::Rgb(0, 0, 0));
    }

    #[test]
    fn test_status_message_reflects_state() {
        let mut state = ScannerState::new("Prashant", LensFacing::Front, true);
        state.permission = PermissionState::Denied;
        let message = build_status_message(&state);
        assert!(message.contains("Torch: on"));
        assert!(message.contains("Lens: front"));
        assert!(message.contains(&PermissionState::Denied.to_string()));
    }
}
