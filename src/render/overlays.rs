//! Chrome drawn over the composed windows: dockbar, clock, notification
//! bubbles, help, logs, quit confirmation, which-key, rename prompt, and
//! the tape manager placeholder.

use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Rect as TuiRect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Widget};

use crate::constants::{NOTIFICATION_FADE, WHICH_KEY_DELAY, WORKSPACE_COUNT};
use crate::layout::DockbarPosition;
use crate::wm::{InputMode, Severity, WindowManager};

/// Draw every active overlay, topmost last.
pub fn draw(wm: &WindowManager, area: TuiRect, buf: &mut Buffer) {
    draw_dockbar(wm, area, buf);
    if !wm.config.hide_clock {
        draw_clock(wm, area, buf);
    }
    draw_notifications(wm, area, buf);
    if let Some(prefix) = wm.prefix {
        if prefix.entered_at.elapsed() >= WHICH_KEY_DELAY {
            draw_which_key(wm, prefix.sub, area, buf);
        }
    }
    if wm.help_visible {
        draw_help(wm, area, buf);
    }
    if wm.logs_visible {
        draw_logs(wm, area, buf);
    }
    if wm.tape_manager_visible {
        draw_tape_manager(area, buf);
    }
    if wm.scrollback_browser_visible {
        draw_scrollback_browser(wm, area, buf);
    }
    if let Some((_, buffer)) = &wm.rename {
        draw_rename(buffer, area, buf);
    }
    if wm.quit_dialog {
        draw_quit_dialog(area, buf);
    }
}

fn dockbar_row(wm: &WindowManager, area: TuiRect) -> Option<u16> {
    match wm.config.dockbar_position {
        DockbarPosition::Top => Some(area.y),
        DockbarPosition::Bottom => Some(area.bottom().saturating_sub(1)),
        DockbarPosition::Hidden => None,
    }
}

fn draw_dockbar(wm: &WindowManager, area: TuiRect, buf: &mut Buffer) {
    let Some(row) = dockbar_row(wm, area) else {
        return;
    };
    let base = Style::default().bg(Color::Indexed(236)).fg(Color::Gray);
    for x in area.x..area.right() {
        if let Some(cell) = buf.cell_mut(ratatui::layout::Position::new(x, row)) {
            cell.set_symbol(" ");
            cell.set_style(base);
        }
    }

    // Workspace indicators.
    let mut x = area.x + 1;
    for ws in 1..=WORKSPACE_COUNT {
        let occupied = wm.windows.iter().any(|w| w.workspace == ws);
        let style = if ws == wm.current_workspace {
            base.fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else if occupied {
            base.fg(Color::White)
        } else {
            base.fg(Color::DarkGray)
        };
        buf.set_string(x, row, format!("{ws}"), style);
        x += 2;
    }

    // Minimized windows.
    let minimized: Vec<String> = wm
        .windows
        .iter()
        .filter(|w| w.workspace == wm.current_workspace && w.minimized)
        .map(|w| w.display_name())
        .collect();
    if !minimized.is_empty() {
        buf.set_string(
            x + 1,
            row,
            format!("min: {}", minimized.join(" | ")),
            base.fg(Color::Yellow),
        );
    }

    // Mode indicator on the right.
    let mode = match wm.mode {
        InputMode::WindowManagement => " WM ",
        InputMode::Terminal => " TERM ",
    };
    let mode_x = area.right().saturating_sub(mode.len() as u16 + 1);
    let mode_style = match wm.mode {
        InputMode::WindowManagement => base.fg(Color::Black).bg(Color::Cyan),
        InputMode::Terminal => base.fg(Color::Black).bg(Color::Green),
    };
    buf.set_string(mode_x, row, mode, mode_style);
}

fn draw_clock(wm: &WindowManager, area: TuiRect, buf: &mut Buffer) {
    let text = chrono::Local::now().format("%H:%M").to_string();
    let row = match wm.config.dockbar_position {
        DockbarPosition::Top => area.y,
        DockbarPosition::Bottom => area.bottom().saturating_sub(1),
        DockbarPosition::Hidden => area.y,
    };
    // Left of the mode badge.
    let x = area.right().saturating_sub(text.len() as u16 + 9);
    buf.set_string(
        x,
        row,
        text,
        Style::default().fg(Color::Gray).bg(Color::Indexed(236)),
    );
}

fn draw_notifications(wm: &WindowManager, area: TuiRect, buf: &mut Buffer) {
    for (i, notification) in wm.notifications.iter().rev().take(5).enumerate() {
        let age = notification.created.elapsed();
        let fading = notification.duration.saturating_sub(age) < NOTIFICATION_FADE;
        let fg = match (notification.severity, fading) {
            (_, true) => Color::DarkGray,
            (Severity::Info, _) => Color::Cyan,
            (Severity::Warning, _) => Color::Yellow,
            (Severity::Error, _) => Color::Red,
        };
        let text = format!(" {} ", notification.message);
        let width = (text.chars().count() as u16).min(area.width);
        let x = area.right().saturating_sub(width);
        let y = area.y + 1 + i as u16;
        if y >= area.bottom() {
            break;
        }
        buf.set_string(x, y, text, Style::default().fg(fg).bg(Color::Indexed(235)));
    }
}

/// Centered popup rect.
fn popup(area: TuiRect, width: u16, height: u16) -> TuiRect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    TuiRect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn draw_quit_dialog(area: TuiRect, buf: &mut Buffer) {
    let rect = popup(area, 40, 5);
    Clear.render(rect, buf);
    let block = Block::default()
        .title(" quit tuios? ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));
    Paragraph::new(vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  [y]es ", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
            Span::raw("   "),
            Span::styled("[n]o ", Style::default().fg(Color::Green)),
        ]),
    ])
    .alignment(Alignment::Center)
    .block(block)
    .render(rect, buf);
}

fn draw_help(wm: &WindowManager, area: TuiRect, buf: &mut Buffer) {
    let binds = crate::wm::input::default_keybinds(&wm.config.leader_key);
    let height = (binds.len() as u16 + 4).min(area.height);
    let rect = popup(area, 64, height);
    Clear.render(rect, buf);
    let lines: Vec<Line> = binds
        .iter()
        .map(|b| {
            Line::from(vec![
                Span::styled(
                    format!("{:<18}", b.keys),
                    Style::default().fg(Color::Cyan),
                ),
                Span::raw(b.action),
            ])
        })
        .collect();
    Paragraph::new(lines)
        .block(
            Block::default()
                .title(" keybindings ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .render(rect, buf);
}

fn draw_logs(wm: &WindowManager, area: TuiRect, buf: &mut Buffer) {
    let rect = popup(area, area.width.saturating_sub(8).max(40), area.height.saturating_sub(6).max(10));
    Clear.render(rect, buf);
    let visible = rect.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = wm
        .log_ring
        .iter()
        .rev()
        .take(visible)
        .map(|entry| {
            let color = match entry.severity {
                Severity::Info => Color::Gray,
                Severity::Warning => Color::Yellow,
                Severity::Error => Color::Red,
            };
            Line::from(vec![
                Span::styled(
                    entry.time.format("%H:%M:%S ").to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(entry.message.clone(), Style::default().fg(color)),
            ])
        })
        .collect();
    Paragraph::new(lines)
        .block(
            Block::default()
                .title(" logs (newest first) ")
                .borders(Borders::ALL),
        )
        .render(rect, buf);
}

fn draw_which_key(wm: &WindowManager, sub: Option<char>, area: TuiRect, buf: &mut Buffer) {
    let entries: Vec<(&str, &str)> = match sub {
        None => vec![
            ("c", "create window"),
            ("x", "close window"),
            ("n/p", "cycle focus"),
            ("d", "detach"),
            ("1-9", "workspace"),
            ("w", "workspace…"),
            ("m", "move to workspace…"),
            ("t", "tiling…"),
            ("T", "tapes…"),
            ("D", "dockbar…"),
        ],
        Some('w') | Some('m') => vec![("1-9", "workspace")],
        Some('t') => vec![
            ("t", "toggle tiling"),
            ("e", "equalize"),
            ("r", "rotate"),
            ("h/v", "preselect split"),
        ],
        Some('T') => vec![("l", "tape manager")],
        Some('D') => vec![("t/b/h", "dockbar top/bottom/hidden")],
        Some(_) => vec![],
    };
    let height = entries.len() as u16 + 2;
    let width = 36;
    let rect = TuiRect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.bottom().saturating_sub(height + 1),
        width.min(area.width),
        height.min(area.height),
    );
    Clear.render(rect, buf);
    let lines: Vec<Line> = entries
        .iter()
        .map(|(key, action)| {
            Line::from(vec![
                Span::styled(format!(" {key:<6}"), Style::default().fg(Color::Magenta)),
                Span::raw(*action),
            ])
        })
        .collect();
    let title = match sub {
        None => " prefix ".to_string(),
        Some(sub) => format!(" prefix {sub} "),
    };
    Paragraph::new(lines)
        .block(Block::default().title(title).borders(Borders::ALL))
        .render(rect, buf);
}

fn draw_rename(buffer: &str, area: TuiRect, buf: &mut Buffer) {
    let rect = popup(area, 40, 3);
    Clear.render(rect, buf);
    Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled(buffer, Style::default().fg(Color::White)),
        Span::styled("▏", Style::default().fg(Color::Cyan)),
    ]))
    .block(
        Block::default()
            .title(" rename window ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    )
    .render(rect, buf);
}

/// Command blocks reconstructed from the focused window's scrollback,
/// newest first.
fn draw_scrollback_browser(wm: &WindowManager, area: TuiRect, buf: &mut Buffer) {
    let blocks = wm
        .focused_window()
        .and_then(|w| w.vt.lock().ok().map(|vt| crate::blocks::parse_command_blocks(&vt)))
        .unwrap_or_default();

    let rect = popup(
        area,
        area.width.saturating_sub(10).max(40),
        area.height.saturating_sub(6).max(10),
    );
    Clear.render(rect, buf);
    let visible = rect.height.saturating_sub(2) as usize;
    let mut lines: Vec<Line> = Vec::new();
    if blocks.is_empty() {
        lines.push(Line::from(" no command blocks found "));
    }
    for block in blocks.iter().take(visible) {
        let marker = match block.exit_code {
            Some(0) => Span::styled("✓ ", Style::default().fg(Color::Green)),
            Some(_) => Span::styled("✗ ", Style::default().fg(Color::Red)),
            None => Span::styled("· ", Style::default().fg(Color::DarkGray)),
        };
        let preview = block.output.lines().next().unwrap_or("").to_string();
        lines.push(Line::from(vec![
            marker,
            Span::styled(block.command.clone(), Style::default().fg(Color::White)),
            Span::styled(
                if preview.is_empty() {
                    String::new()
                } else {
                    format!("  → {preview}")
                },
                Style::default().fg(Color::DarkGray),
            ),
        ]));
    }
    Paragraph::new(lines)
        .block(
            Block::default()
                .title(" scrollback (newest first) ")
                .borders(Borders::ALL),
        )
        .render(rect, buf);
}

fn draw_tape_manager(area: TuiRect, buf: &mut Buffer) {
    let names = crate::config::Config::tapes_dir()
        .ok()
        .and_then(|dir| std::fs::read_dir(dir).ok())
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "tape"))
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let rect = popup(area, 48, (names.len() as u16 + 4).max(5));
    Clear.render(rect, buf);
    let lines: Vec<Line> = if names.is_empty() {
        vec![Line::from(" no tapes recorded ")]
    } else {
        names.iter().map(|n| Line::from(format!(" {n}"))).collect()
    };
    Paragraph::new(lines)
        .block(Block::default().title(" tapes ").borders(Borders::ALL))
        .render(rect, buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::test_support::manager;
    use ratatui::layout::Position;

    fn buffer() -> (TuiRect, Buffer) {
        let area = TuiRect::new(0, 0, 120, 40);
        (area, Buffer::empty(area))
    }

    fn row_text(buf: &Buffer, area: TuiRect, y: u16) -> String {
        (area.x..area.right())
            .map(|x| buf.cell(Position::new(x, y)).unwrap().symbol().to_string())
            .collect()
    }

    #[test]
    fn dockbar_shows_workspaces_and_mode() {
        let wm = manager();
        let (area, mut buf) = buffer();
        draw(&wm, area, &mut buf);
        let bottom = row_text(&buf, area, 39);
        assert!(bottom.contains('1'));
        assert!(bottom.contains('9'));
        assert!(bottom.contains("WM"));
    }

    #[test]
    fn quit_dialog_renders_choices() {
        let mut wm = manager();
        wm.quit_dialog = true;
        let (area, mut buf) = buffer();
        draw(&wm, area, &mut buf);
        let all: String = (0..40).map(|y| row_text(&buf, area, y)).collect();
        assert!(all.contains("quit tuios?"));
        assert!(all.contains("[y]es"));
        assert!(all.contains("[n]o"));
    }

    #[test]
    fn notifications_render_newest_first() {
        let mut wm = manager();
        wm.notify(Severity::Error, "boom");
        let (area, mut buf) = buffer();
        draw(&wm, area, &mut buf);
        let row = row_text(&buf, area, 1);
        assert!(row.contains("boom"));
    }

    #[test]
    fn help_overlay_lists_bindings() {
        let mut wm = manager();
        wm.help_visible = true;
        let (area, mut buf) = buffer();
        draw(&wm, area, &mut buf);
        let all: String = (0..40).map(|y| row_text(&buf, area, y)).collect();
        assert!(all.contains("keybindings"));
        assert!(all.contains("create window"));
    }

    #[test]
    fn hidden_dockbar_leaves_rows_clean() {
        let mut wm = manager();
        wm.config.dockbar_position = crate::layout::DockbarPosition::Hidden;
        wm.config.hide_clock = true;
        let (area, mut buf) = buffer();
        draw(&wm, area, &mut buf);
        assert_eq!(row_text(&buf, area, 39).trim(), "");
    }

    #[test]
    fn which_key_appears_after_delay() {
        let mut wm = manager();
        wm.prefix = Some(crate::wm::PrefixState {
            entered_at: std::time::Instant::now() - WHICH_KEY_DELAY - std::time::Duration::from_millis(10),
            sub: None,
        });
        let (area, mut buf) = buffer();
        draw(&wm, area, &mut buf);
        let all: String = (0..40).map(|y| row_text(&buf, area, y)).collect();
        assert!(all.contains("create window"));

        // Fresh prefix: not yet shown.
        let mut wm = manager();
        wm.prefix = Some(crate::wm::PrefixState {
            entered_at: std::time::Instant::now(),
            sub: None,
        });
        let (area, mut buf) = buffer();
        draw(&wm, area, &mut buf);
        let all: String = (0..40).map(|y| row_text(&buf, area, y)).collect();
        assert!(!all.contains("create window"));
    }
}
