//! Per-window render layers.
//!
//! A layer is the fully drawn rectangular image of one window — border,
//! title badge, buttons, and the VT grid — in host-cell form. Layers are
//! cached by the renderer and rebuilt only when a window's dirty flags or
//! placement key change; composition then clips them onto the frame.

use ratatui::buffer::Cell as BufCell;
use ratatui::style::{Color, Modifier};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;
use vte::ansi::{Color as VtColor, NamedColor};

use crate::config::{Config, TitlePosition};
use crate::term::{CellAttrs, TermModes, Vt};
use crate::window::Window;

/// Border glyph set.
#[derive(Debug, Clone, Copy)]
pub struct BorderChars {
    /// Top-left corner.
    pub tl: &'static str,
    /// Top-right corner.
    pub tr: &'static str,
    /// Bottom-left corner.
    pub bl: &'static str,
    /// Bottom-right corner.
    pub br: &'static str,
    /// Horizontal edge.
    pub h: &'static str,
    /// Vertical edge.
    pub v: &'static str,
}

/// Pick border glyphs from the configured style.
pub fn border_chars(config: &Config) -> BorderChars {
    if config.ascii_only {
        return BorderChars { tl: "+", tr: "+", bl: "+", br: "+", h: "-", v: "|" };
    }
    match config.border_style.as_str() {
        "plain" => BorderChars { tl: "┌", tr: "┐", bl: "└", br: "┘", h: "─", v: "│" },
        "double" => BorderChars { tl: "╔", tr: "╗", bl: "╚", br: "╝", h: "═", v: "║" },
        "thick" => BorderChars { tl: "┏", tr: "┓", bl: "┗", br: "┛", h: "━", v: "┃" },
        _ => BorderChars { tl: "╭", tr: "╮", bl: "╰", br: "╯", h: "─", v: "│" },
    }
}

/// A rendered window image.
#[derive(Debug, Clone)]
pub struct Layer {
    /// Width in cells.
    pub width: u16,
    /// Height in cells.
    pub height: u16,
    cells: Vec<BufCell>,
}

impl Layer {
    fn blank(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            cells: vec![BufCell::default(); width as usize * height as usize],
        }
    }

    /// Cell at layer-local coordinates.
    pub fn cell(&self, x: u16, y: u16) -> Option<&BufCell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(y as usize * self.width as usize + x as usize)
    }

    fn cell_mut(&mut self, x: u16, y: u16) -> Option<&mut BufCell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells
            .get_mut(y as usize * self.width as usize + x as usize)
    }

    fn put(&mut self, x: u16, y: u16, symbol: &str, fg: Color, bg: Color, modifier: Modifier) {
        if let Some(cell) = self.cell_mut(x, y) {
            cell.set_symbol(symbol);
            cell.set_fg(fg);
            cell.set_bg(bg);
            cell.set_style(ratatui::style::Style::default().fg(fg).bg(bg).add_modifier(modifier));
        }
    }

    /// Write a string starting at `(x, y)`, clipping at the layer edge.
    fn put_str(&mut self, x: u16, y: u16, text: &str, fg: Color, bg: Color) {
        let mut col = x;
        for ch in text.chars() {
            if col >= self.width {
                break;
            }
            self.put(col, y, ch.to_string().as_str(), fg, bg, Modifier::empty());
            col += UnicodeWidthStr::width(ch.to_string().as_str()).max(1) as u16;
        }
    }
}

/// Convert an emulator color to a host color.
pub fn to_host_color(color: VtColor) -> Color {
    match color {
        VtColor::Named(named) => named_to_host(named),
        VtColor::Indexed(index) => Color::Indexed(index),
        VtColor::Spec(rgb) => Color::Rgb(rgb.r, rgb.g, rgb.b),
    }
}

fn named_to_host(named: NamedColor) -> Color {
    match named {
        NamedColor::Black | NamedColor::DimBlack => Color::Indexed(0),
        NamedColor::Red | NamedColor::DimRed => Color::Indexed(1),
        NamedColor::Green | NamedColor::DimGreen => Color::Indexed(2),
        NamedColor::Yellow | NamedColor::DimYellow => Color::Indexed(3),
        NamedColor::Blue | NamedColor::DimBlue => Color::Indexed(4),
        NamedColor::Magenta | NamedColor::DimMagenta => Color::Indexed(5),
        NamedColor::Cyan | NamedColor::DimCyan => Color::Indexed(6),
        NamedColor::White | NamedColor::DimWhite => Color::Indexed(7),
        NamedColor::BrightBlack => Color::Indexed(8),
        NamedColor::BrightRed => Color::Indexed(9),
        NamedColor::BrightGreen => Color::Indexed(10),
        NamedColor::BrightYellow => Color::Indexed(11),
        NamedColor::BrightBlue => Color::Indexed(12),
        NamedColor::BrightMagenta => Color::Indexed(13),
        NamedColor::BrightCyan => Color::Indexed(14),
        NamedColor::BrightWhite => Color::Indexed(15),
        _ => Color::Reset,
    }
}

fn attr_modifiers(attrs: CellAttrs) -> Modifier {
    let mut m = Modifier::empty();
    if attrs.contains(CellAttrs::BOLD) {
        m |= Modifier::BOLD;
    }
    if attrs.contains(CellAttrs::FAINT) {
        m |= Modifier::DIM;
    }
    if attrs.contains(CellAttrs::ITALIC) {
        m |= Modifier::ITALIC;
    }
    if attrs.contains(CellAttrs::UNDERLINE) {
        m |= Modifier::UNDERLINED;
    }
    if attrs.contains(CellAttrs::BLINK) {
        m |= Modifier::SLOW_BLINK;
    }
    if attrs.contains(CellAttrs::INVERSE) {
        m |= Modifier::REVERSED;
    }
    if attrs.contains(CellAttrs::CONCEAL) {
        m |= Modifier::HIDDEN;
    }
    if attrs.contains(CellAttrs::STRIKETHROUGH) {
        m |= Modifier::CROSSED_OUT;
    }
    m
}

/// Build a window's layer: border frame, title badge, buttons, grid, and
/// the cursor cell when focused.
pub fn render_window(window: &Window, focused: bool, config: &Config) -> Layer {
    let width = window.bounds.w;
    let height = window.bounds.h;
    let mut layer = Layer::blank(width, height);

    let border_fg = if focused { Color::Cyan } else { Color::DarkGray };
    let chars = border_chars(config);

    // Frame.
    for x in 0..width {
        layer.put(x, 0, chars.h, border_fg, Color::Reset, Modifier::empty());
        layer.put(x, height - 1, chars.h, border_fg, Color::Reset, Modifier::empty());
    }
    for y in 0..height {
        layer.put(0, y, chars.v, border_fg, Color::Reset, Modifier::empty());
        layer.put(width - 1, y, chars.v, border_fg, Color::Reset, Modifier::empty());
    }
    layer.put(0, 0, chars.tl, border_fg, Color::Reset, Modifier::empty());
    layer.put(width - 1, 0, chars.tr, border_fg, Color::Reset, Modifier::empty());
    layer.put(0, height - 1, chars.bl, border_fg, Color::Reset, Modifier::empty());
    layer.put(width - 1, height - 1, chars.br, border_fg, Color::Reset, Modifier::empty());

    // Title badge.
    if config.window_title_position != TitlePosition::Hidden {
        let row = match config.window_title_position {
            TitlePosition::Bottom => height - 1,
            _ => 0,
        };
        let name = window.display_name();
        let max = width.saturating_sub(6) as usize;
        // Truncate on grapheme boundaries so combining marks stay whole.
        let graphemes: Vec<&str> = name.graphemes(true).collect();
        let badge: String = if graphemes.len() > max {
            graphemes[..max.saturating_sub(1)].concat() + "…"
        } else {
            name
        };
        let text = format!(" {badge} ");
        layer.put_str(2, row, &text, border_fg, Color::Reset);
    }

    // Window buttons on the top border.
    if !config.hide_window_buttons && width > 10 {
        let buttons = if config.ascii_only { " - x " } else { " ─ ✕ " };
        let x = width - 1 - buttons.chars().count() as u16;
        layer.put_str(x, 0, buttons, border_fg, Color::Reset);
    }

    // Grid content.
    if let Ok(vt) = window.vt.lock() {
        paint_grid(&mut layer, &vt, focused);
    }

    layer
}

fn paint_grid(layer: &mut Layer, vt: &Vt, focused: bool) {
    let screen = vt.screen();
    let interior_w = layer.width.saturating_sub(2) as usize;
    let interior_h = layer.height.saturating_sub(2) as usize;

    for (row_idx, row) in screen.rows().iter().enumerate().take(interior_h) {
        for (col_idx, cell) in row.cells().iter().enumerate().take(interior_w) {
            if cell.attrs.contains(CellAttrs::WIDE_SPACER) {
                continue;
            }
            let x = col_idx as u16 + 1;
            let y = row_idx as u16 + 1;
            let fg = to_host_color(cell.fg);
            let bg = to_host_color(cell.bg);
            let modifier = attr_modifiers(cell.attrs);
            layer.put(x, y, &cell.grapheme(), fg, bg, modifier);
        }
    }

    // Cursor as a reversed cell when visible.
    let cursor = &screen.cursor;
    if focused && cursor.visible && vt.modes().contains(TermModes::SHOW_CURSOR) {
        let x = cursor.col.min(interior_w.saturating_sub(1)) as u16 + 1;
        let y = cursor.row.min(interior_h.saturating_sub(1)) as u16 + 1;
        if let Some(cell) = layer.cell_mut(x, y) {
            let style = cell.style().add_modifier(Modifier::REVERSED);
            cell.set_style(style);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Rect;

    fn window() -> Window {
        Window::new(Rect::new(0, 0, 30, 10), 1, 100)
    }

    #[test]
    fn layer_matches_window_size() {
        let w = window();
        let layer = render_window(&w, false, &Config::default());
        assert_eq!(layer.width, 30);
        assert_eq!(layer.height, 10);
    }

    #[test]
    fn border_corners_present() {
        let w = window();
        let layer = render_window(&w, true, &Config::default());
        assert_eq!(layer.cell(0, 0).unwrap().symbol(), "╭");
        assert_eq!(layer.cell(29, 0).unwrap().symbol(), "╮");
        assert_eq!(layer.cell(0, 9).unwrap().symbol(), "╰");
        assert_eq!(layer.cell(29, 9).unwrap().symbol(), "╯");
    }

    #[test]
    fn ascii_only_borders() {
        let w = window();
        let config = Config {
            ascii_only: true,
            ..Config::default()
        };
        let layer = render_window(&w, false, &config);
        assert_eq!(layer.cell(0, 0).unwrap().symbol(), "+");
        assert_eq!(layer.cell(5, 0).unwrap().symbol(), "-");
    }

    #[test]
    fn grid_content_lands_inside_border() {
        let w = window();
        {
            let mut vt = w.vt.lock().unwrap();
            vt.write(b"hi");
        }
        let layer = render_window(&w, false, &Config::default());
        assert_eq!(layer.cell(1, 1).unwrap().symbol(), "h");
        assert_eq!(layer.cell(2, 1).unwrap().symbol(), "i");
    }

    #[test]
    fn title_badge_on_top_border() {
        let mut w = window();
        w.custom_name = Some("build".to_string());
        let layer = render_window(&w, false, &Config::default());
        let border: String = (0..layer.width)
            .map(|x| layer.cell(x, 0).unwrap().symbol().to_string())
            .collect();
        assert!(border.contains("build"));
    }

    #[test]
    fn hidden_title_skips_badge() {
        let mut w = window();
        w.custom_name = Some("build".to_string());
        let config = Config {
            window_title_position: TitlePosition::Hidden,
            ..Config::default()
        };
        let layer = render_window(&w, false, &config);
        let border: String = (0..layer.width)
            .map(|x| layer.cell(x, 0).unwrap().symbol().to_string())
            .collect();
        assert!(!border.contains("build"));
    }

    #[test]
    fn styled_cells_carry_modifiers() {
        let w = window();
        {
            let mut vt = w.vt.lock().unwrap();
            vt.write(b"\x1b[1;31mX");
        }
        let layer = render_window(&w, false, &Config::default());
        let cell = layer.cell(1, 1).unwrap();
        assert_eq!(cell.symbol(), "X");
        assert_eq!(cell.fg, Color::Indexed(1));
        assert!(cell.modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn color_conversion() {
        assert_eq!(to_host_color(VtColor::Indexed(42)), Color::Indexed(42));
        assert_eq!(
            to_host_color(VtColor::Spec(vte::ansi::Rgb { r: 1, g: 2, b: 3 })),
            Color::Rgb(1, 2, 3)
        );
        assert_eq!(
            to_host_color(VtColor::Named(NamedColor::BrightBlue)),
            Color::Indexed(12)
        );
    }
}
