//! Character grid
//!
//! 2D cell array that manages terminal screen state: cursor position,
//! current style, tab stops, scrolling region, modes, and the scrollback
//! history fed from the top margin.

use std::collections::{HashMap, VecDeque};

use unicode_width::UnicodeWidthChar;

/// Maximum scrollback history lines (oldest dropped first)
pub const MAX_HISTORY_LINES: usize = 5000;

/// Default tab stop spacing
const TAB_SIZE: usize = 8;

/// 24-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Pre-computed 256-color palette (compile-time generated).
/// Entries 0-15 are the Solarized-light ANSI colors, 16-231 the 6x6x6 color
/// cube, 232-255 the 24-step grayscale ramp.
const fn generate_palette() -> [Rgb; 256] {
    let mut palette = [Rgb::new(0, 0, 0); 256];

    // Solarized light
    palette[0] = Rgb::new(7, 54, 66); // black
    palette[1] = Rgb::new(220, 50, 47); // red
    palette[2] = Rgb::new(13, 153, 0); // green
    palette[3] = Rgb::new(181, 137, 0); // yellow
    palette[4] = Rgb::new(38, 139, 210); // blue
    palette[5] = Rgb::new(221, 54, 130); // magenta
    palette[6] = Rgb::new(42, 161, 152); // cyan
    palette[7] = Rgb::new(238, 232, 213); // white
    palette[8] = Rgb::new(0, 43, 54); // bright black
    palette[9] = Rgb::new(203, 75, 22); // bright red
    palette[10] = Rgb::new(88, 110, 117); // bright green
    palette[11] = Rgb::new(101, 123, 131); // bright yellow
    palette[12] = Rgb::new(131, 148, 150); // bright blue
    palette[13] = Rgb::new(108, 113, 196); // bright magenta
    palette[14] = Rgb::new(147, 161, 161); // bright cyan
    palette[15] = Rgb::new(253, 246, 227); // bright white

    // Helper for 6x6x6 color cube value
    const fn cube_val(v: u8) -> u8 {
        if v == 0 {
            0
        } else {
            55 + 40 * v
        }
    }

    // 216-color cube (16-231)
    let mut i = 16usize;
    while i < 232 {
        let n = (i - 16) as u8;
        let b = n % 6;
        let g = (n / 6) % 6;
        let r = n / 36;
        palette[i] = Rgb::new(cube_val(r), cube_val(g), cube_val(b));
        i += 1;
    }

    // Grayscale (232-255)
    let mut i = 232usize;
    while i < 256 {
        let v = (8 + 10 * (i - 232)) as u8;
        palette[i] = Rgb::new(v, v, v);
        i += 1;
    }

    palette
}

static PALETTE_256: [Rgb; 256] = generate_palette();

/// Look up a 256-color palette index
#[inline]
pub fn palette_color(index: u8) -> Rgb {
    PALETTE_256[index as usize]
}

/// Font weight (SGR 1 / 22)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontWeight {
    #[default]
    Regular,
    Bold,
}

/// Cell display attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    pub fore: Rgb,
    pub back: Rgb,
    pub weight: FontWeight,
    pub blink: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fore: PALETTE_256[0],
            back: PALETTE_256[7],
            weight: FontWeight::Regular,
            blink: false,
        }
    }
}

/// Data for one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    /// Unicode scalar value, [`Cell::WIDE_TAIL`], or 0 (unset, rendered blank)
    pub code: u32,
    pub style: Style,
}

impl Cell {
    /// Sentinel marking the continuation column(s) of a wide glyph.
    /// A tail at column c always has the glyph head to its left.
    pub const WIDE_TAIL: u32 = u32::MAX;
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            code: 0,
            style: Style::default(),
        }
    }
}

/// Display width of a codepoint in terminal columns.
/// Control characters, combining marks and invalid scalars report 0 and are
/// never stored.
pub fn char_width(codepoint: u32) -> usize {
    match char::from_u32(codepoint) {
        Some(ch) => ch.width().unwrap_or(0),
        None => 0,
    }
}

/// Terminal mode flags (SM/RM and DECSET/DECRST)
#[derive(Debug, Clone, Default)]
pub struct TerminalModes {
    /// Insert mode (IRM, CSI 4 h)
    pub insert_mode: bool,
    /// Origin mode (DECOM, ?6): cursor addressing relative to scroll region
    pub origin_mode: bool,
    /// Auto-wrap at the right margin (DECAWM, ?7)
    pub auto_wrap: bool,
    /// Reverse video (DECSCNM, ?5)
    pub reverse_video: bool,
    /// Cursor visibility (DECTCEM, ?25)
    pub show_cursor: bool,
    /// DEC private modes we accept but do not act on (?1, ?12, ?2004, ...)
    private_flags: HashMap<u16, bool>,
}

impl TerminalModes {
    pub fn new() -> Self {
        Self {
            auto_wrap: true,
            show_cursor: true,
            ..Default::default()
        }
    }

    /// Record an unimplemented DEC private mode toggle
    pub fn set_private_flag(&mut self, mode: u16, enabled: bool) {
        self.private_flags.insert(mode, enabled);
    }

    /// Query a recorded no-op mode flag
    pub fn private_flag(&self, mode: u16) -> Option<bool> {
        self.private_flags.get(&mode).copied()
    }
}

fn blank_row(cols: usize) -> Vec<Cell> {
    vec![Cell::default(); cols]
}

/// Character grid
pub struct Grid {
    /// Screen rows, row 0 at the top; every row holds exactly `num_cols` cells
    buffer: Vec<Vec<Cell>>,
    num_cols: usize,
    num_rows: usize,
    /// Cursor row (0-indexed)
    pub cursor_row: usize,
    /// Cursor column (0-indexed)
    pub cursor_col: usize,
    /// Current drawing style
    style: Style,
    /// Saved cursor (DECSC)
    saved_row: usize,
    saved_col: usize,
    saved_style: Style,
    /// Rows evicted from the top margin (oldest at front)
    history: VecDeque<Vec<Cell>>,
    /// Top of scroll region (0-indexed, inclusive)
    scroll_top: usize,
    /// Bottom of scroll region (0-indexed, inclusive)
    scroll_bottom: usize,
    /// Tab stop per column
    tab_stops: Vec<bool>,
    /// Mode flags
    pub modes: TerminalModes,
    /// A glyph was written through the last column; the next printable wraps
    /// (or overwrites, with auto-wrap off) instead of leaving the grid
    wrap_pending: bool,
}

impl Grid {
    /// Create grid with the given size; tab stops at every 8th column
    pub fn new(cols: usize, rows: usize) -> Self {
        let mut grid = Self {
            buffer: Vec::new(),
            num_cols: 0,
            num_rows: 0,
            cursor_row: 0,
            cursor_col: 0,
            style: Style::default(),
            saved_row: 0,
            saved_col: 0,
            saved_style: Style::default(),
            history: VecDeque::new(),
            scroll_top: 0,
            scroll_bottom: 0,
            tab_stops: Vec::new(),
            modes: TerminalModes::new(),
            wrap_pending: false,
        };
        grid.resize(cols, rows);
        grid
    }

    pub fn cols(&self) -> usize {
        self.num_cols
    }

    pub fn rows(&self) -> usize {
        self.num_rows
    }

    /// Get reference to cell
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.buffer[row][col]
    }

    /// Current scroll region as (top, bottom), inclusive
    pub fn scroll_region(&self) -> (usize, usize) {
        (self.scroll_top, self.scroll_bottom)
    }

    pub fn is_tab_stop(&self, col: usize) -> bool {
        self.tab_stops[col]
    }

    /// Current drawing style
    pub fn style(&self) -> Style {
        self.style
    }

    // ========== Scrollback ==========

    /// Number of scrollback lines
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Get history line (0 = oldest). Rows keep the width they had when they
    /// were evicted; they are not reflowed.
    pub fn history_row(&self, idx: usize) -> Option<&[Cell]> {
        self.history.get(idx).map(|r| r.as_slice())
    }

    // ========== Geometry ==========

    /// Resize the grid, truncating or padding rows with blanks.
    /// Resets the scroll region to the full screen, clamps the cursor and
    /// extends tab stops every 8 columns from the old width.
    pub fn resize(&mut self, new_cols: usize, new_rows: usize) {
        let new_cols = new_cols.max(1);
        let new_rows = new_rows.max(1);
        let old_cols = self.num_cols;

        self.num_cols = new_cols;
        self.num_rows = new_rows;

        self.scroll_top = 0;
        self.scroll_bottom = new_rows - 1;

        self.buffer.resize_with(new_rows, || blank_row(new_cols));
        for row in &mut self.buffer {
            row.resize(new_cols, Cell::default());
        }

        if self.cursor_row > new_rows - 1 {
            self.cursor_row = new_rows - 1;
        }
        if self.cursor_col > new_cols - 1 {
            self.cursor_col = new_cols - 1;
        }

        self.tab_stops.resize(new_cols, false);
        let mut i = old_cols;
        while i < new_cols {
            self.tab_stops[i] = true;
            i += TAB_SIZE;
        }

        self.wrap_pending = false;
    }

    // ========== Wide character helpers ==========

    /// Blank the remaining cells of a wide glyph when the cell at (row, col)
    /// is about to be overwritten or erased, so no continuation cell is ever
    /// left without its head.
    fn clear_wide_char_at(&mut self, row: usize, col: usize) {
        let mut head = col;
        while head > 0 && self.buffer[row][head].code == Cell::WIDE_TAIL {
            head -= 1;
        }
        if head == col && char_width(self.buffer[row][col].code) <= 1 {
            return;
        }
        self.buffer[row][head] = Cell::default();
        let mut c = head + 1;
        while c < self.num_cols && self.buffer[row][c].code == Cell::WIDE_TAIL {
            self.buffer[row][c] = Cell::default();
            c += 1;
        }
    }

    // ========== Character writing ==========

    /// Write a decoded codepoint at the cursor and advance it.
    /// Handles auto-wrap, insert mode and wide glyph placement.
    pub fn put_char(&mut self, codepoint: u32) {
        let cw = char_width(codepoint);
        // zero-width and control codepoints are never stored
        if cw == 0 || cw > self.num_cols {
            return;
        }

        // a previous glyph filled the last column
        if self.wrap_pending && self.modes.auto_wrap {
            self.wrap_pending = false;
            self.cursor_row += 1;
            self.cursor_col = 0;
            self.scroll_on_overflow();
        }

        if self.cursor_col + cw > self.num_cols {
            if self.modes.auto_wrap {
                self.cursor_row += 1;
                self.cursor_col = 0;
                self.scroll_on_overflow();
            } else {
                // overwrite at the right edge, stepping off a broken wide glyph
                self.cursor_col = self.num_cols - cw;
                while self.cursor_col > 0
                    && self.buffer[self.cursor_row][self.cursor_col].code == Cell::WIDE_TAIL
                {
                    self.cursor_col -= 1;
                }
            }
        }

        let row = self.cursor_row;
        let col = self.cursor_col;

        self.clear_wide_char_at(row, col);
        if self.modes.insert_mode {
            // shift the tail of the row right by the glyph width
            let num_cols = self.num_cols;
            let line = &mut self.buffer[row];
            line.truncate(num_cols - cw);
            for _ in 0..cw {
                line.insert(col, Cell::default());
            }
        } else if cw > 1 {
            self.clear_wide_char_at(row, col + cw - 1);
        }

        let style = self.style;
        self.buffer[row][col] = Cell {
            code: codepoint,
            style,
        };
        for i in 1..cw {
            // a partial wide glyph is never written past the last column
            if col + i >= self.num_cols {
                break;
            }
            self.buffer[row][col + i] = Cell {
                code: Cell::WIDE_TAIL,
                style,
            };
        }

        let end = col + cw;
        if end >= self.num_cols {
            self.cursor_col = self.num_cols - 1;
            self.wrap_pending = true;
        } else {
            self.cursor_col = end;
            self.wrap_pending = false;
        }
    }

    // ========== Scrolling ==========

    /// Line-feed overflow: when the cursor has just passed the bottom margin,
    /// evict the top row of the region into history, insert a blank row at
    /// the bottom and pull the cursor back. A cursor parked below the region
    /// by explicit addressing only clamps to the last row.
    pub fn scroll_on_overflow(&mut self) {
        if self.cursor_row == self.scroll_bottom + 1 {
            debug_assert!(self.scroll_top < self.scroll_bottom);
            let evicted = self.buffer.remove(self.scroll_top);
            self.history.push_back(evicted);
            self.buffer
                .insert(self.scroll_bottom, blank_row(self.num_cols));
            self.cursor_row = self.scroll_bottom;

            while self.history.len() > MAX_HISTORY_LINES {
                self.history.pop_front();
            }
        } else if self.cursor_row >= self.num_rows {
            self.cursor_row = self.num_rows - 1;
        }
    }

    /// Scroll the region up n lines (CSI S). Does not feed history.
    pub fn scroll_up(&mut self, n: usize) {
        let height = self.scroll_bottom - self.scroll_top + 1;
        let n = n.min(height);
        for _ in 0..n {
            self.buffer.remove(self.scroll_top);
            self.buffer
                .insert(self.scroll_bottom, blank_row(self.num_cols));
        }
    }

    // ========== Control characters ==========

    /// Line feed (LF / ESC D)
    pub fn linefeed(&mut self) {
        self.wrap_pending = false;
        self.cursor_row += 1;
        self.scroll_on_overflow();
    }

    /// Reverse index (ESC M): at the top margin the region shifts down with
    /// a blank new top row, otherwise the cursor moves up one line.
    pub fn reverse_index(&mut self) {
        self.wrap_pending = false;
        if self.cursor_row == self.scroll_top {
            self.buffer.remove(self.scroll_bottom);
            self.buffer.insert(self.scroll_top, blank_row(self.num_cols));
        } else if self.cursor_row > 0 {
            self.cursor_row -= 1;
            self.clamp_cursor();
        }
    }

    /// Carriage return (CR)
    pub fn carriage_return(&mut self) {
        self.wrap_pending = false;
        self.cursor_col = 0;
    }

    /// Backspace (BS)
    pub fn backspace(&mut self) {
        self.wrap_pending = false;
        if self.cursor_col > 0 {
            self.cursor_col -= 1;
        }
    }

    /// Tab (HT): advance to the next set tab stop or the last column
    pub fn tab(&mut self) {
        self.wrap_pending = false;
        self.cursor_col += 1;
        while self.cursor_col < self.num_cols && !self.tab_stops[self.cursor_col] {
            self.cursor_col += 1;
        }
        self.clamp_cursor();
    }

    // ========== Cursor movement ==========

    /// Clamp the cursor into the grid; under origin mode the row is
    /// additionally confined to the scroll region.
    pub fn clamp_cursor(&mut self) {
        self.wrap_pending = false;
        if self.cursor_col > self.num_cols - 1 {
            self.cursor_col = self.num_cols - 1;
        }
        if self.modes.origin_mode {
            self.cursor_row = self.cursor_row.clamp(self.scroll_top, self.scroll_bottom);
        } else if self.cursor_row > self.num_rows - 1 {
            self.cursor_row = self.num_rows - 1;
        }
    }

    /// Absolute cursor addressing (CUP), 0-based inputs. Under origin mode
    /// the home position is the top of the scroll region.
    pub fn set_cursor(&mut self, row: usize, col: usize) {
        if self.modes.origin_mode {
            self.cursor_row = row + self.scroll_top;
        } else {
            self.cursor_row = row;
        }
        self.cursor_col = col;
        self.clamp_cursor();
    }

    /// Cursor up (CSI A): does not cross the top margin unless already above
    pub fn move_cursor_up(&mut self, n: usize) {
        let n = if self.cursor_row >= self.scroll_top {
            n.min(self.cursor_row - self.scroll_top)
        } else {
            n
        };
        self.cursor_row = self.cursor_row.saturating_sub(n);
        self.clamp_cursor();
    }

    /// Cursor down (CSI B): symmetric at the bottom margin
    pub fn move_cursor_down(&mut self, n: usize) {
        let n = if self.cursor_row <= self.scroll_bottom {
            n.min(self.scroll_bottom - self.cursor_row)
        } else {
            n
        };
        self.cursor_row += n;
        self.clamp_cursor();
    }

    /// Cursor right (CSI C)
    pub fn move_cursor_forward(&mut self, n: usize) {
        self.cursor_col += n;
        self.clamp_cursor();
    }

    /// Cursor left (CSI D)
    pub fn move_cursor_backward(&mut self, n: usize) {
        self.cursor_col = self.cursor_col.saturating_sub(n);
        self.clamp_cursor();
    }

    /// Save cursor position and style (ESC 7)
    pub fn save_cursor(&mut self) {
        self.saved_row = self.cursor_row;
        self.saved_col = self.cursor_col;
        self.saved_style = self.style;
    }

    /// Restore cursor position and style (ESC 8)
    pub fn restore_cursor(&mut self) {
        self.cursor_row = self.saved_row;
        self.cursor_col = self.saved_col;
        self.style = self.saved_style;
        self.clamp_cursor();
    }

    // ========== Erase ==========

    fn clear_row(&mut self, row: usize) {
        self.buffer[row].fill(Cell::default());
    }

    /// Erase in display (CSI J). mode: 0=cursor to end, 1=start through
    /// cursor, 2=entire grid.
    pub fn erase_in_display(&mut self, mode: u16) {
        match mode {
            0 => {
                self.erase_in_line(0);
                for row in (self.cursor_row + 1)..self.num_rows {
                    self.clear_row(row);
                }
            }
            1 => {
                for row in 0..self.cursor_row {
                    self.clear_row(row);
                }
                self.erase_in_line(1);
            }
            2 => {
                for row in 0..self.num_rows {
                    self.clear_row(row);
                }
            }
            _ => {}
        }
    }

    /// Erase in line (CSI K). mode: 0=cursor to end, 1=start through cursor,
    /// 2=entire row.
    pub fn erase_in_line(&mut self, mode: u16) {
        let row = self.cursor_row;
        match mode {
            0 => {
                self.clear_wide_char_at(row, self.cursor_col);
                for col in self.cursor_col..self.num_cols {
                    self.buffer[row][col] = Cell::default();
                }
            }
            1 => {
                let end = self.cursor_col.min(self.num_cols - 1);
                self.clear_wide_char_at(row, end);
                for col in 0..=end {
                    self.buffer[row][col] = Cell::default();
                }
            }
            2 => self.clear_row(row),
            _ => {}
        }
    }

    /// Erase n cells at the cursor without shifting (CSI X)
    pub fn erase_chars(&mut self, n: usize) {
        let row = self.cursor_row;
        let col = self.cursor_col;
        let n = n.min(self.num_cols - col);
        if n == 0 {
            return;
        }
        self.clear_wide_char_at(row, col);
        self.clear_wide_char_at(row, col + n - 1);
        for c in col..col + n {
            self.buffer[row][c] = Cell::default();
        }
    }

    // ========== Line/character shifting ==========

    /// Insert n blank lines at the cursor row (CSI L), shifting the rest of
    /// the scroll region down. No-op outside the region.
    pub fn insert_lines(&mut self, n: usize) {
        if self.cursor_row < self.scroll_top || self.cursor_row > self.scroll_bottom {
            return;
        }
        let n = n.min(self.scroll_bottom - self.cursor_row + 1);
        for _ in 0..n {
            self.buffer.remove(self.scroll_bottom);
            self.buffer.insert(self.cursor_row, blank_row(self.num_cols));
        }
        self.cursor_col = 0;
    }

    /// Delete n lines at the cursor row (CSI M), shifting the rest of the
    /// scroll region up with blanks appended at the bottom.
    pub fn delete_lines(&mut self, n: usize) {
        if self.cursor_row < self.scroll_top || self.cursor_row > self.scroll_bottom {
            return;
        }
        let n = n.min(self.scroll_bottom - self.cursor_row + 1);
        for _ in 0..n {
            self.buffer.remove(self.cursor_row);
            self.buffer
                .insert(self.scroll_bottom, blank_row(self.num_cols));
        }
        self.cursor_col = 0;
    }

    /// Delete n characters at the cursor (CSI P), shifting the rest of the
    /// row left and blank-filling the tail.
    pub fn delete_chars(&mut self, n: usize) {
        let row = self.cursor_row;
        let col = self.cursor_col;
        let n = n.min(self.num_cols - col);
        if n == 0 {
            return;
        }
        self.clear_wide_char_at(row, col);
        if col + n < self.num_cols {
            self.clear_wide_char_at(row, col + n);
        }
        let num_cols = self.num_cols;
        let line = &mut self.buffer[row];
        line.drain(col..col + n);
        line.resize(num_cols, Cell::default());
    }

    /// Insert n blank characters at the cursor (CSI @), shifting the rest of
    /// the row right; cells pushed past the margin are lost.
    pub fn insert_chars(&mut self, n: usize) {
        let row = self.cursor_row;
        let col = self.cursor_col;
        let n = n.min(self.num_cols - col);
        if n == 0 {
            return;
        }
        self.clear_wide_char_at(row, col);
        let num_cols = self.num_cols;
        let line = &mut self.buffer[row];
        line.truncate(num_cols - n);
        for _ in 0..n {
            line.insert(col, Cell::default());
        }
    }

    // ========== Tab stops ==========

    /// Set a tab stop at the cursor column (ESC H)
    pub fn set_tab_stop(&mut self) {
        self.tab_stops[self.cursor_col] = true;
    }

    /// Clear the tab stop at the cursor column (CSI 0 g)
    pub fn clear_tab_stop(&mut self) {
        self.tab_stops[self.cursor_col] = false;
    }

    /// Clear every tab stop (CSI 3 g)
    pub fn clear_all_tab_stops(&mut self) {
        self.tab_stops.fill(false);
    }

    // ========== Scroll region ==========

    /// Set the scroll region (DECSTBM), 0-based inclusive bounds. Ignored
    /// unless top < bottom; on success the cursor moves to the region home.
    pub fn set_scroll_region(&mut self, top: usize, bottom: usize) {
        let top = top.min(self.num_rows - 1);
        let bottom = bottom.min(self.num_rows - 1);
        if top < bottom {
            self.scroll_top = top;
            self.scroll_bottom = bottom;
            self.cursor_row = self.scroll_top;
            self.cursor_col = 0;
            self.wrap_pending = false;
        }
    }

    // ========== Style (SGR) ==========

    /// Reset style to default (SGR 0)
    pub fn reset_style(&mut self) {
        self.style = Style::default();
    }

    pub fn set_bold(&mut self, bold: bool) {
        self.style.weight = if bold {
            FontWeight::Bold
        } else {
            FontWeight::Regular
        };
    }

    pub fn set_blink(&mut self, blink: bool) {
        self.style.blink = blink;
    }

    /// Swap foreground and background (SGR 7 / 27); involutive per call
    pub fn swap_colors(&mut self) {
        std::mem::swap(&mut self.style.fore, &mut self.style.back);
    }

    pub fn set_foreground(&mut self, color: Rgb) {
        self.style.fore = color;
    }

    pub fn set_background(&mut self, color: Rgb) {
        self.style.back = color;
    }

    // ========== Misc ==========

    /// DECALN (ESC # 8): fill the grid with a test pattern of 'E'
    pub fn screen_alignment_test(&mut self) {
        for row in &mut self.buffer {
            for cell in row {
                *cell = Cell {
                    code: u32::from(b'E'),
                    style: Style::default(),
                };
            }
        }
    }

    /// Row contents as plain text; unset cells and wide tails become spaces
    pub fn row_text(&self, row: usize) -> String {
        let mut out = String::with_capacity(self.num_cols);
        for cell in &self.buffer[row] {
            match cell.code {
                0 | Cell::WIDE_TAIL => out.push(' '),
                code => out.push(char::from_u32(code).unwrap_or(' ')),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_str(grid: &mut Grid, s: &str) {
        for ch in s.chars() {
            grid.put_char(ch as u32);
        }
    }

    /// Invariant: every wide tail belongs to a wide head at the right distance
    fn assert_no_dangling_tails(grid: &Grid) {
        for row in 0..grid.rows() {
            for col in 0..grid.cols() {
                if grid.cell(row, col).code == Cell::WIDE_TAIL {
                    let mut head = col;
                    while head > 0 && grid.cell(row, head).code == Cell::WIDE_TAIL {
                        head -= 1;
                    }
                    let head_code = grid.cell(row, head).code;
                    assert!(
                        char_width(head_code) > 1,
                        "dangling tail at ({}, {})",
                        row,
                        col
                    );
                    assert!(col - head < char_width(head_code));
                }
            }
        }
    }

    #[test]
    fn put_char_advances_cursor() {
        let mut grid = Grid::new(80, 24);
        put_str(&mut grid, "hi");
        assert_eq!(grid.cell(0, 0).code, u32::from(b'h'));
        assert_eq!(grid.cell(0, 1).code, u32::from(b'i'));
        assert_eq!((grid.cursor_row, grid.cursor_col), (0, 2));
    }

    #[test]
    fn wrap_advances_row() {
        let mut grid = Grid::new(80, 24);
        for _ in 0..81 {
            grid.put_char(u32::from(b'x'));
        }
        assert_eq!(grid.cursor_row, 1);
        assert_eq!(grid.cursor_col, 1);
        assert_eq!(grid.cell(0, 79).code, u32::from(b'x'));
        assert_eq!(grid.cell(1, 0).code, u32::from(b'x'));
    }

    #[test]
    fn no_wrap_overwrites_last_column() {
        let mut grid = Grid::new(80, 24);
        grid.modes.auto_wrap = false;
        for _ in 0..200 {
            grid.put_char(u32::from(b'x'));
        }
        assert_eq!((grid.cursor_row, grid.cursor_col), (0, 79));
        assert_eq!(grid.row_text(0), "x".repeat(80));
        assert_eq!(grid.history_len(), 0);
    }

    #[test]
    fn cursor_stays_inside_grid() {
        let mut grid = Grid::new(80, 24);
        for _ in 0..500 {
            grid.put_char(u32::from(b'y'));
        }
        assert!(grid.cursor_col < grid.cols());
        assert!(grid.cursor_row < grid.rows());
    }

    #[test]
    fn wide_char_writes_tail() {
        let mut grid = Grid::new(80, 24);
        grid.put_char(0x3042); // あ, width 2
        assert_eq!(grid.cell(0, 0).code, 0x3042);
        assert_eq!(grid.cell(0, 1).code, Cell::WIDE_TAIL);
        assert_eq!(grid.cursor_col, 2);
        assert_no_dangling_tails(&grid);
    }

    #[test]
    fn overwriting_wide_head_clears_tail() {
        let mut grid = Grid::new(80, 24);
        grid.put_char(0x3042);
        grid.cursor_col = 0;
        grid.put_char(u32::from(b'a'));
        assert_eq!(grid.cell(0, 0).code, u32::from(b'a'));
        assert_eq!(grid.cell(0, 1).code, 0);
        assert_no_dangling_tails(&grid);
    }

    #[test]
    fn overwriting_wide_tail_clears_head() {
        let mut grid = Grid::new(80, 24);
        grid.put_char(0x3042);
        grid.cursor_col = 1;
        grid.put_char(u32::from(b'a'));
        assert_eq!(grid.cell(0, 0).code, 0);
        assert_eq!(grid.cell(0, 1).code, u32::from(b'a'));
        assert_no_dangling_tails(&grid);
    }

    #[test]
    fn wide_char_wraps_instead_of_splitting() {
        let mut grid = Grid::new(80, 24);
        for _ in 0..79 {
            grid.put_char(u32::from(b'x'));
        }
        grid.put_char(0x3042);
        assert_eq!(grid.cell(1, 0).code, 0x3042);
        assert_eq!(grid.cell(1, 1).code, Cell::WIDE_TAIL);
        assert_no_dangling_tails(&grid);
    }

    #[test]
    fn insert_mode_shifts_row() {
        let mut grid = Grid::new(10, 2);
        put_str(&mut grid, "abc");
        grid.cursor_col = 0;
        grid.modes.insert_mode = true;
        grid.put_char(u32::from(b'X'));
        assert_eq!(grid.row_text(0).trim_end(), "Xabc");
    }

    #[test]
    fn linefeed_at_bottom_feeds_history() {
        let mut grid = Grid::new(80, 24);
        put_str(&mut grid, "first");
        for _ in 0..24 {
            grid.linefeed();
            grid.carriage_return();
        }
        assert_eq!(grid.history_len(), 1);
        let first = grid.history_row(0).unwrap();
        assert_eq!(first[0].code, u32::from(b'f'));
        assert_eq!((grid.cursor_row, grid.cursor_col), (23, 0));
        assert_eq!(grid.row_text(23).trim(), "");
    }

    #[test]
    fn history_is_bounded() {
        let mut grid = Grid::new(8, 4);
        for _ in 0..(MAX_HISTORY_LINES + 100) {
            grid.linefeed();
        }
        assert_eq!(grid.history_len(), MAX_HISTORY_LINES);
    }

    #[test]
    fn linefeed_below_region_does_not_scroll() {
        let mut grid = Grid::new(80, 24);
        grid.set_scroll_region(0, 9);
        grid.cursor_row = 15;
        grid.linefeed();
        assert_eq!(grid.cursor_row, 16);
        assert_eq!(grid.history_len(), 0);
    }

    #[test]
    fn region_scroll_feeds_history_only_from_linefeed() {
        let mut grid = Grid::new(80, 24);
        grid.set_scroll_region(2, 10);
        grid.cursor_row = 10;
        grid.linefeed();
        assert_eq!(grid.cursor_row, 10);
        assert_eq!(grid.history_len(), 1); // top margin row evicted
        grid.scroll_up(3);
        assert_eq!(grid.history_len(), 1); // SU never writes history
    }

    #[test]
    fn reverse_index_at_top_shifts_region_down() {
        let mut grid = Grid::new(80, 24);
        put_str(&mut grid, "top");
        grid.carriage_return();
        grid.reverse_index();
        assert_eq!(grid.cursor_row, 0);
        assert_eq!(grid.row_text(0).trim(), "");
        assert_eq!(grid.row_text(1).trim(), "top");
    }

    #[test]
    fn insert_delete_lines() {
        let mut grid = Grid::new(20, 6);
        for i in 0..6 {
            grid.cursor_row = i;
            grid.cursor_col = 0;
            put_str(&mut grid, &format!("line{}", i));
        }
        grid.cursor_row = 1;
        grid.insert_lines(2);
        assert_eq!(grid.row_text(0).trim(), "line0");
        assert_eq!(grid.row_text(1).trim(), "");
        assert_eq!(grid.row_text(2).trim(), "");
        assert_eq!(grid.row_text(3).trim(), "line1");
        assert_eq!(grid.cursor_col, 0);

        grid.cursor_row = 1;
        grid.delete_lines(2);
        assert_eq!(grid.row_text(1).trim(), "line1");
        assert_eq!(grid.row_text(5).trim(), "");
    }

    #[test]
    fn lines_outside_region_are_noops() {
        let mut grid = Grid::new(20, 10);
        grid.set_scroll_region(2, 6);
        grid.cursor_row = 8;
        put_str(&mut grid, "safe");
        grid.cursor_col = 0;
        grid.insert_lines(1);
        grid.delete_lines(1);
        assert_eq!(grid.row_text(8).trim(), "safe");
    }

    #[test]
    fn delete_and_insert_chars() {
        let mut grid = Grid::new(10, 2);
        put_str(&mut grid, "abcdef");
        grid.cursor_col = 1;
        grid.delete_chars(2);
        assert_eq!(grid.row_text(0).trim_end(), "adef");
        grid.insert_chars(1);
        assert_eq!(grid.row_text(0).trim_end(), "a def");
    }

    #[test]
    fn erase_chars_does_not_shift() {
        let mut grid = Grid::new(10, 2);
        put_str(&mut grid, "abcdef");
        grid.cursor_col = 1;
        grid.erase_chars(2);
        assert_eq!(grid.row_text(0).trim_end(), "a  def");
    }

    #[test]
    fn erase_in_line_modes() {
        let mut grid = Grid::new(10, 2);
        put_str(&mut grid, "abcdef");
        grid.cursor_col = 2;
        grid.erase_in_line(0);
        assert_eq!(grid.row_text(0).trim_end(), "ab");

        put_str(&mut grid, "cdef");
        grid.cursor_col = 2;
        grid.erase_in_line(1);
        assert_eq!(grid.row_text(0).trim_end(), "   def");

        grid.erase_in_line(2);
        assert_eq!(grid.row_text(0).trim_end(), "");
    }

    #[test]
    fn erase_in_display_is_idempotent() {
        let mut grid = Grid::new(20, 5);
        put_str(&mut grid, "something");
        grid.erase_in_display(2);
        let after_one: Vec<String> = (0..5).map(|r| grid.row_text(r)).collect();
        grid.erase_in_display(2);
        let after_two: Vec<String> = (0..5).map(|r| grid.row_text(r)).collect();
        assert_eq!(after_one, after_two);
    }

    #[test]
    fn tab_moves_to_next_stop() {
        let mut grid = Grid::new(80, 24);
        grid.tab();
        assert_eq!(grid.cursor_col, 8);
        grid.tab();
        assert_eq!(grid.cursor_col, 16);
        grid.clear_all_tab_stops();
        grid.tab();
        assert_eq!(grid.cursor_col, 79);
    }

    #[test]
    fn custom_tab_stop() {
        let mut grid = Grid::new(80, 24);
        grid.cursor_col = 3;
        grid.set_tab_stop();
        grid.cursor_col = 0;
        grid.tab();
        assert_eq!(grid.cursor_col, 3);
    }

    #[test]
    fn save_restore_cursor_roundtrip() {
        let mut grid = Grid::new(80, 24);
        grid.set_cursor(5, 10);
        grid.set_bold(true);
        grid.save_cursor();
        let saved_style = grid.style();
        grid.set_cursor(20, 40);
        grid.reset_style();
        grid.restore_cursor();
        assert_eq!((grid.cursor_row, grid.cursor_col), (5, 10));
        assert_eq!(grid.style(), saved_style);
    }

    #[test]
    fn swap_colors_is_involutive() {
        let mut grid = Grid::new(80, 24);
        let before = grid.style();
        grid.swap_colors();
        assert_ne!(grid.style(), before);
        grid.swap_colors();
        assert_eq!(grid.style(), before);
    }

    #[test]
    fn origin_mode_confines_cursor() {
        let mut grid = Grid::new(80, 24);
        grid.set_scroll_region(5, 15);
        grid.modes.origin_mode = true;
        grid.set_cursor(0, 0);
        assert_eq!((grid.cursor_row, grid.cursor_col), (5, 0));
        grid.set_cursor(100, 0);
        assert_eq!(grid.cursor_row, 15);
    }

    #[test]
    fn cursor_up_respects_top_margin() {
        let mut grid = Grid::new(80, 24);
        grid.set_scroll_region(5, 15);
        grid.cursor_row = 7;
        grid.move_cursor_up(10);
        assert_eq!(grid.cursor_row, 5);
        // above the region the margin no longer binds
        grid.cursor_row = 3;
        grid.move_cursor_up(2);
        assert_eq!(grid.cursor_row, 1);
    }

    #[test]
    fn resize_preserves_content() {
        let mut grid = Grid::new(80, 24);
        put_str(&mut grid, "keep me");
        grid.resize(40, 12);
        assert_eq!(grid.row_text(0).trim_end(), "keep me");
        grid.resize(80, 24);
        assert_eq!(grid.row_text(0).trim_end(), "keep me");
        assert_eq!(grid.scroll_region(), (0, 23));
    }

    #[test]
    fn resize_extends_tab_stops() {
        let mut grid = Grid::new(80, 24);
        grid.resize(132, 24);
        assert!(grid.is_tab_stop(80));
        assert!(grid.is_tab_stop(88));
        assert!(grid.is_tab_stop(128));
    }

    #[test]
    fn alignment_test_fills_grid() {
        let mut grid = Grid::new(10, 3);
        grid.screen_alignment_test();
        for r in 0..3 {
            assert_eq!(grid.row_text(r), "E".repeat(10));
        }
    }

    #[test]
    fn palette_values() {
        assert_eq!(palette_color(1), Rgb::new(220, 50, 47)); // solarized red
        assert_eq!(palette_color(16), Rgb::new(0, 0, 0)); // cube origin
        assert_eq!(palette_color(196), Rgb::new(255, 0, 0)); // pure red
        assert_eq!(palette_color(232), Rgb::new(8, 8, 8)); // darkest gray
        assert_eq!(palette_color(255), Rgb::new(238, 238, 238)); // lightest gray
    }
}
