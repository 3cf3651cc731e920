//! VT escape sequence parser
//!
//! Byte-wise state machine classifying pty output into ground text,
//! ESC / CSI / OSC / DCS sequences, and applying the results to [`Grid`].
//!
//! ## References
//! - ECMA-48: Control Functions for Coded Character Sets
//! - VT100/VT220: <https://vt100.net/docs/>
//! - Xterm Control Sequences: <https://invisible-island.net/xterm/ctlseqs/ctlseqs.html>

use log::{trace, warn};

use super::grid::{palette_color, Grid, Rgb};
use super::pty::Pty;
use super::utf8::Utf8Decoder;
use super::Host;

/// Cap on accumulated OSC/DCS payload bytes
const MAX_STRING_BUFFER: usize = 1024 * 1024;

/// Escape parser phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapeState {
    /// Printable text and C0 controls
    #[default]
    Ground,
    /// After ESC, collecting intermediates
    Esc,
    /// Control sequence (ESC [), collecting parameters
    Csi,
    /// Operating system command (ESC ])
    Osc,
    /// Device control string (ESC P)
    Dcs,
}

/// Where parsed results land: the grid, the reply stream back to the pty,
/// and the host callbacks for clipboard and window-width changes.
pub struct Performer<'a> {
    pub grid: &'a mut Grid,
    /// Reply bytes (device attributes, cursor reports, ...) to be written
    /// back to the pty after the current batch
    pub responses: &'a mut Vec<u8>,
    pub host: &'a mut dyn Host,
    /// Needed for the window-size ioctl on 80/132 column mode changes
    pub pty: Option<&'a Pty>,
    /// Cell width in pixels, for the host width callback
    pub cell_width: u32,
}

/// Leading-integer parse. Non-numeric input reads as 0, matching the
/// sscanf-style parameter grammar of the reference terminals.
fn parse_int(s: &[u8]) -> usize {
    let mut v: usize = 0;
    for &b in s {
        if !b.is_ascii_digit() {
            break;
        }
        v = v.saturating_mul(10).saturating_add(usize::from(b - b'0'));
    }
    v
}

/// Parse a CSI parameter, with the empty string taking the default
fn param_or(s: &[u8], default: usize) -> usize {
    if s.is_empty() {
        default
    } else {
        parse_int(s)
    }
}

/// Split a parameter string on ';' (an empty string yields one empty part)
fn split_params(buffer: &[u8]) -> Vec<&[u8]> {
    buffer.split(|&b| b == b';').collect()
}

/// Parse an SGR extended color following a 38/48 introducer.
/// `5;idx` selects from the 256-color palette, `2;r;g;b` is direct RGB.
/// Returns the color and the number of parameters consumed.
fn parse_extended_color(parts: &[&[u8]]) -> Option<(Rgb, usize)> {
    match parse_int(parts.first()?) {
        5 => {
            let idx = parse_int(parts.get(1)?);
            Some((palette_color(idx as u8), 2))
        }
        2 => {
            let r = parse_int(parts.get(1)?) as u8;
            let g = parse_int(parts.get(2)?) as u8;
            let b = parse_int(parts.get(3)?) as u8;
            Some((Rgb::new(r, g, b), 4))
        }
        _ => None,
    }
}

/// The escape-sequence state machine. Bytes are pushed one at a time with
/// [`Parser::advance`]; completed commands are applied to the
/// [`Performer`] immediately.
#[derive(Default)]
pub struct Parser {
    state: EscapeState,
    /// Parameter/intermediate bytes of the sequence in flight
    buffer: Vec<u8>,
    utf8: Utf8Decoder,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EscapeState {
        self.state
    }

    /// Feed one byte from the pty
    pub fn advance(&mut self, performer: &mut Performer, byte: u8) {
        match self.state {
            EscapeState::Ground => self.ground(performer, byte),
            EscapeState::Esc => self.escape(performer, byte),
            EscapeState::Csi => self.csi(performer, byte),
            EscapeState::Osc => self.osc(performer, byte),
            EscapeState::Dcs => self.dcs(byte),
        }
    }

    // ========== Ground ==========

    fn ground(&mut self, p: &mut Performer, byte: u8) {
        // a multi-byte UTF-8 sequence is in flight
        if !self.utf8.is_initial() {
            if let Some(codepoint) = self.utf8.advance(byte) {
                p.grid.put_char(codepoint);
            }
            return;
        }

        match byte {
            0x1b => {
                self.buffer.clear();
                self.state = EscapeState::Esc;
            }
            b'\r' => p.grid.carriage_return(),
            b'\n' => p.grid.linefeed(),
            0x08 => p.grid.backspace(),
            b'\t' => p.grid.tab(),
            0x20..=0x7f => p.grid.put_char(byte.into()),
            _ => {
                if !self.utf8.start(byte) {
                    trace!("ignoring byte 0x{:02x} in ground state", byte);
                }
            }
        }
    }

    // ========== ESC ==========

    fn escape(&mut self, p: &mut Performer, byte: u8) {
        match (byte, self.buffer.as_slice()) {
            (b'[', b"") => {
                self.state = EscapeState::Csi;
                self.buffer.clear();
                return;
            }
            (b']', b"") => {
                self.state = EscapeState::Osc;
                self.buffer.clear();
                return;
            }
            (b'P', b"") => {
                self.state = EscapeState::Dcs;
                self.buffer.clear();
                return;
            }
            // ESC = / ESC >: alternate keypad mode set/reset, accepted without effect
            (b'=', b"") | (b'>', b"") => {}
            (b'A', b"") => {
                // cursor up
                p.grid.cursor_row = p.grid.cursor_row.saturating_sub(1);
                p.grid.clamp_cursor();
            }
            (b'B', b"") => {
                // cursor down
                p.grid.cursor_row += 1;
                p.grid.clamp_cursor();
            }
            (b'C', b"") => {
                // cursor right
                p.grid.cursor_col += 1;
                p.grid.clamp_cursor();
            }
            (b'D', b"") => {
                // IND: cursor down, scrolling at the bottom margin
                p.grid.linefeed();
            }
            (b'E', b"") => {
                // NEL: beginning of the next row
                p.grid.cursor_row += 1;
                p.grid.cursor_col = 0;
                p.grid.clamp_cursor();
            }
            (b'H', b"") => {
                // HTS: tab stop at the current column
                p.grid.set_tab_stop();
            }
            (b'M', b"") => {
                // RI: cursor up, scrolling at the top margin
                p.grid.reverse_index();
            }
            (b'7', b"") => {
                // DECSC: save cursor and style
                p.grid.save_cursor();
            }
            (b'8', b"") => {
                // DECRC: restore cursor and style
                p.grid.restore_cursor();
            }
            (b'8', b"#") => {
                // DECALN: fill the screen with the 'E' test pattern
                p.grid.screen_alignment_test();
            }
            (b'#' | b'(' | b')', _) => {
                // intermediate byte
                self.buffer.push(byte);
                return;
            }
            _ => {
                warn!(
                    "unknown escape sequence: ESC {} 0x{:02x}",
                    String::from_utf8_lossy(&self.buffer),
                    byte
                );
            }
        }
        self.state = EscapeState::Ground;
    }

    // ========== CSI ==========

    fn csi(&mut self, p: &mut Performer, byte: u8) {
        match byte {
            // final byte
            0x40..=0x7e => {
                self.csi_dispatch(p, byte);
                self.state = EscapeState::Ground;
            }
            // parameter and intermediate bytes
            0x20..=0x3f => self.buffer.push(byte),
            _ => {
                warn!(
                    "invalid byte 0x{:02x} in CSI sequence {}",
                    byte,
                    String::from_utf8_lossy(&self.buffer)
                );
                self.state = EscapeState::Ground;
            }
        }
    }

    fn csi_dispatch(&mut self, p: &mut Performer, action: u8) {
        let buffer = std::mem::take(&mut self.buffer);
        let buf = buffer.as_slice();

        match action {
            b'A' => {
                // CUU: cursor up, stopping at the top margin
                p.grid.move_cursor_up(param_or(buf, 1));
            }
            b'B' => {
                // CUD: cursor down, stopping at the bottom margin
                p.grid.move_cursor_down(param_or(buf, 1));
            }
            b'C' => {
                // CUF: cursor right
                p.grid.move_cursor_forward(param_or(buf, 1).max(1));
            }
            b'D' => {
                // CUB: cursor left
                p.grid.move_cursor_backward(param_or(buf, 1).max(1));
            }
            b'E' => {
                // CNL: beginning of the line n below
                p.grid.cursor_row += param_or(buf, 1);
                p.grid.cursor_col = 0;
                p.grid.clamp_cursor();
            }
            b'F' => {
                // CPL: beginning of the line n above
                p.grid.cursor_row = p.grid.cursor_row.saturating_sub(param_or(buf, 1));
                p.grid.cursor_col = 0;
                p.grid.clamp_cursor();
            }
            b'G' => {
                // CHA: move to column n (1-based)
                p.grid.cursor_col = param_or(buf, 1).saturating_sub(1);
                p.grid.clamp_cursor();
            }
            b'H' => {
                // CUP: move to row;col (1-based, origin-mode relative)
                let parts = split_params(buf);
                match parts.as_slice() {
                    [b""] => p.grid.set_cursor(0, 0),
                    [row] => p.grid.set_cursor(param_or(row, 1).saturating_sub(1), 0),
                    [row, col] => p.grid.set_cursor(
                        param_or(row, 1).saturating_sub(1),
                        param_or(col, 1).saturating_sub(1),
                    ),
                    _ => self.unknown_csi(buf, action),
                }
            }
            b'f' => {
                // HVP: same as CUP, two explicit parameters only
                let parts = split_params(buf);
                if let [row, col] = parts.as_slice() {
                    p.grid.set_cursor(
                        param_or(row, 1).saturating_sub(1),
                        param_or(col, 1).saturating_sub(1),
                    );
                } else {
                    self.unknown_csi(buf, action);
                }
            }
            b'J' => {
                // ED: erase in display
                match buf {
                    b"" | b"0" => p.grid.erase_in_display(0),
                    b"1" => p.grid.erase_in_display(1),
                    b"2" => p.grid.erase_in_display(2),
                    _ => self.unknown_csi(buf, action),
                }
            }
            b'K' => {
                // EL: erase in line
                match buf {
                    b"" | b"0" => p.grid.erase_in_line(0),
                    b"1" => p.grid.erase_in_line(1),
                    b"2" => p.grid.erase_in_line(2),
                    _ => self.unknown_csi(buf, action),
                }
            }
            b'L' => {
                // IL: insert blank lines
                p.grid.insert_lines(param_or(buf, 1));
            }
            b'M' => {
                // DL: delete lines
                p.grid.delete_lines(param_or(buf, 1));
            }
            b'P' => {
                // DCH: delete characters, shifting the row left
                p.grid.delete_chars(param_or(buf, 1));
            }
            b'S' => {
                // SU: scroll the region up
                p.grid.scroll_up(param_or(buf, 1));
            }
            b'X' => {
                // ECH: erase characters in place
                p.grid.erase_chars(param_or(buf, 1));
            }
            b'@' => {
                // ICH: insert blank characters, shifting the row right
                p.grid.insert_chars(param_or(buf, 1));
            }
            b'c' => {
                // DA: device attributes, mimicking xterm
                match buf {
                    // primary: VT100 with advanced video option
                    b"" | b"0" => p.responses.extend_from_slice(b"\x1b[?1;2c"),
                    // secondary: VT100, firmware 276
                    b">" | b">0" => p.responses.extend_from_slice(b"\x1b[>0;276;0c"),
                    _ => self.unknown_csi(buf, action),
                }
            }
            b'd' => {
                // VPA: move to row n (1-based)
                if buf.is_empty() {
                    self.unknown_csi(buf, action);
                } else {
                    p.grid.cursor_row = parse_int(buf).saturating_sub(1);
                    p.grid.clamp_cursor();
                }
            }
            b'g' => {
                // TBC: clear tab stops
                match buf {
                    b"" | b"0" => p.grid.clear_tab_stop(),
                    b"3" => p.grid.clear_all_tab_stops(),
                    _ => self.unknown_csi(buf, action),
                }
            }
            b'h' | b'l' => {
                let enable = action == b'h';
                if let Some(private) = buf.strip_prefix(b"?") {
                    // DECSET / DECRST
                    for part in split_params(private) {
                        self.private_mode(p, part, enable);
                    }
                } else if buf.is_empty() {
                    self.unknown_csi(buf, action);
                } else {
                    // SM / RM
                    for part in split_params(buf) {
                        match part {
                            b"4" => p.grid.modes.insert_mode = enable,
                            _ => trace!(
                                "unhandled ANSI mode: {} {}",
                                String::from_utf8_lossy(part),
                                action as char
                            ),
                        }
                    }
                }
            }
            b'm' => {
                if buf.first() == Some(&b'>') {
                    // XTMODKEYS: accepted without effect
                    trace!("ignoring XTMODKEYS: {}", String::from_utf8_lossy(buf));
                } else {
                    self.handle_sgr(p, buf);
                }
            }
            b'n' => {
                // DSR: device status report
                match buf {
                    b"5" => {
                        // operating status: OK
                        p.responses.extend_from_slice(b"\x1b[0n");
                    }
                    b"6" => {
                        // CPR: cursor position, 1-based
                        let reply =
                            format!("\x1b[{};{}R", p.grid.cursor_row + 1, p.grid.cursor_col + 1);
                        p.responses.extend_from_slice(reply.as_bytes());
                    }
                    _ if buf.first() == Some(&b'?') => {
                        trace!("ignoring DEC status report: {}", String::from_utf8_lossy(buf));
                    }
                    _ => self.unknown_csi(buf, action),
                }
            }
            b'r' => {
                // DECSTBM: set the scrolling region (1-based inclusive)
                let parts = split_params(buf);
                let (top, bottom) = match parts.as_slice() {
                    [b""] => (0, p.grid.rows() - 1),
                    [top] => (parse_int(top).saturating_sub(1), p.grid.rows() - 1),
                    [top, bottom] => (
                        parse_int(top).saturating_sub(1),
                        parse_int(bottom).saturating_sub(1),
                    ),
                    _ => {
                        self.unknown_csi(buf, action);
                        return;
                    }
                };
                p.grid.set_scroll_region(top, bottom);
            }
            _ => self.unknown_csi(buf, action),
        }
    }

    fn unknown_csi(&self, buffer: &[u8], action: u8) {
        warn!(
            "unknown CSI sequence: {} {}",
            String::from_utf8_lossy(buffer),
            action as char
        );
    }

    /// DECSET (CSI ? Pm h) / DECRST (CSI ? Pm l)
    fn private_mode(&self, p: &mut Performer, part: &[u8], enable: bool) {
        let mode = parse_int(part) as u16;
        match mode {
            3 => {
                // DECCOLM: 132/80 column mode
                let cols = if enable { 132 } else { 80 };
                let rows = p.grid.rows();
                p.grid.resize(cols, rows);
                if let Some(pty) = p.pty {
                    if let Err(e) = pty.set_size(cols as u16, rows as u16) {
                        warn!("pty resize failed: {}", e);
                    }
                }
                p.host.resize_width(cols as u32 * p.cell_width);
            }
            5 => {
                // DECSCNM: reverse video
                p.grid.modes.reverse_video = enable;
            }
            6 => {
                // DECOM: origin mode
                p.grid.modes.origin_mode = enable;
                p.grid.clamp_cursor();
            }
            7 => {
                // DECAWM: auto-wrap
                p.grid.modes.auto_wrap = enable;
            }
            25 => {
                // DECTCEM: cursor visibility
                p.grid.modes.show_cursor = enable;
            }
            _ => {
                // ?1, ?4, ?12, ?40, mouse tracking, bracketed paste, ...
                trace!(
                    "unimplemented DEC private mode: ?{} {}",
                    mode,
                    if enable { 'h' } else { 'l' }
                );
                p.grid.modes.set_private_flag(mode, enable);
            }
        }
    }

    /// SGR (CSI Pm m): character attributes, processed in parameter order
    fn handle_sgr(&self, p: &mut Performer, buffer: &[u8]) {
        let parts = split_params(buffer);
        let mut i = 0;
        while i < parts.len() {
            let param = parse_int(parts[i]);
            match param {
                0 => p.grid.reset_style(),
                1 => p.grid.set_bold(true),
                2 => {} // faint: parsed, not stored
                4 => {} // underline: parsed, not stored
                5 | 6 => p.grid.set_blink(true),
                7 => p.grid.swap_colors(),
                9 => {} // strikethrough: parsed, not stored
                10 => p.grid.reset_style(), // primary font, clears attributes
                21 => {} // doubly underlined: parsed, not stored
                22 => p.grid.set_bold(false),
                24 => {} // not underlined
                25 => p.grid.set_blink(false),
                27 => p.grid.swap_colors(),
                30..=37 => p.grid.set_foreground(palette_color((param - 30) as u8)),
                38 | 48 => {
                    if let Some((color, consumed)) = parse_extended_color(&parts[i + 1..]) {
                        if param == 38 {
                            p.grid.set_foreground(color);
                        } else {
                            p.grid.set_background(color);
                        }
                        i += consumed;
                    }
                }
                39 => p.grid.set_foreground(palette_color(0)),
                40..=47 => p.grid.set_background(palette_color((param - 40) as u8)),
                49 => p.grid.set_background(palette_color(7)),
                90..=97 => p.grid.set_foreground(palette_color((8 + param - 90) as u8)),
                100..=107 => p.grid.set_background(palette_color((8 + param - 100) as u8)),
                other => trace!("unhandled SGR parameter: {}", other),
            }
            i += 1;
        }
    }

    // ========== OSC ==========

    fn osc(&mut self, p: &mut Performer, byte: u8) {
        match byte {
            0x07 => {
                // BEL terminator
                let payload = std::mem::take(&mut self.buffer);
                self.osc_dispatch(p, &payload);
                self.state = EscapeState::Ground;
            }
            b'\\' if self.buffer.last() == Some(&0x1b) => {
                // ST terminator (ESC \)
                let mut payload = std::mem::take(&mut self.buffer);
                payload.pop();
                self.osc_dispatch(p, &payload);
                self.state = EscapeState::Ground;
            }
            0x20..=0x7e | 0x1b => {
                if self.buffer.len() < MAX_STRING_BUFFER {
                    self.buffer.push(byte);
                }
            }
            _ => {
                warn!(
                    "invalid byte 0x{:02x} in OSC sequence {}",
                    byte,
                    String::from_utf8_lossy(&self.buffer)
                );
                self.state = EscapeState::Ground;
            }
        }
    }

    fn osc_dispatch(&mut self, p: &mut Performer, payload: &[u8]) {
        let parts = split_params(payload);
        match parts.as_slice() {
            [b"52", b"c", b"?"] => {
                // paste request; the content arrives later via clipboard_poll
                trace!("clipboard paste requested");
                p.host.clipboard_request_paste();
            }
            [b"52", b"c", data] => {
                trace!("clipboard copy: {} bytes", data.len());
                p.host.clipboard_copy(&String::from_utf8_lossy(data));
            }
            [b"10", b"?"] => {
                // report foreground color: black
                p.responses.extend_from_slice(b"\x1b]10;rgb:0/0/0\x1b\\");
            }
            [b"11", b"?"] => {
                // report background color: white
                p.responses.extend_from_slice(b"\x1b]10;rgb:f/f/f\x1b\\");
            }
            _ => {
                trace!("ignoring OSC sequence: {}", String::from_utf8_lossy(payload));
            }
        }
    }

    // ========== DCS ==========

    fn dcs(&mut self, byte: u8) {
        match byte {
            b'\\' if self.buffer.last() == Some(&0x1b) => {
                // ST terminator; the payload is discarded
                self.buffer.clear();
                self.state = EscapeState::Ground;
            }
            0x20..=0x7e | 0x1b => {
                if self.buffer.len() < MAX_STRING_BUFFER {
                    self.buffer.push(byte);
                }
            }
            _ => {
                warn!("invalid byte 0x{:02x} in DCS sequence", byte);
                self.state = EscapeState::Ground;
            }
        }
    }
}
