//! Terminal emulation
//!
//! Core module integrating PTY, VT parser and character grid to form the
//! terminal emulator. All screen and parser state lives behind one coarse
//! mutex shared by the pty worker thread, the embedding host and the
//! renderer's snapshot reads.

pub mod grid;
pub mod parser;
pub mod pty;
pub mod utf8;

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use anyhow::{Context, Result};
use log::{info, trace, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};

use grid::Grid;
use parser::{Parser, Performer};
use pty::Pty;

/// Read buffer size for one pty drain
const READ_BUF_SIZE: usize = 1024;

/// Pty poll timeout in milliseconds
const POLL_TIMEOUT_MS: libc::c_int = 100;

/// Notice printed into the grid when the child exits
const RESTART_NOTICE: &str = "[program exited, restarting]";

/// Host integration callbacks: clipboard access and window-width changes.
/// All methods default to no-ops so embedders implement only what they have.
pub trait Host: Send {
    /// OSC 52 clipboard write; the payload is base64 as received
    fn clipboard_copy(&mut self, base64: &str) {
        let _ = base64;
    }

    /// OSC 52 clipboard read request; the content is delivered later
    /// through [`Host::clipboard_poll`]
    fn clipboard_request_paste(&mut self) {}

    /// A previously requested paste, base64-encoded, once available
    fn clipboard_poll(&mut self) -> Option<String> {
        None
    }

    /// Window width changed by 80/132 column mode (DECCOLM), in pixels
    fn resize_width(&mut self, width_px: u32) {
        let _ = width_px;
    }
}

/// Host with no clipboard and no window integration
pub struct NullHost;

impl Host for NullHost {}

/// Hex-escape control bytes for log output
fn pretty_bytes(data: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(data.len());
    for &b in data {
        if (0x20..0x7f).contains(&b) {
            out.push(b as char);
        } else {
            let _ = write!(out, "\\x{:02x}", b);
        }
    }
    out
}

/// Terminal state protected by the coarse mutex
pub struct TermState {
    /// Character grid and scrollback
    pub grid: Grid,
    /// Escape-sequence parser state
    parser: Parser,
    /// Pty master; None after the child exits and before respawn succeeds
    pty: Option<Pty>,
    /// Host callbacks
    host: Box<dyn Host>,
    /// Reply bytes accumulated during a parse batch
    responses: Vec<u8>,
    /// Scrollback view offset in lines (0 = live)
    pub scroll_offset: usize,
    /// TERM value for spawned children
    term_env: String,
    /// Cell size in pixels, for the DECCOLM width callback
    cell_width: u32,
    cell_height: u32,
}

impl TermState {
    /// Cell size in pixels as configured by the host
    pub fn cell_size(&self) -> (u32, u32) {
        (self.cell_width, self.cell_height)
    }

    /// Parse a batch of pty bytes. Effects are applied cell by cell; replies
    /// accumulate in `responses` until [`TermState::flush_responses`].
    fn parse_bytes(&mut self, bytes: &[u8]) {
        let TermState {
            grid,
            parser,
            pty,
            host,
            responses,
            cell_width,
            ..
        } = self;
        let mut performer = Performer {
            grid,
            responses,
            host: host.as_mut(),
            pty: pty.as_ref(),
            cell_width: *cell_width,
        };
        for &b in bytes {
            parser.advance(&mut performer, b);
        }
    }

    /// Write pending replies (device attributes, cursor reports, ...) back
    /// to the child, ordered after the bytes that triggered them.
    fn flush_responses(&mut self) {
        if self.responses.is_empty() {
            return;
        }
        let out = std::mem::take(&mut self.responses);
        self.write_full(&out);
    }

    /// Write the whole buffer to the pty. A missing pty (child gone)
    /// disables writes.
    fn write_full(&self, data: &[u8]) {
        let Some(pty) = self.pty.as_ref() else {
            return;
        };
        info!("Send: {}", pretty_bytes(data));
        if let Err(e) = pty.write_all(data) {
            warn!("pty write failed: {}", e);
        }
    }

    /// Print the child-exit notice on a fresh line
    fn print_restart_notice(&mut self) {
        if self.grid.cursor_col > 0 {
            self.grid.linefeed();
            self.grid.carriage_return();
        }
        for ch in RESTART_NOTICE.chars() {
            self.grid.put_char(ch as u32);
        }
        self.grid.linefeed();
        self.grid.carriage_return();
    }

    /// Child exited (EIO on the master): drop the fd, print a notice on a
    /// fresh line and respawn the shell.
    fn handle_child_exit(&mut self) {
        self.pty = None;
        self.print_restart_notice();

        match Pty::spawn(
            self.grid.cols() as u16,
            self.grid.rows() as u16,
            &self.term_env,
        ) {
            Ok(pty) => self.pty = Some(pty),
            Err(e) => warn!("failed to respawn child: {}", e),
        }
    }
}

fn lock_state(state: &Mutex<TermState>) -> MutexGuard<'_, TermState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Pty worker loop: poll the master with a 100 ms timeout, feed bytes to
/// the parser under the mutex, recover from child exit, and deliver any
/// pending clipboard paste as an OSC 52 reply.
fn worker(state: Arc<Mutex<TermState>>) {
    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        let Some(fd) = lock_state(&state).pty.as_ref().map(|p| p.raw_fd()) else {
            return;
        };

        // poll outside the mutex so snapshot readers are never blocked on I/O
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        let readable = match poll(&mut fds, POLL_TIMEOUT_MS) {
            Ok(n) => n > 0,
            Err(Errno::EINTR) => false,
            Err(e) => {
                warn!("pty poll failed: {}", e);
                false
            }
        };

        if readable {
            let mut st = lock_state(&state);
            let res = st.pty.as_ref().map(|p| p.read(&mut buf));
            match res {
                Some(Ok(0)) | None => {}
                Some(Ok(n)) => {
                    trace!("Got: {}", pretty_bytes(&buf[..n]));
                    st.parse_bytes(&buf[..n]);
                    st.flush_responses();
                }
                Some(Err(Errno::EIO)) => {
                    // child exit shows up as EIO on the master
                    info!("child exited, restarting");
                    st.handle_child_exit();
                }
                Some(Err(e)) => {
                    warn!("pty read failed: {}", e);
                }
            }
        }

        // anything ready to paste?
        let mut st = lock_state(&state);
        if let Some(paste) = st.host.clipboard_poll() {
            info!("delivering paste: {} bytes", paste.len());
            let reply = format!("\x1b]52;c;{}\x1b\\", paste);
            st.write_full(reply.as_bytes());
        }
    }
}

/// Terminal emulator handle. Cheap to clone; all clones share the same
/// state behind the mutex.
#[derive(Clone)]
pub struct Terminal {
    state: Arc<Mutex<TermState>>,
}

impl Terminal {
    /// Create the screen model with the given geometry. The child is not
    /// spawned until [`Terminal::start`].
    pub fn new(cols: usize, rows: usize, host: Box<dyn Host>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TermState {
                grid: Grid::new(cols, rows),
                parser: Parser::new(),
                pty: None,
                host,
                responses: Vec::with_capacity(256),
                scroll_offset: 0,
                term_env: "xterm-256color".to_string(),
                cell_width: 12,
                cell_height: 24,
            })),
        }
    }

    /// TERM value used for spawned children
    pub fn set_term_env(&self, term: &str) {
        lock_state(&self.state).term_env = term.to_string();
    }

    /// Cell size in pixels, used for the DECCOLM host width callback
    pub fn set_cell_size(&self, width: u32, height: u32) {
        let mut st = lock_state(&self.state);
        st.cell_width = width.max(1);
        st.cell_height = height.max(1);
    }

    /// Spawn the shell and start the pty worker thread. Subsequent calls
    /// are no-ops while the child is running.
    pub fn start(&self) -> Result<()> {
        {
            let mut st = lock_state(&self.state);
            if st.pty.is_some() {
                return Ok(());
            }
            let pty = Pty::spawn(st.grid.cols() as u16, st.grid.rows() as u16, &st.term_env)?;
            st.pty = Some(pty);
        }

        let state = Arc::clone(&self.state);
        thread::Builder::new()
            .name("terminal worker".to_string())
            .spawn(move || worker(state))
            .context("failed to spawn terminal worker")?;
        Ok(())
    }

    /// Forward user input (keyboard bytes) to the child and snap the
    /// scrollback view back to the live screen.
    pub fn send_data(&self, data: &[u8]) {
        let mut st = lock_state(&self.state);
        st.scroll_offset = 0;
        st.write_full(data);
    }

    /// Apply a geometry change: reshape the grid, then notify the pty with
    /// the window-size ioctl.
    pub fn resize(&self, cols: usize, rows: usize) {
        let mut st = lock_state(&self.state);
        info!(
            "terminal resize: {}x{} -> {}x{}",
            st.grid.cols(),
            st.grid.rows(),
            cols,
            rows
        );
        st.grid.resize(cols, rows);
        if let Some(pty) = st.pty.as_ref() {
            if let Err(e) = pty.set_size(st.grid.cols() as u16, st.grid.rows() as u16) {
                warn!("pty resize failed: {}", e);
            }
        }
        st.scroll_offset = 0;
    }

    /// Move the scrollback view by `lines` (positive = into history),
    /// clamped to the available history.
    pub fn scroll_by(&self, lines: isize) {
        let mut st = lock_state(&self.state);
        let max = st.grid.history_len() as isize;
        let next = st.scroll_offset as isize + lines;
        st.scroll_offset = next.clamp(0, max) as usize;
    }

    /// Lock the shared state for snapshotting (renderer) or inspection.
    /// Hold the guard only long enough to copy what is needed; the pty
    /// worker parses under the same mutex.
    pub fn lock(&self) -> MutexGuard<'_, TermState> {
        lock_state(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_bytes_escapes_controls() {
        assert_eq!(pretty_bytes(b"ls\r"), "ls\\x0d");
        assert_eq!(pretty_bytes(b"\x1b[0n"), "\\x1b[0n");
        assert_eq!(pretty_bytes(b"plain"), "plain");
    }

    #[test]
    fn scroll_by_clamps_to_history() {
        let term = Terminal::new(20, 5, Box::new(NullHost));
        {
            let mut st = term.lock();
            for _ in 0..10 {
                st.grid.linefeed();
            }
            assert_eq!(st.grid.history_len(), 6);
        }
        term.scroll_by(100);
        assert_eq!(term.lock().scroll_offset, 6);
        term.scroll_by(-2);
        assert_eq!(term.lock().scroll_offset, 4);
        term.scroll_by(-100);
        assert_eq!(term.lock().scroll_offset, 0);
    }

    #[test]
    fn restart_notice_lands_on_fresh_line() {
        let term = Terminal::new(80, 24, Box::new(NullHost));
        let mut st = term.lock();
        st.parse_bytes(b"some output");
        st.print_restart_notice();
        assert_eq!(st.grid.row_text(0).trim_end(), "some output");
        assert_eq!(st.grid.row_text(1).trim_end(), RESTART_NOTICE);
        assert_eq!(st.grid.cursor_col, 0);
        assert_eq!(st.grid.cursor_row, 2);
    }

    #[test]
    fn restart_notice_at_line_start_does_not_skip_a_row() {
        let term = Terminal::new(80, 24, Box::new(NullHost));
        let mut st = term.lock();
        st.parse_bytes(b"some output\r\n");
        st.print_restart_notice();
        assert_eq!(st.grid.row_text(1).trim_end(), RESTART_NOTICE);
        assert_eq!(st.grid.cursor_row, 2);
    }

    #[test]
    fn send_data_resets_scroll_offset() {
        let term = Terminal::new(20, 5, Box::new(NullHost));
        {
            let mut st = term.lock();
            for _ in 0..10 {
                st.grid.linefeed();
            }
        }
        term.scroll_by(3);
        assert_eq!(term.lock().scroll_offset, 3);
        // no pty attached: the write is dropped but the view snaps back
        term.send_data(b"ls\r");
        assert_eq!(term.lock().scroll_offset, 0);
    }
}
