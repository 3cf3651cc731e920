//! vtcon - VT100/xterm-compatible terminal emulator core
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Terminal (mutex)               │
//! ├─────────────────────────────────────────────┤
//! │  PTY bytes → UTF-8 / Escape Parser          │
//! │                     ↓                       │
//! │          Grid (cells + scrollback)          │
//! │                     ↓                       │
//! │        Snapshot (renderer, read-only)       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The crate owns the terminal state machine: byte-wise UTF-8 decoding,
//! ESC/CSI/OSC/DCS parsing, and the screen model (grid, scrollback history,
//! cursor, tab stops, scrolling region, modes). Rendering, font handling and
//! keyboard/window integration are left to the embedding host, which reads
//! the screen through the shared mutex and feeds input with
//! [`terminal::Terminal::send_data`].

pub mod config;
pub mod terminal;
