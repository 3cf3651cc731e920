//! vtcon debug driver
//!
//! The emulator core is a library; this binary exists to smoke-test it
//! against a real shell without a renderer attached: it spawns the child,
//! runs a command through the full pty/parser/grid path and dumps the
//! resulting screen as text.

use std::time::Duration;

use anyhow::Result;

use vtcon::config::Config;
use vtcon::terminal::{NullHost, Terminal};

/// Print help message
fn print_help() {
    println!(
        r#"vtcon {} - VT100/xterm-compatible terminal emulator core

USAGE:
    vtcon [OPTIONS]

OPTIONS:
    -h, --help       Print this help message
    -V, --version    Print version information
    -t, --test       Test mode: run a shell command through the emulator
                     and dump the screen as text

CONFIG FILE:
    ~/.config/vtcon/config.toml
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Test mode: drive a real shell through the emulator and print the grid
fn run_test_mode(config: &Config) -> Result<()> {
    let term = Terminal::new(config.terminal.cols, config.terminal.rows, Box::new(NullHost));
    term.set_term_env(&config.terminal.term);
    term.set_cell_size(config.display.cell_width, config.display.cell_height);
    term.start()?;

    term.send_data(b"echo vtcon says $((6 * 7))\r");
    std::thread::sleep(Duration::from_millis(800));

    let state = term.lock();
    for row in 0..state.grid.rows() {
        let text = state.grid.row_text(row);
        if !text.trim().is_empty() {
            println!("{}", text.trim_end());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_help();
        return Ok(());
    }

    match args[0].as_str() {
        "-h" | "--help" => print_help(),
        "-V" | "--version" => println!("vtcon {}", env!("CARGO_PKG_VERSION")),
        "-t" | "--test" => {
            let config = Config::load();
            run_test_mode(&config)?;
        }
        other => {
            eprintln!("unknown option: {}", other);
            print_help();
            std::process::exit(1);
        }
    }
    Ok(())
}
