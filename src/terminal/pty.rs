//! PTY (pseudo-terminal) management
//!
//! Creates the pty pair with forkpty and spawns the user's shell in the
//! child process. Provides master-side read/write and the window-size
//! ioctl used by the resize coordinator.

use anyhow::{anyhow, Result};
use log::info;
use nix::errno::Errno;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, Pid};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// PTY management structure
pub struct Pty {
    /// Master side file descriptor
    master: OwnedFd,
    /// Child process PID
    child_pid: Pid,
}

impl Pty {
    /// Create the pty and spawn the shell with the given initial size.
    /// `term_env` sets the TERM environment variable for the child.
    pub fn spawn(cols: u16, rows: u16, term_env: &str) -> Result<Self> {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        let ForkptyResult {
            master,
            fork_result,
        } = unsafe { forkpty(Some(&winsize), None)? };

        match fork_result {
            ForkResult::Child => {
                // Child process: set environment and exec the shell
                std::env::set_var("TERM", term_env);

                let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
                let shell_cstr =
                    std::ffi::CString::new(shell.as_str()).expect("NUL byte in shell path");

                // Launch as a login shell (argv0 prefixed with '-')
                let shell_name = std::path::Path::new(&shell)
                    .file_name()
                    .map(|n| format!("-{}", n.to_string_lossy()))
                    .unwrap_or_else(|| "-sh".to_string());
                let argv0 = std::ffi::CString::new(shell_name).expect("NUL byte in argv0");

                match nix::unistd::execvp(&shell_cstr, &[&argv0]) {
                    Ok(infallible) => match infallible {},
                    Err(e) => panic!("failed to spawn shell: {}", e),
                }
            }
            ForkResult::Parent { child } => {
                let master: OwnedFd = unsafe { OwnedFd::from_raw_fd(master) };
                info!("pty spawned: pid={}, master_fd={}", child, master.as_raw_fd());

                // Non-blocking master; the worker drives it with poll
                let flags = nix::fcntl::fcntl(master.as_raw_fd(), nix::fcntl::FcntlArg::F_GETFL)?;
                let mut flags = nix::fcntl::OFlag::from_bits_truncate(flags);
                flags.insert(nix::fcntl::OFlag::O_NONBLOCK);
                nix::fcntl::fcntl(master.as_raw_fd(), nix::fcntl::FcntlArg::F_SETFL(flags))?;

                Ok(Self {
                    master,
                    child_pid: child,
                })
            }
        }
    }

    /// Raw master fd, for poll/read in the worker loop
    pub fn raw_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }

    /// Non-blocking read from the pty.
    /// Returns Ok(0) when no data is available. `EIO` (child exit) and other
    /// errors are returned raw so the worker can tell them apart.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        match nix::unistd::read(self.master.as_raw_fd(), buf) {
            Ok(n) => Ok(n),
            Err(Errno::EAGAIN) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Write the whole buffer to the pty, retrying partial writes
    pub fn write_all(&self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            match nix::unistd::write(self.master.as_raw_fd(), &data[written..]) {
                Ok(n) => written += n,
                Err(Errno::EINTR) | Err(Errno::EAGAIN) => {}
                Err(e) => return Err(anyhow!("pty write error: {}", e)),
            }
        }
        Ok(())
    }

    /// Change terminal size (TIOCSWINSZ) and signal the child
    pub fn set_size(&self, cols: u16, rows: u16) -> Result<()> {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        unsafe {
            let ret = libc::ioctl(
                self.master.as_raw_fd(),
                libc::TIOCSWINSZ,
                &winsize as *const Winsize,
            );
            if ret < 0 {
                return Err(anyhow!("TIOCSWINSZ failed: {}", io::Error::last_os_error()));
            }
        }

        let _ = nix::sys::signal::kill(self.child_pid, nix::sys::signal::Signal::SIGWINCH);

        Ok(())
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        // Hang up and reap the child
        let _ = nix::sys::signal::kill(self.child_pid, nix::sys::signal::Signal::SIGHUP);
        let _ = waitpid(self.child_pid, None);
    }
}
