#![forbid(unsafe_code)]

//! Clipboard shell-out providers.
//!
//! Unix has no clipboard syscall; the usual tools are shelled out to
//! instead, best-effort and bounded by a one-second timeout:
//!
//! | Platform          | Copy        | Paste        |
//! |-------------------|-------------|--------------|
//! | macOS             | `pbcopy`    | `pbpaste`    |
//! | Wayland           | `wl-copy`   | `wl-paste`   |
//! | X11               | `xclip`     | `xclip -o`   |
//! | X11 (fallback)    | `xsel -ib`  | `xsel -ob`   |
//!
//! When no provider binary is on `PATH` the caller falls back to OSC 52
//! (set only) if that was enabled.

use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::time::Instant;

use weft_backend::CLIPBOARD_TIMEOUT;
use weft_core::error::{Error, Result};

/// A detected clipboard tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// macOS `pbcopy`/`pbpaste`.
    Pasteboard,
    /// Wayland `wl-copy`/`wl-paste`.
    Wayland,
    /// X11 `xclip`.
    Xclip,
    /// X11 `xsel`.
    Xsel,
}

/// Search `PATH` for an executable.
fn on_path(binary: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| dir.join(binary).is_file())
}

/// Pick the provider for the current session, if any.
#[must_use]
pub fn detect() -> Option<Provider> {
    if cfg!(target_os = "macos") && on_path("pbcopy") && on_path("pbpaste") {
        return Some(Provider::Pasteboard);
    }
    if std::env::var_os("WAYLAND_DISPLAY").is_some() && on_path("wl-copy") && on_path("wl-paste") {
        return Some(Provider::Wayland);
    }
    if std::env::var_os("DISPLAY").is_some() {
        if on_path("xclip") {
            return Some(Provider::Xclip);
        }
        if on_path("xsel") {
            return Some(Provider::Xsel);
        }
    }
    None
}

impl Provider {
    fn copy_command(self) -> Command {
        match self {
            Self::Pasteboard => Command::new("pbcopy"),
            Self::Wayland => Command::new("wl-copy"),
            Self::Xclip => {
                let mut cmd = Command::new("xclip");
                cmd.args(["-in", "-selection", "clipboard"]);
                cmd
            }
            Self::Xsel => {
                let mut cmd = Command::new("xsel");
                cmd.args(["--input", "--clipboard"]);
                cmd
            }
        }
    }

    fn paste_command(self) -> Command {
        match self {
            Self::Pasteboard => Command::new("pbpaste"),
            Self::Wayland => {
                let mut cmd = Command::new("wl-paste");
                cmd.arg("--no-newline");
                cmd
            }
            Self::Xclip => {
                let mut cmd = Command::new("xclip");
                cmd.args(["-out", "-selection", "clipboard"]);
                cmd
            }
            Self::Xsel => {
                let mut cmd = Command::new("xsel");
                cmd.args(["--output", "--clipboard"]);
                cmd
            }
        }
    }

    /// Write `text` to the clipboard.
    pub fn set(self, text: &str) -> Result<()> {
        let mut child = self
            .copy_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
        }
        wait_bounded(child)?;
        Ok(())
    }

    /// Read the clipboard.
    pub fn get(self) -> Result<Option<String>> {
        let child = self
            .paste_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let output = wait_bounded(child)?;
        Ok(Some(String::from_utf8_lossy(&output).into_owned()))
    }
}

/// Wait for the helper, killing it when it overstays the timeout.
fn wait_bounded(mut child: Child) -> Result<Vec<u8>> {
    use std::io::Read;

    let deadline = Instant::now() + CLIPBOARD_TIMEOUT;
    loop {
        match child.try_wait()? {
            Some(status) => {
                if !status.success() {
                    return Err(Error::Io(std::io::Error::other(format!(
                        "clipboard helper exited with {status}"
                    ))));
                }
                let mut output = Vec::new();
                if let Some(mut stdout) = child.stdout.take() {
                    stdout.read_to_end(&mut output)?;
                }
                return Ok(output);
            }
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "clipboard helper timed out",
                )));
            }
            None => std::thread::sleep(std::time::Duration::from_millis(10)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_probe_finds_shell() {
        // Something named `sh` exists on every Unix test host.
        assert!(on_path("sh"));
        assert!(!on_path("weft-definitely-not-a-binary"));
    }
}
