#![forbid(unsafe_code)]

//! Input loop thread.
//!
//! One thread owns the read side of `/dev/tty` and the decoder: it polls
//! with a 50 ms timeout, reads whatever is available, UTF-8-decodes it
//! (carrying partial sequences across reads), and feeds the shared VT
//! decoder. On an idle tick it flushes the decoder (resolving a lone ESC
//! into the Escape key) and compares the window size against the last
//! published value, emitting a resize event on change.
//!
//! Only this thread ever touches decoder state.

use std::fs::File;
use std::io::Read;
use std::os::fd::AsFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use weft_backend::{INPUT_POLL_INTERVAL, InputOptions};
use weft_core::broadcast::EventBus;
use weft_core::decoder::{CprSlot, Decoder};
use weft_core::event::{Event, Signal};
use weft_core::geometry::TermSize;

/// SIGINT listener used while the kernel still owns Ctrl+C (cbreak with
/// ISIG set). Registering the handler keeps the default terminate action
/// from running; the signal surfaces as an event instead.
pub struct SigintGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

impl SigintGuard {
    pub fn new(bus: EventBus) -> std::io::Result<Self> {
        let mut signals =
            signal_hook::iterator::Signals::new([signal_hook::consts::signal::SIGINT])?;
        let handle = signals.handle();
        let thread = std::thread::spawn(move || {
            for _ in signals.forever() {
                bus.publish(Event::Signal(Signal::Interrupt));
            }
        });
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for SigintGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Handle to the running input thread.
pub struct InputLoop {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    _sigint: Option<SigintGuard>,
}

impl InputLoop {
    /// Spawn the input thread.
    pub fn spawn(
        bus: EventBus,
        cpr: CprSlot,
        opts: InputOptions,
        initial_size: TermSize,
    ) -> std::io::Result<Self> {
        let tty = File::open("/dev/tty")?;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let sigint = if opts.treat_control_c_as_input {
            None
        } else {
            Some(SigintGuard::new(bus.clone())?)
        };
        let loop_bus = bus.clone();
        let thread = std::thread::Builder::new()
            .name("weft-input".to_owned())
            .spawn(move || {
                let mut decoder = Decoder::with_cpr_slot(cpr);
                decoder.set_ctrl_c_signal(!opts.treat_control_c_as_input);
                run(&tty, &loop_bus, &mut decoder, &stop_flag, initial_size);
            })?;
        Ok(Self {
            stop,
            thread: Some(thread),
            _sigint: sigint,
        })
    }

    /// Signal the thread to stop and join it.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for InputLoop {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(
    tty: &File,
    bus: &EventBus,
    decoder: &mut Decoder,
    stop: &AtomicBool,
    initial_size: TermSize,
) {
    let mut last_size = initial_size;
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1024];

    while !stop.load(Ordering::Relaxed) {
        match poll_readable(tty, INPUT_POLL_INTERVAL) {
            Ok(true) => match reader(tty).read(&mut buf) {
                Ok(0) => {
                    tracing::debug!("tty reached end of input");
                    bus.complete();
                    return;
                }
                Ok(n) => {
                    pending.extend_from_slice(&buf[..n]);
                    let text = take_utf8(&mut pending);
                    for event in decoder.feed(&text, false) {
                        bus.publish(event);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!(%e, "tty read failed, stopping input loop");
                    bus.complete();
                    return;
                }
            },
            Ok(false) => {
                // Idle: flush pending escape state.
                for event in decoder.feed("", true) {
                    bus.publish(event);
                }
            }
            Err(e) => {
                tracing::warn!(%e, "tty poll failed, stopping input loop");
                bus.complete();
                return;
            }
        }

        let size = window_size(tty);
        if !size.is_unknown() && size != last_size {
            last_size = size;
            bus.publish(Event::Resize(size));
        }
    }
}

/// Shared handles read through `&File`.
fn reader(tty: &File) -> &File {
    tty
}

/// Wait up to `timeout` for the fd to become readable.
pub fn poll_readable(tty: &File, timeout: Duration) -> std::io::Result<bool> {
    let mut fds = [nix::poll::PollFd::new(
        tty.as_fd(),
        nix::poll::PollFlags::POLLIN,
    )];
    let timeout_ms: u16 = timeout.as_millis().try_into().unwrap_or(u16::MAX);
    match nix::poll::poll(&mut fds, nix::poll::PollTimeout::from(timeout_ms)) {
        Ok(n) => Ok(n > 0),
        Err(nix::errno::Errno::EINTR) => Ok(false),
        Err(e) => Err(std::io::Error::other(e)),
    }
}

/// Current window size via the size ioctl; unknown on failure.
#[must_use]
pub fn window_size(tty: &File) -> TermSize {
    match rustix::termios::tcgetwinsize(tty) {
        Ok(ws) => TermSize::new(ws.ws_col, ws.ws_row),
        Err(_) => TermSize::default(),
    }
}

/// Drain the decodable prefix of `pending` into a string.
///
/// Invalid sequences become U+FFFD; an incomplete trailing sequence is
/// left in place for the next read to finish.
pub fn take_utf8(pending: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(pending) {
            Ok(s) => {
                out.push_str(s);
                pending.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                if let Ok(s) = std::str::from_utf8(&pending[..valid]) {
                    out.push_str(s);
                }
                match e.error_len() {
                    Some(bad) => {
                        out.push('\u{FFFD}');
                        pending.drain(..valid + bad);
                    }
                    None => {
                        pending.drain(..valid);
                        return out;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::take_utf8;

    #[test]
    fn utf8_complete_chunk() {
        let mut pending = b"hi".to_vec();
        assert_eq!(take_utf8(&mut pending), "hi");
        assert!(pending.is_empty());
    }

    #[test]
    fn utf8_split_sequence_carries_over() {
        let bytes = "é".as_bytes();
        let mut pending = vec![bytes[0]];
        assert_eq!(take_utf8(&mut pending), "");
        assert_eq!(pending, vec![bytes[0]]);
        pending.push(bytes[1]);
        assert_eq!(take_utf8(&mut pending), "é");
        assert!(pending.is_empty());
    }

    #[test]
    fn utf8_invalid_byte_becomes_replacement() {
        let mut pending = vec![b'a', 0xFF, b'b'];
        assert_eq!(take_utf8(&mut pending), "a\u{FFFD}b");
        assert!(pending.is_empty());
    }
}
