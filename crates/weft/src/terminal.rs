#![forbid(unsafe_code)]

//! Terminal facade.
//!
//! The user-facing surface: capability-gated helpers over one backend,
//! the scope factories, the serialized writers, and the event-read
//! APIs. A process-wide instance is available through [`terminal`] and
//! is created lazily with default options; [`init`] installs custom
//! options, and [`Terminal::open`] returns a session handle for
//! deterministic teardown. The backend can only be chosen before the
//! facade is first touched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio_util::sync::CancellationToken;

use weft_backend::{Backend, ClearKind, Color, MemoryBackend, MouseMode, RawMode, TerminalOptions};
use weft_core::broadcast::{EventBus, EventReader, EventStream, SubscriptionHandle};
use weft_core::caps::Capabilities;
use weft_core::error::{Error, Result};
use weft_core::event::{Event, KeyEvent};
use weft_core::geometry::{TermPos, TermSize};

use crate::readline::ReadLineOptions;
use crate::scope::{Scope, ScopeRegistry};
use crate::writer::{Sink, SyncWriter};

struct TerminalInner {
    backend: Arc<dyn Backend>,
    options: TerminalOptions,
    scopes: ScopeRegistry,
    out: SyncWriter,
    error: SyncWriter,
    session_open: AtomicBool,
}

/// The terminal facade.
///
/// Cheap to clone; clones share the backend, scope registry, and output
/// lock.
#[derive(Clone)]
pub struct Terminal {
    inner: Arc<TerminalInner>,
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("terminal", &self.capabilities().terminal_name)
            .finish_non_exhaustive()
    }
}

impl Terminal {
    /// Build a facade over an explicit backend.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn Backend>, options: TerminalOptions) -> Self {
        let output_lock = Arc::new(Mutex::new(()));
        let out = SyncWriter::new(
            Arc::clone(&backend),
            Arc::clone(&output_lock),
            Sink::Out,
            options.prefer_7bit_c1,
        );
        let error = SyncWriter::new(
            Arc::clone(&backend),
            Arc::clone(&output_lock),
            Sink::Error,
            options.prefer_7bit_c1,
        );
        let scopes = ScopeRegistry::new(Arc::clone(&backend));
        Self {
            inner: Arc::new(TerminalInner {
                backend,
                options,
                scopes,
                out,
                error,
                session_open: AtomicBool::new(false),
            }),
        }
    }

    /// Build a facade over the platform backend, falling back to the
    /// in-memory backend when no console is available.
    #[must_use]
    pub fn with_platform_backend(options: TerminalOptions) -> Self {
        let backend = platform_backend(&options);
        Self::with_backend(backend, options)
    }

    /// Open a session on this facade: starts the input loop when
    /// requested and returns a handle whose drop stops it again.
    pub fn open(&self) -> Result<Session> {
        if self.inner.session_open.swap(true, Ordering::SeqCst) {
            return Err(Error::invalid_argument("a session is already open"));
        }
        if self.inner.options.implicit_start_input {
            self.start_input()?;
        }
        Ok(Session {
            terminal: self.clone(),
        })
    }

    // ── Introspection ────────────────────────────────────────────────

    /// The backend capability snapshot.
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        self.inner.backend.capabilities()
    }

    /// The options this facade was initialized with.
    #[must_use]
    pub fn options(&self) -> &TerminalOptions {
        &self.inner.options
    }

    /// The underlying backend (tests and advanced composition).
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    /// Current window size.
    pub fn size(&self) -> Result<TermSize> {
        self.inner.backend.window_size()
    }

    // ── Output ───────────────────────────────────────────────────────

    /// The serialized primary writer.
    #[must_use]
    pub fn out(&self) -> &SyncWriter {
        &self.inner.out
    }

    /// The serialized error writer.
    #[must_use]
    pub fn error(&self) -> &SyncWriter {
        &self.inner.error
    }

    /// Write to the primary output.
    pub fn write(&self, text: &str) -> Result<()> {
        self.inner.out.write(text)
    }

    /// Write a line to the primary output.
    pub fn write_line(&self, text: &str) -> Result<()> {
        self.inner.out.write_line(text)
    }

    /// Render an atomic block on the primary output; see
    /// [`SyncWriter::write_atomic`].
    pub fn write_atomic(
        &self,
        f: impl FnOnce(&mut weft_core::ansi::AnsiWriter<&mut String>) -> std::fmt::Result,
    ) -> Result<()> {
        self.inner.out.write_atomic(f)
    }

    // ── Sized state ──────────────────────────────────────────────────

    /// Query the cursor position.
    pub fn cursor_position(&self) -> Result<TermPos> {
        self.inner.backend.cursor_position()
    }

    /// Move the cursor.
    pub fn set_cursor_position(&self, pos: TermPos) -> Result<()> {
        self.inner.backend.set_cursor_position(pos)
    }

    /// Set the window title.
    pub fn set_title(&self, title: &str) -> Result<()> {
        self.inner.backend.set_title(title)
    }

    /// Set foreground/background colors.
    pub fn set_colors(&self, fg: Option<Color>, bg: Option<Color>) -> Result<()> {
        self.inner.backend.set_colors(fg, bg)
    }

    /// Reset colors to defaults.
    pub fn reset_colors(&self) -> Result<()> {
        self.inner.backend.reset_colors()
    }

    /// Ring the bell.
    pub fn beep(&self) -> Result<()> {
        self.inner.backend.beep()
    }

    /// Erase per [`ClearKind`].
    pub fn clear(&self, kind: ClearKind) -> Result<()> {
        self.inner.backend.clear(kind)
    }

    // ── Clipboard ────────────────────────────────────────────────────

    /// Best-effort clipboard read.
    pub fn clipboard_get(&self) -> Result<Option<String>> {
        self.inner.backend.clipboard_get()
    }

    /// Best-effort clipboard write.
    pub fn clipboard_set(&self, text: &str) -> Result<()> {
        self.inner.backend.clipboard_set(text)
    }

    // ── Input ────────────────────────────────────────────────────────

    /// Start the backend input loop explicitly.
    pub fn start_input(&self) -> Result<()> {
        self.inner
            .backend
            .start_input(self.inner.options.input_options())
    }

    /// Stop the input loop, joining the reader off the async runtime.
    pub async fn stop_input(&self) -> Result<()> {
        let backend = Arc::clone(&self.inner.backend);
        tokio::task::spawn_blocking(move || backend.stop_input())
            .await
            .map_err(|_| Error::Cancelled)?
    }

    fn ensure_input(&self) -> Result<()> {
        if self.inner.options.implicit_start_input && !self.inner.backend.input_running() {
            self.start_input()?;
        }
        Ok(())
    }

    /// The event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        self.inner.backend.events()
    }

    /// Pop the next buffered event without waiting.
    pub fn try_read_event(&self) -> Result<Option<Event>> {
        self.ensure_input()?;
        Ok(self.events().try_read())
    }

    /// Await the next event on the default subscription.
    pub async fn read_event(&self) -> Result<Event> {
        self.ensure_input()?;
        self.events().read().await
    }

    /// [`read_event`](Self::read_event) with cooperative cancellation.
    pub async fn read_event_cancellable(&self, cancel: &CancellationToken) -> Result<Event> {
        self.ensure_input()?;
        self.events().read_cancellable(cancel).await
    }

    /// Subscribe to the full event stream.
    pub fn read_events(&self) -> Result<EventStream> {
        self.ensure_input()?;
        Ok(self.events().stream())
    }

    /// Open a dedicated subscription.
    pub fn subscribe(&self) -> Result<(SubscriptionHandle, EventReader)> {
        self.ensure_input()?;
        Ok(self.events().subscribe())
    }

    /// Whether a key event is buffered at the front of the default
    /// subscription.
    pub fn key_available(&self) -> Result<bool> {
        self.ensure_input()?;
        Ok(matches!(self.events().peek(), Some(Event::Key(_))))
    }

    /// Await the next key event, skipping other event kinds.
    pub async fn read_key(&self) -> Result<KeyEvent> {
        loop {
            if let Event::Key(key) = self.read_event().await? {
                return Ok(key);
            }
        }
    }

    /// Run the interactive line editor; see [`crate::readline`].
    pub async fn read_line(&self, options: &ReadLineOptions) -> Result<Option<String>> {
        self.ensure_input()?;
        crate::readline::read_line(self, options).await
    }

    // ── Scopes ───────────────────────────────────────────────────────

    /// Enter a raw input mode until the scope is dropped.
    pub fn use_raw_mode(&self, mode: RawMode) -> Result<Scope> {
        self.inner.scopes.enter_raw(mode)
    }

    /// Enter the alternate screen until the scope is dropped.
    pub fn use_alternate_screen(&self) -> Result<Scope> {
        self.inner.scopes.enter_alternate_screen()
    }

    /// Hide the cursor until the scope is dropped.
    pub fn hide_cursor(&self) -> Result<Scope> {
        self.inner.scopes.enter_hidden_cursor()
    }

    /// Enable mouse reporting at the given mode until the scope is
    /// dropped. Overlapping scopes keep the highest-ranked mode active.
    pub fn enable_mouse_input(&self, mode: MouseMode) -> Result<Scope> {
        self.inner.scopes.enter_mouse(mode)
    }

    /// Enable bracketed paste until the scope is dropped.
    pub fn enable_bracketed_paste_input(&self) -> Result<Scope> {
        self.inner.scopes.enter_bracketed_paste()
    }

    /// Disable input echo until the scope is dropped.
    pub fn disable_input_echo(&self) -> Result<Scope> {
        self.inner.scopes.enter_echo_off()
    }

    /// Set the window title until the scope is dropped.
    pub fn use_title(&self, title: &str) -> Result<Scope> {
        self.inner.scopes.enter_title(title)
    }

    /// Save the cursor position now and restore it when the scope is
    /// dropped.
    pub fn use_cursor_position(&self) -> Result<Scope> {
        self.inner.scopes.enter_cursor_position()
    }

    /// Stop input and complete the event stream. Called by session drop.
    pub fn shutdown(&self) -> Result<()> {
        let result = self.inner.backend.stop_input();
        self.events().complete();
        self.inner.session_open.store(false, Ordering::SeqCst);
        result
    }
}

/// A deterministic-teardown handle from [`Terminal::open`].
#[derive(Debug)]
pub struct Session {
    terminal: Terminal,
}

impl Session {
    /// The owning facade.
    #[must_use]
    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Stop the input loop and release the slot; the event bus stays
        // usable so another session can open later. Full teardown is
        // [`Terminal::shutdown`].
        if self.terminal.inner.backend.stop_input().is_err() {
            tracing::warn!("failed to stop input during session drop");
        }
        self.terminal.inner.session_open.store(false, Ordering::SeqCst);
    }
}

fn platform_backend(options: &TerminalOptions) -> Arc<dyn Backend> {
    #[cfg(unix)]
    {
        match weft_tty::UnixBackend::new(options) {
            Ok(backend) => {
                if on_ci_host(backend.capabilities()) {
                    tracing::debug!("CI host with redirected stdio, using in-memory backend");
                } else {
                    return Arc::new(backend);
                }
            }
            Err(err) => {
                tracing::warn!(%err, "unix backend unavailable, using in-memory backend");
            }
        }
    }
    #[cfg(windows)]
    {
        match weft_windows::WindowsBackend::new(options) {
            Ok(backend) => {
                if on_ci_host(backend.capabilities()) {
                    tracing::debug!("CI host with redirected stdio, using in-memory backend");
                } else {
                    return Arc::new(backend);
                }
            }
            Err(err) => {
                tracing::warn!(%err, "windows backend unavailable, using in-memory backend");
            }
        }
    }
    Arc::new(MemoryBackend::ci())
}

/// Standard CI markers plus fully redirected stdio select the virtual
/// backend, so CI jobs get deterministic captured output.
#[cfg_attr(not(any(unix, windows)), allow(dead_code))]
fn on_ci_host(caps: &Capabilities) -> bool {
    const CI_MARKERS: &[&str] = &["CI", "GITHUB_ACTIONS", "GITLAB_CI", "BUILDKITE", "TF_BUILD"];
    caps.output_redirected
        && caps.input_redirected
        && CI_MARKERS
            .iter()
            .any(|name| std::env::var_os(name).is_some())
}

static GLOBAL: OnceLock<Terminal> = OnceLock::new();

/// The process-wide terminal, created lazily with default options.
#[must_use]
pub fn terminal() -> &'static Terminal {
    GLOBAL.get_or_init(|| Terminal::with_platform_backend(TerminalOptions::default()))
}

/// Install the process-wide terminal with explicit options.
///
/// Fails once the global facade has been touched: the backend can only
/// be swapped before first use.
pub fn init(options: TerminalOptions) -> Result<&'static Terminal> {
    let mut installed = false;
    let terminal = GLOBAL.get_or_init(|| {
        installed = true;
        Terminal::with_platform_backend(options.clone())
    });
    if installed {
        Ok(terminal)
    } else {
        Err(Error::invalid_argument(
            "terminal already initialized; configure it before first use",
        ))
    }
}
