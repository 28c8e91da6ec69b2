#![forbid(unsafe_code)]

//! Scope registry: ref-counted, restore-on-drop terminal state.
//!
//! Every scoped state change goes through here. Each feature keeps a
//! count; the backend is only told about the 0→1 and 1→0 transitions
//! (or an effective-rank change for stacked raw/mouse modes), and the
//! value observed before the first acquire is what the last release
//! restores. Handles are droppable on any thread and dispose is
//! idempotent: the restore runs exactly once, on explicit `close` or on
//! drop, whichever comes first.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use weft_backend::{Backend, MouseMode, RawMode};
use weft_core::error::Result;
use weft_core::geometry::TermPos;

#[derive(Debug, Default)]
struct ScopeData {
    /// Active raw-mode scopes; the effective mode is the highest rank.
    raw: Vec<RawMode>,
    alternate_screen: u32,
    hidden_cursor: u32,
    bracketed_paste: u32,
    echo_off: u32,
    /// Active mouse scopes per mode (index = rank).
    mouse: [u32; 4],
    /// Title stack: scope id and the title it set.
    titles: Vec<(u64, String)>,
    /// Title observed before the first title scope, when readable.
    saved_title: Option<String>,
}

struct RegistryInner {
    backend: Arc<dyn Backend>,
    data: Mutex<ScopeData>,
    next_id: AtomicU64,
}

fn lock(inner: &RegistryInner) -> MutexGuard<'_, ScopeData> {
    inner.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Ref-counted scope bookkeeping for one backend.
#[derive(Clone)]
pub(crate) struct ScopeRegistry {
    inner: Arc<RegistryInner>,
}

impl ScopeRegistry {
    pub(crate) fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                backend,
                data: Mutex::new(ScopeData::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn scope(&self, kind: ScopeKind) -> Scope {
        Scope {
            inner: Arc::clone(&self.inner),
            kind,
            released: AtomicBool::new(false),
        }
    }

    fn mouse_effective(data: &ScopeData) -> MouseMode {
        const RANKS: [MouseMode; 4] = [
            MouseMode::Move,
            MouseMode::Drag,
            MouseMode::Clicks,
            MouseMode::Off,
        ];
        for mode in RANKS {
            if mode != MouseMode::Off && data.mouse[mode as usize] > 0 {
                return mode;
            }
        }
        MouseMode::Off
    }

    fn raw_effective(data: &ScopeData) -> Option<RawMode> {
        data.raw.iter().copied().max()
    }

    pub(crate) fn enter_raw(&self, mode: RawMode) -> Result<Scope> {
        let mut data = lock(&self.inner);
        let before = Self::raw_effective(&data);
        data.raw.push(mode);
        let after = Self::raw_effective(&data);
        if before != after {
            self.inner.backend.set_raw_mode(after)?;
        }
        drop(data);
        tracing::debug!(?mode, "entered raw-mode scope");
        Ok(self.scope(ScopeKind::Raw(mode)))
    }

    pub(crate) fn enter_alternate_screen(&self) -> Result<Scope> {
        let mut data = lock(&self.inner);
        if data.alternate_screen == 0 {
            self.inner.backend.set_alternate_screen(true)?;
        }
        data.alternate_screen += 1;
        drop(data);
        Ok(self.scope(ScopeKind::AlternateScreen))
    }

    pub(crate) fn enter_hidden_cursor(&self) -> Result<Scope> {
        let mut data = lock(&self.inner);
        if data.hidden_cursor == 0 {
            self.inner.backend.set_cursor_visible(false)?;
        }
        data.hidden_cursor += 1;
        drop(data);
        Ok(self.scope(ScopeKind::HiddenCursor))
    }

    pub(crate) fn enter_bracketed_paste(&self) -> Result<Scope> {
        let mut data = lock(&self.inner);
        if data.bracketed_paste == 0 {
            self.inner.backend.set_bracketed_paste(true)?;
        }
        data.bracketed_paste += 1;
        drop(data);
        Ok(self.scope(ScopeKind::BracketedPaste))
    }

    pub(crate) fn enter_echo_off(&self) -> Result<Scope> {
        let mut data = lock(&self.inner);
        if data.echo_off == 0 {
            self.inner.backend.set_input_echo(false)?;
        }
        data.echo_off += 1;
        drop(data);
        Ok(self.scope(ScopeKind::EchoOff))
    }

    pub(crate) fn enter_mouse(&self, mode: MouseMode) -> Result<Scope> {
        if mode == MouseMode::Off {
            return Err(weft_core::error::Error::invalid_argument(
                "mouse scope requires a reporting mode",
            ));
        }
        let mut data = lock(&self.inner);
        let before = Self::mouse_effective(&data);
        data.mouse[mode as usize] += 1;
        let after = Self::mouse_effective(&data);
        if before != after {
            self.inner.backend.set_mouse_mode(after)?;
        }
        drop(data);
        Ok(self.scope(ScopeKind::Mouse(mode)))
    }

    pub(crate) fn enter_title(&self, title: &str) -> Result<Scope> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut data = lock(&self.inner);
        if data.titles.is_empty() {
            data.saved_title = self.inner.backend.title().unwrap_or(None);
        }
        data.titles.push((id, title.to_owned()));
        self.inner.backend.set_title(title)?;
        drop(data);
        Ok(self.scope(ScopeKind::Title(id)))
    }

    pub(crate) fn enter_cursor_position(&self) -> Result<Scope> {
        let saved = self.inner.backend.cursor_position()?;
        Ok(self.scope(ScopeKind::CursorPosition(saved)))
    }

    fn release(&self, kind: &ScopeKind) -> Result<()> {
        release_inner(&self.inner, kind)
    }
}

impl std::fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeRegistry").finish_non_exhaustive()
    }
}

fn release_inner(inner: &RegistryInner, kind: &ScopeKind) -> Result<()> {
    match kind {
        ScopeKind::Raw(mode) => {
            let mut data = lock(inner);
            let before = ScopeRegistry::raw_effective(&data);
            if let Some(at) = data.raw.iter().rposition(|m| m == mode) {
                data.raw.remove(at);
            }
            let after = ScopeRegistry::raw_effective(&data);
            if before != after {
                inner.backend.set_raw_mode(after)?;
            }
        }
        ScopeKind::AlternateScreen => {
            let mut data = lock(inner);
            data.alternate_screen = data.alternate_screen.saturating_sub(1);
            if data.alternate_screen == 0 {
                inner.backend.set_alternate_screen(false)?;
            }
        }
        ScopeKind::HiddenCursor => {
            let mut data = lock(inner);
            data.hidden_cursor = data.hidden_cursor.saturating_sub(1);
            if data.hidden_cursor == 0 {
                inner.backend.set_cursor_visible(true)?;
            }
        }
        ScopeKind::BracketedPaste => {
            let mut data = lock(inner);
            data.bracketed_paste = data.bracketed_paste.saturating_sub(1);
            if data.bracketed_paste == 0 {
                inner.backend.set_bracketed_paste(false)?;
            }
        }
        ScopeKind::EchoOff => {
            let mut data = lock(inner);
            data.echo_off = data.echo_off.saturating_sub(1);
            if data.echo_off == 0 {
                inner.backend.set_input_echo(true)?;
            }
        }
        ScopeKind::Mouse(mode) => {
            let mut data = lock(inner);
            let before = ScopeRegistry::mouse_effective(&data);
            let slot = &mut data.mouse[*mode as usize];
            *slot = slot.saturating_sub(1);
            let after = ScopeRegistry::mouse_effective(&data);
            if before != after {
                inner.backend.set_mouse_mode(after)?;
            }
        }
        ScopeKind::Title(id) => {
            let mut data = lock(inner);
            data.titles.retain(|(scope_id, _)| scope_id != id);
            let restore = data
                .titles
                .last()
                .map(|(_, title)| title.clone())
                .or_else(|| data.saved_title.clone())
                .unwrap_or_default();
            inner.backend.set_title(&restore)?;
        }
        ScopeKind::CursorPosition(saved) => {
            inner.backend.set_cursor_position(*saved)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum ScopeKind {
    Raw(RawMode),
    AlternateScreen,
    HiddenCursor,
    BracketedPaste,
    EchoOff,
    Mouse(MouseMode),
    Title(u64),
    CursorPosition(TermPos),
}

/// A live scoped state change.
///
/// Dropping (or explicitly closing) the scope restores the previous
/// state, exactly once.
#[must_use = "dropping the scope immediately restores the previous state"]
pub struct Scope {
    inner: Arc<RegistryInner>,
    kind: ScopeKind,
    released: AtomicBool,
}

impl Scope {
    /// Run the restore now, surfacing any backend error.
    pub fn close(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        release_inner(&self.inner, &self.kind)
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if release_inner(&self.inner, &self.kind).is_err() {
            tracing::warn!(kind = ?self.kind, "scope restore failed during drop");
        }
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope").field("kind", &self.kind).finish()
    }
}
