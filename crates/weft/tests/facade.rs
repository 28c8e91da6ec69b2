//! Facade-level behavior against the in-memory backend: scope
//! restoration, ref-counting, serialized output, and event reads.

use std::sync::Arc;

use weft::{
    Backend, ClearKind, Event, Key, MemoryBackend, MouseMode, RawMode, TermPos, TermSize,
    Terminal, TerminalOptions,
};

fn fixture() -> (Arc<MemoryBackend>, Terminal) {
    let backend = Arc::new(MemoryBackend::new());
    let terminal = Terminal::with_backend(backend.clone(), TerminalOptions::default());
    (backend, terminal)
}

#[test]
fn alternate_screen_scope_restores_on_drop() {
    let (backend, terminal) = fixture();
    let title_before = backend.recorded_title();

    let scope = terminal.use_alternate_screen().unwrap();
    terminal.write("X").unwrap();
    drop(scope);

    assert_eq!(
        backend.out_sink().contents(),
        "\x1b[?1049hX\x1b[?1049l",
        "enter, payload, leave, in order"
    );
    assert_eq!(backend.recorded_title(), title_before);
}

#[test]
fn overlapping_scopes_restore_on_last_exit() {
    let (backend, terminal) = fixture();

    let outer = terminal.use_alternate_screen().unwrap();
    let inner = terminal.use_alternate_screen().unwrap();
    drop(inner);
    assert_eq!(
        backend.out_sink().contents(),
        "\x1b[?1049h",
        "inner exit must not leave the alternate screen"
    );
    drop(outer);
    assert_eq!(backend.out_sink().contents(), "\x1b[?1049h\x1b[?1049l");
}

#[test]
fn scope_close_is_idempotent() {
    let (backend, terminal) = fixture();
    let scope = terminal.hide_cursor().unwrap();
    assert!(!backend.cursor_visible());
    scope.close().unwrap();
    scope.close().unwrap();
    drop(scope);
    assert!(backend.cursor_visible());
    assert_eq!(backend.out_sink().contents(), "\x1b[?25l\x1b[?25h");
}

#[test]
fn input_echo_scope_restores_on_drop() {
    let (backend, terminal) = fixture();
    assert!(backend.input_echo());
    let scope = terminal.disable_input_echo().unwrap();
    assert!(!backend.input_echo());
    drop(scope);
    assert!(backend.input_echo());
}

#[test]
fn mouse_scopes_stack_by_rank() {
    let (backend, terminal) = fixture();

    let clicks = terminal.enable_mouse_input(MouseMode::Clicks).unwrap();
    assert_eq!(backend.mouse_mode(), MouseMode::Clicks);

    let moves = terminal.enable_mouse_input(MouseMode::Move).unwrap();
    assert_eq!(backend.mouse_mode(), MouseMode::Move);

    // Releasing the higher-ranked scope falls back to the survivor.
    drop(moves);
    assert_eq!(backend.mouse_mode(), MouseMode::Clicks);
    drop(clicks);
    assert_eq!(backend.mouse_mode(), MouseMode::Off);
}

#[test]
fn raw_mode_scopes_prefer_the_stronger_mode() {
    let (backend, terminal) = fixture();

    let cbreak = terminal.use_raw_mode(RawMode::CBreak).unwrap();
    assert_eq!(backend.raw_mode(), Some(RawMode::CBreak));
    let raw = terminal.use_raw_mode(RawMode::Raw).unwrap();
    assert_eq!(backend.raw_mode(), Some(RawMode::Raw));
    drop(raw);
    assert_eq!(backend.raw_mode(), Some(RawMode::CBreak));
    drop(cbreak);
    assert_eq!(backend.raw_mode(), None);
}

#[test]
fn title_scopes_nest_and_restore() {
    let (backend, terminal) = fixture();

    let outer = terminal.use_title("outer").unwrap();
    assert_eq!(backend.recorded_title().as_deref(), Some("outer"));
    let inner = terminal.use_title("inner").unwrap();
    assert_eq!(backend.recorded_title().as_deref(), Some("inner"));
    drop(inner);
    assert_eq!(backend.recorded_title().as_deref(), Some("outer"));
    drop(outer);
    assert_eq!(backend.recorded_title().as_deref(), Some(""));
}

#[test]
fn cursor_position_scope_restores_saved_position() {
    let (backend, terminal) = fixture();
    terminal.set_cursor_position(TermPos::new(3, 2)).unwrap();

    let scope = terminal.use_cursor_position().unwrap();
    terminal.set_cursor_position(TermPos::new(7, 7)).unwrap();
    drop(scope);

    assert_eq!(backend.cursor_position().unwrap(), TermPos::new(3, 2));
}

#[test]
fn bracketed_paste_scope_toggles_backend_state() {
    let (backend, terminal) = fixture();
    assert!(!backend.bracketed_paste());
    let scope = terminal.enable_bracketed_paste_input().unwrap();
    assert!(backend.bracketed_paste());
    drop(scope);
    assert!(!backend.bracketed_paste());
}

#[test]
fn atomic_blocks_never_interleave() {
    let (backend, terminal) = fixture();

    std::thread::scope(|threads| {
        for id in 0..4 {
            let terminal = terminal.clone();
            threads.spawn(move || {
                for _ in 0..50 {
                    terminal
                        .write_atomic(|w| {
                            w.text(&format!("<{id}"))?;
                            w.erase_line()?;
                            w.text(&format!("{id}>"))
                        })
                        .unwrap();
                }
            });
        }
    });

    let output = backend.out_sink().contents();
    let mut rest = output.as_str();
    let mut blocks = 0;
    while !rest.is_empty() {
        let id = &rest[1..2];
        let expected = format!("<{id}\x1b[2K{id}>");
        assert!(
            rest.starts_with(&expected),
            "interleaved block near: {:?}",
            &rest[..rest.len().min(16)]
        );
        rest = &rest[expected.len()..];
        blocks += 1;
    }
    assert_eq!(blocks, 200);
}

#[test]
fn clear_kinds_emit_expected_sequences() {
    let (backend, terminal) = fixture();
    terminal.clear(ClearKind::Line).unwrap();
    terminal.clear(ClearKind::Screen).unwrap();
    terminal.clear(ClearKind::ScreenAndScrollback).unwrap();
    let out = backend.out_sink().contents();
    assert!(out.contains("\x1b[2K"));
    assert!(out.contains("\x1b[2J"));
    assert!(out.contains("\x1b[3J"));
}

#[tokio::test]
async fn read_event_and_key_available() {
    let (backend, terminal) = fixture();
    assert!(!terminal.key_available().unwrap());

    backend.push_text("\x1b[A", false);
    assert!(terminal.key_available().unwrap());
    let event = terminal.read_event().await.unwrap();
    assert!(matches!(event, Event::Key(k) if k.key == Key::Up));

    backend.set_size(TermSize::new(132, 50), true);
    assert!(!terminal.key_available().unwrap());
    let event = terminal.read_event().await.unwrap();
    assert_eq!(event, Event::Resize(TermSize::new(132, 50)));
}

#[tokio::test]
async fn read_key_skips_non_key_events() {
    let (backend, terminal) = fixture();
    // The default subscription buffers only once first used.
    assert!(terminal.try_read_event().unwrap().is_none());
    backend.set_size(TermSize::new(100, 30), true);
    backend.push_text("x", false);
    let key = terminal.read_key().await.unwrap();
    assert!(key.is_char('x'));
}

#[tokio::test]
async fn event_stream_ends_after_shutdown() {
    use tokio_stream::StreamExt;

    let (backend, terminal) = fixture();
    let mut stream = terminal.read_events().unwrap();
    backend.push_text("a", false);
    terminal.shutdown().unwrap();

    let mut saw_text = false;
    while let Some(event) = stream.next().await {
        if matches!(event, Event::Text(ref t) if t == "a") {
            saw_text = true;
        }
    }
    assert!(saw_text);
}

#[test]
fn session_open_is_exclusive() {
    let (_backend, terminal) = fixture();
    let session = terminal.open().unwrap();
    assert!(terminal.open().is_err());
    drop(session);
    let _session = terminal.open().unwrap();
}

#[test]
fn strict_mode_surfaces_unsupported_scopes() {
    let backend = Arc::new(MemoryBackend::with_capabilities(weft::Capabilities::dumb()).strict());
    let terminal = Terminal::with_backend(
        backend,
        TerminalOptions {
            strict_mode: true,
            ..TerminalOptions::default()
        },
    );
    assert!(terminal.use_alternate_screen().is_err());
    assert!(terminal.enable_mouse_input(MouseMode::Clicks).is_err());
}
