//! Line-editor behavior end to end: events go in through the in-memory
//! backend's decoder, rendered output comes out of the captured sink.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use weft::readline::{Completion, History};
use weft::{Backend, MemoryBackend, ReadLineOptions, Terminal, TerminalOptions};

fn fixture() -> (Arc<MemoryBackend>, Terminal) {
    let backend = Arc::new(MemoryBackend::new());
    let terminal = Terminal::with_backend(backend.clone(), TerminalOptions::default());
    (backend, terminal)
}

/// Spawn `read_line`, let it subscribe, feed raw input, await the result.
async fn drive(
    backend: &Arc<MemoryBackend>,
    terminal: &Terminal,
    options: ReadLineOptions,
    inputs: &[&str],
) -> weft::Result<Option<String>> {
    let terminal = terminal.clone();
    let task = tokio::spawn(async move { terminal.read_line(&options).await });
    tokio::task::yield_now().await;
    for input in inputs {
        backend.push_text(input, false);
        tokio::task::yield_now().await;
    }
    task.await.expect("editor task panicked")
}

#[tokio::test]
async fn accept_returns_the_typed_line() {
    let (backend, terminal) = fixture();
    let result = drive(&backend, &terminal, ReadLineOptions::default(), &["abc\r"]).await;
    assert_eq!(result.unwrap().as_deref(), Some("abc"));

    let output = backend.out_sink().contents();
    assert!(output.contains("abc"), "echoed buffer missing: {output:?}");
    assert!(output.ends_with('\n'), "accept newline missing");
}

#[tokio::test]
async fn silent_mode_accepts_without_echo() {
    let (backend, terminal) = fixture();
    let options = ReadLineOptions::default().silent();
    let result = drive(&backend, &terminal, options, &["secret\r"]).await;
    assert_eq!(result.unwrap().as_deref(), Some("secret"));
    assert!(!backend.out_sink().contents().contains("secret"));
}

#[tokio::test]
async fn prompt_is_rendered_in_every_redraw() {
    let (backend, terminal) = fixture();
    let options = ReadLineOptions::with_prompt("> ");
    let result = drive(&backend, &terminal, options, &["hi\r"]).await;
    assert_eq!(result.unwrap().as_deref(), Some("hi"));
    assert!(backend.out_sink().contents().contains("> "));
}

#[tokio::test]
async fn mid_line_editing_with_arrows_and_backspace() {
    let (backend, terminal) = fixture();
    // "abXc": type abc, left, left, X -> aXbc? No: left moves before c,
    // left again before b, insert X between a and b.
    let result = drive(
        &backend,
        &terminal,
        ReadLineOptions::default(),
        &["abc", "\x1b[D\x1b[D", "X", "\r"],
    )
    .await;
    assert_eq!(result.unwrap().as_deref(), Some("aXbc"));

    let (backend, terminal) = fixture();
    let result = drive(
        &backend,
        &terminal,
        ReadLineOptions::default(),
        &["abcd", "\x7f\x7f", "\r"],
    )
    .await;
    assert_eq!(result.unwrap().as_deref(), Some("ab"));
}

#[tokio::test]
async fn home_end_and_delete() {
    let (backend, terminal) = fixture();
    let result = drive(
        &backend,
        &terminal,
        ReadLineOptions::default(),
        &["hello", "\x1b[H", "\x1b[3~", "\x1b[F", "!", "\r"],
    )
    .await;
    assert_eq!(result.unwrap().as_deref(), Some("ello!"));
}

#[tokio::test]
async fn ctrl_c_without_selection_cancels() {
    let (backend, terminal) = fixture();
    let result = drive(
        &backend,
        &terminal,
        ReadLineOptions::default(),
        &["abc", "\x03"],
    )
    .await;
    assert!(result.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn ctrl_c_with_selection_copies_instead() {
    let (backend, terminal) = fixture();
    // Select "lo" with Shift+Left twice, then Ctrl+C, then accept.
    let result = drive(
        &backend,
        &terminal,
        ReadLineOptions::default(),
        &["hello", "\x1b[1;2D\x1b[1;2D", "\x03", "\r"],
    )
    .await;
    assert_eq!(result.unwrap().as_deref(), Some("hello"));
    assert_eq!(backend.clipboard_get().unwrap(), Some("lo".to_owned()));
}

#[tokio::test]
async fn end_of_input_returns_none() {
    let (backend, terminal) = fixture();
    let t2 = terminal.clone();
    let task = tokio::spawn(async move { t2.read_line(&ReadLineOptions::default()).await });
    tokio::task::yield_now().await;
    backend.push_text("partial", false);
    tokio::task::yield_now().await;
    terminal.events().complete();
    let result = task.await.unwrap();
    assert_eq!(result.unwrap(), None);
}

#[tokio::test]
async fn cancellation_token_cancels_the_call() {
    let (_backend, terminal) = fixture();
    let token = CancellationToken::new();
    let options = ReadLineOptions::default().cancellable(token.clone());
    let t2 = terminal.clone();
    let task = tokio::spawn(async move { t2.read_line(&options).await });
    tokio::task::yield_now().await;
    token.cancel();
    let result = task.await.unwrap();
    assert!(result.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn bracketed_paste_inserts_payload() {
    let (backend, terminal) = fixture();
    let result = drive(
        &backend,
        &terminal,
        ReadLineOptions::default(),
        &["a", "\x1b[200~pasted\x1b[201~", "z", "\r"],
    )
    .await;
    assert_eq!(result.unwrap().as_deref(), Some("apastedz"));
}

#[tokio::test]
async fn oversize_paste_truncates_to_max_length() {
    let (backend, terminal) = fixture();
    let options = ReadLineOptions::default().max_length(4);
    let result = drive(
        &backend,
        &terminal,
        options,
        &["\x1b[200~toolong\x1b[201~", "\r"],
    )
    .await;
    assert_eq!(result.unwrap().as_deref(), Some("tool"));
    assert!(
        backend.out_sink().contents().contains('\x07'),
        "truncation must ring the bell"
    );
}

#[tokio::test]
async fn history_navigation_with_arrows() {
    let (backend, terminal) = fixture();
    let history = Arc::new(Mutex::new(History::new()));
    history.lock().unwrap().add("first");
    history.lock().unwrap().add("second");
    let options = ReadLineOptions {
        history: history.clone(),
        ..ReadLineOptions::default()
    };
    // Up, Up, Down -> "second"; accept.
    let result = drive(
        &backend,
        &terminal,
        options,
        &["\x1b[A\x1b[A\x1b[B", "\r"],
    )
    .await;
    assert_eq!(result.unwrap().as_deref(), Some("second"));
    // The accepted line is deduplicated against the newest entry.
    assert_eq!(history.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn accepted_lines_append_to_history() {
    let (backend, terminal) = fixture();
    let history = Arc::new(Mutex::new(History::new()));
    let options = ReadLineOptions {
        history: history.clone(),
        ..ReadLineOptions::default()
    };
    drive(&backend, &terminal, options, &["one\r"]).await.unwrap();
    assert_eq!(history.lock().unwrap().get(0), Some("one"));
}

#[tokio::test]
async fn reverse_search_finds_and_accepts() {
    let (backend, terminal) = fixture();
    let history = Arc::new(Mutex::new(History::new()));
    history.lock().unwrap().add("echo alpha");
    history.lock().unwrap().add("ls -la");
    history.lock().unwrap().add("echo beta");
    let options = ReadLineOptions {
        history,
        ..ReadLineOptions::default()
    };
    // Ctrl+R, type "echo" (finds "echo beta"), Ctrl+R again (finds
    // "echo alpha"), Enter accepts it.
    let result = drive(
        &backend,
        &terminal,
        options,
        &["\x12", "echo", "\x12", "\r"],
    )
    .await;
    assert_eq!(result.unwrap().as_deref(), Some("echo alpha"));
    assert!(
        backend.out_sink().contents().contains("(reverse-i-search)"),
        "search prompt must be rendered"
    );
}

#[tokio::test]
async fn completion_cycles_with_tab() {
    let (backend, terminal) = fixture();
    let options = ReadLineOptions::default().completions(Arc::new(|text: &str, _cursor| {
        Completion {
            candidates: vec!["green".into(), "grey".into()],
            replace_start: 0,
            replace_length: text.len(),
        }
    }));
    let result = drive(
        &backend,
        &terminal,
        options,
        &["gr", "\t", "\t", "\r"],
    )
    .await;
    assert_eq!(result.unwrap().as_deref(), Some("grey"));
}

#[tokio::test]
async fn completion_restarts_after_other_input() {
    let (backend, terminal) = fixture();
    let options = ReadLineOptions::default().completions(Arc::new(|text: &str, _cursor| {
        Completion {
            candidates: vec![format!("{text}X")],
            replace_start: 0,
            replace_length: text.len(),
        }
    }));
    let result = drive(&backend, &terminal, options, &["a", "\t", "b", "\t", "\r"]).await;
    assert_eq!(result.unwrap().as_deref(), Some("aXbX"));
}

#[tokio::test]
async fn undo_and_redo_chords() {
    let (backend, terminal) = fixture();
    let result = drive(
        &backend,
        &terminal,
        ReadLineOptions::default(),
        &["abc", "\x1b[D", "\x1a", "\r"], // left closes the batch, Ctrl+Z undoes it
    )
    .await;
    assert_eq!(result.unwrap().as_deref(), Some(""));

    let (backend, terminal) = fixture();
    let result = drive(
        &backend,
        &terminal,
        ReadLineOptions::default(),
        &["abc", "\x1b[D", "\x1a", "\x19", "\r"], // undo then redo
    )
    .await;
    assert_eq!(result.unwrap().as_deref(), Some("abc"));
}

#[tokio::test]
async fn mouse_click_positions_the_cursor() {
    let (backend, terminal) = fixture();
    let options = ReadLineOptions::with_prompt("> ").mouse_editing();
    // Click at column 5 (0-based): prompt is 2 cells, so byte index 3.
    let result = drive(
        &backend,
        &terminal,
        options,
        &["abcdef", "\x1b[<0;6;1M\x1b[<0;6;1m", "X", "\r"],
    )
    .await;
    assert_eq!(result.unwrap().as_deref(), Some("abcXdef"));
}

#[tokio::test]
async fn editing_disabled_still_accepts_typed_text() {
    let (backend, terminal) = fixture();
    let options = ReadLineOptions {
        enable_editing: false,
        ..ReadLineOptions::default()
    };
    let result = drive(
        &backend,
        &terminal,
        options,
        &["ab", "\x1b[D", "c", "\r"], // arrow is ignored
    )
    .await;
    assert_eq!(result.unwrap().as_deref(), Some("abc"));
}

#[tokio::test]
async fn resize_updates_the_view_width() {
    let (backend, terminal) = fixture();
    let t2 = terminal.clone();
    let options = ReadLineOptions::default();
    let task = tokio::spawn(async move { t2.read_line(&options).await });
    tokio::task::yield_now().await;
    backend.set_size(weft::TermSize::new(20, 10), true);
    tokio::task::yield_now().await;
    backend.push_text("ok\r", false);
    let result = task.await.unwrap();
    assert_eq!(result.unwrap().as_deref(), Some("ok"));
}
