//! The code editor widget contract and an in-process implementation.
//!
//! The browser original treats the editor as an opaque CodeMirror handle:
//! `getValue()`, `setValue(text)`, and an `on("change")` subscription. The
//! same three operations are modeled here. One behavior is load-bearing:
//! `set_value` fires the change notification just like the real widget, so
//! applying a remote change makes the session re-send that same snapshot.
//! The cycle terminates only because `update_code_editor` refuses to apply
//! content the editor already holds — that guard must stay.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

/// Shared editor handle, one per code-sync session.
pub type SharedEditor = Arc<Mutex<EditorBuffer>>;

/// An in-process stand-in for the page's editor widget.
pub struct EditorBuffer {
    content: String,
    /// Change events carry the full current snapshot; the specific edit
    /// delta is discarded, exactly as the original drops `changeObj`.
    change_tx: broadcast::Sender<String>,
}

impl EditorBuffer {
    pub fn new() -> Self {
        let (change_tx, _rx) = broadcast::channel(64);
        EditorBuffer {
            content: String::new(),
            change_tx,
        }
    }

    /// Create a shared handle, pre-loaded with `content`.
    pub fn shared_with(content: &str) -> SharedEditor {
        let mut editor = EditorBuffer::new();
        editor.content = content.to_string();
        Arc::new(Mutex::new(editor))
    }

    pub fn shared() -> SharedEditor {
        Arc::new(Mutex::new(EditorBuffer::new()))
    }

    /// Current full content.
    pub fn get_value(&self) -> String {
        self.content.clone()
    }

    /// Replace the full content and fire the change notification. Fires
    /// even when the new content equals the old, matching the widget.
    pub fn set_value(&mut self, text: &str) {
        self.content = text.to_string();
        let _ = self.change_tx.send(self.content.clone());
    }

    /// Subscribe to change notifications. Each event is the full snapshot
    /// current at the time of the change.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.change_tx.subscribe()
    }
}

impl Default for EditorBuffer {
    fn default() -> Self {
        EditorBuffer::new()
    }
}

/// Apply a remote code change to the editor.
///
/// No-op when `new_code` equals the current value — the only safeguard
/// against a remote echo re-entering the local change stream forever.
/// Returns whether the editor was actually updated.
pub fn update_code_editor(editor: &SharedEditor, new_code: &str) -> bool {
    let Ok(mut guard) = editor.lock() else {
        return false;
    };
    if guard.get_value() == new_code {
        return false;
    }
    guard.set_value(new_code);
    true
}
