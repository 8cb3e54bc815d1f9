//! The rendered message list and the input field.
//!
//! The browser original appends a DOM node per message and scrolls the
//! container to its bottom; nothing is ever edited or removed. The same
//! contract is kept here as plain data: an append-only `Transcript` with a
//! scroll position, and a `MessageInput` with the read-trim-clear behavior
//! of the form's text field.

use serde::Serialize;

/// The timestamp label the original renders verbatim. No real timestamp is
/// transmitted or stored.
pub const TIMESTAMP_LABEL: &str = "just now";

/// One rendered chat entry: `(username, body, timestamp label)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedMessage {
    pub username: String,
    pub body: String,
    pub timestamp_label: &'static str,
}

/// Append-only message list with auto-scroll.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<RenderedMessage>,
    /// Index of the topmost visible entry after the last append; appending
    /// always scrolls to the bottom.
    scroll: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Transcript::default()
    }

    /// Append a message and scroll to the bottom. Messages have no identity;
    /// a duplicate body renders twice.
    pub fn append(&mut self, username: &str, body: &str) {
        self.entries.push(RenderedMessage {
            username: username.to_string(),
            body: body.to_string(),
            timestamp_label: TIMESTAMP_LABEL,
        });
        self.scroll = self.entries.len().saturating_sub(1);
    }

    pub fn entries(&self) -> &[RenderedMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn scroll_position(&self) -> usize {
        self.scroll
    }
}

/// The message form's text input.
#[derive(Debug, Default)]
pub struct MessageInput {
    value: String,
}

impl MessageInput {
    pub fn new() -> Self {
        MessageInput::default()
    }

    /// Replace the field's content, as typing does.
    pub fn set(&mut self, text: &str) {
        self.value = text.to_string();
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Submit the field: trim, and if anything remains, clear the field and
    /// return the trimmed text. Whitespace-only input returns `None` and
    /// leaves the field untouched.
    pub fn take_trimmed(&mut self) -> Option<String> {
        let trimmed = self.value.trim();
        if trimmed.is_empty() {
            return None;
        }
        let message = trimmed.to_string();
        self.value.clear();
        Some(message)
    }
}
