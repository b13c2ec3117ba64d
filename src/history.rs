//! Conversation history store.
//!
//! Grounded in the teacher's `ClientBase::AddMessage` / `GetMessages`
//! (`original_source/assistant/client_base.cpp`): a window-truncated message
//! list plus a separate system-message list always prepended on read. This
//! generalizes that single list into a dual-slot store — a "main" slot and
//! a "temporary" slot a caller can swap into for a scratch exchange (e.g. a
//! one-off summarization call) without disturbing the conversation the user
//! sees, then swap back out. Swaps nest via a depth counter so callers don't
//! have to track whether they're the outermost `enter_temp`.

use crate::message::Message;
use std::sync::RwLock;

/// Dual-slot message history with window truncation and system-message
/// prepending on read.
///
/// Guarded by a single `RwLock` (spec.md §5: one mutex per shared resource);
/// `std::sync::RwLock` rather than `tokio::sync::RwLock` because no critical
/// section here spans an `.await`.
pub struct History {
    inner: RwLock<Inner>,
}

struct Inner {
    system: Vec<Message>,
    main: Vec<Message>,
    temp: Vec<Message>,
    swap_depth: u32,
    default_window: usize,
}

impl History {
    /// `default_window` is the `history_size` an engine applies via
    /// `shrink_to_fit` after each append; it is not enforced automatically.
    pub fn new(default_window: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                system: Vec::new(),
                main: Vec::new(),
                temp: Vec::new(),
                swap_depth: 0,
                default_window,
            }),
        }
    }

    /// Append a message to whichever slot is currently active.
    pub fn add(&self, msg: Message) {
        let mut inner = self.inner.write().unwrap();
        inner.active_mut().push(msg);
    }

    /// Add (or replace) the system message(s) prepended ahead of every read.
    pub fn set_system(&self, messages: Vec<Message>) {
        let mut inner = self.inner.write().unwrap();
        inner.system = messages;
    }

    /// The full message list as sent to a provider: system messages first,
    /// then the active slot's messages, in order (H2).
    pub fn get(&self) -> Vec<Message> {
        let inner = self.inner.read().unwrap();
        let mut out = Vec::with_capacity(inner.system.len() + inner.active().len());
        out.extend(inner.system.iter().cloned());
        out.extend(inner.active().iter().cloned());
        out
    }

    /// Replace the active slot's messages wholesale.
    pub fn set(&self, messages: Vec<Message>) {
        let mut inner = self.inner.write().unwrap();
        *inner.active_mut() = messages;
    }

    /// Drop the active slot's messages; system messages are untouched.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.active_mut().clear();
    }

    /// Drop everything, including system messages and both slots.
    pub fn clear_all(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.system.clear();
        inner.main.clear();
        inner.temp.clear();
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read().unwrap();
        inner.active().is_empty()
    }

    pub fn default_window(&self) -> usize {
        self.inner.read().unwrap().default_window
    }

    pub fn set_default_window(&self, size: usize) {
        self.inner.write().unwrap().default_window = size;
    }

    /// Enter a temporary history scope (H3): subsequent `add`/`get`/`set`
    /// calls see the temp slot. Nested calls just bump the depth counter and
    /// reuse the same temp slot. The temp slot is never cleared on entry or
    /// exit — it persists across swaps, exactly like `main` does, so a
    /// caller that swaps back to temp later still sees what it left there
    /// (spec.md §8 scenario 6).
    pub fn enter_temp(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.swap_depth += 1;
    }

    /// Leave a temporary history scope, just decrementing the depth counter.
    /// The temp slot's contents are left untouched; only `clear()`/
    /// `clear_all()` drop them.
    pub fn exit_temp(&self) {
        let mut inner = self.inner.write().unwrap();
        if inner.swap_depth > 0 {
            inner.swap_depth -= 1;
        }
    }

    pub fn in_temp(&self) -> bool {
        self.inner.read().unwrap().swap_depth > 0
    }

    pub fn swap_depth(&self) -> u32 {
        self.inner.read().unwrap().swap_depth
    }

    /// Drop oldest entries from the active slot until its size is `<= n`
    /// (spec.md §4.1, H2). The retained messages are the `min(size, n)`
    /// most-recent ones, in original order.
    pub fn shrink_to_fit(&self, n: usize) {
        let mut inner = self.inner.write().unwrap();
        let active = inner.active_mut();
        if active.len() > n {
            let drop = active.len() - n;
            active.drain(0..drop);
        }
        active.shrink_to_fit();
    }
}

impl Inner {
    fn active(&self) -> &Vec<Message> {
        if self.swap_depth > 0 {
            &self.temp
        } else {
            &self.main
        }
    }

    fn active_mut(&mut self) -> &mut Vec<Message> {
        if self.swap_depth > 0 {
            &mut self.temp
        } else {
            &mut self.main
        }
    }
}
