//! The host boundary: side-effect actions, identity lookups, and the
//! per-run event bindings.
//!
//! The VM never performs I/O itself. Action statements call into a
//! [`HostContext`], which is expected to enqueue and return immediately; the
//! driver drains the enqueued actions on its polling cadence. `nickname` is
//! the one synchronous lookup — hosts must not block indefinitely in it,
//! since the time it takes counts against the run's allowance.

use indexmap::IndexMap;
use serde_json::Value as Json;

/// One buffered side effect, in program order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `say EXPR` — speak text.
    Text(String),
    /// `nudge EXPR` — nudge a user id.
    Nudge(i64),
    /// `picsave EXPR` — save a picture by id.
    PicSave(String),
    /// `picsend EXPR` — send a picture by id.
    PicSend(String),
}

/// Host-side effect and identity surface.
///
/// All four action methods should enqueue and return; ordering of the queue
/// must match call order.
pub trait HostContext: Send {
    fn say(&mut self, text: String);
    fn nudge(&mut self, target: i64);
    fn pic_save(&mut self, id: String);
    fn pic_send(&mut self, id: String);

    /// Synchronous nickname lookup; `None` when the id is unknown.
    fn nickname(&mut self, id: i64) -> Option<String> {
        let _ = id;
        None
    }
}

impl<H: HostContext> HostContext for &mut H {
    fn say(&mut self, text: String) {
        (**self).say(text);
    }

    fn nudge(&mut self, target: i64) {
        (**self).nudge(target);
    }

    fn pic_save(&mut self, id: String) {
        (**self).pic_save(id);
    }

    fn pic_send(&mut self, id: String) {
        (**self).pic_send(id);
    }

    fn nickname(&mut self, id: i64) -> Option<String> {
        (**self).nickname(id)
    }
}

/// A host that discards actions; useful when only the final value matters.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl HostContext for NullHost {
    fn say(&mut self, _text: String) {}
    fn nudge(&mut self, _target: i64) {}
    fn pic_save(&mut self, _id: String) {}
    fn pic_send(&mut self, _id: String) {}
}

/// A host that collects actions in order and answers nickname lookups from a
/// fixed table. The driver and the test suites both run against this.
#[derive(Debug, Default)]
pub struct BufferHost {
    actions: Vec<Action>,
    nicknames: IndexMap<i64, String>,
}

impl BufferHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a nickname for `getNickname` lookups.
    pub fn add_nickname(&mut self, id: i64, name: impl Into<String>) {
        self.nicknames.insert(id, name.into());
    }

    /// Actions collected so far, in program order.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Consumes the host, returning the collected actions.
    #[must_use]
    pub fn into_actions(self) -> Vec<Action> {
        self.actions
    }
}

impl HostContext for BufferHost {
    fn say(&mut self, text: String) {
        self.actions.push(Action::Text(text));
    }

    fn nudge(&mut self, target: i64) {
        self.actions.push(Action::Nudge(target));
    }

    fn pic_save(&mut self, id: String) {
        self.actions.push(Action::PicSave(id));
    }

    fn pic_send(&mut self, id: String) {
        self.actions.push(Action::PicSend(id));
    }

    fn nickname(&mut self, id: i64) -> Option<String> {
        self.nicknames.get(&id).cloned()
    }
}

/// The per-run global bindings supplied by the host.
///
/// The recognized names (`text`, `sender`, `clock`, `nudged`) have typed
/// helpers; arbitrary extra names can be bound with [`EventMap::set`]. Names
/// the script never references are ignored at bind time.
#[derive(Debug, Clone, Default)]
pub struct EventMap {
    entries: IndexMap<String, Json>,
}

impl EventMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the triggering message text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.entries.insert("text".to_owned(), Json::String(text.into()));
        self
    }

    /// Binds the sender id.
    #[must_use]
    pub fn with_sender(mut self, sender: i64) -> Self {
        self.entries.insert("sender".to_owned(), Json::from(sender));
        self
    }

    /// Binds the millisecond-epoch timestamp of a timer event.
    #[must_use]
    pub fn with_clock(mut self, clock: i64) -> Self {
        self.entries.insert("clock".to_owned(), Json::from(clock));
        self
    }

    /// Binds the nudging user's id.
    #[must_use]
    pub fn with_nudged(mut self, nudged: i64) -> Self {
        self.entries.insert("nudged".to_owned(), Json::from(nudged));
        self
    }

    /// Binds an arbitrary event name.
    pub fn set(&mut self, name: impl Into<String>, value: Json) {
        self.entries.insert(name.into(), value);
    }

    /// Iterates the bound names and values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Json)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
