//! Typing signals.
//!
//! Outbound: every keystroke emits `typing` and pushes a single deadline
//! forward; when the deadline passes without another keystroke, `stopTyping`
//! fires once. Inbound: the indicator shows the last peer that typed and
//! expires on its own, whether or not `stopTyping` ever arrives.
//!
//! Both use `tokio::time::Instant` so paused-clock tests drive them.

use std::time::Duration;

use tokio::time::Instant;

/// Keystroke inactivity before `stopTyping`.
pub const TYPING_TIMEOUT: Duration = Duration::from_millis(1500);

/// Debounce for the local user's `stopTyping` emission.
#[derive(Debug, Clone)]
pub struct TypingDebounce {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Default for TypingDebounce {
    fn default() -> Self {
        Self::new(TYPING_TIMEOUT)
    }
}

impl TypingDebounce {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, deadline: None }
    }

    /// Register a keystroke, resetting the deadline. Returns the new deadline.
    pub fn keystroke(&mut self, now: Instant) -> Instant {
        let deadline = now + self.timeout;
        self.deadline = Some(deadline);
        deadline
    }

    /// Pending deadline, if a `stopTyping` is owed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True exactly once per burst of keystrokes, once `now` reaches the deadline.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// "X is typing..." state for peers.
#[derive(Debug, Clone)]
pub struct TypingIndicator {
    /// Our own display name; never shown.
    local_name: Option<String>,
    typist: Option<(String, Instant)>,
    timeout: Duration,
}

impl TypingIndicator {
    pub fn new(local_name: Option<String>, timeout: Duration) -> Self {
        Self {
            local_name,
            typist: None,
            timeout,
        }
    }

    /// A peer typed. Returns false when the name is ours and was ignored.
    pub fn peer_typing(&mut self, name: &str, now: Instant) -> bool {
        if self.local_name.as_deref() == Some(name) {
            return false;
        }
        self.typist = Some((name.to_string(), now));
        true
    }

    pub fn peer_stopped(&mut self) {
        self.typist = None;
    }

    /// Current typist, unless the signal has gone stale.
    pub fn current(&self, now: Instant) -> Option<&str> {
        match &self.typist {
            Some((name, seen)) if now.duration_since(*seen) < self.timeout => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn label(&self, now: Instant) -> Option<String> {
        self.current(now).map(|name| format!("{name} is typing..."))
    }

    pub fn clear(&mut self) {
        self.typist = None;
    }
}
