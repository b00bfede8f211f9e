use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub text: String,
}

/// Surface for short-lived user-facing messages.
pub trait Notifier {
    fn notify(&mut self, severity: Severity, text: String);

    fn info(&mut self, text: String) {
        self.notify(Severity::Info, text);
    }

    fn warning(&mut self, text: String) {
        self.notify(Severity::Warning, text);
    }
}

impl Notifier for Vec<Notification> {
    fn notify(&mut self, severity: Severity, text: String) {
        self.push(Notification { severity, text });
    }
}

/// How long a toast stays up
pub const TOAST_LIFETIME: Duration = Duration::from_secs(3);
const TOAST_CAPACITY: usize = 5;

/// Transient notifications, newest last, dropped once they expire or the
/// queue overflows.
#[derive(Debug)]
pub struct ToastQueue {
    toasts: VecDeque<(Notification, Instant)>,
    lifetime: Duration,
    capacity: usize,
    /// Bumped on every change to the visible toasts
    revision: u64,
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(TOAST_LIFETIME, TOAST_CAPACITY)
    }
}

impl ToastQueue {
    pub fn new(lifetime: Duration, capacity: usize) -> Self {
        Self {
            toasts: VecDeque::new(),
            lifetime,
            capacity: capacity.max(1),
            revision: 0,
        }
    }

    pub fn push_at(&mut self, notification: Notification, now: Instant) {
        if self.toasts.len() == self.capacity {
            self.toasts.pop_front();
        }
        self.toasts.push_back((notification, now));
        self.revision += 1;
    }

    /// Drops expired toasts, returning whether anything changed.
    pub fn expire(&mut self, now: Instant) -> bool {
        let before = self.toasts.len();
        self.toasts
            .retain(|(_, shown)| now.saturating_duration_since(*shown) < self.lifetime);
        let changed = before != self.toasts.len();
        if changed {
            self.revision += 1;
        }
        changed
    }

    /// Changes whenever the toasts on screen would change, including when a
    /// full queue swaps its oldest toast for a new one.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.toasts.iter().map(|(n, _)| n)
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }
}

impl Notifier for ToastQueue {
    fn notify(&mut self, severity: Severity, text: String) {
        match severity {
            Severity::Info => tracing::info!(%text, "notification"),
            Severity::Warning => tracing::warn!(%text, "notification"),
        }
        self.push_at(Notification { severity, text }, Instant::now());
    }
}
