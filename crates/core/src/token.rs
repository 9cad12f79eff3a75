//! Notification registration tokens.

use core::fmt;

/// Keeps a change-notification registration alive.
///
/// The token owns the release action of one registration. The action runs at
/// most once: on the first call to [`invalidate`](Self::invalidate) or when
/// the token is dropped.
pub struct NotificationToken {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl NotificationToken {
    /// Creates a token that runs `release` when invalidated.
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Creates a token with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Releases the registration. Further calls do nothing.
    pub fn invalidate(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    /// Returns true if the registration has not been released yet.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.release.is_some()
    }
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        self.invalidate();
    }
}

impl fmt::Debug for NotificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationToken")
            .field("valid", &self.is_valid())
            .finish()
    }
}
