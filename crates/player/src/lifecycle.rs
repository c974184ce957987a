//! Visibility and attachment tracking for the presentation surface.

use alphaplay_render::PresentationSurface;

/// Fallback visibility polling interval when no observer is available.
pub const VISIBILITY_POLL_SECS: f64 = 0.25;

/// Platform visibility notifications (intersection-style observers).
pub trait VisibilityObserver {
    /// Latest visibility. `None` means observation is unsupported and the
    /// guard should poll the surface's computed style instead.
    fn observe(&mut self) -> Option<bool>;
}

/// Decides whether ticks should do work and notices surface detachment.
pub struct LifecycleGuard {
    observer: Option<Box<dyn VisibilityObserver>>,
    pause_when_hidden: bool,
    visible: bool,
    last_poll: Option<f64>,
    detach_reported: bool,
}

impl std::fmt::Debug for LifecycleGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleGuard")
            .field("observing", &self.observer.is_some())
            .field("pause_when_hidden", &self.pause_when_hidden)
            .field("visible", &self.visible)
            .finish()
    }
}

impl LifecycleGuard {
    pub fn new(observer: Option<Box<dyn VisibilityObserver>>, pause_when_hidden: bool) -> Self {
        Self {
            observer,
            pause_when_hidden,
            visible: true,
            last_poll: None,
            detach_reported: false,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Refresh and return the visibility flag. Always true when hidden
    /// playback is not being skipped.
    pub fn update_visibility(&mut self, surface: &dyn PresentationSurface, now: f64) -> bool {
        if !self.pause_when_hidden {
            self.visible = true;
            return true;
        }

        if let Some(observer) = self.observer.as_mut() {
            match observer.observe() {
                Some(visible) => {
                    self.set_visible(visible);
                    return visible;
                }
                None => {
                    tracing::debug!("Visibility observer unsupported; polling computed style");
                    self.observer = None;
                }
            }
        }

        let due = self
            .last_poll
            .map_or(true, |last| now - last >= VISIBILITY_POLL_SECS);
        if due {
            self.last_poll = Some(now);
            self.set_visible(surface.computed_style().is_visible());
        }
        self.visible
    }

    fn set_visible(&mut self, visible: bool) {
        if visible != self.visible {
            tracing::debug!(visible, "Surface visibility changed");
        }
        self.visible = visible;
    }

    /// True exactly once per detachment. Reattachment re-arms the check.
    pub fn check_detached(&mut self, surface: &dyn PresentationSurface) -> bool {
        if surface.is_attached() {
            self.detach_reported = false;
            return false;
        }
        if self.detach_reported {
            return false;
        }
        self.detach_reported = true;
        true
    }

    /// Drop the observer. Later updates poll.
    pub fn disconnect(&mut self) {
        self.observer = None;
    }
}
