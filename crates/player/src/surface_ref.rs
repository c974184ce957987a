//! Output surface references and their resolution.

use alphaplay_common::error::PlayerError;
use alphaplay_render::PresentationSurface;

/// Resolves named surfaces, e.g. by element id.
pub trait SurfaceLookup {
    fn lookup(&mut self, key: &str) -> Option<Box<dyn PresentationSurface>>;
}

pub type SurfaceResolver = Box<dyn FnMut() -> Option<Box<dyn PresentationSurface>>>;

/// How the caller names the output surface.
pub enum SurfaceRef {
    /// The surface itself.
    Direct(Box<dyn PresentationSurface>),
    /// A key resolved through the environment's [`SurfaceLookup`].
    Lookup(String),
    /// A callback producing the surface once it exists.
    Resolver(SurfaceResolver),
}

impl std::fmt::Debug for SurfaceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceRef::Direct(_) => f.write_str("SurfaceRef::Direct"),
            SurfaceRef::Lookup(key) => f.debug_tuple("SurfaceRef::Lookup").field(key).finish(),
            SurfaceRef::Resolver(_) => f.write_str("SurfaceRef::Resolver"),
        }
    }
}

impl SurfaceRef {
    pub fn lookup(key: impl Into<String>) -> Self {
        SurfaceRef::Lookup(key.into())
    }

    pub fn resolver(
        resolve: impl FnMut() -> Option<Box<dyn PresentationSurface>> + 'static,
    ) -> Self {
        SurfaceRef::Resolver(Box::new(resolve))
    }

    fn describe(&self) -> String {
        match self {
            SurfaceRef::Direct(_) => "direct surface".to_string(),
            SurfaceRef::Lookup(key) => format!("surface '{key}'"),
            SurfaceRef::Resolver(_) => "resolver surface".to_string(),
        }
    }
}

/// Result of one resolution attempt.
pub enum SurfacePoll {
    Resolved(Box<dyn PresentationSurface>),
    Pending,
    Failed(PlayerError),
}

impl std::fmt::Debug for SurfacePoll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfacePoll::Resolved(_) => f.write_str("Resolved"),
            SurfacePoll::Pending => f.write_str("Pending"),
            SurfacePoll::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

/// Resolves a [`SurfaceRef`], optionally retrying until a deadline.
#[derive(Debug)]
pub struct SurfaceWaiter {
    reference: Option<SurfaceRef>,
    deadline: Option<f64>,
}

impl SurfaceWaiter {
    /// Without waiting, the first unsuccessful attempt fails.
    pub fn new(reference: SurfaceRef, wait: bool, timeout_secs: f64, now: f64) -> Self {
        Self {
            reference: Some(reference),
            deadline: wait.then_some(now + timeout_secs),
        }
    }

    pub fn poll(&mut self, lookup: Option<&mut dyn SurfaceLookup>, now: f64) -> SurfacePoll {
        let Some(mut reference) = self.reference.take() else {
            return SurfacePoll::Failed(PlayerError::invalid_input("surface already resolved"));
        };

        let found = match reference {
            SurfaceRef::Direct(surface) => return SurfacePoll::Resolved(surface),
            SurfaceRef::Lookup(ref key) => match lookup {
                Some(lookup) => lookup.lookup(key),
                None => {
                    return SurfacePoll::Failed(PlayerError::invalid_input(format!(
                        "no surface lookup available for '{key}'"
                    )))
                }
            },
            SurfaceRef::Resolver(ref mut resolve) => resolve(),
        };

        if let Some(surface) = found {
            tracing::debug!(surface = %reference.describe(), "Surface resolved");
            return SurfacePoll::Resolved(surface);
        }

        match self.deadline {
            Some(deadline) if now < deadline => {
                self.reference = Some(reference);
                SurfacePoll::Pending
            }
            Some(_) => SurfacePoll::Failed(PlayerError::invalid_input(format!(
                "{} not found before the surface timeout",
                reference.describe()
            ))),
            None => SurfacePoll::Failed(PlayerError::invalid_input(format!(
                "{} not found",
                reference.describe()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alphaplay_render::headless::HeadlessSurface;
    use std::cell::Cell;
    use std::rc::Rc;

    struct OneSurface;

    impl SurfaceLookup for OneSurface {
        fn lookup(&mut self, key: &str) -> Option<Box<dyn PresentationSurface>> {
            (key == "stage").then(|| Box::new(HeadlessSurface::new().0) as Box<dyn PresentationSurface>)
        }
    }

    #[test]
    fn test_direct_resolves_immediately() {
        let (surface, _handle) = HeadlessSurface::new();
        let mut waiter = SurfaceWaiter::new(SurfaceRef::Direct(Box::new(surface)), false, 1.0, 0.0);
        assert!(matches!(waiter.poll(None, 0.0), SurfacePoll::Resolved(_)));
    }

    #[test]
    fn test_lookup_by_key() {
        let mut lookup = OneSurface;
        let mut found = SurfaceWaiter::new(SurfaceRef::lookup("stage"), false, 1.0, 0.0);
        assert!(matches!(found.poll(Some(&mut lookup), 0.0), SurfacePoll::Resolved(_)));

        let mut missing = SurfaceWaiter::new(SurfaceRef::lookup("nope"), false, 1.0, 0.0);
        assert!(matches!(missing.poll(Some(&mut lookup), 0.0), SurfacePoll::Failed(_)));
    }

    #[test]
    fn test_resolver_waits_until_timeout() {
        let available = Rc::new(Cell::new(false));
        let flag = available.clone();
        let reference = SurfaceRef::resolver(move || {
            flag.get()
                .then(|| Box::new(HeadlessSurface::new().0) as Box<dyn PresentationSurface>)
        });
        let mut waiter = SurfaceWaiter::new(reference, true, 1.0, 0.0);
        assert!(matches!(waiter.poll(None, 0.5), SurfacePoll::Pending));
        available.set(true);
        assert!(matches!(waiter.poll(None, 0.6), SurfacePoll::Resolved(_)));
    }

    #[test]
    fn test_wait_times_out() {
        let mut waiter = SurfaceWaiter::new(SurfaceRef::resolver(|| None), true, 1.0, 0.0);
        assert!(matches!(waiter.poll(None, 0.5), SurfacePoll::Pending));
        assert!(matches!(waiter.poll(None, 1.0), SurfacePoll::Failed(_)));
    }
}
