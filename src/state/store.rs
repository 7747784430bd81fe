//! Holder of the current session state
//!
//! Applies events in dispatch order and enforces the locator ownership rule:
//! once a handle is no longer reachable from uploads, the active image or the
//! reference image, its transient locator is released.

use tracing::debug;

use super::event::SessionEvent;
use super::locator::LocatorRegistry;
use super::session::{transition, SessionState};

#[derive(Debug, Default)]
pub struct SessionStore {
    state: SessionState,
    locators: LocatorRegistry,
}

impl SessionStore {
    pub fn new(locators: LocatorRegistry) -> Self {
        Self {
            state: SessionState::default(),
            locators,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn locators(&self) -> &LocatorRegistry {
        &self.locators
    }

    /// Apply one event and adopt the resulting state
    pub fn dispatch(&mut self, event: SessionEvent) {
        // Restore releases the previous owners itself
        let restoring = matches!(event, SessionEvent::RestoreSession(_));
        let before = self.state.owned_locators();

        let next = transition(&self.state, event, &self.locators);

        if !restoring {
            let after = next.owned_locators();
            for locator in before.difference(&after) {
                if self.locators.release(locator) {
                    debug!("released unreachable {}", locator);
                }
            }
        }

        self.state = next;
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        for locator in self.state.owned_locators() {
            self.locators.release(&locator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::ImageHandle;
    use crate::state::event::SessionRestore;

    #[test]
    fn test_remove_releases_locator() {
        let registry = LocatorRegistry::new();
        let mut store = SessionStore::new(registry.clone());
        let a = ImageHandle::register(&registry, vec![1u8], "image/png", "a");
        let b = ImageHandle::register(&registry, vec![2u8], "image/png", "b");

        store.dispatch(SessionEvent::AddImages(vec![a.clone(), b.clone()]));
        store.dispatch(SessionEvent::SetActiveImage(Some(a.locator.clone())));
        store.dispatch(SessionEvent::RemoveImage(a.locator.clone()));

        assert!(!registry.is_live(&a.locator));
        assert!(registry.is_live(&b.locator));
        assert_eq!(store.state().active_image, None);
    }

    #[test]
    fn test_replacing_reference_releases_previous() {
        let registry = LocatorRegistry::new();
        let mut store = SessionStore::new(registry.clone());
        let first = ImageHandle::register(&registry, vec![1u8], "image/png", "first");
        let second = ImageHandle::register(&registry, vec![2u8], "image/png", "second");

        store.dispatch(SessionEvent::SetReferenceImage(Some(first.clone())));
        store.dispatch(SessionEvent::SetReferenceImage(Some(second.clone())));
        assert!(!registry.is_live(&first.locator));

        store.dispatch(SessionEvent::SetReferenceImage(None));
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_restore_releases_once() {
        let registry = LocatorRegistry::new();
        let mut store = SessionStore::new(registry.clone());
        let old = ImageHandle::register(&registry, vec![1u8], "image/png", "old");
        store.dispatch(SessionEvent::AddImages(vec![old.clone()]));

        let fresh = ImageHandle::register(&registry, vec![1u8], "image/png", "old");
        store.dispatch(SessionEvent::RestoreSession(SessionRestore {
            uploaded_images: vec![fresh.clone()],
            ..SessionRestore::default()
        }));

        assert!(!registry.is_live(&old.locator));
        assert!(registry.is_live(&fresh.locator));
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn test_drop_releases_everything() {
        let registry = LocatorRegistry::new();
        {
            let mut store = SessionStore::new(registry.clone());
            let a = ImageHandle::register(&registry, vec![1u8], "image/png", "a");
            store.dispatch(SessionEvent::AddImages(vec![a]));
            assert_eq!(registry.live_count(), 1);
        }
        assert_eq!(registry.live_count(), 0);
    }
}
