//! Session state: the currently signed-in identity
//!
//! Written only by the identity gateway; everyone else reads a snapshot with
//! [`SessionState::current`] or watches for changes.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::types::Identity;

/// Shared, cloneable view of the signed-in identity
#[derive(Clone)]
pub struct SessionState {
    identity: Arc<watch::Sender<Option<Identity>>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            identity: Arc::new(tx),
        }
    }

    /// The signed-in identity, if any
    pub fn current(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.identity.borrow().is_some()
    }

    /// Watch identity changes
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }

    pub(crate) fn login(&self, identity: Identity) {
        info!(id = %identity.id, name = %identity.display_name, "Signed in");
        self.identity.send_replace(Some(identity));
    }

    pub(crate) fn logout(&self) {
        if self.identity.send_replace(None).is_some() {
            info!("Signed out");
        }
    }

    /// Patch the profile of the signed-in identity `id`. Ignored if another
    /// identity, or none, is signed in.
    pub(crate) fn update_profile(&self, id: &str, display_name: &str, avatar_url: &str) -> bool {
        let updated = self.identity.send_if_modified(|current| match current {
            Some(identity) if identity.id == id => {
                identity.display_name = display_name.to_string();
                identity.avatar_url = avatar_url.to_string();
                true
            }
            _ => false,
        });
        debug!(%id, updated, "Profile update");
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann() -> Identity {
        Identity {
            id: "u1".to_string(),
            display_name: String::new(),
            avatar_url: String::new(),
        }
    }

    #[test]
    fn test_login_logout() {
        let session = SessionState::new();
        assert!(session.current().is_none());
        session.login(ann());
        assert_eq!(session.current().unwrap().id, "u1");
        session.logout();
        assert!(!session.is_signed_in());
    }

    #[test]
    fn test_update_profile_only_touches_matching_identity() {
        let session = SessionState::new();
        assert!(!session.update_profile("u1", "ann", "url"));
        session.login(ann());
        assert!(!session.update_profile("u2", "bob", "url"));
        assert!(session.update_profile("u1", "ann", "https://a/avatar.png"));
        let current = session.current().unwrap();
        assert_eq!(current.display_name, "ann");
        assert_eq!(current.avatar_url, "https://a/avatar.png");
    }

    #[tokio::test]
    async fn test_watchers_see_changes() {
        let session = SessionState::new();
        let mut rx = session.subscribe();
        session.login(ann());
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_some());
    }
}
