//! Identity module for Feedsync
//!
//! ## Overview
//!
//! The identity service is an external provider; this module wraps it:
//! - **IdentityService**: the provider boundary (sign-in, sign-up, profile)
//! - **IdentityGateway**: issues auth commands and mirrors the provider's
//!   auth-state stream into [`SessionState`](crate::session::SessionState)
//! - **IdentityObserver**: the running observation, released on shutdown
//!
//! ## Example
//!
//! ```ignore
//! let gateway = IdentityGateway::new(service, session.clone());
//! let observer = gateway.observe();
//!
//! gateway.sign_in(&LoginForm::new("ann@example.com", "secret1")).await?;
//! // session.current() is set once the provider reports the change
//!
//! observer.release();
//! ```

mod gateway;
mod service;

pub use gateway::{IdentityGateway, IdentityObserver};
pub use service::{AuthStateStream, IdentityService, ProviderUser};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::{LoginForm, PasswordResetForm, RegistrationForm};
    use crate::config::FeedConfig;
    use crate::error::FeedError;
    use crate::media::UploadPipeline;
    use crate::memory::{MemoryIdentityService, MemoryObjectStore};
    use crate::session::SessionState;
    use crate::types::{Identity, MediaFile};
    use std::sync::Arc;
    use std::time::Duration;

    fn gateway(service: &Arc<MemoryIdentityService>) -> IdentityGateway {
        IdentityGateway::new(service.clone(), SessionState::new())
    }

    async fn wait_for(
        session: &SessionState,
        check: impl FnMut(&Option<Identity>) -> bool,
    ) -> Option<Identity> {
        let mut rx = session.subscribe();
        let result = tokio::time::timeout(Duration::from_secs(1), rx.wait_for(check))
            .await
            .expect("timed out waiting for session")
            .expect("session closed")
            .clone();
        result
    }

    #[tokio::test]
    async fn test_sign_in_updates_session_through_observer() {
        let service = Arc::new(MemoryIdentityService::new());
        service.add_account("ann@example.com", "secret1", Some("ann"), None);
        let gateway = gateway(&service);
        let observer = gateway.observe();

        gateway
            .sign_in(&LoginForm::new("ann@example.com", "secret1"))
            .await
            .unwrap();
        let identity = wait_for(gateway.session(), |i| i.is_some()).await.unwrap();
        assert_eq!(identity.display_name, "ann");
        assert_eq!(identity.avatar_url, "");

        gateway.sign_out().await.unwrap();
        assert!(wait_for(gateway.session(), |i| i.is_none()).await.is_none());
        observer.release();
    }

    #[tokio::test]
    async fn test_wrong_password_is_identity_error() {
        let service = Arc::new(MemoryIdentityService::new());
        service.add_account("ann@example.com", "secret1", None, None);
        let gateway = gateway(&service);
        let err = gateway
            .sign_in(&LoginForm::new("ann@example.com", "nope123"))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Identity(_)));
        assert!(gateway.session().current().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_federated_sign_in() {
        let service = Arc::new(MemoryIdentityService::new());
        let gateway = gateway(&service);
        assert!(matches!(
            gateway.sign_in_federated().await,
            Err(FeedError::Identity(_))
        ));
    }

    #[tokio::test]
    async fn test_register_uploads_avatar_and_sets_profile() {
        let service = Arc::new(MemoryIdentityService::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let uploader = UploadPipeline::new(objects.clone(), &FeedConfig::default());
        let gateway = gateway(&service);
        let observer = gateway.observe();

        let form = RegistrationForm {
            username: "ann".to_string(),
            email: "ann@example.com".to_string(),
            password: "secret1".to_string(),
            avatar: Some(MediaFile::new("me.png", vec![1u8, 2, 3])),
        };
        let identity = gateway.register(&form, &uploader).await.unwrap();
        assert_eq!(identity.display_name, "ann");
        assert!(identity.avatar_url.contains("avatars/"));
        assert_eq!(objects.puts().len(), 1);

        let session = wait_for(gateway.session(), |i| {
            i.as_ref().map(|i| i.display_name == "ann").unwrap_or(false)
        })
        .await
        .unwrap();
        assert_eq!(session.avatar_url, identity.avatar_url);
        observer.release();
    }

    #[tokio::test]
    async fn test_incomplete_registration_touches_nothing() {
        let service = Arc::new(MemoryIdentityService::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let uploader = UploadPipeline::new(objects.clone(), &FeedConfig::default());
        let gateway = gateway(&service);

        let form = RegistrationForm {
            username: "ann".to_string(),
            email: "ann@example.com".to_string(),
            password: "12345".to_string(),
            avatar: Some(MediaFile::new("me.png", vec![1u8])),
        };
        assert!(gateway.register(&form, &uploader).await.is_err());
        assert!(objects.puts().is_empty());
        assert_eq!(service.account_count(), 0);
    }

    #[tokio::test]
    async fn test_password_reset() {
        let service = Arc::new(MemoryIdentityService::new());
        service.add_account("ann@example.com", "secret1", None, None);
        let gateway = gateway(&service);
        gateway
            .send_password_reset(&PasswordResetForm::new("ann@example.com"))
            .await
            .unwrap();
        assert_eq!(service.password_resets(), vec!["ann@example.com".to_string()]);
        assert!(gateway
            .send_password_reset(&PasswordResetForm::new(""))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_released_observer_stops_updating_session() {
        let service = Arc::new(MemoryIdentityService::new());
        service.add_account("ann@example.com", "secret1", None, None);
        let gateway = gateway(&service);
        let observer = gateway.observe();
        assert!(observer.release());
        assert!(!observer.release());

        service
            .sign_in_with_password("ann@example.com", "secret1")
            .await
            .unwrap();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(gateway.session().current().is_none());
    }
}
