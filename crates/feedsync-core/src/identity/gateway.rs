//! Identity gateway: observes the identity service and issues auth commands

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::service::{IdentityService, ProviderUser};
use crate::authoring::{LoginForm, PasswordResetForm, RegistrationForm};
use crate::error::{FeedError, FeedResult};
use crate::media::UploadPipeline;
use crate::session::SessionState;
use crate::sync::gate::DeliveryGate;
use crate::types::{Identity, MediaNamespace};

/// Bridges the identity service and the session state
pub struct IdentityGateway {
    service: Arc<dyn IdentityService>,
    session: SessionState,
}

impl IdentityGateway {
    pub fn new(service: Arc<dyn IdentityService>, session: SessionState) -> Self {
        Self { service, session }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Start mirroring auth-state changes into the session.
    ///
    /// Every event replaces the session identity (or clears it on sign-out).
    /// Keep a single observer per client; release it on shutdown.
    pub fn observe(&self) -> IdentityObserver {
        let gate: Arc<DeliveryGate<Option<ProviderUser>>> = Arc::new(DeliveryGate::new());
        let session = self.session.clone();
        gate.add_listener(move |user: &Option<ProviderUser>| match user {
            Some(user) => session.login(user.to_identity()),
            None => session.logout(),
        });

        let generation = gate.generation();
        let mut changes = self.service.auth_state_changes();
        let pump_gate = gate.clone();
        let task = tokio::spawn(async move {
            while let Some(user) = changes.next().await {
                debug!(signed_in = user.is_some(), "Auth state changed");
                if !pump_gate.deliver(generation, user) {
                    return;
                }
            }
            debug!("Auth state stream ended");
        });

        info!("Observing identity service");
        IdentityObserver {
            gate,
            task: Mutex::new(Some(task)),
        }
    }

    pub async fn sign_in(&self, form: &LoginForm) -> FeedResult<()> {
        if !form.can_submit() {
            return Err(FeedError::Identity(
                "email and a password of at least 6 characters are required".to_string(),
            ));
        }
        let user = self
            .service
            .sign_in_with_password(&form.email, &form.password)
            .await
            .map_err(as_identity_error)?;
        info!(uid = %user.uid, "Password sign-in accepted");
        Ok(())
    }

    /// Create an account, upload its avatar and set its profile.
    ///
    /// The account is created before the avatar upload; if the upload fails
    /// the account exists without a profile and the upload error is returned.
    pub async fn register(
        &self,
        form: &RegistrationForm,
        uploader: &UploadPipeline,
    ) -> FeedResult<Identity> {
        let Some(avatar) = form.avatar.as_ref().filter(|_| form.can_submit()) else {
            return Err(FeedError::Identity(
                "username, email, avatar and a password of at least 6 characters are required"
                    .to_string(),
            ));
        };

        let user = self
            .service
            .sign_up_with_password(&form.email, &form.password)
            .await
            .map_err(as_identity_error)?;
        info!(uid = %user.uid, "Account created");

        let avatar = uploader.upload_file(avatar, MediaNamespace::Avatars).await?;
        self.service
            .update_profile(&form.username, &avatar.url)
            .await
            .map_err(as_identity_error)?;
        self.session
            .update_profile(&user.uid, &form.username, &avatar.url);

        Ok(Identity {
            id: user.uid,
            display_name: form.username.clone(),
            avatar_url: avatar.url,
        })
    }

    pub async fn sign_in_federated(&self) -> FeedResult<()> {
        let user = self
            .service
            .sign_in_with_federated_provider()
            .await
            .map_err(as_identity_error)?;
        info!(uid = %user.uid, "Federated sign-in accepted");
        Ok(())
    }

    pub async fn sign_out(&self) -> FeedResult<()> {
        self.service.sign_out().await.map_err(as_identity_error)
    }

    pub async fn send_password_reset(&self, form: &PasswordResetForm) -> FeedResult<()> {
        if !form.can_submit() {
            return Err(FeedError::Identity("an email address is required".to_string()));
        }
        self.service
            .send_password_reset(&form.email)
            .await
            .map_err(as_identity_error)?;
        info!("Password reset requested");
        Ok(())
    }
}

fn as_identity_error(err: FeedError) -> FeedError {
    match err {
        FeedError::Identity(_) => err,
        other => {
            warn!(error = %other, "Identity service call failed");
            FeedError::Identity(other.to_string())
        }
    }
}

/// Live auth-state observation. Releasing is idempotent; after `release`
/// returns the session is no longer updated.
pub struct IdentityObserver {
    gate: Arc<DeliveryGate<Option<ProviderUser>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IdentityObserver {
    pub fn release(&self) -> bool {
        if !self.gate.close() {
            return false;
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        info!("Stopped observing identity service");
        true
    }

    pub fn is_released(&self) -> bool {
        !self.gate.is_open()
    }
}

impl Drop for IdentityObserver {
    fn drop(&mut self) {
        self.release();
    }
}
