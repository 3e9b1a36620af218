//! Identity service boundary

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::FeedResult;
use crate::types::Identity;

/// Stream of authentication states. The current state is emitted first.
pub type AuthStateStream = BoxStream<'static, Option<ProviderUser>>;

/// A user record as the identity service reports it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl ProviderUser {
    /// Normalize into the client's identity; missing profile fields become
    /// empty strings
    pub fn to_identity(&self) -> Identity {
        Identity {
            id: self.uid.clone(),
            display_name: self.display_name.clone().unwrap_or_default(),
            avatar_url: self.photo_url.clone().unwrap_or_default(),
        }
    }
}

/// External authentication provider
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> FeedResult<ProviderUser>;

    async fn sign_up_with_password(&self, email: &str, password: &str) -> FeedResult<ProviderUser>;

    /// Interactive third-party sign-in. Fails if the user cancels.
    async fn sign_in_with_federated_provider(&self) -> FeedResult<ProviderUser>;

    async fn sign_out(&self) -> FeedResult<()>;

    async fn send_password_reset(&self, email: &str) -> FeedResult<()>;

    /// Set the signed-in user's display name and photo URL. Auth-state
    /// observers receive the updated user.
    async fn update_profile(&self, display_name: &str, photo_url: &str) -> FeedResult<()>;

    /// Subscribe to authentication state changes
    fn auth_state_changes(&self) -> AuthStateStream;
}
