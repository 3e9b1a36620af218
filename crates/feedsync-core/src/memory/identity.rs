//! In-memory identity service

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use ulid::Ulid;

use crate::authoring::MIN_PASSWORD_LEN;
use crate::error::{FeedError, FeedResult};
use crate::identity::{AuthStateStream, IdentityService, ProviderUser};

struct Account {
    password: String,
    user: ProviderUser,
}

#[derive(Default)]
struct IdentityState {
    accounts: HashMap<String, Account>,
    current: Option<ProviderUser>,
    federated: Option<ProviderUser>,
    resets: Vec<String>,
    watchers: Vec<mpsc::UnboundedSender<Option<ProviderUser>>>,
}

impl IdentityState {
    fn set_current(&mut self, user: Option<ProviderUser>) {
        self.current = user.clone();
        self.watchers.retain(|watcher| watcher.send(user.clone()).is_ok());
    }
}

/// Identity service held in memory, with email/password accounts and a
/// configurable federated user
#[derive(Default)]
pub struct MemoryIdentityService {
    state: Mutex<IdentityState>,
}

impl MemoryIdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account directly, without signing it in
    pub fn add_account(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> ProviderUser {
        let user = ProviderUser {
            uid: Ulid::new().to_string(),
            email: Some(email.to_string()),
            display_name: display_name.map(str::to_string),
            photo_url: photo_url.map(str::to_string),
        };
        self.state.lock().accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        user
    }

    /// User returned by the next federated sign-in; `None` simulates the
    /// user closing the provider's prompt
    pub fn set_federated_user(&self, user: Option<ProviderUser>) {
        self.state.lock().federated = user;
    }

    /// Emit an auth-state change as the provider would on its own
    pub fn push_auth_state(&self, user: Option<ProviderUser>) {
        self.state.lock().set_current(user);
    }

    pub fn current_user(&self) -> Option<ProviderUser> {
        self.state.lock().current.clone()
    }

    pub fn account_count(&self) -> usize {
        self.state.lock().accounts.len()
    }

    /// Emails a password reset was sent to
    pub fn password_resets(&self) -> Vec<String> {
        self.state.lock().resets.clone()
    }
}

#[async_trait]
impl IdentityService for MemoryIdentityService {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> FeedResult<ProviderUser> {
        let mut state = self.state.lock();
        let user = match state.accounts.get(email) {
            Some(account) if account.password == password => account.user.clone(),
            Some(_) => {
                return Err(FeedError::Identity(
                    "The password is invalid for this account".to_string(),
                ))
            }
            None => {
                return Err(FeedError::Identity(format!(
                    "There is no account for {}",
                    email
                )))
            }
        };
        state.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_up_with_password(&self, email: &str, password: &str) -> FeedResult<ProviderUser> {
        let mut state = self.state.lock();
        if !email.contains('@') {
            return Err(FeedError::Identity("The email address is badly formatted".to_string()));
        }
        if state.accounts.contains_key(email) {
            return Err(FeedError::Identity(
                "The email address is already in use by another account".to_string(),
            ));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(FeedError::Identity(format!(
                "Password should be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        let user = ProviderUser {
            uid: Ulid::new().to_string(),
            email: Some(email.to_string()),
            display_name: None,
            photo_url: None,
        };
        state.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        state.set_current(Some(user.clone()));
        debug!(uid = %user.uid, "Memory account created");
        Ok(user)
    }

    async fn sign_in_with_federated_provider(&self) -> FeedResult<ProviderUser> {
        let mut state = self.state.lock();
        let Some(user) = state.federated.clone() else {
            return Err(FeedError::Identity(
                "The sign-in prompt was closed before completing".to_string(),
            ));
        };
        state.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> FeedResult<()> {
        self.state.lock().set_current(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> FeedResult<()> {
        let mut state = self.state.lock();
        if !state.accounts.contains_key(email) {
            return Err(FeedError::Identity(format!(
                "There is no account for {}",
                email
            )));
        }
        state.resets.push(email.to_string());
        Ok(())
    }

    async fn update_profile(&self, display_name: &str, photo_url: &str) -> FeedResult<()> {
        let mut state = self.state.lock();
        let Some(mut user) = state.current.clone() else {
            return Err(FeedError::Identity("No user is signed in".to_string()));
        };
        user.display_name = Some(display_name.to_string());
        user.photo_url = Some(photo_url.to_string());
        if let Some(account) = state
            .accounts
            .values_mut()
            .find(|account| account.user.uid == user.uid)
        {
            account.user = user.clone();
        }
        state.set_current(Some(user));
        Ok(())
    }

    fn auth_state_changes(&self) -> AuthStateStream {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state.lock();
            let _ = tx.send(state.current.clone());
            state.watchers.push(tx);
        }
        futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|user| (user, rx))
        })
        .boxed()
    }
}
