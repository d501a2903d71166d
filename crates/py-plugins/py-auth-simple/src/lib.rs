//! # py-auth-simple
//!
//! Argon2-based implementation of `AuthProvider`.
//! Accounts and sessions are held in memory; each session publishes its
//! identity on a `watch` channel so a catalog session holds one subscription.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use dashmap::DashMap;
use py_core::error::{AuthError, AuthErrorCode};
use py_core::models::{AuthSession, UserId, Viewer};
use py_core::traits::AuthProvider;
use tokio::sync::watch;
use tracing::{info, warn};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct Account {
    uid: UserId,
    email: String,
    password_hash: String,
    display_name: String,
    email_verified: bool,
}

impl Account {
    fn viewer(&self) -> Viewer {
        Viewer {
            uid: self.uid.clone(),
            email: Some(self.email.clone()),
            display_name: Some(self.display_name.clone()),
            photo_url: None,
            email_verified: self.email_verified,
        }
    }
}

struct Session {
    uid: UserId,
    identity: watch::Sender<Option<Viewer>>,
}

pub struct SimpleAuthProvider {
    /// Server-side secret mixed into every password hash.
    pepper: Arc<[u8]>,
    /// Accepted e-mail domain suffix, e.g. ".edu".
    allowed_suffix: String,
    /// Base URL used to build verification links.
    public_base_url: String,
    /// Keyed by lowercase e-mail.
    accounts: DashMap<String, Account>,
    sessions: DashMap<String, Session>,
    verification_tokens: DashMap<String, UserId>,
}

/// 32 random bytes, URL-safe base64.
fn random_token() -> Result<String, AuthError> {
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|_| internal_error())?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

fn internal_error() -> AuthError {
    AuthError::new(AuthErrorCode::Other("auth/internal-error".to_string()))
}

fn hasher(pepper: &[u8]) -> Result<Argon2<'_>, AuthError> {
    Argon2::new_with_secret(pepper, Algorithm::Argon2id, Version::V0x13, Params::default())
        .map_err(|_| internal_error())
}

/// Argon2 is CPU-bound, so it runs on the blocking pool.
async fn hash_password(pepper: Arc<[u8]>, password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        hasher(&pepper)?
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| internal_error())
    })
    .await
    .map_err(|err| {
        warn!(error = %err, "password hashing task aborted");
        internal_error()
    })?
}

async fn verify_password(pepper: Arc<[u8]>, password: String, hash: String) -> bool {
    let outcome = tokio::task::spawn_blocking(move || {
        let Ok(parsed_hash) = PasswordHash::new(&hash) else {
            return false;
        };
        hasher(&pepper).is_ok_and(|argon| argon.verify_password(password.as_bytes(), &parsed_hash).is_ok())
    })
    .await;
    match outcome {
        Ok(matches) => matches,
        Err(err) => {
            warn!(error = %err, "password check task aborted");
            false
        }
    }
}

impl SimpleAuthProvider {
    pub fn new(session_salt: &str, allowed_suffix: &str, public_base_url: &str) -> Self {
        Self {
            pepper: Arc::from(session_salt.as_bytes()),
            allowed_suffix: allowed_suffix.to_lowercase(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            accounts: DashMap::new(),
            sessions: DashMap::new(),
            verification_tokens: DashMap::new(),
        }
    }

    /// Normalizes and checks the address against the allowed domain suffix.
    fn check_email(&self, email: &str) -> Result<String, AuthError> {
        let email = email.trim().to_lowercase();
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !well_formed || !email.ends_with(&self.allowed_suffix) {
            return Err(AuthError::new(AuthErrorCode::InvalidEmail));
        }
        Ok(email)
    }

    fn account_by_uid(&self, uid: &UserId) -> Option<Account> {
        self.accounts
            .iter()
            .find(|entry| &entry.uid == uid)
            .map(|entry| entry.value().clone())
    }

    fn open_session(&self, account: &Account) -> Result<AuthSession, AuthError> {
        let token = random_token()?;
        let user = account.viewer();
        let (identity, _) = watch::channel(Some(user.clone()));
        self.sessions.insert(
            token.clone(),
            Session {
                uid: account.uid.clone(),
                identity,
            },
        );
        Ok(AuthSession { token, user })
    }

    /// Pushes the account's current identity to every live session of `uid`.
    fn publish(&self, account: &Account) {
        let viewer = account.viewer();
        for session in self.sessions.iter().filter(|s| s.uid == account.uid) {
            session.identity.send_replace(Some(viewer.clone()));
        }
    }
}

#[async_trait]
impl AuthProvider for SimpleAuthProvider {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = self.check_email(email)?;
        let account = self
            .accounts
            .get(&email)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AuthError::new(AuthErrorCode::UserNotFound))?;

        let matches = verify_password(
            Arc::clone(&self.pepper),
            password.to_string(),
            account.password_hash.clone(),
        )
        .await;
        if !matches {
            warn!(user_id = %account.uid, "wrong password");
            return Err(AuthError::new(AuthErrorCode::WrongPassword));
        }
        info!(user_id = %account.uid, verified = account.email_verified, "signed in");
        self.open_session(&account)
    }

    async fn sign_up_with_password(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = self.check_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::new(AuthErrorCode::WeakPassword));
        }

        let password_hash = hash_password(Arc::clone(&self.pepper), password.to_string()).await?;

        let display_name = email.split('@').next().unwrap_or_default().to_string();
        let account = Account {
            uid: UserId::new(random_token()?),
            email: email.clone(),
            password_hash,
            display_name,
            email_verified: false,
        };

        match self.accounts.entry(email) {
            dashmap::mapref::entry::Entry::Occupied(_) => return Err(AuthError::new(AuthErrorCode::EmailAlreadyInUse)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(account.clone());
            }
        }
        info!(user_id = %account.uid, "account created");

        self.send_verification_email(&account.uid).await;
        self.open_session(&account)
    }

    async fn sign_in_with_federated_popup(&self, provider_id: &str) -> Result<AuthSession, AuthError> {
        warn!(provider_id, "federated sign-in is not available");
        Err(AuthError::new(AuthErrorCode::OperationNotAllowed))
    }

    async fn sign_out(&self, token: &str) {
        if let Some((_, session)) = self.sessions.remove(token) {
            session.identity.send_replace(None);
            info!(user_id = %session.uid, "signed out");
        }
    }

    fn current_user(&self, token: &str) -> watch::Receiver<Option<Viewer>> {
        match self.sessions.get(token) {
            Some(session) => session.identity.subscribe(),
            None => watch::channel(None).1,
        }
    }

    /// Issues a one-time token and logs the verification link.
    async fn send_verification_email(&self, user_id: &UserId) -> bool {
        let Some(account) = self.account_by_uid(user_id) else {
            return false;
        };
        let Ok(token) = random_token() else {
            return false;
        };
        let link = format!("{}/auth/verify?token={token}", self.public_base_url);
        self.verification_tokens.insert(token, user_id.clone());
        info!(user_id = %user_id, email = %account.email, %link, "verification e-mail issued");
        true
    }

    async fn confirm_email(&self, token: &str) -> bool {
        let Some((_, uid)) = self.verification_tokens.remove(token) else {
            return false;
        };
        let updated = self.accounts.iter_mut().find(|entry| entry.uid == uid).map(|mut entry| {
            entry.email_verified = true;
            entry.value().clone()
        });

        match updated {
            Some(account) => {
                info!(user_id = %account.uid, "e-mail verified");
                true
            }
            None => false,
        }
    }

    async fn reload_and_check_verified(&self, user_id: &UserId) -> bool {
        match self.account_by_uid(user_id) {
            Some(account) => {
                self.publish(&account);
                account.email_verified
            }
            None => false,
        }
    }
}
