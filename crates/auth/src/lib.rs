use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use duo_config::AuthConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("identity must not be empty")]
    InvalidIdentity,
    #[error("identity {0} is not permitted")]
    NotPermitted(Identity),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Opaque identity string of a signed-in party.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn parse(raw: impl AsRef<str>) -> AuthResult<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(AuthError::InvalidIdentity);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Decides whether an identity may use the application at all.
#[cfg_attr(test, mockall::automock)]
pub trait Authorizer: Send + Sync {
    fn is_permitted(&self, identity: &Identity) -> bool;
}

/// Fixed set of permitted identities. An empty list permits nobody.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    identities: BTreeSet<Identity>,
}

impl AllowList {
    pub fn new<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let identities = identities
            .into_iter()
            .filter_map(|raw| Identity::parse(raw).ok())
            .collect();
        Self { identities }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let list = Self::new(&config.allowed_identities);
        if list.is_empty() {
            warn!("auth.allowed_identities is empty; every sign-in will be refused");
        }
        list
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.identities.iter()
    }
}

impl Authorizer for AllowList {
    fn is_permitted(&self, identity: &Identity) -> bool {
        self.identities.contains(identity)
    }
}

struct SessionInner {
    id: String,
    identity: Identity,
    started_at: DateTime<Utc>,
    signed_out: watch::Sender<bool>,
}

/// Explicit session context handed to the engines.
///
/// Cloning shares the same session. Everything keyed to it stops once
/// [`Session::sign_out`] is called.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn sign_in(identity: Identity, authorizer: &dyn Authorizer) -> AuthResult<Self> {
        if !authorizer.is_permitted(&identity) {
            warn!(identity = %identity, "sign-in refused");
            return Err(AuthError::NotPermitted(identity));
        }

        let (signed_out, _) = watch::channel(false);
        let session = Self {
            inner: Arc::new(SessionInner {
                id: cuid2::create_id(),
                identity,
                started_at: Utc::now(),
                signed_out,
            }),
        };

        info!(session_id = %session.id(), identity = %session.identity(), "signed in");
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn is_active(&self) -> bool {
        !*self.inner.signed_out.borrow()
    }

    /// End the session. Idempotent.
    pub fn sign_out(&self) {
        let changed = self.inner.signed_out.send_if_modified(|signed_out| {
            let was_active = !*signed_out;
            *signed_out = true;
            was_active
        });
        if changed {
            info!(session_id = %self.id(), identity = %self.identity(), "signed out");
        }
    }

    /// Resolves once the session has been signed out.
    pub async fn closed(&self) {
        let mut receiver = self.inner.signed_out.subscribe();
        // The sender lives as long as `self`, so this only returns on sign-out.
        let _ = receiver.wait_for(|signed_out| *signed_out).await;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("identity", &self.inner.identity)
            .field("active", &self.is_active())
            .finish()
    }
}
