//! Inbound authentication.
//!
//! # Data Flow
//! ```text
//! config `authentication = ["user:pass", ...]`
//!     → AuthUser list
//!     → Authenticator::new (None for an empty list)
//!     → AuthStore (atomic swap, read by protocol handlers)
//! ```

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// One configured credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user: String,
    pub pass: String,
}

impl FromStr for AuthUser {
    type Err = String;

    /// Parse `user:pass`. The password may itself contain `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((user, pass)) if !user.is_empty() => Ok(Self {
                user: user.to_string(),
                pass: pass.to_string(),
            }),
            _ => Err(format!("invalid credential {:?}, expected user:pass", s)),
        }
    }
}

/// Credential checker built from the configured users.
#[derive(Debug)]
pub struct Authenticator {
    storage: HashMap<String, String>,
    users: Vec<String>,
}

impl Authenticator {
    /// Build an authenticator, or `None` when there are no users.
    pub fn new(users: &[AuthUser]) -> Option<Self> {
        if users.is_empty() {
            return None;
        }

        let mut storage = HashMap::with_capacity(users.len());
        let mut names = Vec::with_capacity(users.len());
        for u in users {
            if storage.insert(u.user.clone(), u.pass.clone()).is_none() {
                names.push(u.user.clone());
            }
        }

        Some(Self { storage, users: names })
    }

    pub fn verify(&self, user: &str, pass: &str) -> bool {
        self.storage.get(user).is_some_and(|p| p == pass)
    }

    /// Configured user names, in configuration order.
    pub fn users(&self) -> &[String] {
        &self.users
    }
}

/// Holds the active authenticator.
#[derive(Debug, Default)]
pub struct AuthStore {
    current: ArcSwapOption<Authenticator>,
}

impl AuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authenticator(&self) -> Option<Arc<Authenticator>> {
        self.current.load_full()
    }

    pub fn set_authenticator(&self, authenticator: Option<Authenticator>) {
        self.current.store(authenticator.map(Arc::new));
    }

    /// Names of configured users; empty when authentication is off.
    pub fn users(&self) -> Vec<String> {
        self.authenticator().map(|a| a.users().to_vec()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(u: &str, p: &str) -> AuthUser {
        AuthUser {
            user: u.into(),
            pass: p.into(),
        }
    }

    #[test]
    fn empty_list_disables_auth() {
        assert!(Authenticator::new(&[]).is_none());

        let store = AuthStore::new();
        store.set_authenticator(Authenticator::new(&[]));
        assert!(store.authenticator().is_none());
        assert!(store.users().is_empty());
    }

    #[test]
    fn verify_credentials() {
        let auth = Authenticator::new(&[user("alice", "s3cret"), user("bob", "pw")]).unwrap();
        assert!(auth.verify("alice", "s3cret"));
        assert!(!auth.verify("alice", "pw"));
        assert!(!auth.verify("carol", "pw"));
        assert_eq!(auth.users(), ["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn parse_credentials() {
        assert_eq!("alice:a:b".parse::<AuthUser>().unwrap(), user("alice", "a:b"));
        assert!("nopass".parse::<AuthUser>().is_err());
        assert!(":pw".parse::<AuthUser>().is_err());
    }
}
