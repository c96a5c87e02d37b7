//! Per-request authentication headers
//!
//! The resolver reads a shared [`Credentials`] snapshot on every call, so
//! tokens updated at runtime (a new session login, a rotated key) apply to the
//! next request without rebuilding the client.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Header carrying the session v-token
pub const HEADER_VTOKEN: &str = "x-vtoken";
/// Header carrying the companion c-token
pub const HEADER_CTOKEN: &str = "x-ctoken";
/// Header carrying the user session token when no service key is configured
pub const HEADER_PTOKEN: &str = "x-ptoken";
/// Standard bearer header
pub const HEADER_AUTHORIZATION: &str = "authorization";

/// Credential sources consulted for every request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Session-level v-token
    pub v_token: Option<String>,
    /// Companion c-token, sent alongside the v-token
    pub c_token: Option<String>,
    /// Service-level API key
    pub service_key: Option<String>,
    /// User session bearer token
    pub session_token: Option<String>,
}

/// Computes the auth header set for outgoing requests
#[derive(Clone, Debug, Default)]
pub struct AuthResolver {
    credentials: Arc<RwLock<Credentials>>,
}

impl AuthResolver {
    /// Create a resolver over the given credentials
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Arc::new(RwLock::new(credentials)),
        }
    }

    /// Snapshot of the current credentials
    pub fn credentials(&self) -> Credentials {
        match self.credentials.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Mutate the credentials in place
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Credentials),
    {
        let mut guard = match self.credentials.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut *guard);
    }

    /// Header set for one request
    ///
    /// - a v-token adds `x-vtoken` and `x-ctoken`, independent of the tiers below
    /// - without a service key, the session token goes in `x-ptoken` and no
    ///   `Authorization` header is produced
    /// - otherwise `Authorization: Bearer <service key>`
    ///
    /// Missing credentials are not an error; the set is simply smaller.
    pub fn resolve(&self) -> BTreeMap<String, String> {
        let creds = self.credentials();
        let mut headers = BTreeMap::new();

        if let Some(v_token) = non_empty(&creds.v_token) {
            headers.insert(HEADER_VTOKEN.to_string(), v_token.to_string());
            headers.insert(
                HEADER_CTOKEN.to_string(),
                non_empty(&creds.c_token).unwrap_or_default().to_string(),
            );
        }

        let Some(service_key) = non_empty(&creds.service_key) else {
            if let Some(session) = non_empty(&creds.session_token) {
                headers.insert(HEADER_PTOKEN.to_string(), session.to_string());
            }
            return headers;
        };

        headers.insert(
            HEADER_AUTHORIZATION.to_string(),
            format!("Bearer {service_key}"),
        );
        headers
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(v: Option<&str>, key: Option<&str>, session: Option<&str>) -> Credentials {
        Credentials {
            v_token: v.map(String::from),
            c_token: v.map(|_| "ctok".to_string()),
            service_key: key.map(String::from),
            session_token: session.map(String::from),
        }
    }

    #[test]
    fn vtoken_is_additive_with_ptoken_fallback() {
        let resolver = AuthResolver::new(creds(Some("vtok"), None, Some("sess")));
        let headers = resolver.resolve();

        assert_eq!(headers.get(HEADER_VTOKEN).map(String::as_str), Some("vtok"));
        assert_eq!(headers.get(HEADER_CTOKEN).map(String::as_str), Some("ctok"));
        assert_eq!(headers.get(HEADER_PTOKEN).map(String::as_str), Some("sess"));
        assert!(!headers.contains_key(HEADER_AUTHORIZATION));
    }

    #[test]
    fn service_key_produces_bearer_and_no_ptoken() {
        let resolver = AuthResolver::new(creds(None, Some("sk-1"), Some("sess")));
        let headers = resolver.resolve();

        assert_eq!(
            headers.get(HEADER_AUTHORIZATION).map(String::as_str),
            Some("Bearer sk-1")
        );
        assert!(!headers.contains_key(HEADER_PTOKEN));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn vtoken_and_service_key_combine() {
        let resolver = AuthResolver::new(creds(Some("vtok"), Some("sk-1"), None));
        let headers = resolver.resolve();
        assert_eq!(headers.len(), 3);
        assert!(headers.contains_key(HEADER_VTOKEN));
        assert!(headers.contains_key(HEADER_AUTHORIZATION));
    }

    #[test]
    fn no_credentials_yields_empty_set() {
        assert!(AuthResolver::default().resolve().is_empty());
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let resolver = AuthResolver::new(creds(Some(""), Some(""), Some("sess")));
        let headers = resolver.resolve();
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(HEADER_PTOKEN));
    }

    #[test]
    fn updates_apply_to_clones() {
        let resolver = AuthResolver::default();
        let clone = resolver.clone();
        resolver.update(|c| c.service_key = Some("rotated".into()));
        assert_eq!(
            clone.resolve().get(HEADER_AUTHORIZATION).map(String::as_str),
            Some("Bearer rotated")
        );
    }
}
