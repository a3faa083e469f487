//! Authentication methods.

use gitwire_protocol::Endpoint;
use reqwest::blocking::RequestBuilder;
use std::fmt;

/// Credentials applied to outgoing HTTP requests.
///
/// Only HTTP transports accept an auth method; local and `git://` commands
/// reject any value. Secrets never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// HTTP Basic authentication.
    Basic {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// Bearer token.
    Token(String),
}

impl AuthMethod {
    /// Creates Basic credentials.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates a bearer token.
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token(token.into())
    }

    /// Derives Basic credentials from `user[:password]@` in the endpoint.
    pub fn from_endpoint(endpoint: &Endpoint) -> Option<Self> {
        let username = endpoint.user()?;
        Some(Self::basic(username, endpoint.password().unwrap_or_default()))
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Basic { .. } => "http-basic-auth",
            Self::Token(_) => "http-token-auth",
        }
    }

    /// Sets the Authorization header on a request.
    pub(crate) fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Basic { username, password } => request.basic_auth(username, Some(password)),
            Self::Token(token) => request.bearer_auth(token),
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Token(_) => f.debug_tuple("Token").field(&"[REDACTED]").finish(),
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => write!(f, "{} - {}:[REDACTED]", self.name(), username),
            Self::Token(_) => write!(f, "{} - [REDACTED]", self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let basic = AuthMethod::basic("alice", "super_secret_password");
        let debug = format!("{basic:?}");
        assert!(debug.contains("alice"));
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("super_secret_password"));

        let token = AuthMethod::token("ghp_abcdef");
        assert!(!format!("{token:?}").contains("ghp_abcdef"));
        assert!(!token.to_string().contains("ghp_abcdef"));
    }

    #[test]
    fn test_from_endpoint() {
        let ep = Endpoint::parse("https://bob:pw@example.com/r.git").unwrap();
        assert_eq!(
            AuthMethod::from_endpoint(&ep),
            Some(AuthMethod::basic("bob", "pw"))
        );

        let ep = Endpoint::parse("https://example.com/r.git").unwrap();
        assert_eq!(AuthMethod::from_endpoint(&ep), None);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: neither Debug nor Display output contains the secret.
        #[test]
        fn prop_secret_never_rendered(user in "[a-z]{1,12}", secret in "[A-Za-z0-9]{16,40}") {
            for auth in [AuthMethod::basic(user.clone(), secret.clone()), AuthMethod::token(secret.clone())] {
                let debug = format!("{auth:?}");
                let display = auth.to_string();
                prop_assert!(!debug.contains(&secret));
                prop_assert!(!display.contains(&secret));
            }
        }
    }
}
