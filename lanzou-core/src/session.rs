use std::fmt;

/// Credentials for one signed-in account.
///
/// Passed explicitly into every [`crate::RemoteApi`] call; nothing in the
/// client keeps a "current" session around.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Session {
    cookie: String,
    user: Option<String>,
}

impl Session {
    pub fn new(cookie: impl Into<String>) -> Self {
        Self {
            cookie: cookie.into(),
            user: None,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.cookie.trim().is_empty()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field(
                "cookie",
                &if self.is_anonymous() {
                    "<none>"
                } else {
                    "<redacted>"
                },
            )
            .finish()
    }
}
