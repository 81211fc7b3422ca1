//! Sign-in, sign-up and sign-out.
//!
//! Authentication itself belongs to an external collaborator behind
//! [`AuthProvider`].  This module owns the part that runs before it is ever
//! called: email and password validation, which fails locally with
//! [`Error::Validation`] and never touches the network.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Message shown for an email that fails the policy.
pub const INVALID_EMAIL: &str = "Invalid email";

/// Message shown for a password that fails the rules.
pub const INVALID_PASSWORD: &str =
    "Password must contain:\n- 8 characters\n- 1 uppercase letter (A-Z)\n- 1 number (0-9)";

/// Minimum password length, in characters.
pub const MIN_PASSWORD_CHARS: usize = 8;

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Stable identifier; keys the usage store.
    pub id: String,
    /// Email the user signed in with.
    pub email: String,
}

/// How strictly an email address is checked before sign-in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmailPolicy {
    /// Anything non-empty.
    #[default]
    NonEmpty,
    /// Must contain both `@` and `.`.
    Format,
}

impl EmailPolicy {
    /// `Format` when `strict`, `NonEmpty` otherwise.
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            EmailPolicy::Format
        } else {
            EmailPolicy::NonEmpty
        }
    }

    /// Check an email against this policy.
    pub fn validate(&self, email: &str) -> Result<()> {
        let ok = match self {
            EmailPolicy::NonEmpty => !email.is_empty(),
            EmailPolicy::Format => email.contains('@') && email.contains('.'),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::validation(INVALID_EMAIL, Some("email".to_string())))
        }
    }
}

/// Check a password: at least eight characters on a single line, one ASCII
/// uppercase letter and one ASCII digit.
pub fn validate_password(password: &str) -> Result<()> {
    let single_line = !password.chars().any(is_line_terminator);
    let long_enough = password.chars().count() >= MIN_PASSWORD_CHARS;
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if single_line && long_enough && has_upper && has_digit {
        Ok(())
    } else {
        Err(Error::validation(
            INVALID_PASSWORD,
            Some("password".to_string()),
        ))
    }
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{85}' | '\u{2028}' | '\u{2029}')
}

/// Whether a credential submission signs in or creates an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Sign in to an existing account.
    SignIn,
    /// Create a new account.
    SignUp,
}

/// The external authentication collaborator.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// The signed-in user, if any.
    fn current_user(&self) -> Option<User>;

    /// Sign in to an existing account.
    async fn sign_in(&self, email: &str, password: &str) -> Result<User>;

    /// Create an account and sign in to it.
    async fn sign_up(&self, email: &str, password: &str) -> Result<User>;

    /// Sign out.
    fn sign_out(&self);
}

/// Validate credentials, then hand them to `provider`.
///
/// Both fields are checked before returning so a form can flag them together;
/// the email error wins when both fail.
pub async fn authenticate(
    provider: &dyn AuthProvider,
    policy: EmailPolicy,
    mode: AuthMode,
    email: &str,
    password: &str,
) -> Result<User> {
    let email_check = policy.validate(email);
    let password_check = validate_password(password);
    email_check?;
    password_check?;
    let result = match mode {
        AuthMode::SignIn => provider.sign_in(email, password).await,
        AuthMode::SignUp => provider.sign_up(email, password).await,
    };
    if let Err(err) = &result {
        tracing::info!(?mode, error = %err, "authentication rejected");
    }
    result
}

/// Accounts held in memory for the lifetime of the process.
///
/// User ids are derived from the email so the same account maps to the same
/// usage counter across runs.
#[derive(Debug, Default)]
pub struct LocalAuth {
    inner: Mutex<LocalAuthState>,
}

#[derive(Debug, Default)]
struct LocalAuthState {
    accounts: HashMap<String, String>,
    current: Option<User>,
}

impl LocalAuth {
    /// Create a provider with no accounts.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LocalAuthState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn user_for(email: &str) -> User {
        let id = email
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        User {
            id,
            email: email.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl AuthProvider for LocalAuth {
    fn current_user(&self) -> Option<User> {
        self.lock().current.clone()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let mut state = self.lock();
        match state.accounts.get(email) {
            Some(stored) if stored == password => {
                let user = Self::user_for(email);
                state.current = Some(user.clone());
                Ok(user)
            }
            Some(_) => Err(Error::auth("The password is invalid.")),
            None => Err(Error::auth("There is no user record corresponding to this email.")),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<User> {
        let mut state = self.lock();
        if state.accounts.contains_key(email) {
            return Err(Error::auth(
                "The email address is already in use by another account.",
            ));
        }
        state.accounts.insert(email.to_string(), password.to_string());
        let user = Self::user_for(email);
        state.current = Some(user.clone());
        Ok(user)
    }

    fn sign_out(&self) {
        self.lock().current = None;
    }
}
