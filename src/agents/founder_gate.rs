//! Operator approval tokens
//!
//! A token has the form `<action>:<unix_expiry>` and approves exactly one
//! action until it expires. It is read from an environment variable, falling
//! back to a token file. Tokens without an action scope are rejected.

use chrono::Utc;
use std::path::PathBuf;

use crate::config::FounderConfig;
use crate::logger::{self, LogTag};
use crate::paths;

/// Overrides the configured token file location
pub const TOKEN_FILE_ENV: &str = "FOUNDER_TOKEN_FILE";

pub const ACTION_CAPITAL_UNLOCK: &str = "capital_unlock";
pub const ACTION_OPS_RESUME: &str = "ops_resume";
pub const ACTION_LIVE_TRADING: &str = "live_trading";

#[derive(Debug, Clone)]
pub struct FounderGate {
    token_env: String,
    token_file: PathBuf,
}

impl FounderGate {
    pub fn new(token_env: impl Into<String>, token_file: PathBuf) -> Self {
        Self {
            token_env: token_env.into(),
            token_file,
        }
    }

    pub fn from_config(config: &FounderConfig) -> Self {
        let token_file = std::env::var(TOKEN_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| paths::resolve(&config.token_file));
        Self::new(config.token_env.clone(), token_file)
    }

    /// Current token and where it came from
    fn current_token(&self) -> Option<(String, &'static str)> {
        if let Ok(token) = std::env::var(&self.token_env) {
            if !token.trim().is_empty() {
                return Some((token.trim().to_string(), "env"));
            }
        }
        let contents = std::fs::read_to_string(&self.token_file).ok()?;
        let token = contents.trim();
        if token.is_empty() {
            None
        } else {
            Some((token.to_string(), "file"))
        }
    }

    /// Whether the ambient token approves `action` right now
    pub fn approved(&self, action: &str) -> bool {
        self.check(action, None)
    }

    /// Validate `explicit` if given, otherwise the ambient token
    pub fn check(&self, action: &str, explicit: Option<&str>) -> bool {
        let (token, source) = match explicit {
            Some(t) => (Some(t.trim().to_string()), "explicit"),
            None => match self.current_token() {
                Some((t, s)) => (Some(t), s),
                None => (None, "none"),
            },
        };

        let approved = token
            .as_deref()
            .map(|t| Self::token_approves(t, action, Utc::now().timestamp()))
            .unwrap_or(false);

        logger::info(
            LogTag::Founder,
            &format!(
                "Founder check action={} approved={} source={}",
                action, approved, source
            ),
        );
        approved
    }

    /// Pure token check against a given clock
    pub fn token_approves(token: &str, action: &str, now_unix: i64) -> bool {
        let Some((scope, expiry)) = token.split_once(':') else {
            return false;
        };
        if scope != action {
            return false;
        }
        // Whole unix seconds only; `inf` and exponent forms never parse
        match expiry.trim().parse::<i64>() {
            Ok(expiry) => expiry > now_unix,
            Err(_) => false,
        }
    }

    pub fn mint_token(action: &str, ttl_secs: u64) -> String {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        format!("{}:{}", action, Utc::now().timestamp().saturating_add(ttl))
    }
}
