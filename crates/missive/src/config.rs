//! Configuration loading for the Missive pull
//!
//! Credentials come from (in order of priority):
//! 1. Values passed explicitly (CLI flags, which clap also fills from env)
//! 2. `credentials.json` in the pull-missive config directory
//! 3. Environment variables `MISSIVE_API_KEY` and `INBOX_ID`
//!
//! Tunables come from `settings.json` in the same directory, with defaults
//! for anything missing.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::api::{MissiveClient, PageLimits};
use crate::sync::{RetryPolicy, SyncOptions};

const CREDENTIALS_FILE: &str = "credentials.json";
const SETTINGS_FILE: &str = "settings.json";

const API_KEY_VAR: &str = "MISSIVE_API_KEY";
const INBOX_ID_VAR: &str = "INBOX_ID";

/// API token and inbox to pull from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissiveCredentials {
    pub api_key: String,
    pub inbox_id: String,
}

/// Credentials file format; either field may be left out
#[derive(Debug, Default, Deserialize)]
struct CredentialsFile {
    api_key: Option<String>,
    inbox_id: Option<String>,
}

impl MissiveCredentials {
    /// Resolve credentials, preferring explicit values
    pub fn load(api_key: Option<String>, inbox_id: Option<String>) -> Result<Self> {
        let file: CredentialsFile = ::config::load_json_or_default(CREDENTIALS_FILE)?;
        Self::resolve(api_key, inbox_id, file, |var| std::env::var(var).ok())
    }

    /// Parse a credentials file body
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CredentialsFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::resolve(None, None, file, |_| None)
    }

    fn resolve(
        api_key: Option<String>,
        inbox_id: Option<String>,
        file: CredentialsFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let api_key = non_empty(api_key)
            .or_else(|| non_empty(file.api_key))
            .or_else(|| non_empty(env(API_KEY_VAR)))
            .with_context(|| {
                format!("No Missive API key: pass --api-key or set {}", API_KEY_VAR)
            })?;
        let inbox_id = non_empty(inbox_id)
            .or_else(|| non_empty(file.inbox_id))
            .or_else(|| non_empty(env(INBOX_ID_VAR)))
            .with_context(|| format!("No inbox id: pass --inbox-id or set {}", INBOX_ID_VAR))?;

        Ok(Self { api_key, inbox_id })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Tunables for the HTTP client and sync engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub api_base: String,
    pub conversations_page_size: usize,
    pub messages_page_size: usize,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub workers: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base: MissiveClient::DEFAULT_API_BASE.to_string(),
            conversations_page_size: 50,
            messages_page_size: 10,
            request_timeout_secs: 30,
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 60_000,
            workers: 1,
        }
    }
}

impl SyncSettings {
    /// Load `settings.json`, or defaults if it does not exist
    pub fn load() -> Result<Self> {
        ::config::load_json_or_default(SETTINGS_FILE)
    }

    /// Parse a settings file body
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse settings JSON")
    }

    pub fn client(&self, credentials: &MissiveCredentials) -> MissiveClient {
        MissiveClient::new(&credentials.api_key, &credentials.inbox_id)
            .with_api_base(&self.api_base)
            .with_limits(PageLimits {
                conversations: self.conversations_page_size.max(1),
                messages: self.messages_page_size.max(1),
            })
            .with_timeout(Duration::from_secs(self.request_timeout_secs))
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            retry: RetryPolicy::new(
                self.max_attempts,
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            ),
            workers: self.workers.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_credentials_file() {
        let creds = MissiveCredentials::from_json(
            r#"{ "api_key": "missive_pat-abc", "inbox_id": "team-123" }"#,
        )
        .unwrap();
        assert_eq!(creds.api_key, "missive_pat-abc");
        assert_eq!(creds.inbox_id, "team-123");
    }

    #[test]
    fn test_incomplete_credentials_file() {
        assert!(MissiveCredentials::from_json(r#"{ "api_key": "k" }"#).is_err());
        assert!(MissiveCredentials::from_json("{}").is_err());
    }

    #[test]
    fn test_explicit_values_win() {
        let file = CredentialsFile {
            api_key: Some("from-file".into()),
            inbox_id: Some("file-inbox".into()),
        };
        let creds =
            MissiveCredentials::resolve(Some("flag".into()), None, file, no_env).unwrap();
        assert_eq!(creds.api_key, "flag");
        assert_eq!(creds.inbox_id, "file-inbox");
    }

    #[test]
    fn test_env_is_last_resort() {
        let env = |var: &str| match var {
            "MISSIVE_API_KEY" => Some("env-key".to_string()),
            "INBOX_ID" => Some("env-inbox".to_string()),
            _ => None,
        };
        let creds = MissiveCredentials::resolve(
            Some("  ".into()),
            None,
            CredentialsFile::default(),
            env,
        )
        .unwrap();
        assert_eq!(creds.api_key, "env-key");
        assert_eq!(creds.inbox_id, "env-inbox");
    }

    #[test]
    fn test_missing_key_mentions_variable() {
        let err = MissiveCredentials::resolve(
            None,
            Some("inbox".into()),
            CredentialsFile::default(),
            no_env,
        )
        .unwrap_err();
        assert!(err.to_string().contains("MISSIVE_API_KEY"));
    }

    #[test]
    fn test_settings_defaults_fill_gaps() {
        let settings = SyncSettings::from_json(r#"{ "workers": 4, "max_attempts": 2 }"#).unwrap();
        assert_eq!(settings.workers, 4);
        assert_eq!(settings.max_attempts, 2);
        assert_eq!(settings.messages_page_size, 10);
        assert_eq!(settings.api_base, MissiveClient::DEFAULT_API_BASE);
    }

    #[test]
    fn test_sync_options_clamp_workers() {
        let settings = SyncSettings {
            workers: 0,
            ..Default::default()
        };
        let options = settings.sync_options();
        assert_eq!(options.workers, 1);
        assert_eq!(options.retry.max_attempts(), 5);
    }
}
