//! LTI consumer credential resolution
//!
//! Credentials identify this platform to the host LMS and key every OAuth1
//! signature. Resolution order: environment variables, then the settings
//! table. Missing credentials are a deployment misconfiguration and abort
//! startup; they are never a per-journal condition.

use penlight_common::db::settings;
use penlight_common::{Error, Result};
use sqlx::SqlitePool;

pub const ENV_LTI_KEY: &str = "PENLIGHT_LTI_KEY";
pub const ENV_LTI_SECRET: &str = "PENLIGHT_LTI_SECRET";

/// Shared consumer key/secret for the two-legged OAuth exchange
#[derive(Debug, Clone)]
pub struct LtiCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
}

impl LtiCredentials {
    /// Resolve credentials: environment first, settings table second
    pub async fn resolve(db: &SqlitePool) -> Result<Self> {
        let consumer_key = match non_empty_env(ENV_LTI_KEY) {
            Some(value) => Some(value),
            None => settings::get_lti_consumer_key(db).await?,
        };
        let consumer_secret = match non_empty_env(ENV_LTI_SECRET) {
            Some(value) => Some(value),
            None => settings::get_lti_consumer_secret(db).await?,
        };

        match (consumer_key, consumer_secret) {
            (Some(consumer_key), Some(consumer_secret)) => Ok(Self {
                consumer_key,
                consumer_secret,
            }),
            _ => Err(Error::Config(format!(
                "LTI consumer credentials not configured (set {} / {} or the \
                 lti_consumer_key / lti_consumer_secret settings)",
                ENV_LTI_KEY, ENV_LTI_SECRET
            ))),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
