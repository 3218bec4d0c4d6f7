//! Integrations, tenants and plans
//!
//! An Integration binds one tenant to one external channel on one platform.
//! The plan attached to the tenant supplies the daily ceiling shared by all of
//! the tenant's integrations.

use crate::id::{generate_id, now_ms};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Social platforms an integration can point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Instagram,
    Tiktok,
    Facebook,
    Twitter,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
            Platform::Facebook => "facebook",
            Platform::Twitter => "twitter",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" => Ok(Platform::Youtube),
            "instagram" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::Tiktok),
            "facebook" => Ok(Platform::Facebook),
            "twitter" => Ok(Platform::Twitter),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Subscription plan limits that matter to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,

    /// Sent responses allowed per calendar day across all of the tenant's integrations
    pub max_responses_per_day: u32,
}

impl Plan {
    pub fn new(name: impl Into<String>, max_responses_per_day: u32) -> Self {
        Self {
            name: name.into(),
            max_responses_per_day,
        }
    }
}

impl Default for Plan {
    fn default() -> Self {
        Self::new("free", 20)
    }
}

/// A tenant owning integrations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,

    /// Active plan; a tenant without one cannot run
    pub plan: Option<Plan>,
}

impl Tenant {
    pub fn new(id: impl Into<String>, plan: Option<Plan>) -> Self {
        Self { id: id.into(), plan }
    }
}

/// A tenant's connection to one external channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    pub tenant_id: String,
    pub platform: Platform,

    /// Platform-native channel identifier
    pub channel_id: String,
    pub channel_name: Option<String>,

    /// Sealed access token (hex ciphertext); never plaintext
    pub access_token_sealed: Option<String>,

    /// Sealed refresh token (hex ciphertext); never plaintext
    pub refresh_token_sealed: Option<String>,

    /// Soft-delete flag; disabled integrations are never run
    pub enabled: bool,

    pub last_run_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Integration {
    pub fn new(tenant_id: impl Into<String>, platform: Platform, channel_id: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: generate_id("int"),
            tenant_id: tenant_id.into(),
            platform,
            channel_id: channel_id.into(),
            channel_name: None,
            access_token_sealed: None,
            refresh_token_sealed: None,
            enabled: true,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_sealed_tokens(mut self, access: String, refresh: Option<String>) -> Self {
        self.access_token_sealed = Some(access);
        self.refresh_token_sealed = refresh;
        self
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.updated_at = now_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_roundtrip() {
        for p in [
            Platform::Youtube,
            Platform::Instagram,
            Platform::Tiktok,
            Platform::Facebook,
            Platform::Twitter,
        ] {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
        assert_eq!(" YouTube ".parse::<Platform>().unwrap(), Platform::Youtube);
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_platform_serde_lowercase() {
        let json = serde_json::to_string(&Platform::Tiktok).unwrap();
        assert_eq!(json, "\"tiktok\"");
    }

    #[test]
    fn test_new_integration_is_enabled() {
        let integ = Integration::new("tenant-1", Platform::Youtube, "UC123");
        assert!(integ.enabled);
        assert!(integ.id.starts_with("int-"));
        assert!(integ.last_run_at.is_none());
        assert!(integ.access_token_sealed.is_none());
    }

    #[test]
    fn test_disable_is_soft() {
        let mut integ = Integration::new("tenant-1", Platform::Youtube, "UC123").with_id("int-a");
        integ.disable();
        assert!(!integ.enabled);
        assert_eq!(integ.id, "int-a");
    }

    #[test]
    fn test_default_plan_cap() {
        assert_eq!(Plan::default().max_responses_per_day, 20);
    }
}
