//! Configuration management for ipinformer.
//!
//! Two on-disk formats are accepted:
//!
//! - YAML (default), mirroring [`Config`] field by field.
//! - The legacy JSON map used by earlier releases, selected by a `.json`
//!   extension: `{ "<short>": ["URL" | "FILE", "<target>", "<name>"], ... }`.
//!
//! Declaration order is preserved in both formats because it fixes the
//! report column order.

use anyhow::{Context, Result};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::InformerError;

/// Config file looked up when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "ipinformer.yaml";

/// Environment variable consulted for the VirusTotal API key
pub const VT_API_KEY_ENV: &str = "IPINFORMER_VT_API_KEY";

/// Delay enforced between two reputation requests when none is configured
pub const DEFAULT_VT_DELAY_SECS: u64 = 15;

/// Country database looked up when none is configured. Matched
/// case-insensitively, so MaxMind's `GeoLite2-Country.mmdb` is found too
pub const DEFAULT_GEOIP_DATABASE: &str = "GeoLite2-country.mmdb";

const DEFAULT_VT_ENDPOINT: &str = "https://www.virustotal.com/vtapi/v2/ip-address/report";

/// Secure string type that zeroizes memory on drop
/// Used for the reputation API key
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Threat lists, in report column order
    pub sources: Vec<ListSourceConfig>,

    /// List download settings
    pub fetch: FetchConfig,

    /// Country resolution
    pub geoip: GeoIpConfig,

    /// VirusTotal reputation lookups
    pub reputation: ReputationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            fetch: FetchConfig::default(),
            geoip: GeoIpConfig::default(),
            reputation: ReputationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, or a legacy JSON map when the
    /// file name ends in `.json`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_legacy_json(&content)
        } else {
            Self::from_yaml(&content)
        }
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the given file, falling back to the built-in list set when no
    /// path was given and the default file does not exist.
    ///
    /// An explicitly requested file that cannot be loaded is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    info!(
                        "No config file at {}, using the built-in list sources",
                        DEFAULT_CONFIG_PATH
                    );
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parse the legacy JSON map format. Only the list sources can be
    /// expressed in it; every other setting keeps its default.
    pub fn from_legacy_json(content: &str) -> Result<Self> {
        let LegacySources(sources) = serde_json::from_str(content)?;
        Ok(Self {
            sources,
            ..Default::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            warn!("No list sources configured, every candidate will be reported clean");
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.short_name.as_str()) {
                return Err(InformerError::DuplicateShortName(source.short_name.clone()).into());
            }
        }

        if self.fetch.concurrency == 0 {
            return Err(
                InformerError::Config("fetch.concurrency must be at least 1".to_string()).into(),
            );
        }

        if self.fetch.timeout_secs == 0 {
            return Err(
                InformerError::Config("fetch.timeout_secs must be at least 1".to_string()).into(),
            );
        }

        if self.reputation.enabled && !self.reputation.endpoint.starts_with("https://") {
            return Err(InformerError::Config(format!(
                "Reputation endpoint must use HTTPS: {}",
                self.reputation.endpoint
            ))
            .into());
        }

        Ok(())
    }
}

/// How a list is retrieved
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ListMethod {
    /// HTTP(S) download
    #[serde(alias = "URL")]
    Url,
    /// Local file
    #[serde(alias = "FILE")]
    File,
}

impl FromStr for ListMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "url" => Ok(ListMethod::Url),
            "file" => Ok(ListMethod::File),
            _ => Err(format!("Unknown list method '{}'. Use URL or FILE", s)),
        }
    }
}

impl fmt::Display for ListMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListMethod::Url => f.write_str("URL"),
            ListMethod::File => f.write_str("FILE"),
        }
    }
}

/// One configured threat list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListSourceConfig {
    /// Report column key, unique within a run
    pub short_name: String,
    pub method: ListMethod,
    /// URL or filesystem path, depending on `method`
    pub target: String,
    /// Display name used in logs
    pub name: String,
}

impl ListSourceConfig {
    pub fn new(short_name: &str, method: ListMethod, target: &str, name: &str) -> Self {
        Self {
            short_name: short_name.to_string(),
            method,
            target: target.to_string(),
            name: name.to_string(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.short_name.trim().is_empty() {
            return Err(InformerError::Config(format!(
                "List '{}' has an empty short name",
                self.name
            ))
            .into());
        }

        // Short names become CSV header cells
        if self
            .short_name
            .chars()
            .any(|c| matches!(c, ',' | '"' | '\r' | '\n'))
        {
            return Err(InformerError::Config(format!(
                "List short name '{}' contains invalid characters",
                self.short_name
            ))
            .into());
        }

        if self.target.trim().is_empty() {
            return Err(InformerError::Config(format!(
                "List '{}' has an empty target",
                self.short_name
            ))
            .into());
        }

        if self.method == ListMethod::Url
            && !(self.target.starts_with("http://") || self.target.starts_with("https://"))
        {
            return Err(InformerError::Config(format!(
                "List '{}' URL must use http:// or https://: {}",
                self.short_name, self.target
            ))
            .into());
        }

        Ok(())
    }
}

/// Legacy `{ short: [method, target, name] }` map, read in document order.
///
/// Duplicate keys are kept so that validation can reject them instead of
/// one entry silently replacing the other.
struct LegacySources(Vec<ListSourceConfig>);

impl<'de> Deserialize<'de> for LegacySources {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct LegacyVisitor;

        impl<'de> Visitor<'de> for LegacyVisitor {
            type Value = LegacySources;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of short name to [method, target, name]")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut sources = Vec::new();
                while let Some((short_name, entry)) = map.next_entry::<String, Vec<String>>()? {
                    let len = entry.len();
                    let mut fields = entry.into_iter();
                    let (Some(method), Some(target), Some(name)) =
                        (fields.next(), fields.next(), fields.next())
                    else {
                        return Err(de::Error::invalid_length(len, &"[method, target, name]"));
                    };
                    sources.push(ListSourceConfig {
                        short_name,
                        method: method.parse().map_err(de::Error::custom)?,
                        target,
                        name,
                    });
                }
                Ok(LegacySources(sources))
            }
        }

        deserializer.deserialize_map(LegacyVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request deadline
    pub timeout_secs: u64,
    /// Lists downloaded at the same time
    pub concurrency: usize,
    /// Attempts per URL before the list is declared failed
    pub max_retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            concurrency: 6,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoIpConfig {
    pub enabled: bool,
    /// MaxMind GeoLite2 Country database
    pub database: PathBuf,
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: PathBuf::from(DEFAULT_GEOIP_DATABASE),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    pub enabled: bool,
    /// API key can be set directly or via IPINFORMER_VT_API_KEY
    /// Memory is securely zeroed when dropped
    pub api_key: SecureString,
    /// Environment variable name to read the key from (optional)
    pub api_key_env: Option<String>,
    /// Pause after every request, required by the public API quota
    pub delay_secs: u64,
    pub endpoint: String,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: SecureString::default(),
            api_key_env: None,
            delay_secs: DEFAULT_VT_DELAY_SECS,
            endpoint: DEFAULT_VT_ENDPOINT.to_string(),
        }
    }
}

impl ReputationConfig {
    /// Get the effective API key, checking env vars first
    pub fn get_api_key(&self) -> SecureString {
        if let Some(ref env_name) = self.api_key_env {
            if let Ok(val) = env::var(env_name) {
                return SecureString::new(val);
            }
        }
        if let Ok(val) = env::var(VT_API_KEY_ENV) {
            return SecureString::new(val);
        }
        self.api_key.clone()
    }

    /// Read a legacy `{"apikey": "...", "delay": "15"}` file.
    ///
    /// A missing or unparsable delay falls back to the default pacing.
    pub fn load_legacy<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read reputation config: {:?}", path))?;
        Self::from_legacy_json(&content)
            .with_context(|| format!("Failed to parse reputation config: {:?}", path))
    }

    pub fn from_legacy_json(content: &str) -> Result<Self> {
        let mut fields: HashMap<String, String> = serde_json::from_str(content)?;

        let api_key = fields.remove("apikey").unwrap_or_default();
        let delay_secs = match fields.get("delay").map(|d| d.trim().parse::<u64>()) {
            Some(Ok(delay)) => delay,
            Some(Err(e)) => {
                warn!(
                    "Cannot read reputation delay ({}), enforcing {} seconds",
                    e, DEFAULT_VT_DELAY_SECS
                );
                DEFAULT_VT_DELAY_SECS
            }
            None => DEFAULT_VT_DELAY_SECS,
        };

        Ok(Self {
            enabled: true,
            api_key: SecureString::new(api_key),
            delay_secs,
            ..Default::default()
        })
    }
}

fn default_sources() -> Vec<ListSourceConfig> {
    vec![
        ListSourceConfig::new(
            "zeustracker",
            ListMethod::Url,
            "https://zeustracker.abuse.ch/blocklist.php?download=badips",
            "Abuse.ch Zeus Tracker",
        ),
        ListSourceConfig::new(
            "spyeyetracker",
            ListMethod::Url,
            "https://spyeyetracker.abuse.ch/blocklist.php?download=ipblocklist",
            "Abuse.ch SpyEye Tracker",
        ),
        ListSourceConfig::new(
            "palevotracker",
            ListMethod::Url,
            "https://palevotracker.abuse.ch/blocklists.php?download=ipblocklist",
            "Abuse.ch Palevo Tracker",
        ),
        ListSourceConfig::new(
            "feodotracker",
            ListMethod::Url,
            "https://feodotracker.abuse.ch/downloads/ipblocklist.txt",
            "Abuse.ch Feodo Tracker",
        ),
        ListSourceConfig::new(
            "mdl",
            ListMethod::Url,
            "http://www.malwaredomainlist.com/hostslist/ip.txt",
            "Malware Domain List",
        ),
    ]
}
