//! CLI Configuration

use crate::output::OutputFormat;
use anyhow::{anyhow, bail, Context};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use ticket_live::LiveConfig;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub default_format: Option<String>,
    pub page_size: Option<u32>,
    pub list_poll_secs: Option<u64>,
    pub detail_poll_secs: Option<u64>,
    pub reconnect_delay_ms: Option<u64>,
}

/// Keys accepted by `config get|set`
pub const KEYS: &[&str] = &[
    "api_url",
    "api_token",
    "default_format",
    "page_size",
    "list_poll_secs",
    "detail_poll_secs",
    "reconnect_delay_ms",
];

impl Config {
    pub fn load(profile: Option<&str>) -> anyhow::Result<Self> {
        let path = Self::config_path(profile)?;
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, profile: Option<&str>) -> anyhow::Result<PathBuf> {
        let path = Self::config_path(profile)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(path)
    }

    pub fn config_path(profile: Option<&str>) -> anyhow::Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot find home directory"))?;
        let filename = match profile {
            Some(p) => format!("config.{}.toml", p),
            None => "config.toml".to_string(),
        };
        Ok(home.join(".ticket-live").join(filename))
    }

    pub fn format(&self) -> Option<OutputFormat> {
        self.default_format
            .as_deref()
            .and_then(|f| OutputFormat::from_str(f, true).ok())
    }

    /// Library config: defaults, then this file, then flags/env
    pub fn to_live_config(&self, api_url: Option<String>, api_token: Option<String>) -> LiveConfig {
        let mut live = LiveConfig::default();
        if let Some(url) = api_url.or_else(|| self.api_url.clone()) {
            live.api_url = url;
        }
        live.api_token = api_token.or_else(|| self.api_token.clone());
        if let Some(size) = self.page_size {
            live.page_size = size;
        }
        if let Some(secs) = self.list_poll_secs {
            live.list_poll_secs = secs;
        }
        if let Some(secs) = self.detail_poll_secs {
            live.detail_poll_secs = secs;
        }
        if let Some(ms) = self.reconnect_delay_ms {
            live.reconnect_delay_ms = ms;
        }
        live
    }

    pub fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value = match key {
            "api_url" => self.api_url.clone(),
            "api_token" => self.api_token.as_deref().map(mask),
            "default_format" => self.default_format.clone(),
            "page_size" => self.page_size.map(|v| v.to_string()),
            "list_poll_secs" => self.list_poll_secs.map(|v| v.to_string()),
            "detail_poll_secs" => self.detail_poll_secs.map(|v| v.to_string()),
            "reconnect_delay_ms" => self.reconnect_delay_ms.map(|v| v.to_string()),
            _ => bail!("Unknown config key: {}", key),
        };
        Ok(value)
    }

    pub fn set(&mut self, key: &str, value: String) -> anyhow::Result<()> {
        match key {
            "api_url" => self.api_url = Some(value),
            "api_token" => self.api_token = Some(value),
            "default_format" => {
                OutputFormat::from_str(&value, true).map_err(|e| anyhow!(e))?;
                self.default_format = Some(value);
            }
            "page_size" => self.page_size = Some(parse_positive(key, &value)?),
            "list_poll_secs" => self.list_poll_secs = Some(parse_positive(key, &value)?),
            "detail_poll_secs" => self.detail_poll_secs = Some(parse_positive(key, &value)?),
            "reconnect_delay_ms" => self.reconnect_delay_ms = Some(parse_positive(key, &value)?),
            _ => bail!("Unknown config key: {}", key),
        }
        Ok(())
    }
}

fn parse_positive<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr + PartialEq + Default,
{
    match value.parse::<T>() {
        Ok(v) if v != T::default() => Ok(v),
        _ => bail!("{} must be a positive number", key),
    }
}

/// Tokens of 8 chars or less are hidden entirely; longer ones show a quarter, up to 8
fn mask(token: &str) -> String {
    let len = token.chars().count();
    let visible = if len <= 8 { 0 } else { (len / 4).min(8) };
    let shown: String = token.chars().take(visible).collect();
    format!("{}****", shown)
}
