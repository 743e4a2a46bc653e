//! TOML description of the mount points to converge.
//!
//! ```toml
//! settle_secs = 3
//!
//! [[mount]]
//! device = "LABEL=DATA"
//! mount_point = "/data"
//! fstype = "ext4"
//! options = ["noatime"]
//! pass = 2
//! actions = ["mount", "enable"]
//! ```

use crate::engine::DEFAULT_SETTLE;
use anyhow::{bail, Context, Result};
use mountie_hal::{Action, DesiredSpec};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MountsConfig {
    #[serde(default)]
    pub settle_secs: Option<u64>,
    /// Alternate boot table, mostly for testing against a scratch file.
    #[serde(default)]
    pub fstab: Option<PathBuf>,
    /// Zero or absent means mount/umount may block indefinitely.
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
    #[serde(default, rename = "mount")]
    pub mounts: Vec<MountConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    pub device: String,
    pub mount_point: PathBuf,
    #[serde(default)]
    pub fstype: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub dump: u32,
    #[serde(default)]
    pub pass: u32,
    #[serde(default = "default_supports_remount")]
    pub supports_remount: bool,
    #[serde(default = "default_actions")]
    pub actions: Vec<String>,
}

fn default_supports_remount() -> bool {
    true
}

fn default_actions() -> Vec<String> {
    vec![Action::Mount.to_string()]
}

/// A validated spec plus the actions to run against it, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountResource {
    pub spec: DesiredSpec,
    pub actions: Vec<Action>,
}

impl MountConfig {
    pub fn to_resource(&self) -> Result<MountResource> {
        let actions = self
            .actions
            .iter()
            .map(|a| a.parse::<Action>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("invalid actions for {}", self.mount_point.display()))?;
        if actions.is_empty() {
            bail!("mount {} lists no actions", self.mount_point.display());
        }

        let mut spec = DesiredSpec::new(self.device.clone(), self.mount_point.clone())
            .with_context(|| format!("invalid mount for device {}", self.device))?
            .with_options(&self.options)
            .with_dump_pass(self.dump, self.pass)
            .with_supports_remount(self.supports_remount)
            .with_persist_at_boot(actions.contains(&Action::Enable));
        if let Some(fstype) = &self.fstype {
            spec = spec.with_fstype(fstype.clone());
        }
        spec.validate()
            .with_context(|| format!("invalid mount {}", self.mount_point.display()))?;

        Ok(MountResource { spec, actions })
    }
}

impl MountsConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read mount config: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse mount config: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn settle(&self) -> Duration {
        self.settle_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SETTLE)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn resources(&self) -> Result<Vec<MountResource>> {
        self.mounts.iter().map(MountConfig::to_resource).collect()
    }
}
