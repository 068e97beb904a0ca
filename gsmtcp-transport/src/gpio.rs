//! GPIO output pin used as the modem's power key

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

/// Logic level of an output pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    fn as_sysfs(&self) -> &'static str {
        match self {
            Level::Low => "0",
            Level::High => "1",
        }
    }
}

/// Output pin wired to the modem's power key
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait PowerPin: Send {
    /// Drive the pin to the given level
    async fn set_level(&mut self, level: Level) -> io::Result<()>;
}

/// Default root of the Linux sysfs GPIO interface
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Output pin driven through the Linux sysfs GPIO interface
#[derive(Debug, Clone)]
pub struct SysfsPin {
    number: u32,
    value_path: PathBuf,
}

impl SysfsPin {
    /// Export GPIO `number` and configure it as an output
    pub async fn export(number: u32) -> io::Result<Self> {
        Self::export_at(SYSFS_GPIO_ROOT, number).await
    }

    /// Export a pin below an explicit sysfs root
    pub async fn export_at(root: impl AsRef<Path>, number: u32) -> io::Result<Self> {
        let root = root.as_ref();
        let pin_dir = root.join(format!("gpio{}", number));
        if !tokio::fs::try_exists(&pin_dir).await? {
            tokio::fs::write(root.join("export"), number.to_string()).await?;
        }
        tokio::fs::write(pin_dir.join("direction"), "out").await?;
        Ok(Self {
            number,
            value_path: pin_dir.join("value"),
        })
    }

    /// GPIO number of this pin
    pub fn number(&self) -> u32 {
        self.number
    }
}

#[async_trait]
impl PowerPin for SysfsPin {
    async fn set_level(&mut self, level: Level) -> io::Result<()> {
        tokio::fs::write(&self.value_path, level.as_sysfs()).await
    }
}
