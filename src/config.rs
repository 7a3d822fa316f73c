use serde::Deserialize;
use std::path::Path;

/// Capture-boundary settings: which interface to tap and the link MTU used
/// to derive the UDP fan-out stride.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub interface: String,
    pub mtu: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            interface: String::new(),
            mtu: 1500,
        }
    }
}

impl CaptureConfig {
    fn from_toml(s: &str) -> Result<Self, Box<dyn std::error::Error>> {
        #[derive(Deserialize, Default)]
        struct Wrapper {
            #[serde(default)]
            capture: CaptureConfig,
        }
        Ok(toml::from_str::<Wrapper>(s)?.capture)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.mtu < 64 {
            return Err(format!("capture.mtu {} is implausibly small", self.mtu));
        }
        Ok(())
    }
}

/// TCP application-framing settings (§6): the 16-byte header's expected
/// magic and version.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    pub tcp_magic: u32,
    pub tcp_version: u32,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkConfig {
            tcp_magic: 0x4654_5850, // "FTXP"
            tcp_version: 1,
        }
    }
}

impl ChunkConfig {
    fn from_toml(s: &str) -> Result<Self, Box<dyn std::error::Error>> {
        #[derive(Deserialize, Default)]
        struct Wrapper {
            #[serde(default)]
            chunk: ChunkConfig,
        }
        Ok(toml::from_str::<Wrapper>(s)?.chunk)
    }

    pub fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Decoder cache bounds (§4.H).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub lru_capacity: usize,
    pub max_redundancy: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            lru_capacity: 1000,
            max_redundancy: 7,
        }
    }
}

impl CacheConfig {
    fn from_toml(s: &str) -> Result<Self, Box<dyn std::error::Error>> {
        #[derive(Deserialize, Default)]
        struct Wrapper {
            #[serde(default)]
            cache: CacheConfig,
        }
        Ok(toml::from_str::<Wrapper>(s)?.cache)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.lru_capacity == 0 {
            return Err("cache.lru_capacity must be nonzero".into());
        }
        if self.max_redundancy == 0 {
            return Err("cache.max_redundancy must be nonzero".into());
        }
        Ok(())
    }
}

/// Bounded-channel capacity shared by the TCP-ingest, egress, and per-task
/// work channels (§5).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig { capacity: 10_000 }
    }
}

impl ChannelConfig {
    fn from_toml(s: &str) -> Result<Self, Box<dyn std::error::Error>> {
        #[derive(Deserialize, Default)]
        struct Wrapper {
            #[serde(default)]
            channel: ChannelConfig,
        }
        Ok(toml::from_str::<Wrapper>(s)?.channel)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("channel.capacity must be nonzero".into());
        }
        Ok(())
    }
}

/// Unified configuration, parsed tolerantly from an optional TOML file and
/// then overridden by CLI flags and the environment variables named in §6.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub chunk: ChunkConfig,
    pub cache: CacheConfig,
    pub channel: ChannelConfig,
}

impl AppConfig {
    pub fn from_toml(s: &str) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            capture: CaptureConfig::from_toml(s).unwrap_or_default(),
            chunk: ChunkConfig::from_toml(s).unwrap_or_default(),
            cache: CacheConfig::from_toml(s).unwrap_or_default(),
            channel: ChannelConfig::from_toml(s).unwrap_or_default(),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.capture.validate()?;
        self.chunk.validate()?;
        self.cache.validate()?;
        self.channel.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            capture: CaptureConfig::default(),
            chunk: ChunkConfig::default(),
            cache: CacheConfig::default(),
            channel: ChannelConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn parses_partial_toml_and_fills_defaults() {
        let cfg = AppConfig::from_toml("[capture]\ninterface = \"eth0\"\nmtu = 9000\n").unwrap();
        assert_eq!(cfg.capture.interface, "eth0");
        assert_eq!(cfg.capture.mtu, 9000);
        assert_eq!(cfg.cache.lru_capacity, 1000);
    }

    #[test]
    fn rejects_tiny_mtu() {
        let cfg = AppConfig::from_toml("[capture]\nmtu = 1\n").unwrap();
        assert!(cfg.validate().is_err());
    }
}
