//! Overlay settings, the `[video]` section

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OverlayConfig {
    /// Bilinear sampling when the image is scaled
    #[serde(default = "default_true")]
    pub bilinear: bool,
    /// Split blits whose source crosses the hardware coordinate limit
    #[serde(default = "default_true")]
    pub split_blit: bool,
    /// Number of overlay ports
    #[serde(default = "default_ports")]
    pub ports: usize,
}

fn default_true() -> bool {
    true
}

fn default_ports() -> usize {
    4
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            bilinear: true,
            split_blit: true,
            ports: default_ports(),
        }
    }
}

impl OverlayConfig {
    pub fn with_bilinear(mut self, enabled: bool) -> Self {
        self.bilinear = enabled;
        self
    }

    pub fn with_split_blit(mut self, enabled: bool) -> Self {
        self.split_blit = enabled;
        self
    }

    pub fn with_ports(mut self, ports: usize) -> Self {
        self.ports = ports;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml() {
        let config: OverlayConfig = toml::from_str("bilinear = false").unwrap();
        assert!(!config.bilinear);
        assert!(config.split_blit);
        assert_eq!(config.ports, 4);
    }
}
