// Copyright 2025 aftsim Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_gnmi_port")]
    pub gnmi_port: u16,
    #[serde(default)]
    pub mock_installer: MockInstallerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MockInstallerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_route_count")]
    pub route_count: usize,
    /// Updates per second during the churn phase.
    #[serde(default = "default_churn_rate")]
    pub churn_rate: u32,
}

fn default_gnmi_port() -> u16 {
    50099
}

fn default_enabled() -> bool {
    true
}

fn default_route_count() -> usize {
    1000
}

fn default_churn_rate() -> u32 {
    100
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gnmi_port: default_gnmi_port(),
            mock_installer: MockInstallerConfig::default(),
        }
    }
}

impl Default for MockInstallerConfig {
    fn default() -> Self {
        MockInstallerConfig {
            enabled: default_enabled(),
            route_count: default_route_count(),
            churn_rate: default_churn_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_json(name: &str, content: &str) -> String {
        let temp_file = std::env::temp_dir().join(name);
        let mut file = std::fs::File::create(&temp_file).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        temp_file.to_str().unwrap().to_string()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.gnmi_port, 50099);
        assert!(config.mock_installer.enabled);
        assert_eq!(config.mock_installer.route_count, 1000);
        assert_eq!(config.mock_installer.churn_rate, 100);
    }

    #[test]
    fn test_config_from_file() {
        let temp_file = write_temp_json(
            "test_config.json",
            r#"{"gnmi_port": 51000, "mock_installer": {"enabled": false, "route_count": 50, "churn_rate": 5}}"#,
        );

        let config = Config::from_file(&temp_file).unwrap();
        assert_eq!(config.gnmi_port, 51000);
        assert!(!config.mock_installer.enabled);
        assert_eq!(config.mock_installer.route_count, 50);
        assert_eq!(config.mock_installer.churn_rate, 5);

        std::fs::remove_file(temp_file).unwrap();
    }

    #[test]
    fn test_config_from_file_partial_uses_field_defaults() {
        let temp_file = write_temp_json("test_config_partial.json", r#"{"gnmi_port": 51001}"#);

        let config = Config::from_file(&temp_file).unwrap();
        assert_eq!(config.gnmi_port, 51001);
        assert!(config.mock_installer.enabled);
        assert_eq!(config.mock_installer.route_count, 1000);

        std::fs::remove_file(temp_file).unwrap();
    }

    #[test]
    fn test_config_from_file_not_found() {
        let result = Config::from_file("/nonexistent/path.json");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_file_invalid_json() {
        let temp_file = write_temp_json("test_config_invalid.json", r#"{"gnmi_port": "high"}"#);

        let result = Config::from_file(&temp_file);
        assert!(result.is_err());

        std::fs::remove_file(temp_file).unwrap();
    }
}
