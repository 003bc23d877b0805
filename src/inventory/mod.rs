use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// File extensions picked up when the inventory is a directory.
const CONFIG_EXTENSIONS: [&str; 2] = ["cfg", "txt"];

static OSS10_HOSTNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)OSS10[:\s]+([^\s,;]+)").expect("Invalid OSS10 hostname regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfigSample {
    pub device_name: String,
    #[serde(default)]
    pub raw_config_text: String,
    #[serde(default)]
    pub comments: Option<String>,
}

impl DeviceConfigSample {
    pub fn new(device_name: impl Into<String>, raw_config_text: impl Into<String>) -> Self {
        DeviceConfigSample {
            device_name: device_name.into(),
            raw_config_text: raw_config_text.into(),
            comments: None,
        }
    }

    /// Hostname the device is filed under in the DHCP registry.
    ///
    /// An `OSS10: <name>` note in the comments overrides the device name.
    pub fn dhcp_hostname(&self) -> &str {
        self.comments
            .as_deref()
            .and_then(|comments| OSS10_HOSTNAME.captures(comments))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .unwrap_or(&self.device_name)
    }
}

/// Loads samples from a JSON array file or a directory of config files.
pub async fn load<T: AsRef<Path>>(path: T) -> Result<Vec<DeviceConfigSample>> {
    let path = path.as_ref();
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Couldn't read inventory {}", path.display()))?;

    let samples = if metadata.is_dir() {
        load_dir(path).await?
    } else {
        load_json(path).await?
    };

    log::info!("Loaded {} devices from {}", samples.len(), path.display());
    Ok(samples)
}

async fn load_json(path: &Path) -> Result<Vec<DeviceConfigSample>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Couldn't read inventory {}", path.display()))?;
    let samples = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON device inventory", path.display()))?;
    Ok(samples)
}

async fn load_dir(path: &Path) -> Result<Vec<DeviceConfigSample>> {
    let mut entries = tokio::fs::read_dir(path)
        .await
        .with_context(|| format!("Couldn't list inventory directory {}", path.display()))?;

    let mut samples = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file = entry.path();
        let is_config = file
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| CONFIG_EXTENSIONS.contains(&ext));
        if !is_config || !entry.file_type().await?.is_file() {
            continue;
        }

        let Some(device_name) = file.file_stem().and_then(|stem| stem.to_str()) else {
            log::warn!("Skipping config file with non UTF-8 name {}", file.display());
            continue;
        };

        let raw_config_text = tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("Couldn't read config {}", file.display()))?;
        samples.push(DeviceConfigSample::new(device_name, raw_config_text));
    }

    samples.sort_by(|a, b| a.device_name.cmp(&b.device_name));
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_dhcp_hostname_override() {
        let mut sample = DeviceConfigSample::new("ASD-LC0003-CCAP105", "");
        assert_eq!(sample.dhcp_hostname(), "ASD-LC0003-CCAP105");

        sample.comments = Some("migrated 2023; OSS10: asd-ccap105-old, rack 4".to_string());
        assert_eq!(sample.dhcp_hostname(), "asd-ccap105-old");

        sample.comments = Some("oss10 ASD-OLD;".to_string());
        assert_eq!(sample.dhcp_hostname(), "ASD-OLD");

        sample.comments = Some("no override here".to_string());
        assert_eq!(sample.dhcp_hostname(), "ASD-LC0003-CCAP105");
    }

    #[tokio::test]
    async fn test_load_json_inventory() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("inventory.json");
        std::fs::write(
            &path,
            r#"[
                {"device_name": "RTR-EDGE-01", "raw_config_text": "interface Bundle1\n"},
                {"device_name": "DBR07", "comments": "OSS10: DBR07-OLD"}
            ]"#,
        )
        .unwrap();

        let samples = load(&path).await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].device_name, "RTR-EDGE-01");
        assert_eq!(samples[0].raw_config_text, "interface Bundle1\n");
        assert_eq!(samples[1].raw_config_text, "");
        assert_eq!(samples[1].dhcp_hostname(), "DBR07-OLD");
    }

    #[tokio::test]
    async fn test_load_directory_inventory() {
        let temp_dir = tempdir().unwrap();
        std::fs::write(temp_dir.path().join("CBR12.cfg"), "interface ip-bundle 1\n").unwrap();
        std::fs::write(temp_dir.path().join("ASD-CCAP105.txt"), "").unwrap();
        std::fs::write(temp_dir.path().join("README.md"), "not a config").unwrap();
        std::fs::create_dir(temp_dir.path().join("nested.cfg")).unwrap();

        let samples = load(temp_dir.path()).await.unwrap();
        let names: Vec<&str> = samples.iter().map(|s| s.device_name.as_str()).collect();
        assert_eq!(names, vec!["ASD-CCAP105", "CBR12"]);
        assert_eq!(samples[1].raw_config_text, "interface ip-bundle 1\n");
    }

    #[tokio::test]
    async fn test_load_rejects_bad_inventory() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("inventory.json");
        std::fs::write(&path, r#"{"device_name": "not-an-array"}"#).unwrap();

        assert!(load(&path).await.is_err());
        assert!(load(temp_dir.path().join("missing.json")).await.is_err());
    }
}
