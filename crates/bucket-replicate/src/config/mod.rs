//! Configuration loading and validation.
//!
//! A config file has three sections (`common`, `source`, `dest`) whose options
//! are merged into one flat key space and then turned into a typed [`Config`].
//! INI is the default format; files ending in `.yaml`/`.yml` are read as YAML
//! mappings with the same section names.

mod types;
mod validation;

pub use types::*;

use crate::error::{ReplicateError, Result};
use ini::{Ini, ParseOption};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

impl Config {
    /// Load configuration from an INI or YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReplicateError::Config(format!("failed to load {}: {}", path.display(), e))
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        if is_yaml {
            Self::from_yaml(&content)
        } else {
            Self::from_ini(&content)
        }
    }

    /// Parse configuration from an INI string.
    ///
    /// Backslashes are kept literally so Windows paths survive.
    pub fn from_ini(content: &str) -> Result<Self> {
        let options = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(content, options)
            .map_err(|e| ReplicateError::Config(format!("invalid INI: {}", e)))?;

        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        for (name, properties) in ini.iter() {
            let Some(name) = name else { continue };
            sections.entry(name.to_string()).or_default().extend(
                properties
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string())),
            );
        }

        Self::from_sections(sections)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let raw: HashMap<String, HashMap<String, serde_yaml::Value>> =
            serde_yaml::from_str(content)?;

        let mut sections = HashMap::new();
        for (name, options) in raw {
            let mut section = HashMap::new();
            for (key, value) in options {
                let value = yaml_scalar(&value).ok_or_else(|| {
                    ReplicateError::Config(format!("option '{}' must be a scalar", key))
                })?;
                section.insert(key, value);
            }
            sections.insert(name, section);
        }

        Self::from_sections(sections)
    }

    fn from_sections(sections: HashMap<String, HashMap<String, String>>) -> Result<Self> {
        let options = RawOptions::from_sections(sections).map_err(ReplicateError::Config)?;
        Self::from_options(&options)
    }

    /// Build a validated configuration from merged options.
    pub fn from_options(options: &RawOptions) -> Result<Self> {
        let config = Config {
            source: StoreSettings::from_options(options, "src")?,
            dest: StoreSettings::from_options(options, "dest")?,
            sync: SyncConfig::from_options(options)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl StoreSettings {
    /// Read `<side>Endpoint`, `<side>AccessKey`, ... for one side.
    fn from_options(options: &RawOptions, side: &str) -> Result<Self> {
        let required = |name: &str| -> Result<String> {
            options
                .require(&format!("{}{}", side, name))
                .map(str::to_string)
                .map_err(ReplicateError::Config)
        };

        Ok(Self {
            endpoint: required("Endpoint")?,
            access_key: required("AccessKey")?,
            secret_key: required("SecretKey")?,
            bucket: required("Bucket")?,
            region: options
                .get(&format!("{}Region", side))
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or(DEFAULT_REGION)
                .to_string(),
            path_style: flag_from(options.get(&format!("{}PathStyle", side))),
        })
    }
}

impl SyncConfig {
    fn from_options(options: &RawOptions) -> Result<Self> {
        // Either the current `downLoadFile` switch or the older `syncMode` must be present.
        if !options.contains("downLoadFile") && !options.contains("syncMode") {
            return Err(ReplicateError::Config(
                "option 'downLoadFile' is required".into(),
            ));
        }
        let mirroring = options.get("downLoadFile").map(str::trim) == Some("1")
            || options.get("syncMode").map(str::trim) == Some("2");

        let download_dir = if mirroring {
            let raw = options.get("downloadDir").ok_or_else(|| {
                ReplicateError::Config(
                    "option 'downloadDir' is required when local mirroring is enabled".into(),
                )
            })?;
            Some(download_dir_from(raw))
        } else {
            None
        };

        let checkpoint_file = options
            .get("checkpointFile")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_FILE));

        Ok(Self {
            prefix: options.get("srcPrefix").unwrap_or_default().to_string(),
            download_dir,
            page_size: page_size_from(options.get("maxKeys")),
            threads: threads_from(options.get("thread")),
            checkpoint_file,
        })
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_INI: &str = "\
[common]
downLoadFile = 0
maxKeys = 500
thread = 4

[source]
srcEndpoint = oss-cn-hangzhou.aliyuncs.com
srcAccessKey = LTAIsource
srcSecretKey = source-secret
srcBucket = photos-origin
srcPrefix = 2024/

[dest]
destEndpoint = oss-cn-shanghai.aliyuncs.com
destAccessKey = LTAIdest
destSecretKey = dest-secret
destBucket = photos-backup
";

    fn with_common(extra: &str) -> String {
        BASE_INI.replace("[common]\n", &format!("[common]\n{}\n", extra))
    }

    #[test]
    fn test_from_ini_reads_all_sections() {
        let config = Config::from_ini(BASE_INI).unwrap();
        assert_eq!(config.source.bucket, "photos-origin");
        assert_eq!(config.dest.endpoint, "oss-cn-shanghai.aliyuncs.com");
        assert_eq!(config.source.region, DEFAULT_REGION);
        assert_eq!(config.sync.prefix, "2024/");
        assert_eq!(config.sync.page_size, 500);
        assert_eq!(config.sync.threads, 4);
        assert!(!config.sync.mirroring());
        assert_eq!(
            config.sync.checkpoint_file,
            PathBuf::from(DEFAULT_CHECKPOINT_FILE)
        );
    }

    #[test]
    fn test_missing_section_is_config_error() {
        let ini = BASE_INI.replace("[dest]", "[destination]");
        let err = Config::from_ini(&ini).unwrap_err();
        assert!(matches!(err, ReplicateError::Config(ref m) if m.contains("[dest]")));
    }

    #[test]
    fn test_missing_download_switch_refuses_to_start() {
        let ini = BASE_INI.replace("downLoadFile = 0\n", "");
        let err = Config::from_ini(&ini).unwrap_err();
        assert!(matches!(err, ReplicateError::Config(ref m) if m.contains("downLoadFile")));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_missing_required_connection_option() {
        let ini = BASE_INI.replace("srcSecretKey = source-secret\n", "");
        let err = Config::from_ini(&ini).unwrap_err();
        assert!(matches!(err, ReplicateError::Config(ref m) if m.contains("srcSecretKey")));
    }

    #[test]
    fn test_mirroring_requires_download_dir() {
        let ini = BASE_INI.replace("downLoadFile = 0", "downLoadFile = 1");
        assert!(Config::from_ini(&ini).is_err());

        let ini = BASE_INI.replace("downLoadFile = 0", "downLoadFile = 1\ndownloadDir = /data/mirror///");
        let config = Config::from_ini(&ini).unwrap();
        assert_eq!(config.sync.download_dir, Some(PathBuf::from("/data/mirror")));
    }

    #[test]
    fn test_backslashes_in_values_are_literal() {
        let ini = BASE_INI.replace(
            "downLoadFile = 0",
            "downLoadFile = 1\ndownloadDir = C:\\data\\mirror",
        );
        let config = Config::from_ini(&ini).unwrap();
        assert_eq!(
            config.sync.download_dir,
            Some(PathBuf::from("C:\\data\\mirror"))
        );
    }

    #[test]
    fn test_blank_download_dir_uses_default() {
        let ini = BASE_INI.replace("downLoadFile = 0", "downLoadFile = 1\ndownloadDir =");
        let config = Config::from_ini(&ini).unwrap();
        assert_eq!(
            config.sync.download_dir,
            Some(PathBuf::from(DEFAULT_DOWNLOAD_DIR))
        );
    }

    #[test]
    fn test_legacy_sync_mode_enables_mirroring() {
        let ini = BASE_INI.replace("downLoadFile = 0", "syncMode = 2\ndownloadDir = ./mirror/");
        let config = Config::from_ini(&ini).unwrap();
        assert_eq!(config.sync.download_dir, Some(PathBuf::from("./mirror")));

        let ini = BASE_INI.replace("downLoadFile = 0", "syncMode = 1");
        assert!(!Config::from_ini(&ini).unwrap().sync.mirroring());
    }

    #[test]
    fn test_thread_falls_back_to_default() {
        for value in ["0", "-3", "many"] {
            let ini = with_common(&format!("thread = {}", value)).replace("thread = 4\n", "");
            let config = Config::from_ini(&ini).unwrap();
            assert_eq!(config.sync.threads, DEFAULT_THREADS, "thread = {}", value);
        }
    }

    #[test]
    fn test_max_keys_is_capped() {
        assert_eq!(page_size_from(Some("5000")), MAX_KEYS_CEILING);
        assert_eq!(page_size_from(Some("10")), 10);
        assert_eq!(page_size_from(Some("0")), MAX_KEYS_CEILING);
        assert_eq!(page_size_from(Some("ten")), MAX_KEYS_CEILING);
        assert_eq!(page_size_from(None), MAX_KEYS_CEILING);
    }

    #[test]
    fn test_later_sections_override_common() {
        let ini = with_common("srcBucket = overridden-in-common");
        let config = Config::from_ini(&ini).unwrap();
        assert_eq!(config.source.bucket, "photos-origin");
    }

    #[test]
    fn test_from_yaml_accepts_numbers() {
        let yaml = r#"
common:
  downLoadFile: 1
  downloadDir: ./download/
  thread: 8
source:
  srcEndpoint: http://127.0.0.1:9000
  srcAccessKey: minio
  srcSecretKey: minio123
  srcBucket: origin
  srcPathStyle: true
dest:
  destEndpoint: http://127.0.0.1:9001
  destAccessKey: minio
  destSecretKey: minio123
  destBucket: replica
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.sync.threads, 8);
        assert!(config.source.path_style);
        assert!(!config.dest.path_style);
        assert_eq!(config.sync.download_dir, Some(PathBuf::from("./download")));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = Config::load("/definitely/not/here/config.ini").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_load_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replicate.ini");
        std::fs::write(&path, BASE_INI).unwrap();
        assert!(Config::load(&path).is_ok());

        let yaml_path = dir.path().join("replicate.yaml");
        std::fs::write(&yaml_path, BASE_INI).unwrap();
        assert!(Config::load(&yaml_path).is_err());
    }
}
