//! Configuration type definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Largest page a single listing call may request.
pub const MAX_KEYS_CEILING: usize = 1000;

/// Page-task concurrency when `thread` is unset or unusable.
pub const DEFAULT_THREADS: usize = 2;

/// Mirror root used when `downloadDir` is blank.
pub const DEFAULT_DOWNLOAD_DIR: &str = "./download";

/// Checkpoint location used when `checkpointFile` is unset.
pub const DEFAULT_CHECKPOINT_FILE: &str = "./lastMarker";

/// Region used to sign requests when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Section names, in merge order.
pub const COMMON_SECTION: &str = "common";
pub const SOURCE_SECTION: &str = "source";
pub const DEST_SECTION: &str = "dest";

/// Flat option map merged from the `common`, `source` and `dest` sections.
///
/// Later sections win on duplicate keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOptions(HashMap<String, String>);

impl RawOptions {
    /// Merge the three sections, failing if any is missing.
    pub fn from_sections(mut sections: HashMap<String, HashMap<String, String>>) -> Result<Self, String> {
        let mut merged = HashMap::new();
        for name in [COMMON_SECTION, SOURCE_SECTION, DEST_SECTION] {
            let section = sections
                .remove(name)
                .ok_or_else(|| format!("missing [{}] section", name))?;
            merged.extend(section);
        }
        Ok(Self(merged))
    }

    /// Value of an option, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value of an option that must be present and non-blank.
    pub fn require(&self, key: &str) -> Result<&str, String> {
        match self.get(key).map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value),
            Some(_) => Err(format!("option '{}' is blank", key)),
            None => Err(format!("option '{}' is required", key)),
        }
    }

    /// Whether an option is present (even if blank).
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Root configuration structure, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bucket objects are read from.
    pub source: StoreSettings,

    /// Bucket objects are written to.
    pub dest: StoreSettings,

    /// Replication behaviour.
    pub sync: SyncConfig,
}

/// Connection settings for one bucket.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Service endpoint (scheme optional).
    pub endpoint: String,

    /// Access key id.
    pub access_key: String,

    /// Secret access key.
    pub secret_key: String,

    /// Bucket name.
    pub bucket: String,

    /// Signing region (default: "us-east-1").
    pub region: String,

    /// Use path-style addressing instead of virtual-hosted buckets.
    pub path_style: bool,
}

impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSettings")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("path_style", &self.path_style)
            .finish()
    }
}

/// Replication behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Only keys under this prefix are enumerated (empty = whole bucket).
    pub prefix: String,

    /// Local mirror root; `None` disables mirroring.
    pub download_dir: Option<PathBuf>,

    /// Records requested per listing call, 1..=1000.
    pub page_size: usize,

    /// Page tasks allowed in flight at once, at least 1.
    pub threads: usize,

    /// Where the listing checkpoint lives.
    pub checkpoint_file: PathBuf,
}

impl SyncConfig {
    /// Whether objects are also written below `download_dir`.
    pub fn mirroring(&self) -> bool {
        self.download_dir.is_some()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            download_dir: None,
            page_size: MAX_KEYS_CEILING,
            threads: DEFAULT_THREADS,
            checkpoint_file: PathBuf::from(DEFAULT_CHECKPOINT_FILE),
        }
    }
}

/// Page size from a raw `maxKeys` value.
///
/// Absent, non-numeric or non-positive values fall back to the ceiling.
pub fn page_size_from(raw: Option<&str>) -> usize {
    match raw.and_then(|v| v.trim().parse::<i64>().ok()) {
        Some(n) if n > 0 => (n as u64).min(MAX_KEYS_CEILING as u64) as usize,
        _ => MAX_KEYS_CEILING,
    }
}

/// Pool concurrency from a raw `thread` value.
///
/// Absent, non-numeric or non-positive values fall back to the default.
pub fn threads_from(raw: Option<&str>) -> usize {
    match raw.and_then(|v| v.trim().parse::<i64>().ok()) {
        Some(n) if n > 0 => usize::try_from(n).unwrap_or(DEFAULT_THREADS),
        _ => DEFAULT_THREADS,
    }
}

/// Mirror root from a raw `downloadDir` value: trailing '/' stripped, blank means default.
pub fn download_dir_from(raw: &str) -> PathBuf {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        PathBuf::from(DEFAULT_DOWNLOAD_DIR)
    } else {
        PathBuf::from(trimmed)
    }
}

/// Interpret a boolean-ish option ("1", "true", "yes", "on").
pub fn flag_from(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}
