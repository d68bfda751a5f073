//! Configuration validation.

use super::Config;
use crate::error::{ReplicateError, Result};

/// Validate cross-field constraints of a configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.sync.page_size == 0 {
        return Err(ReplicateError::Config("maxKeys must be at least 1".into()));
    }
    if config.sync.threads == 0 {
        return Err(ReplicateError::Config("thread must be at least 1".into()));
    }

    // Cannot replicate a bucket onto itself
    if normalized(&config.source.endpoint) == normalized(&config.dest.endpoint)
        && config.source.bucket == config.dest.bucket
    {
        return Err(ReplicateError::Config(
            "source and destination cannot be the same bucket".into(),
        ));
    }

    if let Some(ref dir) = config.sync.download_dir {
        if dir == &config.sync.checkpoint_file {
            return Err(ReplicateError::Config(
                "downloadDir and checkpointFile must differ".into(),
            ));
        }
    }

    Ok(())
}

fn normalized(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/').to_ascii_lowercase();
    endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .unwrap_or(&endpoint)
        .to_string()
}
