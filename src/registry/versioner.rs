//! Next-version computation from existing model keys
//!
//! The version of a new bundle is `max(existing) + 1`, or `1` for an empty
//! registry. A key that looks like a model blob but carries a bad token
//! (`model_abc.bin`, `model_0.bin`, `model_007.bin`) is reported and left out
//! of the max; it never aborts the scan.

use super::keys::ArtifactLayout;
use super::RegistryError;

/// Result of scanning a key listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionScan {
    /// Valid versions, ascending, without duplicates
    pub versions: Vec<u64>,
    /// Keys matching the model pattern whose token was rejected
    pub malformed: Vec<String>,
}

impl VersionScan {
    pub fn from_keys<I, K>(layout: &ArtifactLayout, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut scan = VersionScan::default();

        for key in keys {
            let key = key.as_ref();
            let Some(token) = layout.model_token(key) else {
                continue;
            };
            match parse_version_token(key, token) {
                Ok(version) => scan.versions.push(version),
                Err(err) => {
                    tracing::warn!(key, error = %err, "ignoring malformed model key");
                    scan.malformed.push(key.to_string());
                }
            }
        }

        scan.versions.sort_unstable();
        scan.versions.dedup();
        scan
    }

    pub fn latest(&self) -> Option<u64> {
        self.versions.last().copied()
    }

    pub fn next_version(&self) -> Result<u64, RegistryError> {
        match self.latest() {
            None => Ok(1),
            Some(latest) => latest
                .checked_add(1)
                .ok_or(RegistryError::VersionsExhausted { latest }),
        }
    }
}

/// Next version for a listing of keys
pub fn next_version<I, K>(layout: &ArtifactLayout, keys: I) -> Result<u64, RegistryError>
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    VersionScan::from_keys(layout, keys).next_version()
}

/// Parse a version token: canonical positive decimal only
pub fn parse_version_token(key: &str, token: &str) -> Result<u64, RegistryError> {
    let malformed = |reason: &'static str| RegistryError::MalformedVersionKey {
        key: key.to_string(),
        reason,
    };

    if token.is_empty() {
        return Err(malformed("empty version"));
    }
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed("version is not a decimal integer"));
    }
    if token.len() > 1 && token.starts_with('0') {
        return Err(malformed("version has a leading zero"));
    }
    let version: u64 = token
        .parse()
        .map_err(|_| malformed("version does not fit in u64"))?;
    if version == 0 {
        return Err(malformed("version zero is reserved"));
    }
    Ok(version)
}
