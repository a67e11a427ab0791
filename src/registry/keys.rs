//! Object key layout of an artifact bundle
//!
//! ```text
//! {prefix}/model_{v}.bin
//! {prefix}/scaler_{v}.bin
//! {prefix}/metadata_{v}.json
//! {prefix}/model_af_{v}.bundle
//! ```

/// One member of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Model,
    Scaler,
    Metadata,
    Archive,
}

impl ArtifactKind {
    /// Every bundle member, in publish order
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Model,
        ArtifactKind::Scaler,
        ArtifactKind::Metadata,
        ArtifactKind::Archive,
    ];

    fn stem(self) -> &'static str {
        match self {
            ArtifactKind::Model => "model_",
            ArtifactKind::Scaler => "scaler_",
            ArtifactKind::Metadata => "metadata_",
            ArtifactKind::Archive => "model_af_",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Model | ArtifactKind::Scaler => "bin",
            ArtifactKind::Metadata => "json",
            ArtifactKind::Archive => "bundle",
        }
    }

    /// Key name without the prefix, e.g. `scaler_3.bin`
    pub fn file_name(self, version: u64) -> String {
        format!("{}{}.{}", self.stem(), version, self.extension())
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArtifactKind::Model => "model",
            ArtifactKind::Scaler => "scaler",
            ArtifactKind::Metadata => "metadata",
            ArtifactKind::Archive => "archive",
        };
        f.write_str(name)
    }
}

/// Key construction and parsing under one registry prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    prefix: String,
}

impl ArtifactLayout {
    pub fn new(prefix: &str) -> Self {
        ArtifactLayout {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key(&self, kind: ArtifactKind, version: u64) -> String {
        format!("{}/{}", self.prefix, kind.file_name(version))
    }

    pub fn model_key(&self, version: u64) -> String {
        self.key(ArtifactKind::Model, version)
    }

    pub fn scaler_key(&self, version: u64) -> String {
        self.key(ArtifactKind::Scaler, version)
    }

    pub fn metadata_key(&self, version: u64) -> String {
        self.key(ArtifactKind::Metadata, version)
    }

    pub fn archive_key(&self, version: u64) -> String {
        self.key(ArtifactKind::Archive, version)
    }

    /// Listing prefix that covers every model blob
    pub fn model_listing_prefix(&self) -> String {
        format!("{}/{}", self.prefix, ArtifactKind::Model.stem())
    }

    /// Extract `<token>` from `{prefix}/model_<token>.bin`
    ///
    /// Returns `None` for keys outside the model pattern, including the
    /// other bundle members. The token itself is not validated here.
    pub fn model_token<'k>(&self, key: &'k str) -> Option<&'k str> {
        let rest = key.strip_prefix(self.prefix.as_str())?.strip_prefix('/')?;
        let token = rest
            .strip_prefix(ArtifactKind::Model.stem())?
            .strip_suffix(".bin")?;
        if token.contains('/') {
            return None;
        }
        Some(token)
    }
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        ArtifactLayout::new("models")
    }
}
