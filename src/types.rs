use serde::{Deserialize, Serialize};

/// Mode for storing input fingerprints of `use_hash` tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashStorageMode {
    /// Store hashes in a file (`.assetwatch/hashes`).
    File,
    /// Store hashes in memory only (lost on restart).
    Memory,
}

impl Default for HashStorageMode {
    fn default() -> Self {
        HashStorageMode::Memory
    }
}

/// How connected browsers should react once a rebuild finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadKind {
    /// Reload the whole page.
    Full,
    /// Swap updated stylesheets in place without a page reload.
    Inject,
}

/// Per-task reload setting as written in the config file.
///
/// `auto` picks [`ReloadKind::Inject`] for style-sheet transforms and
/// [`ReloadKind::Full`] for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReloadSetting {
    #[default]
    Auto,
    Full,
    Inject,
    None,
}

impl ReloadSetting {
    pub fn resolve(self, is_stylesheet: bool) -> Option<ReloadKind> {
        match self {
            ReloadSetting::Auto if is_stylesheet => Some(ReloadKind::Inject),
            ReloadSetting::Auto | ReloadSetting::Full => Some(ReloadKind::Full),
            ReloadSetting::Inject => Some(ReloadKind::Inject),
            ReloadSetting::None => None,
        }
    }
}
