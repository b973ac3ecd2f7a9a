// src/registry/ownership.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::{BuildError, Result};
use crate::watch::path_utils::{normalize, paths_overlap};

/// Which task writes which output directory.
///
/// No two writing tasks may share an output directory or nest inside one
/// another.
#[derive(Debug, Default, Clone)]
pub struct OwnershipMap {
    owners: BTreeMap<PathBuf, String>,
}

impl OwnershipMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `task` owns `dir`, failing on overlap with an existing
    /// owner.
    pub fn claim(&mut self, task: &str, dir: &Path) -> Result<()> {
        let dir = normalize(dir);
        if let Some((other_path, other)) = self
            .owners
            .iter()
            .find(|(owned, _)| paths_overlap(owned, &dir))
        {
            return Err(BuildError::OutputOverlap {
                task: task.to_string(),
                path: dir.clone(),
                other: other.clone(),
                other_path: other_path.clone(),
            });
        }
        self.owners.insert(dir, task.to_string());
        Ok(())
    }

    pub fn owner_of(&self, dir: &Path) -> Option<&str> {
        self.owners.get(&normalize(dir)).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_and_equal_dirs_conflict() {
        let mut map = OwnershipMap::new();
        map.claim("styles", Path::new("app/css")).unwrap();
        map.claim("scripts", Path::new("app/js/dist")).unwrap();

        let err = map.claim("dup", Path::new("./app/css")).unwrap_err();
        assert!(matches!(err, BuildError::OutputOverlap { ref other, .. } if other == "styles"));

        let err = map.claim("outer", Path::new("app")).unwrap_err();
        assert!(matches!(err, BuildError::OutputOverlap { .. }));

        assert_eq!(map.owner_of(Path::new("app/css")), Some("styles"));
    }
}
