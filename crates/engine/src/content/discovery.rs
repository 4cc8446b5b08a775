use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::AppPaths;

use super::types::{ContentPlanError, ContentPlanRequest};

#[derive(Debug, Clone)]
pub(crate) struct ModSource {
    pub mod_id: String,
    pub mod_load_index: u32,
    pub source_dir: PathBuf,
}

/// Base content first, then enabled mods in request order. Later sources
/// override earlier ones def-by-def.
pub(crate) fn discover_mod_sources(
    app_paths: &AppPaths,
    request: &ContentPlanRequest,
) -> Result<Vec<ModSource>, ContentPlanError> {
    if !app_paths.base_content_dir.is_dir() {
        return Err(ContentPlanError::BaseContentMissing {
            path: app_paths.base_content_dir.clone(),
        });
    }

    let mut seen = HashSet::<String>::new();
    let mut sources = vec![ModSource {
        mod_id: "base".to_string(),
        mod_load_index: 0,
        source_dir: app_paths.base_content_dir.clone(),
    }];

    for (idx, mod_id) in request.enabled_mods.iter().enumerate() {
        let trimmed = mod_id.trim();
        if trimmed.is_empty() {
            return Err(ContentPlanError::EmptyEnabledMod);
        }
        if !seen.insert(trimmed.to_string()) {
            return Err(ContentPlanError::DuplicateEnabledMod {
                mod_id: trimmed.to_string(),
            });
        }
        let mod_dir = app_paths.mods_dir.join(trimmed);
        ensure_dir_exists(trimmed, &mod_dir)?;
        sources.push(ModSource {
            mod_id: trimmed.to_string(),
            mod_load_index: (idx + 1) as u32,
            source_dir: mod_dir,
        });
    }

    Ok(sources)
}

fn ensure_dir_exists(mod_id: &str, path: &Path) -> Result<(), ContentPlanError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ContentPlanError::EnabledModMissing {
            mod_id: mod_id.to_string(),
            expected_dir: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn app_paths_in(root: &Path) -> AppPaths {
        let paths = AppPaths::from_root(root.to_path_buf());
        fs::create_dir_all(&paths.base_content_dir).expect("create base");
        fs::create_dir_all(&paths.mods_dir).expect("create mods");
        paths
    }

    #[test]
    fn base_is_first_then_enabled_order() {
        let temp = TempDir::new().expect("tempdir");
        let app_paths = app_paths_in(temp.path());
        fs::create_dir_all(app_paths.mods_dir.join("b")).expect("create mod b");
        fs::create_dir_all(app_paths.mods_dir.join("a")).expect("create mod a");
        let request = ContentPlanRequest {
            enabled_mods: vec!["b".to_string(), "a".to_string()],
        };

        let sources = discover_mod_sources(&app_paths, &request).expect("discover");
        assert_eq!(sources[0].mod_id, "base");
        assert_eq!(sources[1].mod_id, "b");
        assert_eq!(sources[2].mod_id, "a");
        assert_eq!(sources[0].mod_load_index, 0);
        assert_eq!(sources[2].mod_load_index, 2);
    }

    #[test]
    fn duplicate_enabled_mod_is_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let app_paths = app_paths_in(temp.path());
        fs::create_dir_all(app_paths.mods_dir.join("a")).expect("create mod a");
        let request = ContentPlanRequest {
            enabled_mods: vec!["a".to_string(), " a ".to_string()],
        };

        let err = discover_mod_sources(&app_paths, &request).expect_err("duplicate");
        assert!(matches!(err, ContentPlanError::DuplicateEnabledMod { .. }));
    }

    #[test]
    fn missing_base_dir_is_reported() {
        let temp = TempDir::new().expect("tempdir");
        let app_paths = AppPaths::from_root(temp.path().to_path_buf());
        let err = discover_mod_sources(&app_paths, &ContentPlanRequest::default())
            .expect_err("missing base");
        assert!(matches!(err, ContentPlanError::BaseContentMissing { .. }));
    }
}
