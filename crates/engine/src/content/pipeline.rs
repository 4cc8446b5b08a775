use thiserror::Error;
use tracing::info;

use crate::AppPaths;

use super::compiler::{compile_def_database, ContentCompileError};
use super::database::DefDatabase;
use super::discovery::discover_mod_sources;
use super::types::{ContentPlanError, ContentPlanRequest};

#[derive(Debug, Error)]
pub enum ContentPipelineError {
    #[error(transparent)]
    Plan(#[from] ContentPlanError),
    #[error(transparent)]
    Compile(#[from] ContentCompileError),
}

pub fn build_def_database(
    app_paths: &AppPaths,
    request: &ContentPlanRequest,
) -> Result<DefDatabase, ContentPipelineError> {
    let sources = discover_mod_sources(app_paths, request)?;
    for source in &sources {
        info!(
            mod_id = %source.mod_id,
            mod_load_index = source.mod_load_index,
            source_dir = %source.source_dir.display(),
            "content_source_discovered"
        );
    }

    let database = compile_def_database(app_paths, request)?;
    info!(
        encounter_defs = database.encounter_defs().len(),
        arena_stages = database.arena_stages().len(),
        has_shop = database.shop().is_some(),
        script_len = database.script().len(),
        "content_database_ready"
    );
    Ok(database)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_base_content_is_a_plan_error() {
        let temp = TempDir::new().expect("temp");
        let app_paths = AppPaths::from_root(temp.path().to_path_buf());
        let err = build_def_database(&app_paths, &ContentPlanRequest::default())
            .expect_err("missing base");
        assert!(matches!(
            err,
            ContentPipelineError::Plan(ContentPlanError::BaseContentMissing { .. })
        ));
    }

    #[test]
    fn compile_failure_is_wrapped() {
        let temp = TempDir::new().expect("temp");
        let app_paths = AppPaths::from_root(temp.path().to_path_buf());
        fs::create_dir_all(&app_paths.base_content_dir).expect("base");
        fs::write(app_paths.base_content_dir.join("bad.xml"), "<NotDefs/>").expect("write");
        let err = build_def_database(&app_paths, &ContentPlanRequest::default())
            .expect_err("bad root");
        assert!(matches!(err, ContentPipelineError::Compile(_)));
    }

    #[test]
    fn empty_base_yields_empty_database() {
        let temp = TempDir::new().expect("temp");
        let app_paths = AppPaths::from_root(temp.path().to_path_buf());
        fs::create_dir_all(&app_paths.base_content_dir).expect("base");
        let db = build_def_database(&app_paths, &ContentPlanRequest::default()).expect("db");
        assert!(db.script().is_empty());
        assert!(db.shop().is_none());
    }
}
