//! Loads user-defined workflow definitions from JSON files.

use crate::config::AppConfig;
use crate::error::{OfficeflowError, Result};
use crate::workflow::catalog::WorkflowCatalog;
use crate::workflow::schema::WorkflowDefinition;
use std::path::{Path, PathBuf};

/// `~/.officeflow/workflows`, created if missing.
pub fn default_workflows_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| OfficeflowError::Config("No home directory".to_string()))?;
    let dir = home.join(".officeflow").join("workflows");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Configured workflows directory, or the default one.
pub fn workflows_dir(config: &AppConfig) -> Result<PathBuf> {
    match &config.workflows_dir {
        Some(dir) => Ok(dir.clone()),
        None => default_workflows_dir(),
    }
}

fn load_one(path: &Path) -> Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Register every `*.json` definition in `dir`, sorted by file name.
///
/// Unreadable, malformed or invalid files are skipped with a warning.
/// A missing directory loads nothing. Returns the number registered.
pub fn load_into(catalog: &mut WorkflowCatalog, dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        tracing::debug!("Workflows directory {:?} does not exist", dir);
        return Ok(0);
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut loaded = 0;
    for path in paths {
        match load_one(&path).and_then(|def| catalog.register(def)) {
            Ok(()) => loaded += 1,
            Err(e) => tracing::warn!("Failed to load workflow from {:?}: {}", path, e),
        }
    }

    tracing::info!("Loaded {} workflow(s) from {:?}", loaded, dir);
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;
    use crate::workflow::handlers::HandlerTable;
    use std::sync::Arc;

    fn catalog() -> WorkflowCatalog {
        WorkflowCatalog::with_builtin_workflows(
            Arc::new(HandlerTable::builtin()),
            Arc::new(ToolRegistry::builtin()),
        )
        .unwrap()
    }

    #[test]
    fn test_load_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("onboarding.json"),
            r#"{"id":"onboarding","name":"Onboarding","steps":[{"id":"mail","action":"send_email","required":["recipient"]}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(
            dir.path().join("dup.json"),
            r#"{"id":"dup","name":"Dup","steps":[{"id":"a","action":"x"},{"id":"a","action":"y"}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut catalog = catalog();
        let loaded = load_into(&mut catalog, dir.path()).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(catalog.len(), 6);
        assert!(catalog.get("onboarding").is_some());
        assert!(catalog.get("dup").is_none());
    }

    #[test]
    fn test_file_can_override_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("email.json"),
            r#"{"id":"email_automation","name":"Custom Email","steps":[{"id":"send","action":"send_email"}]}"#,
        )
        .unwrap();

        let mut catalog = catalog();
        load_into(&mut catalog, dir.path()).unwrap();
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.get("email_automation").unwrap().definition.name, "Custom Email");
    }

    #[test]
    fn test_missing_dir_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog();
        assert_eq!(load_into(&mut catalog, &dir.path().join("absent")).unwrap(), 0);
    }
}
