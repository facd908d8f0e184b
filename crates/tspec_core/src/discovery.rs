//! Scenario discovery.
//!
//! A scenario is a directory holding at least one `*.tfspec` file and at most
//! one `*.tfvars` file. The spec root is itself a scenario when it holds spec
//! files; each direct subdirectory with spec files is another.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use tspec_spec::SpecParser;
use walkdir::WalkDir;

use crate::error::{CoreError, CoreResult};
use crate::variables::VARIABLES_EXTENSION;

/// One scenario directory and the configuration it tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scenario {
    pub name: String,
    pub spec_dir: PathBuf,
    pub config_dir: PathBuf,
    pub spec_files: Vec<PathBuf>,
    pub var_file: Option<PathBuf>,
}

impl Scenario {
    /// Describe the scenario in `spec_dir`.
    pub fn from_dir(name: impl Into<String>, spec_dir: &Path, config_dir: &Path) -> CoreResult<Self> {
        let spec_files = SpecParser::spec_files(spec_dir)?;

        let mut var_files = files_with_extension(spec_dir, VARIABLES_EXTENSION);
        if var_files.len() > 1 {
            return Err(CoreError::Config(format!(
                "scenario {} has {} variable files; at most one is allowed",
                spec_dir.display(),
                var_files.len()
            )));
        }

        Ok(Self {
            name: name.into(),
            spec_dir: spec_dir.to_path_buf(),
            config_dir: config_dir.to_path_buf(),
            spec_files,
            var_file: var_files.pop(),
        })
    }
}

/// Find every scenario under `spec_root`, sorted by directory.
pub fn discover(spec_root: &Path, config_dir: &Path) -> CoreResult<Vec<Scenario>> {
    if !spec_root.is_dir() {
        return Err(CoreError::Config(format!(
            "spec directory {} does not exist",
            spec_root.display()
        )));
    }

    let mut scenarios = Vec::new();
    if has_spec_files(spec_root) {
        let name = spec_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());
        scenarios.push(Scenario::from_dir(name, spec_root, config_dir)?);
    }

    let mut dirs: Vec<PathBuf> = WalkDir::new(spec_root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();
    dirs.sort();

    for dir in dirs {
        if !has_spec_files(&dir) {
            debug!(dir = ?dir, "Skipping directory without spec files");
            continue;
        }
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        scenarios.push(Scenario::from_dir(name, &dir, config_dir)?);
    }

    if scenarios.is_empty() {
        return Err(CoreError::Config(format!(
            "no scenarios found under {}",
            spec_root.display()
        )));
    }
    debug!(count = scenarios.len(), "Discovered scenarios");
    Ok(scenarios)
}

fn has_spec_files(dir: &Path) -> bool {
    SpecParser::spec_files(dir).map_or(false, |files| !files.is_empty())
}

fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && p.extension().map_or(false, |ext| ext == extension))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_discover_subdirectories() {
        let root = tempdir().unwrap();
        for name in ["b_flag_on", "a_flag_off"] {
            let dir = root.path().join(name);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("main.tfspec"), "").unwrap();
        }
        fs::write(root.path().join("a_flag_off/test.tfvars"), "flag = false\n").unwrap();
        fs::create_dir(root.path().join("fixtures")).unwrap();

        let scenarios = discover(root.path(), Path::new("infra")).unwrap();
        let names: Vec<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a_flag_off", "b_flag_on"]);
        assert!(scenarios[0].var_file.is_some());
        assert!(scenarios[1].var_file.is_none());
        assert_eq!(scenarios[0].config_dir, PathBuf::from("infra"));
    }

    #[test]
    fn test_root_is_a_scenario() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("main.tfspec"), "").unwrap();

        let scenarios = discover(root.path(), Path::new(".")).unwrap();
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].spec_dir, root.path());
    }

    #[test]
    fn test_multiple_variable_files() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("main.tfspec"), "").unwrap();
        fs::write(root.path().join("a.tfvars"), "").unwrap();
        fs::write(root.path().join("b.tfvars"), "").unwrap();

        assert!(matches!(
            discover(root.path(), Path::new(".")),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn test_no_scenarios() {
        let root = tempdir().unwrap();
        assert!(discover(root.path(), Path::new(".")).is_err());
        assert!(discover(&root.path().join("missing"), Path::new(".")).is_err());
    }
}
