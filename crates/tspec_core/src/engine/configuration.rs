//! Loading configuration files.

use std::fs;
use std::path::{Path, PathBuf};

use hcl::eval::{Context, Evaluate};
use hcl::{Block, Body};
use tracing::debug;
use walkdir::WalkDir;

use super::version::{Version, VersionConstraint};
use crate::error::{EngineError, EngineResult};

/// File extension of configuration files.
pub const CONFIG_EXTENSION: &str = "tf";

/// One parsed configuration file.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub path: PathBuf,
    pub body: Body,
}

/// All configuration files of one directory.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub dir: PathBuf,
    pub files: Vec<ConfigFile>,
    /// Combined `terraform { required_version }` constraints.
    pub required_version: Option<String>,
}

impl Configuration {
    /// Parse every `*.tf` file directly inside `dir`, in path order.
    pub fn load(dir: &Path) -> EngineResult<Self> {
        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file() && p.extension().map_or(false, |ext| ext == CONFIG_EXTENSION))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(EngineError::Load {
                file: dir.to_path_buf(),
                message: "no configuration files found".to_string(),
            });
        }

        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let text = fs::read_to_string(&path)?;
            sources.push((path, text));
        }
        Self::from_sources(dir, &sources)
    }

    /// Parse in-memory configuration sources.
    pub fn from_sources(dir: &Path, sources: &[(PathBuf, String)]) -> EngineResult<Self> {
        let mut files = Vec::with_capacity(sources.len());
        for (path, text) in sources {
            let body = hcl::parse(text).map_err(|e| EngineError::Load {
                file: path.clone(),
                message: e.to_string(),
            })?;
            files.push(ConfigFile {
                path: path.clone(),
                body,
            });
        }

        let mut configuration = Self {
            dir: dir.to_path_buf(),
            files,
            required_version: None,
        };
        configuration.required_version = configuration.declared_required_version()?;
        debug!(
            dir = ?configuration.dir,
            files = configuration.files.len(),
            "Loaded configuration"
        );
        Ok(configuration)
    }

    /// Parse a single configuration text.
    pub fn from_text(dir: &Path, text: &str) -> EngineResult<Self> {
        Self::from_sources(dir, &[(dir.join("main.tf"), text.to_string())])
    }

    /// Top-level blocks of every file, in file order.
    pub fn blocks(&self) -> impl Iterator<Item = (&Path, &Block)> {
        self.files
            .iter()
            .flat_map(|file| file.body.blocks().map(move |block| (file.path.as_path(), block)))
    }

    /// Replace the declared constraint with one accepting exactly `version`.
    pub fn pin_version(&mut self, version: &Version) {
        self.required_version = Some(VersionConstraint::exact(version).to_string());
    }

    fn declared_required_version(&self) -> EngineResult<Option<String>> {
        let context = Context::new();
        let mut constraints = Vec::new();
        for (path, block) in self.blocks().filter(|(_, b)| b.identifier() == "terraform") {
            for attribute in block.body().attributes() {
                if attribute.key() != "required_version" {
                    continue;
                }
                let value = attribute.expr().evaluate(&context).map_err(|e| EngineError::Load {
                    file: path.to_path_buf(),
                    message: format!("invalid required_version: {}", e),
                })?;
                match value {
                    hcl::Value::String(s) => constraints.push(s),
                    other => {
                        return Err(EngineError::Load {
                            file: path.to_path_buf(),
                            message: format!("required_version must be a string, found {:?}", other),
                        })
                    }
                }
            }
        }
        Ok(if constraints.is_empty() {
            None
        } else {
            Some(constraints.join(", "))
        })
    }
}
