//! Variable files (`*.tfvars`).

use std::fs;
use std::path::Path;

use hcl::eval::{Context, Evaluate};
use tracing::debug;
use tspec_spec::{Value, ValueMap};

use crate::error::{CoreError, CoreResult};

/// File extension of variable files.
pub const VARIABLES_EXTENSION: &str = "tfvars";

/// Load a variable file into a map of variable values.
pub fn load_tfvars(path: &Path) -> CoreResult<ValueMap> {
    let text = fs::read_to_string(path)?;
    parse_tfvars(path, &text)
}

/// Parse variable file text. Only attributes with constant values are allowed.
pub fn parse_tfvars(path: &Path, text: &str) -> CoreResult<ValueMap> {
    let invalid = |message: String| CoreError::Variables {
        file: path.to_path_buf(),
        message,
    };

    let body = hcl::parse(text).map_err(|e| invalid(e.to_string()))?;
    if let Some(block) = body.blocks().next() {
        return Err(invalid(format!(
            "blocks are not allowed, found `{}`",
            block.identifier()
        )));
    }

    let context = Context::new();
    let mut variables = ValueMap::new();
    for attribute in body.attributes() {
        let value = attribute
            .expr()
            .evaluate(&context)
            .map_err(|e| invalid(format!("{}: {}", attribute.key(), e)))?;
        variables.insert(attribute.key().to_string(), Value::from(value));
    }
    debug!(file = ?path, count = variables.len(), "Loaded variables");
    Ok(variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_tfvars() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.tfvars");
        fs::write(
            &path,
            "create_extra = true\nsize = 10\ntags = { env = \"test\" }\nzones = [\"a\", \"b\"]\n",
        )
        .unwrap();

        let vars = load_tfvars(&path).unwrap();
        assert_eq!(vars.get("create_extra"), Some(&Value::Bool(true)));
        assert_eq!(vars.get("size"), Some(&Value::int(10)));
        assert_eq!(
            vars.get("tags").and_then(|t| t.get("env")),
            Some(&Value::string("test"))
        );
        assert_eq!(vars.get("zones").and_then(Value::as_list).map(|l| l.len()), Some(2));
    }

    #[test]
    fn test_references_rejected() {
        let err = parse_tfvars(Path::new("x.tfvars"), "size = var.other\n").unwrap_err();
        assert!(matches!(err, CoreError::Variables { .. }));
        assert!(err.to_string().contains("size"));
    }

    #[test]
    fn test_blocks_rejected() {
        let err = parse_tfvars(Path::new("x.tfvars"), "settings {\n  a = 1\n}\n").unwrap_err();
        assert!(err.to_string().contains("blocks are not allowed"));
    }
}
