//! Integration tests for specification parsing and validation.

use std::fs;
use tempfile::tempdir;

use tspec_spec::{
    Address, Expectation, InstanceKey, Polarity, ProviderIdentity, Rejection, SourceFile,
    SpecError, SpecParser, SpecValidator, Target, Value,
};

const FULL_SPEC: &str = r#"
terraspec {
  workspace = "staging"
}

assert "widget" "main" {
  size = 10
  id   = computed
  name = "main-${terraspec.workspace}"

  rule {
    port = 443
  }

  rule {
    port = 80
  }

  reject {
    rule {
      port = 22
    }
    legacy {}
  }

  return {
    id = "w-123"
  }
}

reject "widget" "extra" {}

assert "widget" "extra[1]" {
  size = 1
}

assert "output" "out" {
  value = "y"
}

mock "lookup" "info" {
  provider = "lookup.secondary"
  key      = "x"

  return {
    value = "y"
    tags  = ["a", "b"]

    entry {
      name = "first"
    }

    entry {
      name = "second"
    }
  }
}
"#;

/// Parse a specification using every construct of the language.
#[test]
fn test_parse_full_spec() {
    let spec = SpecParser::parse_str("main.tfspec", FULL_SPEC).unwrap();

    let settings = spec.settings();
    assert_eq!(settings.workspace(), "staging");
    assert!(!settings.allow_unmocked_reads);

    assert_eq!(spec.assertions.len(), 4);
    assert_eq!(spec.mocks.len(), 1);

    let main = &spec.assertions[0];
    assert_eq!(main.polarity, Polarity::Expect);
    assert_eq!(
        main.target,
        Target::Resource {
            address: Address::managed("widget", "main")
        }
    );
    assert_eq!(main.source.line, Some(6));
    assert_eq!(
        main.matcher.attributes.get("size"),
        Some(&Expectation::Exact(Value::int(10)))
    );
    assert_eq!(main.matcher.attributes.get("id"), Some(&Expectation::Computed));
    assert_eq!(
        main.matcher.attributes.get("name"),
        Some(&Expectation::Exact(Value::string("main-staging")))
    );
    match main.matcher.attributes.get("rule") {
        Some(Expectation::Blocks(rules)) => assert_eq!(rules.len(), 2),
        other => panic!("expected repeated blocks, got {:?}", other),
    }
    assert_eq!(main.matcher.rejections.len(), 2);
    assert!(matches!(
        &main.matcher.rejections[1],
        Rejection::Block { attribute, shape } if attribute == "legacy" && shape.is_empty()
    ));
    assert_eq!(main.returns.get("id"), Some(&Value::string("w-123")));

    let extra = &spec.assertions[1];
    assert_eq!(extra.polarity, Polarity::Reject);
    assert!(extra.matcher.is_empty());

    let keyed = &spec.assertions[2];
    assert_eq!(
        keyed.target,
        Target::Resource {
            address: Address::managed("widget", "extra").with_key(InstanceKey::Int(1))
        }
    );

    assert_eq!(
        spec.assertions[3].target,
        Target::Output {
            name: "out".to_string()
        }
    );

    let mock = &spec.mocks[0];
    assert_eq!(mock.address, Address::data("lookup", "info"));
    assert_eq!(mock.provider, ProviderIdentity::new("lookup").with_alias("secondary"));
    assert!(!mock.request.attributes.contains_key("provider"));
    assert_eq!(
        mock.request.attributes.get("key"),
        Some(&Expectation::Exact(Value::string("x")))
    );
    assert_eq!(mock.returns.get("value"), Some(&Value::string("y")));
    assert_eq!(
        mock.returns.get("tags"),
        Some(&Value::List(vec![Value::string("a"), Value::string("b")]))
    );
    match mock.returns.get("entry") {
        Some(Value::List(entries)) => {
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[1].get("name"), Some(&Value::string("second")));
        }
        other => panic!("expected a list of entries, got {:?}", other),
    }

    let result = SpecValidator::validate(&spec);
    assert!(result.valid, "Validation failed: {:?}", result.errors);
}

/// Files in a scenario directory are merged in path order.
#[test]
fn test_parse_dir_merges_in_path_order() {
    let temp = tempdir().unwrap();
    fs::write(
        temp.path().join("b.tfspec"),
        "assert \"widget\" \"second\" {\n  size = 2\n}\n",
    )
    .unwrap();
    fs::write(
        temp.path().join("a.tfspec"),
        "assert \"widget\" \"first\" {\n  size = 1\n}\n",
    )
    .unwrap();
    fs::write(temp.path().join("notes.txt"), "not a spec").unwrap();

    let files = SpecParser::spec_files(temp.path()).unwrap();
    assert_eq!(files.len(), 2);

    let spec = SpecParser::parse_dir(temp.path()).unwrap();
    let labels: Vec<String> = spec.assertions.iter().map(|a| a.label()).collect();
    assert_eq!(labels, vec!["assert widget.first", "assert widget.second"]);
    assert!(spec.assertions[0].source.file.ends_with("a.tfspec"));
}

#[test]
fn test_parse_dir_without_specs() {
    let temp = tempdir().unwrap();
    let err = SpecParser::parse_dir(temp.path()).unwrap_err();
    assert!(matches!(err, SpecError::NoSpecFiles(_)));
}

#[test]
fn test_default_workspace_reference() {
    let spec = SpecParser::parse_str(
        "ws.tfspec",
        "assert \"widget\" \"main\" {\n  name = terraspec.workspace\n}\n",
    )
    .unwrap();
    assert_eq!(
        spec.assertions[0].matcher.attributes.get("name"),
        Some(&Expectation::Exact(Value::string("default")))
    );
}

#[test]
fn test_unknown_block_reports_position() {
    let text = "assert \"widget\" \"main\" {\n  size = 1\n}\n\nresource \"widget\" \"x\" {}\n";
    let err = SpecParser::parse_str("bad.tfspec", text).unwrap_err();
    assert_eq!(err.position.map(|p| p.line), Some(5));
    assert!(err.message.contains("unknown block `resource`"));
    assert!(err.to_string().starts_with("bad.tfspec:5:1"));
}

#[test]
fn test_keyed_block_error_reports_position() {
    let text = concat!(
        "assert \"widget\" \"main\" {\n",
        "  size = 1\n",
        "}\n",
        "\n",
        "assert \"widget\" \"extra[\\\"b\\\"]\" {\n",
        "  reject {\n",
        "    size = computed\n",
        "  }\n",
        "}\n",
    );
    let err = SpecParser::parse_str("bad.tfspec", text).unwrap_err();
    assert_eq!(err.position.map(|p| p.line), Some(5));
    assert!(err.message.contains("cannot be rejected"));
}

#[test]
fn test_reject_with_body_is_an_error() {
    let text = "reject \"widget\" \"extra\" {\n  size = 1\n}\n";
    let err = SpecParser::parse_str("bad.tfspec", text).unwrap_err();
    assert!(err.message.contains("empty body"));
}

#[test]
fn test_unresolved_reference() {
    let text = "assert \"widget\" \"main\" {\n  size = var.size\n}\n";
    let err = SpecParser::parse_str("bad.tfspec", text).unwrap_err();
    assert!(err.message.contains("cannot evaluate `size`"));
    assert!(err.message.contains("unresolved reference `var`"));
}

#[test]
fn test_reject_not_allowed_in_mock() {
    let text = r#"
mock "lookup" "info" {
  key = "x"

  reject {
    key = "y"
  }
}
"#;
    let err = SpecParser::parse_str("bad.tfspec", text).unwrap_err();
    assert!(err.message.contains("`reject` is not allowed here"));
}

#[test]
fn test_nested_reject_is_an_error() {
    let text = r#"
assert "widget" "main" {
  reject {
    reject {
      size = 1
    }
  }
}
"#;
    let err = SpecParser::parse_str("bad.tfspec", text).unwrap_err();
    assert!(err.message.contains("cannot be nested"));
}

#[test]
fn test_return_only_at_top_level() {
    let text = r#"
assert "widget" "main" {
  rule {
    return {
      id = "x"
    }
  }
}
"#;
    let err = SpecParser::parse_str("bad.tfspec", text).unwrap_err();
    assert!(err.message.contains("only allowed at the top level"));
}

#[test]
fn test_duplicate_settings_across_files() {
    let sources = vec![
        SourceFile::new("a.tfspec", "terraspec {\n  workspace = \"one\"\n}\n"),
        SourceFile::new("b.tfspec", "terraspec {\n  workspace = \"two\"\n}\n"),
    ];
    let err = SpecParser::parse_sources(&sources).unwrap_err();
    assert!(err.file.ends_with("b.tfspec"));
    assert!(err.message.contains("duplicate `terraspec` block"));
}

#[test]
fn test_unknown_setting() {
    let err = SpecParser::parse_str("bad.tfspec", "terraspec {\n  colour = \"red\"\n}\n").unwrap_err();
    assert!(err.message.contains("unsupported setting `colour`"));
}

#[test]
fn test_syntax_error() {
    let err = SpecParser::parse_str("bad.tfspec", "assert \"widget\" \"main\" {\n  size = \n").unwrap_err();
    assert!(err.message.starts_with("syntax error"));
}

#[test]
fn test_duplicate_targets_fail_preflight() {
    let text = r#"
assert "widget" "main" {
  size = 1
}

reject "widget" "main" {}
"#;
    let spec = SpecParser::parse_str("dup.tfspec", text).unwrap();
    let result = SpecValidator::validate(&spec);
    assert!(!result.valid);
    assert!(matches!(result.into_result(), Err(SpecError::Invariant(_))));
}
