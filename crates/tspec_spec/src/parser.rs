//! Parser for specification files.
//!
//! Specification files use the same block syntax as the configurations they
//! test. Four top-level forms are recognised:
//!
//! ```hcl
//! terraspec {
//!   workspace = "staging"
//! }
//!
//! assert "widget" "main" {
//!   size = 10
//!   id   = computed
//!
//!   rule {
//!     port = 443
//!   }
//!
//!   reject {
//!     rule {
//!       port = 22
//!     }
//!   }
//!
//!   return {
//!     id = "w-123"
//!   }
//! }
//!
//! reject "widget" "extra" {}
//!
//! mock "lookup" "info" {
//!   key = "x"
//!
//!   return {
//!     value = "y"
//!   }
//! }
//! ```
//!
//! `expect` is accepted as a synonym for `assert`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use hcl::eval::{Context, Evaluate};
use hcl::{Attribute, Block, Body, Expression};
use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use crate::address::{Address, ProviderIdentity, ResourceMode};
use crate::error::{ParseError, Position, SpecError, SpecResult};
use crate::matcher::{Expectation, Matcher, Rejection};
use crate::models::{Assertion, Mock, Polarity, Settings, SourceRef, Specification, Target};
use crate::value::{Value, ValueMap};

/// File extension of specification files.
pub const SPEC_EXTENSION: &str = "tfspec";

/// Bare identifier standing for "computed, value irrelevant".
pub const WILDCARD: &str = "computed";

/// Name under which settings are visible to specification values.
pub const SETTINGS_REFERENCE: &str = "terraspec";

/// An in-memory specification file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Parser for specification files.
pub struct SpecParser;

impl SpecParser {
    /// List the specification files directly inside `dir`, sorted by path.
    pub fn spec_files(dir: &Path) -> SpecResult<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(SpecError::NoSpecFiles(dir.to_path_buf()));
        }
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file() && p.extension().map_or(false, |ext| ext == SPEC_EXTENSION))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Parse every specification file inside `dir` into one specification.
    pub fn parse_dir(dir: &Path) -> SpecResult<Specification> {
        let files = Self::spec_files(dir)?;
        if files.is_empty() {
            return Err(SpecError::NoSpecFiles(dir.to_path_buf()));
        }
        Self::parse_files(&files)
    }

    /// Read and parse the given files into one specification.
    pub fn parse_files(paths: &[PathBuf]) -> SpecResult<Specification> {
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            debug!("Reading specification file {:?}", path);
            sources.push(SourceFile::new(path.clone(), fs::read_to_string(path)?));
        }
        Ok(Self::parse_sources(&sources)?)
    }

    /// Parse a single specification text.
    pub fn parse_str(file: impl Into<PathBuf>, text: &str) -> Result<Specification, ParseError> {
        Self::parse_sources(&[SourceFile::new(file, text)])
    }

    /// Parse and merge several specification texts, in the given order.
    pub fn parse_sources(sources: &[SourceFile]) -> Result<Specification, ParseError> {
        let mut documents = Vec::with_capacity(sources.len());
        for source in sources {
            let body = hcl::parse(&source.text).map_err(|err| syntax_error(&source.path, &err))?;
            if let Some(attribute) = body.attributes().next() {
                return Err(ParseError::new(
                    &source.path,
                    None,
                    format!(
                        "unexpected top-level attribute `{}`; only blocks are allowed",
                        attribute.key()
                    ),
                ));
            }
            documents.push((source, body));
        }

        // Settings come first so that `terraspec.*` references resolve in every file.
        let empty = Context::new();
        let mut declared: Option<(Settings, SourceRef)> = None;
        for (source, body) in &documents {
            let mut locator = Locator::new(&source.text);
            for block in body.blocks() {
                let position = locator.locate(block);
                if block.identifier() != SETTINGS_REFERENCE {
                    continue;
                }
                let parser = BodyParser::new(&source.path, position, &empty);
                if let Some((_, first)) = &declared {
                    return Err(parser.error(format!(
                        "duplicate `terraspec` block; the first one is declared at {}",
                        first
                    )));
                }
                declared = Some((parser.settings(block)?, parser.source()));
            }
        }

        let settings = declared.map(|(settings, _)| settings);
        let context = reference_context(settings.clone().unwrap_or_default());
        let mut spec = Specification {
            settings,
            ..Specification::default()
        };

        for (source, body) in &documents {
            let mut locator = Locator::new(&source.text);
            for block in body.blocks() {
                let parser = BodyParser::new(&source.path, locator.locate(block), &context);
                match block.identifier() {
                    SETTINGS_REFERENCE => {}
                    "assert" | "expect" => spec.assertions.push(parser.assertion(block)?),
                    "reject" => spec.assertions.push(parser.rejection(block)?),
                    "mock" => spec.mocks.push(parser.mock(block)?),
                    other => {
                        return Err(parser.error(format!(
                            "unknown block `{}`; expected one of `assert`, `expect`, `reject`, `mock`, `terraspec`",
                            other
                        )))
                    }
                }
            }
        }

        debug!(
            assertions = spec.assertions.len(),
            mocks = spec.mocks.len(),
            "Parsed specification"
        );
        Ok(spec)
    }
}

/// Evaluation context exposing the settings as `terraspec.*`.
fn reference_context(settings: Settings) -> Context<'static> {
    let mut object = hcl::Map::new();
    object.insert(
        "workspace".to_string(),
        hcl::Value::String(settings.workspace().to_string()),
    );
    object.insert(
        "allow_unmocked_reads".to_string(),
        hcl::Value::Bool(settings.allow_unmocked_reads),
    );
    let mut context = Context::new();
    context.declare_var(SETTINGS_REFERENCE, hcl::Value::Object(object));
    context
}

fn syntax_error(file: &Path, err: &hcl::Error) -> ParseError {
    let message = err.to_string();
    ParseError::new(
        file,
        position_from_diagnostic(&message),
        format!("syntax error: {}", message.trim()),
    )
}

/// Line/column forms found in parser diagnostics, most explicit first.
static POSITION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"line (\d+), column (\d+)", r"(\d+):(\d+)"]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

/// Extract a line/column pair from a parser diagnostic.
fn position_from_diagnostic(message: &str) -> Option<Position> {
    for re in POSITION_PATTERNS.iter() {
        if let Some(caps) = re.captures(message) {
            let line = caps.get(1)?.as_str().parse().ok()?;
            let column = caps.get(2)?.as_str().parse().ok()?;
            return Some(Position { line, column });
        }
    }
    None
}

fn is_wildcard(expr: &Expression) -> bool {
    matches!(expr, Expression::Variable(var) if var.as_str() == WILDCARD)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Finds the source line of top-level block headers, in document order.
struct Locator<'a> {
    lines: Vec<&'a str>,
    cursor: usize,
}

impl<'a> Locator<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            cursor: 0,
        }
    }

    fn locate(&mut self, block: &Block) -> Option<Position> {
        let labels: Vec<&str> = block.labels().iter().map(|l| l.as_str()).collect();
        for index in self.cursor..self.lines.len() {
            let line = self.lines[index];
            if header_matches(line, block.identifier(), &labels) {
                self.cursor = index + 1;
                let column = line.len() - line.trim_start().len() + 1;
                return Some(Position {
                    line: index + 1,
                    column,
                });
            }
        }
        None
    }
}

fn header_matches(line: &str, identifier: &str, labels: &[&str]) -> bool {
    let Some(mut rest) = line.trim_start().strip_prefix(identifier) else {
        return false;
    };
    if !rest.starts_with(|c: char| c.is_whitespace() || c == '{' || c == '"') {
        return false;
    }
    for label in labels {
        // Labels are compared in their quoted source form.
        let quoted = label.replace('\\', "\\\\").replace('"', "\\\"");
        match rest.find(quoted.as_str()) {
            Some(i) => rest = &rest[i + quoted.len()..],
            None => return false,
        }
    }
    true
}

/// Converts the body of one top-level block.
struct BodyParser<'a, 'c> {
    file: &'a Path,
    position: Option<Position>,
    context: &'a Context<'c>,
}

impl<'a, 'c> BodyParser<'a, 'c> {
    fn new(file: &'a Path, position: Option<Position>, context: &'a Context<'c>) -> Self {
        Self {
            file,
            position,
            context,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.file, self.position, message)
    }

    fn source(&self) -> SourceRef {
        SourceRef {
            file: self.file.to_path_buf(),
            line: self.position.map(|p| p.line),
        }
    }

    fn settings(&self, block: &Block) -> Result<Settings, ParseError> {
        if !block.labels().is_empty() {
            return Err(self.error("`terraspec` block takes no labels"));
        }
        if let Some(nested) = block.body().blocks().next() {
            return Err(self.error(format!(
                "unexpected block `{}` inside `terraspec`",
                nested.identifier()
            )));
        }
        let mut settings = Settings::default();
        for attribute in block.body().attributes() {
            let value = self.evaluate(attribute)?;
            match attribute.key() {
                "workspace" => {
                    let name = value
                        .as_str()
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| self.error("`workspace` must be a non-empty string"))?;
                    settings.workspace = Some(name.to_string());
                }
                "allow_unmocked_reads" => {
                    settings.allow_unmocked_reads = value
                        .as_bool()
                        .ok_or_else(|| self.error("`allow_unmocked_reads` must be a bool"))?;
                }
                other => return Err(self.error(format!("unsupported setting `{}`", other))),
            }
        }
        Ok(settings)
    }

    fn assertion(&self, block: &Block) -> Result<Assertion, ParseError> {
        let target = self.target(block)?;
        let body = block.body();
        let returns = self.single_return(body)?;
        if returns.is_some() && matches!(target, Target::Output { .. }) {
            return Err(self.error("`return` is only valid in resource assertions"));
        }
        let matcher = self.matcher_from(
            body.attributes(),
            body.blocks().filter(|b| b.identifier() != "return"),
            true,
        )?;
        Ok(Assertion {
            polarity: Polarity::Expect,
            target,
            matcher,
            returns: returns.unwrap_or_default(),
            source: self.source(),
        })
    }

    fn rejection(&self, block: &Block) -> Result<Assertion, ParseError> {
        let address = match self.target(block)? {
            Target::Resource { address } => address,
            Target::Output { .. } => return Err(self.error("outputs cannot be rejected")),
        };
        let body = block.body();
        if body.attributes().next().is_some() || body.blocks().next().is_some() {
            return Err(self.error(
                "top-level `reject` takes an empty body; use a nested `reject` block inside `assert` to forbid a shape",
            ));
        }
        let mut assertion = Assertion::reject(address);
        assertion.source = self.source();
        Ok(assertion)
    }

    fn mock(&self, block: &Block) -> Result<Mock, ParseError> {
        let (type_label, name_label) = self.two_labels(block)?;
        if type_label == "output" {
            return Err(self.error("outputs cannot be mocked; mock the data source they read"));
        }
        let address = self.address(ResourceMode::Data, type_label, name_label)?;
        let body = block.body();

        let mut provider = address.implied_provider();
        for attribute in body.attributes().filter(|a| a.key() == "provider") {
            provider = self
                .evaluate(attribute)?
                .as_str()
                .and_then(ProviderIdentity::parse)
                .ok_or_else(|| {
                    self.error(r#"`provider` must be a string such as "lookup" or "lookup.alias""#)
                })?;
        }

        let returns = self.single_return(body)?.unwrap_or_default();
        let request = self.matcher_from(
            body.attributes().filter(|a| a.key() != "provider"),
            body.blocks().filter(|b| b.identifier() != "return"),
            false,
        )?;
        Ok(Mock {
            address,
            provider,
            request,
            returns,
            source: self.source(),
        })
    }

    fn two_labels<'b>(&self, block: &'b Block) -> Result<(&'b str, &'b str), ParseError> {
        match block.labels() {
            [kind, name] => Ok((kind.as_str(), name.as_str())),
            labels => Err(self.error(format!(
                "`{}` expects two labels (type and name), found {}",
                block.identifier(),
                labels.len()
            ))),
        }
    }

    fn target(&self, block: &Block) -> Result<Target, ParseError> {
        let (type_label, name_label) = self.two_labels(block)?;
        if type_label == "output" {
            if !is_identifier(name_label) {
                return Err(self.error(format!("invalid output name `{}`", name_label)));
            }
            return Ok(Target::Output {
                name: name_label.to_string(),
            });
        }
        Ok(Target::Resource {
            address: self.address(ResourceMode::Managed, type_label, name_label)?,
        })
    }

    fn address(&self, mode: ResourceMode, type_label: &str, name_label: &str) -> Result<Address, ParseError> {
        if !is_identifier(type_label) {
            return Err(self.error(format!("invalid resource type `{}`", type_label)));
        }
        let (name, key) = Address::split_name_label(name_label)
            .filter(|(name, _)| is_identifier(name))
            .ok_or_else(|| self.error(format!("invalid resource name `{}`", name_label)))?;
        Ok(Address {
            mode,
            type_name: type_label.to_string(),
            name,
            key,
        })
    }

    fn no_labels(&self, block: &Block) -> Result<(), ParseError> {
        if block.labels().is_empty() {
            Ok(())
        } else {
            Err(self.error(format!("nested block `{}` takes no labels", block.identifier())))
        }
    }

    fn evaluate(&self, attribute: &Attribute) -> Result<Value, ParseError> {
        attribute
            .expr()
            .evaluate(self.context)
            .map(Value::from)
            .map_err(|err| match err.kind() {
                hcl::eval::ErrorKind::UndefinedVar(name) => self.error(format!(
                    "cannot evaluate `{}`: unresolved reference `{}`",
                    attribute.key(),
                    name
                )),
                _ => self.error(format!("cannot evaluate `{}`: {}", attribute.key(), err)),
            })
    }

    fn matcher(&self, body: &Body, allow_reject: bool) -> Result<Matcher, ParseError> {
        self.matcher_from(body.attributes(), body.blocks(), allow_reject)
    }

    fn matcher_from<'b>(
        &self,
        attributes: impl Iterator<Item = &'b Attribute>,
        blocks: impl Iterator<Item = &'b Block>,
        allow_reject: bool,
    ) -> Result<Matcher, ParseError> {
        let mut matcher = Matcher::new();
        for attribute in attributes {
            let name = attribute.key();
            if matcher.attributes.contains_key(name) {
                return Err(self.error(format!("duplicate attribute `{}`", name)));
            }
            let expectation = if is_wildcard(attribute.expr()) {
                Expectation::Computed
            } else {
                Expectation::Exact(self.evaluate(attribute)?)
            };
            matcher.attributes.insert(name.to_string(), expectation);
        }

        for block in blocks {
            let name = block.identifier();
            self.no_labels(block)?;
            match name {
                "return" => {
                    return Err(self.error(
                        "`return` is only allowed at the top level of an assertion or mock",
                    ))
                }
                "reject" if !allow_reject => {
                    return Err(self.error("`reject` is not allowed here"));
                }
                "reject" => matcher.rejections.extend(self.rejections(block.body())?),
                _ => {
                    let nested = self.matcher(block.body(), allow_reject)?;
                    match matcher.attributes.get_mut(name) {
                        None => {
                            matcher
                                .attributes
                                .insert(name.to_string(), Expectation::Block(nested));
                        }
                        Some(entry) => match entry {
                            Expectation::Block(first) => {
                                let first = std::mem::take(first);
                                *entry = Expectation::Blocks(vec![first, nested]);
                            }
                            Expectation::Blocks(all) => all.push(nested),
                            _ => {
                                return Err(self.error(format!(
                                    "`{}` is given both as an attribute and as a block",
                                    name
                                )))
                            }
                        },
                    }
                }
            }
        }
        Ok(matcher)
    }

    fn rejections(&self, body: &Body) -> Result<Vec<Rejection>, ParseError> {
        let mut rejections = Vec::new();
        for attribute in body.attributes() {
            if is_wildcard(attribute.expr()) {
                return Err(self.error(format!(
                    "`{0} = computed` cannot be rejected; use `{0} {{}}` to require absence",
                    attribute.key()
                )));
            }
            rejections.push(Rejection::Value {
                attribute: attribute.key().to_string(),
                value: self.evaluate(attribute)?,
            });
        }
        for block in body.blocks() {
            if block.identifier() == "reject" {
                return Err(self.error("`reject` blocks cannot be nested"));
            }
            self.no_labels(block)?;
            rejections.push(Rejection::Block {
                attribute: block.identifier().to_string(),
                shape: self.matcher(block.body(), false)?,
            });
        }
        Ok(rejections)
    }

    fn single_return(&self, body: &Body) -> Result<Option<ValueMap>, ParseError> {
        let mut found = None;
        for block in body.blocks().filter(|b| b.identifier() == "return") {
            if found.is_some() {
                return Err(self.error("only one `return` block is allowed"));
            }
            self.no_labels(block)?;
            found = Some(self.values(block.body())?);
        }
        Ok(found)
    }

    /// Plain values of a `return` body. Nested blocks become lists of objects.
    fn values(&self, body: &Body) -> Result<ValueMap, ParseError> {
        let mut values = ValueMap::new();
        for attribute in body.attributes() {
            if is_wildcard(attribute.expr()) {
                return Err(self.error(format!(
                    "`{}`: `computed` is not a value and cannot be returned",
                    attribute.key()
                )));
            }
            if values.contains_key(attribute.key()) {
                return Err(self.error(format!("duplicate attribute `{}`", attribute.key())));
            }
            values.insert(attribute.key().to_string(), self.evaluate(attribute)?);
        }
        let attribute_names: Vec<String> = values.keys().cloned().collect();
        for block in body.blocks() {
            self.no_labels(block)?;
            let name = block.identifier();
            if attribute_names.iter().any(|n| n == name) {
                return Err(self.error(format!(
                    "`{}` is given both as an attribute and as a block",
                    name
                )));
            }
            let nested = Value::Map(self.values(block.body())?);
            match values.get_mut(name) {
                Some(Value::List(items)) => items.push(nested),
                _ => {
                    values.insert(name.to_string(), Value::List(vec![nested]));
                }
            }
        }
        Ok(values)
    }
}
