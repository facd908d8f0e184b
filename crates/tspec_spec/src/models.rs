//! Data models for a parsed specification.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::address::{Address, ProviderIdentity};
use crate::matcher::Matcher;
use crate::value::ValueMap;

/// Workspace name used when a scenario does not declare one.
pub const DEFAULT_WORKSPACE: &str = "default";

/// Whether an assertion requires or forbids its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Expect,
    Reject,
}

/// What an assertion is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Resource { address: Address },
    Output { name: String },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Resource { address } => write!(f, "{}", address),
            Target::Output { name } => write!(f, "output.{}", name),
        }
    }
}

/// Where a specification entry was declared.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SourceRef {
    pub file: PathBuf,
    pub line: Option<usize>,
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.file.display(), line),
            None => write!(f, "{}", self.file.display()),
        }
    }
}

/// An `assert`/`expect` or `reject` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    pub polarity: Polarity,
    pub target: Target,
    pub matcher: Matcher,
    /// Values injected into the planned state of the target for attributes
    /// the provider reports as computed.
    pub returns: ValueMap,
    pub source: SourceRef,
}

impl Assertion {
    pub fn expect(target: Target, matcher: Matcher) -> Self {
        Self {
            polarity: Polarity::Expect,
            target,
            matcher,
            returns: ValueMap::new(),
            source: SourceRef::default(),
        }
    }

    pub fn reject(address: Address) -> Self {
        Self {
            polarity: Polarity::Reject,
            target: Target::Resource { address },
            matcher: Matcher::new(),
            returns: ValueMap::new(),
            source: SourceRef::default(),
        }
    }

    /// Short human label, e.g. `assert widget.main`.
    pub fn label(&self) -> String {
        let keyword = match self.polarity {
            Polarity::Expect => "assert",
            Polarity::Reject => "reject",
        };
        format!("{} {}", keyword, self.target)
    }
}

/// A substitute response for a data lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Mock {
    /// Data address; a key restricts the mock to one instance.
    pub address: Address,
    pub provider: ProviderIdentity,
    pub request: Matcher,
    pub returns: ValueMap,
    pub source: SourceRef,
}

impl Mock {
    pub fn new(address: Address, request: Matcher, returns: ValueMap) -> Self {
        let provider = address.implied_provider();
        Self {
            address,
            provider,
            request,
            returns,
            source: SourceRef::default(),
        }
    }

    pub fn with_provider(mut self, provider: ProviderIdentity) -> Self {
        self.provider = provider;
        self
    }
}

/// Global settings from the `terraspec` block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Settings {
    pub workspace: Option<String>,
    /// Answer unmocked data reads with the request echoed back instead of
    /// failing the scenario.
    pub allow_unmocked_reads: bool,
}

impl Settings {
    pub fn workspace(&self) -> &str {
        self.workspace.as_deref().unwrap_or(DEFAULT_WORKSPACE)
    }
}

/// The merged specification of one scenario.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Specification {
    pub settings: Option<Settings>,
    pub assertions: Vec<Assertion>,
    pub mocks: Vec<Mock>,
}

impl Specification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declared settings, or defaults.
    pub fn settings(&self) -> Settings {
        self.settings.clone().unwrap_or_default()
    }

    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn with_mock(mut self, mock: Mock) -> Self {
        self.mocks.push(mock);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.assertions.is_empty() && self.mocks.is_empty()
    }
}
