//! `required_version` constraints.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;

/// A `major.minor.patch` version. Pre-release suffixes are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let core = s.trim().trim_start_matches('v');
        let core = core.split(['-', '+']).next()?;
        let mut parts = core.split('.').map(|p| p.parse::<u64>());
        let major = parts.next()?.ok()?;
        let minor = parts.next().transpose().ok()?.unwrap_or(0);
        let patch = parts.next().transpose().ok()?.unwrap_or(0);
        if parts.next().is_some() {
            return None;
        }
        Some(Self { major, minor, patch })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// `~>`: only the rightmost given component may increase.
    Pessimistic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Requirement {
    operator: Operator,
    version: Version,
    /// Number of components written, 1 to 3.
    precision: usize,
}

impl Requirement {
    fn matches(&self, version: &Version) -> bool {
        let ordering = version.cmp(&self.version);
        match self.operator {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Pessimistic => {
                if ordering == Ordering::Less {
                    return false;
                }
                match self.precision {
                    1 | 2 => version.major == self.version.major,
                    _ => version.major == self.version.major && version.minor == self.version.minor,
                }
            }
        }
    }
}

/// A comma-separated list of requirements that must all hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    source: String,
    requirements: Vec<Requirement>,
}

impl VersionConstraint {
    pub fn parse(s: &str) -> Result<Self, String> {
        let re = Regex::new(r"^(=|!=|>=|<=|>|<|~>)?\s*v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:[-+][0-9A-Za-z.+-]*)?$")
            .map_err(|e| e.to_string())?;

        let mut requirements = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            let caps = re
                .captures(part)
                .ok_or_else(|| format!("invalid version constraint `{}`", part))?;
            let operator = match caps.get(1).map(|m| m.as_str()) {
                None | Some("=") => Operator::Eq,
                Some("!=") => Operator::Ne,
                Some(">") => Operator::Gt,
                Some(">=") => Operator::Ge,
                Some("<") => Operator::Lt,
                Some("<=") => Operator::Le,
                _ => Operator::Pessimistic,
            };
            let component = |i: usize| -> Result<Option<u64>, String> {
                caps.get(i)
                    .map(|m| m.as_str().parse::<u64>().map_err(|e| e.to_string()))
                    .transpose()
            };
            let major = component(2)?.unwrap_or(0);
            let minor = component(3)?;
            let patch = component(4)?;
            let precision = 1 + usize::from(minor.is_some()) + usize::from(patch.is_some());
            requirements.push(Requirement {
                operator,
                version: Version::new(major, minor.unwrap_or(0), patch.unwrap_or(0)),
                precision,
            });
        }

        Ok(Self {
            source: s.to_string(),
            requirements,
        })
    }

    /// Constraint accepting exactly `version`.
    pub fn exact(version: &Version) -> Self {
        Self {
            source: format!("= {}", version),
            requirements: vec![Requirement {
                operator: Operator::Eq,
                version: *version,
                precision: 3,
            }],
        }
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.requirements.iter().all(|r| r.matches(version))
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}
