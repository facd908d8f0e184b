//! Resource addresses and provider identities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether an address names a managed resource or a data lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    Managed,
    Data,
}

/// Instance key produced by `count` or `for_each`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstanceKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::Int(i) => write!(f, "[{}]", i),
            InstanceKey::Str(s) => write!(f, "[{:?}]", s),
        }
    }
}

/// Address of a resource or of one of its instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub mode: ResourceMode,
    pub type_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<InstanceKey>,
}

impl Address {
    pub fn managed(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Managed,
            type_name: type_name.into(),
            name: name.into(),
            key: None,
        }
    }

    pub fn data(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Data,
            type_name: type_name.into(),
            name: name.into(),
            key: None,
        }
    }

    pub fn with_key(mut self, key: InstanceKey) -> Self {
        self.key = Some(key);
        self
    }

    /// The resource this instance belongs to (key stripped).
    pub fn resource(&self) -> Address {
        Self {
            key: None,
            ..self.clone()
        }
    }

    /// True if `self` and `other` name the same resource, ignoring keys.
    pub fn same_resource(&self, other: &Address) -> bool {
        self.mode == other.mode && self.type_name == other.type_name && self.name == other.name
    }

    /// Provider type implied by the resource type (`aws_instance` -> `aws`).
    pub fn implied_provider(&self) -> ProviderIdentity {
        ProviderIdentity::implied_by(&self.type_name)
    }

    /// Parse a name label that may carry an instance key, such as
    /// `extra`, `extra[0]` or `by_name["a"]`.
    pub fn split_name_label(label: &str) -> Option<(String, Option<InstanceKey>)> {
        let Some(open) = label.find('[') else {
            return Some((label.to_string(), None));
        };
        let inner = label[open..].strip_prefix('[')?.strip_suffix(']')?;
        let name = label[..open].to_string();
        if name.is_empty() {
            return None;
        }
        let key = if let Some(quoted) = inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            InstanceKey::Str(quoted.to_string())
        } else {
            InstanceKey::Int(inner.trim().parse().ok()?)
        };
        Some((name, Some(key)))
    }

    /// Parse a rendered address such as `data.lookup.info` or `widget.extra[0]`.
    pub fn parse(s: &str) -> Option<Address> {
        let (mode, rest) = match s.strip_prefix("data.") {
            Some(rest) => (ResourceMode::Data, rest),
            None => (ResourceMode::Managed, s),
        };
        let (type_name, name_label) = rest.split_once('.')?;
        if type_name.is_empty() {
            return None;
        }
        let (name, key) = Self::split_name_label(name_label)?;
        Some(Self {
            mode,
            type_name: type_name.to_string(),
            name,
            key,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mode == ResourceMode::Data {
            write!(f, "data.")?;
        }
        write!(f, "{}.{}", self.type_name, self.name)?;
        if let Some(key) = &self.key {
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

/// A provider configuration: provider type plus optional alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub provider_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ProviderIdentity {
    pub fn new(provider_type: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Default provider for a resource type: the prefix before the first `_`.
    pub fn implied_by(type_name: &str) -> Self {
        let provider_type = type_name.split('_').next().unwrap_or(type_name);
        Self::new(provider_type)
    }

    /// Parse `type` or `type.alias`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('.');
        let provider_type = parts.next().filter(|p| !p.is_empty())?;
        let alias = parts.next();
        if parts.next().is_some() || alias.map_or(false, str::is_empty) {
            return None;
        }
        Some(Self {
            provider_type: provider_type.to_string(),
            alias: alias.map(str::to_string),
        })
    }
}

impl fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}.{}", self.provider_type, alias),
            None => write!(f, "{}", self.provider_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        assert_eq!(Address::managed("widget", "main").to_string(), "widget.main");
        assert_eq!(Address::data("lookup", "info").to_string(), "data.lookup.info");
        assert_eq!(
            Address::managed("widget", "extra")
                .with_key(InstanceKey::Int(0))
                .to_string(),
            "widget.extra[0]"
        );
        assert_eq!(
            Address::managed("widget", "named")
                .with_key(InstanceKey::Str("a".into()))
                .to_string(),
            r#"widget.named["a"]"#
        );
    }

    #[test]
    fn test_address_parse() {
        let address = Address::parse("data.lookup.info").unwrap();
        assert_eq!(address, Address::data("lookup", "info"));

        let address = Address::parse(r#"widget.named["a"]"#).unwrap();
        assert_eq!(address.key, Some(InstanceKey::Str("a".into())));

        assert!(Address::parse("widget").is_none());
        assert!(Address::parse("widget.x[nope]").is_none());
    }

    #[test]
    fn test_implied_provider() {
        assert_eq!(ProviderIdentity::implied_by("aws_instance").to_string(), "aws");
        assert_eq!(ProviderIdentity::implied_by("lookup").to_string(), "lookup");
    }

    #[test]
    fn test_provider_parse() {
        let identity = ProviderIdentity::parse("widget.secondary").unwrap();
        assert_eq!(identity, ProviderIdentity::new("widget").with_alias("secondary"));
        assert!(ProviderIdentity::parse("widget.").is_none());
        assert!(ProviderIdentity::parse("a.b.c").is_none());
    }
}
