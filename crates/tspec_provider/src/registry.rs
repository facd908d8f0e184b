//! Index of data-source mocks and computed-value overrides.

use std::collections::HashMap;

use tracing::debug;
use tspec_spec::{
    Address, Assertion, Mock, Polarity, ProviderIdentity, Specification, Target, Value, ValueMap,
};

/// Outcome of a mock lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<'a> {
    Found(&'a ValueMap),
    NotFound,
    /// More than one mock matched; carries the number of matches.
    Ambiguous(usize),
}

/// Read-only index built once per scenario and shared by every interceptor.
#[derive(Debug, Default)]
pub struct MockRegistry {
    /// Mocks keyed by `(type, name)`.
    mocks: HashMap<(String, String), Vec<Mock>>,
    /// Return overrides keyed by managed address (keyed or not).
    computed: HashMap<Address, ValueMap>,
    allow_unmocked_reads: bool,
}

impl MockRegistry {
    /// Index `mocks` and the return overrides of `assertions`.
    pub fn build(mocks: &[Mock], assertions: &[Assertion]) -> Self {
        let mut registry = Self::default();
        for mock in mocks {
            registry
                .mocks
                .entry((mock.address.type_name.clone(), mock.address.name.clone()))
                .or_default()
                .push(mock.clone());
        }
        for assertion in assertions {
            if assertion.polarity != Polarity::Expect || assertion.returns.is_empty() {
                continue;
            }
            if let Target::Resource { address } = &assertion.target {
                registry
                    .computed
                    .insert(address.clone(), assertion.returns.clone());
            }
        }
        debug!(
            mocks = mocks.len(),
            overrides = registry.computed.len(),
            "Built mock registry"
        );
        registry
    }

    /// Build from a whole specification, honouring its settings.
    pub fn from_spec(spec: &Specification) -> Self {
        Self::build(&spec.mocks, &spec.assertions)
            .with_unmocked_reads(spec.settings().allow_unmocked_reads)
    }

    pub fn with_unmocked_reads(mut self, allow: bool) -> Self {
        self.allow_unmocked_reads = allow;
        self
    }

    pub fn allows_unmocked_reads(&self) -> bool {
        self.allow_unmocked_reads
    }

    /// Find the return values for a data read.
    ///
    /// A mock is a candidate when its type and name equal the address, its
    /// key (if any) equals the instance key, and its provider identity is
    /// the requesting one. Candidates whose request matcher accepts
    /// `request` are matches. The most specific match wins: a keyed mock
    /// beats an unkeyed one, then more constraints beat fewer. Matches tied
    /// at the top are ambiguous.
    pub fn lookup(&self, address: &Address, provider: &ProviderIdentity, request: &Value) -> Lookup<'_> {
        let Some(candidates) = self
            .mocks
            .get(&(address.type_name.clone(), address.name.clone()))
        else {
            return Lookup::NotFound;
        };

        let matches: Vec<&Mock> = candidates
            .iter()
            .filter(|mock| mock.address.key.is_none() || mock.address.key == address.key)
            .filter(|mock| &mock.provider == provider)
            .filter(|mock| mock.request.matches(request))
            .collect();

        let Some(best) = matches.iter().map(|mock| Self::specificity(mock)).max() else {
            return Lookup::NotFound;
        };
        let winners: Vec<&Mock> = matches
            .into_iter()
            .filter(|mock| Self::specificity(mock) == best)
            .collect();
        match winners.as_slice() {
            [mock] => Lookup::Found(&mock.returns),
            many => Lookup::Ambiguous(many.len()),
        }
    }

    fn specificity(mock: &Mock) -> (bool, usize) {
        (mock.address.key.is_some(), mock.request.specificity())
    }

    /// Return overrides for a managed instance, preferring an entry for the
    /// exact instance over one for the whole resource.
    pub fn computed_values(&self, address: &Address) -> Option<&ValueMap> {
        self.computed
            .get(address)
            .or_else(|| self.computed.get(&address.resource()))
    }

    pub fn mock_count(&self) -> usize {
        self.mocks.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tspec_spec::{InstanceKey, Matcher};

    fn returns(value: &str) -> ValueMap {
        let mut map = ValueMap::new();
        map.insert("value".to_string(), Value::string(value));
        map
    }

    fn request(key: &str) -> Value {
        Value::map([("key", Value::string(key))])
    }

    #[test]
    fn test_lookup_by_request() {
        let address = Address::data("lookup", "info");
        let registry = MockRegistry::build(
            &[
                Mock::new(address.clone(), Matcher::new().value("key", "x"), returns("y")),
                Mock::new(address.clone(), Matcher::new().value("key", "z"), returns("w")),
            ],
            &[],
        );
        let provider = ProviderIdentity::new("lookup");

        assert_eq!(
            registry.lookup(&address, &provider, &request("x")),
            Lookup::Found(&returns("y"))
        );
        assert_eq!(
            registry.lookup(&address, &provider, &request("z")),
            Lookup::Found(&returns("w"))
        );
        assert_eq!(registry.lookup(&address, &provider, &request("q")), Lookup::NotFound);
        assert_eq!(
            registry.lookup(&Address::data("lookup", "other"), &provider, &request("x")),
            Lookup::NotFound
        );
    }

    #[test]
    fn test_provider_identity_must_match() {
        let address = Address::data("lookup", "info");
        let secondary = ProviderIdentity::new("lookup").with_alias("secondary");
        let registry = MockRegistry::build(
            &[Mock::new(address.clone(), Matcher::new(), returns("y")).with_provider(secondary.clone())],
            &[],
        );

        assert_eq!(
            registry.lookup(&address, &ProviderIdentity::new("lookup"), &request("x")),
            Lookup::NotFound
        );
        assert!(matches!(
            registry.lookup(&address, &secondary, &request("x")),
            Lookup::Found(_)
        ));
    }

    #[test]
    fn test_identical_mocks_are_ambiguous() {
        let address = Address::data("lookup", "info");
        let mock = Mock::new(address.clone(), Matcher::new().value("key", "x"), returns("y"));
        let registry = MockRegistry::build(&[mock.clone(), mock], &[]);

        assert_eq!(
            registry.lookup(&address, &ProviderIdentity::new("lookup"), &request("x")),
            Lookup::Ambiguous(2)
        );
    }

    #[test]
    fn test_most_specific_overlapping_mock_wins() {
        let address = Address::data("lookup", "info");
        let registry = MockRegistry::build(
            &[
                Mock::new(address.clone(), Matcher::new(), returns("fallback")),
                Mock::new(address.clone(), Matcher::new().value("key", "x"), returns("y")),
            ],
            &[],
        );
        let provider = ProviderIdentity::new("lookup");

        assert_eq!(
            registry.lookup(&address, &provider, &request("x")),
            Lookup::Found(&returns("y"))
        );
        assert_eq!(
            registry.lookup(&address, &provider, &request("q")),
            Lookup::Found(&returns("fallback"))
        );
    }

    #[test]
    fn test_keyed_mock_beats_unkeyed_mock() {
        let address = Address::data("lookup", "info");
        let keyed = address.clone().with_key(InstanceKey::Int(1));
        let registry = MockRegistry::build(
            &[
                Mock::new(address.clone(), Matcher::new().value("key", "x"), returns("any")),
                Mock::new(keyed.clone(), Matcher::new(), returns("one")),
            ],
            &[],
        );

        assert_eq!(
            registry.lookup(&keyed, &ProviderIdentity::new("lookup"), &request("x")),
            Lookup::Found(&returns("one"))
        );
    }

    #[test]
    fn test_distinct_mocks_tied_in_specificity_are_ambiguous() {
        let address = Address::data("lookup", "info");
        let registry = MockRegistry::build(
            &[
                Mock::new(address.clone(), Matcher::new().value("key", "x"), returns("y")),
                Mock::new(address.clone(), Matcher::new().value("region", "eu"), returns("w")),
            ],
            &[],
        );
        let request = Value::map([("key", Value::string("x")), ("region", Value::string("eu"))]);

        assert_eq!(
            registry.lookup(&address, &ProviderIdentity::new("lookup"), &request),
            Lookup::Ambiguous(2)
        );
    }

    #[test]
    fn test_keyed_mock_only_matches_its_instance() {
        let address = Address::data("lookup", "info");
        let keyed = address.clone().with_key(InstanceKey::Int(1));
        let registry = MockRegistry::build(
            &[Mock::new(keyed.clone(), Matcher::new(), returns("one"))],
            &[],
        );
        let provider = ProviderIdentity::new("lookup");

        assert_eq!(
            registry.lookup(&keyed, &provider, &request("x")),
            Lookup::Found(&returns("one"))
        );
        assert_eq!(
            registry.lookup(&address.with_key(InstanceKey::Int(0)), &provider, &request("x")),
            Lookup::NotFound
        );
    }

    #[test]
    fn test_computed_values() {
        let mut assertion = Assertion::expect(
            Target::Resource {
                address: Address::managed("widget", "main"),
            },
            Matcher::new(),
        );
        assertion.returns = returns("w-1");
        let registry = MockRegistry::build(&[], &[assertion]);

        assert!(registry
            .computed_values(&Address::managed("widget", "main").with_key(InstanceKey::Int(0)))
            .is_some());
        assert!(registry
            .computed_values(&Address::managed("widget", "other"))
            .is_none());
    }
}
