//! Coordinator address list parsing.

use crate::error::{Error, Result};

/// Default upper bound on accepted coordinator addresses.
pub const MAX_ADDRESSES: usize = 128;

/// A bounded, validated set of `host:port` coordinator addresses.
///
/// Parsing is atomic: either every examined token is accepted or the set
/// ends up empty. Tokens are taken verbatim (no trimming, no numeric port
/// validation); the one syntactic rule is that a colon must appear before
/// the comma that terminates the token.
#[derive(Debug, Clone)]
pub struct AddressSet {
    max: usize,
    addresses: Vec<String>,
}

impl AddressSet {
    /// Creates an empty set accepting at most `max` addresses.
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            max,
            addresses: Vec::new(),
        }
    }

    /// Replaces the set's contents with the addresses parsed from `raw`.
    ///
    /// Empty tokens between commas are skipped. Once the cap is reached the
    /// remaining input is not examined. Previous contents are cleared before
    /// parsing, so a failed parse always leaves the set empty.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `raw` is empty or any examined token lacks a
    /// colon.
    pub fn parse(&mut self, raw: &str) -> Result<()> {
        self.addresses.clear();
        if raw.is_empty() {
            return Err(Error::invalid_argument(
                "coordinator address string is empty",
            ));
        }
        let mut parsed = Vec::new();
        for token in raw.split(',') {
            if parsed.len() == self.max {
                break;
            }
            if token.is_empty() {
                continue;
            }
            if !token.contains(':') {
                return Err(Error::invalid_argument(format!(
                    "coordinator address lacks a port: {token}"
                )));
            }
            parsed.push(token.to_string());
        }
        self.addresses = parsed;
        Ok(())
    }

    /// The parsed addresses, in input order.
    #[must_use]
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Number of parsed addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Whether the set holds no addresses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl Default for AddressSet {
    fn default() -> Self {
        Self::new(MAX_ADDRESSES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_ordered_list() {
        let mut set = AddressSet::default();
        set.parse("alpha:11810,beta:11810,gamma:50000").unwrap();
        assert_eq!(
            set.addresses(),
            ["alpha:11810", "beta:11810", "gamma:50000"]
        );
    }

    #[test]
    fn empty_input_is_rejected() {
        let mut set = AddressSet::default();
        let err = set.parse("").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert!(set.is_empty());
    }

    #[test]
    fn token_without_colon_fails_atomically() {
        let mut set = AddressSet::default();
        set.parse("alpha:11810").unwrap();
        assert_eq!(set.len(), 1);

        let err = set.parse("beta:11810,gamma").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert!(set.is_empty());
    }

    #[test]
    fn empty_tokens_are_skipped() {
        let mut set = AddressSet::default();
        set.parse("alpha:1,,beta:2").unwrap();
        assert_eq!(set.addresses(), ["alpha:1", "beta:2"]);
    }

    #[test]
    fn all_empty_tokens_yield_empty_set() {
        let mut set = AddressSet::default();
        set.parse(",,,").unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn tokens_are_not_trimmed() {
        let mut set = AddressSet::default();
        set.parse(" alpha:1, beta:2").unwrap();
        assert_eq!(set.addresses(), [" alpha:1", " beta:2"]);
    }

    #[test]
    fn cap_drops_excess_silently() {
        let raw = (0..130)
            .map(|i| format!("host{i}:1"))
            .collect::<Vec<_>>()
            .join(",");
        let mut set = AddressSet::default();
        set.parse(&raw).unwrap();
        assert_eq!(set.len(), MAX_ADDRESSES);
        assert_eq!(set.addresses()[0], "host0:1");
        assert_eq!(set.addresses()[127], "host127:1");
    }

    #[test]
    fn input_past_the_cap_is_not_examined() {
        let mut raw = (0..128)
            .map(|i| format!("host{i}:1"))
            .collect::<Vec<_>>()
            .join(",");
        raw.push_str(",malformed-no-colon");
        let mut set = AddressSet::default();
        set.parse(&raw).unwrap();
        assert_eq!(set.len(), MAX_ADDRESSES);
    }

    #[test]
    fn reparse_replaces_previous_contents() {
        let mut set = AddressSet::default();
        set.parse("alpha:1,beta:2").unwrap();
        set.parse("gamma:3").unwrap();
        assert_eq!(set.addresses(), ["gamma:3"]);
    }

    fn address_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-z][a-z0-9.-]{0,16}:[0-9]{1,5}").expect("invalid regex")
    }

    proptest! {
        #[test]
        fn valid_lists_round_trip(tokens in prop::collection::vec(address_strategy(), 1..32)) {
            let raw = tokens.join(",");
            let mut set = AddressSet::default();
            set.parse(&raw).unwrap();
            prop_assert_eq!(set.addresses(), tokens.as_slice());
        }

        #[test]
        fn any_colonless_token_fails_and_empties(
            mut tokens in prop::collection::vec(address_strategy(), 1..16),
            bad in prop::string::string_regex("[a-z0-9.-]{1,16}").expect("invalid regex"),
            position in 0usize..16,
        ) {
            tokens.insert(position.min(tokens.len()), bad);
            let raw = tokens.join(",");
            let mut set = AddressSet::default();
            prop_assert!(set.parse(&raw).is_err());
            prop_assert!(set.is_empty());
        }
    }
}
