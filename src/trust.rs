// src/trust.rs
// Trust map: GPG key IDs from the trust-anchor keyring bound to the identity that owns them.

use std::collections::{BTreeMap, BTreeSet};

/// One signing key (primary or subkey) and the identity it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedKey {
    pub key_id: String,
    pub identity: String,
}

impl TrustedKey {
    pub fn new(key_id: &str, identity: &str) -> Self {
        TrustedKey {
            key_id: normalize_key_id(key_id),
            identity: identity.to_string(),
        }
    }
}

/// Key IDs are stored uppercase; lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustMap {
    keys: BTreeMap<String, String>,
}

impl TrustMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last insert wins if the same key ID shows up in two key files.
    pub fn insert(&mut self, key: TrustedKey) {
        self.keys.insert(key.key_id, key.identity);
    }

    pub fn identity(&self, key_id: &str) -> Option<&str> {
        self.keys.get(&normalize_key_id(key_id)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// `(key_id, identity)` pairs ordered by key ID.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries whose identity is not in `used`.
    pub fn unused<'a>(&'a self, used: &BTreeSet<&str>) -> Vec<(&'a str, &'a str)> {
        self.iter()
            .filter(|(_, identity)| !used.contains(identity))
            .collect()
    }
}

impl Extend<TrustedKey> for TrustMap {
    fn extend<I: IntoIterator<Item = TrustedKey>>(&mut self, iter: I) {
        for key in iter {
            self.insert(key);
        }
    }
}

impl FromIterator<TrustedKey> for TrustMap {
    fn from_iter<I: IntoIterator<Item = TrustedKey>>(iter: I) -> Self {
        let mut map = TrustMap::new();
        map.extend(iter);
        map
    }
}

pub fn normalize_key_id(key_id: &str) -> String {
    key_id.trim().to_ascii_uppercase()
}

/// Parses `gpg --with-colons` style key listing text.
///
/// The identity is the last non-empty field of the first `uid:` record. Every `pub:` and `sub:`
/// record contributes its key ID (field 4) bound to that identity, so subkeys
/// always resolve to their primary key's owner.
///
/// Returns `None` when the listing has no `uid:` record.
pub fn parse_key_listing(listing: &str) -> Option<Vec<TrustedKey>> {
    let lines: Vec<&str> = listing.lines().map(str::trim).collect();

    let identity = lines
        .iter()
        .find(|l| l.starts_with("uid:"))
        .and_then(|l| l.trim_end_matches(':').rsplit(':').next())
        .filter(|id| !id.is_empty())?;

    let keys = lines
        .iter()
        .filter(|l| l.starts_with("pub:") || l.starts_with("sub:"))
        .filter_map(|l| l.split(':').nth(4))
        .filter(|id| !id.trim().is_empty())
        .map(|id| TrustedKey::new(id, identity))
        .collect();

    Some(keys)
}
