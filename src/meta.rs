// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-call metadata (component C4): a string/string side-channel
//! propagated end-to-end with every request and mirrored back on the
//! response.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Reserved key: names the payload codec used to encode/decode `body`.
pub const ENCODE_TYPE: &str = "encode-type";
/// Reserved key: routing hint consumed by the client router's
/// consistent-hash mode.
pub const CONSISTENT_HASH_KEY: &str = "consistent-hash-key";

/// Call-scoped metadata. A thin newtype over a string map so that
/// `Meta::default()` always behaves sensibly even when passed around by
/// value through channels and tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta(pub HashMap<String, String>);

impl Meta {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }
}

impl From<HashMap<String, String>> for Meta {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_roundtrip() {
        let mut m = Meta::new();
        m.set(ENCODE_TYPE, "json");
        assert_eq!(m.get(ENCODE_TYPE), Some("json"));
        assert_eq!(m.get("missing"), None);
    }
}
