use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::{ObjectId, OBJECT_ID_LEN};

/// Length of a composite edge id: two object ids back to back.
pub const EDGE_ID_LEN: usize = 2 * OBJECT_ID_LEN;

/// Primary key of an association record: `key1 ++ key2`.
///
/// Because `key1` occupies the first 40 characters, every edge leaving a
/// given source sorts contiguously under the source id, and a prefix scan
/// anchored at the source id finds all of them without a secondary index.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EdgeId(String);

impl EdgeId {
    /// Build an edge id from its two halves.
    ///
    /// Each half must be exactly 40 characters.
    pub fn compose(key1: &str, key2: &str) -> Result<Self, TypeError> {
        for key in [key1, key2] {
            if key.len() != OBJECT_ID_LEN {
                return Err(TypeError::InvalidLength {
                    expected: OBJECT_ID_LEN,
                    actual: key.len(),
                });
            }
        }
        let mut id = String::with_capacity(EDGE_ID_LEN);
        id.push_str(key1);
        id.push_str(key2);
        Ok(Self(id))
    }

    /// Build an edge id from two validated object ids.
    pub fn between(key1: &ObjectId, key2: &ObjectId) -> Self {
        Self(format!("{key1}{key2}"))
    }

    /// Split a stored edge id back into `(key1, key2)`.
    pub fn decompose(id: &str) -> Result<(&str, &str), TypeError> {
        if id.len() != EDGE_ID_LEN || !id.is_char_boundary(OBJECT_ID_LEN) {
            return Err(TypeError::InvalidLength {
                expected: EDGE_ID_LEN,
                actual: id.len(),
            });
        }
        Ok(id.split_at(OBJECT_ID_LEN))
    }

    /// Validate and wrap a stored edge id.
    pub fn parse(id: &str) -> Result<Self, TypeError> {
        Self::decompose(id)?;
        Ok(Self(id.to_string()))
    }

    pub fn key1(&self) -> &str {
        &self.0[..OBJECT_ID_LEN]
    }

    pub fn key2(&self) -> &str {
        &self.0[OBJECT_ID_LEN..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({}->{})", &self.key1()[..8], &self.key2()[..8])
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EdgeId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::decompose(&value)?;
        Ok(Self(value))
    }
}

impl From<EdgeId> for String {
    fn from(id: EdgeId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(c: char) -> String {
        std::iter::repeat(c).take(40).collect()
    }

    #[test]
    fn compose_concatenates() {
        let id = EdgeId::compose(&key('a'), &key('b')).unwrap();
        assert_eq!(id.as_str().len(), 80);
        assert_eq!(id.key1(), key('a'));
        assert_eq!(id.key2(), key('b'));
    }

    #[test]
    fn compose_rejects_short_key() {
        let err = EdgeId::compose("abc", &key('b')).unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 40,
                actual: 3
            }
        );
        assert!(EdgeId::compose(&key('a'), &"b".repeat(41)).is_err());
    }

    #[test]
    fn decompose_rejects_other_lengths() {
        assert!(EdgeId::decompose(&"a".repeat(79)).is_err());
        assert!(EdgeId::decompose(&"a".repeat(81)).is_err());
        assert!(EdgeId::decompose("").is_err());
    }

    #[test]
    fn between_matches_compose() {
        let a = ObjectId::parse(&key('1')).unwrap();
        let b = ObjectId::parse(&key('2')).unwrap();
        assert_eq!(
            EdgeId::between(&a, &b),
            EdgeId::compose(a.as_str(), b.as_str()).unwrap()
        );
    }

    #[test]
    fn deserialize_validates_length() {
        assert!(serde_json::from_str::<EdgeId>("\"short\"").is_err());
        let ok = format!("\"{}{}\"", key('c'), key('d'));
        let id: EdgeId = serde_json::from_str(&ok).unwrap();
        assert_eq!(id.key1(), key('c'));
    }

    proptest! {
        #[test]
        fn decompose_inverts_compose(k1 in "[0-9a-f]{40}", k2 in "[0-9a-f]{40}") {
            let id = EdgeId::compose(&k1, &k2).unwrap();
            let (a, b) = EdgeId::decompose(id.as_str()).unwrap();
            prop_assert_eq!(a, k1.as_str());
            prop_assert_eq!(b, k2.as_str());
        }

        #[test]
        fn compose_rejects_any_non_40_key(k1 in "[0-9a-f]{0,39}", k2 in "[0-9a-f]{40}") {
            prop_assert!(EdgeId::compose(&k1, &k2).is_err());
            prop_assert!(EdgeId::compose(&k2, &k1).is_err());
        }
    }
}
