//! Recursive lineage tree
//!
//! The JSON shape uses marker objects for leaves so a rendered tree reads
//! naturally: `{"_is_source": true}`, `{"_truncated": true}`,
//! `{"_cycle": true}`, or a mapping from upstream table names to their
//! subtrees.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// One node of an expanded lineage tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineageTree {
    /// Depth bound reached before the expansion finished
    Truncated,

    /// No upstream facts recorded: a raw source, or missing metadata
    Source,

    /// The table already appeared on this expansion path
    Cycle,

    /// Upstream tables, each with its own subtree
    Upstream(BTreeMap<String, LineageTree>),
}

impl LineageTree {
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated)
    }

    pub fn is_source(&self) -> bool {
        matches!(self, Self::Source)
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle)
    }

    /// Upstream mapping, if this node expanded
    pub fn upstream(&self) -> Option<&BTreeMap<String, LineageTree>> {
        match self {
            Self::Upstream(children) => Some(children),
            _ => None,
        }
    }
}

impl Serialize for LineageTree {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Truncated => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("_truncated", &true)?;
                map.end()
            }
            Self::Source => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("_is_source", &true)?;
                map.end()
            }
            Self::Cycle => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("_cycle", &true)?;
                map.end()
            }
            Self::Upstream(children) => {
                let mut map = serializer.serialize_map(Some(children.len()))?;
                for (name, subtree) in children {
                    map.serialize_entry(name, subtree)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_serialize_as_marker_objects() {
        assert_eq!(
            serde_json::to_string(&LineageTree::Source).unwrap(),
            r#"{"_is_source":true}"#
        );
        assert_eq!(
            serde_json::to_string(&LineageTree::Truncated).unwrap(),
            r#"{"_truncated":true}"#
        );
        assert_eq!(
            serde_json::to_string(&LineageTree::Cycle).unwrap(),
            r#"{"_cycle":true}"#
        );
    }

    #[test]
    fn branches_serialize_as_name_keyed_maps() {
        let tree = LineageTree::Upstream(BTreeMap::from([
            ("raw.a".to_string(), LineageTree::Source),
            ("raw.b".to_string(), LineageTree::Truncated),
        ]));
        assert_eq!(
            serde_json::to_string(&tree).unwrap(),
            r#"{"raw.a":{"_is_source":true},"raw.b":{"_truncated":true}}"#
        );
    }
}
