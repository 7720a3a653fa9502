//! Typed configuration tree.

use base64::Engine;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::error::SerializeError;

/// Key whose string values are merged as whitespace-separated word sets.
pub const BOOT_ARGS_KEY: &str = "boot-args";

/// One node of a property-list tree.
///
/// Containers keep insertion order. Strings are stored unescaped; escaping
/// happens only when the tree is written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigNode {
    Dict(Dict),
    List(Vec<ConfigNode>),
    Bool(bool),
    /// Reals are not modelled; everything numeric is an integer.
    Integer(i64),
    /// Base64 payload, emitted verbatim.
    Data(String),
    Date(DateTime<Utc>),
    String(String),
}

impl ConfigNode {
    /// Data node from raw bytes.
    pub fn data(bytes: &[u8]) -> Self {
        ConfigNode::Data(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Date node truncated to whole seconds, the precision plist dates carry.
    pub fn date(at: DateTime<Utc>) -> Self {
        let truncated = DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at);
        ConfigNode::Date(truncated)
    }

    pub fn empty_dict() -> Self {
        ConfigNode::Dict(Dict::new())
    }

    pub fn empty_list() -> Self {
        ConfigNode::List(Vec::new())
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigNode::Dict(_) => "dict",
            ConfigNode::List(_) => "array",
            ConfigNode::Bool(_) => "bool",
            ConfigNode::Integer(_) => "integer",
            ConfigNode::Data(_) => "data",
            ConfigNode::Date(_) => "date",
            ConfigNode::String(_) => "string",
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            ConfigNode::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dict> {
        match self {
            ConfigNode::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigNode]> {
        match self {
            ConfigNode::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigNode::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigNode::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ConfigNode::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Decoded bytes of a data node.
    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            ConfigNode::Data(payload) => base64::engine::general_purpose::STANDARD
                .decode(payload)
                .ok(),
            _ => None,
        }
    }

    /// Follow a `/`-separated path of dictionary keys.
    pub fn pointer(&self, path: &str) -> Option<&ConfigNode> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, key| node.as_dict()?.get(key))
    }

    /// Number of container levels below and including this node.
    pub fn depth(&self) -> usize {
        match self {
            ConfigNode::Dict(d) => 1 + d.values().map(ConfigNode::depth).max().unwrap_or(0),
            ConfigNode::List(l) => 1 + l.iter().map(ConfigNode::depth).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// Merge `incoming` into this tree.
    ///
    /// Dictionaries merge key by key, `boot-args` strings union as sorted word
    /// sets, `Kernel/Add` lists skip entries whose `BundlePath` is already
    /// present, other lists concatenate and everything else is overwritten.
    pub fn merge(&mut self, incoming: ConfigNode) {
        let mut path = Vec::new();
        merge_node(self, incoming, &mut path);
    }
}

fn merge_node(target: &mut ConfigNode, incoming: ConfigNode, path: &mut Vec<String>) {
    match (target, incoming) {
        (ConfigNode::Dict(ours), ConfigNode::Dict(theirs)) => {
            for (key, value) in theirs {
                match ours.get_mut(&key) {
                    Some(existing) => {
                        path.push(key);
                        merge_node(existing, value, path);
                        path.pop();
                    }
                    None => ours.insert(key, value),
                }
            }
        }
        (ConfigNode::List(ours), ConfigNode::List(theirs)) => {
            if is_kernel_add(path) {
                for entry in theirs {
                    let duplicate = bundle_path(&entry)
                        .is_some_and(|bp| ours.iter().any(|e| bundle_path(e) == Some(bp)));
                    if !duplicate {
                        ours.push(entry);
                    }
                }
            } else {
                ours.extend(theirs);
            }
        }
        (ConfigNode::String(ours), ConfigNode::String(theirs))
            if path.last().map(String::as_str) == Some(BOOT_ARGS_KEY) =>
        {
            *ours = union_boot_args(ours, &theirs);
        }
        (target, incoming) => *target = incoming,
    }
}

fn is_kernel_add(path: &[String]) -> bool {
    path.len() >= 2 && path[path.len() - 2] == "Kernel" && path[path.len() - 1] == "Add"
}

fn bundle_path(entry: &ConfigNode) -> Option<&str> {
    entry.as_dict()?.get("BundlePath")?.as_str()
}

/// Sorted, de-duplicated union of two boot-args strings.
pub fn union_boot_args(a: &str, b: &str) -> String {
    let words: BTreeSet<&str> = a.split_whitespace().chain(b.split_whitespace()).collect();
    words.into_iter().collect::<Vec<_>>().join(" ")
}

impl From<bool> for ConfigNode {
    fn from(v: bool) -> Self {
        ConfigNode::Bool(v)
    }
}

impl From<i64> for ConfigNode {
    fn from(v: i64) -> Self {
        ConfigNode::Integer(v)
    }
}

impl From<i32> for ConfigNode {
    fn from(v: i32) -> Self {
        ConfigNode::Integer(i64::from(v))
    }
}

impl From<u32> for ConfigNode {
    fn from(v: u32) -> Self {
        ConfigNode::Integer(i64::from(v))
    }
}

impl From<&str> for ConfigNode {
    fn from(v: &str) -> Self {
        ConfigNode::String(v.to_string())
    }
}

impl From<String> for ConfigNode {
    fn from(v: String) -> Self {
        ConfigNode::String(v)
    }
}

impl From<Dict> for ConfigNode {
    fn from(v: Dict) -> Self {
        ConfigNode::Dict(v)
    }
}

impl From<Vec<ConfigNode>> for ConfigNode {
    fn from(v: Vec<ConfigNode>) -> Self {
        ConfigNode::List(v)
    }
}

impl From<DateTime<Utc>> for ConfigNode {
    fn from(v: DateTime<Utc>) -> Self {
        ConfigNode::date(v)
    }
}

/// Conversion from untyped JSON (custom profile overrides).
///
/// `{"$data": "<base64>"}` becomes a data node and `{"$date": "<rfc3339>"}` a
/// date node. `null` and non-integral numbers have no plist counterpart here
/// and are rejected rather than dropped.
impl TryFrom<serde_json::Value> for ConfigNode {
    type Error = SerializeError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;

        match value {
            Value::Null => Err(SerializeError::UnsupportedValueKind("null".to_string())),
            Value::Bool(b) => Ok(ConfigNode::Bool(b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(ConfigNode::Integer(i));
                }
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        Ok(ConfigNode::Integer(f as i64))
                    }
                    _ => Err(SerializeError::UnsupportedValueKind(format!("number {}", n))),
                }
            }
            Value::String(s) => Ok(ConfigNode::String(s)),
            Value::Array(items) => items
                .into_iter()
                .map(ConfigNode::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(ConfigNode::List),
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(Value::String(payload)) = map.get("$data") {
                        return Ok(ConfigNode::Data(payload.clone()));
                    }
                    if let Some(Value::String(stamp)) = map.get("$date") {
                        let parsed = DateTime::parse_from_rfc3339(stamp).map_err(|e| {
                            SerializeError::UnsupportedValueKind(format!("date '{}': {}", stamp, e))
                        })?;
                        return Ok(ConfigNode::date(parsed.with_timezone(&Utc)));
                    }
                }
                let mut dict = Dict::new();
                for (key, value) in map {
                    dict.insert(key, ConfigNode::try_from(value)?);
                }
                Ok(ConfigNode::Dict(dict))
            }
        }
    }
}

/// Insertion-ordered string-keyed map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dict {
    entries: Vec<(String, ConfigNode)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigNode>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigNode>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ConfigNode> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<ConfigNode> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &ConfigNode> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl IntoIterator for Dict {
    type Item = (String, ConfigNode);
    type IntoIter = std::vec::IntoIter<(String, ConfigNode)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>> FromIterator<(K, ConfigNode)> for Dict {
    fn from_iter<I: IntoIterator<Item = (K, ConfigNode)>>(iter: I) -> Self {
        let mut dict = Dict::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

/// Build a [`Dict`] from `key => value` pairs, keeping their order.
#[macro_export]
macro_rules! dict {
    () => { $crate::plist::Dict::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut d = $crate::plist::Dict::new();
        $( d.insert($key, $value); )+
        d
    }};
}
