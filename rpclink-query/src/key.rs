//! Cache keys.
//!
//! A query key serializes as `[path]` or `[path, {"input": .., "type": ..}]`,
//! the shape the query cache uses for prefix matching and hashing. Keys built
//! for the same path and structurally equal input always hash the same.

use rpclink_core::split_path;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Input fields that page through an infinite query and never belong in
/// its cache key.
const PAGING_FIELDS: [&str; 2] = ["cursor", "direction"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Query,
    Infinite,
    /// Matches both; never written into a key.
    Any,
}

/// Sentinel input meaning "do not run this fetch".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SkipToken;

/// Procedure input, or the skip sentinel.
///
/// Only [`SkipToken`] converts implicitly; wrap real inputs in
/// [`Input::Value`]. An input that serializes to `null` counts as no input.
#[derive(Debug, Clone, PartialEq)]
pub enum Input<I> {
    Value(I),
    Skip,
}

impl<I> Input<I> {
    pub fn is_skip(&self) -> bool {
        matches!(self, Input::Skip)
    }

    pub fn as_value(&self) -> Option<&I> {
        match self {
            Input::Value(value) => Some(value),
            Input::Skip => None,
        }
    }
}

impl Input<Value> {
    /// No input at all.
    pub fn none() -> Self {
        Input::Value(Value::Null)
    }
}

impl From<Value> for Input<Value> {
    fn from(value: Value) -> Self {
        Input::Value(value)
    }
}

impl<I> From<SkipToken> for Input<I> {
    fn from(_: SkipToken) -> Self {
        Input::Skip
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryKey {
    path: Vec<String>,
    input: Option<Value>,
    kind: Option<QueryType>,
}

impl QueryKey {
    /// Key for `path`, adding `{input}` when an input is given and `{type}`
    /// for any type other than [`QueryType::Any`]. Dotted segments are split.
    pub fn new<S: AsRef<str>>(path: &[S], input: Option<Value>, kind: QueryType) -> Self {
        let path = path
            .iter()
            .flat_map(|segment| split_path(segment.as_ref()))
            .collect();
        let input = match (kind, input) {
            (QueryType::Infinite, Some(Value::Object(mut fields))) => {
                for field in PAGING_FIELDS {
                    fields.remove(field);
                }
                Some(Value::Object(fields))
            }
            (_, input) => input,
        };
        QueryKey {
            path,
            input,
            kind: (kind != QueryType::Any).then_some(kind),
        }
    }

    /// `[path]`: matches every query below `path`.
    pub fn for_path<S: AsRef<str>>(path: &[S]) -> Self {
        Self::new(path, None, QueryType::Any)
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn input(&self) -> Option<&Value> {
        self.input.as_ref()
    }

    pub fn kind(&self) -> QueryType {
        self.kind.unwrap_or(QueryType::Any)
    }

    /// Whether `filter` selects this key: its path is a prefix of ours, its
    /// input (if any) partially matches ours and its type (if any) is ours.
    pub fn matches(&self, filter: &QueryKey) -> bool {
        if !self.path.starts_with(&filter.path) {
            return false;
        }
        if let Some(kind) = filter.kind {
            if self.kind != Some(kind) {
                return false;
            }
        }
        match (&filter.input, &self.input) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(wanted), Some(actual)) => partial_match(actual, wanted),
        }
    }

    /// Stable hash string: the serialized key with object fields sorted.
    pub fn hash_key(&self) -> String {
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        canonical(&value).to_string()
    }
}

/// `wanted` is contained in `actual`: every object field and array element of
/// `wanted` is present in `actual` and matches recursively.
pub fn partial_match(actual: &Value, wanted: &Value) -> bool {
    match (actual, wanted) {
        (Value::Object(actual), Value::Object(wanted)) => wanted.iter().all(|(name, value)| {
            actual
                .get(name)
                .is_some_and(|present| partial_match(present, value))
        }),
        (Value::Array(actual), Value::Array(wanted)) => {
            wanted.len() <= actual.len()
                && wanted
                    .iter()
                    .zip(actual)
                    .all(|(wanted, actual)| partial_match(actual, wanted))
        }
        (actual, wanted) => actual == wanted,
    }
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut names: Vec<&String> = fields.keys().collect();
            names.sort();
            let mut sorted = Map::new();
            for name in names {
                sorted.insert(name.clone(), canonical(&fields[name]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

#[derive(Serialize, Deserialize)]
struct KeyOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input: Option<Value>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<QueryType>,
}

impl Serialize for QueryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let has_options = self.input.is_some() || self.kind.is_some();
        let mut seq = serializer.serialize_seq(Some(if has_options { 2 } else { 1 }))?;
        seq.serialize_element(&self.path)?;
        if has_options {
            seq.serialize_element(&KeyOptions {
                input: self.input.clone(),
                kind: self.kind,
            })?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for QueryKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = QueryKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("[path] or [path, {input, type}]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<QueryKey, A::Error> {
                let path: Vec<String> = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let options: Option<KeyOptions> = seq.next_element()?;
                if seq.next_element::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(3, &self));
                }
                let (input, kind) = options
                    .map(|options| (options.input, options.kind))
                    .unwrap_or((None, None));
                Ok(QueryKey {
                    path,
                    input,
                    kind: kind.filter(|kind| *kind != QueryType::Any),
                })
            }
        }

        deserializer.deserialize_seq(KeyVisitor)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash_key())
    }
}

/// `[path]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationKey(pub Vec<Vec<String>>);

impl MutationKey {
    pub fn new<S: AsRef<str>>(path: &[S]) -> Self {
        MutationKey(vec![path
            .iter()
            .flat_map(|segment| split_path(segment.as_ref()))
            .collect()])
    }

    pub fn path(&self) -> &[String] {
        self.0.first().map(Vec::as_slice).unwrap_or_default()
    }
}

/// A set of cached queries, as passed to invalidation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
    pub query_key: QueryKey,
    /// Only the key itself, not keys below it.
    pub exact: bool,
}

impl QueryFilter {
    pub fn new(query_key: QueryKey) -> Self {
        QueryFilter {
            query_key,
            exact: false,
        }
    }

    pub fn exact(query_key: QueryKey) -> Self {
        QueryFilter {
            query_key,
            exact: true,
        }
    }

    /// Every cached query.
    pub fn all() -> Self {
        Self::new(QueryKey::for_path::<&str>(&[]))
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        if self.exact {
            key.hash_key() == self.query_key.hash_key()
        } else {
            key.matches(&self.query_key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_shapes() {
        let path = ["posts", "list"];
        assert_eq!(
            serde_json::to_value(QueryKey::new(&path, None, QueryType::Any)).unwrap(),
            json!([["posts", "list"]])
        );
        assert_eq!(
            serde_json::to_value(QueryKey::new(&path, Some(json!({"limit": 10})), QueryType::Any))
                .unwrap(),
            json!([["posts", "list"], {"input": {"limit": 10}}])
        );
        assert_eq!(
            serde_json::to_value(QueryKey::new(&path, Some(json!({"limit": 10})), QueryType::Query))
                .unwrap(),
            json!([["posts", "list"], {"input": {"limit": 10}, "type": "query"}])
        );
        assert_eq!(
            serde_json::to_value(QueryKey::new(&path, None, QueryType::Infinite)).unwrap(),
            json!([["posts", "list"], {"type": "infinite"}])
        );
    }

    #[test]
    fn test_dotted_segments_split() {
        let key = QueryKey::new(&["posts.byId"], None, QueryType::Any);
        assert_eq!(key.path(), ["posts", "byId"]);
        assert_eq!(MutationKey::new(&["posts.create"]).path(), ["posts", "create"]);
        assert_eq!(
            serde_json::to_value(MutationKey::new(&["posts", "create"])).unwrap(),
            json!([["posts", "create"]])
        );
    }

    #[test]
    fn test_infinite_key_drops_paging_fields() {
        let key = QueryKey::new(
            &["posts", "list"],
            Some(json!({"limit": 10, "cursor": 5, "direction": "forward"})),
            QueryType::Infinite,
        );
        assert_eq!(key.input(), Some(&json!({"limit": 10})));
    }

    #[test]
    fn test_prefix_and_partial_matching() {
        let full = QueryKey::new(
            &["posts", "byId"],
            Some(json!({"id": 1, "include": ["author", "tags"]})),
            QueryType::Query,
        );

        assert!(full.matches(&QueryKey::for_path(&["posts"])));
        assert!(full.matches(&QueryKey::new(&["posts", "byId"], Some(json!({"id": 1})), QueryType::Any)));
        assert!(full.matches(&QueryKey::new(
            &["posts", "byId"],
            Some(json!({"include": ["author"]})),
            QueryType::Query
        )));
        assert!(!full.matches(&QueryKey::new(&["posts", "byId"], Some(json!({"id": 2})), QueryType::Any)));
        assert!(!full.matches(&QueryKey::new(&["posts", "byId"], None, QueryType::Infinite)));
        assert!(!full.matches(&QueryKey::for_path(&["users"])));
    }

    #[test]
    fn test_hash_ignores_field_order() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": 1}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 1, "y": 2}, "b": 1}"#).unwrap();
        let key_a = QueryKey::new(&["p"], Some(a), QueryType::Query);
        let key_b = QueryKey::new(&["p"], Some(b), QueryType::Query);
        assert_eq!(key_a.hash_key(), key_b.hash_key());
        assert_eq!(key_a.hash_key(), r#"[["p"],{"input":{"a":{"x":1,"y":2},"b":1},"type":"query"}]"#);
    }

    #[test]
    fn test_key_deserializes() {
        let key: QueryKey =
            serde_json::from_value(json!([["posts", "list"], {"input": {"limit": 10}}])).unwrap();
        assert_eq!(key, QueryKey::new(&["posts", "list"], Some(json!({"limit": 10})), QueryType::Any));

        let key: QueryKey = serde_json::from_value(json!([["posts"]])).unwrap();
        assert_eq!(key, QueryKey::for_path(&["posts"]));

        assert!(serde_json::from_value::<QueryKey>(json!([])).is_err());
    }

    #[test]
    fn test_filters() {
        let key = QueryKey::new(&["posts", "list"], Some(json!({"limit": 10})), QueryType::Query);
        assert!(QueryFilter::all().matches(&key));
        assert!(QueryFilter::new(QueryKey::for_path(&["posts"])).matches(&key));
        assert!(!QueryFilter::exact(QueryKey::for_path(&["posts", "list"])).matches(&key));
        assert!(QueryFilter::exact(key.clone()).matches(&key));
    }

    #[test]
    fn test_skip_token_converts() {
        let input: Input<Value> = SkipToken.into();
        assert!(input.is_skip());
        assert_eq!(Input::none().as_value(), Some(&Value::Null));
    }
}
