//! Dotted paths into JSON values
//!
//! A path such as `Reservations[].Instances[].InstanceId` reads values out of
//! a response, and a target such as `Filter.0.Key` writes a value into a
//! request, creating the intermediate objects and lists on the way.
//!
//! Syntax:
//! - `$` is the root value
//! - `.` separates segments
//! - a numeric segment indexes a list
//! - `name[]` (or a bare `[]`) projects every element of a list
//! - `*` is a placeholder replaced by an index before writing (batch items)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Largest list index a path may name
pub const MAX_INDEX: usize = 65_535;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Project,
    Wildcard,
}

/// Errors raised while parsing or writing through a path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("empty segment in `{0}'")]
    EmptySegment(String),
    #[error("unbalanced brackets in `{0}'")]
    Brackets(String),
    #[error("index in `{0}' exceeds {max}", max = MAX_INDEX)]
    IndexTooLarge(String),
    #[error("cannot write through `{path}': {reason}")]
    NotWritable { path: String, reason: &'static str },
}

/// A parsed path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    raw: String,
    segments: Vec<Segment>,
}

/// Result of reading a path: a single value, or one value per projected element
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    One(Value),
    Many(Vec<Value>),
}

impl Resolved {
    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }

    /// Flatten into a list; a single null becomes an empty list
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Self::One(Value::Null) => Vec::new(),
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

impl Path {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }

        let body = if trimmed == "$" {
            ""
        } else {
            trimmed.strip_prefix("$.").unwrap_or(trimmed)
        };

        let mut segments = Vec::new();
        if !body.is_empty() {
            for part in body.split('.') {
                if part.is_empty() {
                    return Err(PathError::EmptySegment(raw.to_string()));
                }
                if part == "*" {
                    segments.push(Segment::Wildcard);
                    continue;
                }
                if let Some(name) = part.strip_suffix("[]") {
                    if name.contains(['[', ']']) {
                        return Err(PathError::Brackets(raw.to_string()));
                    }
                    if !name.is_empty() {
                        segments.push(Segment::Key(name.to_string()));
                    }
                    segments.push(Segment::Project);
                    continue;
                }
                if part.contains(['[', ']']) {
                    return Err(PathError::Brackets(raw.to_string()));
                }
                if part.bytes().all(|b| b.is_ascii_digit()) {
                    match part.parse::<usize>() {
                        Ok(idx) if idx <= MAX_INDEX => segments.push(Segment::Index(idx)),
                        _ => return Err(PathError::IndexTooLarge(raw.to_string())),
                    }
                    continue;
                }
                segments.push(Segment::Key(part.to_string()));
            }
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    /// The `$` path
    pub fn root() -> Self {
        Self {
            raw: "$".to_string(),
            segments: Vec::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if reading this path yields one value per list element
    pub fn is_plural(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Project))
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Wildcard))
    }

    /// Leading key, used to check data paths against a shape
    pub fn first_key(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(key)) => Some(key),
            _ => None,
        }
    }

    /// Replace every `*` placeholder with `index`
    pub fn with_index(&self, index: usize) -> Self {
        let segments = self
            .segments
            .iter()
            .map(|s| match s {
                Segment::Wildcard => Segment::Index(index),
                other => other.clone(),
            })
            .collect();
        let raw = self
            .raw
            .split('.')
            .map(|p| if p == "*" { index.to_string() } else { p.to_string() })
            .collect::<Vec<_>>()
            .join(".");
        Self { raw, segments }
    }

    /// Read the value(s) at this path.
    ///
    /// Missing keys read as null. Once a projection is involved the result is
    /// a list and null elements are dropped.
    pub fn get(&self, root: &Value) -> Resolved {
        self.read(root, false)
    }

    /// Like [`Path::get`], but a projection keeps one slot per element:
    /// elements lacking the value read as null instead of being dropped, so
    /// paths over the same list line up by position.
    pub fn get_aligned(&self, root: &Value) -> Resolved {
        self.read(root, true)
    }

    fn read(&self, root: &Value, aligned: bool) -> Resolved {
        let mut current: Vec<&Value> = vec![root];
        let mut projected = false;

        for segment in &self.segments {
            current = match segment {
                Segment::Key(key) => current
                    .into_iter()
                    .filter_map(|v| slot(v.get(key.as_str()), aligned))
                    .collect(),
                Segment::Index(idx) => current
                    .into_iter()
                    .filter_map(|v| slot(v.get(*idx), aligned))
                    .collect(),
                Segment::Project | Segment::Wildcard => {
                    projected = true;
                    current
                        .into_iter()
                        .filter_map(|v| v.as_array())
                        .flatten()
                        .collect()
                }
            };
        }

        if projected {
            Resolved::Many(
                current
                    .into_iter()
                    .filter(|v| aligned || !v.is_null())
                    .cloned()
                    .collect(),
            )
        } else {
            Resolved::One(current.first().map(|v| (*v).clone()).unwrap_or(Value::Null))
        }
    }

    /// Write `value` at this path, creating objects and lists as needed.
    pub fn set(&self, root: &mut Value, value: Value) -> Result<(), PathError> {
        if self.is_plural() {
            return Err(self.not_writable("projections are read-only"));
        }
        if self.has_wildcard() {
            return Err(self.not_writable("`*' must be replaced by an index"));
        }

        let Some((last, parents)) = self.segments.split_last() else {
            *root = value;
            return Ok(());
        };

        let mut current = root;
        for segment in parents {
            current = match segment {
                Segment::Key(key) => {
                    let map = as_object(current)
                        .ok_or_else(|| self.not_writable("expected an object"))?;
                    map.entry(key.clone()).or_insert(Value::Null)
                }
                Segment::Index(idx) => {
                    let list = as_array(current)
                        .ok_or_else(|| self.not_writable("expected a list"))?;
                    self.grow(list, *idx)?;
                    &mut list[*idx]
                }
                Segment::Project | Segment::Wildcard => {
                    return Err(self.not_writable("unexpected placeholder"))
                }
            };
        }

        match last {
            Segment::Key(key) => {
                let map =
                    as_object(current).ok_or_else(|| self.not_writable("expected an object"))?;
                map.insert(key.clone(), value);
            }
            Segment::Index(idx) => {
                let list = as_array(current).ok_or_else(|| self.not_writable("expected a list"))?;
                self.grow(list, *idx)?;
                list[*idx] = value;
            }
            Segment::Project | Segment::Wildcard => {
                return Err(self.not_writable("unexpected placeholder"))
            }
        }

        Ok(())
    }

    /// Pad `list` with nulls until `idx` is in range
    fn grow(&self, list: &mut Vec<Value>, idx: usize) -> Result<(), PathError> {
        if list.len() <= idx {
            let len = idx
                .checked_add(1)
                .ok_or_else(|| self.not_writable("index out of range"))?;
            list.resize(len, Value::Null);
        }
        Ok(())
    }

    fn not_writable(&self, reason: &'static str) -> PathError {
        PathError::NotWritable {
            path: self.raw.clone(),
            reason,
        }
    }
}

static NULL: Value = Value::Null;

fn slot(found: Option<&Value>, aligned: bool) -> Option<&Value> {
    match found {
        Some(value) => Some(value),
        None if aligned => Some(&NULL),
        None => None,
    }
}

fn as_object(value: &mut Value) -> Option<&mut Map<String, Value>> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut()
}

fn as_array(value: &mut Value) -> Option<&mut Vec<Value>> {
    if value.is_null() {
        *value = Value::Array(Vec::new());
    }
    value.as_array_mut()
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.raw
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> Path {
        Path::parse(raw).unwrap()
    }

    #[test]
    fn test_get_nested_key() {
        let value = json!({"State": {"Name": "running"}});
        assert_eq!(path("State.Name").get(&value), Resolved::One(json!("running")));
    }

    #[test]
    fn test_get_missing_is_null() {
        let value = json!({"State": {}});
        assert_eq!(path("State.Name").get(&value), Resolved::One(Value::Null));
    }

    #[test]
    fn test_root_returns_whole_value() {
        let value = json!({"a": 1});
        assert_eq!(path("$").get(&value), Resolved::One(value.clone()));
        assert!(path("$").is_root());
    }

    #[test]
    fn test_projection_collects_each_element() {
        let value = json!({"Contents": [{"Key": "a"}, {"Key": "b"}, {"Size": 3}]});
        let resolved = path("Contents[].Key").get(&value);
        assert_eq!(resolved, Resolved::Many(vec![json!("a"), json!("b")]));
    }

    #[test]
    fn test_aligned_projection_keeps_gaps() {
        let value = json!({"Items": [{"A": "a1"}, {"B": "b2"}, {"A": "a3", "B": "b3"}]});
        assert_eq!(
            path("Items[].A").get_aligned(&value),
            Resolved::Many(vec![json!("a1"), Value::Null, json!("a3")])
        );
        assert_eq!(
            path("Items[].B").get_aligned(&value),
            Resolved::Many(vec![Value::Null, json!("b2"), json!("b3")])
        );
        assert_eq!(
            path("Items[].B").get(&value),
            Resolved::Many(vec![json!("b2"), json!("b3")])
        );
    }

    #[test]
    fn test_nested_projection_flattens() {
        let value = json!({
            "Reservations": [
                {"Instances": [{"InstanceId": "i-1"}, {"InstanceId": "i-2"}]},
                {"Instances": [{"InstanceId": "i-3"}]}
            ]
        });
        let ids = path("Reservations[].Instances[].InstanceId")
            .get(&value)
            .into_values();
        assert_eq!(ids, vec![json!("i-1"), json!("i-2"), json!("i-3")]);
    }

    #[test]
    fn test_projection_of_missing_list_is_empty() {
        let value = json!({});
        assert_eq!(path("Contents[]").get(&value), Resolved::Many(vec![]));
    }

    #[test]
    fn test_set_builds_nested_list() {
        let mut params = Value::Null;
        path("Filter.0.Key").set(&mut params, json!("tag:Name")).unwrap();
        assert_eq!(params, json!({"Filter": [{"Key": "tag:Name"}]}));
    }

    #[test]
    fn test_set_keeps_siblings() {
        let mut params = json!({"Bucket": "x"});
        path("Delete.Quiet").set(&mut params, json!(true)).unwrap();
        assert_eq!(params, json!({"Bucket": "x", "Delete": {"Quiet": true}}));
    }

    #[test]
    fn test_wildcard_with_index() {
        let target = path("Delete.Objects.*.Key");
        assert!(target.has_wildcard());
        let mut params = Value::Null;
        target.with_index(1).set(&mut params, json!("b")).unwrap();
        target.with_index(0).set(&mut params, json!("a")).unwrap();
        assert_eq!(params, json!({"Delete": {"Objects": [{"Key": "a"}, {"Key": "b"}]}}));
        assert_eq!(target.with_index(2).as_str(), "Delete.Objects.2.Key");
    }

    #[test]
    fn test_set_rejects_projection() {
        let mut params = Value::Null;
        assert!(path("Items[].Id").set(&mut params, json!(1)).is_err());
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut params = json!({"Bucket": "x"});
        assert!(matches!(
            path("Bucket.Name").set(&mut params, json!("y")),
            Err(PathError::NotWritable { .. })
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Path::parse(""), Err(PathError::Empty));
        assert!(matches!(Path::parse("a..b"), Err(PathError::EmptySegment(_))));
        assert!(matches!(Path::parse("a[0]"), Err(PathError::Brackets(_))));
    }

    #[test]
    fn test_parse_bounds_indexes() {
        assert!(Path::parse("Tags.65535.Key").is_ok());
        assert!(matches!(
            Path::parse("Tags.65536.Key"),
            Err(PathError::IndexTooLarge(_))
        ));
        assert!(matches!(
            Path::parse("Tags.18446744073709551615.Key"),
            Err(PathError::IndexTooLarge(_))
        ));
        assert!(matches!(
            Path::parse("Tags.99999999999999999999999.Key"),
            Err(PathError::IndexTooLarge(_))
        ));
    }

    #[test]
    fn test_set_at_index_past_usize_fails_cleanly() {
        let target = path("Tags.*.Key").with_index(usize::MAX);
        let mut params = Value::Null;
        assert!(matches!(
            target.set(&mut params, json!("k")),
            Err(PathError::NotWritable { .. })
        ));
    }

    #[test]
    fn test_first_key_and_plural() {
        assert_eq!(path("State.Name").first_key(), Some("State"));
        assert!(path("Contents[].Key").is_plural());
        assert!(!path("Contents.0.Key").is_plural());
    }

    #[test]
    fn test_deserialize_from_string() {
        let parsed: Path = serde_json::from_value(json!("Contents[].Key")).unwrap();
        assert!(parsed.is_plural());
        assert!(serde_json::from_value::<Path>(json!("a..b")).is_err());
    }
}
