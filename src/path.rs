//! Parsed access paths into JSON-like trees.
//!
//! A path such as `a.b[2].c` is parsed once into typed segments and then
//! walked with explicit presence checks. Writing through a path either
//! creates missing containers ([`PathMode::Vivify`]) or fails on the first
//! absent node ([`PathMode::Strict`]).

use std::{fmt, str::FromStr};

use serde_json::{Map, Value};
use smallvec::SmallVec;

/// Most `null` slots [`PathMode::Vivify`] pads an array with to reach an
/// index.
pub const MAX_PADDING: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// How [`DataPath::set`] treats missing intermediate nodes.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PathMode {
    /// Create empty objects, or arrays when the next segment is an index.
    #[default]
    Vivify,
    /// Fail with [`PathError::Missing`].
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("empty segment at byte {at} of `{path}`")]
    EmptySegment { path: String, at: usize },
    #[error("unclosed `[` at byte {at} of `{path}`")]
    UnclosedBracket { path: String, at: usize },
    #[error("invalid index `{index}` in `{path}`")]
    InvalidIndex { path: String, index: String },
    #[error("nothing at `{at}`")]
    Missing { at: String },
    #[error("`{at}` is not an object")]
    NotAnObject { at: String },
    #[error("`{at}` is not an array")]
    NotAnArray { at: String },
    #[error("`{at}` is too far past the end of an array of length {len}")]
    IndexOutOfRange { at: String, len: usize },
}

/// A validated path of [`Segment`]s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataPath {
    segments: SmallVec<[Segment; 4]>,
}

impl DataPath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }

        let mut segments = SmallVec::new();
        let bytes = path.as_bytes();
        let mut pos = 0;
        // true right after a `]`, where a bracket or a dot may follow directly
        let mut after_index = false;

        while pos < bytes.len() {
            match bytes[pos] {
                b'[' => {
                    let close = path[pos..]
                        .find(']')
                        .map(|offset| pos + offset)
                        .ok_or_else(|| PathError::UnclosedBracket {
                            path: path.to_string(),
                            at: pos,
                        })?;
                    let raw = &path[pos + 1..close];
                    let index = raw.parse::<usize>().map_err(|_| PathError::InvalidIndex {
                        path: path.to_string(),
                        index: raw.to_string(),
                    })?;
                    segments.push(Segment::Index(index));
                    pos = close + 1;
                    after_index = true;
                }
                b'.' => {
                    if !after_index {
                        return Err(PathError::EmptySegment {
                            path: path.to_string(),
                            at: pos,
                        });
                    }
                    pos += 1;
                    after_index = false;
                    if pos == bytes.len() || matches!(bytes[pos], b'.' | b'[') {
                        return Err(PathError::EmptySegment {
                            path: path.to_string(),
                            at: pos,
                        });
                    }
                }
                _ => {
                    if after_index {
                        // `a[0]b`
                        return Err(PathError::EmptySegment {
                            path: path.to_string(),
                            at: pos,
                        });
                    }
                    let end = path[pos..]
                        .find(['.', '['])
                        .map_or(bytes.len(), |offset| pos + offset);
                    let key = &path[pos..end];
                    if key.contains(']') {
                        return Err(PathError::InvalidIndex {
                            path: path.to_string(),
                            index: key.to_string(),
                        });
                    }
                    segments.push(Segment::Key(key.to_string()));
                    pos = end;
                    if pos < bytes.len() && bytes[pos] == b'.' {
                        pos += 1;
                        if pos == bytes.len() || matches!(bytes[pos], b'.' | b'[') {
                            return Err(PathError::EmptySegment {
                                path: path.to_string(),
                                at: pos,
                            });
                        }
                    }
                }
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The first segment when it is a key, used to pick the matching field
    /// out of a fetch result.
    pub fn first_key(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(key)) => Some(key),
            _ => None,
        }
    }

    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| match segment {
                Segment::Key(key) => node.as_object()?.get(key),
                Segment::Index(index) => node.as_array()?.get(*index),
            })
    }

    pub fn get_mut<'a>(&self, root: &'a mut Value) -> Option<&'a mut Value> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| match segment {
                Segment::Key(key) => node.as_object_mut()?.get_mut(key),
                Segment::Index(index) => node.as_array_mut()?.get_mut(*index),
            })
    }

    /// Writes `value` at this path, returning the previous value if there
    /// was one.
    pub fn set(
        &self,
        root: &mut Value,
        value: Value,
        mode: PathMode,
    ) -> Result<Option<Value>, PathError> {
        self.update(root, mode, |_| value)
    }

    /// Replaces the value at this path with `f(previous)`. `previous` is
    /// `None` when the terminal node is absent.
    pub fn update(
        &self,
        root: &mut Value,
        mode: PathMode,
        f: impl FnOnce(Option<&Value>) -> Value,
    ) -> Result<Option<Value>, PathError> {
        let Some((last, parents)) = self.segments.split_last() else {
            return Err(PathError::Empty);
        };

        let mut node = root;
        for (depth, segment) in parents.iter().enumerate() {
            let next = &self.segments[depth + 1];
            node = self.step(node, segment, depth, mode, Some(next))?;
        }

        let depth = parents.len();
        match last {
            Segment::Key(key) => {
                let object = node
                    .as_object_mut()
                    .ok_or_else(|| PathError::NotAnObject { at: self.prefix(depth) })?;
                if mode == PathMode::Strict && !object.contains_key(key) {
                    return Err(PathError::Missing { at: self.prefix(depth + 1) });
                }
                let next = f(object.get(key));
                Ok(object.insert(key.clone(), next))
            }
            Segment::Index(index) => {
                let array = node
                    .as_array_mut()
                    .ok_or_else(|| PathError::NotAnArray { at: self.prefix(depth) })?;
                if *index >= array.len() {
                    if mode == PathMode::Strict {
                        return Err(PathError::Missing { at: self.prefix(depth + 1) });
                    }
                    self.pad(array, *index, depth)?;
                    array[*index] = f(None);
                    return Ok(None);
                }
                let next = f(Some(&array[*index]));
                Ok(Some(std::mem::replace(&mut array[*index], next)))
            }
        }
    }

    fn step<'a>(
        &self,
        node: &'a mut Value,
        segment: &Segment,
        depth: usize,
        mode: PathMode,
        next: Option<&Segment>,
    ) -> Result<&'a mut Value, PathError> {
        let empty = || match next {
            Some(Segment::Index(_)) => Value::Array(Vec::new()),
            _ => Value::Object(Map::new()),
        };

        let child = match segment {
            Segment::Key(key) => {
                let object = node
                    .as_object_mut()
                    .ok_or_else(|| PathError::NotAnObject { at: self.prefix(depth) })?;
                if !object.contains_key(key) {
                    if mode == PathMode::Strict {
                        return Err(PathError::Missing { at: self.prefix(depth + 1) });
                    }
                    object.insert(key.clone(), empty());
                }
                object.get_mut(key)
            }
            Segment::Index(index) => {
                let array = node
                    .as_array_mut()
                    .ok_or_else(|| PathError::NotAnArray { at: self.prefix(depth) })?;
                if *index >= array.len() {
                    if mode == PathMode::Strict {
                        return Err(PathError::Missing { at: self.prefix(depth + 1) });
                    }
                    self.pad(array, *index, depth)?;
                }
                if array[*index].is_null() && mode == PathMode::Vivify {
                    array[*index] = empty();
                }
                array.get_mut(*index)
            }
        };
        child.ok_or_else(|| PathError::Missing { at: self.prefix(depth + 1) })
    }

    /// Grows `array` with `null`s so that `index` exists.
    fn pad(&self, array: &mut Vec<Value>, index: usize, depth: usize) -> Result<(), PathError> {
        let len = array.len();
        let new_len = index
            .checked_add(1)
            .filter(|new_len| new_len - len <= MAX_PADDING)
            .ok_or_else(|| PathError::IndexOutOfRange {
                at: self.prefix(depth + 1),
                len,
            })?;
        array.resize(new_len, Value::Null);
        Ok(())
    }

    fn prefix(&self, len: usize) -> String {
        if len == 0 {
            return "<root>".to_string();
        }
        DataPath {
            segments: self.segments.iter().take(len).cloned().collect(),
        }
        .to_string()
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 && matches!(segment, Segment::Key(_)) {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for DataPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_keys_and_indices() {
        let path = DataPath::parse("a.b[2].c").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Index(2),
                Segment::Key("c".into()),
            ]
        );
        assert_eq!(path.to_string(), "a.b[2].c");

        let nested = DataPath::parse("rows[0][1]").unwrap();
        assert_eq!(nested.segments().len(), 3);
        assert_eq!(nested.first_key(), Some("rows"));
    }

    #[test]
    fn parse_rejects_malformed_paths() {
        assert_eq!(DataPath::parse(""), Err(PathError::Empty));
        assert!(matches!(
            DataPath::parse("a..b"),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            DataPath::parse("a."),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            DataPath::parse(".a"),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            DataPath::parse("a[1"),
            Err(PathError::UnclosedBracket { .. })
        ));
        assert!(matches!(
            DataPath::parse("a[x]"),
            Err(PathError::InvalidIndex { .. })
        ));
        assert!(matches!(
            DataPath::parse("a[0]b"),
            Err(PathError::EmptySegment { .. })
        ));
    }

    #[test]
    fn vivify_creates_missing_objects() {
        let mut item = json!({});
        let path = DataPath::parse("a.b.c").unwrap();
        let prev = path.set(&mut item, json!(5), PathMode::Vivify).unwrap();
        assert_eq!(prev, None);
        assert_eq!(item, json!({ "a": { "b": { "c": 5 } } }));
        assert_eq!(path.get(&item), Some(&json!(5)));
    }

    #[test]
    fn vivify_creates_arrays_before_indices() {
        let mut item = json!({});
        DataPath::parse("tags[1].name")
            .unwrap()
            .set(&mut item, json!("x"), PathMode::Vivify)
            .unwrap();
        assert_eq!(item, json!({ "tags": [null, { "name": "x" }] }));
    }

    #[test]
    fn vivify_refuses_far_indices() {
        let mut item = json!({ "tags": ["a"] });
        for path in ["tags[18446744073709551615]", "tags[1000000000000]", "tags[5000].name"] {
            let err = DataPath::parse(path)
                .unwrap()
                .set(&mut item, json!(1), PathMode::Vivify)
                .unwrap_err();
            assert!(matches!(err, PathError::IndexOutOfRange { len: 1, .. }), "{path}");
        }
        assert_eq!(item, json!({ "tags": ["a"] }));

        // padding up to the cap is fine
        let path = format!("tags[{MAX_PADDING}]");
        DataPath::parse(&path)
            .unwrap()
            .set(&mut item, json!("z"), PathMode::Vivify)
            .unwrap();
        let tags = item["tags"].as_array().unwrap();
        assert_eq!(tags.len(), MAX_PADDING + 1);
        assert_eq!(tags[MAX_PADDING], json!("z"));
    }

    #[test]
    fn strict_fails_on_missing_intermediate() {
        let mut item = json!({ "a": {} });
        let err = DataPath::parse("a.b.c")
            .unwrap()
            .set(&mut item, json!(1), PathMode::Strict)
            .unwrap_err();
        assert_eq!(err, PathError::Missing { at: "a.b".into() });
        assert_eq!(item, json!({ "a": {} }));

        let mut item = json!({ "a": { "b": 1 } });
        let prev = DataPath::parse("a.b")
            .unwrap()
            .set(&mut item, json!(2), PathMode::Strict)
            .unwrap();
        assert_eq!(prev, Some(json!(1)));
    }

    #[test]
    fn type_mismatch_fails_in_both_modes() {
        let mut item = json!({ "a": [1, 2] });
        for mode in [PathMode::Vivify, PathMode::Strict] {
            let err = DataPath::parse("a.b")
                .unwrap()
                .set(&mut item, json!(1), mode)
                .unwrap_err();
            assert_eq!(err, PathError::NotAnObject { at: "a".into() });
        }
        let err = DataPath::parse("a[0][1]")
            .unwrap()
            .set(&mut item, json!(1), PathMode::Vivify)
            .unwrap_err();
        assert_eq!(err, PathError::NotAnArray { at: "a[0]".into() });
    }

    #[test]
    fn update_sees_previous_value() {
        let mut item = json!({ "stats": { "likes": 3 } });
        DataPath::parse("stats.likes")
            .unwrap()
            .update(&mut item, PathMode::Strict, |prev| {
                json!(prev.and_then(Value::as_i64).unwrap_or(0) + 1)
            })
            .unwrap();
        assert_eq!(item["stats"]["likes"], 4);
    }
}
