//! Flattening of JSON documents into key paths.
//!
//! A nested document such as:
//!
//! ```json
//! {
//!   "worker": {
//!     "enabled": true,
//!     "ports": [80, 443],
//!     "extra": {}
//!   }
//! }
//! ```
//!
//! is flattened into the following entries, in document order:
//!
//! | key              | value    |
//! |------------------|----------|
//! | `worker.enabled` | `true`   |
//! | `worker.ports.0` | `80`     |
//! | `worker.ports.1` | `443`    |
//! | `worker.extra`   | (absent) |
//!
//! Every scalar is stored in its canonical string form. Numbers keep every digit as written, without redundant zeros or
//! exponents, so `1.50e1` becomes `15`. Empty objects and `null` values are recorded with the absent marker so that a
//! key which exists without a value can be told apart from a key which does not exist.
//!
//! Documents may contain `//` and `/* */` comments and trailing commas.

use std::{fmt, io::Read as _};

use json_comments::StripComments;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value};
use snafu::{ensure, ResultExt as _};
use tracing::debug;

use crate::{
    errors::{DuplicateKey, FormatError, InvalidJson, RootNotObject},
    snapshot::{Snapshot, KEY_DELIMITER},
};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// Map key under which `serde_json` hands over the literal text of a number.
const NUMBER_TOKEN: &str = "$serde_json::private::Number";

// Longest run of zeros added when writing a number out in plain notation.
const MAX_ZERO_PADDING: usize = 32;

/// A parsed JSON value.
///
/// Unlike `serde_json::Value`, object members are kept as an ordered list so that repeated member names survive
/// parsing and can be reported as duplicates.
enum Node {
    Null,
    Bool(bool),
    Number(String),
    String(String),
    Array(Vec<Node>),
    Object(Vec<(String, Node)>),
}

impl Node {
    fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "boolean",
            Node::Number(_) => "number",
            Node::String(_) => "string",
            Node::Array(_) => "array",
            Node::Object(_) => "object",
        }
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an object, array, string, number, boolean or null")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Node, E> {
        Ok(Node::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Node, E> {
        Ok(Node::Number(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Node, E> {
        Ok(Node::Number(v.to_string()))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<Node, E> {
        Ok(Node::Number(v.to_string()))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Node, E> {
        Ok(Node::Number(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Node, E> {
        Ok(Node::Number(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Node, E> {
        Ok(Node::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Node, E> {
        Ok(Node::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Node, D::Error>
    where
        D: Deserializer<'de>,
    {
        Node::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Node, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut elements = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(element) = seq.next_element()? {
            elements.push(element);
        }
        Ok(Node::Array(elements))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Node, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut members = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(name) = map.next_key::<String>()? {
            if members.is_empty() && name == NUMBER_TOKEN {
                let literal = map.next_value::<String>()?;
                return Ok(Node::Number(canonical_number(&literal)));
            }

            let value = map.next_value()?;
            members.push((name, value));
        }
        Ok(Node::Object(members))
    }
}

/// Rewrites a JSON number literal in plain decimal notation without redundant zeros.
///
/// No digit is ever dropped: a literal whose plain form would need an excessive number of padding zeros, such as
/// `1e400`, is kept as written.
fn canonical_number(literal: &str) -> String {
    decimal_parts(literal)
        .and_then(|(negative, digits, exponent)| render_plain(negative, &digits, exponent))
        .unwrap_or_else(|| literal.to_string())
}

/// Splits a number literal into its sign, significant digits and power-of-ten exponent.
fn decimal_parts(literal: &str) -> Option<(bool, String, i64)> {
    let (negative, unsigned) = match literal.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, literal),
    };
    let (mantissa, exponent) = match unsigned.find(|c| c == 'e' || c == 'E') {
        Some(idx) => (&unsigned[..idx], unsigned[idx + 1..].parse::<i64>().ok()?),
        None => (unsigned, 0),
    };
    let (integer, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if integer.is_empty() || !integer.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let exponent = exponent.checked_sub(i64::try_from(fraction.len()).ok()?)?;
    Some((negative, format!("{}{}", integer, fraction), exponent))
}

fn render_plain(negative: bool, digits: &str, exponent: i64) -> Option<String> {
    let digits = digits.trim_start_matches('0');
    let significant = digits.trim_end_matches('0');
    let exponent = exponent.checked_add(i64::try_from(digits.len() - significant.len()).ok()?)?;
    if significant.is_empty() {
        return Some("0".to_string());
    }

    let sign = if negative { "-" } else { "" };
    if exponent >= 0 {
        let zeros = usize::try_from(exponent).ok().filter(|z| *z <= MAX_ZERO_PADDING)?;
        return Some(format!("{}{}{}", sign, significant, "0".repeat(zeros)));
    }

    let scale = usize::try_from(exponent.unsigned_abs()).ok()?;
    if scale < significant.len() {
        let (integer, fraction) = significant.split_at(significant.len() - scale);
        Some(format!("{}{}.{}", sign, integer, fraction))
    } else {
        let zeros = scale - significant.len();
        if zeros > MAX_ZERO_PADDING {
            return None;
        }
        Some(format!("{}0.{}{}", sign, "0".repeat(zeros), significant))
    }
}

/// Blanks out commas that directly precede a closing `}` or `]`.
///
/// Comments must already have been stripped.
fn remove_trailing_commas(document: &mut [u8]) {
    let mut trailing = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &b) in document.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b',' => {
                let next = document[idx + 1..].iter().find(|b| !b.is_ascii_whitespace());
                if matches!(next, Some(b'}' | b']')) {
                    trailing.push(idx);
                }
            }
            _ => {}
        }
    }

    for idx in trailing {
        document[idx] = b' ';
    }
}

/// A path to a value within a document.
///
/// Each descent produces a new path rather than mutating a shared one, so traversal carries no state beyond the
/// current prefix.
#[derive(Clone, Debug, Default)]
struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    fn root() -> Self {
        Self::default()
    }

    fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    fn push(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    fn to_key(&self) -> String {
        self.segments.join(KEY_DELIMITER)
    }
}

/// Parses a JSON document into a flat snapshot.
///
/// A leading UTF-8 byte order mark, comments and trailing commas are ignored.
///
/// # Errors
///
/// If the document is not valid JSON, if its root is not an object, or if two values resolve to the same key path
/// (compared without regard to case), an error is returned.
pub fn parse(document: &[u8]) -> Result<Snapshot, FormatError> {
    let document = document.strip_prefix(UTF8_BOM).unwrap_or(document);

    let mut stripped = Vec::with_capacity(document.len());
    StripComments::new(document)
        .read_to_end(&mut stripped)
        .map_err(serde_json::Error::io)
        .context(InvalidJson)?;
    remove_trailing_commas(&mut stripped);

    let root: Node = serde_json::from_slice(&stripped).context(InvalidJson)?;
    flatten_root(root)
}

/// Flattens an already-decoded JSON value.
///
/// # Errors
///
/// If the value is not an object, or if two values resolve to the same key path (compared without regard to case), an
/// error is returned.
pub fn flatten_value(value: Value) -> Result<Snapshot, FormatError> {
    let root: Node = serde_json::from_value(value).context(InvalidJson)?;
    flatten_root(root)
}

fn flatten_root(root: Node) -> Result<Snapshot, FormatError> {
    let members = match root {
        Node::Object(members) => members,
        other => return RootNotObject { found: other.kind() }.fail(),
    };

    let mut data = Snapshot::new();
    visit_object(&KeyPath::root(), members, &mut data)?;
    Ok(data)
}

fn visit_object(path: &KeyPath, members: Vec<(String, Node)>, data: &mut Snapshot) -> Result<(), FormatError> {
    if members.is_empty() {
        if !path.is_root() {
            record(path, None, data)?;
        }
        return Ok(());
    }

    for (name, value) in members {
        visit_value(&path.push(&name), value, data)?;
    }

    Ok(())
}

fn visit_value(path: &KeyPath, value: Node, data: &mut Snapshot) -> Result<(), FormatError> {
    match value {
        Node::Object(members) => visit_object(path, members, data),
        Node::Array(elements) => {
            for (index, element) in elements.into_iter().enumerate() {
                visit_value(&path.push(&index.to_string()), element, data)?;
            }
            Ok(())
        }
        Node::Null => record(path, None, data),
        Node::Bool(b) => record(path, Some(b.to_string()), data),
        Node::Number(n) | Node::String(n) => record(path, Some(n), data),
    }
}

fn record(path: &KeyPath, value: Option<String>, data: &mut Snapshot) -> Result<(), FormatError> {
    let key = path.to_key();
    ensure!(data.try_insert(key.as_str(), value), DuplicateKey { key });
    Ok(())
}

/// Reconstructs a nested JSON object from a flat snapshot.
///
/// Values are emitted as JSON strings, and the absent marker as `null`. Objects whose members are exactly the indexes
/// `0..n` are emitted as arrays. Path segments that differ only by case are merged under the first spelling seen.
///
/// A key whose parent path already holds a scalar value cannot be nested and is skipped.
pub fn unflatten(snapshot: &Snapshot) -> Value {
    let mut root = Map::new();
    for (key, value) in snapshot.iter() {
        if !insert_nested(&mut root, key, value) {
            debug!(key, "Skipping configuration key which conflicts with a scalar value at a parent path.");
        }
    }

    arrays_from_indexes(Value::Object(root))
}

fn insert_nested(root: &mut Map<String, Value>, key: &str, value: Option<&str>) -> bool {
    let segments = key.split(KEY_DELIMITER).collect::<Vec<_>>();
    let Some((leaf, parents)) = segments.split_last() else {
        return false;
    };

    let mut current = root;
    for segment in parents {
        let existing_key = existing_key_ignore_case(current, segment);
        let entry = current
            .entry(existing_key)
            .or_insert_with(|| Value::Object(Map::new()));

        // An absent value at a parent path can be promoted to an object without losing anything.
        if entry.is_null() {
            *entry = Value::Object(Map::new());
        }

        match entry {
            Value::Object(map) => current = map,
            _ => return false,
        }
    }

    let leaf_key = existing_key_ignore_case(current, leaf);
    if matches!(current.get(&leaf_key), Some(Value::Object(map)) if !map.is_empty()) {
        return false;
    }

    let value = value.map_or(Value::Null, |v| Value::String(v.to_string()));
    current.insert(leaf_key, value);
    true
}

fn existing_key_ignore_case(map: &Map<String, Value>, segment: &str) -> String {
    map.keys()
        .find(|key| key.to_lowercase() == segment.to_lowercase())
        .cloned()
        .unwrap_or_else(|| segment.to_string())
}

fn arrays_from_indexes(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut indexed = map
                .iter()
                .map(|(key, _)| parse_index(key))
                .collect::<Option<Vec<_>>>()
                .unwrap_or_default();
            indexed.sort_unstable();

            let is_array = !indexed.is_empty() && indexed.iter().enumerate().all(|(i, index)| i == *index);
            if is_array {
                let mut elements = map
                    .into_iter()
                    .filter_map(|(key, value)| parse_index(&key).map(|index| (index, arrays_from_indexes(value))))
                    .collect::<Vec<_>>();
                elements.sort_unstable_by_key(|(index, _)| *index);
                Value::Array(elements.into_iter().map(|(_, value)| value).collect())
            } else {
                Value::Object(
                    map.into_iter()
                        .map(|(key, value)| (key, arrays_from_indexes(value)))
                        .collect(),
                )
            }
        }
        other => other,
    }
}

fn parse_index(segment: &str) -> Option<usize> {
    // Only canonical decimal indexes: `01` is a member name, not an index.
    if segment.len() > 1 && segment.starts_with('0') {
        return None;
    }
    if !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn entries(snapshot: &Snapshot) -> Vec<(String, Option<String>)> {
        snapshot
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    fn entry(key: &str, value: Option<&str>) -> (String, Option<String>) {
        (key.to_string(), value.map(str::to_string))
    }

    #[test]
    fn flattens_nested_objects_in_document_order() {
        let document = br#"{
            "WorkerSettings": {
                "Prop1": "value",
                "IsEnabled": true,
                "NestedSettings": { "Prop2": 42, "Ratio": 0.5, "Missing": null }
            },
            "Top": false
        }"#;

        let snapshot = parse(document).unwrap();
        assert_eq!(
            entries(&snapshot),
            vec![
                entry("WorkerSettings.Prop1", Some("value")),
                entry("WorkerSettings.IsEnabled", Some("true")),
                entry("WorkerSettings.NestedSettings.Prop2", Some("42")),
                entry("WorkerSettings.NestedSettings.Ratio", Some("0.5")),
                entry("WorkerSettings.NestedSettings.Missing", None),
                entry("Top", Some("false")),
            ]
        );
    }

    #[test]
    fn flattens_arrays_by_index() {
        let snapshot = parse(br#"{"a": [1, 2]}"#).unwrap();
        assert_eq!(entries(&snapshot), vec![entry("a.0", Some("1")), entry("a.1", Some("2"))]);

        let snapshot = parse(br#"{"a": [{"b": "x"}, ["y"]]}"#).unwrap();
        assert_eq!(entries(&snapshot), vec![entry("a.0.b", Some("x")), entry("a.1.0", Some("y"))]);
    }

    #[test]
    fn empty_object_records_absent_marker() {
        let snapshot = parse(br#"{"a": {}}"#).unwrap();
        assert_eq!(entries(&snapshot), vec![entry("a", None)]);
        assert_eq!(snapshot.get("a"), Some(None));
    }

    #[test]
    fn empty_root_yields_no_entries() {
        let snapshot = parse(b"{}").unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn numbers_use_minimal_form() {
        let snapshot = parse(br#"{"a": 1.0, "b": -7, "c": 18446744073709551615, "d": 1.25e2}"#).unwrap();
        assert_eq!(snapshot.get("a"), Some(Some("1")));
        assert_eq!(snapshot.get("b"), Some(Some("-7")));
        assert_eq!(snapshot.get("c"), Some(Some("18446744073709551615")));
        assert_eq!(snapshot.get("d"), Some(Some("125")));
    }

    #[test]
    fn numbers_keep_every_digit() {
        let snapshot = parse(
            br#"{
                "big": 12345678901234567890123,
                "pi": 3.14159265358979323846264,
                "id": 9007199254740993.0,
                "small": -0.000125,
                "scaled": 2.50E+1,
                "huge": 1e400,
                "zero": -0.0
            }"#,
        )
        .unwrap();

        assert_eq!(snapshot.get("big"), Some(Some("12345678901234567890123")));
        assert_eq!(snapshot.get("pi"), Some(Some("3.14159265358979323846264")));
        assert_eq!(snapshot.get("id"), Some(Some("9007199254740993")));
        assert_eq!(snapshot.get("small"), Some(Some("-0.000125")));
        assert_eq!(snapshot.get("scaled"), Some(Some("25")));
        assert_eq!(snapshot.get("huge"), Some(Some("1e+400")));
        assert_eq!(snapshot.get("zero"), Some(Some("0")));
    }

    #[test]
    fn comments_are_ignored() {
        let document = br#"{
            // Line comment.
            "a": 1, /* block
            comment */ "b": "// not a comment",
            "c": "/* nor this */"
        }"#;

        let snapshot = parse(document).unwrap();
        assert_eq!(snapshot.get("a"), Some(Some("1")));
        assert_eq!(snapshot.get("b"), Some(Some("// not a comment")));
        assert_eq!(snapshot.get("c"), Some(Some("/* nor this */")));
    }

    #[test]
    fn trailing_commas_are_ignored() {
        let snapshot = parse(b"{\n // comment\n \"a\": 1,\n}").unwrap();
        assert_eq!(entries(&snapshot), vec![entry("a", Some("1"))]);

        let snapshot = parse(br#"{"a": [1, 2, ], "b": {"c": ",]", }, }"#).unwrap();
        assert_eq!(
            entries(&snapshot),
            vec![entry("a.0", Some("1")), entry("a.1", Some("2")), entry("b.c", Some(",]"))]
        );

        // Trailing commas do not relax duplicate detection.
        assert!(matches!(
            parse(br#"{"a": 1, "a": 2,}"#).unwrap_err(),
            FormatError::DuplicateKey { .. }
        ));
        assert!(matches!(parse(b"[1,,]").unwrap_err(), FormatError::InvalidJson { .. }));
    }

    #[test]
    fn leading_byte_order_mark_is_ignored() {
        let mut document = UTF8_BOM.to_vec();
        document.extend_from_slice(br#"{"a": "b"}"#);

        let snapshot = parse(&document).unwrap();
        assert_eq!(snapshot.get("a"), Some(Some("b")));
    }

    #[test]
    fn duplicate_member_is_rejected() {
        let error = parse(br#"{"a": 1, "a": 2}"#).unwrap_err();
        assert!(matches!(error, FormatError::DuplicateKey { ref key } if key == "a"));
    }

    #[test]
    fn duplicate_ignoring_case_is_rejected() {
        let error = parse(br#"{"Worker": {"Enabled": true}, "worker": {"enabled": false}}"#).unwrap_err();
        assert!(matches!(error, FormatError::DuplicateKey { ref key } if key == "worker.enabled"));
    }

    #[test]
    fn colliding_paths_are_rejected() {
        // A dotted member name lands on the same path as a nested member.
        let error = parse(br#"{"a": {"b": 1}, "a.b": 2}"#).unwrap_err();
        assert!(matches!(error, FormatError::DuplicateKey { ref key } if key == "a.b"));
    }

    #[test]
    fn non_object_root_is_rejected() {
        for (document, found) in [
            (&b"[1, 2]"[..], "array"),
            (b"\"text\"", "string"),
            (b"3", "number"),
            (b"null", "null"),
        ] {
            let error = parse(document).unwrap_err();
            assert!(matches!(error, FormatError::RootNotObject { found: f } if f == found));
        }
    }

    #[test]
    fn flattens_decoded_values() {
        let snapshot = flatten_value(json!({"Worker": {"Name": "w", "Ports": [80, 443]}})).unwrap();
        assert_eq!(
            entries(&snapshot),
            vec![
                entry("Worker.Name", Some("w")),
                entry("Worker.Ports.0", Some("80")),
                entry("Worker.Ports.1", Some("443")),
            ]
        );

        assert!(matches!(
            flatten_value(json!(["a"])).unwrap_err(),
            FormatError::RootNotObject { found: "array" }
        ));
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(matches!(parse(b"{\"a\": ").unwrap_err(), FormatError::InvalidJson { .. }));
        assert!(matches!(parse(b"").unwrap_err(), FormatError::InvalidJson { .. }));
    }

    #[test]
    fn unflatten_rebuilds_nesting_and_arrays() {
        let snapshot = parse(br#"{"a": {"b": [true, {"c": null}], "d": {}}, "e": "f"}"#).unwrap();

        assert_eq!(
            unflatten(&snapshot),
            json!({
                "a": { "b": ["true", { "c": null }], "d": null },
                "e": "f",
            })
        );
    }

    #[test]
    fn unflatten_merges_segments_ignoring_case() {
        let snapshot = Snapshot::from_iter([
            ("Worker.Prop1", Some("a")),
            ("worker.Prop2", Some("b")),
            ("WORKER.nested.0", Some("c")),
        ]);

        assert_eq!(
            unflatten(&snapshot),
            json!({ "Worker": { "Prop1": "a", "Prop2": "b", "nested": ["c"] } })
        );
    }

    #[test]
    fn unflatten_skips_keys_below_scalars() {
        let snapshot = Snapshot::from_iter([("a", Some("1")), ("a.b", Some("2"))]);
        assert_eq!(unflatten(&snapshot), json!({ "a": "1" }));

        let snapshot = Snapshot::from_iter([("a", None), ("a.b", Some("2"))]);
        assert_eq!(unflatten(&snapshot), json!({ "a": { "b": "2" } }));
    }

    #[test]
    fn sparse_or_non_canonical_indexes_stay_objects() {
        let snapshot = Snapshot::from_iter([("a.0", Some("x")), ("a.2", Some("y")), ("b.01", Some("z"))]);
        assert_eq!(
            unflatten(&snapshot),
            json!({ "a": { "0": "x", "2": "y" }, "b": { "01": "z" } })
        );
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            (-1.0e6f64..1.0e6f64).prop_map(|n| json!(n)),
            "[ -~]{0,8}".prop_map(Value::String),
        ];

        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,6}", inner, 0..5)
                    .prop_map(|members| Value::Object(members.into_iter().collect())),
            ]
        })
    }

    fn arb_document() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-z_]{1,6}", arb_json(), 0..6)
            .prop_map(|members| Value::Object(members.into_iter().collect()))
    }

    proptest! {
        #[test]
        fn property_flatten_round_trip(document in arb_document()) {
            let first = parse(&serde_json::to_vec(&document).unwrap()).unwrap();
            let rebuilt = unflatten(&first);
            let second = parse(&serde_json::to_vec(&rebuilt).unwrap()).unwrap();

            prop_assert_eq!(first, second);
        }
    }
}
