// Record model: ids, partitions, update timestamps, field values and object naming
use crate::constants;
use crate::error::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

// ============================================================================
// Record Ids
// ============================================================================

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(
            "^{}[0-9]{{{}}}$",
            constants::ID_PREFIX,
            constants::ID_DIGITS
        ))
        .expect("record id pattern is valid")
    })
}

/// Record key of the form `ntp00001234`.
///
/// The fixed width makes lexicographic order identical to numeric order, so
/// ids compare as plain strings everywhere (store scans, object listings).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        if id_pattern().is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(ValidationError::InvalidId(value.to_string()))
        }
    }

    pub fn from_number(number: u64) -> Self {
        Self(format!(
            "{}{:0width$}",
            constants::ID_PREFIX,
            number,
            width = constants::ID_DIGITS
        ))
    }

    pub fn number(&self) -> u64 {
        // Validated on construction, the suffix is always numeric
        self.0[constants::ID_PREFIX.len()..].parse().unwrap_or(0)
    }

    pub fn partition(&self) -> Partition {
        Partition::of(self.number())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RecordId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

/// Disjoint numeric id ranges for independently numbered record families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Regular tenders, numbered from 0
    Standard,
    /// Minor contracts, numbered from 10,000,000
    Minor,
}

impl Partition {
    pub fn of(number: u64) -> Self {
        if number >= constants::MINOR_PARTITION_START {
            Partition::Minor
        } else {
            Partition::Standard
        }
    }

    pub fn start(self) -> u64 {
        match self {
            Partition::Standard => constants::STANDARD_PARTITION_START,
            Partition::Minor => constants::MINOR_PARTITION_START,
        }
    }

    pub fn end(self) -> u64 {
        match self {
            Partition::Standard => constants::MINOR_PARTITION_START - 1,
            Partition::Minor => constants::MAX_ID_NUMBER,
        }
    }

    pub fn first_id(self) -> RecordId {
        RecordId::from_number(self.start())
    }

    pub fn last_id(self) -> RecordId {
        RecordId::from_number(self.end())
    }
}

impl FromStr for Partition {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" | "insiders" | "outsiders" => Ok(Partition::Standard),
            "minor" | "minors" => Ok(Partition::Minor),
            other => Err(ValidationError::UnknownPartition(other.to_string())),
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Standard => f.write_str("standard"),
            Partition::Minor => f.write_str("minor"),
        }
    }
}

// ============================================================================
// Update Timestamps
// ============================================================================

/// Truncate a timestamp to second resolution (`YYYY-MM-DD HH:MM:SS`).
pub fn truncate_timestamp(ts: &str) -> &str {
    match ts.char_indices().nth(constants::TIMESTAMP_PRECISION) {
        Some((idx, _)) => &ts[..idx],
        None => ts,
    }
}

/// One update timestamp, or every update seen for the same version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Updated {
    One(String),
    Many(Vec<String>),
}

impl Updated {
    /// Truncated timestamps, in stored order
    pub fn truncated(&self) -> Vec<&str> {
        match self {
            Updated::One(ts) => vec![truncate_timestamp(ts)],
            Updated::Many(list) => list.iter().map(|ts| truncate_timestamp(ts)).collect(),
        }
    }

    /// Most recent truncated timestamp
    pub fn latest(&self) -> Option<&str> {
        self.truncated().into_iter().max()
    }

    /// Whether `self` (an incoming update) is already recorded in `existing`.
    ///
    /// Two scalars or two lists must be equal; a scalar matches a list that
    /// contains it, in either direction.
    pub fn matches(&self, existing: &Updated) -> bool {
        let new = self.truncated();
        let old = existing.truncated();
        match (self, existing) {
            (Updated::One(_), Updated::One(_)) | (Updated::Many(_), Updated::Many(_)) => new == old,
            (Updated::Many(_), Updated::One(_)) => new.contains(&old[0]),
            (Updated::One(_), Updated::Many(_)) => old.contains(&new[0]),
        }
    }

    /// Sorted, deduplicated union of truncated timestamps.
    pub fn merged(&self, other: &Updated) -> Updated {
        let mut all: Vec<String> = self
            .truncated()
            .into_iter()
            .chain(other.truncated())
            .map(str::to_string)
            .collect();
        all.sort_unstable();
        all.dedup();
        Updated::Many(all)
    }
}

// ============================================================================
// Fields
// ============================================================================

/// Value of an open record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
    /// Non-textual payload carried verbatim, never URL-bearing
    Other(serde_json::Value),
}

/// Address of a URL-bearing field, `name` or `name:index` for list elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    pub name: String,
    pub index: Option<usize>,
}

impl FieldRef {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
        }
    }

    pub fn element(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index: Some(index),
        }
    }

    /// Label used inside object names
    pub fn object_label(&self) -> String {
        match self.index {
            Some(index) => format!("{}-{}", self.name, index),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}:{}", self.name, index),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for FieldRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(':') {
            Some((name, index)) => {
                let index = index
                    .parse()
                    .map_err(|_| format!("invalid field index in {}", s))?;
                Ok(FieldRef::element(name, index))
            }
            None => Ok(FieldRef::scalar(s)),
        }
    }
}

// ============================================================================
// Object Naming
// ============================================================================

/// Deterministic object name for a record field and detected extension
pub fn object_name(id: &RecordId, field: &FieldRef, ext: &str) -> String {
    format!("{}{}", object_prefix(id, field), ext)
}

/// Name prefix shared by every extension stored for a record field
pub fn object_prefix(id: &RecordId, field: &FieldRef) -> String {
    format!("{}_{}.", id, field.object_label())
}

/// Record id embedded in an object name (text before the first `_`)
pub fn object_record_id(name: &str) -> Option<&str> {
    name.split_once('_').map(|(id, _)| id)
}

/// Decode a stored URL: percent-decoding, spaces re-encoded, `+` dropped
pub fn decode_url(raw: &str) -> String {
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    decoded.replace(' ', "%20").replace('+', "")
}

// ============================================================================
// Records
// ============================================================================

fn is_false(value: &bool) -> bool {
    !*value
}

/// Entry of the record store.
///
/// The store keeps the record key under `_id` and the source URI under `id`;
/// the obsolete flag and pointer use `obsolete_version` and `updated_to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "_id")]
    pub id: RecordId,
    #[serde(rename = "id", default)]
    pub source_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Updated>,
    #[serde(rename = "obsolete_version", default, skip_serializing_if = "is_false")]
    pub obsolete: bool,
    #[serde(rename = "updated_to", default, skip_serializing_if = "Option::is_none")]
    pub obsolete_target: Option<RecordId>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(id: RecordId, source_uri: impl Into<String>, updated: Option<Updated>) -> Self {
        Self {
            id,
            source_uri: source_uri.into(),
            updated,
            obsolete: false,
            obsolete_target: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Final path segment of the source URI
    pub fn natural_key(&self) -> &str {
        natural_key_of(&self.source_uri)
    }

    /// Latest truncated update, if any
    pub fn latest_update(&self) -> Option<&str> {
        self.updated.as_ref().and_then(|u| u.latest())
    }

    /// Minimal stub pointing at the record that supersedes this one
    pub fn obsolete_stub(&self, target: &RecordId) -> Record {
        Record {
            id: self.id.clone(),
            source_uri: self.source_uri.clone(),
            updated: None,
            obsolete: true,
            obsolete_target: Some(target.clone()),
            fields: BTreeMap::new(),
        }
    }

    /// URL-bearing fields: scalars and list elements starting with `http`
    pub fn url_fields(&self) -> Vec<(FieldRef, &str)> {
        let mut urls = Vec::new();
        for (name, value) in &self.fields {
            match value {
                FieldValue::Scalar(s) if s.starts_with("http") => {
                    urls.push((FieldRef::scalar(name.as_str()), s.as_str()));
                }
                FieldValue::List(items) => {
                    for (index, item) in items.iter().enumerate() {
                        if item.starts_with("http") {
                            urls.push((FieldRef::element(name.as_str(), index), item.as_str()));
                        }
                    }
                }
                _ => {}
            }
        }
        urls
    }

    /// Raw value addressed by a field reference
    pub fn field_url(&self, field: &FieldRef) -> Option<&str> {
        match (self.fields.get(&field.name)?, field.index) {
            (FieldValue::Scalar(s), None) => Some(s.as_str()),
            (FieldValue::List(items), Some(index)) => items.get(index).map(String::as_str),
            _ => None,
        }
    }

    /// Field-level differences from `self` to `other`
    pub fn diff(&self, other: &Record) -> RecordPatch {
        let mine = flat_map(self);
        let theirs = flat_map(other);
        let mut patch = RecordPatch::default();

        for (key, value) in &mine {
            match theirs.get(key) {
                Some(new) if new != value => {
                    patch.modified.insert(key.clone(), (value.clone(), new.clone()));
                }
                Some(_) => {}
                None => {
                    patch.removed.insert(key.clone(), value.clone());
                }
            }
        }
        for (key, value) in &theirs {
            if !mine.contains_key(key) {
                patch.added.insert(key.clone(), value.clone());
            }
        }
        patch
    }
}

fn flat_map(record: &Record) -> BTreeMap<String, serde_json::Value> {
    match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().filter(|(k, _)| k != "_id").collect(),
        _ => BTreeMap::new(),
    }
}

/// Final path segment of a URI-like string
pub fn natural_key_of(uri: &str) -> &str {
    let trimmed = uri.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Differences between two versions of one tender.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordPatch {
    pub added: BTreeMap<String, serde_json::Value>,
    pub modified: BTreeMap<String, (serde_json::Value, serde_json::Value)>,
    pub removed: BTreeMap<String, serde_json::Value>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> RecordId {
        RecordId::from_number(n)
    }

    #[test]
    fn test_record_id_format_and_parse() {
        assert_eq!(id(42).as_str(), "ntp00000042");
        assert_eq!(RecordId::parse("ntp00000042").unwrap().number(), 42);
        assert!(RecordId::parse("ntp42").is_err());
        assert!(RecordId::parse("xyz00000042").is_err());
        assert!(RecordId::parse("ntp000000421").is_err());
    }

    #[test]
    fn test_partitions() {
        assert_eq!(id(5).partition(), Partition::Standard);
        assert_eq!(id(10_000_001).partition(), Partition::Minor);
        assert_eq!("minors".parse::<Partition>().unwrap(), Partition::Minor);
        assert!("other".parse::<Partition>().is_err());
    }

    #[test]
    fn test_truncate_timestamp() {
        assert_eq!(truncate_timestamp("2024-01-01 10:00:00.123+02:00"), "2024-01-01 10:00:00");
        assert_eq!(truncate_timestamp("2024-01-01"), "2024-01-01");
    }

    #[test]
    fn test_updated_matches() {
        let one = Updated::One("2024-01-01 10:00:00.5".into());
        let same = Updated::One("2024-01-01 10:00:00".into());
        let list = Updated::Many(vec!["2023-12-01 00:00:00".into(), "2024-01-01 10:00:00".into()]);
        assert!(one.matches(&same));
        assert!(one.matches(&list));
        assert!(list.matches(&one));
        assert!(!Updated::One("2025-01-01 00:00:00".into()).matches(&list));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let list = Updated::Many(vec!["2024-01-01 10:00:00".into(), "2024-02-01 10:00:00".into()]);
        let present = Updated::One("2024-02-01 10:00:00+01".into());
        let merged = list.merged(&present);
        assert_eq!(merged, list);
        assert_eq!(merged.merged(&present), merged);
    }

    #[test]
    fn test_natural_key() {
        let rec = Record::new(id(1), "https://contratos.example/licitacion/T-991", None);
        assert_eq!(rec.natural_key(), "T-991");
        assert_eq!(natural_key_of("https://x/y/T1/"), "T1");
        assert_eq!(natural_key_of("T1"), "T1");
    }

    #[test]
    fn test_url_fields_and_object_names() {
        let rec = Record::new(id(7), "u/T1", None)
            .with_field("pliego", FieldValue::Scalar("https://a/doc.pdf".into()))
            .with_field(
                "anexos",
                FieldValue::List(vec!["nope".into(), "http://b/x".into()]),
            )
            .with_field("importe", FieldValue::Other(serde_json::json!(12.5)));
        let urls = rec.url_fields();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].0.to_string(), "anexos:1");
        assert_eq!(rec.field_url(&"anexos:1".parse().unwrap()), Some("http://b/x"));

        let field = FieldRef::element("anexos", 1);
        assert_eq!(object_name(&rec.id, &field, "pdf"), "ntp00000007_anexos-1.pdf");
        assert_eq!(object_prefix(&rec.id, &field), "ntp00000007_anexos-1.");
        assert_eq!(object_record_id("ntp00000007_anexos-1.pdf"), Some("ntp00000007"));
        assert_eq!(object_record_id("catalog"), None);
    }

    #[test]
    fn test_decode_url() {
        assert_eq!(decode_url("http://a/b%20c+d.pdf"), "http://a/b%20cd.pdf");
    }

    #[test]
    fn test_record_serde_round_trip_keeps_store_names() {
        let mut rec = Record::new(id(3), "u/T9", Some(Updated::One("2024-01-01 00:00:00".into())))
            .with_field("title", FieldValue::Scalar("Obras".into()));
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["_id"], "ntp00000003");
        assert_eq!(json["id"], "u/T9");
        assert!(json.get("obsolete_version").is_none());

        rec = rec.obsolete_stub(&id(4));
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["obsolete_version"], true);
        assert_eq!(json["updated_to"], "ntp00000004");
        assert!(json.get("title").is_none());
        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_diff() {
        let a = Record::new(id(1), "u/T1", None)
            .with_field("a", FieldValue::Scalar("1".into()))
            .with_field("b", FieldValue::Scalar("2".into()));
        let b = Record::new(id(2), "u/T1", None)
            .with_field("b", FieldValue::Scalar("3".into()))
            .with_field("c", FieldValue::Scalar("4".into()));
        let patch = a.diff(&b);
        assert!(patch.removed.contains_key("a"));
        assert!(patch.modified.contains_key("b"));
        assert!(patch.added.contains_key("c"));
        assert!(a.diff(&a).is_empty());
    }
}
