//! Record codec: typed records to and from the schema-less field mapping.
//!
//! Stored documents drift. A price may be an `Int32`, a `Double` or the text
//! `"12.50"`; a timestamp may be a native datetime, an RFC 3339 string or Unix
//! seconds; older documents may lack fields entirely. [`FieldReader`] owns one
//! coercion rule per declared type so record types never switch on raw BSON,
//! and every absent field decodes to its zero value.

use std::ops::Deref;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use core_config::TimestampFormat;
use mongodb::bson::{self, Bson, Document};

use crate::error::{StoreError, StoreResult};

pub const ID_FIELD: &str = "id";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Keys owned by the codec and the store, never by a record type
pub const RESERVED_FIELDS: [&str; 4] = ["_id", ID_FIELD, CREATED_AT, UPDATED_AT];

/// A typed record that can live in a document collection.
///
/// `FIELDS` lists every field the type declares; anything else found in a
/// stored document is carried along in [`Stored::extra`].
pub trait Record: Sized + Send + Sync + 'static {
    const FIELDS: &'static [&'static str];

    fn encode(&self, fields: &mut FieldMap);

    fn decode(fields: &FieldReader<'_>) -> StoreResult<Self>;
}

/// A record together with the metadata the store owns
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T> {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub record: T,
    /// Stored fields the record type does not declare
    pub extra: Document,
}

impl<T> Deref for Stored<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

impl<T: Record> Stored<T> {
    /// Every field of the document: declared, unknown and timestamps
    pub fn encode_full(&self, format: TimestampFormat) -> Document {
        let mut doc = self.extra.clone();
        for (key, value) in encode(&self.record).into_document() {
            doc.insert(key, value);
        }
        doc.insert(CREATED_AT, timestamp_bson(self.created_at, format));
        doc.insert(UPDATED_AT, timestamp_bson(self.updated_at, format));
        doc
    }

    pub fn into_record(self) -> T {
        self.record
    }
}

/// Encode a record's declared fields
pub fn encode<T: Record>(record: &T) -> FieldMap {
    let mut fields = FieldMap::new();
    record.encode(&mut fields);
    fields
}

/// Decode a stored document, backfilling every absent declared field
pub fn decode<T: Record>(id: impl Into<String>, doc: &Document) -> StoreResult<Stored<T>> {
    let reader = FieldReader::new(doc);
    let record = T::decode(&reader)?;
    let created_at = reader.timestamp(CREATED_AT)?;
    let updated_at = reader.timestamp(UPDATED_AT)?;

    let extra = doc
        .iter()
        .filter(|(key, _)| !is_reserved(key) && !T::FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(Stored {
        id: id.into(),
        created_at,
        updated_at,
        record,
        extra,
    })
}

pub fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

/// Current time at the precision the store keeps (milliseconds)
pub fn now() -> DateTime<Utc> {
    normalize(Utc::now())
}

/// Truncate to milliseconds so values survive a trip through the store
pub fn normalize(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or_default()
}

pub fn timestamp_bson(ts: DateTime<Utc>, format: TimestampFormat) -> Bson {
    match format {
        TimestampFormat::Native => {
            Bson::DateTime(bson::DateTime::from_millis(ts.timestamp_millis()))
        }
        TimestampFormat::Rfc3339 => Bson::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
    }
}

/// Rewrite top-level native datetimes into the store's canonical form
pub fn canonicalize_timestamps(doc: &mut Document, format: TimestampFormat) {
    if format == TimestampFormat::Native {
        return;
    }
    for (_, value) in doc.iter_mut() {
        if let Bson::DateTime(dt) = value {
            let ts = DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or_default();
            *value = timestamp_bson(ts, format);
        }
    }
}

/// The generic field mapping written to the store.
///
/// Setters never emit `Null`: zero values are written as zero values, and
/// optional fields are left out when `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    doc: Document,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn string(&mut self, field: &str, value: impl Into<String>) -> &mut Self {
        self.doc.insert(field, Bson::String(value.into()));
        self
    }

    pub fn optional_string(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.string(field, value);
        }
        self
    }

    pub fn number(&mut self, field: &str, value: f64) -> &mut Self {
        self.doc.insert(field, Bson::Double(value));
        self
    }

    pub fn integer(&mut self, field: &str, value: i64) -> &mut Self {
        self.doc.insert(field, Bson::Int64(value));
        self
    }

    pub fn boolean(&mut self, field: &str, value: bool) -> &mut Self {
        self.doc.insert(field, Bson::Boolean(value));
        self
    }

    /// Written natively; the store rewrites it to its canonical form
    pub fn timestamp(&mut self, field: &str, value: DateTime<Utc>) -> &mut Self {
        self.doc.insert(field, timestamp_bson(value, TimestampFormat::Native));
        self
    }

    /// Nested records, sequences and anything else already in BSON form
    pub fn raw(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        self.doc.insert(field, value.into());
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.doc.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.doc.is_empty()
    }

    pub fn len(&self) -> usize {
        self.doc.len()
    }

    pub fn as_document(&self) -> &Document {
        &self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }
}

impl From<Document> for FieldMap {
    fn from(doc: Document) -> Self {
        Self { doc }
    }
}

/// Read side of the codec: one coercion rule per declared type
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    doc: &'a Document,
}

impl<'a> FieldReader<'a> {
    pub fn new(doc: &'a Document) -> Self {
        Self { doc }
    }

    /// Absent and explicit nulls both read as "no value"
    fn value(&self, field: &str) -> Option<&'a Bson> {
        match self.doc.get(field) {
            None | Some(Bson::Null) | Some(Bson::Undefined) => None,
            Some(value) => Some(value),
        }
    }

    pub fn string(&self, field: &str) -> StoreResult<String> {
        match self.value(field) {
            None => Ok(String::new()),
            Some(Bson::String(s)) => Ok(s.clone()),
            Some(Bson::Int32(n)) => Ok(n.to_string()),
            Some(Bson::Int64(n)) => Ok(n.to_string()),
            Some(Bson::Double(n)) => Ok(format_double(*n)),
            Some(Bson::Boolean(b)) => Ok(b.to_string()),
            Some(Bson::ObjectId(oid)) => Ok(oid.to_hex()),
            Some(other) => Err(mismatch(field, "string", other)),
        }
    }

    pub fn optional_string(&self, field: &str) -> StoreResult<Option<String>> {
        match self.value(field) {
            None => Ok(None),
            Some(_) => self.string(field).map(Some),
        }
    }

    pub fn number(&self, field: &str) -> StoreResult<f64> {
        match self.value(field) {
            None => Ok(0.0),
            Some(Bson::Double(n)) => Ok(*n),
            Some(Bson::Int32(n)) => Ok(f64::from(*n)),
            Some(Bson::Int64(n)) => Ok(*n as f64),
            Some(Bson::String(s)) => parse_number(field, s),
            Some(other) => Err(mismatch(field, "number", other)),
        }
    }

    pub fn integer(&self, field: &str) -> StoreResult<i64> {
        match self.value(field) {
            None => Ok(0),
            Some(Bson::Int32(n)) => Ok(i64::from(*n)),
            Some(Bson::Int64(n)) => Ok(*n),
            Some(Bson::Double(n)) => integral(field, *n),
            Some(Bson::String(s)) => {
                let trimmed = s.trim();
                match trimmed.parse::<i64>() {
                    Ok(n) => Ok(n),
                    Err(_) => integral(field, parse_number(field, trimmed)?),
                }
            }
            Some(other) => Err(mismatch(field, "integer", other)),
        }
    }

    pub fn boolean(&self, field: &str) -> StoreResult<bool> {
        match self.value(field) {
            None => Ok(false),
            Some(Bson::Boolean(b)) => Ok(*b),
            Some(Bson::Int32(n)) => int_flag(field, i64::from(*n)),
            Some(Bson::Int64(n)) => int_flag(field, *n),
            Some(Bson::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "" | "false" => Ok(false),
                "true" => Ok(true),
                other => Err(StoreError::decode(field, format!("'{}' is not a boolean", other))),
            },
            Some(other) => Err(mismatch(field, "boolean", other)),
        }
    }

    /// Native datetime, RFC 3339 text, `YYYY-MM-DD HH:MM:SS` (UTC) or Unix seconds
    pub fn timestamp(&self, field: &str) -> StoreResult<DateTime<Utc>> {
        let ts = match self.value(field) {
            None => return Ok(DateTime::default()),
            Some(Bson::DateTime(dt)) => DateTime::from_timestamp_millis(dt.timestamp_millis())
                .ok_or_else(|| StoreError::decode(field, "datetime out of range"))?,
            Some(Bson::String(s)) => parse_timestamp(field, s)?,
            Some(Bson::Int32(secs)) => from_seconds(field, i64::from(*secs))?,
            Some(Bson::Int64(secs)) => from_seconds(field, *secs)?,
            Some(Bson::Double(secs)) if secs.is_finite() => {
                DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
                    .ok_or_else(|| StoreError::decode(field, "timestamp out of range"))?
            }
            Some(Bson::Timestamp(ts)) => from_seconds(field, i64::from(ts.time))?,
            Some(other) => return Err(mismatch(field, "timestamp", other)),
        };
        Ok(normalize(ts))
    }

    /// Nested record; absent reads as an empty document
    pub fn document(&self, field: &str) -> StoreResult<Document> {
        match self.value(field) {
            None => Ok(Document::new()),
            Some(Bson::Document(doc)) => Ok(doc.clone()),
            Some(other) => Err(mismatch(field, "document", other)),
        }
    }

    /// Sequence; absent reads as empty
    pub fn array(&self, field: &str) -> StoreResult<Vec<Bson>> {
        match self.value(field) {
            None => Ok(Vec::new()),
            Some(Bson::Array(items)) => Ok(items.clone()),
            Some(other) => Err(mismatch(field, "array", other)),
        }
    }
}

fn mismatch(field: &str, expected: &str, found: &Bson) -> StoreError {
    StoreError::decode(
        field,
        format!("expected {}, found {:?}", expected, found.element_type()),
    )
}

fn format_double(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn parse_number(field: &str, raw: &str) -> StoreResult<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(StoreError::decode(
            field,
            format!("'{}' is not a number", trimmed),
        )),
    }
}

fn integral(field: &str, n: f64) -> StoreResult<i64> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Ok(n as i64)
    } else {
        Err(StoreError::decode(field, format!("{} is not an integer", n)))
    }
}

fn int_flag(field: &str, n: i64) -> StoreResult<bool> {
    match n {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StoreError::decode(field, format!("{} is not a boolean", other))),
    }
}

fn from_seconds(field: &str, secs: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::decode(field, "timestamp out of range"))
}

fn parse_timestamp(field: &str, raw: &str) -> StoreResult<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(DateTime::default());
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            StoreError::decode(
                field,
                format!("'{}' is not an ISO-8601 timestamp", trimmed),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mongodb::bson::doc;

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Widget {
        label: String,
        weight: f64,
        count: i64,
        active: bool,
        restocked_at: DateTime<Utc>,
        note: Option<String>,
    }

    impl Record for Widget {
        const FIELDS: &'static [&'static str] =
            &["label", "weight", "count", "active", "restocked_at", "note"];

        fn encode(&self, fields: &mut FieldMap) {
            fields
                .string("label", &self.label)
                .number("weight", self.weight)
                .integer("count", self.count)
                .boolean("active", self.active)
                .timestamp("restocked_at", self.restocked_at)
                .optional_string("note", self.note.as_deref());
        }

        fn decode(fields: &FieldReader<'_>) -> StoreResult<Self> {
            Ok(Self {
                label: fields.string("label")?,
                weight: fields.number("weight")?,
                count: fields.integer("count")?,
                active: fields.boolean("active")?,
                restocked_at: fields.timestamp("restocked_at")?,
                note: fields.optional_string("note")?,
            })
        }
    }

    fn ts(secs: i64, millis: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, millis * 1_000_000).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_declared_fields() {
        let widget = Widget {
            label: "Bolt M8".to_string(),
            weight: 12.75,
            count: 40,
            active: true,
            restocked_at: ts(1_700_000_000, 123),
            note: Some("fragile".to_string()),
        };

        let doc = encode(&widget).into_document();
        let stored: Stored<Widget> = decode("w1", &doc).unwrap();

        assert_eq!(stored.record, widget);
        assert_eq!(stored.id, "w1");
        assert!(stored.extra.is_empty());
    }

    #[test]
    fn test_missing_fields_backfill_zero_values() {
        let stored: Stored<Widget> = decode("w2", &doc! {}).unwrap();

        assert_eq!(stored.record, Widget::default());
        assert_eq!(stored.created_at, DateTime::<Utc>::default());
        assert_eq!(stored.updated_at, DateTime::<Utc>::default());
    }

    #[test]
    fn test_null_reads_as_absent() {
        let doc = doc! { "label": Bson::Null, "weight": Bson::Null, "note": Bson::Null };
        let stored: Stored<Widget> = decode("w3", &doc).unwrap();

        assert_eq!(stored.label, "");
        assert_eq!(stored.weight, 0.0);
        assert_eq!(stored.note, None);
    }

    #[test]
    fn test_numbers_coerce_from_any_numeric_form() {
        let doc = doc! {
            "label": 990_011_i64,
            "weight": " 12.50 ",
            "count": 3.0,
            "active": "TRUE",
        };
        let stored: Stored<Widget> = decode("w4", &doc).unwrap();

        assert_eq!(stored.label, "990011");
        assert_eq!(stored.weight, 12.5);
        assert_eq!(stored.count, 3);
        assert!(stored.active);

        let doc = doc! { "weight": 7_i32, "count": "15", "active": 0_i32 };
        let stored: Stored<Widget> = decode("w5", &doc).unwrap();
        assert_eq!(stored.weight, 7.0);
        assert_eq!(stored.count, 15);
        assert!(!stored.active);
    }

    #[test]
    fn test_whole_double_renders_without_fraction() {
        let stored: Stored<Widget> = decode("w6", &doc! { "label": 42.0 }).unwrap();
        assert_eq!(stored.label, "42");
    }

    #[test]
    fn test_unparseable_value_names_the_field() {
        let err = decode::<Widget>("w7", &doc! { "weight": "heavy" }).unwrap_err();
        match err {
            StoreError::Decode { field, message } => {
                assert_eq!(field, "weight");
                assert!(message.contains("heavy"));
            }
            other => panic!("expected decode error, got {:?}", other),
        }

        let err = decode::<Widget>("w8", &doc! { "count": 2.5 }).unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref field, .. } if field == "count"));

        let err = decode::<Widget>("w9", &doc! { "label": { "nested": true } }).unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref field, .. } if field == "label"));
    }

    #[test]
    fn test_integer_out_of_range_is_decode_error() {
        // 2^63 is one past i64::MAX; it must not saturate
        let too_big = doc! { "count": 9_223_372_036_854_775_808.0 };
        let err = decode::<Widget>("w10", &too_big).unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref field, .. } if field == "count"));

        let too_small = doc! { "count": -9_223_372_036_854_775_808.0 };
        let err = decode::<Widget>("w11", &too_small).unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref field, .. } if field == "count"));

        let in_range = doc! { "count": 4_611_686_018_427_387_904.0 };
        let stored: Stored<Widget> = decode("w12", &in_range).unwrap();
        assert_eq!(stored.count, 1_i64 << 62);
    }

    #[test]
    fn test_timestamps_accept_every_stored_form() {
        let expected = ts(1_700_000_000, 0);

        let forms = [
            Bson::DateTime(bson::DateTime::from_millis(1_700_000_000_000)),
            Bson::String("2023-11-14T22:13:20Z".to_string()),
            Bson::String("2023-11-14T23:13:20+01:00".to_string()),
            Bson::String("2023-11-14 22:13:20".to_string()),
            Bson::Int64(1_700_000_000),
            Bson::Double(1_700_000_000.0),
        ];

        for form in forms {
            let doc = doc! { "restocked_at": form.clone() };
            let stored: Stored<Widget> = decode("w", &doc).unwrap();
            assert_eq!(stored.restocked_at, expected, "form {:?}", form);
        }
    }

    #[test]
    fn test_timestamps_normalize_to_milliseconds() {
        let doc = doc! { "created_at": "2024-03-01T10:00:00.123456789Z" };
        let stored: Stored<Widget> = decode("w", &doc).unwrap();
        assert_eq!(stored.created_at.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_bad_timestamp_is_decode_error() {
        let err = decode::<Widget>("w", &doc! { "updated_at": "yesterday" }).unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref field, .. } if field == "updated_at"));
    }

    #[test]
    fn test_unknown_fields_are_kept_and_written_back() {
        let doc = doc! {
            "label": "Nut",
            "legacy_sku": "N-01",
            "dimensions": { "w": 3, "h": 4 },
            "_id": "abc",
        };
        let stored: Stored<Widget> = decode("abc", &doc).unwrap();

        assert_eq!(stored.extra.len(), 2);
        assert_eq!(stored.extra.get_str("legacy_sku").unwrap(), "N-01");

        let full = stored.encode_full(TimestampFormat::Native);
        assert_eq!(full.get_str("legacy_sku").unwrap(), "N-01");
        assert!(full.get_document("dimensions").is_ok());
        assert_eq!(full.get_str("label").unwrap(), "Nut");
        assert!(!full.contains_key("_id"));
    }

    #[test]
    fn test_encode_never_emits_null() {
        let doc = encode(&Widget::default()).into_document();

        assert!(doc.values().all(|v| *v != Bson::Null));
        assert_eq!(doc.get_str("label").unwrap(), "");
        assert!(!doc.contains_key("note"));
    }

    #[test]
    fn test_canonicalize_rfc3339() {
        let mut doc = encode(&Widget {
            restocked_at: ts(1_700_000_000, 5),
            ..Widget::default()
        })
        .into_document();

        canonicalize_timestamps(&mut doc, TimestampFormat::Rfc3339);
        assert_eq!(
            doc.get_str("restocked_at").unwrap(),
            "2023-11-14T22:13:20.005Z"
        );

        let stored: Stored<Widget> = decode("w", &doc).unwrap();
        assert_eq!(stored.restocked_at, ts(1_700_000_000, 5));
    }
}
