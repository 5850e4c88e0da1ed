use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use time::OffsetDateTime;

/// One column of an inferred schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}
impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Ordered list of columns a format inferred from an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    pub columns: Vec<ColumnDef>,
}
impl Schema {
    pub fn new(columns: impl IntoIterator<Item = ColumnDef>) -> Self {
        Self {
            columns: columns.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Identity of a cached object.
///
/// `path_id` is the object's unique storage path identifier. The format is
/// part of the key because two formats can disagree on what a row is. The
/// version tag pins the entry to one revision of the object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path_id: String,
    pub format: String,
    pub version: Option<String>,
}
impl CacheKey {
    pub fn new(path_id: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            path_id: path_id.into(),
            format: format.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: Option<impl Into<String>>) -> Self {
        self.version = version.map(Into::into);
        self
    }
}
impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.version {
            Some(version) => write!(f, "{}@{} ({})", self.path_id, version, self.format),
            None => write!(f, "{} ({})", self.path_id, self.format),
        }
    }
}

/// What is known about one object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub num_rows: Option<u64>,
    pub schema: Option<Schema>,
    /// Modification time of the object when this entry was written.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_modified: Option<OffsetDateTime>,
}
impl CacheEntry {
    pub fn with_num_rows(mut self, num_rows: u64) -> Self {
        self.num_rows = Some(num_rows);
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_last_modified(mut self, last_modified: Option<OffsetDateTime>) -> Self {
        self.last_modified = last_modified;
        self
    }

    /// Overlay `newer` on top of this entry; fields `newer` leaves empty
    /// keep their current value.
    #[must_use]
    pub fn merge(self, newer: CacheEntry) -> Self {
        Self {
            num_rows: newer.num_rows.or(self.num_rows),
            schema: newer.schema.or(self.schema),
            last_modified: newer.last_modified.or(self.last_modified),
        }
    }

    /// Whether this entry still describes an object last modified at
    /// `modified`. Unknown times on either side are taken on trust.
    pub fn is_fresh(&self, modified: Option<OffsetDateTime>) -> bool {
        match (self.last_modified, modified) {
            (Some(recorded), Some(current)) => recorded == current,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    #[test]
    fn test_merge_keeps_absent_fields() {
        let schema = Schema::new([ColumnDef::new("line", "String")]);
        let old = CacheEntry::default().with_num_rows(10).with_schema(schema.clone());
        let merged = old.merge(CacheEntry::default().with_num_rows(12));
        assert_eq!(merged.num_rows, Some(12));
        assert_eq!(merged.schema, Some(schema));
    }

    #[rstest]
    #[case(None, None, true)]
    #[case(Some(datetime!(2024-01-01 0:00 UTC)), None, true)]
    #[case(None, Some(datetime!(2024-01-01 0:00 UTC)), true)]
    #[case(Some(datetime!(2024-01-01 0:00 UTC)), Some(datetime!(2024-01-01 0:00 UTC)), true)]
    #[case(Some(datetime!(2024-01-01 0:00 UTC)), Some(datetime!(2024-02-01 0:00 UTC)), false)]
    fn test_is_fresh(
        #[case] recorded: Option<OffsetDateTime>,
        #[case] current: Option<OffsetDateTime>,
        #[case] expected: bool,
    ) {
        let entry = CacheEntry::default().with_last_modified(recorded);
        assert_eq!(entry.is_fresh(current), expected);
    }

    #[test]
    fn test_key_display() {
        let key = CacheKey::new("local/data/a.csv", "lines").with_version(Some("v2"));
        assert_eq!(key.to_string(), "local/data/a.csv@v2 (lines)");
    }

    #[test]
    fn test_schema_serializes_as_list() {
        let schema = Schema::new([ColumnDef::new("a", "UInt64")]);
        let json = serde_json::to_string(&schema).unwrap();
        assert_eq!(json, r#"[{"name":"a","data_type":"UInt64"}]"#);
        assert_eq!(serde_json::from_str::<Schema>(&json).unwrap(), schema);
    }
}
