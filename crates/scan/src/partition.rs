//! Virtual columns and pushed-down object filters.
//!
//! Queries often filter on where a row came from (`_path`, `_file`, or a
//! hive-style `year=2024` directory) rather than on row contents. Such
//! filters can drop whole objects before they are ever opened.

use crate::object::ObjectInfo;
use std::sync::Arc;
use time::OffsetDateTime;

/// Filter evaluated against an object's virtual columns during enumeration.
/// Objects it rejects are never handed out.
pub type ObjectPredicate = Arc<dyn Fn(&VirtualColumns) -> bool + Send + Sync>;

/// Per-object values that are known without reading the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualColumns {
    pub path: String,
    pub file: String,
    pub size: Option<u64>,
    pub modified: Option<OffsetDateTime>,
    /// `key=value` directory segments, outermost first.
    pub partitions: Vec<(String, String)>,
}

impl VirtualColumns {
    pub fn from_object(object: &ObjectInfo) -> Self {
        let location = object.path_to_archive().unwrap_or_else(|| object.path());
        Self {
            path: object.path().into_owned(),
            file: object.file_name().to_string(),
            size: object.size(),
            modified: object.modified(),
            partitions: hive_partitions(&location),
        }
    }

    pub fn partition(&self, name: &str) -> Option<&str> {
        self.partitions.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }
}

fn hive_partitions(path: &str) -> Vec<(String, String)> {
    let Some((directories, _file)) = path.rsplit_once('/') else {
        return Vec::new();
    };
    directories
        .split('/')
        .filter_map(|segment| segment.split_once('='))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strata_storage::ObjectMeta;

    #[rstest]
    #[case("a.csv", &[])]
    #[case("year=2024/a.csv", &[("year", "2024")])]
    #[case("t/year=2024/month=01/a.csv", &[("year", "2024"), ("month", "01")])]
    #[case("t/=x/empty=/a.csv", &[("empty", "")])]
    #[case("t/file=name.csv", &[])]
    fn test_hive_partitions(#[case] path: &str, #[case] expected: &[(&str, &str)]) {
        let parsed = hive_partitions(path);
        let parsed: Vec<_> = parsed.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_from_object() {
        let object = ObjectInfo::from_meta(ObjectMeta::new("events/year=2024/part-0.csv", 42, None));
        let columns = VirtualColumns::from_object(&object);
        assert_eq!(columns.path, "events/year=2024/part-0.csv");
        assert_eq!(columns.file, "part-0.csv");
        assert_eq!(columns.size, Some(42));
        assert_eq!(columns.partition("year"), Some("2024"));
        assert_eq!(columns.partition("month"), None);
    }
}
