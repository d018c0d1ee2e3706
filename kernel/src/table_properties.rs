//! Table properties as reported by the engine's catalog. These describe which storage format a
//! table is in and carry the flags that govern whether it can be migrated. Parsing is lenient:
//! a known key whose value does not parse is kept in `unknown_properties` rather than failing the
//! whole table.

use std::collections::HashMap;
use std::num::NonZero;

use strum::{AsRefStr, Display as StrumDisplay, EnumString};
use tracing::warn;
use url::Url;

/// Catalog parameter naming the table's storage format.
pub const TABLE_TYPE: &str = "table_type";
/// Version of the snapshot-capable table format.
pub const FORMAT_VERSION: &str = "format-version";
/// Set on legacy tables whose catalog entry was translated from a managed to an external table.
/// The engine refuses to migrate a table while this is set.
pub const TRANSLATED_TO_EXTERNAL: &str = "TRANSLATED_TO_EXTERNAL";
/// Storage location of the table.
pub const LOCATION: &str = "location";

/// Storage format of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, StrumDisplay, AsRefStr)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum TableType {
    /// Snapshot-capable table format
    Iceberg,
    /// Legacy directory-of-files format with no snapshot history
    Hive,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableProperties {
    /// Storage format. Tables registered without a `table_type` are legacy tables.
    pub table_type: Option<TableType>,

    /// Version of the snapshot-capable format, when the table is in it.
    pub format_version: Option<NonZero<u32>>,

    /// Whether the legacy table is still marked as translated-to-external.
    pub translated_to_external: Option<bool>,

    pub location: Option<Url>,

    /// Any properties that were not recognized or failed to parse.
    pub unknown_properties: HashMap<String, String>,
}

impl TableProperties {
    /// Whether the table already has snapshot history, i.e. has been migrated.
    pub fn is_snapshot_capable(&self) -> bool {
        self.table_type == Some(TableType::Iceberg)
    }

    pub fn is_translated_to_external(&self) -> bool {
        self.translated_to_external.unwrap_or(false)
    }
}

impl<K, V, I> From<I> for TableProperties
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str> + Into<String>,
    V: AsRef<str> + Into<String>,
{
    fn from(unparsed: I) -> Self {
        let mut props = TableProperties::default();
        let unparsed = unparsed.into_iter().filter(|(k, v)| {
            // Only keep elements that fail to parse
            try_parse(&mut props, k.as_ref(), v.as_ref()).is_none()
        });
        props.unknown_properties = unparsed.map(|(k, v)| (k.into(), v.into())).collect();
        props
    }
}

// Attempt to parse a key-value pair into `props`. Returns Some(()) if the key was recognized and
// its value parsed, and None otherwise.
fn try_parse(props: &mut TableProperties, k: &str, v: &str) -> Option<()> {
    match k {
        TABLE_TYPE => props.table_type = Some(v.trim().parse().ok()?),
        FORMAT_VERSION => props.format_version = Some(v.trim().parse().ok()?),
        TRANSLATED_TO_EXTERNAL => props.translated_to_external = Some(parse_bool(v)?),
        LOCATION => props.location = Some(parse_url(v)?),
        _ => return None,
    }
    Some(())
}

/// Catalogs write booleans in either case (`TRUE`, `true`).
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        v if v.eq_ignore_ascii_case("true") => Some(true),
        v if v.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn parse_url(s: &str) -> Option<Url> {
    Url::parse(s)
        .inspect_err(|e| warn!("table location failed to parse: {e}"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn known_properties() {
        let props = TableProperties::from([
            (TABLE_TYPE, "ICEBERG"),
            (FORMAT_VERSION, "2"),
            (LOCATION, "s3a://bucket/db/tbl/"),
            ("write.format.default", "parquet"),
        ]);
        assert!(props.is_snapshot_capable());
        assert_eq!(props.format_version, NonZero::new(2));
        assert_eq!(
            props.location.as_ref().map(Url::as_str),
            Some("s3a://bucket/db/tbl/")
        );
        assert!(!props.is_translated_to_external());
        assert_eq!(
            props.unknown_properties,
            HashMap::from([("write.format.default".to_string(), "parquet".to_string())])
        );
    }

    #[test]
    fn legacy_table_without_table_type() {
        let props = TableProperties::from([(TRANSLATED_TO_EXTERNAL, "TRUE")]);
        assert!(!props.is_snapshot_capable());
        assert!(props.is_translated_to_external());
    }

    #[rstest]
    #[case("iceberg", Some(TableType::Iceberg))]
    #[case("ICEBERG", Some(TableType::Iceberg))]
    #[case("hive", Some(TableType::Hive))]
    #[case("delta", None)]
    fn table_type_values(#[case] value: &str, #[case] expected: Option<TableType>) {
        let props = TableProperties::from([(TABLE_TYPE, value)]);
        assert_eq!(props.table_type, expected);
        assert_eq!(props.unknown_properties.contains_key(TABLE_TYPE), expected.is_none());
    }

    #[test]
    fn invalid_values_are_kept_as_unknown() {
        let props = TableProperties::from([
            (FORMAT_VERSION, "0"),
            (TRANSLATED_TO_EXTERNAL, "maybe"),
            (LOCATION, "not a url"),
        ]);
        assert_eq!(props.format_version, None);
        assert_eq!(props.translated_to_external, None);
        assert_eq!(props.location, None);
        assert_eq!(props.unknown_properties.len(), 3);
    }

    #[test]
    fn table_type_displays_as_catalog_value() {
        assert_eq!(TableType::Iceberg.to_string(), "ICEBERG");
        assert_eq!(TableType::Hive.as_ref(), "HIVE");
    }
}
