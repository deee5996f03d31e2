//! Column-definition packets, per spec §4.3.
//!
//! Grounded in `zero-mysql`'s `col.rs` (`ColumnDefinition`,
//! `ColumnDefinitionTail`), generalized to an owned type (no zero-copy
//! tail, consistent with the owned-`Value` decision in `src/value.rs`) and
//! to support the *minimal* metadata mode spec §3/§4.3 describe, where all
//! name fields except the column name may be dropped.

use crate::codec::Cursor;
use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};

/// Whether the server sends full column-definition name fields (catalog,
/// schema, table, org_table, org_name) or only the column name, per spec
/// §3's "field metadata ... kept only in *full* metadata mode".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataMode {
    Full,
    Minimal,
}

#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub name: String,
    pub table: Option<String>,
    pub database: Option<String>,
    pub org_table: Option<String>,
    pub org_name: Option<String>,
    pub collation_id: u16,
    pub column_length: u32,
    pub column_type: ColumnType,
    pub flags: ColumnFlags,
    pub decimals: u8,
}

impl ColumnDefinition {
    pub fn parse(payload: &[u8], mode: MetadataMode) -> Result<Self> {
        let mut cursor = Cursor::new(payload);
        let _catalog = cursor.read_string_lenenc()?;
        let schema = cursor.read_string_lenenc()?;
        let table = cursor.read_string_lenenc()?;
        let org_table = cursor.read_string_lenenc()?;
        let name = cursor.read_string_lenenc()?;
        let org_name = cursor.read_string_lenenc()?;
        let _fixed_fields_length = cursor.read_int_lenenc()?;
        let collation_id = cursor.read_int_2()?;
        let column_length = cursor.read_int_4()?;
        let column_type_byte = cursor.read_int_1()?;
        let column_type = ColumnType::from_u8(column_type_byte)
            .ok_or_else(|| Error::ProtocolValueError(format!("unknown column type 0x{column_type_byte:02x}")))?;
        let flags_bits = cursor.read_int_2()?;
        let flags = ColumnFlags::from_bits_truncate(flags_bits);
        let decimals = cursor.read_int_1()?;

        let lossy = |b: &[u8]| String::from_utf8_lossy(b).into_owned();
        let (table, database, org_table, org_name) = match mode {
            MetadataMode::Full => (
                Some(lossy(table)),
                Some(lossy(schema)),
                Some(lossy(org_table)),
                Some(lossy(org_name)),
            ),
            MetadataMode::Minimal => (None, None, None, None),
        };

        Ok(Self {
            name: lossy(name),
            table,
            database,
            org_table,
            org_name,
            collation_id,
            column_length,
            column_type,
            flags,
            decimals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> Vec<u8> {
        let mut p = Vec::new();
        for field in ["def", "testdb", "users", "users", "id", "id"] {
            p.push(field.len() as u8);
            p.extend_from_slice(field.as_bytes());
        }
        p.push(0x0c);
        p.extend_from_slice(&45u16.to_le_bytes());
        p.extend_from_slice(&11u32.to_le_bytes());
        p.push(ColumnType::MYSQL_TYPE_LONG as u8);
        p.extend_from_slice(&(ColumnFlags::NOT_NULL_FLAG | ColumnFlags::PRI_KEY_FLAG).bits().to_le_bytes());
        p.push(0);
        p
    }

    #[test]
    fn full_metadata_keeps_all_names() {
        let col = ColumnDefinition::parse(&sample_packet(), MetadataMode::Full).unwrap();
        assert_eq!(col.name, "id");
        assert_eq!(col.table.as_deref(), Some("users"));
        assert_eq!(col.database.as_deref(), Some("testdb"));
        assert_eq!(col.column_type, ColumnType::MYSQL_TYPE_LONG);
        assert!(col.flags.contains(ColumnFlags::PRI_KEY_FLAG));
    }

    #[test]
    fn minimal_metadata_drops_everything_but_column_name() {
        let col = ColumnDefinition::parse(&sample_packet(), MetadataMode::Minimal).unwrap();
        assert_eq!(col.name, "id");
        assert!(col.table.is_none());
        assert!(col.database.is_none());
    }

    #[test]
    fn unknown_column_type_is_protocol_value_error() {
        let mut p = sample_packet();
        let type_byte_index = p.len() - 1 - 2 - 1;
        p[type_byte_index] = 0x50;
        let err = ColumnDefinition::parse(&p, MetadataMode::Full).unwrap_err();
        assert!(matches!(err, Error::ProtocolValueError(_)));
    }
}
