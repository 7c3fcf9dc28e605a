//! Table definitions and their binary record format.

use crate::catalog::{read_string, write_string, CatalogError, CatalogResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Record layout: `oid:i32, pages_count:i32`, then `name`, `table_type` and
/// `file_node`, each as `len:u16, bytes`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableDefinition {
    pub oid: i32,
    pub name: String,
    pub table_type: String,
    pub file_node: String,
    pub pages_count: i32,
}

impl TableDefinition {
    pub fn new(
        oid: i32,
        name: impl Into<String>,
        table_type: impl Into<String>,
        file_node: impl Into<String>,
        pages_count: i32,
    ) -> CatalogResult<Self> {
        let definition = Self {
            oid,
            name: name.into(),
            table_type: table_type.into(),
            file_node: file_node.into(),
            pages_count,
        };
        definition.validate()?;
        Ok(definition)
    }

    fn validate(&self) -> CatalogResult<()> {
        if self.oid < 0 || self.pages_count < 0 {
            return Err(CatalogError::InvalidDefinition(format!(
                "table '{}' has negative oid or page count",
                self.name
            )));
        }
        for (field, value) in [
            ("name", &self.name),
            ("type", &self.table_type),
            ("file node", &self.file_node),
        ] {
            if value.is_empty() {
                return Err(CatalogError::InvalidDefinition(format!(
                    "table {} is empty",
                    field
                )));
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> CatalogResult<Vec<u8>> {
        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(self.oid)?;
        data.write_i32::<LittleEndian>(self.pages_count)?;
        write_string(&mut data, &self.name)?;
        write_string(&mut data, &self.table_type)?;
        write_string(&mut data, &self.file_node)?;
        Ok(data)
    }

    pub fn from_bytes(raw: &[u8]) -> CatalogResult<Self> {
        let mut cursor = Cursor::new(raw);
        let oid = cursor.read_i32::<LittleEndian>()?;
        let pages_count = cursor.read_i32::<LittleEndian>()?;
        let name = read_string(&mut cursor)?;
        let table_type = read_string(&mut cursor)?;
        let file_node = read_string(&mut cursor)?;
        if cursor.position() as usize != raw.len() {
            return Err(CatalogError::Malformed(
                "trailing bytes after table definition".to_string(),
            ));
        }
        Self::new(oid, name, table_type, file_node, pages_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_definition_creation() -> CatalogResult<()> {
        let table = TableDefinition::new(1, "users", "table", "123.dat", 5)?;

        assert_eq!(table.oid, 1);
        assert_eq!(table.name, "users");
        assert_eq!(table.table_type, "table");
        assert_eq!(table.file_node, "123.dat");
        assert_eq!(table.pages_count, 5);

        Ok(())
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(TableDefinition::new(-1, "users", "table", "123.dat", 5).is_err());
        assert!(TableDefinition::new(1, "", "table", "123.dat", 5).is_err());
        assert!(TableDefinition::new(1, "users", "", "123.dat", 5).is_err());
        assert!(TableDefinition::new(1, "users", "table", "", 5).is_err());
        assert!(TableDefinition::new(1, "users", "table", "123.dat", -1).is_err());
    }

    #[test]
    fn test_serialization() -> CatalogResult<()> {
        let original = TableDefinition::new(1, "users", "table", "123.dat", 5)?;
        let restored = TableDefinition::from_bytes(&original.to_bytes()?)?;

        assert_eq!(original, restored);

        Ok(())
    }

    #[test]
    fn test_fixed_fields_come_first() -> CatalogResult<()> {
        let bytes = TableDefinition::new(7, "t", "table", "7.dat", 2)?.to_bytes()?;

        assert_eq!(&bytes[0..4], &7i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &2i32.to_le_bytes());
        assert_eq!(&bytes[8..10], &1u16.to_le_bytes());
        assert_eq!(bytes[10], b't');

        Ok(())
    }
}
