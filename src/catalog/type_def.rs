//! Type definitions and their binary record format.

use crate::catalog::{read_string, write_string, CatalogError, CatalogResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// A column type known to the catalog. `byte_length` is -1 for variable
/// length types.
///
/// Record layout: `oid:i32, byte_length:i32, name_len:u16, name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDefinition {
    pub oid: i32,
    pub name: String,
    pub byte_length: i32,
}

impl TypeDefinition {
    pub fn new(oid: i32, name: impl Into<String>, byte_length: i32) -> Self {
        Self {
            oid,
            name: name.into(),
            byte_length,
        }
    }

    pub fn is_variable_length(&self) -> bool {
        self.byte_length < 0
    }

    pub fn to_bytes(&self) -> CatalogResult<Vec<u8>> {
        let mut data = Vec::with_capacity(10 + self.name.len());
        data.write_i32::<LittleEndian>(self.oid)?;
        data.write_i32::<LittleEndian>(self.byte_length)?;
        write_string(&mut data, &self.name)?;
        Ok(data)
    }

    pub fn from_bytes(raw: &[u8]) -> CatalogResult<Self> {
        if raw.len() < 10 {
            return Err(CatalogError::Malformed(
                "payload is too small for a type definition".to_string(),
            ));
        }
        let mut cursor = Cursor::new(raw);
        let oid = cursor.read_i32::<LittleEndian>()?;
        let byte_length = cursor.read_i32::<LittleEndian>()?;
        let name = read_string(&mut cursor)?;
        if cursor.position() as usize != raw.len() {
            return Err(CatalogError::Malformed(
                "trailing bytes after type definition".to_string(),
            ));
        }
        Ok(Self {
            oid,
            name,
            byte_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() -> CatalogResult<()> {
        let bytes = TypeDefinition::new(1, "integer", 4).to_bytes()?;

        assert_eq!(&bytes[0..4], &1i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &4i32.to_le_bytes());
        assert_eq!(&bytes[8..10], &7u16.to_le_bytes());
        assert_eq!(&bytes[10..], b"integer");

        Ok(())
    }

    #[test]
    fn test_serialization() -> CatalogResult<()> {
        let original = TypeDefinition::new(4, "varchar", -1);
        let restored = TypeDefinition::from_bytes(&original.to_bytes()?)?;

        assert_eq!(original, restored);
        assert!(restored.is_variable_length());

        Ok(())
    }

    #[test]
    fn test_rejects_bad_payloads() -> CatalogResult<()> {
        assert!(TypeDefinition::from_bytes(&[1, 2, 3]).is_err());

        let mut bytes = TypeDefinition::new(2, "bigint", 8).to_bytes()?;
        bytes.push(0);
        assert!(TypeDefinition::from_bytes(&bytes).is_err());

        bytes.truncate(bytes.len() - 3);
        assert!(TypeDefinition::from_bytes(&bytes).is_err());

        Ok(())
    }
}
