//! Column definitions and their binary record format.

use crate::catalog::{read_string, write_string, CatalogError, CatalogResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Record layout: `oid:i32, table_oid:i32, type_oid:i32, position:i32,
/// name_len:u16, name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnDefinition {
    pub oid: i32,
    pub table_oid: i32,
    pub type_oid: i32,
    pub name: String,
    pub position: i32,
}

impl ColumnDefinition {
    pub fn new(
        oid: i32,
        table_oid: i32,
        type_oid: i32,
        name: impl Into<String>,
        position: i32,
    ) -> CatalogResult<Self> {
        let name = name.into();
        if oid < 0 || table_oid < 0 || type_oid < 0 {
            return Err(CatalogError::InvalidDefinition(format!(
                "column '{}' has a negative oid",
                name
            )));
        }
        if name.is_empty() {
            return Err(CatalogError::InvalidDefinition(
                "column name is empty".to_string(),
            ));
        }
        if position < 0 {
            return Err(CatalogError::InvalidDefinition(format!(
                "column '{}' has negative position {}",
                name, position
            )));
        }
        Ok(Self {
            oid,
            table_oid,
            type_oid,
            name,
            position,
        })
    }

    pub fn to_bytes(&self) -> CatalogResult<Vec<u8>> {
        let mut data = Vec::with_capacity(18 + self.name.len());
        data.write_i32::<LittleEndian>(self.oid)?;
        data.write_i32::<LittleEndian>(self.table_oid)?;
        data.write_i32::<LittleEndian>(self.type_oid)?;
        data.write_i32::<LittleEndian>(self.position)?;
        write_string(&mut data, &self.name)?;
        Ok(data)
    }

    pub fn from_bytes(raw: &[u8]) -> CatalogResult<Self> {
        let mut cursor = Cursor::new(raw);
        let oid = cursor.read_i32::<LittleEndian>()?;
        let table_oid = cursor.read_i32::<LittleEndian>()?;
        let type_oid = cursor.read_i32::<LittleEndian>()?;
        let position = cursor.read_i32::<LittleEndian>()?;
        let name = read_string(&mut cursor)?;
        if cursor.position() as usize != raw.len() {
            return Err(CatalogError::Malformed(
                "trailing bytes after column definition".to_string(),
            ));
        }
        Self::new(oid, table_oid, type_oid, name, position)
    }
}
