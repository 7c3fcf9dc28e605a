use crate::catalog::TypeDefinition;
use anyhow::{bail, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Cursor, Read};

/// Column types a row can hold, one per built-in catalog type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    BigInt,
    Boolean,
    Varchar,
}

impl DataType {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "integer" => Ok(DataType::Integer),
            "bigint" => Ok(DataType::BigInt),
            "boolean" => Ok(DataType::Boolean),
            "varchar" => Ok(DataType::Varchar),
            _ => bail!("Unknown data type: {}", name),
        }
    }

    pub fn from_definition(definition: &TypeDefinition) -> Result<Self> {
        let data_type = Self::from_name(&definition.name)?;
        if let Some(width) = data_type.fixed_width() {
            if definition.byte_length != width as i32 {
                bail!(
                    "Type {} declares {} bytes, expected {}",
                    definition.name,
                    definition.byte_length,
                    width
                );
            }
        }
        Ok(data_type)
    }

    /// Encoded width, or None for variable length types
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            DataType::Integer => Some(4),
            DataType::BigInt => Some(8),
            DataType::Boolean => Some(1),
            DataType::Varchar => None,
        }
    }
}

/// Values that can be stored in a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i32),
    Long(i64),
    Boolean(bool),
    Text(String),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Integer(_) => DataType::Integer,
            Value::Long(_) => DataType::BigInt,
            Value::Boolean(_) => DataType::Boolean,
            Value::Text(_) => DataType::Varchar,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Encode a row according to its schema
pub fn encode_row(values: &[Value], schema: &[DataType]) -> Result<Vec<u8>> {
    if values.len() != schema.len() {
        bail!(
            "Value count {} doesn't match schema length {}",
            values.len(),
            schema.len()
        );
    }

    let mut data = Vec::new();
    for (value, data_type) in values.iter().zip(schema) {
        match (value, data_type) {
            (Value::Integer(v), DataType::Integer) => data.write_i32::<LittleEndian>(*v)?,
            (Value::Long(v), DataType::BigInt) => data.write_i64::<LittleEndian>(*v)?,
            (Value::Boolean(v), DataType::Boolean) => data.push(u8::from(*v)),
            (Value::Text(s), DataType::Varchar) => {
                let Ok(len) = u16::try_from(s.len()) else {
                    bail!("Varchar value of {} bytes is too long", s.len());
                };
                data.write_u16::<LittleEndian>(len)?;
                data.extend_from_slice(s.as_bytes());
            }
            _ => bail!("Value {:?} is not compatible with type {:?}", value, data_type),
        }
    }

    Ok(data)
}

/// Decode a row according to its schema
pub fn decode_row(data: &[u8], schema: &[DataType]) -> Result<Vec<Value>> {
    let mut cursor = Cursor::new(data);
    let mut values = Vec::with_capacity(schema.len());

    for data_type in schema {
        let value = match data_type {
            DataType::Integer => Value::Integer(cursor.read_i32::<LittleEndian>()?),
            DataType::BigInt => Value::Long(cursor.read_i64::<LittleEndian>()?),
            DataType::Boolean => match cursor.read_u8()? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                other => bail!("Invalid boolean byte: {}", other),
            },
            DataType::Varchar => {
                let len = cursor.read_u16::<LittleEndian>()? as usize;
                let mut buf = vec![0u8; len];
                cursor.read_exact(&mut buf)?;
                Value::Text(String::from_utf8(buf)?)
            }
        };
        values.push(value);
    }

    if cursor.position() as usize != data.len() {
        bail!(
            "Row has {} trailing bytes",
            data.len() - cursor.position() as usize
        );
    }

    Ok(values)
}
