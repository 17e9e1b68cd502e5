//! Message field declarations and dynamic field values.

/// Primitive type of a MAVLink message field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldType {
    /// `uint8_t`
    UInt8,
    /// `int8_t`
    Int8,
    /// `uint16_t`
    UInt16,
    /// `int16_t`
    Int16,
    /// `uint32_t`
    UInt32,
    /// `int32_t`
    Int32,
    /// `uint64_t`
    UInt64,
    /// `int64_t`
    Int64,
    /// `float`
    Float,
    /// `double`
    Double,
    /// `char`
    Char,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    pub fn size(&self) -> usize {
        match self {
            FieldType::UInt8 | FieldType::Int8 | FieldType::Char => 1,
            FieldType::UInt16 | FieldType::Int16 => 2,
            FieldType::UInt32 | FieldType::Int32 | FieldType::Float => 4,
            FieldType::UInt64 | FieldType::Int64 | FieldType::Double => 8,
        }
    }

    /// Canonical C type name used to derive the CRC-extra byte.
    pub fn wire_name(&self) -> &'static str {
        match self {
            FieldType::UInt8 => "uint8_t",
            FieldType::Int8 => "int8_t",
            FieldType::UInt16 => "uint16_t",
            FieldType::Int16 => "int16_t",
            FieldType::UInt32 => "uint32_t",
            FieldType::Int32 => "int32_t",
            FieldType::UInt64 => "uint64_t",
            FieldType::Int64 => "int64_t",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Char => "char",
        }
    }
}

/// Declaration of a single message field.
///
/// Fields are registered in declaration order; the wire order is derived by
/// [`MessageSchema`](super::MessageSchema).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDef {
    pub(crate) name: String,
    pub(crate) ty: FieldType,
    pub(crate) array_len: usize,
    pub(crate) extension: bool,
    pub(crate) enumeration: Option<String>,
}

impl FieldDef {
    /// Declares a scalar field.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            array_len: 0,
            extension: false,
            enumeration: None,
        }
    }

    /// Turns this field into an array of `len` elements.
    pub fn array(mut self, len: usize) -> Self {
        self.array_len = len;
        self
    }

    /// Marks this field as a `MAVLink 2` extension.
    pub fn extension(mut self) -> Self {
        self.extension = true;
        self
    }

    /// Associates this field with a named enumeration.
    ///
    /// Enumerations do not affect the wire layout; the mapping registered
    /// with [`Dialect::with_enum`](super::Dialect::with_enum) is available
    /// to the application for display purposes.
    pub fn enumeration(mut self, name: impl Into<String>) -> Self {
        self.enumeration = Some(name.into());
        self
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field primitive type.
    pub fn field_type(&self) -> FieldType {
        self.ty
    }

    /// Array length, or `0` for a scalar field.
    pub fn array_len(&self) -> usize {
        self.array_len
    }

    /// Whether the field is a `MAVLink 2` extension.
    pub fn is_extension(&self) -> bool {
        self.extension
    }

    /// Name of the enumeration backing this field, if any.
    pub fn enum_name(&self) -> Option<&str> {
        self.enumeration.as_deref()
    }

    /// Total size of this field in the payload.
    pub(crate) fn wire_size(&self) -> usize {
        self.ty.size() * self.array_len.max(1)
    }
}

/// Dynamic value of a message field.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// `uint8_t` value.
    UInt8(u8),
    /// `int8_t` value.
    Int8(i8),
    /// `uint16_t` value.
    UInt16(u16),
    /// `int16_t` value.
    Int16(i16),
    /// `uint32_t` value.
    UInt32(u32),
    /// `int32_t` value.
    Int32(i32),
    /// `uint64_t` value.
    UInt64(u64),
    /// `int64_t` value.
    Int64(i64),
    /// `float` value.
    Float(f32),
    /// `double` value.
    Double(f64),
    /// `char` value.
    Char(u8),
    /// Array of scalar values of a single type.
    Array(Vec<Value>),
}

impl Value {
    /// Primitive type of a scalar value, `None` for arrays.
    pub fn scalar_type(&self) -> Option<FieldType> {
        Some(match self {
            Value::UInt8(_) => FieldType::UInt8,
            Value::Int8(_) => FieldType::Int8,
            Value::UInt16(_) => FieldType::UInt16,
            Value::Int16(_) => FieldType::Int16,
            Value::UInt32(_) => FieldType::UInt32,
            Value::Int32(_) => FieldType::Int32,
            Value::UInt64(_) => FieldType::UInt64,
            Value::Int64(_) => FieldType::Int64,
            Value::Float(_) => FieldType::Float,
            Value::Double(_) => FieldType::Double,
            Value::Char(_) => FieldType::Char,
            Value::Array(_) => return None,
        })
    }

    /// Unsigned integer view of a scalar value.
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Value::UInt8(v) | Value::Char(v) => Some(u64::from(*v)),
            Value::UInt16(v) => Some(u64::from(*v)),
            Value::UInt32(v) => Some(u64::from(*v)),
            Value::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    /// Zero value for a field declaration.
    pub(crate) fn zero(def: &FieldDef) -> Value {
        let scalar = || match def.ty {
            FieldType::UInt8 => Value::UInt8(0),
            FieldType::Int8 => Value::Int8(0),
            FieldType::UInt16 => Value::UInt16(0),
            FieldType::Int16 => Value::Int16(0),
            FieldType::UInt32 => Value::UInt32(0),
            FieldType::Int32 => Value::Int32(0),
            FieldType::UInt64 => Value::UInt64(0),
            FieldType::Int64 => Value::Int64(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Char => Value::Char(0),
        };
        if def.array_len > 0 {
            Value::Array((0..def.array_len).map(|_| scalar()).collect())
        } else {
            scalar()
        }
    }

    /// Whether this value is assignable to a field declaration.
    pub(crate) fn matches(&self, def: &FieldDef) -> bool {
        match self {
            Value::Array(items) => {
                def.array_len > 0
                    && items.len() <= def.array_len
                    && items.iter().all(|item| item.scalar_type() == Some(def.ty))
            }
            scalar => def.array_len == 0 && scalar.scalar_type() == Some(def.ty),
        }
    }

    /// Writes a scalar value into the beginning of `out` in little-endian.
    pub(crate) fn write_scalar(&self, out: &mut [u8]) {
        match self {
            Value::UInt8(v) | Value::Char(v) => out[0] = *v,
            Value::Int8(v) => out[0] = *v as u8,
            Value::UInt16(v) => out[..2].copy_from_slice(&v.to_le_bytes()),
            Value::Int16(v) => out[..2].copy_from_slice(&v.to_le_bytes()),
            Value::UInt32(v) => out[..4].copy_from_slice(&v.to_le_bytes()),
            Value::Int32(v) => out[..4].copy_from_slice(&v.to_le_bytes()),
            Value::UInt64(v) => out[..8].copy_from_slice(&v.to_le_bytes()),
            Value::Int64(v) => out[..8].copy_from_slice(&v.to_le_bytes()),
            Value::Float(v) => out[..4].copy_from_slice(&v.to_le_bytes()),
            Value::Double(v) => out[..8].copy_from_slice(&v.to_le_bytes()),
            Value::Array(_) => unreachable!("arrays are written element-wise"),
        }
    }

    /// Reads a scalar value of `ty` from the beginning of `bytes`.
    pub(crate) fn read_scalar(ty: FieldType, bytes: &[u8]) -> Value {
        match ty {
            FieldType::UInt8 => Value::UInt8(bytes[0]),
            FieldType::Int8 => Value::Int8(bytes[0] as i8),
            FieldType::Char => Value::Char(bytes[0]),
            FieldType::UInt16 => Value::UInt16(u16::from_le_bytes([bytes[0], bytes[1]])),
            FieldType::Int16 => Value::Int16(i16::from_le_bytes([bytes[0], bytes[1]])),
            FieldType::UInt32 => {
                Value::UInt32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            FieldType::Int32 => {
                Value::Int32(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            FieldType::Float => {
                Value::Float(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            FieldType::UInt64 => Value::UInt64(u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])),
            FieldType::Int64 => Value::Int64(i64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])),
            FieldType::Double => Value::Double(f64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])),
        }
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }

            impl From<Vec<$ty>> for Value {
                fn from(values: Vec<$ty>) -> Self {
                    Value::Array(values.into_iter().map(Value::$variant).collect())
                }
            }
        )*
    };
}

impl_value_from! {
    u8 => UInt8,
    i8 => Int8,
    u16 => UInt16,
    i16 => Int16,
    u32 => UInt32,
    i32 => Int32,
    u64 => UInt64,
    i64 => Int64,
    f32 => Float,
    f64 => Double,
}

impl From<&str> for Value {
    /// Converts a string into a `char` array value.
    fn from(value: &str) -> Self {
        Value::Array(value.bytes().map(Value::Char).collect())
    }
}
