use crate::error::IrError;

/// Semantic type carried by every expression node.
///
/// Invariants (enforced by the checked constructors):
/// - `Struct` has at least one field.
/// - `Vector` has `1 <= dim <= dtypes.len()`; the first `dim` entries are the
///   coordinate (iterator) types, the rest the per-row payload.
/// - `Void` only types the output of a procedure-form `Func`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    /// Abstract iteration index (a storage position).
    Idx,
    Ptr(Box<DataType>),
    Struct(Vec<DataType>),
    Vector { dtypes: Vec<DataType>, dim: usize },
    Void,
}

impl DataType {
    /// Builds a struct type, rejecting an empty field list.
    pub fn struct_of(fields: Vec<DataType>) -> Result<DataType, IrError> {
        if fields.is_empty() {
            return Err(IrError::InvalidType {
                detail: "a struct needs at least one field".into(),
            });
        }
        Ok(DataType::Struct(fields))
    }

    /// Builds a vector type whose first `dim` types are coordinates.
    pub fn vector(dtypes: Vec<DataType>, dim: usize) -> Result<DataType, IrError> {
        if dim == 0 || dim > dtypes.len() {
            return Err(IrError::InvalidType {
                detail: format!(
                    "vector dimension {} must lie in 1..={}",
                    dim,
                    dtypes.len()
                ),
            });
        }
        if let Some(bad) = dtypes.iter().find(|t| !t.is_val()) {
            return Err(IrError::InvalidType {
                detail: format!("vector column of type '{}' is not a value type", bad),
            });
        }
        Ok(DataType::Vector { dtypes, dim })
    }

    pub fn ptr(&self) -> DataType {
        DataType::Ptr(Box::new(self.clone()))
    }

    pub fn deref(&self) -> Result<&DataType, IrError> {
        match self {
            DataType::Ptr(elem) => Ok(elem),
            other => Err(IrError::mismatch("pointer dereference", "*_", other)),
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, DataType::Struct(_))
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, DataType::Ptr(_))
    }

    pub fn is_idx(&self) -> bool {
        matches!(self, DataType::Idx)
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, DataType::Vector { .. })
    }

    pub fn is_void(&self) -> bool {
        matches!(self, DataType::Void)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, DataType::Bool)
    }

    /// Anything that can be stored in a register or a vector column.
    pub fn is_val(&self) -> bool {
        !self.is_vector() && !self.is_void()
    }

    pub fn is_int(&self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::Float32
                | DataType::Float64
        )
    }

    /// Integer-like types that live on the integer line (ints and `Idx`).
    pub fn is_integral(&self) -> bool {
        self.is_int() || self.is_idx()
    }

    pub fn is_primitive(&self) -> bool {
        self.is_int() || self.is_float() || self.is_idx() || self.is_bool()
    }

    /// Fields of a struct, or `None` for every other tag.
    pub fn fields(&self) -> Option<&[DataType]> {
        match self {
            DataType::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Vector dimension; 0 for non-vectors.
    pub fn dim(&self) -> usize {
        match self {
            DataType::Vector { dim, .. } => *dim,
            _ => 0,
        }
    }

    /// Column types of a vector (coordinates then payload).
    pub fn columns(&self) -> Result<&[DataType], IrError> {
        match self {
            DataType::Vector { dtypes, .. } => Ok(dtypes),
            other => Err(IrError::mismatch("vector columns", "~[..]", other)),
        }
    }

    /// Coordinate type: the single iterator type for `dim == 1`, otherwise a
    /// struct of all coordinate types.
    pub fn iterty(&self) -> Result<DataType, IrError> {
        match self {
            DataType::Vector { dtypes, dim } if *dim == 1 => Ok(dtypes[0].clone()),
            DataType::Vector { dtypes, dim } => DataType::struct_of(dtypes[..*dim].to_vec()),
            other => Err(IrError::mismatch("iterator type", "~[..]", other)),
        }
    }

    /// Payload type of one vector row, as a struct.
    pub fn valty(&self) -> Result<DataType, IrError> {
        match self {
            DataType::Vector { dtypes, dim } => DataType::struct_of(dtypes[*dim..].to_vec()),
            other => Err(IrError::mismatch("row type", "~[..]", other)),
        }
    }

    /// Alias of [`DataType::valty`]: the value a fold sees for each row.
    pub fn rowty(&self) -> Result<DataType, IrError> {
        self.valty()
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Bool => f.write_str("bool"),
            DataType::Int8 => f.write_str("i8"),
            DataType::Int16 => f.write_str("i16"),
            DataType::Int32 => f.write_str("i32"),
            DataType::Int64 => f.write_str("i64"),
            DataType::UInt8 => f.write_str("u8"),
            DataType::UInt16 => f.write_str("u16"),
            DataType::UInt32 => f.write_str("u32"),
            DataType::UInt64 => f.write_str("u64"),
            DataType::Float32 => f.write_str("f32"),
            DataType::Float64 => f.write_str("f64"),
            DataType::Idx => f.write_str("idx"),
            DataType::Void => f.write_str("void"),
            DataType::Ptr(elem) => write!(f, "*{}", elem),
            DataType::Struct(fields) => {
                write!(f, "{{")?;
                for (i, t) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, "}}")
            }
            DataType::Vector { dtypes, dim } => {
                write!(f, "~[")?;
                for (i, t) in dtypes.iter().enumerate() {
                    if i == *dim {
                        write!(f, "; ")?;
                    } else if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, "]")
            }
        }
    }
}
