//! Column storage types and the per-type binding table.

/// Column storage type of a mapped property.
///
/// Recorded on the property profile as mapping metadata; the binding
/// decision comes from [`TypeInfo`], not from this enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal { precision: u8, scale: u8 },
    Boolean,
    Text,
    VarChar(u32),
    Blob,
    Date,
    Timestamp,
    Uuid,
    Json,
    /// Engine-specific type name.
    Custom(&'static str),
}

/// Trait for types that have a corresponding SQL type.
///
/// Besides the column type, the trait decides how a value of the type
/// reaches the database: inlined as literal text, or sent as a bound
/// parameter. Only plain integers are inlined by default; a user-defined
/// integral enum can opt in by setting `INLINE_LITERAL = true`.
pub trait TypeInfo {
    /// The SQL type for this Rust type.
    const SQL_TYPE: SqlType;

    /// Whether this type is nullable by default.
    const NULLABLE: bool = false;

    /// Whether values of this type may be rendered as inline literal text.
    const INLINE_LITERAL: bool = false;
}

macro_rules! impl_type_info {
    ($($ty:ty => $sql:expr, inline = $inline:expr;)*) => {
        $(
            impl TypeInfo for $ty {
                const SQL_TYPE: SqlType = $sql;
                const INLINE_LITERAL: bool = $inline;
            }
        )*
    };
}

impl_type_info! {
    i8 => SqlType::TinyInt, inline = true;
    i16 => SqlType::SmallInt, inline = true;
    i32 => SqlType::Integer, inline = true;
    i64 => SqlType::BigInt, inline = true;
    u8 => SqlType::SmallInt, inline = true;
    u16 => SqlType::Integer, inline = true;
    u32 => SqlType::BigInt, inline = true;
    f32 => SqlType::Real, inline = false;
    f64 => SqlType::Double, inline = false;
    bool => SqlType::Boolean, inline = false;
    String => SqlType::Text, inline = false;
    Vec<u8> => SqlType::Blob, inline = false;
    serde_json::Value => SqlType::Json, inline = false;
    [u8; 16] => SqlType::Uuid, inline = false;
}

impl<T: TypeInfo> TypeInfo for Option<T> {
    const SQL_TYPE: SqlType = T::SQL_TYPE;
    const NULLABLE: bool = true;
    const INLINE_LITERAL: bool = T::INLINE_LITERAL;
}
