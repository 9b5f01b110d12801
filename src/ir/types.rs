//! Type model for IR values
//!
//! A deliberately small JVM-flavored type lattice. The IR only needs enough
//! typing to give every value a printable type and to derive result types
//! for the instruction factory; descriptor parsing lives outside the core.

use std::fmt;

/// Internal name of the root exception type, used as the default exception
/// type for catch blocks.
pub const DEFAULT_EXCEPTION: &str = "java/lang/Throwable";

/// Type of an IR value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    /// The type of the `null` constant
    Null,
    /// Result type of instructions that produce no value
    Void,
    /// Reference type, named by its internal form (e.g. `java/lang/Object`)
    Reference(String),
    /// Array type with the given element type
    Array(Box<Type>),
}

impl Type {
    /// Reference to a class given by internal name
    pub fn reference(name: impl Into<String>) -> Type {
        Type::Reference(name.into())
    }

    /// Array of the given element type
    pub fn array_of(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    /// The default exception reference type
    pub fn throwable() -> Type {
        Type::reference(DEFAULT_EXCEPTION)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::Byte
                | Type::Short
                | Type::Char
                | Type::Int
                | Type::Long
                | Type::Float
                | Type::Double
        )
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Reference(_) | Type::Array(_) | Type::Null)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Element type of an array type; `Null` stays `Null` so that loads from
    /// a null-typed reference remain well-typed.
    pub fn element(&self) -> Option<Type> {
        match self {
            Type::Array(element) => Some((**element).clone()),
            Type::Null => Some(Type::Null),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Byte => write!(f, "byte"),
            Type::Short => write!(f, "short"),
            Type::Char => write!(f, "char"),
            Type::Int => write!(f, "int"),
            Type::Long => write!(f, "long"),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::Null => write!(f, "null"),
            Type::Void => write!(f, "void"),
            Type::Reference(name) => write!(f, "{}", name),
            Type::Array(element) => write!(f, "{}[]", element),
        }
    }
}
