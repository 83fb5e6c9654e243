//! Type representation for the type graph
//!
//! Every type lives in the arena of exactly one [`TypeGraph`](crate::graph::TypeGraph)
//! generation and refers to its children through [`TypeRef`]s, never through
//! owning pointers. That is what lets a class refer to itself.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attributes::{IdentityAttributes, TypeAttributes};

/// Index of a type within one graph generation.
///
/// The serial identifies the generation the ref was allocated in. Using a ref
/// with a graph or builder of another generation is a bug in the calling
/// pass and aborts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef {
    serial: u32,
    index: u32,
}

impl TypeRef {
    pub(crate) fn new(serial: u32, index: usize) -> Self {
        let index = u32::try_from(index).unwrap_or_else(|_| panic!("type index {} overflows", index));
        Self { serial, index }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn serial(self) -> u32 {
        self.serial
    }

    pub(crate) fn assert_serial(self, serial: u32) {
        assert_eq!(
            self.serial, serial,
            "type ref {:?} from generation {} used in generation {}",
            self, self.serial, serial
        );
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.serial)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Leaf kinds. The transformed-string kinds are strings on the wire that
/// decode to something richer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveKind {
    None,
    Any,
    Null,
    Bool,
    Integer,
    Double,
    String,
    Date,
    Time,
    DateTime,
    Uuid,
    Uri,
    IntegerString,
    BoolString,
}

impl PrimitiveKind {
    pub const TRANSFORMED_STRINGS: [PrimitiveKind; 7] = [
        PrimitiveKind::Date,
        PrimitiveKind::Time,
        PrimitiveKind::DateTime,
        PrimitiveKind::Uuid,
        PrimitiveKind::Uri,
        PrimitiveKind::IntegerString,
        PrimitiveKind::BoolString,
    ];

    pub fn is_number(self) -> bool {
        matches!(self, PrimitiveKind::Integer | PrimitiveKind::Double)
    }

    pub fn is_transformed_string(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Date
                | PrimitiveKind::Time
                | PrimitiveKind::DateTime
                | PrimitiveKind::Uuid
                | PrimitiveKind::Uri
                | PrimitiveKind::IntegerString
                | PrimitiveKind::BoolString
        )
    }

    /// Plain strings and every transformed-string kind.
    pub fn is_string_like(self) -> bool {
        self == PrimitiveKind::String || self.is_transformed_string()
    }

    /// The kind a transformed string decodes into. Kinds that stay
    /// string-backed in the target (dates, uuids, ...) map to themselves.
    pub fn transformation_target(self) -> PrimitiveKind {
        match self {
            PrimitiveKind::IntegerString => PrimitiveKind::Integer,
            PrimitiveKind::BoolString => PrimitiveKind::Bool,
            other => other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::None => "none",
            PrimitiveKind::Any => "any",
            PrimitiveKind::Null => "null",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::Double => "double",
            PrimitiveKind::String => "string",
            PrimitiveKind::Date => "date",
            PrimitiveKind::Time => "time",
            PrimitiveKind::DateTime => "date-time",
            PrimitiveKind::Uuid => "uuid",
            PrimitiveKind::Uri => "uri",
            PrimitiveKind::IntegerString => "integer-string",
            PrimitiveKind::BoolString => "bool-string",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flat tag of a [`Type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeKind {
    Primitive(PrimitiveKind),
    Array,
    Class,
    Map,
    Object,
    Enum,
    Union,
    Intersection,
}

impl TypeKind {
    pub fn is_object_family(self) -> bool {
        matches!(self, TypeKind::Class | TypeKind::Map | TypeKind::Object)
    }

    pub fn is_set_operation(self) -> bool {
        matches!(self, TypeKind::Union | TypeKind::Intersection)
    }

    pub fn is_primitive(self) -> bool {
        matches!(self, TypeKind::Primitive(_))
    }

    /// String-like kinds plus enums: everything that is a string on the wire.
    pub fn is_string_like(self) -> bool {
        match self {
            TypeKind::Primitive(p) => p.is_string_like(),
            TypeKind::Enum => true,
            _ => false,
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Primitive(p) => write!(f, "{}", p),
            TypeKind::Array => f.write_str("array"),
            TypeKind::Class => f.write_str("class"),
            TypeKind::Map => f.write_str("map"),
            TypeKind::Object => f.write_str("object"),
            TypeKind::Enum => f.write_str("enum"),
            TypeKind::Union => f.write_str("union"),
            TypeKind::Intersection => f.write_str("intersection"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassProperty {
    pub ty: TypeRef,
    pub optional: bool,
}

impl ClassProperty {
    pub fn new(ty: TypeRef, optional: bool) -> Self {
        Self { ty, optional }
    }

    pub fn required(ty: TypeRef) -> Self {
        Self::new(ty, false)
    }
}

pub type PropertyMap = BTreeMap<String, ClassProperty>;

static NO_PROPERTIES: PropertyMap = BTreeMap::new();

/// Core type representation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(PrimitiveKind),
    Array {
        items: TypeRef,
    },
    /// Fixed property set
    Class {
        properties: PropertyMap,
    },
    /// Uniform value type
    Map {
        values: TypeRef,
    },
    /// Transient form carrying both properties and additional properties;
    /// replaced by a class or a map before rendering.
    Object {
        properties: PropertyMap,
        additional_properties: Option<TypeRef>,
    },
    Enum {
        cases: BTreeSet<String>,
    },
    Union {
        members: BTreeSet<TypeRef>,
    },
    Intersection {
        members: BTreeSet<TypeRef>,
    },
}

impl Type {
    pub fn kind(&self) -> TypeKind {
        match self {
            Type::Primitive(p) => TypeKind::Primitive(*p),
            Type::Array { .. } => TypeKind::Array,
            Type::Class { .. } => TypeKind::Class,
            Type::Map { .. } => TypeKind::Map,
            Type::Object { .. } => TypeKind::Object,
            Type::Enum { .. } => TypeKind::Enum,
            Type::Union { .. } => TypeKind::Union,
            Type::Intersection { .. } => TypeKind::Intersection,
        }
    }

    /// Direct structural children in canonical order: properties by name,
    /// then additional properties, set members by ref.
    pub fn children(&self) -> Vec<TypeRef> {
        match self {
            Type::Primitive(_) | Type::Enum { .. } => Vec::new(),
            Type::Array { items } => vec![*items],
            Type::Class { properties } => properties.values().map(|p| p.ty).collect(),
            Type::Map { values } => vec![*values],
            Type::Object {
                properties,
                additional_properties,
            } => properties
                .values()
                .map(|p| p.ty)
                .chain(additional_properties.iter().copied())
                .collect(),
            Type::Union { members } | Type::Intersection { members } => {
                members.iter().copied().collect()
            }
        }
    }

    /// Properties and additional properties of any object-family type.
    /// Maps have no properties and their values as additional properties.
    pub fn object_view(&self) -> Option<(&PropertyMap, Option<TypeRef>)> {
        match self {
            Type::Class { properties } => Some((properties, None)),
            Type::Map { values } => Some((&NO_PROPERTIES, Some(*values))),
            Type::Object {
                properties,
                additional_properties,
            } => Some((properties, *additional_properties)),
            _ => None,
        }
    }

    pub fn members(&self) -> Option<&BTreeSet<TypeRef>> {
        match self {
            Type::Union { members } | Type::Intersection { members } => Some(members),
            _ => None,
        }
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }
}

/// Value-equality key deduplicating structurally equal types within one
/// generation. Hash and equality both cover the structure and the
/// attributes that participate in identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeIdentity {
    ty: Type,
    attributes: IdentityAttributes,
}

impl TypeIdentity {
    /// `None` when some attribute forces the type to be unique.
    pub fn new(ty: &Type, attributes: &TypeAttributes) -> Option<Self> {
        attributes.identity().map(|attributes| Self {
            ty: ty.clone(),
            attributes,
        })
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transformed_string_targets() {
        assert_eq!(
            PrimitiveKind::IntegerString.transformation_target(),
            PrimitiveKind::Integer
        );
        assert_eq!(
            PrimitiveKind::BoolString.transformation_target(),
            PrimitiveKind::Bool
        );
        assert_eq!(
            PrimitiveKind::DateTime.transformation_target(),
            PrimitiveKind::DateTime
        );
        for kind in PrimitiveKind::TRANSFORMED_STRINGS {
            assert!(kind.is_transformed_string());
            assert!(kind.is_string_like());
        }
        assert!(!PrimitiveKind::String.is_transformed_string());
        assert!(PrimitiveKind::String.is_string_like());
    }

    #[test]
    fn test_object_view_of_map() {
        let values = TypeRef::new(0, 3);
        let map = Type::Map { values };
        let (properties, additional) = map.object_view().unwrap();
        assert!(properties.is_empty());
        assert_eq!(additional, Some(values));
        assert_eq!(map.children(), vec![values]);
    }

    #[test]
    fn test_children_order() {
        let a = TypeRef::new(0, 1);
        let b = TypeRef::new(0, 2);
        let extra = TypeRef::new(0, 3);
        let mut properties = PropertyMap::new();
        properties.insert("zeta".to_string(), ClassProperty::required(a));
        properties.insert("alpha".to_string(), ClassProperty::new(b, true));
        let object = Type::Object {
            properties,
            additional_properties: Some(extra),
        };
        assert_eq!(object.children(), vec![b, a, extra]);
        assert_eq!(object.kind(), TypeKind::Object);
        assert!(object.kind().is_object_family());
    }

    #[test]
    fn test_identity_depends_on_structure() {
        let attributes = TypeAttributes::new();
        let a = TypeIdentity::new(&Type::Primitive(PrimitiveKind::Integer), &attributes);
        let b = TypeIdentity::new(&Type::Primitive(PrimitiveKind::Integer), &attributes);
        let c = TypeIdentity::new(&Type::Primitive(PrimitiveKind::Double), &attributes);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    #[should_panic(expected = "from generation 0 used in generation 1")]
    fn test_cross_generation_ref_panics() {
        TypeRef::new(0, 0).assert_serial(1);
    }
}
