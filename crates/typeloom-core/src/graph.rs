//! Immutable type graph generations

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::attributes::TypeAttributes;
use crate::types::{Type, TypeKind, TypeRef};

/// One frozen generation of the type graph.
///
/// Passes never mutate a graph; they build the next generation and hand it
/// out as `Arc<TypeGraph>`, so an unchanged graph is observable as the same
/// allocation.
#[derive(Debug)]
pub struct TypeGraph {
    serial: u32,
    types: Vec<Type>,
    attributes: Vec<TypeAttributes>,
    top_levels: BTreeMap<String, TypeRef>,
    lost_type_attributes: bool,
}

impl TypeGraph {
    pub(crate) fn from_parts(
        serial: u32,
        types: Vec<Type>,
        attributes: Vec<TypeAttributes>,
        top_levels: BTreeMap<String, TypeRef>,
        lost_type_attributes: bool,
    ) -> Self {
        debug_assert_eq!(types.len(), attributes.len());
        Self {
            serial,
            types,
            attributes,
            top_levels,
            lost_type_attributes,
        }
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Number of types in the arena, reachable or not.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn type_at(&self, r: TypeRef) -> &Type {
        r.assert_serial(self.serial);
        &self.types[r.index()]
    }

    pub fn attributes_of(&self, r: TypeRef) -> &TypeAttributes {
        r.assert_serial(self.serial);
        &self.attributes[r.index()]
    }

    pub fn kind_of(&self, r: TypeRef) -> TypeKind {
        self.type_at(r).kind()
    }

    pub fn top_levels(&self) -> &BTreeMap<String, TypeRef> {
        &self.top_levels
    }

    pub fn top_level(&self, name: &str) -> Option<TypeRef> {
        self.top_levels.get(name).copied()
    }

    /// Whether the pass that produced this generation dropped information.
    pub fn lost_type_attributes(&self) -> bool {
        self.lost_type_attributes
    }

    /// Structural children followed by refs embedded in attributes.
    pub fn children(&self, r: TypeRef) -> Vec<TypeRef> {
        let mut children = self.type_at(r).children();
        children.extend(self.attributes_of(r).children());
        children
    }

    /// Every ref in the arena, in index order.
    pub fn refs(&self) -> impl Iterator<Item = TypeRef> + '_ {
        (0..self.types.len()).map(move |index| TypeRef::new(self.serial, index))
    }

    /// Types reachable from the top-levels, in canonical order: top-levels
    /// by name, each followed depth-first by its children.
    pub fn all_types(&self) -> Vec<TypeRef> {
        let mut seen = vec![false; self.types.len()];
        let mut order = Vec::new();
        for &root in self.top_levels.values() {
            let mut stack = vec![root];
            while let Some(r) = stack.pop() {
                if std::mem::replace(&mut seen[r.index()], true) {
                    continue;
                }
                order.push(r);
                let children = self.children(r);
                stack.extend(children.into_iter().rev());
            }
        }
        order
    }

    /// Reachable types that get a declaration of their own in the output.
    pub fn all_named_types(&self) -> Vec<TypeRef> {
        self.all_types()
            .into_iter()
            .filter(|r| is_named_kind(self.kind_of(*r)))
            .collect()
    }

    /// Reachable types of one kind.
    pub fn types_of_kind(&self, kind: TypeKind) -> Vec<TypeRef> {
        self.all_types()
            .into_iter()
            .filter(|r| self.kind_of(*r) == kind)
            .collect()
    }

    /// Textual dump, one line per reachable type.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "graph generation {} ({} types)", self.serial, self.len());
        for (name, r) in &self.top_levels {
            let _ = writeln!(out, "top-level {} = {}", name, r);
        }
        for r in self.all_types() {
            let _ = write!(out, "{}: {}", r, describe_type(self.type_at(r)));
            let attributes = self.attributes_of(r).describe();
            if !attributes.is_empty() {
                let _ = write!(out, " [{}]", attributes.join("; "));
            }
            out.push('\n');
        }
        out
    }
}

/// Kinds that become named declarations: classes, objects, enums, unions.
pub fn is_named_kind(kind: TypeKind) -> bool {
    matches!(
        kind,
        TypeKind::Class | TypeKind::Object | TypeKind::Enum | TypeKind::Union
    )
}

fn describe_type(ty: &Type) -> String {
    let refs = |members: &BTreeSet<TypeRef>| {
        members
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    };
    match ty {
        Type::Primitive(p) => p.to_string(),
        Type::Array { items } => format!("array of {}", items),
        Type::Class { properties } | Type::Object { properties, .. } => {
            let props: Vec<String> = properties
                .iter()
                .map(|(name, p)| format!("{}{}: {}", name, if p.optional { "?" } else { "" }, p.ty))
                .collect();
            let additional = match ty {
                Type::Object {
                    additional_properties: Some(a),
                    ..
                } => format!(" ...{}", a),
                _ => String::new(),
            };
            format!("{} {{{}}}{}", ty.kind(), props.join(", "), additional)
        }
        Type::Map { values } => format!("map of {}", values),
        Type::Enum { cases } => {
            let cases: Vec<&str> = cases.iter().map(String::as_str).collect();
            format!("enum {{{}}}", cases.join(", "))
        }
        Type::Union { members } => format!("union {{{}}}", refs(members)),
        Type::Intersection { members } => format!("intersection {{{}}}", refs(members)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TypeBuilder;
    use crate::types::{ClassProperty, PrimitiveKind, PropertyMap};

    #[test]
    fn test_all_types_follows_top_levels_depth_first() {
        let mut builder = TypeBuilder::new();
        let unreachable =
            builder.get_primitive_type(PrimitiveKind::Bool, TypeAttributes::new(), None);
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new(), None);
        let list = builder.get_array_type(TypeAttributes::new(), int, None);
        let mut properties = PropertyMap::new();
        properties.insert("b".to_string(), ClassProperty::required(int));
        properties.insert("a".to_string(), ClassProperty::required(list));
        let class = builder.get_class_type(TypeAttributes::new(), properties, None);
        builder.add_top_level("Zed", int);
        builder.add_top_level("Alpha", class);
        let graph = builder.finish();

        assert_eq!(graph.all_types(), vec![class, list, int]);
        assert!(!graph.all_types().contains(&unreachable));
        assert_eq!(graph.all_named_types(), vec![class]);
        assert_eq!(graph.refs().count(), 4);
    }

    #[test]
    fn test_describe_lists_reachable_types() {
        let mut builder = TypeBuilder::new();
        let s = builder.get_string_type(TypeAttributes::new(), None, None);
        builder.add_top_level("Name", s);
        let graph = builder.finish();
        let text = graph.describe();
        assert!(text.contains("top-level Name = #0"));
        assert!(text.contains("#0: string"));
    }
}
