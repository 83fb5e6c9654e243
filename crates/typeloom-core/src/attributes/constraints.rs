use std::collections::BTreeSet;

use ordered_float::OrderedFloat;

use super::TypeAttribute;

/// Free-form documentation lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Description(BTreeSet<String>);

impl Description {
    pub fn new(line: impl Into<String>) -> Self {
        Self(BTreeSet::from([line.into()]))
    }

    pub fn lines(&self) -> &BTreeSet<String> {
        &self.0
    }
}

impl TypeAttribute for Description {
    const KIND: &'static str = "description";

    fn combine(&self, other: &Self) -> Option<Self> {
        Some(Self(self.0.union(&other.0).cloned().collect()))
    }

    fn stringify(&self) -> Option<String> {
        let lines: Vec<&str> = self.0.iter().map(String::as_str).collect();
        Some(lines.join(" / "))
    }
}

/// Inclusive numeric bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MinMax {
    min: Option<OrderedFloat<f64>>,
    max: Option<OrderedFloat<f64>>,
}

impl MinMax {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            min: min.map(OrderedFloat),
            max: max.map(OrderedFloat),
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.min.map(|v| v.0)
    }

    pub fn max(&self) -> Option<f64> {
        self.max.map(|v| v.0)
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min().map_or(true, |min| value >= min) && self.max().map_or(true, |max| value <= max)
    }
}

impl TypeAttribute for MinMax {
    const KIND: &'static str = "minMax";
    const IN_IDENTITY: bool = true;

    // A union admits whatever either side admits.
    fn combine(&self, other: &Self) -> Option<Self> {
        bounds_or_none(Self {
            min: both_min(self.min, other.min),
            max: both_max(self.max, other.max),
        })
    }

    // An intersection takes the most restrictive bound.
    fn intersect(&self, other: &Self) -> Option<Self> {
        Some(Self {
            min: max_option(self.min, other.min),
            max: min_option(self.max, other.max),
        })
    }

    fn stringify(&self) -> Option<String> {
        Some(format_bounds(self.min(), self.max()))
    }
}

/// Inclusive string length bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MinMaxLength {
    min: Option<usize>,
    max: Option<usize>,
}

impl MinMaxLength {
    pub fn new(min: Option<usize>, max: Option<usize>) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> Option<usize> {
        self.min
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    pub fn contains(&self, length: usize) -> bool {
        self.min.map_or(true, |min| length >= min) && self.max.map_or(true, |max| length <= max)
    }
}

impl TypeAttribute for MinMaxLength {
    const KIND: &'static str = "minMaxLength";
    const IN_IDENTITY: bool = true;

    fn combine(&self, other: &Self) -> Option<Self> {
        let combined = Self {
            min: both_min(self.min, other.min),
            max: both_max(self.max, other.max),
        };
        (combined.min.is_some() || combined.max.is_some()).then_some(combined)
    }

    fn intersect(&self, other: &Self) -> Option<Self> {
        Some(Self {
            min: max_option(self.min, other.min),
            max: min_option(self.max, other.max),
        })
    }

    fn stringify(&self) -> Option<String> {
        Some(format_bounds(self.min, self.max))
    }
}

/// Protocols and file extensions observed in URI values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct UriFacts {
    protocols: BTreeSet<String>,
    extensions: BTreeSet<String>,
}

impl UriFacts {
    pub fn new<P, E>(protocols: P, extensions: E) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            protocols: protocols.into_iter().map(Into::into).collect(),
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn protocols(&self) -> &BTreeSet<String> {
        &self.protocols
    }

    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }
}

impl TypeAttribute for UriFacts {
    const KIND: &'static str = "uriFacts";

    fn combine(&self, other: &Self) -> Option<Self> {
        Some(Self {
            protocols: self.protocols.union(&other.protocols).cloned().collect(),
            extensions: self.extensions.union(&other.extensions).cloned().collect(),
        })
    }

    fn intersect(&self, other: &Self) -> Option<Self> {
        Some(Self {
            protocols: self.protocols.intersection(&other.protocols).cloned().collect(),
            extensions: self
                .extensions
                .intersection(&other.extensions)
                .cloned()
                .collect(),
        })
    }
}

/// Indices of the input sources a type was observed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Provenance(BTreeSet<u32>);

impl Provenance {
    pub fn single(index: u32) -> Self {
        Self(BTreeSet::from([index]))
    }

    pub fn from_indices(indices: BTreeSet<u32>) -> Self {
        Self(indices)
    }

    pub fn indices(&self) -> &BTreeSet<u32> {
        &self.0
    }
}

impl TypeAttribute for Provenance {
    const KIND: &'static str = "provenance";

    // Intersections keep every source as well.
    fn combine(&self, other: &Self) -> Option<Self> {
        Some(Self(self.0.union(&other.0).copied().collect()))
    }

    fn stringify(&self) -> Option<String> {
        let indices: Vec<String> = self.0.iter().map(u32::to_string).collect();
        Some(indices.join(","))
    }
}

/// Marks a synthesized union so it never deduplicates with a structurally
/// equal union from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnionIdentifier(u64);

impl UnionIdentifier {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl TypeAttribute for UnionIdentifier {
    const KIND: &'static str = "unionIdentifier";
    const IN_IDENTITY: bool = true;

    fn combine(&self, other: &Self) -> Option<Self> {
        (self == other).then_some(*self)
    }

    fn stringify(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

fn max_option<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

fn min_option<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

/// Lower bound of a union: only bounded if both sides are.
fn both_min<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    Some(a?.min(b?))
}

fn both_max<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    Some(a?.max(b?))
}

fn bounds_or_none(bounds: MinMax) -> Option<MinMax> {
    (bounds.min.is_some() || bounds.max.is_some()).then_some(bounds)
}

fn format_bounds<T: std::fmt::Display>(min: Option<T>, max: Option<T>) -> String {
    let show = |v: Option<T>| v.map(|v| v.to_string()).unwrap_or_default();
    format!("[{}..{}]", show(min), show(max))
}
