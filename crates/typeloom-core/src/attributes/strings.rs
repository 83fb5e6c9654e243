use std::collections::{BTreeMap, BTreeSet};

use super::TypeAttribute;
use crate::types::PrimitiveKind;

/// What is known about the values of a string type.
///
/// `cases` is `None` for an unrestricted string and otherwise the observed
/// values with their occurrence counts. `transformations` lists the
/// transformed-string kinds every observed value conforms to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StringTypes {
    cases: Option<BTreeMap<String, usize>>,
    transformations: BTreeSet<PrimitiveKind>,
}

impl StringTypes {
    pub fn unrestricted() -> Self {
        Self {
            cases: None,
            transformations: BTreeSet::new(),
        }
    }

    pub fn from_cases<I, S>(cases: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (case, count) in cases {
            *map.entry(case.into()).or_insert(0) += count;
        }
        Self {
            cases: Some(map),
            transformations: BTreeSet::new(),
        }
    }

    pub fn from_transformations(transformations: impl IntoIterator<Item = PrimitiveKind>) -> Self {
        let transformations: BTreeSet<_> = transformations.into_iter().collect();
        assert!(
            transformations.iter().all(|k| k.is_transformed_string()),
            "only transformed-string kinds can be recorded as string transformations"
        );
        Self {
            cases: None,
            transformations,
        }
    }

    pub fn is_restricted(&self) -> bool {
        self.cases.is_some()
    }

    pub fn cases(&self) -> Option<&BTreeMap<String, usize>> {
        self.cases.as_ref()
    }

    pub fn transformations(&self) -> &BTreeSet<PrimitiveKind> {
        &self.transformations
    }

    /// Total number of observations across every case.
    pub fn total_count(&self) -> usize {
        self.cases
            .as_ref()
            .map(|cases| cases.values().sum())
            .unwrap_or(0)
    }
}

impl TypeAttribute for StringTypes {
    const KIND: &'static str = "stringTypes";
    const IN_IDENTITY: bool = true;

    fn combine(&self, other: &Self) -> Option<Self> {
        let cases = match (&self.cases, &other.cases) {
            (Some(a), Some(b)) => {
                let mut merged = a.clone();
                for (case, count) in b {
                    *merged.entry(case.clone()).or_insert(0) += count;
                }
                Some(merged)
            }
            _ => None,
        };
        Some(Self {
            cases,
            transformations: self
                .transformations
                .union(&other.transformations)
                .copied()
                .collect(),
        })
    }

    fn intersect(&self, other: &Self) -> Option<Self> {
        let cases = match (&self.cases, &other.cases) {
            (Some(a), Some(b)) => Some(
                a.iter()
                    .filter_map(|(case, count)| {
                        b.get(case).map(|other| (case.clone(), (*count).min(*other)))
                    })
                    .collect(),
            ),
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        };
        Some(Self {
            cases,
            transformations: self
                .transformations
                .intersection(&other.transformations)
                .copied()
                .collect(),
        })
    }

    fn stringify(&self) -> Option<String> {
        match &self.cases {
            None if self.transformations.is_empty() => None,
            None => {
                let kinds: Vec<&str> = self.transformations.iter().map(|k| k.name()).collect();
                Some(format!("unrestricted ({})", kinds.join(",")))
            }
            Some(cases) => {
                let shown: Vec<&str> = cases.keys().take(5).map(String::as_str).collect();
                let more = if cases.len() > 5 { ",..." } else { "" };
                Some(format!("{} cases: {}{}", cases.len(), shown.join(","), more))
            }
        }
    }
}
