use std::collections::BTreeSet;

use super::TypeAttribute;

/// Name candidates for a type.
///
/// Given names come from the input (a top-level name, a schema title) and
/// always beat inferred ones (derived from property names and the like).
/// `distance` counts how many inference steps separate an inferred name from
/// the place it was observed; lower is better.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeNames {
    names: BTreeSet<String>,
    alternatives: BTreeSet<String>,
    inferred: bool,
    distance: u32,
}

impl TypeNames {
    pub fn given<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            alternatives: BTreeSet::new(),
            inferred: false,
            distance: 0,
        }
    }

    pub fn inferred<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inferred: true,
            ..Self::given(names)
        }
    }

    pub fn with_alternatives<I, S>(mut self, alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternatives
            .extend(alternatives.into_iter().map(Into::into));
        self
    }

    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    pub fn alternatives(&self) -> &BTreeSet<String> {
        &self.alternatives
    }

    pub fn is_inferred(&self) -> bool {
        self.inferred
    }

    pub fn distance(&self) -> u32 {
        self.distance
    }

    /// Candidates in preference order: names, then alternatives not already
    /// among the names.
    pub fn proposed_names(&self) -> Vec<String> {
        self.names
            .iter()
            .chain(self.alternatives.iter().filter(|a| !self.names.contains(*a)))
            .cloned()
            .collect()
    }
}

impl TypeAttribute for TypeNames {
    const KIND: &'static str = "names";

    fn combine(&self, other: &Self) -> Option<Self> {
        match (self.inferred, other.inferred) {
            (false, true) => Some(self.clone()),
            (true, false) => Some(other.clone()),
            _ => Some(Self {
                names: self.names.union(&other.names).cloned().collect(),
                alternatives: self
                    .alternatives
                    .union(&other.alternatives)
                    .cloned()
                    .collect(),
                inferred: self.inferred,
                distance: self.distance.min(other.distance),
            }),
        }
    }

    fn increase_distance(&self) -> Option<Self> {
        if !self.inferred {
            return Some(self.clone());
        }
        Some(Self {
            distance: self.distance + 1,
            ..self.clone()
        })
    }

    fn make_inferred(&self) -> Option<Self> {
        Some(Self {
            inferred: true,
            ..self.clone()
        })
    }

    fn stringify(&self) -> Option<String> {
        let names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        let marker = if self.inferred { "~" } else { "" };
        Some(format!("{}{}", marker, names.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_given_beats_inferred() {
        let given = TypeNames::given(["User"]);
        let inferred = TypeNames::inferred(["Author"]);
        assert_eq!(given.combine(&inferred), Some(given.clone()));
        assert_eq!(inferred.combine(&given), Some(given));
    }

    #[test]
    fn test_inferred_names_merge_with_smallest_distance() {
        let near = TypeNames::inferred(["a"]);
        let far = TypeNames::inferred(["b"])
            .increase_distance()
            .and_then(|n| n.increase_distance())
            .unwrap();
        assert_eq!(far.distance(), 2);

        let merged = near.combine(&far).unwrap();
        assert_eq!(merged.distance(), 0);
        assert_eq!(merged.names().len(), 2);
        assert!(merged.is_inferred());
    }

    #[test]
    fn test_proposed_names_order() {
        let names = TypeNames::given(["Beta", "Alpha"]).with_alternatives(["Alpha", "Gamma"]);
        assert_eq!(names.proposed_names(), vec!["Alpha", "Beta", "Gamma"]);
    }
}
