//! Naming functions and batch disambiguation.

use std::collections::BTreeSet;

use crate::style::NameStyle;

/// Adjectives tried, in order, to tell apart names that want the same
/// identifier.
pub const FUN_PREFIXES: &[&str] = &[
    "Purple",
    "Fluffy",
    "Tentacled",
    "Sticky",
    "Indigo",
    "Indecent",
    "Hilarious",
    "Ambitious",
    "Cunning",
    "Magenta",
    "Frisky",
    "Mischievous",
    "Braggadocious",
];

/// A naming function: a style plus the prefixes it falls back on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namer {
    label: String,
    style: NameStyle,
    prefixes: Vec<String>,
}

/// One name of a batch: its candidates in preference order, and a check
/// that a styled result does not clash for the names it sponsors.
#[derive(Clone, Copy)]
pub struct Request<'a> {
    pub candidates: &'a [String],
    pub acceptable: &'a dyn Fn(&str) -> bool,
}

impl Namer {
    pub fn new<I, S>(label: impl Into<String>, style: NameStyle, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.into(),
            style,
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn style(&self) -> NameStyle {
        self.style
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn styled(&self, raw: &str) -> String {
        self.style.apply(raw)
    }

    /// Resolve one batch of names that compete for the same identifiers.
    ///
    /// Each name first gets its earliest candidate that is neither
    /// forbidden nor proposed by any other name of the batch. The rest are
    /// disambiguated in batch order from their first candidate: the bare
    /// name if still free, then one prefix each from a shared prefix
    /// sequence, then numeric suffixes. Every try is restyled and checked
    /// against `forbidden`, which grows as names are handed out.
    pub fn assign_batch(&self, requests: &[Request<'_>], forbidden: &mut BTreeSet<String>) -> Vec<String> {
        assert!(!requests.is_empty(), "empty naming batch for {}", self.label);

        let proposed: Vec<BTreeSet<String>> = requests
            .iter()
            .map(|r| r.candidates.iter().map(|c| self.styled(c)).collect())
            .collect();

        let mut assigned: Vec<Option<String>> = vec![None; requests.len()];
        for (i, request) in requests.iter().enumerate() {
            let unique = request.candidates.iter().map(|c| self.styled(c)).find(|styled| {
                !forbidden.contains(styled)
                    && (request.acceptable)(styled.as_str())
                    && proposed
                        .iter()
                        .enumerate()
                        .all(|(j, other)| j == i || !other.contains(styled))
            });
            if let Some(styled) = unique {
                forbidden.insert(styled.clone());
                assigned[i] = Some(styled);
            }
        }

        let mut prefixes = self.prefixes.iter();
        let mut suffix = 1usize;
        for (i, request) in requests.iter().enumerate() {
            if assigned[i].is_some() {
                continue;
            }
            let original = &request.candidates[0];
            let mut attempt = Some(original.clone());
            loop {
                let raw = match attempt.take() {
                    Some(bare) => bare,
                    None => match prefixes.next() {
                        Some(prefix) => format!("{}_{}", prefix, original),
                        None => {
                            suffix += 1;
                            format!("{}_{}", original, suffix - 1)
                        }
                    },
                };
                let styled = self.styled(&raw);
                if forbidden.contains(&styled) || !(request.acceptable)(styled.as_str()) {
                    continue;
                }
                forbidden.insert(styled.clone());
                assigned[i] = Some(styled);
                break;
            }
        }

        assigned.into_iter().flatten().collect()
    }
}

/// A namer falling back on [`FUN_PREFIXES`].
pub fn fun_prefix_namer(label: impl Into<String>, style: NameStyle) -> Namer {
    Namer::new(label, style, FUN_PREFIXES.iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn batch(namer: &Namer, candidates: &[Vec<String>], forbidden: &mut BTreeSet<String>) -> Vec<String> {
        let any = |_: &str| true;
        let requests: Vec<Request<'_>> = candidates
            .iter()
            .map(|c| Request { candidates: c, acceptable: &any })
            .collect();
        namer.assign_batch(&requests, forbidden)
    }

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unique_candidates_are_taken_as_is() {
        let namer = fun_prefix_namer("types", NameStyle::Pascal);
        let result = batch(&namer, &[names(&["user"]), names(&["group"])], &mut BTreeSet::new());
        assert_eq!(result, vec!["User", "Group"]);
    }

    #[test]
    fn test_later_candidate_avoids_a_clash() {
        let namer = fun_prefix_namer("types", NameStyle::Pascal);
        let result = batch(
            &namer,
            &[names(&["item", "entry"]), names(&["item"])],
            &mut BTreeSet::new(),
        );
        assert_eq!(result, vec!["Entry", "Item"]);
    }

    #[test]
    fn test_clashes_get_prefixes() {
        let namer = fun_prefix_namer("properties", NameStyle::Pascal);
        let same = names(&["id"]);
        let result = batch(&namer, &[same.clone(), same.clone(), same], &mut BTreeSet::new());
        assert_eq!(result, vec!["Id", "PurpleId", "FluffyId"]);
    }

    #[test]
    fn test_suffixes_follow_exhausted_prefixes() {
        let namer = Namer::new("cases", NameStyle::UpperSnake, ["only"]);
        let mut forbidden = BTreeSet::from(["X".to_string()]);
        let same = names(&["x"]);
        let result = batch(&namer, &[same.clone(), same.clone(), same], &mut forbidden);
        assert_eq!(result, vec!["ONLY_X", "X_1", "X_2"]);
        assert!(forbidden.contains("X_2"));
    }

    #[test]
    fn test_prefixed_names_are_checked_after_styling() {
        let namer = fun_prefix_namer("types", NameStyle::Pascal);
        let mut forbidden = BTreeSet::from(["Id".to_string(), "PurpleId".to_string()]);
        let result = batch(&namer, &[names(&["id"])], &mut forbidden);
        assert_eq!(result, vec!["FluffyId"]);
    }
}
