//! Case conversion for generated identifiers.
//!
//! Every style splits its input into words first, so any mix of separators,
//! camel humps and acronyms converts the same way. The output is always a
//! legal identifier in the common subset: ASCII letters, digits and `_`,
//! never starting with a digit.

/// Split a raw name into words.
///
/// Words break at anything that is not an ASCII letter or digit, at a
/// lowercase-to-uppercase hump, between letters and digits, and before the
/// last capital of an acronym followed by a lowercase letter.
///
/// ```
/// use typeloom_naming::style::split_into_words;
/// assert_eq!(split_into_words("HTTPProxy"), vec!["HTTP", "Proxy"]);
/// assert_eq!(split_into_words("user_id2"), vec!["user", "id", "2"]);
/// ```
pub fn split_into_words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let hump = prev.is_ascii_lowercase() && c.is_ascii_uppercase();
            let digit_edge = prev.is_ascii_digit() != c.is_ascii_digit();
            let acronym_end = prev.is_ascii_uppercase() && c.is_ascii_uppercase() && next_is_lower;
            if hump || digit_edge || acronym_end {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Drop characters no target accepts and keep the name from starting with
/// a digit.
pub fn legalize(name: &str) -> String {
    let legal: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    match legal.chars().next() {
        Some(first) if first.is_ascii_digit() => format!("_{}", legal),
        _ => legal,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
    }
}

fn styled(name: &str, empty: &str, join: impl FnOnce(Vec<String>) -> String) -> String {
    let words = split_into_words(name);
    if words.is_empty() {
        return empty.to_string();
    }
    legalize(&join(words))
}

/// `user id` becomes `UserId`.
pub fn pascal_case(name: &str) -> String {
    styled(name, "Empty", |words| words.iter().map(|w| capitalize(w)).collect())
}

/// `user id` becomes `userId`.
pub fn camel_case(name: &str) -> String {
    styled(name, "empty", |words| {
        words
            .iter()
            .enumerate()
            .map(|(i, w)| if i == 0 { w.to_ascii_lowercase() } else { capitalize(w) })
            .collect()
    })
}

pub fn snake_case(name: &str) -> String {
    styled(name, "empty", |words| {
        words
            .iter()
            .map(|w| w.to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join("_")
    })
}

pub fn upper_snake_case(name: &str) -> String {
    styled(name, "EMPTY", |words| {
        words
            .iter()
            .map(|w| w.to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join("_")
    })
}

/// Casing convention of one kind of identifier in a target language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameStyle {
    Pascal,
    Camel,
    Snake,
    UpperSnake,
}

impl NameStyle {
    pub fn apply(self, name: &str) -> String {
        match self {
            NameStyle::Pascal => pascal_case(name),
            NameStyle::Camel => camel_case(name),
            NameStyle::Snake => snake_case(name),
            NameStyle::UpperSnake => upper_snake_case(name),
        }
    }
}
