use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("{count} names could not be resolved: {}", names.join(", "))]
    UnresolvedNames { count: usize, names: Vec<String> },

    #[error("Name in namespace {namespace} has no candidates")]
    NoCandidates { namespace: String },
}
