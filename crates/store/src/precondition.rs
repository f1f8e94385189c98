use netreg_model::Etag;

/// The three write preconditions spec.md §4.2 names.
#[derive(Debug, Clone)]
pub enum Precondition {
    CreateOnly,
    MatchEtag(Etag),
    Unconditional,
}

impl Precondition {
    /// Whether `current` (the etag presently stored, if any) satisfies this
    /// precondition.
    pub fn satisfied_by(&self, current: Option<&Etag>) -> bool {
        match self {
            Precondition::CreateOnly => current.is_none(),
            Precondition::MatchEtag(expected) => current == Some(expected),
            Precondition::Unconditional => true,
        }
    }
}
