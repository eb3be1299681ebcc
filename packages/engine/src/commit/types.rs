/// The open change set of a version inside a transaction, plus the id its
/// commit will get when the transaction ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommit {
    pub version_id: String,
    pub change_set_id: String,
    pub commit_id: String,
}

/// A commit written outside the pending path (transition, merge).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedCommitArgs {
    pub change_ids: Vec<String>,
    pub parent_commit_ids: Vec<String>,
}
