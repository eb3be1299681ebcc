mod generate_commit;
mod types;

pub(crate) use generate_commit::{generate_commit, generate_derived_commit, open_pending_commit};
pub use types::{DerivedCommitArgs, PendingCommit};
