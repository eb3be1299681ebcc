mod store;
mod types;

pub use store::ChangeStore;
pub use types::{Change, EntityKey, NewChange};
