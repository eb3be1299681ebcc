mod definition;
mod key;
mod registry;

pub use definition::{derive_entity_id, lix_schema_definition, validate_lix_schema_definition};
pub use key::SchemaKey;
pub use registry::{SchemaRegistry, StoredSchema};
