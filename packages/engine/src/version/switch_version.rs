use crate::engine::Engine;
use crate::errors;
use crate::session::Session;
use crate::transaction::Transaction;
use crate::LixError;

fn ensure_version_id(version_id: &str) -> Result<(), LixError> {
    if version_id.trim().is_empty() {
        return Err(errors::invalid_parameter_error(
            "version_id must be a non-empty string",
        ));
    }
    Ok(())
}

impl<'a> Transaction<'a> {
    /// Points the transaction at another version. Data is untouched.
    pub fn switch_version(&mut self, version_id: &str) -> Result<(), LixError> {
        ensure_version_id(version_id)?;
        self.store.versions.require(version_id)?;
        self.set_active_version_id(version_id.to_string());
        Ok(())
    }
}

impl Session {
    pub fn switch_version(&mut self, version_id: &str) -> Result<(), LixError> {
        ensure_version_id(version_id)?;
        self.engine()
            .read(|store| store.versions.require(version_id).map(|_| ()))?;
        self.set_active_version_id(version_id.to_string());
        Ok(())
    }
}

impl Engine {
    /// Changes the version new sessions start on.
    pub fn switch_default_version(&self, version_id: &str) -> Result<(), LixError> {
        ensure_version_id(version_id)?;
        self.transaction(version_id, |tx| {
            tx.store.versions.set_default_active_version(version_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::boot::{boot, BootArgs};
    use crate::errors::ErrorCode;

    #[test]
    fn sessions_keep_their_own_pointer() {
        let engine = boot(BootArgs::default()).expect("boot");
        let mut first = engine.session().expect("session");
        let second = engine.session().expect("session");

        first.switch_version("global").expect("switch");
        assert_eq!(first.active_version_id(), "global");
        assert_ne!(second.active_version_id(), "global");

        let err = first.switch_version("missing").expect_err("unknown version");
        assert!(err.is(ErrorCode::VersionNotFound));
        assert_eq!(first.active_version_id(), "global");
    }

    #[test]
    fn default_version_applies_to_new_sessions() {
        let engine = boot(BootArgs::default()).expect("boot");
        engine.switch_default_version("global").expect("switch default");
        assert_eq!(engine.session().expect("session").active_version_id(), "global");
    }
}
