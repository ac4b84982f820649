//! Privilege posture checks, run before any namespace or mount change.

use super::Identity;
use crate::config::types::{CordonError, PrivilegeModel, Result};

/// Pick a model when none was requested: setuid when installed setuid-root,
/// a user namespace otherwise.
pub fn select_model(requested: Option<PrivilegeModel>, identity: &Identity) -> PrivilegeModel {
    match requested {
        Some(model) => model,
        None if identity.effective_uid.is_root() => PrivilegeModel::Setuid,
        None => PrivilegeModel::UserNamespace,
    }
}

/// Reject a start state the chosen model cannot make safe.
pub fn validate_posture(identity: &Identity, model: PrivilegeModel) -> Result<()> {
    if identity.real_uid.is_root() {
        return Err(CordonError::Precondition(
            "please run as non-root".to_string(),
        ));
    }

    match model {
        PrivilegeModel::Setuid => {
            if !identity.effective_uid.is_root() {
                return Err(CordonError::Precondition(
                    "binary needs to be setuid-root to set up the sandbox".to_string(),
                ));
            }
        }
        PrivilegeModel::UserNamespace => {
            if identity.effective_uid.is_root() || identity.saved_uid.is_root() {
                return Err(CordonError::Precondition(
                    "user namespace mode must not run from a setuid-root binary".to_string(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Uid;

    #[test]
    fn validate_posture_rejects_root_caller_in_both_models() {
        let root = Identity::plain(0, 0);
        for model in [PrivilegeModel::Setuid, PrivilegeModel::UserNamespace] {
            assert!(matches!(
                validate_posture(&root, model),
                Err(CordonError::Precondition(_))
            ));
        }
    }

    #[test]
    fn setuid_model_requires_elevated_effective_uid() {
        assert!(validate_posture(&Identity::plain(1000, 1000), PrivilegeModel::Setuid).is_err());
        assert!(
            validate_posture(&Identity::setuid_root(1000, 1000), PrivilegeModel::Setuid).is_ok()
        );
    }

    #[test]
    fn userns_model_rejects_lingering_saved_root() {
        let mut identity = Identity::plain(1000, 1000);
        assert!(validate_posture(&identity, PrivilegeModel::UserNamespace).is_ok());
        identity.saved_uid = Uid::from_raw(0);
        assert!(validate_posture(&identity, PrivilegeModel::UserNamespace).is_err());
    }

    #[test]
    fn select_model_prefers_explicit_request() {
        let plain = Identity::plain(1000, 1000);
        assert_eq!(select_model(None, &plain), PrivilegeModel::UserNamespace);
        assert_eq!(
            select_model(None, &Identity::setuid_root(1000, 1000)),
            PrivilegeModel::Setuid
        );
        assert_eq!(
            select_model(Some(PrivilegeModel::Setuid), &plain),
            PrivilegeModel::Setuid
        );
    }
}
