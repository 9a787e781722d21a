use crate::error::SpkError::Privilege;
use anyhow::Result;
use log::debug;
use nix::unistd::Uid;

/// Checks that the build runs as root
///
/// Ownership and permission bits of the packaged files are only preserved
/// when the archive tool runs with uid 0.
///
/// # Errors
///
/// Returns [`Privilege`] if `euid` is not root
pub fn ensure_privileged(euid: Uid) -> Result<()> {
    debug!("Checking effective uid {euid}");
    if euid.is_root() {
        Ok(())
    } else {
        Err(Privilege(format!(
            "running as uid {euid}, please run with sudo to preserve package file ownership"
        ))
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpkError;

    #[test]
    fn test_root_passes() {
        assert!(ensure_privileged(Uid::from_raw(0)).is_ok());
    }

    #[test]
    fn test_regular_user_fails() {
        let error = ensure_privileged(Uid::from_raw(1000)).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SpkError>(),
            Some(SpkError::Privilege(_))
        ));
        assert!(error.to_string().contains("uid 1000"));
    }
}
