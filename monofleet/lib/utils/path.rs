use std::path::{Component, Path};

use crate::{MonofleetError, MonofleetResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The sub directory where monofleet state, logs, etc are stored.
pub const MONOFLEET_HOME_DIR: &str = ".monofleet";

/// The environment variable that overrides the monofleet home directory.
pub const MONOFLEET_HOME_ENV_VAR: &str = "MONOFLEET_HOME";

/// The suffix of machine console log files.
pub const LOG_SUFFIX: &str = "log";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Removes a machine's isolated filesystem root recursively.
///
/// Refuses relative paths, paths containing `..` and the filesystem root itself.
/// A root that is already gone is not an error.
pub async fn remove_isolated_root(root: &Path) -> MonofleetResult<()> {
    if !root.is_absolute()
        || root.parent().is_none()
        || root.components().any(|c| c == Component::ParentDir)
    {
        return Err(MonofleetError::InvalidArgument(format!(
            "refusing to remove isolated root {}",
            root.display()
        )));
    }

    match tokio::fs::remove_dir_all(root).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
