use std::{env, path::PathBuf};

use crate::config::DEFAULT_MONOFLEET_HOME;

use super::MONOFLEET_HOME_ENV_VAR;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the monofleet home directory.
///
/// Uses `MONOFLEET_HOME` when set, otherwise `~/.monofleet`.
pub fn get_monofleet_home_path() -> PathBuf {
    match env::var(MONOFLEET_HOME_ENV_VAR) {
        Ok(home) if !home.is_empty() => PathBuf::from(home),
        _ => DEFAULT_MONOFLEET_HOME.to_owned(),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_get_monofleet_home_path_prefers_env() {
        env::set_var(MONOFLEET_HOME_ENV_VAR, "/tmp/fleet-home");
        assert_eq!(get_monofleet_home_path(), PathBuf::from("/tmp/fleet-home"));

        env::remove_var(MONOFLEET_HOME_ENV_VAR);
        assert_eq!(get_monofleet_home_path(), *DEFAULT_MONOFLEET_HOME);
    }
}
