//! Process environment access.
//!
//! Changes made through [`Env`] are visible to this process and to commands it
//! spawns afterwards. They never reach the parent shell.

/// Handle to the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct Env;

/// The process environment.
pub const ENV: Env = Env;

impl Env {
    /// Read a variable, returning an empty string when it is unset or not
    /// valid unicode.
    pub fn get(&self, key: &str) -> String {
        std::env::var(key).unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        std::env::var_os(key).is_some()
    }

    pub fn set(&self, key: &str, value: impl AsRef<str>) {
        tracing::debug!(key, value = value.as_ref(), "Setting environment variable");
        std::env::set_var(key, value.as_ref());
    }

    /// Remove a variable. Removing an unset variable is a no-op.
    pub fn remove(&self, key: &str) {
        tracing::debug!(key, "Removing environment variable");
        std::env::remove_var(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variable_reads_as_empty() {
        assert_eq!(ENV.get("APMAKE_TEST_NEVER_SET_7F3A"), "");
        assert!(!ENV.contains("APMAKE_TEST_NEVER_SET_7F3A"));
    }

    #[test]
    fn set_then_remove() {
        let key = "APMAKE_TEST_SET_THEN_REMOVE";
        ENV.set(key, "deps_done!");
        assert_eq!(ENV.get(key), "deps_done!");
        assert!(ENV.contains(key));

        ENV.remove(key);
        assert_eq!(ENV.get(key), "");
        ENV.remove(key);
    }

    #[cfg(unix)]
    #[test]
    fn spawned_commands_inherit_changes() {
        let key = "APMAKE_TEST_INHERITED";
        ENV.set(key, "visible");
        let cmd = crate::Command::from_args([
            "sh",
            "-c",
            "test \"$APMAKE_TEST_INHERITED\" = visible",
        ])
        .unwrap();
        assert!(cmd.success());
        ENV.remove(key);
    }
}
