//! Runtime environment detection.
//!
//! Single source of truth for whether the process is running under test,
//! development, or production, based on the `TERMCORE_ENV` environment
//! variable. Components use this to decide whether to write under the
//! repository's `tmp/` directory instead of a platform config directory.

/// Runtime environment for the core process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment (default).
    Production,
    /// Development environment.
    Development,
    /// Test environment — unit tests, uses repo-local tmp directories.
    Test,
    /// System test environment — integration tests spawning the real binary.
    SystemTest,
}

impl Environment {
    /// Detect current environment from `TERMCORE_ENV`.
    #[must_use]
    pub fn current() -> Self {
        match std::env::var("TERMCORE_ENV").as_deref() {
            Ok("test") => Self::Test,
            Ok("system_test") => Self::SystemTest,
            Ok("development") | Ok("dev") => Self::Development,
            _ => Self::Production,
        }
    }

    /// Returns `true` if running in any test mode (unit or system test).
    #[must_use]
    pub fn is_any_test(self) -> bool {
        matches!(self, Self::Test | Self::SystemTest)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
            Self::SystemTest => write!(f, "system_test"),
        }
    }
}

/// Returns `true` if running in any test mode (unit tests or system tests).
///
/// Also true whenever compiled with `#[cfg(test)]`, so unit tests never
/// depend on the caller setting `TERMCORE_ENV`.
#[must_use]
pub fn is_any_test() -> bool {
    cfg!(test) || Environment::current().is_any_test()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_variant() {
        assert_eq!(Environment::Production.to_string(), "production");
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::SystemTest.to_string(), "system_test");
        assert_eq!(Environment::Development.to_string(), "development");
    }

    #[test]
    fn is_any_test_true_under_cfg_test() {
        assert!(is_any_test());
    }
}
