//! Package-level defaults (`spec.md` §6 external interface): the handful
//! of settings a freshly-parsed program supplies before its first
//! activation exists. Lexing/parsing a program into a [`Program`] is out
//! of scope; this only covers what the top-level activation needs to
//! start from.

use crate::instruction::Program;
use crate::settings::{NumericSettings, Settings};
use crate::trace::TraceSetting;

#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub program: Program,
    pub initial_address: Option<String>,
    pub initial_numeric: NumericSettings,
    pub initial_trace: TraceSetting,
}

impl Package {
    #[must_use]
    pub fn new(name: impl Into<String>, program: Program) -> Self {
        Self {
            name: name.into(),
            program,
            initial_address: None,
            initial_numeric: NumericSettings::default(),
            initial_trace: TraceSetting::default(),
        }
    }

    #[must_use]
    pub fn with_initial_address(mut self, address: impl Into<String>) -> Self {
        self.initial_address = Some(address.into());
        self
    }

    #[must_use]
    pub fn with_initial_trace(mut self, trace: TraceSetting) -> Self {
        self.initial_trace = trace;
        self
    }

    /// Builds the `Settings` record the top-level activation for this
    /// package starts with.
    #[must_use]
    pub fn initial_settings(&self) -> Settings {
        let mut settings = Settings::new();
        settings.numeric = self.initial_numeric;
        settings.trace = self.initial_trace;
        settings.address.clone_from(&self.initial_address);
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_settings_carry_package_defaults() {
        let package = Package::new("DEMO", Program::new())
            .with_initial_address("SYSTEM")
            .with_initial_trace(TraceSetting::new(crate::trace::TraceOption::Results));
        let settings = package.initial_settings();
        assert_eq!(settings.address.as_deref(), Some("SYSTEM"));
        assert_eq!(settings.trace.option, crate::trace::TraceOption::Results);
    }
}
