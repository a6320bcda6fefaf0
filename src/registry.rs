//! Target registry.
//!
//! Maps `(format, dialect)` pairs to a factory for a configured printer. The
//! registry is built once at startup and passed to whoever needs to print.

use std::collections::BTreeMap;

use crate::arch::Backend;
use crate::error::TargetError;
use crate::ir::Module;
use crate::printer::{PrettyPrinter, PrintingPolicy};

/// Builds printers for one target.
#[derive(Debug, Clone, Copy)]
pub struct TargetFactory {
    backend: fn() -> Backend,
    default_policy: fn() -> PrintingPolicy,
}

impl TargetFactory {
    pub fn new(backend: fn() -> Backend, default_policy: fn() -> PrintingPolicy) -> Self {
        Self {
            backend,
            default_policy,
        }
    }

    pub fn backend(&self) -> Backend {
        (self.backend)()
    }

    /// The policy a printer for this target uses unless told otherwise.
    pub fn default_policy(&self) -> PrintingPolicy {
        (self.default_policy)()
    }

    pub fn create<'m>(&self, module: &'m Module, policy: PrintingPolicy) -> PrettyPrinter<'m> {
        PrettyPrinter::new(module, self.backend(), policy)
    }
}

/// The set of printable targets.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    factories: BTreeMap<(String, String), TargetFactory>,
    defaults: BTreeMap<String, String>,
}

impl TargetRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// ELF with the AT&T (default) and Intel dialects.
    pub fn with_builtin_targets() -> Self {
        let mut registry = Self::new();
        let builtin = [
            ("att", TargetFactory::new(Backend::att, PrintingPolicy::elf_default), true),
            ("intel", TargetFactory::new(Backend::intel, PrintingPolicy::elf_default), false),
        ];
        for (dialect, factory, is_default) in builtin {
            // A fresh registry cannot hold duplicates.
            let _ = registry.register("elf", dialect, factory, is_default);
        }
        registry
    }

    /// Adds a target. Existing registrations are never replaced.
    pub fn register(
        &mut self,
        format: &str,
        dialect: &str,
        factory: TargetFactory,
        is_default: bool,
    ) -> Result<(), TargetError> {
        let key = (format.to_string(), dialect.to_string());
        if self.factories.contains_key(&key) {
            return Err(TargetError::Duplicate {
                format: format.to_string(),
                dialect: dialect.to_string(),
            });
        }
        self.factories.insert(key, factory);
        if is_default {
            self.defaults.entry(format.to_string()).or_insert_with(|| dialect.to_string());
        }
        Ok(())
    }

    /// All registered `(format, dialect)` pairs, sorted.
    pub fn targets(&self) -> Vec<(String, String)> {
        self.factories.keys().cloned().collect()
    }

    pub fn default_dialect(&self, format: &str) -> Result<&str, TargetError> {
        self.defaults
            .get(format)
            .map(String::as_str)
            .ok_or_else(|| TargetError::NoDefaultDialect(format.to_string()))
    }

    pub fn lookup(&self, format: &str, dialect: &str) -> Result<&TargetFactory, TargetError> {
        self.factories
            .get(&(format.to_string(), dialect.to_string()))
            .ok_or_else(|| TargetError::Unregistered {
                format: format.to_string(),
                dialect: dialect.to_string(),
                available: self
                    .targets()
                    .iter()
                    .map(|(f, d)| format!("{f}/{d}"))
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Builds a printer for `module`, starting from the target's default policy.
    pub fn create<'m>(&self, module: &'m Module, format: &str, dialect: &str) -> Result<PrettyPrinter<'m>, TargetError> {
        let factory = self.lookup(format, dialect)?;
        Ok(factory.create(module, factory.default_policy()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Architecture;

    #[test]
    fn builtin_targets() {
        let registry = TargetRegistry::with_builtin_targets();
        assert_eq!(
            registry.targets(),
            vec![
                ("elf".to_string(), "att".to_string()),
                ("elf".to_string(), "intel".to_string())
            ]
        );
        assert_eq!(registry.default_dialect("elf"), Ok("att"));
        assert_eq!(registry.lookup("elf", "intel").unwrap().backend(), Backend::intel());
        assert_eq!(registry.lookup("elf", "att").unwrap().backend().syntax().name, "att");
    }

    #[test]
    fn unknown_target_lists_choices() {
        let registry = TargetRegistry::with_builtin_targets();
        let err = registry.lookup("pe", "masm").unwrap_err();
        assert_eq!(
            err,
            TargetError::Unregistered {
                format: "pe".to_string(),
                dialect: "masm".to_string(),
                available: "elf/att, elf/intel".to_string(),
            }
        );
        assert_eq!(
            registry.default_dialect("pe"),
            Err(TargetError::NoDefaultDialect("pe".to_string()))
        );
    }

    #[test]
    fn registration_is_append_only() {
        let mut registry = TargetRegistry::with_builtin_targets();
        let factory = TargetFactory::new(Backend::intel, PrintingPolicy::default);
        assert!(matches!(
            registry.register("elf", "att", factory, true),
            Err(TargetError::Duplicate { .. })
        ));
        registry.register("raw", "intel", factory, true).unwrap();
        assert_eq!(registry.default_dialect("raw"), Ok("intel"));
        assert_eq!(registry.lookup("raw", "intel").unwrap().default_policy(), PrintingPolicy::default());
        // The first default for a format wins.
        registry.register("elf", "intel2", factory, true).unwrap();
        assert_eq!(registry.default_dialect("elf"), Ok("att"));
    }
}
