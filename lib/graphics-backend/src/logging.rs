//! Reads `VIOLET_LOG_LEVEL` and `VIOLET_LOG_DISABLED_MODULES` and
//! installs a `log::Log` filter on top of whatever logger the host process
//! already installed, deriving runtime debug/verbosity state from a small
//! set of environment-backed knobs.

use log::LevelFilter;
use std::collections::HashSet;
use std::env;

pub const LOG_LEVEL_VAR: &str = "VIOLET_LOG_LEVEL";
pub const DISABLED_MODULES_VAR: &str = "VIOLET_LOG_DISABLED_MODULES";

pub fn level_from_env() -> LevelFilter {
    match env::var(LOG_LEVEL_VAR).ok().as_deref() {
        Some("trace") => LevelFilter::Trace,
        Some("debug") => LevelFilter::Debug,
        Some("info") => LevelFilter::Info,
        Some("warn") => LevelFilter::Warn,
        Some("error") => LevelFilter::Error,
        Some("critical") => LevelFilter::Error,
        Some(other) => {
            log::warn!("unknown {LOG_LEVEL_VAR} value {other:?}, defaulting to info");
            LevelFilter::Info
        }
        None => LevelFilter::Info,
    }
}

pub fn disabled_modules_from_env() -> HashSet<String> {
    env::var(DISABLED_MODULES_VAR)
        .ok()
        .map(|list| {
            list.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// A `log::Log` wrapper that drops records from modules named in
/// `VIOLET_LOG_DISABLED_MODULES` and filters the rest by `VIOLET_LOG_LEVEL`.
pub struct ModuleFilteredLogger<L: log::Log> {
    inner: L,
    max_level: LevelFilter,
    disabled_modules: HashSet<String>,
}

impl<L: log::Log> ModuleFilteredLogger<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            max_level: level_from_env(),
            disabled_modules: disabled_modules_from_env(),
        }
    }
}

impl<L: log::Log> log::Log for ModuleFilteredLogger<L> {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.max_level && self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if record.level() > self.max_level {
            return;
        }
        if let Some(module) = record.module_path() {
            if self.disabled_modules.iter().any(|m| module.starts_with(m)) {
                return;
            }
        }
        self.inner.log(record);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels() {
        std::env::set_var(LOG_LEVEL_VAR, "warn");
        assert_eq!(level_from_env(), LevelFilter::Warn);
        std::env::remove_var(LOG_LEVEL_VAR);
    }

    #[test]
    fn parses_disabled_module_list() {
        std::env::set_var(DISABLED_MODULES_VAR, "descriptor, shader::library");
        let mods = disabled_modules_from_env();
        assert!(mods.contains("descriptor"));
        assert!(mods.contains("shader::library"));
        std::env::remove_var(DISABLED_MODULES_VAR);
    }
}
