//! Deploy-time overrides for a subset of [`crate::options::Options`],
//! layered from the environment (and, with the `toml-config`/`yaml-config`
//! features, a config file) via `figment`. Not part of the distilled boot
//! API; added because a framework whose `Options` is otherwise only ever
//! constructed in code has no way to flip `address` or `shutdown_timeout`
//! per-environment without a rebuild.

use std::time::Duration;

use figment::providers::Env;
use figment::Figment;
use serde::Deserialize;

use crate::options::Options;

/// Environment variables are read under this prefix, e.g. `RELAY_ADDRESS`,
/// `RELAY_SHUTDOWN_TIMEOUT_SECS`.
const ENV_PREFIX: &str = "RELAY_";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Overlay {
    address: Option<String>,
    enable_graceful_shutdown: Option<bool>,
    shutdown_timeout_secs: Option<u64>,
    http_global_prefix: Option<String>,
    http_disable_recover: Option<bool>,
}

/// Errors produced while assembling an overlay.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Figment(#[from] figment::Error),
}

/// Build a `Figment` reading `RELAY_*` environment variables, plus
/// (optionally) a file. Exposed separately from [`apply_env`] so callers who
/// need a config file can add a `figment::providers::Toml`/`Yaml` provider
/// on top before calling [`ConfigOverlay::load`].
pub fn figment() -> Figment {
    Figment::new().merge(Env::prefixed(ENV_PREFIX))
}

/// A loaded overlay, ready to be applied onto a base [`Options`].
pub struct ConfigOverlay(Overlay);

impl ConfigOverlay {
    /// Load from `RELAY_*` environment variables only.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(figment())
    }

    /// Load from a caller-assembled `Figment`, e.g. one with a TOML or YAML
    /// file merged in ahead of the environment:
    ///
    /// ```ignore
    /// let figment = relay::config::figment().merge(figment::providers::Toml::file("relay.toml"));
    /// let overlay = relay::config::ConfigOverlay::from_figment(figment)?;
    /// ```
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        Ok(Self(figment.extract()?))
    }

    /// Overwrite the fields present in this overlay onto `options`, leaving
    /// everything else untouched.
    pub fn apply(&self, options: &mut Options) {
        if let Some(address) = &self.0.address {
            options.address = address.clone();
        }
        if let Some(enabled) = self.0.enable_graceful_shutdown {
            options.enable_graceful_shutdown = enabled;
        }
        if let Some(secs) = self.0.shutdown_timeout_secs {
            options.shutdown_timeout = Duration::from_secs(secs);
        }
        if let Some(prefix) = &self.0.http_global_prefix {
            options.http.global_prefix = Some(prefix.clone());
        }
        if let Some(disable_recover) = self.0.http_disable_recover {
            options.http.disable_recover = disable_recover;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn unset_variables_leave_the_base_options_untouched() {
        Jail::expect_with(|_j| {
            let overlay = ConfigOverlay::load().expect("load");
            let mut options = Options::default();
            let address_before = options.address.clone();
            overlay.apply(&mut options);
            assert_eq!(options.address, address_before);
            assert!(options.enable_graceful_shutdown);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_address_and_shutdown_timeout() {
        Jail::expect_with(|j| {
            j.set_env("RELAY_ADDRESS", "0.0.0.0:9000");
            j.set_env("RELAY_SHUTDOWN_TIMEOUT_SECS", "30");
            let overlay = ConfigOverlay::load().expect("load");
            let mut options = Options::default();
            overlay.apply(&mut options);
            assert_eq!(options.address, "0.0.0.0:9000");
            assert_eq!(options.shutdown_timeout, Duration::from_secs(30));
            Ok(())
        });
    }

    #[test]
    fn env_overrides_http_sub_options() {
        Jail::expect_with(|j| {
            j.set_env("RELAY_HTTP_GLOBAL_PREFIX", "/api/v1");
            j.set_env("RELAY_HTTP_DISABLE_RECOVER", "true");
            let overlay = ConfigOverlay::load().expect("load");
            let mut options = Options::default();
            overlay.apply(&mut options);
            assert_eq!(options.http.global_prefix.as_deref(), Some("/api/v1"));
            assert!(options.http.disable_recover);
            Ok(())
        });
    }

    #[test]
    #[cfg(feature = "toml-config")]
    fn a_file_provider_merged_ahead_of_the_environment_is_overridden_by_it() {
        Jail::expect_with(|j| {
            j.create_file("relay.toml", "address = \"1.2.3.4:1111\"")?;
            j.set_env("RELAY_ADDRESS", "5.6.7.8:2222");
            let merged = figment().merge(figment::providers::Toml::file("relay.toml"));
            let overlay = ConfigOverlay::from_figment(merged).expect("load");
            let mut options = Options::default();
            overlay.apply(&mut options);
            assert_eq!(options.address, "5.6.7.8:2222");
            Ok(())
        });
    }
}
