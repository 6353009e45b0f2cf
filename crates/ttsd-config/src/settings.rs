use serde::{Deserialize, Serialize};
use ttsd_core::ResourceAllocationPolicy;

use crate::{file::load_speech_config_file, ConfigError, SpeechConfig};

/// Process-level settings layered on top of the engine's own `SpeechConfig`
/// file — the bind address for the in-process transport's listener, the
/// connection-watch socket path, and the logging format. None of this was
/// named in the distilled spec; it's the ambient configuration every
/// `config`-crate-based service in this workspace carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    /// `ResourceAccessPolicy` from the speech config file, or `TTSD_`
    /// environment override (spec.md §6.4: "Reservation" ⇒ RESERVATION,
    /// anything else ⇒ OPEN).
    pub resource_access_policy: ResourceAllocationPolicy,
    pub default_config: SpeechConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            logging: LoggingSettings::default(),
            resource_access_policy: ResourceAllocationPolicy::default(),
            default_config: SpeechConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// UNIX domain socket clients connect to so the Manager can detect
    /// their liveness; mirrors `CLIENT_MONITOR_SOCKET_PATH`.
    pub socket_path: String,
    /// Loopback bind address for the in-process RPC transport listener.
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/ttsd_client_monitor".to_string(),
            bind_addr: "127.0.0.1:9977".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `pretty` for local development, `json` for production log shipping.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
        }
    }
}

/// Load settings from an optional TOML file, then a co-located
/// `KEY = VALUE` speech configuration file, then `TTSD_`-prefixed
/// environment variables, in that order of increasing precedence.
pub fn load_settings(
    settings_file: Option<&std::path::Path>,
    speech_config_file: Option<&std::path::Path>,
) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = settings_file {
        builder = builder.add_source(config::File::from(path).required(false));
    }
    builder = builder.add_source(
        config::Environment::with_prefix("TTSD")
            .separator("__")
            .try_parsing(true),
    );

    let raw = builder.build()?;
    let mut settings: Settings = raw.try_deserialize().unwrap_or_else(|_| Settings::default());

    if let Some(path) = speech_config_file {
        let mut patch = load_speech_config_file(path)?;
        if let Some(policy) = patch.extras.remove("ResourceAccessPolicy") {
            settings.resource_access_policy = if policy.eq_ignore_ascii_case("reservation") {
                ResourceAllocationPolicy::Reservation
            } else {
                ResourceAllocationPolicy::Open
            };
        }
        settings.default_config.update_with(&patch);
    }
    settings.default_config.backfill_endpoints();

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.server.bind_addr, "127.0.0.1:9977");
        assert_eq!(settings.logging.format, "pretty");
    }

    #[test]
    fn load_settings_with_no_sources_falls_back_to_defaults() {
        let settings = load_settings(None, None).unwrap();
        assert_eq!(settings.server.socket_path, "/tmp/ttsd_client_monitor");
    }

    #[test]
    fn load_settings_applies_speech_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tts.conf");
        std::fs::write(&path, "endpoint = http://localhost:1234/tts\nvolume = 42\n").unwrap();

        let settings = load_settings(None, Some(&path)).unwrap();
        assert_eq!(settings.default_config.endpoint, "http://localhost:1234/tts");
        assert_eq!(settings.default_config.volume, 42);
    }

    #[test]
    fn resource_access_policy_key_selects_open_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tts.conf");
        std::fs::write(&path, "ResourceAccessPolicy = Priority\n").unwrap();

        let settings = load_settings(None, Some(&path)).unwrap();
        assert_eq!(settings.resource_access_policy, ResourceAllocationPolicy::Open);
        assert!(!settings.default_config.extras.contains_key("ResourceAccessPolicy"));
    }

    #[test]
    fn resource_access_policy_key_selects_reservation_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tts.conf");
        std::fs::write(&path, "ResourceAccessPolicy = Reservation\n").unwrap();

        let settings = load_settings(None, Some(&path)).unwrap();
        assert_eq!(settings.resource_access_policy, ResourceAllocationPolicy::Reservation);
    }
}
