//! Environment-driven configuration. Every knob has a sane default so the
//! worker can start with zero configuration in development; production
//! deployments override via environment variables (the teacher's own CLI
//! favours explicit flags over config files, so we follow the same spirit
//! here with env vars standing in for the broker-side equivalent).

use lidar_forestry::ValidatorConfig;

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_else(|| default.iter().map(|s| s.to_string()).collect())
}

/// Worker-wide configuration, read once at startup from the environment.
#[derive(Clone, Debug)]
pub struct Settings {
    pub max_file_size_mb: u64,
    pub min_point_count: u64,
    pub supported_versions: Vec<String>,
    pub supported_point_formats: Vec<u8>,
    pub allowed_extensions: Vec<String>,
    pub require_crs: bool,

    /// Seconds a single job may run before it's failed with `JOB_TIMEOUT`.
    pub job_timeout_secs: u64,
    /// Seconds a `JobResult` is retained in the result store.
    pub result_ttl_secs: u64,
    /// Seconds to wait for a webhook callback response.
    pub callback_timeout_secs: u64,
    pub callback_retries: u32,

    pub broker_url: String,
    pub queue_name: String,
    pub result_key_prefix: String,
    /// Shared secret used to sign/verify webhook payloads. Empty disables
    /// signing (development mode only).
    pub webhook_secret: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_file_size_mb: 2048,
            min_point_count: 100,
            supported_versions: vec!["1.2".into(), "1.3".into(), "1.4".into()],
            supported_point_formats: lidar_codec::SUPPORTED_POINT_FORMATS.to_vec(),
            allowed_extensions: vec![".las".into(), ".laz".into()],
            require_crs: false,
            job_timeout_secs: 600,
            result_ttl_secs: 3600,
            callback_timeout_secs: 30,
            callback_retries: 3,
            broker_url: "redis://127.0.0.1:6379".to_string(),
            queue_name: "lidar:jobs".to_string(),
            result_key_prefix: "lidar:result:".to_string(),
            webhook_secret: String::new(),
        }
    }
}

impl Settings {
    /// Reads every setting from the environment, falling back to the
    /// default for anything unset or unparseable.
    pub fn from_env() -> Settings {
        let defaults = Settings::default();
        Settings {
            max_file_size_mb: env_u64("LIDAR_MAX_FILE_SIZE_MB", defaults.max_file_size_mb),
            min_point_count: env_u64("LIDAR_MIN_POINT_COUNT", defaults.min_point_count),
            supported_versions: env_list("LIDAR_SUPPORTED_VERSIONS", &["1.2", "1.3", "1.4"]),
            supported_point_formats: std::env::var("LIDAR_SUPPORTED_POINT_FORMATS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .filter_map(|s| s.trim().parse::<u8>().ok())
                        .collect()
                })
                .unwrap_or(defaults.supported_point_formats),
            allowed_extensions: env_list("LIDAR_ALLOWED_EXTENSIONS", &[".las", ".laz"]),
            require_crs: env_bool("LIDAR_REQUIRE_CRS", defaults.require_crs),
            job_timeout_secs: env_u64("LIDAR_JOB_TIMEOUT_SECS", defaults.job_timeout_secs),
            result_ttl_secs: env_u64("LIDAR_RESULT_TTL_SECS", defaults.result_ttl_secs),
            callback_timeout_secs: env_u64(
                "LIDAR_CALLBACK_TIMEOUT_SECS",
                defaults.callback_timeout_secs,
            ),
            callback_retries: env_u64("LIDAR_CALLBACK_RETRIES", defaults.callback_retries as u64)
                as u32,
            broker_url: env_string("LIDAR_BROKER_URL", &defaults.broker_url),
            queue_name: env_string("LIDAR_QUEUE_NAME", &defaults.queue_name),
            result_key_prefix: env_string("LIDAR_RESULT_KEY_PREFIX", &defaults.result_key_prefix),
            webhook_secret: env_string("LIDAR_WEBHOOK_SECRET", &defaults.webhook_secret),
        }
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            max_file_size_mb: self.max_file_size_mb,
            min_point_count: self.min_point_count,
            supported_versions: self.supported_versions.clone(),
            supported_point_formats: self.supported_point_formats.clone(),
            allowed_extensions: self.allowed_extensions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let settings = Settings::default();
        assert!(settings.job_timeout_secs > 0);
        assert!(settings.result_ttl_secs > settings.job_timeout_secs);
        assert!(!settings.supported_versions.is_empty());
    }

    #[test]
    fn validator_config_mirrors_settings() {
        let settings = Settings::default();
        let config = settings.validator_config();
        assert_eq!(config.max_file_size_mb, settings.max_file_size_mb);
        assert_eq!(config.allowed_extensions, settings.allowed_extensions);
    }
}
