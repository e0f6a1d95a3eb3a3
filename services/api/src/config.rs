use encyclopedia_core::session::DEFAULT_MAX_SESSIONS;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub google_api_key: String,
    pub live_model: String,
    pub image_model: String,
    pub video_model: String,
    pub log_level: Level,
    pub frontend_dir: PathBuf,
    pub session_idle_timeout: Duration,
    pub max_sessions: usize,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var_or(name, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = parse_var::<SocketAddr>("BIND_ADDRESS", "0.0.0.0:8080")?;

        let google_api_key = std::env::var("GOOGLE_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("GOOGLE_API_KEY".to_string()))?;

        let live_model = var_or(
            "LIVE_API_MODEL",
            "gemini-2.5-flash-native-audio-preview-09-2025",
        );
        let image_model = var_or("IMAGE_GEN_MODEL", "gemini-2.5-flash-image");
        let video_model = var_or("VIDEO_GEN_MODEL", "veo-2.0-generate-001");

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let frontend_dir = PathBuf::from(var_or("FRONTEND_DIR", "./frontend"));

        let idle_secs = parse_var::<u64>("SESSION_IDLE_TIMEOUT_SECS", "3600")?;
        if idle_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_IDLE_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let max_sessions = parse_var::<usize>("MAX_SESSIONS", &DEFAULT_MAX_SESSIONS.to_string())?;

        Ok(Self {
            bind_address,
            google_api_key,
            live_model,
            image_model,
            video_model,
            log_level,
            frontend_dir,
            session_idle_timeout: Duration::from_secs(idle_secs),
            max_sessions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("GOOGLE_API_KEY");
            env::remove_var("LIVE_API_MODEL");
            env::remove_var("IMAGE_GEN_MODEL");
            env::remove_var("VIDEO_GEN_MODEL");
            env::remove_var("RUST_LOG");
            env::remove_var("FRONTEND_DIR");
            env::remove_var("SESSION_IDLE_TIMEOUT_SECS");
            env::remove_var("MAX_SESSIONS");
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("GOOGLE_API_KEY", "test-google-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8080");
        assert_eq!(config.google_api_key, "test-google-key");
        assert_eq!(
            config.live_model,
            "gemini-2.5-flash-native-audio-preview-09-2025"
        );
        assert_eq!(config.image_model, "gemini-2.5-flash-image");
        assert_eq!(config.video_model, "veo-2.0-generate-001");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.frontend_dir, PathBuf::from("./frontend"));
        assert_eq!(config.session_idle_timeout, Duration::from_secs(3600));
        assert_eq!(config.max_sessions, 10_000);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:9000");
            env::set_var("GOOGLE_API_KEY", "custom-key");
            env::set_var("LIVE_API_MODEL", "live-test");
            env::set_var("IMAGE_GEN_MODEL", "image-test");
            env::set_var("VIDEO_GEN_MODEL", "video-test");
            env::set_var("RUST_LOG", "debug");
            env::set_var("FRONTEND_DIR", "/srv/frontend");
            env::set_var("SESSION_IDLE_TIMEOUT_SECS", "60");
            env::set_var("MAX_SESSIONS", "5");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:9000");
        assert_eq!(config.google_api_key, "custom-key");
        assert_eq!(config.live_model, "live-test");
        assert_eq!(config.image_model, "image-test");
        assert_eq!(config.video_model, "video-test");
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.frontend_dir, PathBuf::from("/srv/frontend"));
        assert_eq!(config.session_idle_timeout, Duration::from_secs(60));
        assert_eq!(config.max_sessions, 5);
    }

    #[test]
    #[serial]
    fn test_config_missing_api_key() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "GOOGLE_API_KEY"),
            _ => panic!("Expected MissingVar for GOOGLE_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_rejects_zero_idle_timeout() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("SESSION_IDLE_TIMEOUT_SECS", "0");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "SESSION_IDLE_TIMEOUT_SECS"),
            _ => panic!("Expected InvalidValue for SESSION_IDLE_TIMEOUT_SECS"),
        }
    }
}
