use crate::types::{CaptureFrameRate, CaptureType, DEFAULT_TARGET_RESOLUTION};
use std::time::Duration;

/// Tunables for camera negotiation and frame extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Preferred stream resolution (width, height).
    pub target_resolution: (u32, u32),
    pub capture_type: CaptureType,
    pub frame_rate: CaptureFrameRate,
    /// Delay between device availability checks.
    pub poll_interval: Duration,
    /// Pause after availability and after connecting, before the next vendor call.
    pub settle_delay: Duration,
    /// Upper bound on how long `configure_platform` waits for the first frame.
    pub configure_timeout: Duration,
    /// Copy rows bottom-up.
    pub invert_vertically: bool,
    /// Emit capability listings, per-frame traces and calibration dumps.
    pub verbose_logging: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_resolution: DEFAULT_TARGET_RESOLUTION,
            capture_type: CaptureType::Video,
            frame_rate: CaptureFrameRate::Fps30,
            poll_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(1),
            configure_timeout: Duration::from_secs(30),
            invert_vertically: false,
            verbose_logging: false,
        }
    }
}

impl CaptureConfig {
    /// Defaults overlaid with `ML2_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let frame_rate = CaptureFrameRate::from_fps(Self::read_env_u32(
            "ML2_FRAME_RATE",
            defaults.frame_rate as u32,
        ))
        .unwrap_or_else(|| {
            log::warn!("Unsupported ML2_FRAME_RATE, using {:?}", defaults.frame_rate);
            defaults.frame_rate
        });

        Self {
            target_resolution: (
                Self::read_env_u32("ML2_TARGET_WIDTH", defaults.target_resolution.0),
                Self::read_env_u32("ML2_TARGET_HEIGHT", defaults.target_resolution.1),
            ),
            capture_type: defaults.capture_type,
            frame_rate,
            poll_interval: Self::read_env_millis("ML2_POLL_INTERVAL_MS", defaults.poll_interval),
            settle_delay: Self::read_env_millis("ML2_SETTLE_DELAY_MS", defaults.settle_delay),
            configure_timeout: Self::read_env_millis(
                "ML2_CONFIGURE_TIMEOUT_MS",
                defaults.configure_timeout,
            ),
            invert_vertically: Self::read_env_bool(
                "ML2_INVERT_VERTICALLY",
                defaults.invert_vertically,
            ),
            verbose_logging: Self::read_env_bool("ML2_VERBOSE", defaults.verbose_logging),
        }
    }

    fn read_env_bool(name: &str, default: bool) -> bool {
        match std::env::var(name) {
            Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    log::warn!("Ignoring invalid {}='{}', using {}", name, v, default);
                    default
                }
            },
            Err(_) => default,
        }
    }

    fn read_env_u32(name: &str, default: u32) -> u32 {
        match std::env::var(name) {
            Ok(v) => v.trim().parse::<u32>().unwrap_or_else(|_| {
                log::warn!("Ignoring invalid {}='{}', using {}", name, v, default);
                default
            }),
            Err(_) => default,
        }
    }

    fn read_env_millis(name: &str, default: Duration) -> Duration {
        match std::env::var(name) {
            Ok(v) => match v.trim().parse::<u64>() {
                Ok(ms) => Duration::from_millis(ms),
                Err(_) => {
                    log::warn!("Ignoring invalid {}='{}', using {:?}", name, v, default);
                    default
                }
            },
            Err(_) => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_device_flow() {
        let config = CaptureConfig::default();
        assert_eq!(config.target_resolution, (3840, 2160));
        assert_eq!(config.capture_type, CaptureType::Video);
        assert_eq!(config.frame_rate, CaptureFrameRate::Fps30);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert!(!config.invert_vertically);
        assert!(!config.verbose_logging);
    }

    #[test]
    fn test_env_overlay() {
        // Variable names are unique to this test.
        std::env::set_var("ML2_TEST_BOOL", "yes");
        std::env::set_var("ML2_TEST_U32", "1920");
        std::env::set_var("ML2_TEST_MS", "250");
        std::env::set_var("ML2_TEST_BAD", "not-a-number");

        assert!(CaptureConfig::read_env_bool("ML2_TEST_BOOL", false));
        assert_eq!(CaptureConfig::read_env_u32("ML2_TEST_U32", 0), 1920);
        assert_eq!(
            CaptureConfig::read_env_millis("ML2_TEST_MS", Duration::ZERO),
            Duration::from_millis(250)
        );
        assert_eq!(CaptureConfig::read_env_u32("ML2_TEST_BAD", 7), 7);
        assert!(CaptureConfig::read_env_bool("ML2_TEST_UNSET", true));
    }
}
