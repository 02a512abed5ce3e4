use crate::hls::playlist::HostAliases;
use crate::stitcher::StaticAdRule;
use std::env;
use std::time::Duration;

/// Default alias table: the ad server's local address maps to its public host
pub const DEFAULT_HOST_ALIASES: &str = "http://localhost:8000=https://ads.wkkworld.com";

/// Ad provider selection
#[derive(Clone, Debug, PartialEq)]
pub enum AdProviderType {
    /// Same configured ad playlist for every break (default for dev)
    Static,
    /// Per-break decisions from the channel service
    Decision,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub base_url: String,
    pub is_dev: bool,
    /// Channel service base URL (channel lookup, ad decisions, tracking)
    pub channel_service_url: Option<String>,
    pub channel_service_api_key: String,
    /// Single origin served for every channel when no channel service is configured
    pub origin_url: Option<String>,
    pub ad_provider_type: AdProviderType,
    /// Ad playlist or VAST tag used by the static provider
    pub ad_source_url: String,
    /// Advertised ad duration for the static provider, seconds
    pub ad_duration: u32,
    /// Extra rules applied to every channel
    pub static_ad_rules: Vec<StaticAdRule>,
    /// Mid-roll interval for the static channel directory
    pub ad_break_interval_secs: Option<u32>,
    /// Timeout applied to each upstream request
    pub upstream_timeout: Duration,
    pub vast_max_wrapper_depth: usize,
    pub host_aliases: HostAliases,
    pub channel_cache_ttl: Duration,
    pub metrics_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode, provides sensible defaults. In PROD mode, core vars are required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        // Port: required in prod, defaults to 3000 in dev
        let port = if is_dev {
            env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        // Base URL: required in prod, defaults to localhost in dev
        let base_url = if is_dev {
            env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
        } else {
            env::var("BASE_URL").map_err(|_| "BASE_URL is required in production")?
        };

        let channel_service_url = non_empty("CHANNEL_SERVICE_URL");
        let channel_service_api_key = env::var("CHANNEL_SERVICE_API_KEY").unwrap_or_default();

        // Origin: either a channel service or a fixed origin is required in prod
        let origin_url = match non_empty("ORIGIN_URL") {
            Some(url) => Some(url),
            None if channel_service_url.is_some() => None,
            None if is_dev => Some("https://example.com/live/index.m3u8".to_string()),
            None => {
                return Err("CHANNEL_SERVICE_URL or ORIGIN_URL is required in production".into());
            }
        };

        // Ad provider type: auto-detect from CHANNEL_SERVICE_URL or explicit AD_PROVIDER_TYPE
        let ad_provider_type = match env::var("AD_PROVIDER_TYPE")
            .unwrap_or_else(|_| "auto".to_string())
            .to_lowercase()
            .as_str()
        {
            "decision" => AdProviderType::Decision,
            "static" => AdProviderType::Static,
            _ => {
                if channel_service_url.is_some() {
                    AdProviderType::Decision
                } else {
                    AdProviderType::Static
                }
            }
        };
        if ad_provider_type == AdProviderType::Decision && channel_service_url.is_none() {
            return Err("AD_PROVIDER_TYPE=decision requires CHANNEL_SERVICE_URL".into());
        }

        let ad_source_url = env::var("AD_SOURCE_URL").unwrap_or_default();

        let ad_duration = env::var("AD_DURATION")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let static_ad_rules = match non_empty("STATIC_AD_RULES") {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| format!("STATIC_AD_RULES is not a valid rule list: {e}"))?,
            None => Vec::new(),
        };

        let ad_break_interval_secs = env::var("AD_BREAK_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs: &u32| *secs > 0);

        let upstream_timeout_ms: u64 = env::var("UPSTREAM_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .unwrap_or(10_000);

        let vast_max_wrapper_depth = env::var("VAST_MAX_WRAPPER_DEPTH")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let host_aliases = HostAliases::parse(
            &env::var("HOST_ALIASES").unwrap_or_else(|_| DEFAULT_HOST_ALIASES.to_string()),
        );

        let channel_cache_ttl_secs: u64 = env::var("CHANNEL_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let metrics_enabled = env::var("METRICS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        Ok(Config {
            port,
            base_url,
            is_dev,
            channel_service_url,
            channel_service_api_key,
            origin_url,
            ad_provider_type,
            ad_source_url,
            ad_duration,
            static_ad_rules,
            ad_break_interval_secs,
            upstream_timeout: Duration::from_millis(upstream_timeout_ms),
            vast_max_wrapper_depth,
            host_aliases,
            channel_cache_ttl: Duration::from_secs(channel_cache_ttl_secs),
            metrics_enabled,
        })
    }

    /// Minimal dev configuration pointing at a fixed origin.
    pub fn for_origin(origin_url: impl Into<String>) -> Self {
        Config {
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            is_dev: true,
            channel_service_url: None,
            channel_service_api_key: String::new(),
            origin_url: Some(origin_url.into()),
            ad_provider_type: AdProviderType::Static,
            ad_source_url: String::new(),
            ad_duration: 30,
            static_ad_rules: Vec::new(),
            ad_break_interval_secs: None,
            upstream_timeout: Duration::from_secs(10),
            vast_max_wrapper_depth: 5,
            host_aliases: HostAliases::parse(DEFAULT_HOST_ALIASES),
            channel_cache_ttl: Duration::from_secs(30),
            metrics_enabled: false,
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stitcher::BreakPosition;
    use std::sync::Mutex;

    /// Serialize all env-var tests to prevent races between parallel test threads.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ALL_KEYS: &[&str] = &[
        "DEV_MODE",
        "PORT",
        "BASE_URL",
        "CHANNEL_SERVICE_URL",
        "CHANNEL_SERVICE_API_KEY",
        "ORIGIN_URL",
        "AD_PROVIDER_TYPE",
        "AD_SOURCE_URL",
        "AD_DURATION",
        "STATIC_AD_RULES",
        "AD_BREAK_INTERVAL_SECS",
        "UPSTREAM_TIMEOUT_MS",
        "VAST_MAX_WRAPPER_DEPTH",
        "HOST_ALIASES",
        "CHANNEL_CACHE_TTL_SECS",
        "METRICS_ENABLED",
    ];

    /// Set env vars, run `f`, then restore original state.
    ///
    /// Every known key not in `set` is removed for the duration of `f`.
    fn with_env(set: &[(&str, &str)], f: impl FnOnce()) {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());

        let saved: Vec<(&str, Option<String>)> =
            ALL_KEYS.iter().map(|k| (*k, std::env::var(k).ok())).collect();

        for k in ALL_KEYS {
            // SAFETY: serialized by ENV_LOCK, no other thread modifies env vars concurrently.
            unsafe { std::env::remove_var(k) };
        }
        for (k, v) in set {
            unsafe { std::env::set_var(k, v) };
        }

        f();

        // Restore
        for (k, old) in saved {
            match old {
                Some(v) => unsafe { std::env::set_var(k, v) },
                None => unsafe { std::env::remove_var(k) },
            }
        }
    }

    #[test]
    fn dev_mode_uses_defaults() {
        with_env(&[("DEV_MODE", "true")], || {
            let config = Config::from_env().expect("should succeed in dev mode");
            assert!(config.is_dev);
            assert_eq!(config.port, 3000);
            assert_eq!(config.base_url, "http://localhost:3000");
            assert_eq!(
                config.origin_url.as_deref(),
                Some("https://example.com/live/index.m3u8")
            );
            assert_eq!(config.ad_provider_type, AdProviderType::Static);
            assert_eq!(config.upstream_timeout, Duration::from_millis(10_000));
            assert_eq!(config.vast_max_wrapper_depth, 5);
            assert_eq!(config.channel_cache_ttl, Duration::from_secs(30));
            assert_eq!(config.host_aliases, HostAliases::parse(DEFAULT_HOST_ALIASES));
            assert!(config.static_ad_rules.is_empty());
            assert!(config.metrics_enabled);
        });
    }

    #[test]
    fn prod_mode_requires_port() {
        with_env(&[], || {
            let result = Config::from_env();
            assert!(result.is_err(), "Should fail without PORT in prod mode");
        });
    }

    #[test]
    fn prod_mode_requires_base_url() {
        with_env(&[("PORT", "8080")], || {
            let result = Config::from_env();
            assert!(result.is_err(), "Should fail without BASE_URL in prod mode");
        });
    }

    #[test]
    fn prod_mode_requires_an_origin_source() {
        with_env(&[("PORT", "8080"), ("BASE_URL", "https://ssai.example.com")], || {
            let result = Config::from_env();
            assert!(
                result.is_err(),
                "Should fail without CHANNEL_SERVICE_URL or ORIGIN_URL in prod mode"
            );
        });
    }

    #[test]
    fn channel_service_selects_decision_provider() {
        with_env(
            &[
                ("PORT", "8080"),
                ("BASE_URL", "https://ssai.example.com"),
                ("CHANNEL_SERVICE_URL", "https://api.example.com"),
                ("CHANNEL_SERVICE_API_KEY", "k"),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.ad_provider_type, AdProviderType::Decision);
                assert!(config.origin_url.is_none());
                assert_eq!(config.channel_service_api_key, "k");
            },
        );
    }

    #[test]
    fn explicit_static_overrides_channel_service() {
        with_env(
            &[
                ("DEV_MODE", "true"),
                ("CHANNEL_SERVICE_URL", "https://api.example.com"),
                ("AD_PROVIDER_TYPE", "static"),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.ad_provider_type, AdProviderType::Static);
            },
        );
    }

    #[test]
    fn decision_provider_requires_channel_service() {
        with_env(&[("DEV_MODE", "true"), ("AD_PROVIDER_TYPE", "decision")], || {
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn static_rules_parsed_from_json() {
        with_env(
            &[
                ("DEV_MODE", "true"),
                (
                    "STATIC_AD_RULES",
                    r#"[{"position":"pre-roll","duration":15},{"position":"mid-roll","offset":120,"duration":30,"interval":300}]"#,
                ),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.static_ad_rules.len(), 2);
                assert_eq!(config.static_ad_rules[0].position, BreakPosition::PreRoll);
                assert_eq!(config.static_ad_rules[1].interval, 300.0);
            },
        );
    }

    #[test]
    fn invalid_static_rules_are_rejected() {
        with_env(&[("DEV_MODE", "true"), ("STATIC_AD_RULES", "[{")], || {
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn tunables_parsed() {
        with_env(
            &[
                ("DEV_MODE", "true"),
                ("UPSTREAM_TIMEOUT_MS", "2500"),
                ("VAST_MAX_WRAPPER_DEPTH", "3"),
                ("AD_BREAK_INTERVAL_SECS", "600"),
                ("AD_DURATION", "45"),
                ("HOST_ALIASES", "http://a=https://b"),
                ("CHANNEL_CACHE_TTL_SECS", "5"),
                ("METRICS_ENABLED", "false"),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.upstream_timeout, Duration::from_millis(2500));
                assert_eq!(config.vast_max_wrapper_depth, 3);
                assert_eq!(config.ad_break_interval_secs, Some(600));
                assert_eq!(config.ad_duration, 45);
                assert_eq!(config.host_aliases.apply("http://a/x"), "https://b/x");
                assert_eq!(config.channel_cache_ttl, Duration::from_secs(5));
                assert!(!config.metrics_enabled);
            },
        );
    }

    #[test]
    fn zero_interval_means_none() {
        with_env(&[("DEV_MODE", "true"), ("AD_BREAK_INTERVAL_SECS", "0")], || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.ad_break_interval_secs, None);
        });
    }
}
