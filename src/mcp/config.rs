//! Configuration resolution for the session server.
//!
//! Values follow a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided value (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_CONNECT_TIMEOUT` | 30s | Connection + authentication timeout in seconds |
//! | `SSH_COMMAND_TIMEOUT` | 180s | Command execution timeout in seconds |
//! | `SSH_MAX_RETRIES` | 3 | Connect retry attempts made by the tool layer |
//! | `SSH_RETRY_DELAY_MS` | 1000ms | Initial retry delay in milliseconds |
//! | `SSH_COMPRESSION` | true | Enable zlib compression |
//! | `MAX_SESSIONS` | 10 | Maximum concurrently active sessions |
//! | `SESSION_TIMEOUT` | 3600s | Idle window before a session is reaped |
//! | `SESSION_REAP_INTERVAL` | 60s | How often the idle reaper sweeps |
//! | `KUBE_DEFAULT_NAMESPACE` | default | Namespace used when a kubeconfig names none |

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default SSH connection timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default SSH command execution timeout in seconds
pub(crate) const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 180;

/// Default maximum retry attempts for SSH connection
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default retry delay in milliseconds
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Maximum retry delay cap (10 seconds)
pub(crate) const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Default ceiling on concurrently active sessions
pub(crate) const DEFAULT_MAX_SESSIONS: usize = 10;

/// Default idle window in seconds (1 hour)
pub(crate) const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 3600;

/// Default reaper sweep interval in seconds
pub(crate) const DEFAULT_REAP_INTERVAL_SECS: u64 = 60;

/// Namespace used when neither the caller nor the kubeconfig names one
pub(crate) const DEFAULT_NAMESPACE: &str = "default";

/// Environment variable name for SSH connection timeout
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_CONNECT_TIMEOUT";

/// Environment variable name for SSH command execution timeout
pub(crate) const COMMAND_TIMEOUT_ENV_VAR: &str = "SSH_COMMAND_TIMEOUT";

/// Environment variable name for SSH max retries
pub(crate) const MAX_RETRIES_ENV_VAR: &str = "SSH_MAX_RETRIES";

/// Environment variable name for SSH retry delay in milliseconds
pub(crate) const RETRY_DELAY_MS_ENV_VAR: &str = "SSH_RETRY_DELAY_MS";

/// Environment variable name for SSH compression
pub(crate) const COMPRESSION_ENV_VAR: &str = "SSH_COMPRESSION";

/// Environment variable name for the session ceiling
pub(crate) const MAX_SESSIONS_ENV_VAR: &str = "MAX_SESSIONS";

/// Environment variable name for the idle window in seconds
pub(crate) const IDLE_TIMEOUT_ENV_VAR: &str = "SESSION_TIMEOUT";

/// Environment variable name for the reaper interval in seconds
pub(crate) const REAP_INTERVAL_ENV_VAR: &str = "SESSION_REAP_INTERVAL";

/// Environment variable name for the fallback namespace
pub(crate) const DEFAULT_NAMESPACE_ENV_VAR: &str = "KUBE_DEFAULT_NAMESPACE";

/// Resolve a value with priority: parameter -> env var -> default.
///
/// Unparseable environment values are ignored.
fn resolve<T: FromStr>(param: Option<T>, env_var: &str, default: T) -> T {
    if let Some(value) = param {
        return value;
    }

    if let Ok(raw) = env::var(env_var)
        && let Ok(value) = raw.trim().parse::<T>()
    {
        return value;
    }

    default
}

/// Resolve the connection timeout with priority: parameter -> env var -> default
pub(crate) fn resolve_connect_timeout(timeout_secs: Option<u64>) -> Duration {
    Duration::from_secs(resolve(
        timeout_secs,
        CONNECT_TIMEOUT_ENV_VAR,
        DEFAULT_CONNECT_TIMEOUT_SECS,
    ))
}

/// Resolve the command execution timeout with priority: parameter -> env var -> default
pub(crate) fn resolve_command_timeout(timeout_secs: Option<u64>) -> Duration {
    Duration::from_secs(resolve(
        timeout_secs,
        COMMAND_TIMEOUT_ENV_VAR,
        DEFAULT_COMMAND_TIMEOUT_SECS,
    ))
}

/// Resolve the max retries value with priority: parameter -> env var -> default
pub(crate) fn resolve_max_retries(max_retries: Option<u32>) -> u32 {
    resolve(max_retries, MAX_RETRIES_ENV_VAR, DEFAULT_MAX_RETRIES)
}

/// Resolve the initial retry delay with priority: parameter -> env var -> default
pub(crate) fn resolve_retry_delay(retry_delay_ms: Option<u64>) -> Duration {
    Duration::from_millis(resolve(
        retry_delay_ms,
        RETRY_DELAY_MS_ENV_VAR,
        DEFAULT_RETRY_DELAY_MS,
    ))
}

/// Resolve the compression setting with priority: parameter -> env var -> default (true)
pub(crate) fn resolve_compression(compress: Option<bool>) -> bool {
    if let Some(compress) = compress {
        return compress;
    }

    if let Ok(env_compress) = env::var(COMPRESSION_ENV_VAR) {
        return env_compress.eq_ignore_ascii_case("true") || env_compress == "1";
    }

    true
}

/// Resolve the session ceiling. Zero is rejected in favour of the default.
pub(crate) fn resolve_max_sessions(max_sessions: Option<usize>) -> usize {
    match resolve(max_sessions, MAX_SESSIONS_ENV_VAR, DEFAULT_MAX_SESSIONS) {
        0 => DEFAULT_MAX_SESSIONS,
        n => n,
    }
}

/// Resolve the idle window with priority: parameter -> env var -> default
pub(crate) fn resolve_idle_timeout(idle_secs: Option<u64>) -> Duration {
    Duration::from_secs(resolve(
        idle_secs,
        IDLE_TIMEOUT_ENV_VAR,
        DEFAULT_IDLE_TIMEOUT_SECS,
    ))
}

/// Resolve the reaper interval. Zero is rejected in favour of the default.
pub(crate) fn resolve_reap_interval(interval_secs: Option<u64>) -> Duration {
    match resolve(
        interval_secs,
        REAP_INTERVAL_ENV_VAR,
        DEFAULT_REAP_INTERVAL_SECS,
    ) {
        0 => Duration::from_secs(DEFAULT_REAP_INTERVAL_SECS),
        secs => Duration::from_secs(secs),
    }
}

/// Resolve the fallback namespace. Blank values fall through to the default.
pub(crate) fn resolve_default_namespace(namespace: Option<String>) -> String {
    let resolved = resolve(
        namespace.filter(|ns| !ns.trim().is_empty()),
        DEFAULT_NAMESPACE_ENV_VAR,
        DEFAULT_NAMESPACE.to_string(),
    );
    if resolved.trim().is_empty() {
        DEFAULT_NAMESPACE.to_string()
    } else {
        resolved
    }
}

/// Settings the session manager is built with.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Deadline for connection establishment plus authentication
    pub connect_timeout: Duration,
    /// Command deadline used when a call does not give one
    pub command_timeout: Duration,
    /// Maximum concurrently active sessions
    pub max_sessions: usize,
    /// Sessions idle for longer than this are closed by the reaper
    pub idle_timeout: Duration,
    /// Reaper sweep period
    pub reap_interval: Duration,
    /// Namespace used when a kubeconfig context names none
    pub default_namespace: String,
}

impl ManagerConfig {
    /// Build the configuration from environment variables and defaults.
    pub fn from_env() -> Self {
        Self {
            connect_timeout: resolve_connect_timeout(None),
            command_timeout: resolve_command_timeout(None),
            max_sessions: resolve_max_sessions(None),
            idle_timeout: resolve_idle_timeout(None),
            reap_interval: resolve_reap_interval(None),
            default_namespace: resolve_default_namespace(None),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            reap_interval: Duration::from_secs(DEFAULT_REAP_INTERVAL_SECS),
            default_namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    // Use a mutex to serialize env var tests to avoid race conditions
    static ENV_TEST_MUTEX: once_cell::sync::Lazy<StdMutex<()>> =
        once_cell::sync::Lazy::new(|| StdMutex::new(()));

    /// Set an environment variable, run `f`, then remove the variable.
    fn with_env<R>(key: &str, value: &str, f: impl FnOnce() -> R) -> R {
        let _guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
        unsafe { env::set_var(key, value) };
        let result = f();
        // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
        unsafe { env::remove_var(key) };
        result
    }

    /// Run `f` with the variable unset.
    fn without_env<R>(key: &str, f: impl FnOnce() -> R) -> R {
        let _guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
        unsafe { env::remove_var(key) };
        f()
    }

    mod connect_timeout {
        use super::*;

        #[test]
        fn test_uses_param_when_provided() {
            assert_eq!(resolve_connect_timeout(Some(60)), Duration::from_secs(60));
        }

        #[test]
        fn test_param_takes_priority_over_env() {
            let result = with_env(CONNECT_TIMEOUT_ENV_VAR, "120", || {
                resolve_connect_timeout(Some(45))
            });
            assert_eq!(result, Duration::from_secs(45));
        }

        #[test]
        fn test_uses_env_var_when_no_param() {
            let result = with_env(CONNECT_TIMEOUT_ENV_VAR, "90", || resolve_connect_timeout(None));
            assert_eq!(result, Duration::from_secs(90));
        }

        #[test]
        fn test_uses_default_when_no_param_or_env() {
            let result = without_env(CONNECT_TIMEOUT_ENV_VAR, || resolve_connect_timeout(None));
            assert_eq!(result, Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));
        }

        #[test]
        fn test_ignores_negative_env_var() {
            let result = with_env(CONNECT_TIMEOUT_ENV_VAR, "-10", || resolve_connect_timeout(None));
            // Parsing fails for negative u64, so default is used
            assert_eq!(result, Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));
        }
    }

    mod command_timeout {
        use super::*;

        #[test]
        fn test_uses_env_var_when_no_param() {
            let result = with_env(COMMAND_TIMEOUT_ENV_VAR, "240", || resolve_command_timeout(None));
            assert_eq!(result, Duration::from_secs(240));
        }

        #[test]
        fn test_ignores_invalid_env_var() {
            let result = with_env(COMMAND_TIMEOUT_ENV_VAR, "not_a_number", || {
                resolve_command_timeout(None)
            });
            assert_eq!(result, Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS));
        }
    }

    mod retries {
        use super::*;

        #[test]
        fn test_zero_retries_is_valid() {
            assert_eq!(resolve_max_retries(Some(0)), 0);
        }

        #[test]
        fn test_retry_delay_from_env() {
            let result = with_env(RETRY_DELAY_MS_ENV_VAR, "3000", || resolve_retry_delay(None));
            assert_eq!(result, Duration::from_millis(3000));
        }

        #[test]
        fn test_max_retry_delay_is_reasonable() {
            assert!(MAX_RETRY_DELAY.as_secs() >= 5);
            assert!(MAX_RETRY_DELAY.as_secs() <= 60);
        }
    }

    mod compression {
        use super::*;

        #[test]
        fn test_param_takes_priority_over_env() {
            let result = with_env(COMPRESSION_ENV_VAR, "true", || resolve_compression(Some(false)));
            assert!(!result);
        }

        #[test]
        fn test_env_var_true_mixed_case() {
            assert!(with_env(COMPRESSION_ENV_VAR, "TrUe", || resolve_compression(None)));
        }

        #[test]
        fn test_env_var_one() {
            assert!(with_env(COMPRESSION_ENV_VAR, "1", || resolve_compression(None)));
        }

        #[test]
        fn test_env_var_random_value_is_false() {
            // "yes" is not "true" or "1", so it's false
            assert!(!with_env(COMPRESSION_ENV_VAR, "yes", || resolve_compression(None)));
        }

        #[test]
        fn test_default_is_true() {
            assert!(without_env(COMPRESSION_ENV_VAR, || resolve_compression(None)));
        }
    }

    mod sessions {
        use super::*;

        #[test]
        fn test_max_sessions_from_env() {
            assert_eq!(with_env(MAX_SESSIONS_ENV_VAR, "25", || resolve_max_sessions(None)), 25);
        }

        #[test]
        fn test_zero_max_sessions_falls_back_to_default() {
            assert_eq!(resolve_max_sessions(Some(0)), DEFAULT_MAX_SESSIONS);
        }

        #[test]
        fn test_idle_timeout_from_env() {
            let result = with_env(IDLE_TIMEOUT_ENV_VAR, "600", || resolve_idle_timeout(None));
            assert_eq!(result, Duration::from_secs(600));
        }

        #[test]
        fn test_zero_reap_interval_falls_back_to_default() {
            assert_eq!(
                resolve_reap_interval(Some(0)),
                Duration::from_secs(DEFAULT_REAP_INTERVAL_SECS)
            );
        }
    }

    mod namespace {
        use super::*;

        #[test]
        fn test_param_wins() {
            assert_eq!(resolve_default_namespace(Some("apps".to_string())), "apps");
        }

        #[test]
        fn test_blank_param_falls_through_to_env() {
            let result = with_env(DEFAULT_NAMESPACE_ENV_VAR, "platform", || {
                resolve_default_namespace(Some("  ".to_string()))
            });
            assert_eq!(result, "platform");
        }

        #[test]
        fn test_blank_env_uses_default() {
            let result = with_env(DEFAULT_NAMESPACE_ENV_VAR, "", || resolve_default_namespace(None));
            assert_eq!(result, DEFAULT_NAMESPACE);
        }
    }

    #[test]
    fn test_manager_config_default() {
        let config = ManagerConfig::default();
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
        assert_eq!(config.default_namespace, "default");
        assert_eq!(config.idle_timeout, Duration::from_secs(3600));
    }
}
