//! Typed process configuration, assembled once at startup from the
//! environment via `clap`'s derive + `env` support, in the same style
//! used for the CLI worker configuration elsewhere in this corpus.
//! Nothing downstream re-reads the environment directly.

use crate::domain::DEFAULT_WORKER_COUNT;
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "blue-banded-bee", version, about = "Cache-warming job engine")]
pub struct AppConfig {
    /// SQLite connection string, e.g. `sqlite://data.db` or `sqlite::memory:`.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://blue-banded-bee.db")]
    pub database_url: String,

    /// Public base URL this process is reachable at (used in webhook URLs, logs).
    #[arg(long, env = "APP_URL", default_value = "http://localhost:8080")]
    pub app_url: String,

    /// Address the HTTP surface binds to.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Process-wide worker pool size (the Rate Limiter's global concurrency cap).
    #[arg(long, env = "WORKER_COUNT", default_value_t = DEFAULT_WORKER_COUNT)]
    pub worker_count: usize,

    /// `tracing-subscriber` env-filter directive, e.g. `info` or `blue_banded_bee_engine=debug`.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Stub: validates inbound JWTs on the authenticated surface. Auth is out
    /// of scope here; when unset, auth middleware is not installed.
    #[arg(long, env = "SUPABASE_JWT_SECRET")]
    pub supabase_jwt_secret: Option<String>,

    /// Stub: error-reporting DSN. Unset disables the reporting layer.
    #[arg(long, env = "SENTRY_DSN")]
    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    /// Parse configuration from `std::env::args()` plus environment
    /// variables. Call once at process start.
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_with_no_arguments() {
        let cfg = AppConfig::parse_from(["blue-banded-bee"]);
        assert_eq!(cfg.worker_count, DEFAULT_WORKER_COUNT);
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.supabase_jwt_secret.is_none());
    }

    #[test]
    fn env_var_overrides_default() {
        // SAFETY: single-threaded test, no other test reads WORKER_COUNT concurrently.
        unsafe {
            std::env::set_var("WORKER_COUNT", "7");
        }
        let cfg = AppConfig::parse_from(["blue-banded-bee"]);
        assert_eq!(cfg.worker_count, 7);
        unsafe {
            std::env::remove_var("WORKER_COUNT");
        }
    }
}
