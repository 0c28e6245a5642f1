use clap::Parser;
use std::time::Duration;
use workstate_core::{StalenessPolicy, StoreConfig};

pub const DEFAULT_PORT: u16 = 7777;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: String,
    pub debug: bool,
    pub log_dir: String,
    pub refresh_interval: Duration,
    pub sweep_interval: Duration,
    pub advisory_threshold: usize,
    pub store: StoreConfig,
}

#[derive(Parser, Debug)]
#[command(name = "workstate-hub", about = "Local dashboard for concurrent session status")]
pub struct Args {
    /// Listen address; must be loopback. Overrides --port.
    #[arg(long, default_value = "")]
    addr: String,
    #[arg(long, default_value_t = 0)]
    port: u16,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[arg(long, default_value = "")]
    log_dir: String,
    /// Browser refresh interval of the dashboard page.
    #[arg(long, default_value_t = 5)]
    refresh_seconds: u64,
    #[arg(long, default_value_t = 60)]
    sweep_seconds: u64,
    #[arg(long, default_value_t = 120)]
    aging_seconds: u64,
    #[arg(long, default_value_t = 300)]
    stale_seconds: u64,
    #[arg(long, default_value_t = 600)]
    thread_expiry_seconds: u64,
    /// Active session count at which the page shows an advisory banner.
    #[arg(long, default_value_t = 3)]
    advisory_threshold: usize,
}

pub fn load_config() -> Config {
    Config::from_args(Args::parse())
}

impl Config {
    pub fn from_args(args: Args) -> Self {
        let port = resolve_port(args.port);
        let addr = resolve_addr(&args.addr, port);
        let debug = args.debug || env_true("WORKSTATE_DEBUG");
        let log_dir = resolve_log_dir(&args.log_dir);

        let aging_after = Duration::from_secs(args.aging_seconds);
        let stale_after = Duration::from_secs(args.stale_seconds).max(aging_after);
        let store = StoreConfig {
            staleness: StalenessPolicy {
                aging_after,
                stale_after,
            },
            thread_expiry: Duration::from_secs(args.thread_expiry_seconds),
            ..StoreConfig::default()
        };

        Config {
            addr,
            debug,
            log_dir,
            refresh_interval: Duration::from_secs(args.refresh_seconds.max(1)),
            sweep_interval: Duration::from_secs(args.sweep_seconds.max(1)),
            advisory_threshold: args.advisory_threshold,
            store,
        }
    }
}

pub fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn resolve_port(port_flag: u16) -> u16 {
    if port_flag != 0 {
        return port_flag;
    }
    if let Ok(value) = std::env::var("WORKSTATE_PORT") {
        if let Ok(port) = value.trim().parse::<u16>() {
            if port != 0 {
                return port;
            }
        }
    }
    DEFAULT_PORT
}

fn resolve_addr(addr_flag: &str, port: u16) -> String {
    if !addr_flag.trim().is_empty() {
        return addr_flag.to_string();
    }
    if let Ok(value) = std::env::var("WORKSTATE_ADDR") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    format!("127.0.0.1:{port}")
}

fn resolve_log_dir(log_dir_flag: &str) -> String {
    if !log_dir_flag.trim().is_empty() {
        return log_dir_flag.to_string();
    }
    if let Ok(value) = std::env::var("WORKSTATE_LOG_DIR") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(argv: &[&str]) -> Config {
        let mut full = vec!["workstate-hub"];
        full.extend_from_slice(argv);
        Config::from_args(Args::try_parse_from(full).expect("args parse"))
    }

    #[test]
    fn defaults_match_dashboard_contract() {
        let config = config_from(&["--addr", "127.0.0.1:7777"]);
        assert_eq!(config.addr, "127.0.0.1:7777");
        assert_eq!(config.refresh_interval, Duration::from_secs(5));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.advisory_threshold, 3);
        assert_eq!(config.store.staleness.aging_after, Duration::from_secs(120));
        assert_eq!(config.store.staleness.stale_after, Duration::from_secs(300));
        assert_eq!(config.store.thread_expiry, Duration::from_secs(600));
    }

    #[test]
    fn explicit_port_builds_loopback_addr() {
        assert_eq!(resolve_addr("", 9100), "127.0.0.1:9100");
        assert_eq!(resolve_port(9100), 9100);
    }

    #[test]
    fn stale_threshold_never_precedes_aging() {
        let config = config_from(&[
            "--addr",
            "127.0.0.1:7777",
            "--aging-seconds",
            "90",
            "--stale-seconds",
            "30",
        ]);
        assert_eq!(config.store.staleness.aging_after, Duration::from_secs(90));
        assert_eq!(config.store.staleness.stale_after, Duration::from_secs(90));
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let config = config_from(&[
            "--addr",
            "127.0.0.1:7777",
            "--refresh-seconds",
            "0",
            "--sweep-seconds",
            "0",
        ]);
        assert_eq!(config.refresh_interval, Duration::from_secs(1));
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
    }
}
