use crate::config::Config;
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
    sync::Mutex,
};
use tracing_subscriber::{
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    EnvFilter,
};

pub const LOG_FILE_NAME: &str = "workstate-hub.log";

/// Installs the global subscriber. `RUST_LOG` wins over the configured level;
/// with a log dir every line also lands in `workstate-hub.log` there.
pub fn init_logging(config: &Config) {
    let level = default_level(config.debug, std::env::var("WORKSTATE_LOG_LEVEL").ok());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let writer = match open_log_file(Path::new(&config.log_dir)) {
        Ok(Some(file)) => BoxMakeWriter::new(io::stdout.and(Mutex::new(file))),
        Ok(None) => BoxMakeWriter::new(io::stdout),
        Err(err) => {
            eprintln!("workstate-hub: log file unavailable in {:?}: {err}", config.log_dir);
            BoxMakeWriter::new(io::stdout)
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .try_init();
}

fn default_level(debug: bool, env_level: Option<String>) -> String {
    if debug {
        return "debug".to_string();
    }
    env_level
        .map(|level| level.trim().to_string())
        .filter(|level| !level.is_empty())
        .unwrap_or_else(|| "info".to_string())
}

fn open_log_file(log_dir: &Path) -> io::Result<Option<File>> {
    if log_dir.to_string_lossy().trim().is_empty() {
        return Ok(None);
    }
    std::fs::create_dir_all(log_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::Write,
        path::PathBuf,
        time::{SystemTime, UNIX_EPOCH},
    };
    use tracing_subscriber::fmt::MakeWriter;

    fn temp_log_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("workstate-hub-log-{name}-{nanos}"))
    }

    #[test]
    fn debug_flag_beats_env_level() {
        assert_eq!(default_level(true, Some("warn".to_string())), "debug");
        assert_eq!(default_level(false, Some(" warn ".to_string())), "warn");
        assert_eq!(default_level(false, Some("".to_string())), "info");
        assert_eq!(default_level(false, None), "info");
    }

    #[test]
    fn blank_log_dir_means_stdout_only() {
        assert!(open_log_file(Path::new("")).unwrap().is_none());
        assert!(open_log_file(Path::new("  ")).unwrap().is_none());
    }

    #[test]
    fn tee_appends_to_log_file() {
        let dir = temp_log_dir("tee");
        let file = open_log_file(&dir).unwrap().expect("log file");
        let tee = io::sink.and(Mutex::new(file));

        let mut writer = tee.make_writer();
        writer.write_all(b"event=hub_start\n").unwrap();
        writer.flush().unwrap();
        drop(writer);

        let contents = std::fs::read_to_string(dir.join(LOG_FILE_NAME)).unwrap();
        assert!(contents.contains("event=hub_start"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
