use std::{env, path::PathBuf};

pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 200;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Parent of the per-request scratch directories.
    pub scratch_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            scratch_dir: env::temp_dir().join("rustiscorm"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
        }
    }
}

impl Config {
    /// Read `PORT`, `SCRATCH_DIR` and `MAX_UPLOAD_MB`; unset or unparsable
    /// values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| env::var(k).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: get("PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            scratch_dir: get("SCRATCH_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            max_upload_bytes: get("MAX_UPLOAD_MB")
                .and_then(|s| s.parse::<usize>().ok())
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.max_upload_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(lookup(&[]));
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.max_upload_bytes, 200 * 1024 * 1024);
        assert!(cfg.scratch_dir.ends_with("rustiscorm"));
    }

    #[test]
    fn reads_overrides() {
        let cfg = Config::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("SCRATCH_DIR", "/var/tmp/scorm"),
            ("MAX_UPLOAD_MB", "16"),
        ]));
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.scratch_dir, PathBuf::from("/var/tmp/scorm"));
        assert_eq!(cfg.max_upload_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn ignores_garbage() {
        let cfg = Config::from_lookup(lookup(&[("PORT", "http"), ("SCRATCH_DIR", " ")]));
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert!(cfg.scratch_dir.ends_with("rustiscorm"));
    }
}
