//! Filesystem locations for Warden's persistent state.
//!
//! ```text
//! ~/.config/warden/
//! ├── config.json
//! ├── audit.jsonl
//! └── approvals/
//!     └── <ID>.json
//! ```

use std::env;
use std::path::{Path, PathBuf};

/// Directory name under `~/.config`.
pub const APP_DIR_NAME: &str = "warden";

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "WARDEN_DIR";

/// Return the user's home directory path.
///
/// Uses HOME on Unix-like systems and USERPROFILE on Windows.
pub fn get_home_dir() -> Result<String, String> {
    if let Ok(home) = env::var("HOME") {
        if !home.is_empty() {
            return Ok(home);
        }
    }

    if let Ok(profile) = env::var("USERPROFILE") {
        if !profile.is_empty() {
            return Ok(profile);
        }
    }

    Err("Home directory not set".to_string())
}

/// Resolve the default data directory.
///
/// `WARDEN_DIR` wins when set; otherwise `~/.config/warden`.
pub fn default_data_dir() -> Result<PathBuf, String> {
    if let Ok(dir) = env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    let home = get_home_dir()?;
    Ok(Path::new(&home).join(".config").join(APP_DIR_NAME))
}

/// Directory holding one JSON file per approval record.
pub fn approvals_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("approvals")
}

/// Path of the append-only audit log.
pub fn audit_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("audit.jsonl")
}

/// Path of the optional settings file.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env<F: FnOnce()>(vars: &[(&str, Option<&str>)], f: F) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let previous: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(key, _)| (key.to_string(), env::var(key).ok()))
            .collect();

        for (key, value) in vars {
            match value {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }

        f();

        for (key, value) in previous {
            match value {
                Some(value) => env::set_var(&key, value),
                None => env::remove_var(&key),
            }
        }
    }

    #[test]
    fn get_home_dir_prefers_home() {
        with_env(
            &[("HOME", Some("/tmp/home")), ("USERPROFILE", Some("/tmp/profile"))],
            || {
                let home = get_home_dir().expect("home dir");
                assert_eq!(home, "/tmp/home");
            },
        );
    }

    #[test]
    fn get_home_dir_falls_back_to_userprofile() {
        with_env(&[("HOME", None), ("USERPROFILE", Some("/tmp/profile"))], || {
            let home = get_home_dir().expect("home dir");
            assert_eq!(home, "/tmp/profile");
        });
    }

    #[test]
    fn default_data_dir_uses_home_config() {
        with_env(&[("HOME", Some("/tmp/home")), (DATA_DIR_ENV, None)], || {
            let dir = default_data_dir().unwrap();
            assert_eq!(dir, PathBuf::from("/tmp/home/.config/warden"));
        });
    }

    #[test]
    fn default_data_dir_honours_override() {
        with_env(
            &[("HOME", Some("/tmp/home")), (DATA_DIR_ENV, Some("/srv/warden"))],
            || {
                let dir = default_data_dir().unwrap();
                assert_eq!(dir, PathBuf::from("/srv/warden"));
            },
        );
    }

    #[test]
    fn layout_paths_are_under_data_dir() {
        let root = Path::new("/data");
        assert_eq!(approvals_dir(root), PathBuf::from("/data/approvals"));
        assert_eq!(audit_log_path(root), PathBuf::from("/data/audit.jsonl"));
        assert_eq!(config_path(root), PathBuf::from("/data/config.json"));
    }
}
