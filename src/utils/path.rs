//! Data directory layout

use std::env;
use std::path::{Path, PathBuf};

/// Root for config, reference images and logs. The executable directory when
/// a `config/` folder sits next to it, otherwise the current directory.
pub fn get_data_dir() -> PathBuf {
    if let Some(dir) = env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        if dir.join("config").exists() {
            return dir;
        }
    }

    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// `<data_dir>/debug/log`
pub fn debug_log_dir() -> PathBuf {
    get_data_dir().join("debug").join("log")
}

/// `<data_dir>/logs`, home of the cycle journal
pub fn journal_dir() -> PathBuf {
    get_data_dir().join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_data_dir() {
        let dir = get_data_dir();
        assert!(dir.exists() || dir == PathBuf::from("."));
    }

    #[test]
    fn test_subdirectories_live_under_data_dir() {
        let root = get_data_dir();
        assert!(debug_log_dir().starts_with(&root));
        assert!(journal_dir().ends_with("logs"));
    }
}
