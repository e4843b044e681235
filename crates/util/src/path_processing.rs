use std::path::{Path, PathBuf};

use dirs_next::home_dir;

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}

/// Locates a dedicated implementation for exactly `service_name` inside
/// `services_dir`, if one was installed there.
pub fn specialized_executable(services_dir: &Path, service_name: &str) -> Option<PathBuf> {
    if service_name.is_empty() || service_name.contains(['/', '\\']) || service_name.starts_with('.') {
        return None;
    }
    let candidate = services_dir.join(service_name);
    candidate.is_file().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_home_prefix() {
        temp_env::with_var("HOME", Some("/home/tester"), || {
            assert_eq!(expand_tilde("~/services"), PathBuf::from("/home/tester/services"));
        });
        assert_eq!(expand_tilde("/opt/services"), PathBuf::from("/opt/services"));
    }

    #[test]
    fn rejects_path_like_service_names() {
        let dir = std::env::temp_dir();
        assert!(specialized_executable(&dir, "../etc").is_none());
        assert!(specialized_executable(&dir, "").is_none());
    }
}
