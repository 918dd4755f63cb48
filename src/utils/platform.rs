//! Platform-specific locations for Rangeloader

use std::path::PathBuf;

/// Returns the configuration directory
/// - macOS: ~/Library/Application Support/Rangeloader
/// - Windows: %APPDATA%\Rangeloader
/// - Linux: ~/.config/rangeloader
pub fn config_dir() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));

    #[cfg(target_os = "linux")]
    {
        base.join("rangeloader")
    }

    #[cfg(not(target_os = "linux"))]
    {
        base.join("Rangeloader")
    }
}

/// Default location of the JSON settings file
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path_is_json_in_config_dir() {
        let path = default_config_path();
        assert_eq!(path.file_name().unwrap(), "config.json");
        assert_eq!(path.parent().unwrap(), config_dir());
    }
}
