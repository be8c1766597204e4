//! Utility Functions
//!
//! Common utilities used throughout the application.

mod logging;

pub use logging::*;

use std::path::{Path, PathBuf};

/// Get the application data directory
pub fn get_app_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("streamdecode")
}

/// Ensure a directory exists
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Human-readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(1920 * 1080 * 3), "5.9 MiB");
    }

    #[test]
    fn test_app_data_dir_is_namespaced() {
        assert!(get_app_data_dir().ends_with("streamdecode"));
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let root = std::env::temp_dir().join(format!("streamdecode-{}", uuid::Uuid::new_v4()));
        let nested = root.join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        // already present is fine
        ensure_dir(&nested).unwrap();
        let _ = std::fs::remove_dir_all(root);
    }
}
