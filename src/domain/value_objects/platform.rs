//! Operating system and machine identity used by the conditional filters

/// Normalize an OS identifier
///
/// Accepts both Rust (`std::env::consts::OS`) and Node-style (`win32`,
/// `darwin`) names, case-insensitively.
pub fn normalize_platform(platform: &str) -> String {
    let platform = platform.trim().to_lowercase();
    match platform.as_str() {
        "win32" | "win64" | "windows" => "windows".to_string(),
        "darwin" | "macos" | "osx" | "mac" => "macos".to_string(),
        "linux" => "linux".to_string(),
        "freebsd" => "freebsd".to_string(),
        "openbsd" => "openbsd".to_string(),
        _ => platform,
    }
}

/// The current OS identifier, normalized
pub fn current_platform() -> String {
    normalize_platform(std::env::consts::OS)
}

/// Normalize a machine name for comparisons
pub fn normalize_host_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// The current machine name, normalized
pub fn current_host_name() -> String {
    let name = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .or_else(|_| std::fs::read_to_string("/etc/hostname").map(|s| s.trim().to_string()))
        .unwrap_or_default();

    if name.trim().is_empty() {
        "localhost".to_string()
    } else {
        normalize_host_name(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_style_names() {
        assert_eq!(normalize_platform("win32"), "windows");
        assert_eq!(normalize_platform("Darwin"), "macos");
        assert_eq!(normalize_platform(" LINUX "), "linux");
        assert_eq!(normalize_platform("sunos"), "sunos");
    }

    #[test]
    fn test_current_platform_is_normalized() {
        let current = current_platform();
        assert_eq!(current, normalize_platform(&current));
    }

    #[test]
    fn test_host_name_is_lowercase() {
        assert_eq!(normalize_host_name(" Build-Server "), "build-server");
        let host = current_host_name();
        assert!(!host.is_empty());
        assert_eq!(host, host.to_lowercase());
    }
}
