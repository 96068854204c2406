//! Host platform detection.
//!
//! Names follow the release asset conventions used by the toke server
//! builds: `darwin`/`linux`/`windows` and `arm64`/`amd64`.

use std::fmt;

/// Operating system and CPU architecture of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: &'static str,
    pub arch: &'static str,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        Self {
            os: os_name(std::env::consts::OS),
            arch: arch_name(std::env::consts::ARCH),
        }
    }

    pub const fn new(os: &'static str, arch: &'static str) -> Self {
        Self { os, arch }
    }

    pub fn is_apple_silicon(&self) -> bool {
        self.os == "darwin" && self.arch == "arm64"
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// Suffix for executables on this platform.
    pub fn exe_suffix(&self) -> &'static str {
        if self.is_windows() { ".exe" } else { "" }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

fn os_name(os: &'static str) -> &'static str {
    match os {
        "macos" => "darwin",
        _ => os,
    }
}

fn arch_name(arch: &'static str) -> &'static str {
    match arch {
        "aarch64" => "arm64",
        "x86_64" => "amd64",
        _ => arch,
    }
}

/// Whether the current host is an Apple Silicon Mac.
pub fn is_apple_silicon() -> bool {
    Platform::current().is_apple_silicon()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_rust_names_to_release_names() {
        assert_eq!(os_name("macos"), "darwin");
        assert_eq!(os_name("linux"), "linux");
        assert_eq!(arch_name("aarch64"), "arm64");
        assert_eq!(arch_name("x86_64"), "amd64");
    }

    #[test]
    fn apple_silicon_requires_darwin_and_arm64() {
        assert!(Platform::new("darwin", "arm64").is_apple_silicon());
        assert!(!Platform::new("darwin", "amd64").is_apple_silicon());
        assert!(!Platform::new("linux", "arm64").is_apple_silicon());
    }

    #[test]
    fn display_joins_os_and_arch() {
        assert_eq!(Platform::new("linux", "amd64").to_string(), "linux-amd64");
        assert_eq!(Platform::new("windows", "amd64").exe_suffix(), ".exe");
    }
}
