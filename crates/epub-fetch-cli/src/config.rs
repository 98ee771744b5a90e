//! Locating the host application's executable.

use std::path::{Path, PathBuf};

/// Environment variable naming the host executable.
pub const HOST_ENV: &str = "EPUB_FETCH_HOST";

/// Executable names searched for on `PATH`.
pub const HOST_NAMES: [&str; 2] = ["thorium", "thorium.exe"];

/// Resolve the host executable: explicit path, then `EPUB_FETCH_HOST`, then
/// well-known install locations, then `PATH`.
pub fn locate_host(explicit: Option<&Path>) -> Option<PathBuf> {
    locate_host_with(
        explicit,
        std::env::var_os(HOST_ENV).map(PathBuf::from),
        &install_locations(),
        |name| which::which(name).ok(),
    )
}

/// [`locate_host`] with every source injected.
pub fn locate_host_with<F>(
    explicit: Option<&Path>,
    from_env: Option<PathBuf>,
    candidates: &[PathBuf],
    search_path: F,
) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = from_env.filter(|p| !p.as_os_str().is_empty()) {
        return Some(path);
    }
    if let Some(found) = candidates.iter().find(|p| p.is_file()) {
        tracing::info!(path = %found.display(), "found host application");
        return Some(found.clone());
    }
    HOST_NAMES.iter().find_map(|name| search_path(name))
}

/// Platform install locations, most common first.
#[cfg(windows)]
pub fn install_locations() -> Vec<PathBuf> {
    let env_dir = |key: &str, fallback: &str| {
        std::env::var_os(key)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(fallback))
    };
    let mut paths = vec![
        env_dir("ProgramFiles", r"C:\Program Files").join("Thorium Reader").join("thorium.exe"),
        env_dir("ProgramFiles(x86)", r"C:\Program Files (x86)")
            .join("Thorium Reader")
            .join("thorium.exe"),
    ];
    if let Some(local) = dirs::data_local_dir() {
        paths.push(local.join("Programs").join("Thorium").join("thorium.exe"));
    }
    paths
}

/// Platform install locations, most common first.
#[cfg(not(windows))]
pub fn install_locations() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("/usr/bin/thorium"),
        PathBuf::from("/usr/local/bin/thorium"),
    ];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".local").join("bin").join("thorium"));
    }
    paths
}
