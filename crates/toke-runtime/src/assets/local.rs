//! Local-build detection.
//!
//! Developers and packagers can drop a build of any dependency in a few
//! well-known places; when one exists the release copy is never fetched.

use std::path::PathBuf;

use toke_core::{Env, OsEnv};

use super::AssetConfig;
use super::manifest::Dependency;

/// Path checked first for `name`, relative to the search root.
pub(super) fn configured_local_path(config: &AssetConfig, name: &str) -> Option<PathBuf> {
    let platform = config.platform;
    let exe = platform.exe_suffix();
    let relative = match name {
        "llama" => format!("apps/backend/llama/llama-server-{platform}{exe}"),
        "mlx" => "apps/backend/mlx/mlx-server".to_string(),
        "diffusion" => "apps/backend/diffusion/diffusion_server.py".to_string(),
        "ngrok" => format!("apps/ngrok/node_modules/.bin/ngrok{exe}"),
        _ => return None,
    };
    Some(config.search_root.join(relative))
}

/// Every candidate location for `dep`, in the order they are checked.
pub(super) fn local_build_candidates(config: &AssetConfig, dep: &Dependency) -> Vec<PathBuf> {
    let platform = config.platform;
    let root = &config.search_root;
    let mut candidates: Vec<PathBuf> = configured_local_path(config, &dep.name)
        .into_iter()
        .collect();

    match dep.name.as_str() {
        "llama" => {
            candidates.extend([
                root.join("apps/backend/llama/llama-server"),
                root.join(format!("apps/backend/llama/llama-server-{platform}")),
                root.join("build-llama-server/llama-server"),
                root.join(format!("build-llama-server/llama-server-{platform}")),
            ]);
            if platform.is_windows() {
                candidates.extend([
                    root.join("apps/backend/llama/llama-server.exe"),
                    root.join(format!("apps/backend/llama/llama-server-{platform}.exe")),
                ]);
            }
        }
        "ngrok" => {
            candidates.extend([root.join("apps/ngrok/ngrok"), root.join("ngrok")]);
            if platform.is_windows() {
                candidates.extend([root.join("apps/ngrok/ngrok.exe"), root.join("ngrok.exe")]);
            }
        }
        _ => {}
    }

    if let Some(home) = &config.home_dir {
        candidates.push(
            home.join(".toke")
                .join("backends")
                .join(&dep.name)
                .join(&dep.executable),
        );
    }

    if config.include_system_paths {
        candidates.push(PathBuf::from("/usr/local/bin").join(&dep.executable));
        candidates.push(
            PathBuf::from("/opt/toke")
                .join(&dep.name)
                .join(&dep.executable),
        );
        if platform.is_windows() {
            for (var, sub) in [("PROGRAMFILES", ""), ("LOCALAPPDATA", "backends")] {
                if let Some(base) = OsEnv.get(var) {
                    let mut path = PathBuf::from(base).join("toke");
                    if !sub.is_empty() {
                        path.push(sub);
                    }
                    candidates.push(path.join(&dep.name).join(&dep.executable));
                }
            }
        }
    }

    // The install location itself is not a local build
    let installed = config.base_dir.join(&dep.name).join(&dep.executable);
    candidates.retain(|c| *c != installed);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use toke_core::Platform;

    fn config(root: &std::path::Path, platform: Platform) -> AssetConfig {
        AssetConfig::new(root.join("backends"))
            .with_platform(platform)
            .with_search_root(root)
            .with_home_dir(None)
            .with_system_paths(false)
    }

    fn dep(name: &str, executable: &str) -> Dependency {
        Dependency {
            name: name.to_string(),
            version: "v1".to_string(),
            url: String::new(),
            size: 0,
            executable: executable.to_string(),
            local_path: None,
            required: true,
            platform: String::new(),
        }
    }

    #[test]
    fn llama_candidates_follow_release_naming() {
        let root = std::path::Path::new("/work");
        let cfg = config(root, Platform::new("linux", "amd64"));
        let candidates = local_build_candidates(&cfg, &dep("llama", "llama-server"));
        assert_eq!(
            candidates,
            vec![
                root.join("apps/backend/llama/llama-server-linux-amd64"),
                root.join("apps/backend/llama/llama-server"),
                root.join("apps/backend/llama/llama-server-linux-amd64"),
                root.join("build-llama-server/llama-server"),
                root.join("build-llama-server/llama-server-linux-amd64"),
            ]
        );
    }

    #[test]
    fn windows_adds_exe_variants() {
        let root = std::path::Path::new("/work");
        let cfg = config(root, Platform::new("windows", "amd64"));
        let candidates = local_build_candidates(&cfg, &dep("ngrok", "ngrok.exe"));
        assert_eq!(candidates[0], root.join("apps/ngrok/node_modules/.bin/ngrok.exe"));
        assert!(candidates.contains(&root.join("ngrok.exe")));
    }

    #[test]
    fn install_location_is_not_a_candidate() {
        let home = std::path::Path::new("/home/user");
        let cfg = AssetConfig::new(home.join(".toke/backends"))
            .with_platform(Platform::new("linux", "amd64"))
            .with_search_root("/work")
            .with_home_dir(Some(home.to_path_buf()))
            .with_system_paths(false);
        let candidates = local_build_candidates(&cfg, &dep("mlx", "mlx-server"));
        assert_eq!(candidates, vec![PathBuf::from("/work/apps/backend/mlx/mlx-server")]);
    }

    #[test]
    fn system_paths_are_optional() {
        let cfg = config(std::path::Path::new("/work"), Platform::new("linux", "amd64"))
            .with_system_paths(true);
        let candidates = local_build_candidates(&cfg, &dep("diffusion", "diffusion_server.py"));
        assert!(candidates.contains(&PathBuf::from("/usr/local/bin/diffusion_server.py")));
        assert!(candidates.contains(&PathBuf::from("/opt/toke/diffusion/diffusion_server.py")));
    }
}
