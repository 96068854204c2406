//! Host capacity probe for model recommendations.

use std::path::Path;

use sysinfo::{Disks, System};
use toke_core::{SystemInfo, is_apple_silicon};
use tracing::debug;

/// Memory, CPU and free space on the volume holding `data_root`.
pub fn probe_system(data_root: &Path) -> SystemInfo {
    let mut system = System::new();
    system.refresh_memory();

    let disks = Disks::new_with_refreshed_list();
    let free_disk = free_space_for(
        data_root,
        disks
            .list()
            .iter()
            .map(|d| (d.mount_point(), d.available_space())),
    );

    let info = SystemInfo {
        total_memory: system.total_memory(),
        available_memory: system.available_memory(),
        cpu_cores: num_cpus::get(),
        free_disk,
        is_apple_silicon: is_apple_silicon(),
    };
    debug!(?info, "Probed system");
    info
}

/// Available bytes on the mount with the longest prefix of `path`.
///
/// The data root may not exist yet, so the nearest existing ancestor is
/// matched instead.
fn free_space_for<'a>(path: &Path, mounts: impl Iterator<Item = (&'a Path, u64)>) -> u64 {
    let resolved = path
        .ancestors()
        .find(|p| p.exists())
        .and_then(|p| p.canonicalize().ok())
        .unwrap_or_else(|| path.to_path_buf());

    mounts
        .filter(|(mount, _)| resolved.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map_or(0, |(_, free)| free)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_mount_prefix_wins() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let mounts = [
            (Path::new("/"), 10),
            (root.as_path(), 42),
            (Path::new("/definitely/not/here"), 99),
        ];
        let missing_child = root.join("toke").join("data");
        assert_eq!(free_space_for(&missing_child, mounts.into_iter()), 42);
    }

    #[test]
    fn no_matching_mount_reports_zero() {
        let mounts = [(Path::new("/definitely/not/here"), 99)];
        assert_eq!(free_space_for(Path::new("/"), mounts.into_iter()), 0);
    }

    #[test]
    fn probe_reports_memory_and_cores() {
        let temp = tempfile::tempdir().unwrap();
        let info = probe_system(temp.path());
        assert!(info.total_memory > 0);
        assert!(info.cpu_cores >= 1);
    }
}
