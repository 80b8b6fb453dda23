//! Path splitting, component validation, and resolution (C9).
//!
//! Grounded on `original_source/src/fat_path.c` (`fat_validate_component`,
//! `fat_split_path`, `fat_find_in_directory`, `fat_resolve_path`); the
//! teacher has no equivalent module. The source's `..` handling special-cases
//! the directory-is-root case and otherwise falls through to a literal
//! `fat_find_entry(volume, dir_cluster, "..", ...)` lookup rather than
//! tracking parent clusters explicitly (left as a `TODO` there); this module
//! keeps that same approach; directory-creation in `ops` always writes a
//! literal `..` entry, so the lookup always succeeds for directories that
//! went through `ops::mkdir`.

use alloc::vec::Vec;

use crate::dir::{self, DirLocation};
use crate::error::Error;
use crate::volume::Volume;

const MAX_COMPONENT_LEN: usize = 255;

fn is_valid_component(component: &str) -> bool {
    if component.is_empty() || component.len() > MAX_COMPONENT_LEN {
        return false;
    }
    if component == "." || component == ".." {
        return true;
    }
    !component
        .chars()
        .any(|c| (c as u32) < 0x20 || "<>:\"|?*".contains(c))
}

/// Split `/a/b/c` into `["a", "b", "c"]`, validating each component.
/// Leading/trailing/duplicate slashes collapse away.
pub fn split(path: &str) -> Result<Vec<&str>, Error> {
    let mut components = Vec::new();
    for part in path.split('/') {
        if part.is_empty() {
            continue;
        }
        if !is_valid_component(part) {
            return Err(Error::BadParam);
        }
        components.push(part);
    }
    Ok(components)
}

/// A resolved directory location plus the cluster that names it (0 for the
/// FAT12/16 fixed root), used by callers that need to write into a parent
/// directory after resolving it.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedDir {
    pub location: DirLocation,
    pub cluster: u32,
}

fn find_in_directory(vol: &Volume, dir: ResolvedDir, component: &str) -> Result<ResolvedDir, Error> {
    if component == "." {
        return Ok(dir);
    }
    if component == ".." {
        if dir.cluster == vol.bpb.root_dir_cluster() {
            return Ok(dir);
        }
        let entry = dir::find(vol, dir.location, "..")?;
        let cluster = entry.short.first_cluster();
        if cluster == 0 {
            return Ok(root(vol));
        }
        return Ok(ResolvedDir {
            location: DirLocation::Cluster(cluster),
            cluster,
        });
    }

    let entry = dir::find(vol, dir.location, component)?;
    if !entry.short.is_dir() {
        return Err(Error::NotADirectory);
    }
    let cluster = entry.short.first_cluster();
    Ok(ResolvedDir {
        location: DirLocation::Cluster(cluster),
        cluster,
    })
}

pub fn root(vol: &Volume) -> ResolvedDir {
    let cluster = vol.bpb.root_dir_cluster();
    let location = if cluster == 0 {
        DirLocation::FixedRoot
    } else {
        DirLocation::Cluster(cluster)
    };
    ResolvedDir { location, cluster }
}

/// Resolve every component of `path` except the last, returning the parent
/// directory and the final component name. Every non-terminal component
/// must itself be a directory.
pub fn resolve_parent<'a>(vol: &Volume, path: &'a str) -> Result<(ResolvedDir, &'a str), Error> {
    let components = split(path)?;
    let (last, rest) = components.split_last().ok_or(Error::BadParam)?;
    let mut current = root(vol);
    for component in rest {
        current = find_in_directory(vol, current, component)?;
    }
    Ok((current, last))
}

/// Resolve the full path to a directory entry.
pub fn resolve(vol: &Volume, path: &str) -> Result<ResolvedDir, Error> {
    let components = split(path)?;
    let mut current = root(vol);
    if components.is_empty() {
        return Ok(current);
    }
    for component in &components {
        current = find_in_directory(vol, current, component)?;
    }
    Ok(current)
}

/// Resolve `path` to the directory entry it names and the parent directory
/// that contains it (fails if `path` is the root, which has no entry of its
/// own).
pub fn resolve_entry(vol: &Volume, path: &str) -> Result<(ResolvedDir, dir::DirEntry), Error> {
    let (parent, name) = resolve_parent(vol, path)?;
    let entry = dir::find(vol, parent.location, name)?;
    Ok((parent, entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount_fat32() -> Volume {
        let device = crate::testutil::build_fat32(70_000, 1, 600);
        Volume::mount(device).unwrap()
    }

    #[test]
    fn split_drops_empty_components_and_validates_the_rest() {
        assert_eq!(split("/a/b/c").unwrap(), ["a", "b", "c"]);
        assert_eq!(split("a//b/").unwrap(), ["a", "b"]);
        assert_eq!(split("").unwrap(), Vec::<&str>::new());
        assert_eq!(split("/").unwrap(), Vec::<&str>::new());
        assert!(split("bad*name").is_err());
        assert!(split("bad<name>").is_err());
        assert_eq!(split("./a/..").unwrap(), [".", "a", ".."]);
    }

    #[test]
    fn empty_and_root_path_resolve_to_the_volume_root() {
        let vol = mount_fat32();
        let r1 = resolve(&vol, "").unwrap();
        let r2 = resolve(&vol, "/").unwrap();
        assert_eq!(r1.cluster, vol.bpb.root_dir_cluster());
        assert_eq!(r2.cluster, vol.bpb.root_dir_cluster());
    }

    #[test]
    fn resolve_walks_nested_directories_and_dot_dot_returns_to_parent() {
        let vol = mount_fat32();
        vol.mkdir("/a").unwrap();
        vol.mkdir("/a/b").unwrap();

        let resolved = resolve(&vol, "/a/b").unwrap();
        let back_to_a = find_in_directory(&vol, resolved, "..").unwrap();
        let a_direct = resolve(&vol, "/a").unwrap();
        assert_eq!(back_to_a.cluster, a_direct.cluster);

        let same = find_in_directory(&vol, resolved, ".").unwrap();
        assert_eq!(same.cluster, resolved.cluster);
    }

    #[test]
    fn dot_dot_from_a_root_child_returns_to_the_root() {
        let vol = mount_fat32();
        vol.mkdir("/a").unwrap();
        let a = resolve(&vol, "/a").unwrap();
        let parent = find_in_directory(&vol, a, "..").unwrap();
        assert_eq!(parent.cluster, vol.bpb.root_dir_cluster());
    }

    #[test]
    fn resolve_through_a_non_directory_component_fails() {
        let vol = mount_fat32();
        vol.open("/file.txt", crate::file::flags::WRONLY | crate::file::flags::CREATE)
            .unwrap();
        assert_eq!(resolve(&vol, "/file.txt/x"), Err(Error::NotADirectory));
    }
}
