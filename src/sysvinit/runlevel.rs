//! Runlevel symlink management
//!
//! A service is enabled when every existing `rc<N>.d` directory holds its
//! link: `S20<name>` in the multi-user runlevels, `K80<name>` in the
//! halt/single-user/reboot runlevels. Missing rc directories are skipped.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::layout::Layout;
use crate::units::ServiceName;

/// Runlevels in which an enabled service is started
pub const GOOD_RUNLEVELS: [u8; 4] = [2, 3, 4, 5];
/// Runlevels in which an enabled service is stopped
pub const BAD_RUNLEVELS: [u8; 3] = [0, 1, 6];

pub const START_PRIORITY: u8 = 20;
pub const KILL_PRIORITY: u8 = 80;

#[derive(Debug, thiserror::Error)]
pub enum RunlevelError {
    #[error("failed to link {}: {source}", path.display())]
    Link { path: PathBuf, source: io::Error },

    #[error("failed to remove {}: {source}", path.display())]
    Unlink { path: PathBuf, source: io::Error },

    #[error("{} exists and is not a symlink", .0.display())]
    NotALink(PathBuf),
}

/// Filesystem object identity: device and inode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    pub dev: u64,
    pub ino: u64,
}

impl FileId {
    /// Identity of whatever `path` finally resolves to
    pub fn of(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        Ok(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }
}

/// Whether two paths resolve to the same file, following any symlink chain
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (FileId::of(a), FileId::of(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// One runlevel link a service should have
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunlevelLink {
    pub runlevel: u8,
    pub path: PathBuf,
}

fn link_name(runlevel: u8, name: &ServiceName) -> String {
    if GOOD_RUNLEVELS.contains(&runlevel) {
        format!("S{:02}{}", START_PRIORITY, name)
    } else {
        format!("K{:02}{}", KILL_PRIORITY, name)
    }
}

/// Relative target used for new links, as `update-rc.d` writes them
fn link_target(name: &ServiceName) -> PathBuf {
    Path::new("../init.d").join(name.as_str())
}

/// Links for the rc directories that exist under the root
pub fn expected_links(layout: &Layout, name: &ServiceName) -> Vec<RunlevelLink> {
    let mut levels: Vec<u8> = GOOD_RUNLEVELS.iter().chain(BAD_RUNLEVELS.iter()).copied().collect();
    levels.sort_unstable();
    levels
        .into_iter()
        .filter_map(|runlevel| {
            let dir = layout.rc_dir(runlevel);
            if dir.is_dir() {
                Some(RunlevelLink {
                    runlevel,
                    path: dir.join(link_name(runlevel, name)),
                })
            } else {
                log::debug!("{} does not exist, skipping runlevel {}", dir.display(), runlevel);
                None
            }
        })
        .collect()
}

/// Create the runlevel links; returns the links actually created
pub fn enable(layout: &Layout, name: &ServiceName) -> Result<Vec<PathBuf>, RunlevelError> {
    let script = layout.init_script(name);
    let mut created = Vec::new();

    for link in expected_links(layout, name) {
        let path = link.path;
        if path.is_symlink() {
            if same_file(&path, &script) {
                log::debug!("{} already enabled in runlevel {}", name, link.runlevel);
                continue;
            }
            fs::remove_file(&path).map_err(|source| RunlevelError::Unlink {
                path: path.clone(),
                source,
            })?;
        } else if path.exists() {
            return Err(RunlevelError::NotALink(path));
        }

        std::os::unix::fs::symlink(link_target(name), &path).map_err(|source| {
            RunlevelError::Link {
                path: path.clone(),
                source,
            }
        })?;
        log::info!("created {} -> {}", path.display(), link_target(name).display());
        created.push(path);
    }

    Ok(created)
}

/// Remove the runlevel links; returns the links actually removed
pub fn disable(layout: &Layout, name: &ServiceName) -> Result<Vec<PathBuf>, RunlevelError> {
    let mut removed = Vec::new();

    for link in expected_links(layout, name) {
        let path = link.path;
        if !path.is_symlink() {
            continue;
        }
        fs::remove_file(&path).map_err(|source| RunlevelError::Unlink {
            path: path.clone(),
            source,
        })?;
        log::info!("removed {}", path.display());
        removed.push(path);
    }

    Ok(removed)
}

/// True when every existing rc directory links to the service's init script
///
/// With no rc directories at all there is nothing proving the service is
/// enabled, so the answer is false.
pub fn is_enabled(layout: &Layout, name: &ServiceName) -> bool {
    let links = expected_links(layout, name);
    if links.is_empty() {
        return false;
    }
    let script = layout.init_script(name);
    links
        .iter()
        .all(|link| link.path.is_symlink() && same_file(&link.path, &script))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(runlevels: &[u8]) -> (tempfile::TempDir, Layout, ServiceName) {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fs::create_dir_all(layout.init_dir()).unwrap();
        let name = ServiceName::parse("foo").unwrap();
        fs::write(layout.init_script(&name), "#!/bin/sh\n").unwrap();
        for n in runlevels {
            fs::create_dir_all(layout.rc_dir(*n)).unwrap();
        }
        (dir, layout, name)
    }

    #[test]
    fn test_link_names() {
        let name = ServiceName::parse("foo.service").unwrap();
        assert_eq!(link_name(3, &name), "S20foo");
        assert_eq!(link_name(6, &name), "K80foo");
        assert_eq!(link_name(0, &name), "K80foo");
    }

    #[test]
    fn test_enable_creates_links_in_existing_dirs() {
        let (_dir, layout, name) = fixture(&[0, 1, 2, 3, 4, 5, 6]);
        let created = enable(&layout, &name).unwrap();
        assert_eq!(created.len(), 7);
        assert!(layout.rc_dir(2).join("S20foo").is_symlink());
        assert!(layout.rc_dir(6).join("K80foo").is_symlink());
        assert!(!layout.rc_dir(2).join("K80foo").exists());
        assert_eq!(
            fs::read_link(layout.rc_dir(3).join("S20foo")).unwrap(),
            PathBuf::from("../init.d/foo")
        );
        assert!(is_enabled(&layout, &name));
    }

    #[test]
    fn test_enable_disable_over_runlevel_subsets() {
        let all = [0u8, 1, 2, 3, 4, 5, 6];
        for mask in 1u32..(1 << all.len()) {
            let present: Vec<u8> = all
                .iter()
                .copied()
                .filter(|n| mask & (1 << n) != 0)
                .collect();
            let (_dir, layout, name) = fixture(&present);

            assert!(!is_enabled(&layout, &name), "{:?}", present);
            enable(&layout, &name).unwrap();
            assert!(is_enabled(&layout, &name), "{:?}", present);
            enable(&layout, &name).unwrap();
            assert!(is_enabled(&layout, &name), "{:?}", present);
            disable(&layout, &name).unwrap();
            assert!(!is_enabled(&layout, &name), "{:?}", present);
            disable(&layout, &name).unwrap();
            assert!(!is_enabled(&layout, &name), "{:?}", present);
        }
    }

    #[test]
    fn test_no_rc_dirs_is_disabled() {
        let (_dir, layout, name) = fixture(&[]);
        assert!(enable(&layout, &name).unwrap().is_empty());
        assert!(!is_enabled(&layout, &name));
        assert!(disable(&layout, &name).unwrap().is_empty());
    }

    #[test]
    fn test_partial_links_are_disabled() {
        let (_dir, layout, name) = fixture(&[2, 3, 6]);
        enable(&layout, &name).unwrap();
        fs::remove_file(layout.rc_dir(6).join("K80foo")).unwrap();
        assert!(!is_enabled(&layout, &name));
    }

    #[test]
    fn test_indirect_link_is_accepted() {
        let (dir, layout, name) = fixture(&[3]);
        let hop = dir.path().join("hop");
        std::os::unix::fs::symlink(layout.init_script(&name), &hop).unwrap();
        std::os::unix::fs::symlink(&hop, layout.rc_dir(3).join("S20foo")).unwrap();
        assert!(is_enabled(&layout, &name));
    }

    #[test]
    fn test_link_to_other_file_is_not_enabled() {
        let (dir, layout, name) = fixture(&[3]);
        let other = dir.path().join("other");
        fs::write(&other, "").unwrap();
        std::os::unix::fs::symlink(&other, layout.rc_dir(3).join("S20foo")).unwrap();
        assert!(!is_enabled(&layout, &name));

        // enable repoints it
        enable(&layout, &name).unwrap();
        assert!(is_enabled(&layout, &name));
    }

    #[test]
    fn test_regular_file_in_the_way() {
        let (_dir, layout, name) = fixture(&[3]);
        fs::write(layout.rc_dir(3).join("S20foo"), "").unwrap();
        assert!(matches!(enable(&layout, &name), Err(RunlevelError::NotALink(_))));
        // disable leaves non-links alone
        assert!(disable(&layout, &name).unwrap().is_empty());
    }

    #[test]
    fn test_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "").unwrap();
        fs::write(&b, "").unwrap();
        fs::hard_link(&a, dir.path().join("a2")).unwrap();
        assert!(same_file(&a, &dir.path().join("a2")));
        assert!(!same_file(&a, &b));
        assert!(!same_file(&a, &dir.path().join("missing")));
    }
}
