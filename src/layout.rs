//! Filesystem layout relative to a configurable root
//!
//! ```text
//! <root>/etc/init.d/<name>                    init script
//! <root>/etc/rc{0..6}.d/{S20,K80}<name>       runlevel links
//! <root>/usr/lib/systemd/system/<name>.service
//! <root>/var/run                              pid files
//! ```

use std::path::{Component, Path, PathBuf};

use crate::units::ServiceName;

/// Directories searched for `<name>.service`, most specific first
pub const UNIT_SEARCH_PATH: &[&str] = &[
    "etc/systemd/system",
    "run/systemd/system",
    "usr/lib/systemd/system",
];

/// PATH used for command lookup and handed to init scripts when the caller has none
pub const DEFAULT_PATH: &str = "/usr/sbin:/usr/bin:/sbin:/bin";

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("root directory {} does not exist", .0.display())]
    RootNotFound(PathBuf),

    #[error("root {} is not a directory", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("{} does not exist", .0.display())]
    MissingComponent(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Layout {
    /// Layout without checking that the root exists
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = if root.as_os_str().is_empty() {
            PathBuf::from("/")
        } else {
            root
        };
        Self { root }
    }

    /// Layout for an existing root directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, LayoutError> {
        let layout = Self::new(root);
        match std::fs::metadata(&layout.root) {
            Ok(meta) if meta.is_dir() => Ok(layout),
            Ok(_) => Err(LayoutError::RootNotDirectory(layout.root)),
            Err(_) => Err(LayoutError::RootNotFound(layout.root)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a path as seen from inside the root onto the host
    ///
    /// Absolute paths are re-anchored at the root; `..` never climbs above it.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let mut out = self.root.clone();
        for component in path.as_ref().components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::ParentDir => {
                    if out != self.root {
                        out.pop();
                    }
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        out
    }

    pub fn init_dir(&self) -> PathBuf {
        self.resolve("etc/init.d")
    }

    pub fn init_script(&self, name: &ServiceName) -> PathBuf {
        self.init_dir().join(name.as_str())
    }

    pub fn rc_dir(&self, runlevel: u8) -> PathBuf {
        self.resolve(format!("etc/rc{}.d", runlevel))
    }

    /// Directory where `sysvrun` expects packaged unit files
    pub fn unit_dir(&self) -> PathBuf {
        self.resolve("usr/lib/systemd/system")
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.resolve("var/run")
    }

    /// Default pid file for a service: `<runtime dir>/<name>.pid`
    pub fn default_pid_file(&self, name: &ServiceName) -> PathBuf {
        self.runtime_dir().join(format!("{}.pid", name))
    }

    /// Find `<name>.service` in the unit search path
    pub fn find_unit_file(&self, name: &ServiceName) -> Option<PathBuf> {
        let file_name = name.unit_file_name();
        UNIT_SEARCH_PATH
            .iter()
            .map(|dir| self.resolve(dir).join(&file_name))
            .inspect(|path| log::debug!("looking for {} in {}", name, path.display()))
            .find(|path| path.is_file())
    }

    /// Locate an executable under the root
    ///
    /// Commands containing a `/` are resolved directly; bare names are looked
    /// up in [`DEFAULT_PATH`].
    pub fn find_executable(&self, command: &str) -> Option<PathBuf> {
        if command.contains('/') {
            let path = self.resolve(command);
            return path.exists().then_some(path);
        }
        DEFAULT_PATH
            .split(':')
            .map(|dir| self.resolve(dir).join(command))
            .find(|path| path.is_file())
    }

    /// Fail with [`LayoutError::MissingComponent`] unless `path` exists
    pub fn require(&self, path: &Path) -> Result<(), LayoutError> {
        if path.exists() {
            Ok(())
        } else {
            Err(LayoutError::MissingComponent(path.to_path_buf()))
        }
    }
}
