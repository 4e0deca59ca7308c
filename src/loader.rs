//! Discovery and lifetime of the `fk*` modules shipped next to the host executable.

use std::ffi::c_void;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{PatchError, Result};
use crate::notify;
use crate::sys;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleHandle(pub *mut c_void);

// Handles are plain OS tokens; the entry point parks the set in a static.
unsafe impl Send for ModuleHandle {}

pub trait ModuleApi {
    fn load(&self, path: &Path) -> io::Result<ModuleHandle>;
    fn free(&self, handle: ModuleHandle);
}

/// Loads modules through the operating system loader.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemModules;

impl ModuleApi for SystemModules {
    fn load(&self, path: &Path) -> io::Result<ModuleHandle> {
        sys::load_library(path).map(ModuleHandle)
    }

    fn free(&self, handle: ModuleHandle) {
        if let Err(e) = unsafe { sys::free_library(handle.0) } {
            warn!("Failed to release module {:?}: {}", handle.0, e);
        }
    }
}

/// File name filter `<prefix>*.<extension>`, compared without regard to ASCII case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModulePattern {
    pub prefix: String,
    pub extension: String,
}

impl ModulePattern {
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), extension: extension.into() }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        let Some((stem, extension)) = file_name.rsplit_once('.') else {
            return false;
        };
        stem.len() >= self.prefix.len()
            && stem.is_char_boundary(self.prefix.len())
            && stem[..self.prefix.len()].eq_ignore_ascii_case(&self.prefix)
            && extension.eq_ignore_ascii_case(&self.extension)
    }
}

impl Default for ModulePattern {
    fn default() -> Self {
        #[cfg(windows)]
        let extension = "dll";
        #[cfg(not(windows))]
        let extension = "so";
        Self::new("fk", extension)
    }
}

/// Lists the files in `dir` matching `pattern`, sorted by name. Subdirectories are skipped.
///
/// Only an unreadable `dir` is an error; entries that cannot be inspected are skipped.
pub fn discover(dir: &Path, pattern: &ModulePattern) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        if is_directory(&entry) {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if pattern.matches(&name) {
            found.push(entry.path());
        }
    }

    found.sort();
    Ok(found)
}

fn is_directory(entry: &fs::DirEntry) -> bool {
    match entry.file_type() {
        Ok(file_type) => file_type.is_dir(),
        Err(e) => {
            warn!("Could not inspect {}: {}", entry.path().display(), e);
            false
        }
    }
}

/// The modules loaded at process attach.
///
/// Created by [`ModuleSet::attach`]; every handle is released by [`ModuleSet::detach`] or
/// when the set is dropped.
pub struct ModuleSet<A: ModuleApi = SystemModules> {
    api: A,
    handles: Vec<ModuleHandle>,
    failures: Vec<PatchError>,
}

impl ModuleSet<SystemModules> {
    /// Loads every default-pattern module in the directory of the running executable.
    pub fn attach_beside_executable() -> Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe.parent().unwrap_or_else(|| Path::new("."));
        Self::attach(SystemModules, dir, &ModulePattern::default())
    }
}

impl<A: ModuleApi> ModuleSet<A> {
    /// Loads every module in `dir` matching `pattern`.
    ///
    /// A module that fails to load is reported and skipped; only an unreadable directory
    /// fails the whole call.
    pub fn attach(api: A, dir: &Path, pattern: &ModulePattern) -> Result<Self> {
        let mut set = Self { api, handles: Vec::new(), failures: Vec::new() };

        for path in discover(dir, pattern)? {
            match set.api.load(&path) {
                Ok(handle) => {
                    info!("Loaded module {}", path.display());
                    set.handles.push(handle);
                }
                Err(source) => {
                    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                    notify::warning(&format!("Could not load module {}.", name));
                    debug!("{}: {}", path.display(), source);
                    set.failures.push(PatchError::ModuleLoadFailed { path, source });
                }
            }
        }

        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn handles(&self) -> &[ModuleHandle] {
        &self.handles
    }

    /// Modules that were found but could not be loaded.
    pub fn failures(&self) -> &[PatchError] {
        &self.failures
    }

    /// Releases every loaded module.
    pub fn detach(mut self) {
        self.release();
    }

    fn release(&mut self) {
        for handle in self.handles.drain(..) {
            self.api.free(handle);
        }
    }
}

impl<A: ModuleApi> Drop for ModuleSet<A> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Loads any file whose name does not contain "bad".
    #[derive(Default, Clone)]
    struct MockModules {
        loaded: Rc<RefCell<Vec<PathBuf>>>,
        freed: Rc<RefCell<Vec<ModuleHandle>>>,
    }

    impl ModuleApi for MockModules {
        fn load(&self, path: &Path) -> io::Result<ModuleHandle> {
            let name = path.file_name().unwrap().to_string_lossy();
            if name.contains("bad") {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "not a module"));
            }
            let mut loaded = self.loaded.borrow_mut();
            loaded.push(path.to_path_buf());
            Ok(ModuleHandle(loaded.len() as *mut c_void))
        }

        fn free(&self, handle: ModuleHandle) {
            self.freed.borrow_mut().push(handle);
        }
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    fn pattern() -> ModulePattern {
        ModulePattern::new("fk", "dll")
    }

    #[test]
    fn test_pattern_matching() {
        let pattern = pattern();
        assert!(pattern.matches("fkNetcode.dll"));
        assert!(pattern.matches("FKNETCODE.DLL"));
        assert!(pattern.matches("fk.dll"));
        assert!(!pattern.matches("fkNetcode.ini"));
        assert!(!pattern.matches("frontend.dll"));
        assert!(!pattern.matches("fkNetcode"));
        assert!(!pattern.matches("f.dll"));
    }

    #[test]
    fn test_discover_skips_directories_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "fkb.dll");
        touch(dir.path(), "fka.dll");
        touch(dir.path(), "other.dll");
        touch(dir.path(), "fkNetcode.ini");
        fs::create_dir(dir.path().join("fkdir.dll")).unwrap();
        touch(&dir.path().join("fkdir.dll"), "fknested.dll");

        let found = discover(dir.path(), &pattern()).unwrap();
        let names: Vec<_> = found.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["fka.dll", "fkb.dll"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_discover_keeps_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "fka.dll");
        let odd = OsStr::from_bytes(b"fk\xFFodd.dll");
        fs::write(dir.path().join(odd), b"").unwrap();

        let found = discover(dir.path(), &pattern()).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&dir.path().join(odd)));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_link_does_not_abort_discovery() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "fka.dll");
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("fklink.dll")).unwrap();
        touch(dir.path(), "fkz.dll");

        let found = discover(dir.path(), &pattern()).unwrap();
        let names: Vec<_> = found.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["fka.dll", "fklink.dll", "fkz.dll"]);
    }

    #[test]
    fn test_partial_failures_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["fkone.dll", "fkbad1.dll", "fktwo.dll", "fkbad2.dll", "fkthree.dll"] {
            touch(dir.path(), name);
        }

        let api = MockModules::default();
        let set = ModuleSet::attach(api.clone(), dir.path(), &pattern()).unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(set.failures().len(), 2);
        assert!(set
            .failures()
            .iter()
            .all(|e| matches!(e, PatchError::ModuleLoadFailed { path, .. } if path.to_string_lossy().contains("bad"))));
        assert_eq!(api.loaded.borrow().len(), 3);
    }

    #[test]
    fn test_detach_releases_everything() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "fka.dll");
        touch(dir.path(), "fkb.dll");
        touch(dir.path(), "fkbad.dll");

        let api = MockModules::default();
        let set = ModuleSet::attach(api.clone(), dir.path(), &pattern()).unwrap();
        let handles = set.handles().to_vec();
        set.detach();

        assert_eq!(*api.freed.borrow(), handles);
    }

    #[test]
    fn test_drop_releases_everything() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "fka.dll");

        let api = MockModules::default();
        {
            let set = ModuleSet::attach(api.clone(), dir.path(), &pattern()).unwrap();
            assert_eq!(set.len(), 1);
        }
        assert_eq!(api.freed.borrow().len(), 1);
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let api = MockModules::default();
        let set = ModuleSet::attach(api.clone(), dir.path(), &pattern()).unwrap();
        assert!(set.is_empty());
        assert!(set.failures().is_empty());
        set.detach();
        assert!(api.freed.borrow().is_empty());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let err = ModuleSet::attach(MockModules::default(), &missing, &pattern()).err().unwrap();
        assert!(matches!(err, PatchError::Io(_)));
    }

    #[test]
    fn test_system_loader_reports_invalid_module() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = ModulePattern::default();
        touch(dir.path(), &format!("fkbroken.{}", pattern.extension));

        let set = ModuleSet::attach(SystemModules, dir.path(), &pattern).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.failures().len(), 1);
    }
}
