// src/fs/mock.rs

//! In-memory [`FileSystem`] for tests, with an operation log and injectable
//! I/O faults.

use super::{EntryKind, FileMeta, FileSystem};
use anyhow::Result;
use std::collections::BTreeMap;
use std::io::{self, Cursor, ErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEntry {
    File {
        data: Vec<u8>,
        modified: SystemTime,
        mode: u32,
    },
    Dir,
    Symlink(PathBuf),
}

/// Operations recorded in the log and targetable by faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
    Read,
    Write,
    SetMetadata,
    Rename,
    CreateDir,
    RemoveFile,
    RemoveDir,
}

impl MockOp {
    pub fn is_mutation(self) -> bool {
        !matches!(self, MockOp::Read)
    }
}

#[derive(Debug)]
struct Fault {
    op: MockOp,
    prefix: PathBuf,
    kind: ErrorKind,
    remaining: u32,
}

#[derive(Debug, Default)]
struct MockState {
    entries: BTreeMap<PathBuf, MockEntry>,
    tick: u64,
    faults: Vec<Fault>,
    log: Vec<(MockOp, PathBuf)>,
}

impl MockState {
    fn next_mtime(&mut self) -> SystemTime {
        self.tick += 1;
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + self.tick)
    }

    /// Log `op` on `path` and fail it if an armed fault covers it.
    fn enter(&mut self, op: MockOp, path: &Path) -> Result<()> {
        self.log.push((op, path.to_path_buf()));
        if let Some(fault) = self
            .faults
            .iter_mut()
            .find(|f| f.op == op && f.remaining > 0 && path.starts_with(&f.prefix))
        {
            fault.remaining -= 1;
            return Err(io_err(fault.kind, format!("injected {:?} fault on {:?}", op, path)));
        }
        Ok(())
    }

    fn ensure_parents(&mut self, path: &Path) -> Result<()> {
        let ancestors: Vec<PathBuf> = path
            .ancestors()
            .skip(1)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .collect();

        for dir in ancestors.into_iter().rev() {
            match self.entries.get(&dir) {
                None => {
                    self.entries.insert(dir, MockEntry::Dir);
                }
                Some(MockEntry::Dir) => {}
                Some(_) => {
                    return Err(io_err(
                        ErrorKind::NotADirectory,
                        format!("not a directory: {:?}", dir),
                    ));
                }
            }
        }
        Ok(())
    }

    fn insert_file(&mut self, path: &Path, data: Vec<u8>, modified: SystemTime) -> Result<()> {
        self.ensure_parents(path)?;
        let mode = match self.entries.get(path) {
            Some(MockEntry::Dir) => {
                return Err(io_err(
                    ErrorKind::IsADirectory,
                    format!("is a directory: {:?}", path),
                ));
            }
            Some(MockEntry::File { mode, .. }) => *mode,
            _ => 0o644,
        };
        self.entries
            .insert(path.to_path_buf(), MockEntry::File { data, modified, mode });
        Ok(())
    }
}

fn io_err(kind: ErrorKind, msg: String) -> anyhow::Error {
    anyhow::Error::new(io::Error::new(kind, msg))
}

fn not_found(path: &Path) -> anyhow::Error {
    io_err(ErrorKind::NotFound, format!("not found: {:?}", path))
}

#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a file with a fresh, strictly increasing mtime.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mut state = self.state();
        let mtime = state.next_mtime();
        let _ = state.insert_file(path.as_ref(), content.into(), mtime);
    }

    pub fn add_file_with_mtime(
        &self,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
        modified: SystemTime,
    ) {
        let _ = self
            .state()
            .insert_file(path.as_ref(), content.into(), modified);
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut state = self.state();
        let _ = state.ensure_parents(path);
        state.entries.insert(path.to_path_buf(), MockEntry::Dir);
    }

    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl Into<PathBuf>) {
        let path = path.as_ref();
        let mut state = self.state();
        let _ = state.ensure_parents(path);
        state
            .entries
            .insert(path.to_path_buf(), MockEntry::Symlink(target.into()));
    }

    pub fn set_mode(&self, path: impl AsRef<Path>, new_mode: u32) {
        if let Some(MockEntry::File { mode, .. }) = self.state().entries.get_mut(path.as_ref()) {
            *mode = new_mode;
        }
    }

    pub fn entry(&self, path: impl AsRef<Path>) -> Option<MockEntry> {
        self.state().entries.get(path.as_ref()).cloned()
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.entry(path) {
            Some(MockEntry::File { data, .. }) => Some(data),
            _ => None,
        }
    }

    /// Every path at or below `prefix`, sorted.
    pub fn paths_under(&self, prefix: impl AsRef<Path>) -> Vec<PathBuf> {
        let prefix = prefix.as_ref();
        self.state()
            .entries
            .keys()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Make the next `times` occurrences of `op` on paths below `prefix` fail
    /// with `kind`.
    pub fn fail_times(&self, op: MockOp, prefix: impl Into<PathBuf>, kind: ErrorKind, times: u32) {
        self.state().faults.push(Fault {
            op,
            prefix: prefix.into(),
            kind,
            remaining: times,
        });
    }

    pub fn ops(&self) -> Vec<(MockOp, PathBuf)> {
        self.state().log.clone()
    }

    /// Mutating operations attempted below `prefix`.
    pub fn mutations_under(&self, prefix: impl AsRef<Path>) -> Vec<(MockOp, PathBuf)> {
        let prefix = prefix.as_ref();
        self.state()
            .log
            .iter()
            .filter(|(op, p)| op.is_mutation() && p.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn clear_ops(&self) {
        self.state().log.clear();
    }
}

impl FileSystem for MockFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let mut state = self.state();
        state.enter(MockOp::Read, path)?;
        match state.entries.get(path) {
            Some(MockEntry::File { data, .. }) => Ok(data.clone()),
            Some(_) => Err(io_err(ErrorKind::IsADirectory, format!("not a file: {:?}", path))),
            None => Err(not_found(path)),
        }
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let data = self.read(path)?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut state = self.state();
        state.enter(MockOp::Write, path)?;
        let mtime = state.next_mtime();
        state.insert_file(path, contents.to_vec(), mtime)
    }

    fn metadata(&self, path: &Path) -> Result<Option<FileMeta>> {
        let state = self.state();
        Ok(state.entries.get(path).map(|entry| match entry {
            MockEntry::File { data, modified, mode } => FileMeta {
                kind: EntryKind::File,
                len: data.len() as u64,
                modified: Some(*modified),
                mode: Some(*mode),
                inode: None,
            },
            MockEntry::Dir => FileMeta {
                kind: EntryKind::Dir,
                len: 0,
                modified: None,
                mode: None,
                inode: None,
            },
            MockEntry::Symlink(_) => FileMeta {
                kind: EntryKind::Symlink,
                len: 0,
                modified: None,
                mode: None,
                inode: None,
            },
        }))
    }

    fn set_metadata(&self, path: &Path, meta: &FileMeta) -> Result<()> {
        let mut state = self.state();
        state.enter(MockOp::SetMetadata, path)?;
        match state.entries.get_mut(path) {
            Some(MockEntry::File { modified, mode, .. }) => {
                if let Some(m) = meta.modified {
                    *modified = m;
                }
                if let Some(new_mode) = meta.mode {
                    *mode = new_mode;
                }
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(not_found(path)),
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.state();
        state.enter(MockOp::Rename, to)?;

        let Some(entry) = state.entries.get(from).cloned() else {
            return Err(not_found(from));
        };
        match to.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                if !matches!(state.entries.get(parent), Some(MockEntry::Dir)) {
                    return Err(not_found(parent));
                }
            }
            _ => {}
        }
        if matches!(state.entries.get(to), Some(MockEntry::Dir)) && entry != MockEntry::Dir {
            return Err(io_err(
                ErrorKind::IsADirectory,
                format!("rename target is a directory: {:?}", to),
            ));
        }

        let moved: Vec<(PathBuf, MockEntry)> = state
            .entries
            .iter()
            .filter(|(p, _)| p.starts_with(from))
            .map(|(p, e)| (p.clone(), e.clone()))
            .collect();
        for (old, _) in &moved {
            state.entries.remove(old);
        }
        for (old, e) in moved {
            let rel = old.strip_prefix(from).unwrap_or(Path::new(""));
            let new = if rel.as_os_str().is_empty() {
                to.to_path_buf()
            } else {
                to.join(rel)
            };
            state.entries.insert(new, e);
        }
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        state.enter(MockOp::CreateDir, path)?;
        state.ensure_parents(path)?;
        match state.entries.get(path) {
            Some(MockEntry::Dir) => Ok(()),
            Some(_) => Err(io_err(
                ErrorKind::AlreadyExists,
                format!("exists and is not a directory: {:?}", path),
            )),
            None => {
                state.entries.insert(path.to_path_buf(), MockEntry::Dir);
                Ok(())
            }
        }
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        state.enter(MockOp::RemoveFile, path)?;
        match state.entries.get(path) {
            None => Err(not_found(path)),
            Some(MockEntry::Dir) => Err(io_err(
                ErrorKind::IsADirectory,
                format!("is a directory: {:?}", path),
            )),
            Some(_) => {
                state.entries.remove(path);
                Ok(())
            }
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        state.enter(MockOp::RemoveDir, path)?;
        if !state.entries.contains_key(path) {
            return Err(not_found(path));
        }
        state.entries.retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.state().entries.contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.state().entries.get(path), Some(MockEntry::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.state().entries.get(path), Some(MockEntry::Dir))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        // Resolves symlink entries component by component; no `..` handling.
        let state = self.state();
        let mut resolved = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Normal(name) => resolved.push(name),
                other => resolved.push(other.as_os_str()),
            }
            match state.entries.get(&resolved) {
                Some(MockEntry::Symlink(target)) => resolved = target.clone(),
                Some(_) => {}
                None if resolved.parent().is_none() => {}
                None => return Err(not_found(&resolved)),
            }
        }
        Ok(resolved)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let state = self.state();
        match state.entries.get(path) {
            Some(MockEntry::Dir) => Ok(state
                .entries
                .keys()
                .filter(|p| p.parent() == Some(path))
                .cloned()
                .collect()),
            Some(_) => Err(io_err(
                ErrorKind::NotADirectory,
                format!("not a directory: {:?}", path),
            )),
            None => Err(not_found(path)),
        }
    }
}
