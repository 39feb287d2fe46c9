//! Development reloader.
//!
//! The parent process never serves requests. It re-executes the current
//! binary with [`RELOADER_ENV`] set and waits; whenever the child exits
//! with [`RELOAD_EXIT_CODE`] it is started again. The child watches the
//! executable (and any extra paths) and exits with that code as soon as a
//! modification time changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

/// Set to `"true"` in the environment of the serving child.
pub const RELOADER_ENV: &str = "TOKIO_WSGI_RUN_MAIN";

/// Exit code a child uses to ask for a restart.
pub const RELOAD_EXIT_CODE: i32 = 3;

/// Default polling interval for file changes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// True inside the child started by the reloader.
pub fn is_reloader_child() -> bool {
    std::env::var(RELOADER_ENV).map(|v| v == "true").unwrap_or(false)
}

/// Run `main` under the reloader.
///
/// In the parent this only returns on spawn failure; the process exits
/// with the child's final exit code. In the child a watcher thread is
/// started and `main` runs normally.
pub fn run_with_reloader<F, E>(main: F, interval: Duration) -> Result<(), E>
where
    F: FnOnce() -> Result<(), E>,
    E: From<std::io::Error>,
{
    if is_reloader_child() {
        let exe = std::env::current_exe()?;
        spawn_watcher(vec![exe], interval);
        return main();
    }

    let code = restart_with_reloader()?;
    std::process::exit(code);
}

/// Spawn the child until it exits with something other than
/// [`RELOAD_EXIT_CODE`] and return that exit code.
pub fn restart_with_reloader() -> std::io::Result<i32> {
    let exe = std::env::current_exe()?;

    loop {
        info!(" * Restarting with reloader");
        let status = Command::new(&exe)
            .args(std::env::args_os().skip(1))
            .env(RELOADER_ENV, "true")
            .status()?;

        match status.code() {
            Some(RELOAD_EXIT_CODE) => continue,
            Some(code) => return Ok(code),
            // Killed by a signal
            None => return Ok(1),
        }
    }
}

/// Watch `paths` from a background thread and exit the process with
/// [`RELOAD_EXIT_CODE`] on the first change.
pub fn spawn_watcher(paths: Vec<PathBuf>, interval: Duration) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut watcher = Watcher::new(paths);
        loop {
            thread::sleep(interval);
            if let Some(path) = watcher.changed() {
                info!(" * Detected change in {}, reloading", path.display());
                std::process::exit(RELOAD_EXIT_CODE);
            }
        }
    })
}

/// Modification-time snapshot of a set of files.
#[derive(Debug)]
pub struct Watcher {
    mtimes: HashMap<PathBuf, Option<SystemTime>>,
}

impl Watcher {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mtimes = paths
            .into_iter()
            .map(|path| {
                let mtime = modified(&path);
                if mtime.is_none() {
                    warn!(path = %path.display(), "reloader cannot stat watched file");
                }
                (path, mtime)
            })
            .collect();
        Self { mtimes }
    }

    /// First path whose modification time differs from the snapshot.
    /// The snapshot is updated, so each change is reported once.
    pub fn changed(&mut self) -> Option<PathBuf> {
        for (path, seen) in self.mtimes.iter_mut() {
            let current = modified(path);
            if current != *seen {
                debug!(path = %path.display(), "watched file changed");
                *seen = current;
                return Some(path.clone());
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.mtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mtimes.is_empty()
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn test_watcher_reports_modification_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.bin");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"v1").unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000)).unwrap();

        let mut watcher = Watcher::new(vec![path.clone()]);
        assert_eq!(watcher.len(), 1);
        assert_eq!(watcher.changed(), None);

        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(2_000)).unwrap();
        assert_eq!(watcher.changed(), Some(path));
        assert_eq!(watcher.changed(), None);
    }

    #[test]
    fn test_watcher_notices_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.bin");
        File::create(&path).unwrap();

        let mut watcher = Watcher::new(vec![path.clone()]);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(watcher.changed(), Some(path));
    }

    #[test]
    fn test_not_a_child_by_default() {
        if std::env::var_os(RELOADER_ENV).is_none() {
            assert!(!is_reloader_child());
        }
    }
}
