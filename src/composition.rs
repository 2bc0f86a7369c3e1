//! Cycle guard for workflow composition (`include`/`call`).
//!
//! Composition runtimes load and execute other workflow files; a file that
//! (transitively) includes itself would recurse forever. The guard is a
//! process-wide set of active workflow paths: a composition runtime enters
//! the target path before recursing and the returned [`CompositionGuard`]
//! removes it on drop, so release happens on every exit path: success,
//! failure, or panic.
//!
//! The core ships the guard and the registry contract (`compose:include`,
//! `compose:call`); the file-loading runtimes themselves are external
//! collaborators.

use miette::Diagnostic;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};
use thiserror::Error;

static ACTIVE_PATHS: LazyLock<Mutex<FxHashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(FxHashSet::default()));

/// A poisoned lock only means a panic elsewhere mid-insert; the set itself
/// stays usable.
fn lock_active() -> std::sync::MutexGuard<'static, FxHashSet<PathBuf>> {
    ACTIVE_PATHS
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Attempting to re-enter a workflow file that is already executing.
#[derive(Debug, Error, Diagnostic)]
#[error("workflow composition cycle: `{path}` is already executing")]
#[diagnostic(
    code(flowscript::composition::cycle),
    help("An include/call chain has returned to a workflow file it started from.")
)]
pub struct CompositionCycle {
    pub path: String,
}

/// RAII entry into the active-path set.
#[derive(Debug)]
pub struct CompositionGuard {
    path: PathBuf,
}

/// Enter `path`, failing when it is already active.
pub fn enter(path: impl AsRef<Path>) -> Result<CompositionGuard, CompositionCycle> {
    let path = path.as_ref().to_path_buf();
    let mut active = lock_active();
    if !active.insert(path.clone()) {
        return Err(CompositionCycle {
            path: path.display().to_string(),
        });
    }
    Ok(CompositionGuard { path })
}

/// Whether a path is currently executing (diagnostics only).
#[must_use]
pub fn is_active(path: impl AsRef<Path>) -> bool {
    lock_active().contains(path.as_ref())
}

impl Drop for CompositionGuard {
    fn drop(&mut self) {
        lock_active().remove(&self.path);
    }
}
