//=========================================================================
// Script Host
//=========================================================================
//
// Owns the authoritative VM and decides when it is replaced.
//
// Reload transaction:
//   1. build a fresh VM (next generation) with the API installed
//   2. snapshot input definitions, the camera and the pending event
//      count, then start the new image from empty action/context
//      definitions
//   3. run the entry file and its `init()`
//   4a. failure: restore the snapshot, drop events the attempt produced,
//       release everything the new generation pinned, keep the old VM
//   4b. success: make the new generation live, release everything the
//       old generation pinned, drop it
//
// Until 4b the new image can only modify registrations it created
// itself (`RuntimeContext::may_modify`); everything else it could touch
// is covered by the snapshot.
//
// Subsystems never hold the VM; they receive a `VmRef` per call.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;

use log::{debug, info, warn};
use walkdir::WalkDir;

//=== Internal Dependencies ===============================================

use super::api;
use super::fault::{FaultSite, ScriptFault};
use super::script_ref::VmGeneration;
use super::vm::{ScriptVm, VmRef};
use crate::core::runtime_context::RuntimeContext;

//=== ScriptHost ==========================================================

pub struct ScriptHost {
    ctx: Rc<RuntimeContext>,
    vm: Option<ScriptVm>,
    root: PathBuf,
    entry: String,
    hot_reload: bool,
    last_seen: Option<SystemTime>,
    next_generation: u64,
    last_error: Option<ScriptFault>,
}

impl ScriptHost {
    /// A host with no image loaded yet. `entry` is relative to `root`.
    pub fn new(ctx: Rc<RuntimeContext>, root: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        Self {
            ctx,
            vm: None,
            root: root.into(),
            entry: entry.into(),
            hot_reload: true,
            last_seen: None,
            next_generation: 0,
            last_error: None,
        }
    }

    pub fn with_hot_reload(mut self, enabled: bool) -> Self {
        self.hot_reload = enabled;
        self
    }

    //--- Accessors --------------------------------------------------------

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self) -> PathBuf {
        self.root.join(&self.entry)
    }

    pub fn is_loaded(&self) -> bool {
        self.vm.is_some()
    }

    pub fn vm(&self) -> Option<&ScriptVm> {
        self.vm.as_ref()
    }

    pub fn vm_ref(&self) -> Option<VmRef<'_>> {
        self.vm.as_ref().map(ScriptVm::vm_ref)
    }

    pub fn generation(&self) -> Option<VmGeneration> {
        self.vm.as_ref().map(ScriptVm::generation)
    }

    /// The fault of the most recent failed load, cleared by a good one.
    pub fn last_error(&self) -> Option<&ScriptFault> {
        self.last_error.as_ref()
    }

    //--- Loading ----------------------------------------------------------

    /// Loads the script image and runs `init`. Same transaction as a
    /// reload: on failure any previously loaded image stays authoritative.
    pub fn load(&mut self) -> Result<(), ScriptFault> {
        self.last_seen = source_timestamp(&self.root);
        self.swap_in()
    }

    /// Reloads when anything under the script root changed since the
    /// last attempt. Returns `true` if a reload was attempted.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn reload_if_changed(&mut self) -> bool {
        if !self.hot_reload {
            return false;
        }
        let current = source_timestamp(&self.root);
        if current.is_none() || current == self.last_seen {
            return false;
        }

        info!(target: "script", "Change detected under {}, reloading", self.root.display());
        // Recorded before the attempt so a broken edit is not retried
        // every frame; the next save changes the timestamp again.
        self.last_seen = current;
        let _ = self.swap_in();
        true
    }

    #[cfg(target_arch = "wasm32")]
    pub fn reload_if_changed(&mut self) -> bool {
        false
    }

    fn swap_in(&mut self) -> Result<(), ScriptFault> {
        self.next_generation += 1;
        let generation = VmGeneration(self.next_generation);

        match self.build(generation) {
            Ok(vm) => {
                self.ctx.set_live_generation(Some(generation));
                if let Some(old) = self.vm.replace(vm) {
                    self.retire(old);
                }
                self.last_error = None;
                info!(target: "script", "Loaded {} as {generation}", self.entry_path().display());
                Ok(())
            }
            Err(fault) => {
                warn!(
                    target: "script",
                    "Load of {generation} failed, keeping {}",
                    self.generation().map_or_else(|| "no image".to_string(), |g| g.to_string())
                );
                self.ctx.diagnostics.report(fault.clone());
                self.last_error = Some(fault.clone());
                Err(fault)
            }
        }
    }

    fn build(&self, generation: VmGeneration) -> Result<ScriptVm, ScriptFault> {
        let vm = ScriptVm::new(generation)?;
        vm.set_module_root(&self.root)?;
        api::install(&vm, &self.ctx).map_err(|e| ScriptFault::from_lua(FaultSite::Load, &e))?;

        let definitions = self.ctx.input.borrow().snapshot_definitions();
        let camera = self.ctx.camera.borrow().clone();
        let pending = self.ctx.events.borrow().pending_len();
        self.ctx.input.borrow_mut().reset_definitions();

        let result = vm
            .exec_file(&self.entry_path())
            .and_then(|()| vm.vm_ref().call_global(FaultSite::Init, "init", ()).map(|_| ()));

        match result {
            Ok(()) => Ok(vm),
            Err(fault) => {
                self.ctx.input.borrow_mut().restore_definitions(definitions);
                *self.ctx.camera.borrow_mut() = camera;
                self.ctx.events.borrow_mut().truncate_pending(pending);
                self.retire(vm);
                Err(fault)
            }
        }
    }

    /// Releases a losing VM's native registrations, then drops it.
    fn retire(&self, vm: ScriptVm) {
        let generation = vm.generation();
        let released = self.ctx.release_generation(generation);

        let leaked = vm.pinned_count();
        if leaked > 0 {
            warn!(target: "script", "{generation} retired with {leaked} values still pinned");
        } else {
            debug!(target: "script", "Retired {generation} ({released} registrations released)");
        }
    }

    /// Releases every registration and drops the VM.
    pub fn shutdown(&mut self) {
        self.ctx.clear();
        if let Some(vm) = self.vm.take() {
            self.retire(vm);
        }
    }
}

impl std::fmt::Debug for ScriptHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHost")
            .field("root", &self.root)
            .field("entry", &self.entry)
            .field("generation", &self.generation())
            .field("hot_reload", &self.hot_reload)
            .finish()
    }
}

//=== source_timestamp() ==================================================

/// Newest modification time of anything under `root`, directories
/// included so deletions register. `None` if nothing is readable.
pub fn source_timestamp(root: &Path) -> Option<SystemTime> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|entry| entry.metadata().ok())
        .filter_map(|meta| meta.modified().ok())
        .max()
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn script_dir(source: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.lua"), source).unwrap();
        dir
    }

    fn touch_forward(path: &Path, seconds: u64) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(seconds)).unwrap();
    }

    #[test]
    fn load_runs_init() {
        let dir = script_dir("function init() started = true end");
        let mut host = ScriptHost::new(RuntimeContext::shared(), dir.path(), "main.lua");

        host.load().unwrap();
        let started: bool = host.vm().unwrap().lua().globals().get("started").unwrap();
        assert!(started);
        assert_eq!(host.generation(), Some(VmGeneration(1)));
    }

    #[test]
    fn failed_first_load_leaves_host_unloaded() {
        let dir = script_dir("function init() error('nope') end");
        let ctx = RuntimeContext::shared();
        let mut host = ScriptHost::new(Rc::clone(&ctx), dir.path(), "main.lua");

        let fault = host.load().unwrap_err();
        assert_eq!(fault.site, FaultSite::Init);
        assert!(!host.is_loaded());
        assert!(host.last_error().is_some());
        assert_eq!(ctx.diagnostics.fault_count(), 1);
    }

    #[test]
    fn unchanged_tree_does_not_reload() {
        let dir = script_dir("function init() end");
        let mut host = ScriptHost::new(RuntimeContext::shared(), dir.path(), "main.lua");
        host.load().unwrap();

        assert!(!host.reload_if_changed());
        assert_eq!(host.generation(), Some(VmGeneration(1)));
    }

    #[test]
    fn changed_tree_swaps_generation() {
        let dir = script_dir("function init() version = 1 end");
        let mut host = ScriptHost::new(RuntimeContext::shared(), dir.path(), "main.lua");
        host.load().unwrap();

        let main = dir.path().join("main.lua");
        fs::write(&main, "function init() version = 2 end").unwrap();
        touch_forward(&main, 5);

        assert!(host.reload_if_changed());
        let version: i64 = host.vm().unwrap().lua().globals().get("version").unwrap();
        assert_eq!(version, 2);
        assert_eq!(host.generation(), Some(VmGeneration(2)));
    }

    #[test]
    fn live_generation_follows_successful_loads_only() {
        let dir = script_dir("function init() end");
        let ctx = RuntimeContext::shared();
        let mut host = ScriptHost::new(Rc::clone(&ctx), dir.path(), "main.lua");
        host.load().unwrap();
        assert_eq!(ctx.live_generation(), Some(VmGeneration(1)));

        let main = dir.path().join("main.lua");
        fs::write(&main, "function init() error('broken') end").unwrap();
        touch_forward(&main, 5);
        host.reload_if_changed();
        assert_eq!(ctx.live_generation(), Some(VmGeneration(1)));

        host.shutdown();
        assert_eq!(ctx.live_generation(), None);
    }

    #[test]
    fn failed_reload_restores_camera() {
        let dir = script_dir("function init() camera.set_position(10, 20) end");
        let ctx = RuntimeContext::shared();
        let mut host = ScriptHost::new(Rc::clone(&ctx), dir.path(), "main.lua");
        host.load().unwrap();
        let before = ctx.camera.borrow().clone();

        let main = dir.path().join("main.lua");
        fs::write(&main, "function init() camera.set_position(500, 500); camera.set_zoom(4); error('x') end")
            .unwrap();
        touch_forward(&main, 5);
        host.reload_if_changed();

        assert_eq!(*ctx.camera.borrow(), before);
    }

    #[test]
    fn disabled_hot_reload_ignores_changes() {
        let dir = script_dir("function init() end");
        let mut host =
            ScriptHost::new(RuntimeContext::shared(), dir.path(), "main.lua").with_hot_reload(false);
        host.load().unwrap();

        touch_forward(&dir.path().join("main.lua"), 5);
        assert!(!host.reload_if_changed());
    }

    #[test]
    fn source_timestamp_of_missing_root_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(source_timestamp(&dir.path().join("absent")).is_none());
    }
}
