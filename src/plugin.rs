//! Plugin interface.
//!
//! Two separate interface values rather than a cyclic object graph:
//! [`ShellApi`] is a read-only capability facade the shell hands to
//! plugins, and [`Plugin`] is the set of optional hooks plugins hand back.
//! Neither holds a reference to the other's owner.
//!
//! Dynamic loading scans a directory for shared libraries and calls a
//! fixed C-ABI entry point via `libloading`.

use crate::ast::{Command, Pipeline, PipelineStatus};
use crate::jobs::JobTable;

/// A read-only snapshot of one job, handed to plugins instead of a live
/// reference into the job table.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub jid: usize,
    pub pgrp: Option<u32>,
    pub status_label: &'static str,
    pub display: String,
}

impl From<&Pipeline> for JobSummary {
    fn from(pipeline: &Pipeline) -> Self {
        JobSummary {
            jid: pipeline.jid,
            pgrp: pipeline.pgrp,
            status_label: pipeline.status.label(),
            display: pipeline.display(),
        }
    }
}

/// The capability record passed to plugins: `get_jobs`, `get_job_from_jid`,
/// `get_job_from_pgrp`, `build_prompt`, `readline`, `parse_command_line`.
pub struct ShellApi<'a> {
    jobs: &'a JobTable,
}

impl<'a> ShellApi<'a> {
    pub fn new(jobs: &'a JobTable) -> Self {
        ShellApi { jobs }
    }

    pub fn get_jobs(&self) -> Vec<JobSummary> {
        self.jobs.iter().map(JobSummary::from).collect()
    }

    pub fn get_job_from_jid(&self, jid: usize) -> Option<JobSummary> {
        self.jobs.get(jid).map(JobSummary::from)
    }

    pub fn get_job_from_pgrp(&self, pgrp: u32) -> Option<JobSummary> {
        self.jobs.iter().find(|p| p.pgrp == Some(pgrp)).map(JobSummary::from)
    }

    pub fn build_prompt(&self) -> String {
        "esh> ".to_string()
    }

    pub fn readline(&self, prompt: &str) -> Option<String> {
        crate::editor::read_line(prompt)
    }

    pub fn parse_command_line(&self, line: &str) -> Result<Option<crate::ast::CommandLine>, String> {
        crate::parser::parse_command_line(line)
    }
}

/// Optional hooks a plugin may implement. Every method has a no-op default
/// so a plugin only needs to override what it actually cares about.
pub trait Plugin {
    /// Used for diagnostics and `-p` load-order tracing.
    fn name(&self) -> &str;

    /// Plugins are consulted in ascending rank order.
    fn rank(&self) -> i32 {
        0
    }

    /// Called once at load. A `false` return drops the plugin from the
    /// registry.
    fn init(&mut self, _shell: &ShellApi) -> bool {
        true
    }

    fn make_prompt(&mut self) -> Option<String> {
        None
    }

    fn process_raw_cmdline(&mut self, _line: &mut String) {}

    fn process_pipeline(&mut self, _pipeline: &mut Pipeline) {}

    /// Returning `true` shadows the built-in table and suppresses the
    /// default launch path for this command line.
    fn process_builtin(&mut self, _argv: &[String]) -> bool {
        false
    }

    fn pipeline_forked(&mut self, _pipeline: &Pipeline) {}

    /// If any plugin returns `true`, the status reactor short-circuits its
    /// processing of *this pipeline only*.
    fn command_status_change(&mut self, _command: &Command, _status: &PipelineStatus) -> bool {
        false
    }
}

/// The C-ABI symbol every plugin `cdylib` must export.
const ENTRY_SYMBOL: &[u8] = b"esh_plugin_entry";

type EntryFn = unsafe extern "C" fn() -> Box<dyn Plugin>;

/// Holds loaded plugins in rank order, plus the `libloading::Library`
/// handles that must outlive every `Box<dyn Plugin>` they produced.
///
/// Field order matters: `plugins` must drop before `libraries` so no boxed
/// plugin outlives the code that backs its vtable.
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
    #[cfg(unix)]
    libraries: Vec<libloading::Library>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        PluginRegistry {
            plugins: Vec::new(),
            #[cfg(unix)]
            libraries: Vec::new(),
        }
    }

    /// Non-recursively scan `dir` for dynamic libraries and load each one.
    /// A library that fails to load or open, or whose `init` returns
    /// `false`, is logged at `warn` and dropped — it never aborts the
    /// shell.
    #[cfg(unix)]
    pub fn load_dir(&mut self, dir: &std::path::Path, shell: &ShellApi) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "could not scan plugin directory");
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !is_dynamic_library(&path) {
                continue;
            }
            self.load_one(&path, shell);
        }

        self.plugins.sort_by_key(|p| p.rank());
    }

    #[cfg(unix)]
    fn load_one(&mut self, path: &std::path::Path, shell: &ShellApi) {
        let library = match unsafe { libloading::Library::new(path) } {
            Ok(lib) => lib,
            Err(err) => {
                let err = crate::error::Error::plugin(format!("{}: {err}", path.display()));
                tracing::warn!(%err, "failed to load plugin library");
                return;
            }
        };

        let entry: libloading::Symbol<EntryFn> = match unsafe { library.get(ENTRY_SYMBOL) } {
            Ok(sym) => sym,
            Err(err) => {
                let err = crate::error::Error::plugin(format!("{}: missing entry symbol", path.display()));
                tracing::warn!(%err);
                return;
            }
        };

        let mut plugin = unsafe { entry() };
        if !plugin.init(shell) {
            let err = crate::error::Error::plugin(format!("{}: init returned false", plugin.name()));
            tracing::warn!(%err);
            return;
        }

        tracing::debug!(path = %path.display(), plugin = plugin.name(), rank = plugin.rank(), "loaded plugin");
        self.plugins.push(plugin);
        self.libraries.push(library);
    }

    pub fn make_prompt(&mut self, default: &str) -> String {
        let mut prompt = String::new();
        for plugin in &mut self.plugins {
            if let Some(fragment) = plugin.make_prompt() {
                prompt.push_str(&fragment);
            }
        }
        if prompt.is_empty() {
            default.to_string()
        } else {
            prompt
        }
    }

    pub fn process_raw_cmdline(&mut self, line: &mut String) {
        for plugin in &mut self.plugins {
            plugin.process_raw_cmdline(line);
        }
    }

    pub fn process_pipeline(&mut self, pipeline: &mut Pipeline) {
        for plugin in &mut self.plugins {
            plugin.process_pipeline(pipeline);
        }
    }

    /// Returns `true` if some plugin claimed the command line as a builtin.
    pub fn process_builtin(&mut self, argv: &[String]) -> bool {
        self.plugins.iter_mut().any(|p| p.process_builtin(argv))
    }

    pub fn pipeline_forked(&mut self, pipeline: &Pipeline) {
        for plugin in &mut self.plugins {
            plugin.pipeline_forked(pipeline);
        }
    }

    /// Returns `true` if some plugin claimed this status-change event (the
    /// reactor should short-circuit processing of just this pipeline).
    pub fn command_status_change(&mut self, command: &Command, status: &PipelineStatus) -> bool {
        self.plugins.iter_mut().any(|p| p.command_status_change(command, status))
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn is_dynamic_library(path: &std::path::Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("so") | Some("dylib") | Some("dll")
    )
}

#[cfg(not(unix))]
impl PluginRegistry {
    pub fn load_dir(&mut self, _dir: &std::path::Path, _shell: &ShellApi) {}
}
