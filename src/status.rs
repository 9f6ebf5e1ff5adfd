//! Status reactor: the state-transition function for reaped child events.
//!
//! Invoked for every reaped `(pid, wait_status)` event, whether it arrived
//! synchronously from the foreground wait or asynchronously from the
//! `SIGCHLD` self-pipe drain. Must be idempotent and tolerant of
//! already-removed pipelines, since both reap paths funnel into it.

use crate::ast::PipelineStatus;
use crate::job_control::ChildEvent;
use crate::jobs::JobTable;
use crate::plugin::PluginRegistry;

/// React to one reaped child-status event, returning any user-visible
/// lines the caller should print (already newline-terminated).
pub fn react_to_status_change(jobs: &mut JobTable, registry: &mut PluginRegistry, pid: u32, event: ChildEvent) -> Vec<String> {
    let mut messages = Vec::new();

    let (jid, is_last_command, command_snapshot, status_snapshot) = {
        let pipeline = match jobs.find_by_pid_mut(pid) {
            Some(p) => p,
            // Already removed by a previous reap of the same event, or an
            // untracked pid (e.g. a grandchild). Ignore it.
            None => return messages,
        };
        let command = match pipeline.commands.iter().find(|c| c.pid == Some(pid)) {
            Some(c) => c.clone(),
            None => return messages,
        };
        (pipeline.jid, pipeline.is_last_command(pid), command, pipeline.status.clone())
    };

    // Plugins take precedence. A claim scopes to this pipeline only, not
    // the whole reap batch — the caller's loop over reaped events continues.
    if registry.command_status_change(&command_snapshot, &status_snapshot) {
        return messages;
    }

    match event {
        ChildEvent::Stopped => {
            if let Some(pipeline) = jobs.get_mut(jid) {
                pipeline.status = PipelineStatus::Stopped;
                pipeline.bg_requested = true;
                messages.push(format!("[{}]   Stopped         ({})\n", jid, pipeline.display()));
            }
        }
        ChildEvent::Signalled(_code) => {
            // Goes straight to removal with no status line.
            jobs.remove(jid);
        }
        ChildEvent::Exited(_code) => {
            if is_last_command {
                if let Some(pipeline) = jobs.remove(jid) {
                    if pipeline.bg_requested {
                        messages.push(format!("[{}]   Done            ({})\n", jid, pipeline.display()));
                    }
                }
            }
            // An earlier stage exiting normally doesn't end the pipeline;
            // its downstream neighbours may still be reading its output.
        }
        ChildEvent::Continued => {
            if is_last_command {
                if let Some(pipeline) = jobs.get_mut(jid) {
                    pipeline.status = if pipeline.bg_requested {
                        PipelineStatus::Background
                    } else {
                        PipelineStatus::Foreground
                    };
                }
            }
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Command, Pipeline};

    fn single_stage_pipeline(pid: u32, bg: bool) -> Pipeline {
        let mut command = Command::new(vec!["sleep".to_string(), "10".to_string()]);
        command.pid = Some(pid);
        let mut pipeline = Pipeline::new(vec![command], bg);
        pipeline.pgrp = Some(pid);
        pipeline
    }

    #[test]
    fn unknown_pid_is_ignored() {
        let mut jobs = JobTable::new();
        let mut registry = PluginRegistry::new();
        let messages = react_to_status_change(&mut jobs, &mut registry, 12345, ChildEvent::Exited(0));
        assert!(messages.is_empty());
    }

    #[test]
    fn background_exit_prints_done_and_removes_job() {
        let mut jobs = JobTable::new();
        let mut registry = PluginRegistry::new();
        let jid = jobs.insert(single_stage_pipeline(42, true));

        let messages = react_to_status_change(&mut jobs, &mut registry, 42, ChildEvent::Exited(0));
        assert_eq!(messages, vec![format!("[{jid}]   Done            (sleep 10)\n")]);
        assert!(jobs.get(jid).is_none());
    }

    #[test]
    fn foreground_exit_is_silent_but_still_removes_job() {
        let mut jobs = JobTable::new();
        let mut registry = PluginRegistry::new();
        let jid = jobs.insert(single_stage_pipeline(7, false));

        let messages = react_to_status_change(&mut jobs, &mut registry, 7, ChildEvent::Exited(0));
        assert!(messages.is_empty());
        assert!(jobs.get(jid).is_none());
    }

    #[test]
    fn stop_event_marks_stopped_and_promotes_bg_requested() {
        let mut jobs = JobTable::new();
        let mut registry = PluginRegistry::new();
        let jid = jobs.insert(single_stage_pipeline(9, false));

        let messages = react_to_status_change(&mut jobs, &mut registry, 9, ChildEvent::Stopped);
        assert_eq!(messages, vec![format!("[{jid}]   Stopped         (sleep 10)\n")]);
        let pipeline = jobs.get(jid).unwrap();
        assert_eq!(pipeline.status, PipelineStatus::Stopped);
        assert!(pipeline.bg_requested);
    }

    #[test]
    fn signalled_termination_removes_silently() {
        let mut jobs = JobTable::new();
        let mut registry = PluginRegistry::new();
        let jid = jobs.insert(single_stage_pipeline(11, false));

        let messages = react_to_status_change(&mut jobs, &mut registry, 11, ChildEvent::Signalled(137));
        assert!(messages.is_empty());
        assert!(jobs.get(jid).is_none());
    }

    #[test]
    fn continued_restores_foreground_or_background_per_bg_requested() {
        let mut jobs = JobTable::new();
        let mut registry = PluginRegistry::new();
        let mut pipeline = single_stage_pipeline(13, false);
        pipeline.status = PipelineStatus::Stopped;
        pipeline.bg_requested = true; // promoted by an earlier Stop event
        let jid = jobs.insert(pipeline);

        react_to_status_change(&mut jobs, &mut registry, 13, ChildEvent::Continued);
        assert_eq!(jobs.get(jid).unwrap().status, PipelineStatus::Background);
    }

    #[test]
    fn reaping_an_already_removed_job_is_a_no_op() {
        let mut jobs = JobTable::new();
        let mut registry = PluginRegistry::new();
        let messages = react_to_status_change(&mut jobs, &mut registry, 999, ChildEvent::Exited(1));
        assert!(messages.is_empty());
    }
}
