// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! OS scheduler-state probe.
//!
//! The registry's exit/kill flags say whether a child *can* be alive; the
//! probe says whether it is a good forwarding target right now. A child
//! currently on a CPU (`R` in procfs terms) is assumed to be busy with
//! previous work, so candidate selection prefers a sleeping sibling.
//!
//! Any failure to read or parse the state degrades to [`ProcState::Other`],
//! which candidate selection treats as eligible - on platforms without
//! procfs the rule collapses to "first alive candidate".

use tracing::debug;

/// Coarse scheduler state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    /// Sleeping in an interruptible wait; will pick up the next message.
    Idle,
    /// Ready to run but not on a CPU.
    Runnable,
    /// Currently executing.
    Running,
    /// Anything else, including "state unknown".
    Other,
}

/// Source of scheduler states, pluggable for tests and platforms.
pub trait StateProbe: Send + Sync {
    /// Scheduler state of `pid`.
    fn process_state(&self, pid: u32) -> ProcState;
}

/// Probe backed by `/proc/<pid>/stat`.
#[derive(Debug, Default, Clone)]
pub struct ProcfsProbe;

impl ProcfsProbe {
    /// New procfs probe.
    pub fn new() -> Self {
        Self
    }
}

impl StateProbe for ProcfsProbe {
    fn process_state(&self, pid: u32) -> ProcState {
        let path = format!("/proc/{pid}/stat");
        match std::fs::read_to_string(&path) {
            Ok(stat) => parse_stat_state(&stat),
            Err(e) => {
                debug!(pid = pid, error = %e, "Scheduler state unavailable");
                ProcState::Other
            }
        }
    }
}

/// Parse the state field out of a `/proc/<pid>/stat` line.
///
/// The line is `pid (comm) state ...`; `comm` may itself contain spaces
/// and parentheses, so the state is the first non-space character after
/// the *last* closing parenthesis.
pub fn parse_stat_state(stat: &str) -> ProcState {
    let Some(end_of_comm) = stat.rfind(')') else {
        return ProcState::Other;
    };
    let state = stat[end_of_comm + 1..]
        .chars()
        .find(|c| !c.is_whitespace());

    match state {
        Some('R') => ProcState::Running,
        Some('S') | Some('I') => ProcState::Idle,
        Some(_) => ProcState::Other,
        None => ProcState::Other,
    }
}

/// Fixed-answer probe for tests and unsupported platforms.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub ProcState);

impl StateProbe for FixedProbe {
    fn process_state(&self, _pid: u32) -> ProcState {
        self.0
    }
}
