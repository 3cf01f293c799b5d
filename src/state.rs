use std::fmt;

use serde::Serialize;

use crate::models::SimulationDetails;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => f.write_str("idle"),
            SessionStatus::Running => f.write_str("running"),
            SessionStatus::Stopped => f.write_str("stopped"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PushStatusRule {
    #[default]
    MarkStopped,
    KeepRunning,
}

#[derive(Clone, Debug, Default)]
pub struct SessionState {
    status: SessionStatus,
    details: Option<SimulationDetails>,
    last_reconciled: Option<SimulationDetails>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn details(&self) -> Option<&SimulationDetails> {
        self.details.as_ref()
    }

    pub fn can_stop(&self) -> bool {
        self.status == SessionStatus::Running
    }

    pub fn can_fetch(&self) -> bool {
        self.status != SessionStatus::Running
    }

    pub fn begin_run(&mut self) {
        self.status = SessionStatus::Running;
        self.details = None;
        self.last_reconciled = None;
    }

    pub fn merge_push(&mut self, patch: SimulationDetails, rule: PushStatusRule) {
        self.details = Some(SimulationDetails::merged(self.details.as_ref(), patch));
        self.status = match (rule, self.status) {
            (PushStatusRule::KeepRunning, SessionStatus::Running) => SessionStatus::Running,
            _ => SessionStatus::Stopped,
        };
    }

    pub fn replace_snapshot(&mut self, snapshot: SimulationDetails) {
        self.status = SessionStatus::Stopped;
        self.details = Some(snapshot);
    }

    pub fn reconcile(&mut self, details: SimulationDetails) -> bool {
        if self.last_reconciled.as_ref() == Some(&details) {
            return false;
        }
        self.last_reconciled = Some(details.clone());
        self.replace_snapshot(details);
        true
    }
}
