//! Remote agents and persisted sessions, as last listed by the server.
//!
//! Both lists are replaced wholesale on every listing response. Whether a
//! session is live is derived only from the agents' `active_session`, never
//! from the session record's own `status`, which can be stale.

use convo_wire::{RemoteAgent, SessionRecord};

/// A session joined with the agent currently driving it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectView<'a> {
    pub record: &'a SessionRecord,
    pub is_live: bool,
    pub agent: Option<&'a RemoteAgent>,
}

#[derive(Debug, Default)]
pub struct Directory {
    agents: Vec<RemoteAgent>,
    sessions: Vec<SessionRecord>,
    agents_loaded: bool,
    sessions_loaded: bool,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_agents(&mut self, agents: Vec<RemoteAgent>) {
        self.agents = agents;
        self.agents_loaded = true;
    }

    pub fn replace_sessions(&mut self, sessions: Vec<SessionRecord>) {
        self.sessions = sessions;
        self.sessions_loaded = true;
    }

    pub fn agents(&self) -> &[RemoteAgent] {
        &self.agents
    }

    pub fn sessions(&self) -> &[SessionRecord] {
        &self.sessions
    }

    /// Both listings have arrived at least once.
    pub fn is_loaded(&self) -> bool {
        self.agents_loaded && self.sessions_loaded
    }

    /// The reachable agent whose active session is `session_id`.
    pub fn live_agent_for(&self, session_id: &str) -> Option<&RemoteAgent> {
        self.agents
            .iter()
            .find(|a| a.live_session() == Some(session_id))
    }

    pub fn projects(&self) -> Vec<ProjectView<'_>> {
        self.sessions
            .iter()
            .map(|record| {
                let agent = self.live_agent_for(&record.id);
                ProjectView {
                    record,
                    is_live: agent.is_some(),
                    agent,
                }
            })
            .collect()
    }
}
