//! Resolves an [`AgentKind`] to a concrete [`AgentBackend`].

use crate::claude::ClaudeCodeBackend;
use crate::codex::CodexBackend;
use crate::generic::GenericBackend;
use crate::protocol::{AgentBackend, AgentKind};
use std::collections::HashMap;
use std::sync::Arc;

/// A keyed lookup from [`AgentKind`] to its backend implementation.
///
/// Built once at startup and shared across every stream; backends are
/// stateless drivers (all session state lives in the per-execution
/// [`AgentSession`](crate::protocol::AgentSession)), so one instance per
/// kind is sufficient for the whole process.
pub struct AgentRegistry {
    backends: HashMap<AgentKind, Arc<dyn AgentBackend>>,
}

impl AgentRegistry {
    /// Build the default registry: dedicated backends for Claude Code and
    /// Codex, a shared [`GenericBackend`] for the remaining kinds.
    #[must_use]
    pub fn default_registry() -> Self {
        let mut backends: HashMap<AgentKind, Arc<dyn AgentBackend>> = HashMap::new();
        backends.insert(AgentKind::ClaudeCode, Arc::new(ClaudeCodeBackend::default()));
        backends.insert(AgentKind::Codex, Arc::new(CodexBackend::default()));
        backends.insert(
            AgentKind::Copilot,
            Arc::new(GenericBackend::new("copilot", vec!["--json".to_owned()])),
        );
        backends.insert(
            AgentKind::Cursor,
            Arc::new(GenericBackend::new("cursor-agent", vec!["--output-format".to_owned(), "stream-json".to_owned()])),
        );
        backends.insert(
            AgentKind::Gemini,
            Arc::new(GenericBackend::new("gemini", vec!["--output-format".to_owned(), "json".to_owned()])),
        );
        backends.insert(
            AgentKind::Opencode,
            Arc::new(GenericBackend::new("opencode", vec!["run".to_owned(), "--format".to_owned(), "json".to_owned()])),
        );
        Self { backends }
    }

    /// Look up the backend for `kind`.
    #[must_use]
    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn AgentBackend>> {
        self.backends.get(&kind).cloned()
    }

    /// Register or replace the backend for `kind` (used by tests to inject
    /// a scripted fake).
    pub fn insert(&mut self, kind: AgentKind, backend: Arc<dyn AgentBackend>) {
        self.backends.insert(kind, backend);
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::default_registry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_every_agent_kind() {
        let registry = AgentRegistry::default_registry();
        for kind in AgentKind::ALL {
            assert!(registry.get(kind).is_some(), "missing backend for {kind:?}");
        }
    }

    #[test]
    fn insert_overrides_existing_backend() {
        let mut registry = AgentRegistry::default_registry();
        registry.insert(AgentKind::ClaudeCode, Arc::new(GenericBackend::new("stub", vec![])));
        assert!(registry.get(AgentKind::ClaudeCode).is_some());
    }
}
