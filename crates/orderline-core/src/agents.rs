use std::collections::HashMap;

use tracing::warn;

use crate::{models::Agent, phone::PhoneResolver};

/// Operators allowed to place orders over the chat channel, keyed by
/// normalized phone number.
///
/// Built once at startup. When two configured agents normalize to the same
/// number the later one owns the identity lookup, while the authorized list
/// keeps one entry per configured agent. Collisions are logged and available
/// through [`AgentDirectory::duplicates`].
#[derive(Clone)]
pub struct AgentDirectory {
    resolver: PhoneResolver,
    by_phone: HashMap<String, Agent>,
    authorized: Vec<String>,
    duplicates: Vec<String>,
}

impl AgentDirectory {
    pub fn new(agents: impl IntoIterator<Item = Agent>, resolver: PhoneResolver) -> Self {
        let mut by_phone = HashMap::new();
        let mut authorized = Vec::new();
        let mut duplicates = Vec::new();

        for agent in agents {
            let normalized = resolver.normalize(&agent.phone_number);
            authorized.push(normalized.clone());

            if let Some(previous) = by_phone.insert(normalized.clone(), agent) {
                warn!(
                    "agent {} shares number {normalized} with a later entry and is shadowed",
                    previous.name
                );
                duplicates.push(normalized);
            }
        }

        Self {
            resolver,
            by_phone,
            authorized,
            duplicates,
        }
    }

    pub fn lookup(&self, phone: &str) -> Option<&Agent> {
        self.by_phone.get(&self.resolver.normalize(phone))
    }

    pub fn is_authorized(&self, phone: &str) -> bool {
        let normalized = self.resolver.normalize(phone);
        self.authorized.iter().any(|number| *number == normalized)
    }

    /// Matched agent's name, or `"Agent <phone>"` with the phone exactly as
    /// given.
    pub fn display_name(&self, phone: &str) -> String {
        self.lookup(phone)
            .map(|agent| agent.name.clone())
            .unwrap_or_else(|| format!("Agent {phone}"))
    }

    /// Normalized numbers, one per configured agent, in configuration order.
    pub fn authorized_numbers(&self) -> &[String] {
        &self.authorized
    }

    /// Numbers that more than one configured agent normalized to.
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.by_phone.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_phone.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(phone: &str, name: &str) -> Agent {
        Agent {
            phone_number: phone.to_string(),
            name: name.to_string(),
        }
    }

    fn directory(agents: Vec<Agent>) -> AgentDirectory {
        AgentDirectory::new(agents, PhoneResolver::default())
    }

    #[test]
    fn lookup_normalizes_input() {
        let dir = directory(vec![agent("012-345 6789", "Aisyah"), agent("+65 9123 4567", "Wei Ling")]);

        assert_eq!(dir.lookup("+60123456789").map(|a| a.name.as_str()), Some("Aisyah"));
        assert_eq!(dir.lookup("91234567").map(|a| a.name.as_str()), Some("Wei Ling"));
        assert!(dir.is_authorized("0123456789"));
        assert!(dir.is_authorized("6591234567"));
    }

    #[test]
    fn unknown_phone_has_placeholder_name() {
        let dir = directory(vec![agent("0123456789", "Aisyah")]);

        assert!(dir.lookup("0199999999").is_none());
        assert!(!dir.is_authorized("0199999999"));
        assert_eq!(dir.display_name("0199999999"), "Agent 0199999999");
        assert_eq!(dir.display_name("+60 12-345 6789"), "Aisyah");
    }

    #[test]
    fn colliding_numbers_keep_last_identity_and_every_authorization() {
        let dir = directory(vec![
            agent("0123456789", "First"),
            agent("+60 12-345 6789", "Second"),
        ]);

        assert_eq!(dir.lookup("0123456789").map(|a| a.name.as_str()), Some("Second"));
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.authorized_numbers().len(), 2);
        assert_eq!(dir.duplicates(), ["60123456789".to_string()]);
    }

    #[test]
    fn empty_directory_authorizes_nobody() {
        let dir = directory(Vec::new());
        assert!(dir.is_empty());
        assert!(!dir.is_authorized("0123456789"));
    }
}
