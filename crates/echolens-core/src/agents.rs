use std::collections::HashSet;

/// A reviewer persona. Defined at process start and never mutated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Agent {
    pub name: &'static str,
    pub persona: &'static str,
}

pub const ADVOCATE: Agent = Agent {
    name: "Advocate",
    persona: "You are The Advocate. Read the transcript as its most sympathetic audience would. \
              Identify the central claims, the evidence offered for each, and the framing that makes \
              them persuasive. Note where the speaker asserts rather than supports, but present the \
              strongest honest version of the argument. Be concise and use short paragraphs.",
};

pub const SKEPTIC: Agent = Agent {
    name: "Skeptic",
    persona: "You are The Skeptic. Read the transcript looking for confirmation bias. Call out \
              cherry-picked evidence, missing counter-evidence, loaded language, appeals to the \
              in-group, and claims that would not survive a hostile reader. Name the specific \
              passages you object to. Be concise and use short paragraphs.",
};

pub const SYNTHESIZER: Agent = Agent {
    name: "Synthesizer",
    persona: "You are The Synthesizer. Weigh the transcript as a neutral editor. Summarize which \
              perspectives are represented and which are absent, and judge how much the piece \
              reinforces a single viewpoint versus inviting disagreement. Suggest the strongest \
              counterpoints a balanced treatment would include. Be concise and use short paragraphs.",
};

/// The default reviewer roster, in report order.
pub const ROSTER: [Agent; 3] = [ADVOCATE, SKEPTIC, SYNTHESIZER];

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    #[error("roster must contain at least one agent")]
    Empty,
    #[error("agent name must not be empty")]
    EmptyName,
    #[error("duplicate agent name: {0}")]
    DuplicateName(&'static str),
    #[error("unknown agent: {0}")]
    UnknownName(String),
}

/// Ordered, non-empty set of agents with unique names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Roster {
    agents: Vec<Agent>,
}

impl Roster {
    pub fn new(agents: Vec<Agent>) -> Result<Self, RosterError> {
        if agents.is_empty() {
            return Err(RosterError::Empty);
        }
        let mut seen = HashSet::new();
        for agent in &agents {
            if agent.name.trim().is_empty() {
                return Err(RosterError::EmptyName);
            }
            if !seen.insert(agent.name) {
                return Err(RosterError::DuplicateName(agent.name));
            }
        }
        Ok(Self { agents })
    }

    /// Pick agents from [`ROSTER`] by name, in the order given.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, RosterError> {
        let agents = names
            .iter()
            .map(|name| {
                let name = name.as_ref().trim();
                ROSTER
                    .iter()
                    .find(|agent| agent.name.eq_ignore_ascii_case(name))
                    .copied()
                    .ok_or_else(|| RosterError::UnknownName(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(agents)
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.agents.iter().map(|a| a.name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            agents: ROSTER.to_vec(),
        }
    }
}

/// Per-invocation state for one agent's stream.
///
/// Owned by exactly one drain task; the text only grows and completion
/// only goes from false to true.
#[derive(Clone, Debug)]
pub struct AgentRun {
    agent: Agent,
    accumulated_text: String,
    chunk_count: usize,
    is_complete: bool,
}

impl AgentRun {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            accumulated_text: String::new(),
            chunk_count: 0,
            is_complete: false,
        }
    }

    pub fn agent(&self) -> Agent {
        self.agent
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn into_text(self) -> String {
        self.accumulated_text
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn push_chunk(&mut self, text: &str) {
        debug_assert!(!self.is_complete, "chunk after completion");
        self.accumulated_text.push_str(text);
        self.chunk_count += 1;
    }

    /// Returns `true` only on the first call.
    pub fn mark_complete(&mut self) -> bool {
        if self.is_complete {
            return false;
        }
        self.is_complete = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roster_order() {
        let roster = Roster::default();
        assert_eq!(roster.names(), vec!["Advocate", "Skeptic", "Synthesizer"]);
        assert_eq!(roster.len(), 3);
    }

    #[test]
    fn personas_are_distinct() {
        let personas: HashSet<_> = ROSTER.iter().map(|a| a.persona).collect();
        assert_eq!(personas.len(), ROSTER.len());
    }

    #[test]
    fn roster_rejects_empty_and_duplicates() {
        assert_eq!(Roster::new(vec![]), Err(RosterError::Empty));
        assert_eq!(
            Roster::new(vec![ADVOCATE, ADVOCATE]),
            Err(RosterError::DuplicateName("Advocate"))
        );
        let nameless = Agent { name: " ", persona: "x" };
        assert_eq!(Roster::new(vec![nameless]), Err(RosterError::EmptyName));
    }

    #[test]
    fn roster_from_names() {
        let roster = Roster::from_names(&["skeptic", "Advocate"]).unwrap();
        assert_eq!(roster.names(), vec!["Skeptic", "Advocate"]);

        assert_eq!(
            Roster::from_names(&["Advocate", "Critic"]),
            Err(RosterError::UnknownName("Critic".into()))
        );
        assert_eq!(
            Roster::from_names(&["Skeptic", "SKEPTIC"]),
            Err(RosterError::DuplicateName("Skeptic"))
        );
        assert_eq!(Roster::from_names::<&str>(&[]), Err(RosterError::Empty));
    }

    #[test]
    fn run_accumulates_in_order() {
        let mut run = AgentRun::new(SKEPTIC);
        run.push_chunk("first ");
        run.push_chunk("second");
        assert_eq!(run.accumulated_text(), "first second");
        assert_eq!(run.chunk_count(), 2);
        assert!(!run.is_complete());
    }

    #[test]
    fn completion_is_monotonic() {
        let mut run = AgentRun::new(ADVOCATE);
        assert!(run.mark_complete());
        assert!(!run.mark_complete());
        assert!(run.is_complete());
    }
}
