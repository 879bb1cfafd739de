//! Entity type → agent profile mapping and instruction resolution.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::entity::WorkflowEntity;

/// Built-in agent types. Anything else falls through to [`AgentType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentType {
    Lead,
    Dialogue,
    Art,
    Lore,
    Critic,
    Reporter,
    Innovator,
    Custom(String),
}

/// Default name, role and instructions for an agent type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentProfile {
    pub name: String,
    pub role: String,
    pub instructions: String,
}

impl AgentProfile {
    fn new(name: &str, role: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            role: role.to_string(),
            instructions: instructions.to_string(),
        }
    }
}

impl AgentType {
    /// Case-insensitive lookup of an entity's `type` tag.
    pub fn parse(tag: &str) -> Self {
        let normalized = tag.trim().to_lowercase();
        match normalized.as_str() {
            "lead" => Self::Lead,
            "dialogue" => Self::Dialogue,
            "art" => Self::Art,
            "lore" => Self::Lore,
            "critic" => Self::Critic,
            "reporter" => Self::Reporter,
            "innovator" => Self::Innovator,
            _ => Self::Custom(normalized),
        }
    }

    pub fn profile(&self) -> AgentProfile {
        match self {
            Self::Lead => AgentProfile::new(
                "Narrative Lead Agent",
                "Develops the overarching story, worldbuilding, and tone.",
                "You are the narrative lead who develops the overarching story.",
            ),
            Self::Dialogue => AgentProfile::new(
                "Dialogue Writer Agent",
                "Creates character-driven dialogue and interactions.",
                "You are a dialogue writer who creates character-driven conversations.",
            ),
            Self::Art => AgentProfile::new(
                "Art Style Director Agent",
                "Translates narrative elements into visual prompts.",
                "You are an art director who creates visual imagery from narrative.",
            ),
            Self::Lore => AgentProfile::new(
                "Lore Master Agent",
                "Ensures internal consistency in worldbuilding and character arcs.",
                "You are a lore master who maintains consistency in the story world.",
            ),
            Self::Critic => AgentProfile::new(
                "Critic Agent",
                "Reviews outputs for coherence, tone, engagement.",
                "You are a critic who reviews and improves narrative quality.",
            ),
            Self::Reporter => AgentProfile::new(
                "Reporter Agent",
                "Summarizes progress and prepares reports.",
                "You are a reporter who summarizes information clearly and concisely.",
            ),
            Self::Innovator => AgentProfile::new(
                "Innovator Agent",
                "Generates new ideas and concepts based on the narrative.",
                "You are an innovator who generates creative and novel ideas.",
            ),
            Self::Custom(tag) => AgentProfile {
                name: format!("{} Agent", title_case(tag)),
                role: format!("Processes content as a {}", tag),
                instructions: format!("You are a {} agent.", tag),
            },
        }
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper_next = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if upper_next {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            upper_next = false;
        } else {
            out.push(c);
            upper_next = true;
        }
    }
    out
}

/// Caller-supplied instructions that take precedence over entity prompts.
///
/// Accepts either a list (one shared instruction block for every entity,
/// joined by newlines) or a map keyed by entity id or external id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum InstructionOverrides {
    Shared(Vec<String>),
    PerEntity(HashMap<String, String>),
}

impl InstructionOverrides {
    pub fn for_entity(&self, entity: &WorkflowEntity) -> Option<String> {
        match self {
            Self::Shared(lines) => {
                let joined = lines.join("\n");
                (!joined.trim().is_empty()).then_some(joined)
            }
            Self::PerEntity(map) => map
                .get(&entity.id)
                .or_else(|| map.get(&entity.external_id))
                .filter(|s| !s.trim().is_empty())
                .cloned(),
        }
    }
}

/// Name, role and instructions an entity runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAgent {
    pub name: String,
    pub role: String,
    pub instructions: String,
}

/// Resolve what an entity runs as.
///
/// Instructions: `instructions_override`, then `entity.prompt`, then the
/// type's default. Name: `entity.label`, then the type's default.
pub fn resolve_agent(entity: &WorkflowEntity, instructions_override: Option<&str>) -> ResolvedAgent {
    let profile = AgentType::parse(&entity.entity_type).profile();
    let non_empty = |s: &&str| !s.trim().is_empty();

    let instructions = instructions_override
        .filter(non_empty)
        .or(entity.prompt.as_deref().filter(non_empty))
        .map(|s| s.to_string())
        .unwrap_or(profile.instructions);

    let name = entity
        .label
        .as_deref()
        .filter(non_empty)
        .map(|s| s.to_string())
        .unwrap_or(profile.name);

    ResolvedAgent {
        name,
        role: profile.role,
        instructions,
    }
}
