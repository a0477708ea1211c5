//! Built-in personas: named system-prompt presets.

use serde::Serialize;

use crate::message::ChatMessage;

pub const DEFAULT_PERSONA: &str = "general";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Persona {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub system_prompt: &'static str,
}

pub const PERSONAS: &[Persona] = &[
    Persona {
        id: "general",
        name: "General Assistant",
        description: "Helpful, harmless, and honest AI assistant",
        system_prompt: "You are a helpful, harmless, and honest AI assistant.",
    },
    Persona {
        id: "coder",
        name: "CoderGPT",
        description: "Expert programmer and code reviewer",
        system_prompt:
            "You are an expert programmer. Provide clean, efficient code with explanations.",
    },
    Persona {
        id: "researcher",
        name: "ResearcherGPT",
        description: "Academic researcher and analyst",
        system_prompt:
            "You are an academic researcher. Provide thorough analysis with citations.",
    },
    Persona {
        id: "creative",
        name: "CreativeGPT",
        description: "Creative writer and storyteller",
        system_prompt:
            "You are a creative writer. Help with storytelling, brainstorming, and creative tasks.",
    },
];

impl Persona {
    /// Exact lookup by id.
    pub fn get(id: &str) -> Option<&'static Persona> {
        PERSONAS.iter().find(|p| p.id == id)
    }

    /// Lookup by id, falling back to the general assistant.
    pub fn resolve(id: &str) -> &'static Persona {
        Self::get(id).unwrap_or(&PERSONAS[0])
    }

    pub fn system_message(&self) -> ChatMessage {
        ChatMessage::system(self.system_prompt)
    }
}
