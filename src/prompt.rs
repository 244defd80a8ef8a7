//! Interviewer prompts
//!
//! Instructions sent to the remote agent at setup, the opening greeting
//! request and the silence check-in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::config::SessionSetup;

/// Interview language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    Spanish,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::English => write!(f, "English"),
            Self::Spanish => write!(f, "Spanish"),
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "english" | "en" => Ok(Self::English),
            "spanish" | "es" | "español" => Ok(Self::Spanish),
            other => Err(Error::Config(format!("unsupported language: {other}"))),
        }
    }
}

/// Grading rigor of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Mock interview, coaching tone
    #[default]
    Student,
    /// Strict audit
    Professional,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Student => write!(f, "student"),
            Self::Professional => write!(f, "professional"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "professional" => Ok(Self::Professional),
            other => Err(Error::Config(format!("unknown difficulty: {other}"))),
        }
    }
}

/// Interviewer name used when none is configured
pub const DEFAULT_INTERVIEWER: &str = "Alex";

/// Prebuilt voice used when none is configured
pub const DEFAULT_VOICE: &str = "Charon";

const NUDGE_EN: &str = "[SYSTEM: The candidate has been silent for a while. Please friendly-ly check if they understood the question, if they need you to repeat it, or if they'd like you to rephrase it in a different way. Maintain a supportive tone.]";

const NUDGE_ES: &str = "[SISTEMA: El candidato no ha respondido. Por favor, pregunta amablemente si entendieron la pregunta, si necesitan que la repitas o si prefieren que la reformules de otra manera. Mantén un tono de apoyo.]";

/// Hidden check-in sent when the candidate stays silent
#[must_use]
pub const fn nudge_prompt(language: Language) -> &'static str {
    match language {
        Language::English => NUDGE_EN,
        Language::Spanish => NUDGE_ES,
    }
}

fn interviewer_title(setup: &SessionSetup) -> &'static str {
    let is_default = setup.interviewer_name == DEFAULT_INTERVIEWER;
    match (setup.language, is_default) {
        (Language::English, true) => "senior recruiter",
        (Language::English, false) => "talent acquisition manager",
        (Language::Spanish, true) => "un reclutador senior",
        (Language::Spanish, false) => "una gerente de adquisición de talento",
    }
}

/// Request for the agent to open the interview
#[must_use]
pub fn greeting_prompt(setup: &SessionSetup) -> String {
    let title = interviewer_title(setup);
    match setup.language {
        Language::English => format!(
            "The candidate, {name}, has just entered the room. Please welcome them warmly by \
             their full name in ENGLISH, introduce yourself as {interviewer}, a {title} at \
             {company}. Then, ask them how they would prefer to be addressed during this interview.",
            name = setup.candidate_name,
            interviewer = setup.interviewer_name,
            company = setup.company,
        ),
        Language::Spanish => format!(
            "El candidato, {name}, acaba de entrar a la sala. Por favor, dale la bienvenida \
             calurosamente por su nombre completo en ESPAÑOL, preséntate como {interviewer}, \
             {title} en {company}. Luego, pregúntale cómo prefiere que le llames durante la entrevista.",
            name = setup.candidate_name,
            interviewer = setup.interviewer_name,
            company = setup.company,
        ),
    }
}

/// Standing instructions for the interviewer persona
#[must_use]
pub fn system_instructions(setup: &SessionSetup) -> String {
    let role = if setup.interviewer_name == DEFAULT_INTERVIEWER {
        "senior recruiter"
    } else {
        "talent acquisition manager"
    };
    let language = setup.language;

    format!(
        "You are {interviewer}, a professional {role} at {company} conducting an entry-level interview.\n\
         \n\
         LANGUAGE: Conduct this entire interview in {language}.\n\
         FIELD: {field}\n\
         CANDIDATE: {name}, {experience}.\n\
         ROLE: {job}.\n\
         \n\
         Always sound alert, professional, supportive, and clear in {language}.\n\
         \n\
         CRITICAL BEHAVIOR:\n\
         - Welcome the candidate by their FULL NAME initially: {name}.\n\
         - IMMEDIATELY after welcoming them, ask how they would prefer to be addressed.\n\
         - Once they provide a preference, use ONLY that preferred name for the rest of the interview.\n\
         - BARGE-IN HANDLING: If the candidate starts speaking while you are talking, stop talking immediately and wait for them to finish.\n\
         - Do not rush. Speak naturally and ask one question at a time.\n\
         - SILENCE HANDLING: If you receive a hidden [SYSTEM] nudge about silence, check in with the candidate warmly. \
         Ask if they understood the question, or if you should repeat or rephrase it.",
        interviewer = setup.interviewer_name,
        company = setup.company,
        field = setup.career_field,
        name = setup.candidate_name,
        experience = setup.experience,
        job = setup.job_title,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> SessionSetup {
        SessionSetup {
            candidate_name: "Jordan Rivera".to_string(),
            company: "Acme Robotics".to_string(),
            ..SessionSetup::default()
        }
    }

    #[test]
    fn nudge_follows_language() {
        assert!(nudge_prompt(Language::English).starts_with("[SYSTEM:"));
        assert!(nudge_prompt(Language::Spanish).starts_with("[SISTEMA:"));
    }

    #[test]
    fn greeting_names_candidate_and_interviewer() {
        let greeting = greeting_prompt(&setup());
        assert!(greeting.contains("Jordan Rivera"));
        assert!(greeting.contains("introduce yourself as Alex, a senior recruiter at Acme Robotics"));
    }

    #[test]
    fn custom_interviewer_gets_other_title() {
        let setup = SessionSetup {
            interviewer_name: "Maria".to_string(),
            language: Language::Spanish,
            ..setup()
        };
        let greeting = greeting_prompt(&setup);
        assert!(greeting.contains("preséntate como Maria, una gerente de adquisición de talento"));
        assert!(system_instructions(&setup).contains("talent acquisition manager"));
    }

    #[test]
    fn parses_language_and_difficulty() {
        assert_eq!("Spanish".parse::<Language>().unwrap(), Language::Spanish);
        assert_eq!("es".parse::<Language>().unwrap(), Language::Spanish);
        assert!("klingon".parse::<Language>().is_err());
        assert_eq!(
            "Professional".parse::<Difficulty>().unwrap(),
            Difficulty::Professional
        );
    }
}
