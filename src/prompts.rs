//! Instruction templates
//!
//! Each stage of the dialogue asks the backend for one reply, steered by a
//! system instruction appended after the running history. Templates are pure
//! string builders so the transition function stays free of I/O.

use crate::curriculum::UNIT_COUNT;
use crate::marker::{PASS_MARKER, STAY_MARKER};
use crate::state_machine::state::Unit;

pub fn greeting() -> String {
    "You are a friendly and warm AI learning assistant for the 'Skilvyn' platform. \
     Welcome the user warmly, introduce Skilvyn as an interactive learning platform powered by AI. \
     Ask them what name they'd like to be called. Be friendly and encouraging."
        .to_string()
}

pub fn ask_email(name: &str) -> String {
    format!(
        "The user said their name is '{name}'. \
         Thank them warmly and ask for their email address. Use their name in the conversation."
    )
}

pub fn ask_birth_date() -> String {
    "Ask the user warmly for their birth date in the format (YYYY-MM-DD).".to_string()
}

pub fn offer_topic(topic: &str) -> String {
    format!(
        "Tell the user that '{topic}' is the only skill available currently, \
         and that other skills will be added soon. Ask them if they want to start learning {topic}."
    )
}

pub fn ask_level(topic: &str) -> String {
    format!(
        "Ask the user to describe their current experience level in {topic} \
         (beginner/intermediate/advanced or a short sentence about themselves)."
    )
}

pub fn decline_topic() -> String {
    "Thank the user and tell them that other skills will be added soon.".to_string()
}

/// Ask for a JSON curriculum tailored to the stated level
pub fn synthesize_curriculum(topic: &str, level: &str) -> String {
    format!(
        "Design a learning path of exactly {UNIT_COUNT} units on {topic} for a learner who describes \
         their experience as: '{level}'. Respond with only a JSON array of {UNIT_COUNT} objects, \
         each with the string fields \"title\", \"objective\" and \"intro_text\". \
         Do not add any text before or after the array."
    )
}

pub fn welcome_unit(unit: &Unit) -> String {
    format!(
        "Welcome the user to the first unit: {}. {} Invite them to start learning and chatting.",
        unit.title, unit.intro_text
    )
}

/// Tutoring instruction. The reply must end with one of the progression
/// markers on its own line.
pub fn tutor(unit: &Unit) -> String {
    format!(
        "You are a specialized AI tutor. This is the unit: {}. Objective: {}. \
         Answer the user's question or continue the lesson interactively. \
         At the end of your response, on a new line, write {PASS_MARKER} if the user is ready \
         for the next unit, or {STAY_MARKER} if they should remain in this unit.",
        unit.title, unit.objective
    )
}

pub fn congratulate_next(unit: &Unit) -> String {
    format!(
        "Congratulate the user for completing the previous unit and welcome them to the next unit: \
         {}. {}",
        unit.title, unit.intro_text
    )
}

pub fn encourage(unit: &Unit) -> String {
    format!(
        "Encourage the user to keep going with the unit: {}. \
         Briefly suggest what to explore or practice next toward the objective: {}.",
        unit.title, unit.objective
    )
}

pub fn congratulate_completion() -> String {
    "Congratulate the user for successfully completing all units.".to_string()
}
