//! Progression markers embedded in tutoring replies
//!
//! The tutoring instruction asks the model to finish with one of two literal
//! tokens on its own line. Parsing is a plain substring test and never fails:
//! a reply without a marker means the learner stays in the current unit.

/// The learner is ready for the next unit
pub const PASS_MARKER: &str = "[status:pass]";
/// The learner should remain in the current unit
pub const STAY_MARKER: &str = "[status:stay]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitVerdict {
    Pass,
    Stay,
}

/// Read the verdict from a tutoring reply.
///
/// When both markers appear the one closest to the end wins, since the
/// instruction asks for the marker as the final line.
pub fn parse_verdict(reply: &str) -> UnitVerdict {
    match (reply.rfind(PASS_MARKER), reply.rfind(STAY_MARKER)) {
        (Some(pass), Some(stay)) if stay > pass => UnitVerdict::Stay,
        (Some(_), _) => UnitVerdict::Pass,
        _ => UnitVerdict::Stay,
    }
}

/// Remove markers for display
pub fn strip_markers(reply: &str) -> String {
    reply
        .replace(PASS_MARKER, "")
        .replace(STAY_MARKER, "")
        .trim_end()
        .to_string()
}
