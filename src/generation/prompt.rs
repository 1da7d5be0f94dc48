//! Prompt text for session generation.
//!
//! Everything here is a pure function of its inputs so the same request always
//! produces the same prompt pair.

use std::fmt::Write;

use super::request::GenerationRequest;
use super::validator::{MAX_NAME_LEN, MAX_REASONS_LEN};
use crate::models::{CrossfitFormat, Intensity, Modality, Section, UserProfile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub struct PromptBuilder;

impl PromptBuilder {
    pub fn build(profile: &UserProfile, request: &GenerationRequest) -> Prompt {
        Prompt {
            system: Self::system_prompt(),
            user: Self::user_prompt(profile, request),
        }
    }

    pub fn system_prompt() -> String {
        let sections = join(Section::ALL.iter().map(Section::as_str));
        let types = join(Modality::ALL.iter().map(Modality::as_str));
        let intensities = join(Intensity::ALL.iter().map(Intensity::as_str));
        let formats = join(CrossfitFormat::ALL.iter().map(CrossfitFormat::as_str));

        format!(
            r#"You are an expert strength and conditioning coach. You design single training sessions as structured JSON.

OUTPUT FORMAT:
Return a JSON object with this exact structure:
{{
  "exercises": [ {{ "type": ..., "name": ..., "section": ..., <fields> }} ],
  "reasons": "Short explanation of the session design (max {MAX_REASONS_LEN} characters)"
}}

Every exercise object MUST contain ALL of these keys:
type, name, section, sets, reps, loadKg, rir, restSec, durationMin, intensity, distanceKm, rounds, workSec, modality, format, components, painCeiling, tempo

Fields that do not apply to the exercise type MUST be emitted as null. Never omit a key.

FIELDS PER TYPE:
- strength: sets (integer >= 1), reps (integer or [low, high]), loadKg (number >= 0), rir (0-5), restSec (integer seconds)
- cardio: durationMin (number > 0), intensity, distanceKm (number >= 0). At least one of durationMin or distanceKm MUST be non-null.
- hiit: rounds (integer >= 1), workSec (integer seconds), restSec (integer seconds), modality (short label such as "bike" or "bodyweight")
- crossfit: format, durationMin (number > 0), components (list of movement strings)
- rehab: sets (integer >= 1), reps (integer >= 1), painCeiling (0-3), tempo (short string such as "3-1-1")

ALLOWED VALUES (use ONLY these exact values):
- section: {sections}
- type: {types}
- intensity: {intensities}
- format: {formats}

RULES:
- Exercise names are at most {MAX_NAME_LEN} characters.
- Order exercises warmup first, then working, then cooldown.
- Respect injury flags; never prescribe movements that load an injured area.
- When a focus is given, EXCLUDE every exercise that does not train that body region or cardio type (warmup and cooldown included).

Respond ONLY with valid JSON, no additional text."#
        )
    }

    pub fn user_prompt(profile: &UserProfile, request: &GenerationRequest) -> String {
        let mut prompt = String::new();
        let goals = if profile.goals.trim().is_empty() {
            "general fitness"
        } else {
            profile.goals.as_str()
        };
        let injuries = profile.injury_flags.as_deref().unwrap_or("none");

        let _ = writeln!(prompt, "Design one training session for this athlete.");
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "USER PROFILE:");
        let _ = writeln!(prompt, "- Goals: {}", goals);
        let _ = writeln!(
            prompt,
            "- Experience Level: {}",
            profile.experience_level.as_str()
        );
        let _ = writeln!(prompt, "- Units: {}", profile.units.as_str());
        let _ = writeln!(prompt, "- Injury Flags: {}", injuries);
        if !profile.preferred_training_days.is_empty() {
            let _ = writeln!(
                prompt,
                "- Training Days: {}",
                profile.preferred_training_days.join(", ")
            );
        }

        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "SESSION:");
        let _ = writeln!(prompt, "- Modality: {}", request.modality.as_str());
        match request.effective_focus() {
            Some(focus) => {
                let _ = writeln!(prompt, "- Focus: {}", focus);
            }
            None => {
                let _ = writeln!(prompt, "- Focus: none");
            }
        }
        let _ = writeln!(
            prompt,
            "- Session Length: {} minutes",
            request.session_length_min
        );
        if let Some(day) = request.day {
            let _ = writeln!(prompt, "- Program Day: {}", day);
        }

        let constraints = &request.constraints;
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "CONSTRAINTS:");
        let _ = writeln!(
            prompt,
            "- Every exercise must have type \"{}\".",
            request.modality.as_str()
        );
        if let Some(focus) = request.effective_focus() {
            let _ = writeln!(
                prompt,
                "- Only include exercises that target \"{}\"; exclude anything outside that focus.",
                focus
            );
        }
        if let Some(count) = constraints.exercise_count {
            let _ = writeln!(prompt, "- Generate exactly {} exercise(s).", count);
        }
        if !constraints.exclude_exercises.is_empty() {
            let _ = writeln!(
                prompt,
                "- Do NOT use any of these exercises: {}",
                constraints.exclude_exercises.join(", ")
            );
        }
        if !constraints.equipment.is_empty() {
            let _ = writeln!(
                prompt,
                "- Available equipment: {}",
                constraints.equipment.join(", ")
            );
        }
        if let Some(notes) = constraints.notes.as_deref() {
            let _ = writeln!(prompt, "- Notes: {}", notes);
        }

        let _ = writeln!(prompt);
        let _ = write!(
            prompt,
            "Use null for every field that does not apply. Generate the session now."
        );
        prompt
    }
}

fn join<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values
        .map(|v| format!("\"{}\"", v))
        .collect::<Vec<_>>()
        .join(", ")
}
