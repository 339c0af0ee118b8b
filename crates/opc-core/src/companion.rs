//! Companion creation wizard.
//!
//! A linear four-step form held entirely in memory. `next_step` only
//! advances when the current step validates; `prev_step` always succeeds.
//! `submit` hands a flattened [`CompanionSubmission`] to the caller's
//! callback and performs no I/O itself.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub const NAME_MAX_CHARS: usize = 30;
pub const AGE_MIN: u32 = 18;
pub const AGE_MAX: u32 = 120;
pub const HOBBIES_MAX: usize = 10;
pub const VOICE_FACTOR_MIN: f32 = 0.5;
pub const VOICE_FACTOR_MAX: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum WizardStep {
    #[default]
    Profile,
    Personality,
    Appearance,
    Voice,
}

impl WizardStep {
    pub const ALL: [WizardStep; 4] = [
        WizardStep::Profile,
        WizardStep::Personality,
        WizardStep::Appearance,
        WizardStep::Voice,
    ];

    pub fn number(self) -> u8 {
        match self {
            WizardStep::Profile => 1,
            WizardStep::Personality => 2,
            WizardStep::Appearance => 3,
            WizardStep::Voice => 4,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            WizardStep::Profile => "Profile",
            WizardStep::Personality => "Personality",
            WizardStep::Appearance => "Appearance",
            WizardStep::Voice => "Voice",
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            WizardStep::Profile => Some(WizardStep::Personality),
            WizardStep::Personality => Some(WizardStep::Appearance),
            WizardStep::Appearance => Some(WizardStep::Voice),
            WizardStep::Voice => None,
        }
    }

    pub fn prev(self) -> Option<Self> {
        match self {
            WizardStep::Profile => None,
            WizardStep::Personality => Some(WizardStep::Profile),
            WizardStep::Appearance => Some(WizardStep::Personality),
            WizardStep::Voice => Some(WizardStep::Appearance),
        }
    }

    pub fn fields(self) -> &'static [Field] {
        match self {
            WizardStep::Profile => &[Field::Name, Field::Age, Field::Gender],
            WizardStep::Personality => &[
                Field::Personality,
                Field::Traits,
                Field::Hobbies,
                Field::SpeakingStyle,
            ],
            WizardStep::Appearance => &[
                Field::HairStyle,
                Field::HairColor,
                Field::EyeColor,
                Field::Outfit,
            ],
            WizardStep::Voice => &[Field::VoiceType, Field::VoicePitch, Field::VoiceSpeed],
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/4 {}", self.number(), self.title())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Name,
    Age,
    Gender,
    Personality,
    Traits,
    Hobbies,
    SpeakingStyle,
    HairStyle,
    HairColor,
    EyeColor,
    Outfit,
    VoiceType,
    VoicePitch,
    VoiceSpeed,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Age => "age",
            Field::Gender => "gender",
            Field::Personality => "personality",
            Field::Traits => "traits",
            Field::Hobbies => "hobbies",
            Field::SpeakingStyle => "speaking_style",
            Field::HairStyle => "hair_style",
            Field::HairColor => "hair_color",
            Field::EyeColor => "eye_color",
            Field::Outfit => "outfit",
            Field::VoiceType => "voice_type",
            Field::VoicePitch => "voice_pitch",
            Field::VoiceSpeed => "voice_speed",
        }
    }

    pub fn is_list(self) -> bool {
        matches!(self, Field::Hobbies | Field::Traits)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompanionDraft {
    pub name: String,
    pub age: Option<u32>,
    pub gender: String,
    pub personality: String,
    pub traits: Vec<String>,
    pub hobbies: Vec<String>,
    pub speaking_style: String,
    pub hair_style: String,
    pub hair_color: String,
    pub eye_color: String,
    pub outfit: String,
    pub voice_type: String,
    pub voice_pitch: f32,
    pub voice_speed: f32,
}

impl Default for CompanionDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            age: None,
            gender: String::new(),
            personality: String::new(),
            traits: Vec::new(),
            hobbies: Vec::new(),
            speaking_style: String::new(),
            hair_style: String::new(),
            hair_color: String::new(),
            eye_color: String::new(),
            outfit: String::new(),
            voice_type: String::new(),
            voice_pitch: 1.0,
            voice_speed: 1.0,
        }
    }
}

impl CompanionDraft {
    /// Sets a field from user text. List fields take comma-separated values.
    pub fn set(&mut self, field: Field, raw: &str) -> Result<(), String> {
        let value = raw.trim();
        match field {
            Field::Name => self.name = value.to_string(),
            Field::Age => {
                self.age = if value.is_empty() {
                    None
                } else {
                    let age = value
                        .parse::<u32>()
                        .map_err(|_| "age must be a whole number".to_string())?;
                    Some(age)
                };
            }
            Field::Gender => self.gender = value.to_string(),
            Field::Personality => self.personality = value.to_string(),
            Field::Traits => self.traits = split_list(value),
            Field::Hobbies => self.hobbies = split_list(value),
            Field::SpeakingStyle => self.speaking_style = value.to_string(),
            Field::HairStyle => self.hair_style = value.to_string(),
            Field::HairColor => self.hair_color = value.to_string(),
            Field::EyeColor => self.eye_color = value.to_string(),
            Field::Outfit => self.outfit = value.to_string(),
            Field::VoiceType => self.voice_type = value.to_string(),
            Field::VoicePitch => self.voice_pitch = parse_factor(value, self.voice_pitch)?,
            Field::VoiceSpeed => self.voice_speed = parse_factor(value, self.voice_speed)?,
        }
        Ok(())
    }

    pub fn validate_step(&self, step: WizardStep) -> BTreeMap<Field, String> {
        let mut errors = BTreeMap::new();
        match step {
            WizardStep::Profile => {
                if self.name.trim().is_empty() {
                    errors.insert(Field::Name, "name is required".to_string());
                } else if self.name.trim().chars().count() > NAME_MAX_CHARS {
                    errors.insert(
                        Field::Name,
                        format!("name must be at most {NAME_MAX_CHARS} characters"),
                    );
                }
                match self.age {
                    None => {
                        errors.insert(Field::Age, "age is required".to_string());
                    }
                    Some(age) if !(AGE_MIN..=AGE_MAX).contains(&age) => {
                        errors.insert(
                            Field::Age,
                            format!("age must be between {AGE_MIN} and {AGE_MAX}"),
                        );
                    }
                    Some(_) => {}
                }
                if self.gender.trim().is_empty() {
                    errors.insert(Field::Gender, "gender is required".to_string());
                }
            }
            WizardStep::Personality => {
                if self.personality.trim().is_empty() {
                    errors.insert(Field::Personality, "personality is required".to_string());
                }
                if self.hobbies.is_empty() {
                    errors.insert(Field::Hobbies, "choose at least one hobby".to_string());
                } else if self.hobbies.len() > HOBBIES_MAX {
                    errors.insert(
                        Field::Hobbies,
                        format!("choose at most {HOBBIES_MAX} hobbies"),
                    );
                }
            }
            WizardStep::Appearance => {
                for (field, value) in [
                    (Field::HairStyle, &self.hair_style),
                    (Field::HairColor, &self.hair_color),
                    (Field::EyeColor, &self.eye_color),
                ] {
                    if value.trim().is_empty() {
                        let label = field.as_str().replace('_', " ");
                        errors.insert(field, format!("{label} is required"));
                    }
                }
            }
            WizardStep::Voice => {
                if self.voice_type.trim().is_empty() {
                    errors.insert(Field::VoiceType, "voice type is required".to_string());
                }
                for (field, value) in [
                    (Field::VoicePitch, self.voice_pitch),
                    (Field::VoiceSpeed, self.voice_speed),
                ] {
                    if !(VOICE_FACTOR_MIN..=VOICE_FACTOR_MAX).contains(&value) {
                        errors.insert(
                            field,
                            format!(
                                "{} must be between {VOICE_FACTOR_MIN} and {VOICE_FACTOR_MAX}",
                                field.as_str().replace('_', " ")
                            ),
                        );
                    }
                }
            }
        }
        errors
    }

    pub fn appearance_preview(&self) -> String {
        let mut parts = Vec::new();
        match (self.hair_style.trim(), self.hair_color.trim()) {
            ("", "") => {}
            (style, "") => parts.push(format!("{style} hair")),
            ("", color) => parts.push(format!("{color} hair")),
            (style, color) => parts.push(format!("{style} {color} hair")),
        }
        if !self.eye_color.trim().is_empty() {
            parts.push(format!("{} eyes", self.eye_color.trim()));
        }
        if !self.outfit.trim().is_empty() {
            parts.push(format!("wearing {}", self.outfit.trim()));
        }
        if parts.is_empty() {
            "no appearance chosen yet".to_string()
        } else {
            parts.join(", ")
        }
    }

    pub fn voice_preview(&self) -> String {
        let voice = if self.voice_type.trim().is_empty() {
            "default"
        } else {
            self.voice_type.trim()
        };
        format!(
            "{voice} voice, pitch {:.1}x, speed {:.1}x",
            self.voice_pitch, self.voice_speed
        )
    }

    /// Prompt text for the image generator preview.
    pub fn image_prompt(&self) -> String {
        let mut subject = String::from("portrait of");
        if !self.name.trim().is_empty() {
            subject.push(' ');
            subject.push_str(self.name.trim());
        } else {
            subject.push_str(" a companion");
        }
        let mut parts = vec![subject];
        match (self.age, self.gender.trim()) {
            (Some(age), "") => parts.push(format!("{age} years old")),
            (Some(age), gender) => parts.push(format!("{age}-year-old {gender}")),
            (None, "") => {}
            (None, gender) => parts.push(gender.to_string()),
        }
        let appearance = self.appearance_preview();
        if !self.hair_style.trim().is_empty()
            || !self.hair_color.trim().is_empty()
            || !self.eye_color.trim().is_empty()
            || !self.outfit.trim().is_empty()
        {
            parts.push(appearance);
        }
        if !self.personality.trim().is_empty() {
            parts.push(format!("{} expression", self.personality.trim()));
        }
        parts.join(", ")
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split([',', '、'])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_factor(value: &str, current: f32) -> Result<f32, String> {
    if value.is_empty() {
        return Ok(current);
    }
    value
        .parse::<f32>()
        .map_err(|_| format!("'{value}' is not a number"))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompanionSubmission {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub personality: String,
    pub traits: String,
    pub hobbies: String,
    pub speaking_style: String,
    pub hair_style: String,
    pub hair_color: String,
    pub eye_color: String,
    pub outfit: String,
    pub voice_type: String,
    pub voice_pitch: f32,
    pub voice_speed: f32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WizardError {
    #[error("submit is only available on the last step (currently on {step})")]
    NotAtFinalStep { step: WizardStep },
    #[error("step {step} has invalid fields: {}", join_fields(.fields))]
    Invalid { step: WizardStep, fields: Vec<Field> },
}

fn join_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|field| field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Default)]
pub struct CompanionWizard {
    step: WizardStep,
    draft: CompanionDraft,
    errors: BTreeMap<Field, String>,
}

impl CompanionWizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &CompanionDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut CompanionDraft {
        &mut self.draft
    }

    pub fn errors(&self) -> &BTreeMap<Field, String> {
        &self.errors
    }

    pub fn is_last_step(&self) -> bool {
        self.step().next().is_none()
    }

    /// Advances when the current step validates. Returns whether the step changed.
    pub fn next_step(&mut self) -> bool {
        let current = self.step();
        let errors = self.draft.validate_step(current);
        if !errors.is_empty() {
            self.errors = errors;
            return false;
        }
        self.errors.clear();
        match current.next() {
            Some(next) => {
                self.step = next;
                true
            }
            None => false,
        }
    }

    pub fn prev_step(&mut self) {
        self.errors.clear();
        if let Some(prev) = self.step().prev() {
            self.step = prev;
        }
    }

    /// Validates every step and passes the flattened submission to `on_submit`.
    ///
    /// When an earlier step no longer validates, the wizard moves back to it
    /// with its errors populated.
    pub fn submit<T, F>(&mut self, on_submit: F) -> Result<T, WizardError>
    where
        F: FnOnce(CompanionSubmission) -> T,
    {
        let current = self.step();
        if !self.is_last_step() {
            return Err(WizardError::NotAtFinalStep { step: current });
        }
        for step in WizardStep::ALL {
            let errors = self.draft.validate_step(step);
            if !errors.is_empty() {
                let fields = errors.keys().copied().collect();
                self.errors = errors;
                self.step = step;
                return Err(WizardError::Invalid { step, fields });
            }
        }
        self.errors.clear();
        Ok(on_submit(self.build_submission()))
    }

    fn build_submission(&self) -> CompanionSubmission {
        let draft = &self.draft;
        CompanionSubmission {
            name: draft.name.trim().to_string(),
            age: draft.age.unwrap_or_default(),
            gender: draft.gender.trim().to_string(),
            personality: draft.personality.trim().to_string(),
            traits: draft.traits.join(","),
            hobbies: draft.hobbies.join(","),
            speaking_style: draft.speaking_style.trim().to_string(),
            hair_style: draft.hair_style.trim().to_string(),
            hair_color: draft.hair_color.trim().to_string(),
            eye_color: draft.eye_color.trim().to_string(),
            outfit: draft.outfit.trim().to_string(),
            voice_type: draft.voice_type.trim().to_string(),
            voice_pitch: draft.voice_pitch,
            voice_speed: draft.voice_speed,
        }
    }
}
