use opc_core::companion::{CompanionDraft, CompanionSubmission, CompanionWizard, Field, WizardStep};
use std::io::{self, BufRead, Write};

const BACK: &str = "<";

enum Prompt {
    Done,
    Back,
    Eof,
}

/// Runs the companion wizard over line-oriented input.
///
/// An empty line keeps the current value and `<` returns to the previous
/// step. Returns `None` when input ends before the wizard is submitted.
pub fn run_wizard<R: BufRead, W: Write>(
    mut input: R,
    out: &mut W,
) -> io::Result<Option<CompanionSubmission>> {
    let mut wizard = CompanionWizard::new();
    writeln!(
        out,
        "Create a companion. Enter keeps the current value, '{BACK}' goes back a step."
    )?;
    loop {
        let step = wizard.step();
        writeln!(out, "\n[{step}]")?;

        let mut went_back = false;
        for field in step.fields() {
            match prompt_field(&mut input, out, wizard.draft_mut(), *field)? {
                Prompt::Done => {}
                Prompt::Back => {
                    went_back = true;
                    break;
                }
                Prompt::Eof => return Ok(None),
            }
        }
        if went_back {
            wizard.prev_step();
            continue;
        }

        match step {
            WizardStep::Appearance => {
                writeln!(out, "  appearance: {}", wizard.draft().appearance_preview())?;
                writeln!(out, "  image prompt: {}", wizard.draft().image_prompt())?;
            }
            WizardStep::Voice => {
                writeln!(out, "  voice: {}", wizard.draft().voice_preview())?;
            }
            _ => {}
        }

        if wizard.is_last_step() {
            match wizard.submit(|submission| submission) {
                Ok(submission) => return Ok(Some(submission)),
                Err(err) => {
                    writeln!(out, "  {err}")?;
                    write_errors(out, &wizard)?;
                }
            }
        } else if !wizard.next_step() {
            write_errors(out, &wizard)?;
        }
    }
}

fn prompt_field<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    draft: &mut CompanionDraft,
    field: Field,
) -> io::Result<Prompt> {
    let label = field.as_str().replace('_', " ");
    let hint = if field.is_list() { " (comma separated)" } else { "" };
    loop {
        write!(out, "  {label}{hint} [{}]: ", current_value(draft, field))?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            return Ok(Prompt::Eof);
        }
        let line = line.trim();
        if line == BACK {
            return Ok(Prompt::Back);
        }
        if line.is_empty() {
            return Ok(Prompt::Done);
        }
        match draft.set(field, line) {
            Ok(()) => return Ok(Prompt::Done),
            Err(err) => writeln!(out, "  ! {err}")?,
        }
    }
}

fn write_errors<W: Write>(out: &mut W, wizard: &CompanionWizard) -> io::Result<()> {
    for (field, err) in wizard.errors() {
        writeln!(out, "  ! {field}: {err}")?;
    }
    Ok(())
}

fn current_value(draft: &CompanionDraft, field: Field) -> String {
    match field {
        Field::Name => draft.name.clone(),
        Field::Age => draft.age.map(|age| age.to_string()).unwrap_or_default(),
        Field::Gender => draft.gender.clone(),
        Field::Personality => draft.personality.clone(),
        Field::Traits => draft.traits.join(","),
        Field::Hobbies => draft.hobbies.join(","),
        Field::SpeakingStyle => draft.speaking_style.clone(),
        Field::HairStyle => draft.hair_style.clone(),
        Field::HairColor => draft.hair_color.clone(),
        Field::EyeColor => draft.eye_color.clone(),
        Field::Outfit => draft.outfit.clone(),
        Field::VoiceType => draft.voice_type.clone(),
        Field::VoicePitch => format!("{:.1}", draft.voice_pitch),
        Field::VoiceSpeed => format!("{:.1}", draft.voice_speed),
    }
}
