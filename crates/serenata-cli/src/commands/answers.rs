use anyhow::{Context, Result};
use std::path::Path;

use serenata_core::model::FormAnswers;
use serenata_funnel::AppState;

use crate::context::CliContext;

pub fn show(ctx: &CliContext) -> Result<()> {
    let state = AppState::restore(ctx.session.clone())?;
    let answers = state.answers();

    println!("{}", serde_json::to_string_pretty(answers)?);

    let missing = answers.missing_required();
    if !missing.is_empty() {
        let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
        println!("\nStill needed: {}", names.join(", "));
    } else if !answers.email_is_valid() {
        println!("\nThe email address does not look valid.");
    }
    if !answers.details_meets_minimum() {
        println!(
            "Tip: a few more details (at least {} characters) make a better song.",
            serenata_core::model::DETAILS_MIN_LEN
        );
    }
    Ok(())
}

pub fn set(ctx: &CliContext, field: &str, value: &str) -> Result<()> {
    let mut state = AppState::restore(ctx.session.clone())?;
    state.set_answer(field, value)?;
    println!("✓ {field} = {value}");
    Ok(())
}

pub fn import(ctx: &CliContext, path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let imported: FormAnswers = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse answers in {}", path.display()))?;

    let mut state = AppState::restore(ctx.session.clone())?;
    state.update_answers(|answers| *answers = imported)?;
    println!("✓ Imported answers from {}", path.display());
    Ok(())
}
