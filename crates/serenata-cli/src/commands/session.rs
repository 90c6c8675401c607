use anyhow::Result;

use serenata_funnel::AppState;

use crate::context::CliContext;

pub fn show(ctx: &CliContext) -> Result<()> {
    let record = ctx.session.load()?;

    println!("\n📋 Serenata Session\n");
    println!("  Version: {}", record.app_version);
    println!("  Page: {}", record.current_page);
    if let Some(saved_at) = record.saved_at {
        println!("  Saved: {}", saved_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("  Recipient: {}", blank_as_dash(&record.answers.recipient_name));
    println!("  Genre: {}", blank_as_dash(&record.answers.genre));

    let ids = ctx.session.comparison_ids()?;
    if !ids.is_empty() {
        let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        println!("  Comparing: {}", ids.join(", "));
    }
    if let Some(snapshot) = ctx.session.checkout_snapshot()? {
        println!("  Checkout choice: {}", serde_json::to_string(&snapshot)?);
    }
    if !record.songs.is_empty() {
        super::print_songs(&record.songs);
    }
    Ok(())
}

pub fn clear(ctx: &CliContext) -> Result<()> {
    let mut state = AppState::restore(ctx.session.clone())?;
    state.reset()?;
    println!("✓ Session cleared");
    Ok(())
}

fn blank_as_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}
