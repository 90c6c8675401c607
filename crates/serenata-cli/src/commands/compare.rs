use anyhow::Result;

use serenata_core::model::SongId;
use serenata_funnel::compare::split_ids;
use serenata_funnel::{ComparisonController, EntryQuery, EntrySources};

use crate::context::CliContext;

pub async fn run_compare(
    ctx: &CliContext,
    song_ids: Option<&str>,
    song_id: Option<&str>,
) -> Result<()> {
    let query = EntryQuery::from_ids(
        song_ids.map(split_ids).unwrap_or_default(),
        song_id.map(SongId::from),
    );
    let controller =
        ComparisonController::new(ctx.services.clone(), ctx.session.clone(), ctx.config.policy());

    let songs = controller
        .enter(EntrySources {
            handoff: None,
            query,
        })
        .await?;

    if let Some(source) = controller.source().await {
        log::info!("Songs recovered from {}", source);
    }

    let songs = if controller.is_waiting().await {
        println!("  ⏳ Waiting for a song that is still being written...");
        controller.wait_for_pending().await
    } else {
        songs
    };

    super::print_songs(&songs);
    println!("\nSelected: {:?}", controller.selection().await);
    Ok(())
}
