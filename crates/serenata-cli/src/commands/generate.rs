use anyhow::Result;

use serenata_funnel::{
    AppState, ComparisonController, EntryQuery, EntrySources, FunnelMode, GenerationOrchestrator,
    RunPhase,
};

use crate::context::CliContext;

pub async fn run_generate(ctx: &CliContext, mode: Option<&str>) -> Result<()> {
    let mode = match mode {
        Some(mode) => mode.parse::<FunnelMode>()?,
        None => ctx.config.funnel_variant,
    };
    let policy = ctx.config.policy();
    let mut state = AppState::restore(ctx.session.clone())?;
    let orchestrator = GenerationOrchestrator::new(&ctx.services, policy, mode);

    let mut phases = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        while phases.changed().await.is_ok() {
            let phase = *phases.borrow_and_update();
            if let Some(label) = describe(phase) {
                println!("  ⏳ {label}");
            }
            if phase.is_finished() {
                break;
            }
        }
    });

    println!("Generating your songs ({mode} mode)...");
    let result = tokio::select! {
        result = orchestrator.run(&mut state) => result,
        _ = tokio::signal::ctrl_c() => {
            orchestrator.teardown();
            println!("\nStopped waiting. Songs already requested keep generating remotely.");
            return Ok(());
        }
    };
    progress.abort();

    if let Err(e) = result {
        if e.is_retryable() {
            state.retry_generation()?;
            anyhow::bail!("{e}\n\nRun `serenata generate` to try again.");
        }
        if e.needs_input() {
            anyhow::bail!("{e}\n\nUse `serenata answers set <field> <value>` to fix it.");
        }
        return Err(e.into());
    }

    let controller = ComparisonController::new(ctx.services.clone(), ctx.session.clone(), policy);
    let mut songs = controller
        .enter(EntrySources {
            handoff: state.take_handoff(),
            query: EntryQuery::default(),
        })
        .await?;

    if controller.is_waiting().await {
        super::print_songs(&songs);
        println!("\n  ⏳ Your second song is still being written...");
        songs = controller.wait_for_pending().await;
    }

    super::print_songs(&songs);
    println!("\nRun `serenata checkout --song <id>` or `serenata checkout --bundle` to buy.");
    Ok(())
}

fn describe(phase: RunPhase) -> Option<String> {
    match phase {
        RunPhase::Validating => Some("Checking your answers".to_string()),
        RunPhase::Requesting(version) => Some(format!("Requesting song {version}")),
        RunPhase::Polling(version) => Some(format!("Composing song {version}")),
        RunPhase::AwaitingSecondSlot => Some("Preparing the second version".to_string()),
        RunPhase::Done => Some("Done".to_string()),
        RunPhase::Idle | RunPhase::TimedOut | RunPhase::Fatal => None,
    }
}
