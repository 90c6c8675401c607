use anyhow::Result;

use serenata_core::model::SongId;
use serenata_funnel::{ComparisonController, ComparisonError, EntrySources};

use crate::context::CliContext;

/// What the user asked to buy.
#[derive(Debug)]
pub struct Order {
    pub song: Option<String>,
    pub bundle: bool,
    pub coupon: Option<String>,
    pub whatsapp: Option<String>,
}

pub async fn run_checkout(ctx: &CliContext, order: Order) -> Result<()> {
    let controller =
        ComparisonController::new(ctx.services.clone(), ctx.session.clone(), ctx.config.policy());
    controller.enter(EntrySources::default()).await?;
    controller.teardown();

    if order.bundle {
        controller.select_bundle().await?;
    } else if let Some(song) = &order.song {
        controller.select_song(&SongId::from(song.as_str())).await?;
    }

    if let Some(code) = &order.coupon {
        let coupon = controller.apply_coupon(code).await?;
        match (coupon.free, coupon.discount) {
            (true, _) => println!("✓ Coupon {} applied: free", coupon.code),
            (false, Some(discount)) => {
                println!("✓ Coupon {} applied: discount {}", coupon.code, discount);
            }
            (false, None) => println!("✓ Coupon {} applied", coupon.code),
        }
    }

    if let Some(phone) = &order.whatsapp {
        controller.attach_whatsapp(phone).await?;
        println!("✓ Songs will also be sent to {phone}");
    }

    match controller.checkout().await {
        Ok(redirect) => {
            println!("\nComplete your purchase at:\n  {}", redirect.url);
            Ok(())
        }
        Err(e @ ComparisonError::Integrity { .. }) => {
            anyhow::bail!("{e}\n\nRun `serenata generate` to create the song again.")
        }
        Err(e) => Err(e.into()),
    }
}
