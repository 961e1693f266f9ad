use app_state::load_app_settings;
use clap::{Parser, Subcommand};
use color_eyre::Result;
use common_services::api::engagement::EngagementService;
use common_services::database::get_db_pool;
use common_services::document_store::PgDocumentStore;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(version, about = "Maintenance tasks for engagement counters", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild media stats from the likes, comments and impressions.
    Reconcile {
        /// Only these media. All media with any engagement when omitted.
        #[arg(long = "media-id")]
        media_ids: Vec<String>,
    },
    /// Print the current counters of media items.
    Stats {
        #[arg(long = "media-id", required = true)]
        media_ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let settings = load_app_settings()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level)),
        )
        .with(fmt::layer())
        .init();

    let pool = get_db_pool(&settings).await?;
    let store =
        PgDocumentStore::connect(pool, settings.constants.engagement.broadcast_capacity).await?;
    let engagement = EngagementService::new(store, &settings.constants.engagement);

    match args.command {
        Command::Reconcile { media_ids } if media_ids.is_empty() => {
            let stats = engagement.reconcile_all_stats().await?;
            info!("Reconciled {} media items", stats.len());
        }
        Command::Reconcile { media_ids } => {
            for media_id in &media_ids {
                let stats = engagement.recount_media_stats(media_id).await?;
                info!(
                    "{}: {} likes, {} comments, {} views",
                    stats.media_id, stats.like_count, stats.comment_count, stats.view_count
                );
            }
        }
        Command::Stats { media_ids } => {
            for stats in engagement.get_multiple_media_stats(&media_ids).await? {
                println!(
                    "{}\tlikes={}\tcomments={}\tviews={}",
                    stats.media_id, stats.like_count, stats.comment_count, stats.view_count
                );
            }
        }
    }

    Ok(())
}
