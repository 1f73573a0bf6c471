use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use interaction_core::{config::load_settings, wizard::flows};
use shared::{
    domain::UserId,
    draft::{DraftKey, DraftStore, DraftUpdate, StatusUpdate},
};
use storage::{prepare_database_url, Storage};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Operator tooling for persisted wizard drafts.
#[derive(Parser, Debug)]
struct Cli {
    /// Overrides the database url from bot.toml / APP__DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    ListDrafts,
    ShowDraft {
        owner_user_id: i64,
        flow: String,
    },
    ResetDraft {
        owner_user_id: i64,
        flow: String,
    },
    /// Points a draft at a step so the next run resumes there.
    Rewind {
        owner_user_id: i64,
        flow: String,
        step: String,
    },
    Settings,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = load_settings();

    if let Command::Settings = cli.command {
        println!("{settings:#?}");
        return Ok(());
    }

    let database_url =
        prepare_database_url(cli.database_url.as_deref().unwrap_or(&settings.database_url))?;
    let storage = Storage::new(&database_url).await?;
    info!(%database_url, "opened draft store");

    match cli.command {
        Command::ListDrafts => {
            for summary in storage.list_drafts().await? {
                println!(
                    "owner={} flow={} status={} fields={} published={} updated_at={}",
                    summary.key.owner,
                    summary.key.flow,
                    summary.status.as_deref().unwrap_or("-"),
                    summary.field_count,
                    summary.published,
                    summary.updated_at.to_rfc3339(),
                );
            }
        }
        Command::ShowDraft {
            owner_user_id,
            flow,
        } => {
            let key = DraftKey::new(UserId(owner_user_id), flow);
            match storage.get(&key).await? {
                Some(draft) => println!("{}", serde_json::to_string_pretty(&draft)?),
                None => println!("no draft for owner={} flow={}", key.owner, key.flow),
            }
        }
        Command::ResetDraft {
            owner_user_id,
            flow,
        } => {
            let key = DraftKey::new(UserId(owner_user_id), flow);
            if storage.delete_draft(&key).await? {
                println!("deleted draft owner={} flow={}", key.owner, key.flow);
            } else {
                println!("no draft for owner={} flow={}", key.owner, key.flow);
            }
        }
        Command::Rewind {
            owner_user_id,
            flow,
            step,
        } => {
            let table = flows::by_name(&flow).ok_or_else(|| anyhow!("unknown flow '{flow}'"))?;
            let status = table
                .step_named(&step)
                .map(|descriptor| descriptor.status)
                .ok_or_else(|| anyhow!("flow '{flow}' has no step '{step}'"))?;

            let key = DraftKey::new(UserId(owner_user_id), flow);
            if storage.get(&key).await?.is_none() {
                return Err(anyhow!("no draft for owner={} flow={}", key.owner, key.flow));
            }
            let draft = storage
                .upsert(&key, DraftUpdate::default().status(StatusUpdate::Set(status.into())))
                .await?;
            println!(
                "draft owner={} flow={} now resumes at {step}",
                key.owner, key.flow
            );
            info!(status = ?draft.status, "draft rewound");
        }
        Command::Settings => {}
    }

    Ok(())
}
