use std::{path::Path, sync::Arc};

use {
    anyhow::{Context, Result},
    clap::Subcommand,
    mqttgram_channels::{
        AddOutcome, JsonFileSubscriberStore, RemoveOutcome, SubscriberRegistry, SubscriberStore,
    },
    mqttgram_common::SubscriberId,
};

/// The file is shared under a lock, so a running bridge never overwrites
/// the change, but it only reloads the list when it mutates it itself.
const PICKUP_NOTE: &str =
    "A running bridge applies this after its next subscription change or a restart.";

#[derive(Subcommand)]
pub enum SubscriberAction {
    /// Print every subscribed chat id.
    List,
    /// Subscribe a chat id.
    Add {
        /// Telegram chat id (negative for groups).
        #[arg(allow_hyphen_values = true)]
        id: SubscriberId,
    },
    /// Unsubscribe a chat id.
    Remove {
        #[arg(allow_hyphen_values = true)]
        id: SubscriberId,
    },
}

pub async fn handle_subscribers(config_path: Option<&Path>, action: SubscriberAction) -> Result<()> {
    let config = mqttgram_config::load(config_path)?;
    let path = config
        .subscribers
        .path
        .context("subscriber file path is not configured")?;
    let store: Arc<dyn SubscriberStore> = Arc::new(JsonFileSubscriberStore::new(&path));
    let registry = SubscriberRegistry::load(store)
        .await
        .with_context(|| format!("loading {}", path.display()))?;

    match action {
        SubscriberAction::List => {
            let ids = registry.list().await;
            if ids.is_empty() {
                println!("No subscribers.");
            }
            for id in ids {
                println!("{id}");
            }
        },
        SubscriberAction::Add { id } => match registry.add(id).await? {
            AddOutcome::Added => {
                println!("Added {id}.");
                eprintln!("{PICKUP_NOTE}");
            },
            AddOutcome::AlreadySubscribed => println!("{id} is already subscribed."),
        },
        SubscriberAction::Remove { id } => match registry.remove(id).await? {
            RemoveOutcome::Removed => {
                println!("Removed {id}.");
                eprintln!("{PICKUP_NOTE}");
            },
            RemoveOutcome::NotSubscribed => println!("{id} was not subscribed."),
        },
    }
    Ok(())
}
