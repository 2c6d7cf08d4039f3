use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use duo_chats::{
    Collections, List, ListItemWithMessage, ListKind, ListPatch, MessageFeed, MessageWithReply, NewList, Visibility,
};
use duo_config::load as load_config;
use duo_runtime::{telemetry, ClientServices};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "duo")]
#[command(about = "Shared message feed and lists for two people")]
struct Cli {
    /// Identity to act as
    #[arg(long = "as", value_name = "IDENTITY")]
    identity: String,

    /// Print machine readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Feed(FeedCommand),
    #[command(flatten)]
    Lists(ListCommand),
}

#[derive(Subcommand)]
enum FeedCommand {
    /// Send a text message
    Send {
        text: String,
        #[arg(long)]
        reply_to: Option<String>,
    },
    /// Send a drawing from a PNG file or a file holding a data URL
    Draw {
        file: PathBuf,
        #[arg(long)]
        reply_to: Option<String>,
    },
    /// Like a message, or take the like back
    Like { message_id: String },
    /// Print the feed, optionally fetching older pages first
    History {
        #[arg(long, default_value_t = 0)]
        pages: usize,
    },
    /// Follow the feed until interrupted
    Watch,
}

#[derive(Subcommand)]
enum ListCommand {
    /// Show the lists visible to you
    Lists,
    /// Create a list
    ListCreate {
        name: String,
        #[arg(long, value_enum, default_value_t = VisibilityArg::Public)]
        visibility: VisibilityArg,
        #[arg(long, value_enum, default_value_t = KindArg::Collection)]
        kind: KindArg,
        #[arg(long)]
        emoji: Option<String>,
        /// Put this message in the new list
        #[arg(long)]
        with_message: Option<String>,
    },
    /// Change some attributes of a list
    ListUpdate {
        list_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_enum)]
        visibility: Option<VisibilityArg>,
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        #[arg(long)]
        emoji: Option<String>,
    },
    /// Delete a list and its items
    ListDelete { list_id: String },
    /// Add a message to a list
    ListAdd { list_id: String, message_id: String },
    /// Remove a message from a list
    ListRemove { list_id: String, message_id: String },
    /// Show the items of a list
    ListItems { list_id: String },
    /// Flip the completed flag of a checklist item
    ListToggle { item_id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum VisibilityArg {
    Public,
    Private,
}

impl From<VisibilityArg> for Visibility {
    fn from(value: VisibilityArg) -> Self {
        match value {
            VisibilityArg::Public => Visibility::Public,
            VisibilityArg::Private => Visibility::Private,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Collection,
    Checklist,
}

impl From<KindArg> for ListKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Collection => ListKind::Collection,
            KindArg::Checklist => ListKind::Checklist,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;

    let config = load_config().context("failed to load configuration")?;
    let services = ClientServices::initialise(&config)
        .await
        .context("failed to initialise client services")?;
    let session = services.sign_in(&cli.identity)?;

    let result = match cli.command {
        Commands::Feed(command) => {
            let feed = services.open_feed(&session).await?;
            run_feed_command(&feed, command, cli.json).await
        }
        Commands::Lists(command) => {
            let collections = services.open_collections(&session).await?;
            run_list_command(&collections, command, cli.json).await
        }
    };

    session.sign_out();
    services.shutdown();
    result
}

async fn run_feed_command(feed: &MessageFeed, command: FeedCommand, json: bool) -> anyhow::Result<()> {
    if let Some(error) = feed.error() {
        warn!(%error, "message feed reported an error");
    }

    match command {
        FeedCommand::Send { text, reply_to } => {
            match feed.send_message(&text, reply_to.as_deref()).await? {
                Some(message) => println!("{}", message.id),
                None => bail!("nothing to send"),
            }
        }
        FeedCommand::Draw { file, reply_to } => {
            let payload = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read drawing {}", file.display()))?;
            match feed.send_drawing(&payload, reply_to.as_deref()).await? {
                Some(message) => println!("{}", message.id),
                None => bail!("drawing is empty"),
            }
        }
        FeedCommand::Like { message_id } => {
            let liked = feed.toggle_like(&message_id).await?;
            println!("{}", if liked { "liked" } else { "unliked" });
        }
        FeedCommand::History { pages } => {
            for _ in 0..pages {
                if !feed.has_more() {
                    break;
                }
                feed.load_more().await?;
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&feed.snapshot())?);
            } else {
                for entry in feed.messages() {
                    println!("{}", format_message(&entry));
                }
                if feed.has_more() {
                    println!("(older messages available, use --pages)");
                }
            }
        }
        FeedCommand::Watch => watch(feed, json).await?,
    }
    Ok(())
}

async fn watch(feed: &MessageFeed, json: bool) -> anyhow::Result<()> {
    let mut updates = feed.updates();
    let mut seen = HashSet::new();
    let shutdown = duo_runtime::shutdown_signal();
    tokio::pin!(shutdown);

    info!(identity = %feed.session().identity(), "watching message feed");
    loop {
        let snapshot = updates.borrow_and_update().clone();
        for entry in &snapshot.messages {
            if seen.insert(entry.id().to_string()) {
                if json {
                    println!("{}", serde_json::to_string(entry)?);
                } else {
                    println!("{}", format_message(entry));
                }
            }
        }
        if let Some(error) = &snapshot.error {
            warn!(%error, "message feed reported an error");
        }

        tokio::select! {
            _ = &mut shutdown => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn run_list_command(collections: &Collections, command: ListCommand, json: bool) -> anyhow::Result<()> {
    if let Some(error) = collections.error() {
        warn!(%error, "collections reported an error");
    }

    match command {
        ListCommand::Lists => {
            let lists = collections.lists();
            if json {
                println!("{}", serde_json::to_string_pretty(&lists)?);
            } else if lists.is_empty() {
                println!("No lists");
            } else {
                for list in &lists {
                    println!("{}", format_list(list));
                }
            }
        }
        ListCommand::ListCreate {
            name,
            visibility,
            kind,
            emoji,
            with_message,
        } => {
            let mut new_list = NewList::new(name, visibility.into(), kind.into());
            if let Some(emoji) = emoji {
                new_list = new_list.with_emoji(emoji);
            }
            let created = match with_message {
                Some(message_id) => collections.create_list_with_message(new_list, &message_id).await?,
                None => collections.create_list(new_list).await?,
            };
            match created {
                Some(list_id) => println!("{list_id}"),
                None => bail!("list name must not be blank"),
            }
        }
        ListCommand::ListUpdate {
            list_id,
            name,
            visibility,
            kind,
            emoji,
        } => {
            let patch = ListPatch {
                name,
                visibility: visibility.map(Into::into),
                kind: kind.map(Into::into),
                emoji,
            };
            collections.update_list(&list_id, patch).await?;
        }
        ListCommand::ListDelete { list_id } => {
            collections.request_delete(&list_id).await;
            collections.confirm_delete().await?;
        }
        ListCommand::ListAdd { list_id, message_id } => {
            collections.add_message_to_list(&list_id, &message_id).await?;
        }
        ListCommand::ListRemove { list_id, message_id } => {
            collections.remove_from_list(&list_id, &message_id).await?;
        }
        ListCommand::ListItems { list_id } => {
            let items = collections.get_list_items(&list_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if items.is_empty() {
                println!("No items");
            } else {
                for item in &items {
                    println!("{}", format_item(item));
                }
            }
        }
        ListCommand::ListToggle { item_id } => {
            let completed = collections.toggle_item_completed(&item_id).await?;
            println!("{}", if completed { "done" } else { "open" });
        }
    }
    Ok(())
}

fn format_message(entry: &MessageWithReply) -> String {
    let message = &entry.message;
    let body = match (&message.content, &message.image_url) {
        (Some(content), _) => content.clone(),
        (None, Some(image_url)) => format!("[drawing] {image_url}"),
        (None, None) => String::new(),
    };

    let mut line = format!(
        "{} {} {}: {}",
        message.id,
        message.timestamp.format("%Y-%m-%d %H:%M:%S"),
        message.sender_id,
        body
    );
    if message.reply_to.is_some() {
        let quoted = entry
            .reply_to_message
            .as_ref()
            .map(|target| {
                let text = target.content.as_deref().unwrap_or("[drawing]");
                format!("{}: {text}", target.sender_id)
            })
            .unwrap_or_else(|| "message unavailable".to_string());
        line.push_str(&format!("  (re {quoted})"));
    }
    if !message.likes.is_empty() {
        let likes: Vec<&str> = message.likes.iter().map(String::as_str).collect();
        line.push_str(&format!("  liked by {}", likes.join(", ")));
    }
    line
}

fn format_list(list: &List) -> String {
    format!(
        "{} {} {} ({}, {}, owner {})",
        list.id,
        list.emoji,
        list.name,
        list.visibility.as_str(),
        list.kind.as_str(),
        list.owner_id
    )
}

fn format_item(entry: &ListItemWithMessage) -> String {
    let mark = if entry.item.completed { "[x]" } else { "[ ]" };
    let text = match &entry.message {
        Some(message) => match (&message.content, &message.image_url) {
            (Some(content), _) => format!("{}: {content}", message.sender_id),
            (None, Some(image_url)) => format!("{}: [drawing] {image_url}", message.sender_id),
            (None, None) => message.sender_id.clone(),
        },
        None => "message unavailable".to_string(),
    };
    format!("{} {mark} {text}", entry.item.id)
}
