use clap::{Parser, Subcommand};

mod app;
mod auth;
mod config;
mod eid;
mod entries;
mod ingest;
mod openai;
mod projection;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use app::{AppBackend, AppLocal, TextEntryRequest};
use config::Config;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start synapse as a service.
    Daemon {},

    /// Ingest a text entry (provider URLs are detected and titled)
    Add {
        /// The text to ingest
        data: String,

        /// Collection to add the entry to
        #[clap(short, long, default_value = "default")]
        collection: String,

        /// Attach as a comment on an existing entry
        #[clap(short, long)]
        parent: Option<String>,

        /// Author attribution (use @handle for Instagram)
        #[clap(short, long)]
        author: Option<String>,
    },

    /// List collections with entry counts
    Collections {},

    /// Print the projected 2D layout of a collection
    Layout {
        /// Collection name
        collection: String,
    },

    /// Rebuild the advisory comment-id lists from the parent links
    Reconcile {},
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load();
    let app = AppLocal::new(&config)?;

    match args.command {
        Command::Daemon {} => {
            web::start_daemon(app, config);
            Ok(())
        }

        Command::Add {
            data,
            collection,
            parent,
            author,
        } => {
            let entry = app.add_text(TextEntryRequest {
                text: data,
                collection,
                parent_id: parent.map(Into::into),
                author,
            })?;
            println!("{}", serde_json::to_string_pretty(&entry).unwrap());
            Ok(())
        }

        Command::Collections {} => {
            let summaries = app.collections()?;
            println!("{}", serde_json::to_string_pretty(&summaries).unwrap());
            Ok(())
        }

        Command::Layout { collection } => {
            let points = app.project_collection(&collection)?;
            println!("{}", serde_json::to_string_pretty(&points).unwrap());
            Ok(())
        }

        Command::Reconcile {} => {
            let repaired = app.reconcile()?;
            println!("{repaired} entries repaired");
            Ok(())
        }
    }
}
