use clap::{Parser, Subcommand};
use kb_carousel::Result;
use kb_carousel::commands::{cards, index_corpus, init_config, search, show_config, show_status};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kb-carousel")]
#[command(about = "A markdown knowledge base with hybrid search and card synthesis")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index (or re-index) a markdown corpus directory
    Index {
        /// Directory containing the markdown documents
        path: PathBuf,
    },
    /// Run a hybrid search over the indexed corpus
    Search {
        /// Search query
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Restrict results to one category
        #[arg(long)]
        category: Option<String>,
        /// Restrict results to one section type
        #[arg(long)]
        section_type: Option<String>,
    },
    /// Search and synthesize display cards as JSON
    Cards {
        /// Search query
        query: String,
        /// Maximum number of cards
        #[arg(long, default_value_t = 5)]
        max_cards: usize,
        /// Include fenced code blocks on the cards
        #[arg(long)]
        code_examples: bool,
        /// Balance cards across categories
        #[arg(long)]
        group_by_category: bool,
    },
    /// Show index size and store consistency
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                init_config()?;
            }
        }
        Commands::Index { path } => {
            index_corpus(path).await?;
        }
        Commands::Search {
            query,
            limit,
            category,
            section_type,
        } => {
            search(query, limit, category, section_type).await?;
        }
        Commands::Cards {
            query,
            max_cards,
            code_examples,
            group_by_category,
        } => {
            cards(query, max_cards, code_examples, group_by_category).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}
