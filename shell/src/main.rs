mod library;
mod prefs;
mod surface;

use agent::{DocumentRef, QaConfig, Services, SessionController};
use clap::{Parser, Subcommand};
use library::{DirectoryLibrary, FulltextCache};
use prefs::JsonFilePreferences;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use surface::TerminalSurface;
use tracing_subscriber::EnvFilter;
use traits::TextExtractor;

#[derive(Parser, Debug)]
#[command(name = "pdf-qa", about = "Ask questions about the PDFs in a document library")]
struct Cli {
    /// Holds prefs.json, library/ and fulltext/.
    #[arg(long, default_value = ".pdf-qa")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show or change the answer service settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Ask a question about a document. Ctrl-C cancels the request.
    Ask {
        doc: String,
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Print the last stored answer for a document.
    Show { doc: String },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Show,
    Set {
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    Reset,
}

fn build_services(data_dir: &Path) -> Services {
    let prefs = Arc::new(JsonFilePreferences::new(data_dir.join("prefs.json")));
    let library = Arc::new(DirectoryLibrary::new(data_dir.join("library")));
    let fulltext: Arc<dyn TextExtractor> = Arc::new(FulltextCache::new(data_dir.join("fulltext")));
    Services::new(prefs, library, vec![fulltext])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let services = build_services(&cli.data_dir);

    match cli.command {
        Command::Config { action } => config(&services, action).await,
        Command::Ask { doc, question } => ask(services, doc.into(), question.join(" ")).await,
        Command::Show { doc } => show(&services, doc.into()).await,
    }
}

async fn config(services: &Services, action: ConfigAction) -> anyhow::Result<()> {
    let store = services.config();
    match action {
        ConfigAction::Show => {}
        ConfigAction::Set {
            endpoint,
            api_key,
            model,
        } => {
            let current = store.load().await;
            let updated = QaConfig {
                endpoint: endpoint.or(current.endpoint),
                api_key: api_key.or(current.api_key),
                model: model.or(current.model),
            };
            store.save(&updated).await?;
            println!("Saved");
        }
        ConfigAction::Reset => {
            store.reset().await?;
            println!("Reset");
        }
    }

    let config = store.load().await;
    println!("endpoint: {}", config.endpoint.as_deref().unwrap_or("(unset)"));
    println!(
        "api key:  {}",
        if config.api_key.is_some() { "(set)" } else { "(unset)" }
    );
    println!("model:    {}", config.model.as_deref().unwrap_or("(default)"));
    Ok(())
}

async fn ask(services: Services, doc: DocumentRef, question: String) -> anyhow::Result<()> {
    let panel = SessionController::mount(services, Arc::new(TerminalSurface::new("panel"))).await;
    panel.load_for_document(Some(doc.clone())).await;

    let pending = panel.ask(Some(doc), &question);
    tokio::pin!(pending);
    let result = tokio::select! {
        result = &mut pending => result,
        _ = tokio::signal::ctrl_c() => {
            panel.cancel();
            pending.await
        }
    };
    panel.unmount();

    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn show(services: &Services, doc: DocumentRef) -> anyhow::Result<()> {
    let view = services
        .views()
        .open_detached(
            services.history().clone(),
            doc,
            Arc::new(TerminalSurface::new("window")),
        )
        .await;
    view.close();
    Ok(())
}
