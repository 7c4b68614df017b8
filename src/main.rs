//! DocuChat CLI - main entry point
//!
//! Operates the backend core directly: database setup, user registration,
//! chatting, document ingestion and memory reset.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docuchat::config::DEFAULT_TEMPERATURE;
use docuchat::{
    auth::IdentityVerifier, engine::AgentRequest, index::DocumentSearch, ingest, Config,
    DocumentIndex, EmbeddingClient, Engine, Error, MistralClient, Store, WebSearchClient,
};

#[derive(Parser)]
#[command(name = "docuchat")]
#[command(about = "AI chat backend: document RAG, web search, session store", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create database tables and the vector collection
    InitDb,

    /// Register a user with a pre-hashed credential
    Register {
        email: String,

        /// Credential hash (hashing happens upstream)
        password_hash: String,
    },

    /// Verify a user's pre-hashed credential
    Login {
        email: String,

        /// Credential hash (hashing happens upstream)
        password_hash: String,
    },

    /// Log in with a federated identity token
    FederatedLogin {
        /// Opaque ID token from the identity provider
        token: String,
    },

    /// Send one chat message
    Chat {
        /// The query text
        query: String,

        /// Session id (caller-supplied, e.g. a UUID)
        #[arg(short, long)]
        session: String,

        /// Acting user's email
        #[arg(short, long)]
        email: String,

        /// Allow web search augmentation
        #[arg(long, default_value_t = true)]
        use_web: bool,

        /// Custom persona (used when longer than 5 characters)
        #[arg(long)]
        persona: Option<String>,

        /// Sampling temperature
        #[arg(short, long, default_value_t = DEFAULT_TEMPERATURE)]
        temperature: f32,
    },

    /// Ingest a PDF into the acting user's document index
    Ingest {
        /// Path to the PDF file
        file: PathBuf,

        /// Acting user's email
        #[arg(short, long)]
        email: String,
    },

    /// List the acting user's sessions
    Sessions {
        #[arg(short, long)]
        email: String,
    },

    /// Print a session's message history
    History {
        session: String,

        #[arg(short, long)]
        email: String,
    },

    /// Delete one session (messages go with it)
    DeleteSession {
        session: String,

        #[arg(short, long)]
        email: String,
    },

    /// Clear the document index and the acting user's sessions
    Reset {
        #[arg(short, long)]
        email: String,
    },

    /// Print store totals
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let store = Store::new(config.mysql_opts());

    match cli.command {
        Commands::InitDb => {
            store.init_schema().await?;
            let index = build_index(&config)?;
            index.init_collection().await?;
            println!("Schema and collection ready");
        }

        Commands::Register {
            email,
            password_hash,
        } => {
            let user = store.create_user(&email, &password_hash).await?;
            println!("Registered {} (id {})", user.email, user.id);
        }

        Commands::Login {
            email,
            password_hash,
        } => {
            let user = store.verify_credentials(&email, &password_hash).await?;
            println!("Logged in {} (role {})", user.email, user.role);
        }

        Commands::FederatedLogin { token } => {
            let verifier = IdentityVerifier::new()?;
            let email = verifier.verify(&token).await?;
            let user = store.login_federated(&email, &config.admin_email).await?;
            println!("Logged in {} (role {})", user.email, user.role);
        }

        Commands::Chat {
            query,
            session,
            email,
            use_web,
            persona,
            temperature,
        } => {
            let user = require_user(&store, &email).await?;
            let engine = build_engine(&config)?;

            store
                .get_or_create_session(&session, user.id, &query)
                .await?;

            // Prior turns only; the new query is appended to the prompt by the engine
            let history = store
                .session_history(&session, user.id)
                .await?
                .iter()
                .map(|m| m.to_chat_message())
                .collect();

            store.append_message(&session, "user", &query).await?;

            let request = AgentRequest {
                query: query.clone(),
                history,
                use_web,
                user_id: user.id,
                persona,
                temperature,
            };

            let response = engine.answer(&request).await;
            store
                .append_message(&session, "model", &response.text)
                .await?;

            println!("[{}]", response.source);
            println!("{}", response.text);
        }

        Commands::Ingest { file, email } => {
            let user = require_user(&store, &email).await?;
            let index = build_index(&config)?;
            index.init_collection().await?;

            let bytes = tokio::fs::read(&file).await?;
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload.pdf");

            let chunks = ingest::ingest_document(&index, &bytes, filename, user.id).await;
            println!("Indexed {} chunks", chunks);
        }

        Commands::Sessions { email } => {
            let user = require_user(&store, &email).await?;
            for session in store.list_sessions(user.id).await? {
                println!("{}  {}  {}", session.created_at, session.id, session.title);
            }
        }

        Commands::History { session, email } => {
            let user = require_user(&store, &email).await?;
            for message in store.session_history(&session, user.id).await? {
                println!("[{}] {}", message.role, message.content);
            }
        }

        Commands::DeleteSession { session, email } => {
            let user = require_user(&store, &email).await?;
            store.delete_session(&session, user.id).await?;
            println!("Deleted session {}", session);
        }

        Commands::Reset { email } => {
            let user = require_user(&store, &email).await?;

            // Two independent effects, deliberately not transactional with
            // each other: the index wipe is global, the session wipe is not.
            let sessions = store.delete_user_sessions(user.id).await?;
            let engine = build_engine(&config)?;
            let chunks = engine.reset_memory().await?;

            println!("Deleted {} sessions, cleared {} index chunks", sessions, chunks);
        }

        Commands::Stats => {
            let totals = store.totals().await?;
            println!("users: {}", totals.users);
            println!("sessions: {}", totals.sessions);
            println!("messages: {}", totals.messages);
        }
    }

    Ok(())
}

async fn require_user(store: &Store, email: &str) -> Result<docuchat::store::UserRecord, Error> {
    store
        .find_user_by_email(email)
        .await?
        .ok_or_else(|| Error::NotFound(format!("user {}", email)))
}

fn build_index(config: &Config) -> Result<DocumentIndex, Error> {
    let embedder = EmbeddingClient::new(config.mistral_api_key.clone())?;
    DocumentIndex::connect(&config.qdrant_url, embedder)
}

fn build_engine(config: &Config) -> Result<Engine, Error> {
    let llm = MistralClient::new(config.mistral_api_key.clone())?;

    let search = match &config.tavily_api_key {
        Some(key) => Some(WebSearchClient::new(key.clone())?),
        None => None,
    };

    let index: Option<Box<dyn DocumentSearch>> = match build_index(config) {
        Ok(index) => Some(Box::new(index)),
        Err(err) => {
            tracing::warn!("Document index unavailable: {}", err);
            None
        }
    };

    Ok(Engine::new(llm, search, index))
}
