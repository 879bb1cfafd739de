//! Chainflow CLI — manage and run sequential agent workflows.
//!
//! Reuses the same core domain logic (chainflow-core) and server bootstrap
//! (chainflow-server) as the HTTP API.

use clap::{Parser, Subcommand};

use chainflow_cli::commands;

/// Chainflow CLI — sequential agent workflows
#[derive(Parser)]
#[command(name = "chainflow", version, about = "Chainflow CLI — sequential agent workflows")]
pub struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "CHAINFLOW_DB_PATH", default_value = "chainflow.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Chainflow HTTP server
    Server {
        /// Host to bind to
        #[arg(long, env = "CHAINFLOW_HOST", default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, env = "CHAINFLOW_PORT", default_value_t = 8006)]
        port: u16,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage and run workflows
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },

    /// Manage workflow entities
    Entity {
        #[command(subcommand)]
        action: EntityAction,
    },

    /// Inspect runs
    Run {
        #[command(subcommand)]
        action: RunAction,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// List projects
    List,
    /// Create a project
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// Create an empty workflow
    Create {
        #[arg(long)]
        name: String,
        /// Free-form workflow type tag
        #[arg(long = "type", default_value = "default")]
        workflow_type: String,
        #[arg(long)]
        description: Option<String>,
        /// Owning project (defaults to the default project)
        #[arg(long)]
        project_id: Option<String>,
    },
    /// List workflows
    List {
        #[arg(long)]
        project_id: Option<String>,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Show a workflow with its entities and connections
    Show { id: String },
    /// Delete a workflow with its entities and runs
    Delete { id: String },
    /// Create a workflow from a YAML or JSON definition
    Import { file: String },
    /// Trigger a workflow and wait for it to finish
    Run {
        id: String,
        /// Input text for the first entity
        #[arg(long)]
        input: String,
        /// Instruction overrides as JSON: a list of lines, or an object
        /// keyed by entity id / external id
        #[arg(long)]
        prompts: Option<String>,
        /// Print each agent response as it arrives
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Subcommand)]
enum EntityAction {
    /// Add an entity to a workflow
    Add {
        #[arg(long)]
        workflow_id: String,
        /// Caller-chosen id, unique within the workflow
        #[arg(long)]
        external_id: String,
        /// Agent type (lead, dialogue, art, lore, critic, reporter, innovator, ...)
        #[arg(long = "type")]
        entity_type: String,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        order: f64,
        /// External id of an entity to connect to (repeatable)
        #[arg(long)]
        connect: Vec<String>,
    },
    /// Remove an entity
    Remove { id: String },
}

#[derive(Subcommand)]
enum RunAction {
    /// Show the per-entity runs of a run id
    Status {
        run_id: String,
        #[arg(long)]
        entity_id: Option<String>,
    },
    /// List all runs of a workflow
    List {
        #[arg(long)]
        workflow_id: String,
    },
}

#[tokio::main]
async fn main() {
    chainflow_core::config::load_dotenv();

    let cli = Cli::parse();

    // The server subcommand installs its own subscriber.
    if !matches!(cli.command, Commands::Server { .. }) {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "chainflow_core=warn".into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match cli.command {
        Commands::Server { host, port } => commands::server::run(host, port, cli.db).await,

        Commands::Project { action } => {
            let state = commands::init_state(&cli.db).await;
            match action {
                ProjectAction::List => commands::project::list(&state).await,
                ProjectAction::Create { name, description } => {
                    commands::project::create(&state, &name, description.as_deref())
                        .await
                        .map(|_| ())
                }
            }
        }

        Commands::Workflow { action } => {
            let state = commands::init_state(&cli.db).await;
            match action {
                WorkflowAction::Create {
                    name,
                    workflow_type,
                    description,
                    project_id,
                } => commands::workflow::create(
                    &state,
                    &name,
                    &workflow_type,
                    description.as_deref(),
                    project_id.as_deref(),
                )
                .await
                .map(|_| ()),
                WorkflowAction::List {
                    project_id,
                    skip,
                    limit,
                } => commands::workflow::list(&state, project_id.as_deref(), skip, limit).await,
                WorkflowAction::Show { id } => commands::workflow::show(&state, &id).await,
                WorkflowAction::Delete { id } => commands::workflow::delete(&state, &id).await,
                WorkflowAction::Import { file } => {
                    commands::workflow::import(&state, &file).await.map(|_| ())
                }
                WorkflowAction::Run {
                    id,
                    input,
                    prompts,
                    verbose,
                } => commands::workflow::run(&state, &id, &input, prompts.as_deref(), verbose)
                    .await
                    .map(|_| ()),
            }
        }

        Commands::Entity { action } => {
            let state = commands::init_state(&cli.db).await;
            match action {
                EntityAction::Add {
                    workflow_id,
                    external_id,
                    entity_type,
                    label,
                    prompt,
                    order,
                    connect,
                } => commands::entity::add(
                    &state,
                    commands::entity::AddEntity {
                        workflow_id,
                        external_id,
                        entity_type,
                        label,
                        prompt,
                        order,
                        connect,
                    },
                )
                .await
                .map(|_| ()),
                EntityAction::Remove { id } => commands::entity::remove(&state, &id).await,
            }
        }

        Commands::Run { action } => {
            let state = commands::init_state(&cli.db).await;
            match action {
                RunAction::Status { run_id, entity_id } => {
                    commands::run::status(&state, &run_id, entity_id.as_deref()).await
                }
                RunAction::List { workflow_id } => {
                    commands::run::list(&state, &workflow_id).await
                }
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
