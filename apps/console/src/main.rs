use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use client_core::{
    export,
    selector::{CascadingSelector, SceneCatalog},
    simulator::ProgressSimulator,
    AdminApi, AppContext, RequestGateway,
};
use shared::{
    domain::{Language, QueryId, QueryTypeId, UserId},
    protocol::{
        CreateUserRequest, FilterStatus, GenerateQueriesRequest, ManualStatus, QueryFilter,
    },
};
use storage::Storage;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::{load_settings, state_database_url};

#[derive(Parser, Debug)]
#[command(name = "labelctl", about = "Operations console for the query labeling backend")]
struct Cli {
    /// Backend base URL; overrides labelctl.toml and the environment.
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Client state database (sqlite URL or file path).
    #[arg(long, global = true)]
    state_db: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Whoami,
    #[command(subcommand)]
    Users(UsersCommand),
    #[command(subcommand)]
    QueryTypes(QueryTypesCommand),
    Scenes,
    #[command(subcommand)]
    Queries(QueriesCommand),
    Generate {
        #[arg(long = "type")]
        query_type: String,
        #[arg(long)]
        count: u32,
    },
    /// Runs a simulated pipeline task and prints progress until it ends.
    Simulate {
        #[arg(long)]
        name: String,
        #[arg(long)]
        total: u64,
        #[arg(long, default_value = "general")]
        category: String,
    },
    /// Shows or changes persisted display preferences.
    Settings {
        #[arg(long)]
        dark_mode: Option<Toggle>,
        #[arg(long, value_parser = parse_language)]
        language: Option<Language>,
    },
}

#[derive(Subcommand, Debug)]
enum UsersCommand {
    List,
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        role: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum QueryTypesCommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        level2: String,
        #[arg(long)]
        level3: String,
        #[arg(long)]
        number: u32,
        #[arg(long)]
        generation_prompt: String,
        #[arg(long)]
        analysis_prompt: String,
        #[arg(long)]
        scoring_prompt: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum QueriesCommand {
    List {
        #[arg(long = "type")]
        query_type: Option<String>,
        #[arg(long, value_parser = parse_manual_status)]
        status: Option<ManualStatus>,
        #[arg(long, value_parser = parse_filter_status)]
        filter: Option<FilterStatus>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
    },
    #[command(group(ArgGroup::new("decision").required(true).args(["accept", "reject"])))]
    Confirm {
        id: String,
        #[arg(long)]
        accept: bool,
        #[arg(long)]
        reject: bool,
    },
    Export {
        #[arg(long)]
        out: PathBuf,
        #[arg(long = "type")]
        query_type: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Toggle {
    On,
    Off,
}

fn parse_language(raw: &str) -> Result<Language, String> {
    Language::parse(raw).ok_or_else(|| format!("unsupported language '{raw}' (en, zh)"))
}

fn parse_filter_status(raw: &str) -> Result<FilterStatus, String> {
    FilterStatus::parse(raw)
        .ok_or_else(|| format!("unknown filter status '{raw}' (pending, passed, filtered)"))
}

fn parse_manual_status(raw: &str) -> Result<ManualStatus, String> {
    ManualStatus::parse(raw)
        .ok_or_else(|| format!("unknown status '{raw}' (pending, accepted, rejected)"))
}

struct Console {
    context: Arc<AppContext>,
    api: AdminApi,
    simulator: ProgressSimulator,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = load_settings();
    if let Some(api_url) = cli.api_url {
        settings.api_base_url = api_url;
    }
    if let Some(state_db) = cli.state_db {
        settings.state_db_url = state_db;
    }

    let state_db_url = state_database_url(&settings.state_db_url);
    let storage = Storage::new(&state_db_url).await?;
    let context = AppContext::init(Arc::new(storage))
        .await
        .context("failed to restore client state")?;
    let gateway = RequestGateway::new(&settings.api_base_url, context.clone())?;
    info!(api = %gateway.base_url(), state = %state_db_url, "console ready");

    let console = Console {
        context,
        api: AdminApi::new(Arc::new(gateway)),
        simulator: ProgressSimulator::new(settings.simulator_config()),
    };
    console.dispatch(cli.command).await
}

impl Console {
    async fn dispatch(&self, command: Command) -> Result<()> {
        match command {
            Command::Login { email, password } => {
                let identity = self.api.login(&email, &password).await?;
                let session = self.context.login(identity).await?;
                println!("logged in as {}", render::session_line(&session));
            }
            Command::Logout => {
                self.context.logout().await?;
                println!("logged out");
            }
            Command::Whoami => match self.context.session().await {
                Some(session) => println!("{}", render::session_line(&session)),
                None => println!("not logged in"),
            },
            Command::Users(command) => self.users(command).await?,
            Command::QueryTypes(command) => self.query_types(command).await?,
            Command::Scenes => {
                for scene in self.api.list_scenes().await? {
                    println!("{}", render::scene_line(&scene));
                }
            }
            Command::Queries(command) => self.queries(command).await?,
            Command::Generate { query_type, count } => {
                let response = self
                    .api
                    .generate_queries(&GenerateQueriesRequest {
                        query_type_code: query_type,
                        count,
                    })
                    .await?;
                match response.task_id {
                    Some(task_id) => {
                        println!("accepted {} queries (task {task_id})", response.accepted)
                    }
                    None => println!("accepted {} queries", response.accepted),
                }
            }
            Command::Simulate {
                name,
                total,
                category,
            } => self.simulate(name, total, category).await?,
            Command::Settings {
                dark_mode,
                language,
            } => {
                if let Some(toggle) = dark_mode {
                    self.context
                        .set_dark_mode(matches!(toggle, Toggle::On))
                        .await?;
                }
                if let Some(language) = language {
                    self.context.set_language(language).await?;
                }
                println!(
                    "{}",
                    render::preferences_line(&self.context.preferences().await)
                );
            }
        }
        Ok(())
    }

    async fn users(&self, command: UsersCommand) -> Result<()> {
        match command {
            UsersCommand::List => {
                for user in self.api.list_users().await? {
                    println!("{}", render::user_line(&user));
                }
            }
            UsersCommand::Create {
                email,
                password,
                role,
            } => {
                let user = self
                    .api
                    .create_user(&CreateUserRequest {
                        email,
                        password,
                        role,
                    })
                    .await?;
                println!("created {}", render::user_line(&user));
            }
            UsersCommand::Delete { id } => {
                self.api.delete_user(&UserId(id.clone())).await?;
                println!("deleted user {id}");
            }
        }
        Ok(())
    }

    async fn query_types(&self, command: QueryTypesCommand) -> Result<()> {
        match command {
            QueryTypesCommand::List => {
                for query_type in self.api.list_query_types().await? {
                    println!("{}", render::query_type_line(&query_type));
                }
            }
            QueryTypesCommand::Create {
                name,
                level2,
                level3,
                number,
                generation_prompt,
                analysis_prompt,
                scoring_prompt,
            } => {
                let scenes = self.api.list_scenes().await?;
                let mut selector = CascadingSelector::new(SceneCatalog::new(scenes));
                selector.set_level2(&level2)?;
                selector.set_level3(&level3)?;
                selector.set_number(number)?;
                let draft = selector.to_draft(
                    &name,
                    &generation_prompt,
                    &analysis_prompt,
                    scoring_prompt.as_deref(),
                )?;
                draft.validate()?;
                let created = self.api.create_query_type(&draft).await?;
                println!("created {}", render::query_type_line(&created));
            }
            QueryTypesCommand::Delete { id } => {
                self.api.delete_query_type(&QueryTypeId(id.clone())).await?;
                println!("deleted query type {id}");
            }
        }
        Ok(())
    }

    async fn queries(&self, command: QueriesCommand) -> Result<()> {
        match command {
            QueriesCommand::List {
                query_type,
                status,
                filter,
                page,
                page_size,
            } => {
                let page = self
                    .api
                    .list_queries(&QueryFilter {
                        query_type_code: query_type,
                        filter_status: filter,
                        manual_status: status,
                        page,
                        page_size,
                    })
                    .await?;
                for query in &page.items {
                    println!("{}", render::query_line(query));
                }
                println!("{} of {} queries", page.items.len(), page.total);
            }
            QueriesCommand::Confirm { id, accept, reject } => {
                let status = match (accept, reject) {
                    (true, false) => ManualStatus::Accepted,
                    (false, true) => ManualStatus::Rejected,
                    _ => bail!("pass exactly one of --accept or --reject"),
                };
                self.api
                    .set_query_status(&QueryId(id.clone()), status)
                    .await?;
                println!("query {id} marked {}", status.as_str());
            }
            QueriesCommand::Export { out, query_type } => {
                let rows = self
                    .api
                    .list_all_queries(&QueryFilter {
                        query_type_code: query_type,
                        ..QueryFilter::default()
                    })
                    .await?;
                let written = export::write_csv(&out, &rows)?;
                println!("exported {written} queries to {}", out.display());
            }
        }
        Ok(())
    }

    async fn simulate(&self, name: String, total: u64, category: String) -> Result<()> {
        let id = self.simulator.create(name, category, total);
        let mut updates = self.simulator.subscribe();
        self.simulator.start(id)?;

        loop {
            let task = updates
                .borrow_and_update()
                .iter()
                .find(|task| task.id == id)
                .cloned()
                .context("simulated task disappeared")?;
            println!("{}", render::task_line(&task));
            if task.status.is_terminal() {
                break;
            }

            tokio::select! {
                changed = updates.changed() => changed.context("simulator stopped")?,
                _ = tokio::signal::ctrl_c() => {
                    warn!(task = %id, "interrupted; pausing task");
                    self.simulator.pause(id)?;
                    if let Some(task) = self.simulator.get(id) {
                        println!("{}", render::task_line(&task));
                    }
                    break;
                }
            }
        }
        self.simulator.shutdown();
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
