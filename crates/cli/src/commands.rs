//! CLI commands

use anyhow::{Context, Result};
use clap::Subcommand;
use portier_client::types::NewCompany;
use portier_client::{AuthSession, ClientProvider, CookieJar, CredentialManager, ROOT_PATH};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Paths;

#[derive(Subcommand)]
pub enum Commands {
    /// Log in with email and password
    Login {
        email: String,

        /// Account password
        #[arg(long, env = "PORTIER_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show the signed-in user
    Profile,

    /// List the services the user may open, with their front-end paths
    Permissions,

    /// Company operations
    Companies {
        #[command(subcommand)]
        command: CompanyCommands,
    },

    /// Show the resolved service URLs and whether a session is stored
    Status,

    /// Forget the stored tokens
    Logout,
}

#[derive(Subcommand)]
pub enum CompanyCommands {
    /// List companies visible to the user
    List,

    /// Create a company and switch to it
    Create {
        name: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        website: Option<String>,

        #[arg(long)]
        city: Option<String>,

        #[arg(long)]
        country: Option<String>,
    },

    /// Scope the session to another company
    Switch { uuid: String },
}

/// Everything a command needs, wired once
struct App {
    provider: Arc<ClientProvider>,
    session: AuthSession,
}

impl App {
    fn open(paths: &Paths, timeout: Option<Duration>) -> Result<Self> {
        let jar = CookieJar::open(paths.cookie_jar());
        debug!(path = %jar.path().display(), "Using cookie jar");
        let credentials = CredentialManager::new(Arc::new(jar));

        let mut builder = ClientProvider::builder()
            .env_source(Arc::new(paths.env_source()))
            .credentials(credentials)
            .navigator(Arc::new(|path: &str| {
                if path == ROOT_PATH {
                    eprintln!("Session expired, run `portier login` again");
                }
            }));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let provider = Arc::new(builder.build()?);
        let session = AuthSession::new(Arc::clone(&provider));
        Ok(Self { provider, session })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl Commands {
    pub async fn execute(self, paths: &Paths, timeout: Option<Duration>) -> Result<()> {
        let ctx = App::open(paths, timeout)?;

        match self {
            Self::Login { email, password } => {
                let user = ctx
                    .session
                    .login_with_email(&email, &password)
                    .await?;
                println!("Logged in as {}", user.display_name);
                Ok(())
            }
            Self::Profile => {
                let client = ctx.provider.authenticated().await?;
                print_json(&client.profile().await?)
            }
            Self::Permissions => {
                let client = ctx.provider.authenticated().await?;
                for permission in client.permissions().await? {
                    match permission.route() {
                        Some(route) => println!("{}\t{}", permission.name, route.path()),
                        None => println!("{}", permission.name),
                    }
                }
                Ok(())
            }
            Self::Companies { command } => command.execute(&ctx).await,
            Self::Status => {
                let env = ctx
                    .provider
                    .environment()
                    .await
                    .context("Service URLs are not configured")?;
                println!("user api:       {}", env.user_api());
                println!("credential api: {}", env.credential_api());
                let signed_in = ctx.provider.credentials().access_token().is_some();
                println!("session:        {}", if signed_in { "stored" } else { "none" });
                Ok(())
            }
            Self::Logout => {
                ctx.session.logout();
                println!("Logged out");
                Ok(())
            }
        }
    }
}

impl CompanyCommands {
    async fn execute(self, ctx: &App) -> Result<()> {
        match self {
            Self::List => {
                let client = ctx.provider.authenticated().await?;
                print_json(&client.companies().await?)
            }
            Self::Create {
                name,
                email,
                website,
                city,
                country,
            } => {
                let company = NewCompany {
                    email,
                    website,
                    city,
                    country,
                    ..NewCompany::named(name)
                };
                let user = ctx.session.create_company(&company).await?;
                info!(company = ?user.company, "Created company");
                println!("Now working in company {}", user.company.as_deref().unwrap_or("-"));
                Ok(())
            }
            Self::Switch { uuid } => {
                let user = ctx.session.switch_company(&uuid).await?;
                println!("Now working in company {}", user.company.as_deref().unwrap_or(&uuid));
                Ok(())
            }
        }
    }
}
