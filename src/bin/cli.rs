//! Campus events CLI
//!
//! Local driver for the discovery pipeline. Reads from the hosted data
//! service, or from a JSON fixture with `--fixture`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use campus_events::{
    config,
    error::Result,
    models::{Config, EventListing, FilterState, Scope, TimeWindow, Viewer, ViewerId},
    pipeline::{DiscoverySession, LoadOutcome, PipelineContext, TrackState, TrackingToggle},
    services::{ClubInput, IdentityProvider, RestIdentity, dashboard, home_feed, register_club},
    storage::{EventStore, MemoryStore, ProfileStore, RestStore},
    utils::SystemClock,
};
use clap::{Parser, Subcommand};

/// Campus events - discover and track university events
#[derive(Parser, Debug)]
#[command(name = "campus-events", version, about = "Campus event discovery")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Use a JSON fixture instead of the hosted data service
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Viewer id
    #[arg(long)]
    user: Option<String>,

    /// Viewer's home affiliation (omit to act as a guest)
    #[arg(long, requires = "user")]
    affiliation: Option<String>,

    /// Session access token; the viewer is then read from the identity service
    #[arg(long, env = "CAMPUS_EVENTS_TOKEN", conflicts_with_all = ["user", "affiliation"])]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List events page by page
    Explore {
        /// Case-insensitive text to find in event names
        #[arg(long, default_value = "")]
        search: String,

        /// upcoming or past
        #[arg(long, default_value = "upcoming")]
        window: TimeWindow,

        /// in-college or out-college (defaults by role)
        #[arg(long)]
        scope: Option<Scope>,

        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },

    /// Start tracking an event
    Track { event_id: String },

    /// Stop tracking an event
    Untrack { event_id: String },

    /// Show the student home feed
    Home,

    /// Show attended events, joined clubs and the school profile
    Dashboard,

    /// Register a club at the viewer's affiliation
    RegisterClub {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: String,

        #[arg(long)]
        category: String,

        #[arg(long, default_value = "")]
        logo_url: String,
    },

    /// Validate configuration (and the fixture, if given)
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Where events come from, and where fixture changes go back to.
struct Backend {
    store: Arc<dyn EventStore>,
    profiles: Arc<dyn ProfileStore>,
    fixture: Option<(Arc<MemoryStore>, PathBuf)>,
}

impl Backend {
    async fn open(config: &Config, fixture: Option<&Path>) -> Result<Self> {
        match fixture {
            Some(path) => {
                let memory = Arc::new(MemoryStore::load(path).await?);
                log::info!("Using fixture {}", path.display());
                Ok(Self {
                    store: memory.clone(),
                    profiles: memory.clone(),
                    fixture: Some((memory, path.to_path_buf())),
                })
            }
            None => {
                let rest = Arc::new(RestStore::new(&config.data)?);
                Ok(Self {
                    store: rest.clone(),
                    profiles: rest,
                    fixture: None,
                })
            }
        }
    }

    /// Write fixture changes back to disk.
    async fn persist(&self) -> Result<()> {
        if let Some((memory, path)) = &self.fixture {
            memory.save(path).await?;
            log::debug!("Saved fixture {}", path.display());
        }
        Ok(())
    }
}

async fn resolve_viewer(cli: &Cli, config: &Config) -> Result<Viewer> {
    if let Some(token) = &cli.token {
        let identity = RestIdentity::new(&config.data)?.with_session(token.clone());
        let claims = identity.current_user().await?;
        return Ok(Viewer::from_claims(claims.as_ref()));
    }
    Ok(match (&cli.user, &cli.affiliation) {
        (Some(user), Some(affiliation)) => Viewer::student(user.clone(), affiliation.clone()),
        (Some(user), None) => Viewer::Guest {
            id: Some(ViewerId(user.clone())),
        },
        _ => Viewer::anonymous(),
    })
}

fn print_listing(listing: &EventListing) {
    let school = listing
        .club
        .affiliation_name
        .as_deref()
        .unwrap_or(listing.club.affiliation_id.0.as_str());
    println!(
        "{} {}  {}  [{} @ {}]  {}",
        if listing.is_tracked { "*" } else { " " },
        listing.starts_at.format("%Y-%m-%d %H:%M"),
        listing.name,
        listing.club.name,
        school,
        listing.id
    );
}

/// Backend, viewer and pipeline context for commands that touch data.
async fn open(cli: &Cli, config: &Config) -> Result<(Backend, Viewer, PipelineContext)> {
    config.validate()?;
    let backend = Backend::open(config, cli.fixture.as_deref()).await?;
    let viewer = resolve_viewer(cli, config).await?;
    log::debug!("Acting as {:?}", viewer);
    let ctx = PipelineContext::new(Arc::clone(&backend.store), &config.discovery);
    Ok((backend, viewer, ctx))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = config::load_config(&cli.config)?;
    config::apply_env_overrides(&mut config, config::env_var);

    match &cli.command {
        Command::Explore {
            search,
            window,
            scope,
            pages,
        } => {
            let (_, viewer, ctx) = open(&cli, &config).await?;
            let session = DiscoverySession::new(ctx, viewer.clone());
            session.set_filters(FilterState {
                search: search.clone(),
                window: *window,
                scope: scope.unwrap_or_else(|| viewer.default_scope()),
            })?;

            for _ in 0..*pages {
                match session.load_next().await? {
                    LoadOutcome::Loaded(page) => {
                        for listing in &page.events {
                            print_listing(listing);
                        }
                    }
                    LoadOutcome::Exhausted => break,
                    LoadOutcome::Stale | LoadOutcome::Busy => continue,
                }
            }

            log::info!(
                "Showing {} of {} events ({})",
                session.events().len(),
                session.total().unwrap_or(0),
                if session.is_exhausted() {
                    "end of list"
                } else {
                    "more available"
                }
            );
        }

        Command::Track { event_id } | Command::Untrack { event_id } => {
            let (backend, viewer, ctx) = open(&cli, &config).await?;
            let toggle = TrackingToggle::new(&ctx);
            let target = if matches!(cli.command, Command::Track { .. }) {
                TrackState::Tracked
            } else {
                TrackState::Untracked
            };
            if let Err(e) = toggle.set(&viewer, event_id, target).await {
                ctx.notifier.failure(&(&e).into());
                return Err(e);
            }
            backend.persist().await?;
            ctx.notifier.success("Your tracked events have been updated.");
        }

        Command::Home => {
            let (backend, viewer, _) = open(&cli, &config).await?;
            let feed = home_feed(
                &*backend.store,
                &viewer,
                &SystemClock,
                config.discovery.home_feed_limit,
            )
            .await?;
            if feed.is_empty() {
                log::info!("No upcoming events at your school.");
            }
            for listing in &feed {
                print_listing(listing);
            }
        }

        Command::Dashboard => {
            let (backend, viewer, _) = open(&cli, &config).await?;
            let board = dashboard(&*backend.profiles, &viewer).await?;

            match &board.profile {
                Some(profile) => println!(
                    "{} ({})",
                    profile.name,
                    profile.location.as_deref().unwrap_or("location unknown")
                ),
                None => println!("{}", board.affiliation),
            }

            println!("\nParticipated events");
            if board.participated.is_empty() {
                println!("  You haven't participated in any events.");
            }
            for event in &board.participated {
                println!(
                    "  {}  {}  by {}",
                    event.starts_at.format("%Y-%m-%d %H:%M"),
                    event.name,
                    event.club_name
                );
            }

            println!("\nJoined clubs");
            if board.clubs.is_empty() {
                println!("  You haven't joined any clubs yet.");
            }
            for club in &board.clubs {
                println!("  {}  {}", club.name, club.category.as_deref().unwrap_or("-"));
            }
        }

        Command::RegisterClub {
            name,
            description,
            category,
            logo_url,
        } => {
            let (backend, viewer, _) = open(&cli, &config).await?;
            let input = ClubInput {
                name: name.clone(),
                description: description.clone(),
                category: category.clone(),
                logo_url: logo_url.clone(),
            };
            let club = register_club(&*backend.store, &viewer, &input).await?;
            backend.persist().await?;
            println!("{}  {}  ({})", club.id, club.name, club.verification.as_str());
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("Config OK");

            if let Some(path) = &cli.fixture {
                let snapshot = MemoryStore::load(path).await?.snapshot();
                log::info!(
                    "Fixture OK: {} affiliations, {} clubs, {} events, {} marks, {} memberships, {} participations",
                    snapshot.affiliations.len(),
                    snapshot.clubs.len(),
                    snapshot.events.len(),
                    snapshot.marks.len(),
                    snapshot.memberships.len(),
                    snapshot.participations.len()
                );
            }
        }
    }

    Ok(())
}
