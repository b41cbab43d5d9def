//! Clima CLI
//!
//! Climate risk reports, action plans and forecasts from the command line.
//!
//! ```bash
//! clima --lat 40.71 --lon -74.01 --name "New York" report flood
//! clima --lat 40.71 --lon -74.01 --name "New York" --store reports.json dashboard
//! clima --lat 40.71 --lon -74.01 --name "New York" status flood "Clear gutters" completed
//! ```
//!
//! Logging goes to stderr (`RUST_LOG` or `--verbose`); results go to stdout,
//! as JSON with `--json`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use clima_core::{
    HomeType, HouseholdMember, ItemStatus, LocalEnvironment, Location, RiskType, TemperatureUnit,
    UserProfile,
};
use clima_runtime::{ChatSession, ReportRequest, ToolContext};

mod context;
mod output;

use context::CliContext;

#[derive(Parser)]
#[command(name = "clima")]
#[command(about = "Climate risk reports and preparedness plans")]
#[command(version)]
struct Cli {
    /// Runtime configuration (YAML)
    #[arg(short, long, global = true, env = "CLIMA_CONFIG")]
    config: Option<PathBuf>,

    /// Report store file, loaded at start and saved after changes
    #[arg(short, long, global = true, env = "CLIMA_STORE")]
    store: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    location: LocationArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LocationArgs {
    /// Latitude in decimal degrees
    #[arg(long, global = true, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude in decimal degrees
    #[arg(long, global = true, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Place name used in prompts and output
    #[arg(long, global = true)]
    name: Option<String>,
}

impl LocationArgs {
    fn location(&self) -> Result<Location> {
        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            anyhow::bail!("This command needs a location: pass --lat and --lon");
        };
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            anyhow::bail!("Coordinates out of range: {}, {}", lat, lon);
        }
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("{:.2}, {:.2}", lat, lon));
        Ok(Location::new(lat, lon, name))
    }
}

#[derive(Args)]
struct ProfileArgs {
    /// Kind of home
    #[arg(long, value_enum)]
    home: Option<HomeArg>,

    /// Household members needing extra care (repeatable)
    #[arg(long = "household", value_enum)]
    household: Vec<HouseholdArg>,

    /// Surroundings of the home (repeatable)
    #[arg(long = "near", value_enum)]
    near: Vec<EnvironmentArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum HomeArg {
    House,
    Apartment,
    Other,
}

#[derive(Clone, Copy, ValueEnum)]
enum HouseholdArg {
    Pets,
    Children,
    Elderly,
}

#[derive(Clone, Copy, ValueEnum)]
enum EnvironmentArg {
    River,
    Forest,
    DenseUrban,
    Coastal,
}

impl ProfileArgs {
    fn profile(&self) -> UserProfile {
        UserProfile {
            home_type: match self.home {
                Some(HomeArg::House) => HomeType::House,
                Some(HomeArg::Apartment) => HomeType::Apartment,
                Some(HomeArg::Other) => HomeType::Other,
                None => HomeType::Unspecified,
            },
            household_details: self
                .household
                .iter()
                .map(|h| match h {
                    HouseholdArg::Pets => HouseholdMember::Pets,
                    HouseholdArg::Children => HouseholdMember::Children,
                    HouseholdArg::Elderly => HouseholdMember::Elderly,
                })
                .collect(),
            local_environment: self
                .near
                .iter()
                .map(|e| match e {
                    EnvironmentArg::River => LocalEnvironment::River,
                    EnvironmentArg::Forest => LocalEnvironment::Forest,
                    EnvironmentArg::DenseUrban => LocalEnvironment::DenseUrban,
                    EnvironmentArg::Coastal => LocalEnvironment::Coastal,
                })
                .collect(),
        }
    }
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum UnitArg {
    #[default]
    Celsius,
    Fahrenheit,
}

impl From<UnitArg> for TemperatureUnit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::Celsius => TemperatureUnit::Celsius,
            UnitArg::Fahrenheit => TemperatureUnit::Fahrenheit,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate (or complete) the report for one risk type
    Report {
        /// flood, heatwave, drought or wildfire
        risk: RiskType,

        /// Regenerate the action plan, keeping progress on matching items
        #[arg(long)]
        refresh_plan: bool,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Generate reports for all four risk types
    Dashboard {
        /// Reports generated at the same time
        #[arg(long, default_value = "1")]
        concurrency: usize,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Five-day forecast
    Forecast {
        #[arg(long, value_enum, default_value_t)]
        unit: UnitArg,
    },

    /// Weather alerts for the coming days
    Alerts {
        /// Alert id to hide (repeatable)
        #[arg(long)]
        dismiss: Vec<String>,
    },

    /// Compare the risks here with another place
    Compare {
        /// The other place
        other: String,
    },

    /// Five carbon-footprint challenges
    Challenges,

    /// Today's climate tip
    Tip,

    /// A short shareable summary of a stored report
    Share { risk: RiskType },

    /// Talk to the assistant (one message per line, empty line or EOF to quit)
    Chat,

    /// Set the status of an action item
    Status {
        risk: RiskType,

        /// Item id or title
        item: String,

        /// to-do, in-progress or completed
        status: ItemStatus,
    },

    /// Put every item of a plan back to To Do
    ResetProgress { risk: RiskType },

    /// Forget every stored report
    Clear,
}

fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

/// A token cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current step");
            child.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let ctx = CliContext::new(cli.config.as_deref(), cli.store.clone(), cli.json).await?;
    run(&ctx, &cli.location, cli.command).await
}

async fn run(ctx: &CliContext, location: &LocationArgs, command: Commands) -> Result<()> {
    let runtime = &ctx.runtime;
    let today = chrono::Local::now().date_naive();

    match command {
        Commands::Report {
            risk,
            refresh_plan,
            profile,
        } => {
            let location = location.location()?;
            let mut request =
                ReportRequest::new(location.clone(), risk).with_profile(profile.profile());
            if refresh_plan {
                request = request.refreshing_plan();
            }
            let outcome = runtime.reports().report(&request, &interrupt_token()).await;
            ctx.save().await?;

            if ctx.json {
                output::print_json(&outcome)?;
            } else {
                print!("{}", output::report(&location, risk, &outcome));
            }
        }

        Commands::Dashboard {
            concurrency,
            profile,
        } => {
            let location = location.location()?;
            let outcomes = runtime
                .reports()
                .reports_for(
                    &location,
                    &RiskType::ALL,
                    &profile.profile(),
                    concurrency,
                    &interrupt_token(),
                )
                .await;
            ctx.save().await?;

            if ctx.json {
                let mut by_risk = serde_json::Map::new();
                for (risk, outcome) in &outcomes {
                    by_risk.insert(risk.to_string(), serde_json::to_value(outcome)?);
                }
                output::print_json(&by_risk)?;
            } else {
                for (risk, outcome) in &outcomes {
                    println!("{}", output::report(&location, *risk, outcome));
                }
            }
        }

        Commands::Forecast { unit } => {
            let location = location.location()?;
            let unit = TemperatureUnit::from(unit);
            let days = runtime.insights().forecast(&location, unit).await?;
            if ctx.json {
                output::print_json(&days)?;
            } else {
                print!("{}", output::forecast(&location, &days, unit));
            }
        }

        Commands::Alerts { dismiss } => {
            let location = location.location()?;
            let alerts = runtime.insights().alerts(&location, today, &dismiss).await?;
            if ctx.json {
                output::print_json(&alerts)?;
            } else {
                print!("{}", output::alerts(&alerts));
            }
        }

        Commands::Compare { other } => {
            let location = location.location()?;
            let data = runtime.insights().compare(&location, &other).await?;
            if ctx.json {
                output::print_json(&data)?;
            } else {
                print!("{}", output::comparison(&location, &other, &data));
            }
        }

        Commands::Challenges => {
            let location = location.location()?;
            let challenges = runtime.insights().challenges_or_default(&location).await;
            if ctx.json {
                output::print_json(&challenges)?;
            } else {
                print!("{}", output::challenges(&challenges));
            }
        }

        Commands::Tip => {
            let tip = runtime.insights().daily_tip(today).await?;
            if ctx.json {
                output::print_json(&serde_json::json!({ "date": today, "tip": tip }))?;
            } else {
                println!("{}", tip);
            }
        }

        Commands::Share { risk } => {
            let location = location.location()?;
            let report = runtime
                .reports()
                .stored(&location, risk)
                .await
                .with_context(|| {
                    format!("No stored {} report here; run `clima report {}` first", risk, risk)
                })?;
            let summary = runtime
                .insights()
                .share_summary(&location, risk, &report)
                .await?;
            if ctx.json {
                output::print_json(&serde_json::json!({ "summary": summary }))?;
            } else {
                println!("{}", summary);
            }
        }

        Commands::Chat => chat(ctx, location).await?,

        Commands::Status { risk, item, status } => {
            let location = location.location()?;
            let updated = runtime
                .reports()
                .update_item_status(&location, risk, &item, status)
                .await?;
            ctx.save().await?;
            if ctx.json {
                output::print_json(&updated)?;
            } else {
                println!("{}", output::item_line(&updated));
            }
        }

        Commands::ResetProgress { risk } => {
            let location = location.location()?;
            runtime.reports().reset_progress(&location, risk).await?;
            ctx.save().await?;
            println!("Progress reset for the {} plan at {}", risk, location.display_name);
        }

        Commands::Clear => {
            runtime.reports().clear().await;
            ctx.save().await?;
            println!("All stored reports cleared");
        }
    }
    Ok(())
}

async fn chat(ctx: &CliContext, location: &LocationArgs) -> Result<()> {
    let runtime = &ctx.runtime;
    let mut tools = ToolContext::default();
    if let Ok(location) = location.location() {
        for stored in runtime.reports().store().reports_at(&location).await {
            tools.reports.insert(stored.key.risk, stored.report);
        }
        tools.location = Some(location);
    }

    let mut status = runtime.chat().subscribe();
    let watcher = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            tracing::info!(status = %current, "Assistant");
        }
    });

    let mut session = ChatSession::new(runtime.chat().clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("Ask about climate risks, your plans or the weather. Empty line to quit.");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let reply = session.send(line, &tools).await;
        println!("{}\n", reply);
    }

    watcher.abort();
    Ok(())
}
