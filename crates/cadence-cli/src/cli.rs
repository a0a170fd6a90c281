use cadence_core::models::EditScope;
use clap::{Args, Parser, Subcommand, ValueEnum};
use uuid::Uuid;

/// Cadence: materializes recurring events into queryable instances
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the SQLite database (overrides configuration)
    #[arg(long, global = true)]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the background materialization worker
    Worker(WorkerCommand),
    /// Inspect and configure organization windows
    Window(WindowCommand),
    /// Create and manage recurring series
    Series(SeriesCommand),
    /// List, edit and cancel materialized instances
    Instances(InstancesCommand),
}

// ============================================================================
// Worker
// ============================================================================

#[derive(Parser, Debug, Clone)]
pub struct WorkerCommand {
    #[command(subcommand)]
    pub command: WorkerSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum WorkerSubcommand {
    /// Tick until interrupted
    Run(WorkerRunCommand),
    /// Run a single tick and print its summary
    Tick(WorkerTickCommand),
}

#[derive(Args, Debug, Clone)]
pub struct WorkerRunCommand {
    /// Seconds between ticks
    #[arg(long)]
    pub interval: Option<u64>,
    /// Lease owner name for this worker
    #[arg(long)]
    pub worker_id: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct WorkerTickCommand {
    /// Treat this instant as "now" (RFC 3339 or YYYY-MM-DD[ HH:MM])
    #[arg(long)]
    pub at: Option<String>,
    /// Skip the prune pass
    #[arg(long)]
    pub no_prune: bool,
}

// ============================================================================
// Windows
// ============================================================================

#[derive(Parser, Debug, Clone)]
pub struct WindowCommand {
    #[command(subcommand)]
    pub command: WindowSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum WindowSubcommand {
    /// Show an organization's window configuration
    Show(WindowOrgArgs),
    /// Create the window configuration from configured defaults
    Init(WindowOrgArgs),
    /// Update window settings; out-of-range values are rejected
    Set(WindowSetCommand),
    /// Show how many instances the next prune would remove
    Cleanup(WindowOrgArgs),
    /// Prune history for one organization now
    Prune(WindowOrgArgs),
    /// List organizations whose windows are due for processing
    Due(WindowDueCommand),
}

#[derive(Args, Debug, Clone)]
pub struct WindowOrgArgs {
    /// Organization ID
    pub organization: Uuid,
}

#[derive(Args, Debug, Clone)]
pub struct WindowSetCommand {
    /// Organization ID
    pub organization: Uuid,
    /// Months to materialize ahead of now (1-60)
    #[arg(long)]
    pub hot_months: Option<i64>,
    /// Months of history to keep (0-60)
    #[arg(long)]
    pub retention_months: Option<i64>,
    /// Processing priority (1-10, higher first)
    #[arg(long)]
    pub priority: Option<i64>,
    /// Maximum instances created per run (10-10000)
    #[arg(long)]
    pub max_instances: Option<i64>,
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,
    #[arg(long)]
    pub disable: bool,
}

#[derive(Args, Debug, Clone)]
pub struct WindowDueCommand {
    /// Maximum organizations to list
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

// ============================================================================
// Series
// ============================================================================

#[derive(Parser, Debug, Clone)]
pub struct SeriesCommand {
    #[command(subcommand)]
    pub command: SeriesSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SeriesSubcommand {
    /// Create a recurring event
    Create(SeriesCreateCommand),
    /// Show the forks of a series
    Show(SeriesIdArgs),
    /// Delete every fork, instance and exception of a series
    Delete(SeriesIdArgs),
    /// Stop expanding a rule; existing instances stay
    Pause(RuleIdArgs),
    /// Resume expanding a paused rule
    Resume(RuleIdArgs),
    /// List the rules of an organization
    List(SeriesListCommand),
}

#[derive(Args, Debug, Clone)]
pub struct SeriesCreateCommand {
    /// Organization ID
    pub organization: Uuid,
    /// Event name
    pub name: String,
    /// First occurrence start (RFC 3339 or YYYY-MM-DD[ HH:MM] in the series timezone)
    #[arg(long)]
    pub start: String,
    /// Occurrence length in minutes
    #[arg(long, default_value_t = 60, conflicts_with = "end")]
    pub duration: i64,
    /// First occurrence end, instead of --duration
    #[arg(long)]
    pub end: Option<String>,
    /// Recurrence rule, e.g. "FREQ=WEEKLY;BYDAY=MO,WE"
    #[arg(long)]
    pub rrule: String,
    /// IANA timezone the rule repeats in
    #[arg(long)]
    pub timezone: Option<String>,
    #[arg(short, long)]
    pub description: Option<String>,
    #[arg(short, long)]
    pub location: Option<String>,
    #[arg(long)]
    pub all_day: bool,
    #[arg(long)]
    pub private: bool,
    #[arg(long)]
    pub registerable: bool,
    #[arg(long)]
    pub invite_only: bool,
    /// Leave materialization to the worker
    #[arg(long)]
    pub no_seed: bool,
    /// Creator user ID
    #[arg(long)]
    pub actor: Option<Uuid>,
}

#[derive(Args, Debug, Clone)]
pub struct SeriesIdArgs {
    /// Original series ID
    pub series: Uuid,
}

#[derive(Args, Debug, Clone)]
pub struct RuleIdArgs {
    /// Recurrence rule ID
    pub rule: Uuid,
}

#[derive(Args, Debug, Clone)]
pub struct SeriesListCommand {
    /// Organization ID
    pub organization: Uuid,
    /// Include paused and retired rules
    #[arg(long)]
    pub all: bool,
}

// ============================================================================
// Instances
// ============================================================================

#[derive(Parser, Debug, Clone)]
pub struct InstancesCommand {
    #[command(subcommand)]
    pub command: InstancesSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum InstancesSubcommand {
    /// List resolved instances in a date range
    List(InstancesListCommand),
    /// Show one resolved instance
    Show(InstanceShowCommand),
    /// Edit one instance, it and the following ones, or the entire series
    Edit(InstanceEditCommand),
    /// Cancel one instance
    Cancel(InstanceActorArgs),
    /// Undo the cancellation of one instance
    Restore(InstanceActorArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InstancesListCommand {
    /// Organization ID
    pub organization: Uuid,
    /// Range start (defaults to now)
    #[arg(long)]
    pub from: Option<String>,
    /// Range end (defaults to --days after the start)
    #[arg(long, conflicts_with = "days")]
    pub to: Option<String>,
    #[arg(long, default_value_t = 30)]
    pub days: i64,
    #[arg(long)]
    pub include_cancelled: bool,
    #[arg(long)]
    pub limit: Option<u32>,
    /// Display timezone
    #[arg(long)]
    pub timezone: Option<String>,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct InstanceShowCommand {
    /// Organization ID
    pub organization: Uuid,
    /// Instance ID
    pub id: Uuid,
}

#[derive(Args, Debug, Clone)]
pub struct InstanceActorArgs {
    /// Instance ID
    pub id: Uuid,
    #[arg(long)]
    pub actor: Option<Uuid>,
}

/// Which instances an edit applies to
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeArg {
    Instance,
    Following,
    Series,
}

impl From<ScopeArg> for EditScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Instance => EditScope::ThisInstance,
            ScopeArg::Following => EditScope::ThisAndFollowing,
            ScopeArg::Series => EditScope::EntireSeries,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct InstanceEditCommand {
    /// Instance ID
    pub id: Uuid,
    #[arg(long, value_enum, default_value_t = ScopeArg::Instance)]
    pub scope: ScopeArg,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, conflicts_with = "description")]
    pub description_clear: bool,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long, conflicts_with = "location")]
    pub location_clear: bool,
    /// New start (RFC 3339 or YYYY-MM-DD[ HH:MM])
    #[arg(long)]
    pub start: Option<String>,
    /// New end (RFC 3339 or YYYY-MM-DD[ HH:MM])
    #[arg(long)]
    pub end: Option<String>,
    /// New recurrence for this and following instances
    #[arg(long)]
    pub rrule: Option<String>,
    /// Timezone for --start/--end and --rrule
    #[arg(long)]
    pub timezone: Option<String>,
    #[arg(long)]
    pub actor: Option<Uuid>,
}
