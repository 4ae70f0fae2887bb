use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};
use shared::{
    domain::{AppointmentStatus, ClientFilter, RecurrenceScope},
    recurrence::RecurrenceRule,
};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

#[derive(Parser, Debug)]
#[command(name = "salon-admin", about = "Salon administration from the command line")]
struct Cli {
    /// Config file; defaults to ./salon-admin.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// API address, overriding the config file and environment.
    #[arg(long)]
    api_url: Option<String>,
    /// Salon UTC offset for entered times, e.g. -07:00. Defaults to this machine's.
    #[arg(long, value_parser = commands::parse_offset)]
    utc_offset: Option<chrono::FixedOffset>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(subcommand)]
    Locations(LocationCommand),
    #[command(subcommand)]
    Technicians(TechnicianCommand),
    #[command(subcommand)]
    Clients(ClientCommand),
    #[command(subcommand)]
    Appointments(AppointmentCommand),
    #[command(subcommand)]
    Blocks(BlockCommand),
    /// List bookable services.
    Services,
    /// Open slots for a location on a date.
    Availability {
        location: String,
        date: NaiveDate,
        #[arg(long)]
        technician: Option<String>,
        #[arg(long)]
        service: Option<String>,
    },
    #[command(subcommand)]
    Rrule(RruleCommand),
}

#[derive(Subcommand, Debug)]
enum LocationCommand {
    List,
    Create {
        name: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        state: String,
        #[arg(long)]
        zip: String,
        #[arg(long)]
        phone: String,
        /// Generated from the name when omitted.
        #[arg(long)]
        slug: Option<String>,
    },
    Delete {
        id: String,
    },
    /// Set one day's opening hours.
    Hours {
        id: String,
        #[arg(value_parser = commands::parse_weekday)]
        day: shared::domain::Weekday,
        #[arg(long, value_parser = commands::parse_time, required_unless_present = "closed")]
        open: Option<NaiveTime>,
        #[arg(long, value_parser = commands::parse_time, required_unless_present = "closed")]
        close: Option<NaiveTime>,
        #[arg(long)]
        closed: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TechnicianCommand {
    List {
        #[arg(long)]
        location: Option<String>,
    },
    Create {
        name: String,
        #[arg(long, default_value = "#1f8a70")]
        color: String,
        /// Repeat for each location.
        #[arg(long = "location", required = true)]
        locations: Vec<String>,
        #[arg(long)]
        master_fee: bool,
    },
    Activate {
        id: String,
    },
    Deactivate {
        id: String,
    },
    Delete {
        id: String,
    },
    Schedule {
        id: String,
    },
}

/// Narrows the loaded client page so the target client is on it.
#[derive(Args, Debug)]
struct ClientLookup {
    id: String,
    #[arg(long)]
    search: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ClientCommand {
    Search {
        #[arg(default_value = "")]
        term: String,
        #[arg(long, default_value = "all")]
        filter: ClientFilter,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Block {
        #[command(flatten)]
        lookup: ClientLookup,
        #[arg(long)]
        reason: Option<String>,
    },
    Unblock {
        #[command(flatten)]
        lookup: ClientLookup,
    },
    Update {
        #[command(flatten)]
        lookup: ClientLookup,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    History {
        id: String,
    },
}

#[derive(Args, Debug, Default)]
struct Range {
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
enum AppointmentCommand {
    List {
        #[command(flatten)]
        range: Range,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        technician: Option<String>,
    },
    Create {
        #[arg(long)]
        client: String,
        #[arg(long)]
        technician: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        service: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, value_parser = commands::parse_time)]
        time: NaiveTime,
        /// Minutes; the service's standard length when omitted.
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Move or resize an appointment.
    Reschedule {
        id: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, value_parser = commands::parse_time)]
        time: Option<NaiveTime>,
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long, value_parser = commands::parse_time, conflicts_with = "duration")]
        end: Option<NaiveTime>,
        #[arg(long, default_value = "this")]
        scope: RecurrenceScope,
    },
    Status {
        id: String,
        status: AppointmentStatus,
    },
    Cancel {
        id: String,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long, default_value = "this")]
        scope: RecurrenceScope,
    },
    NoShow {
        id: String,
        #[arg(long, default_value_t = 0)]
        fee_cents: i64,
    },
    WaiveFee {
        id: String,
        reason: String,
    },
    LineItems {
        id: String,
    },
    AddItem {
        id: String,
        #[arg(long, value_parser = commands::parse_line_item_kind)]
        kind: shared::domain::LineItemKind,
        #[arg(long)]
        description: String,
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        product: Option<String>,
        #[arg(long, default_value_t = 1)]
        quantity: u32,
        #[arg(long)]
        price_cents: i64,
    },
    RemoveItem {
        id: String,
        item_id: String,
    },
    /// Make the appointment the first of a series.
    Repeat {
        id: String,
        rule: RecurrenceRule,
        #[arg(long, conflicts_with = "until", required_unless_present = "until")]
        count: Option<u32>,
        #[arg(long)]
        until: Option<NaiveDate>,
    },
    StopRepeat {
        id: String,
        #[arg(long, default_value = "this_and_future")]
        scope: RecurrenceScope,
    },
}

#[derive(Subcommand, Debug)]
enum BlockCommand {
    List {
        technician: String,
        #[command(flatten)]
        range: Range,
    },
    Create {
        technician: String,
        title: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, value_parser = commands::parse_time)]
        start: NaiveTime,
        #[arg(long, value_parser = commands::parse_time)]
        end: NaiveTime,
        #[arg(long)]
        rule: Option<RecurrenceRule>,
    },
    Delete {
        technician: String,
        id: String,
        #[arg(long, default_value = "this")]
        scope: RecurrenceScope,
    },
}

#[derive(Subcommand, Debug)]
enum RruleCommand {
    /// Parse a rule, print its canonical form and the first occurrences.
    Check {
        rule: String,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = config::load_settings(cli.config.as_deref())?;
    if let Some(api_url) = &cli.api_url {
        settings.api_url = config::normalize_api_url(api_url)?;
    }

    let filter = EnvFilter::try_new(&settings.log_filter)
        .with_context(|| format!("invalid log filter '{}'", settings.log_filter))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let app = commands::App::new(&settings, cli.utc_offset)?;
    commands::run(&app, cli.command).await
}
