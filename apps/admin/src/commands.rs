use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Days, FixedOffset, Local, NaiveDateTime, NaiveTime, TimeZone, Utc};
use client_core::{
    AppointmentDraft, AppointmentsView, BlocksView, ClientResult, ClientsView, LocationsView,
    RecordingNotifier, RecurrenceEnd, SalonApi, TechniciansView, ToastLevel,
};
use shared::{
    domain::{
        AppointmentId, BlockId, ClientId, LineItemId, LineItemKind, LocationId, ProductId,
        ServiceId, TechnicianId, Weekday,
    },
    protocol::{
        AppointmentQuery, AvailabilityQuery, BlockInput, BlockQuery, ClientPatch, DayHours,
        LineItemInput, LocationInput, OperatingHours, TechnicianInput,
    },
    recurrence::RecurrenceRule,
    validation::format_phone,
};
use tracing::debug;

use crate::{
    config::Settings, AppointmentCommand, BlockCommand, ClientCommand, ClientLookup, Command,
    LocationCommand, Range, RruleCommand, TechnicianCommand,
};

pub struct App {
    api: SalonApi,
    notifier: Arc<RecordingNotifier>,
    offset: FixedOffset,
}

impl App {
    pub fn new(settings: &Settings, offset: Option<FixedOffset>) -> Result<Self> {
        let api = SalonApi::new(&settings.api_url, settings.client_options())
            .with_context(|| format!("failed to set up api client for '{}'", settings.api_url))?;
        let offset = offset.unwrap_or_else(|| *Local::now().offset());
        debug!("admin: api_url={} utc_offset={offset}", settings.api_url);
        Ok(Self {
            api,
            notifier: Arc::new(RecordingNotifier::default()),
            offset,
        })
    }

    fn locations(&self) -> LocationsView {
        LocationsView::new(self.api.clone(), self.notifier.clone())
    }

    fn technicians(&self) -> TechniciansView {
        TechniciansView::new(self.api.clone(), self.notifier.clone())
    }

    fn clients(&self) -> ClientsView {
        ClientsView::new(self.api.clone(), self.notifier.clone())
    }

    fn appointments(&self) -> AppointmentsView {
        AppointmentsView::new(self.api.clone(), self.notifier.clone())
    }

    fn blocks(&self) -> BlocksView {
        BlocksView::new(self.api.clone(), self.notifier.clone())
    }

    /// Print pending toasts, then surface the action's error if it failed.
    fn settle<T>(&self, result: ClientResult<T>) -> Result<T> {
        for toast in self.notifier.take() {
            match toast.level {
                ToastLevel::Success => println!("ok: {}", toast.message),
                ToastLevel::Info => println!("info: {}", toast.message),
                ToastLevel::Error => eprintln!("error: {}", toast.message),
            }
        }
        Ok(result?)
    }

    fn to_utc(&self, local: NaiveDateTime) -> Result<DateTime<Utc>> {
        self.offset
            .from_local_datetime(&local)
            .single()
            .map(|time| time.with_timezone(&Utc))
            .ok_or_else(|| anyhow!("{local} does not exist at offset {}", self.offset))
    }

    fn local(&self, time: DateTime<Utc>) -> String {
        time.with_timezone(&self.offset)
            .format("%Y-%m-%d %H:%M")
            .to_string()
    }

    fn range(&self, range: &Range) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let start = range
            .from
            .map(|date| self.to_utc(date.and_time(NaiveTime::MIN)))
            .transpose()?;
        let end = range
            .to
            .and_then(|date| date.checked_add_days(Days::new(1)))
            .map(|date| self.to_utc(date.and_time(NaiveTime::MIN)))
            .transpose()?;
        Ok((start, end))
    }
}

pub async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Locations(command) => locations(app, command).await,
        Command::Technicians(command) => technicians(app, command).await,
        Command::Clients(command) => clients(app, command).await,
        Command::Appointments(command) => appointments(app, command).await,
        Command::Blocks(command) => blocks(app, command).await,
        Command::Services => {
            let services = app.settle(app.appointments().services().await)?;
            for service in services {
                println!(
                    "{}  {}  {} min  {}{}",
                    service.id,
                    service.name,
                    service.duration_minutes,
                    money(service.price_cents),
                    if service.active { "" } else { "  (inactive)" }
                );
            }
            Ok(())
        }
        Command::Availability {
            location,
            date,
            technician,
            service,
        } => {
            let query = AvailabilityQuery {
                location_id: LocationId::new(location),
                date,
                technician_id: technician.map(TechnicianId::new),
                service_id: service.map(ServiceId::new),
            };
            let slots = app.settle(app.appointments().availability(&query).await)?;
            if slots.is_empty() {
                println!("no open slots");
            }
            for slot in slots {
                println!(
                    "{} - {}  technician={}",
                    app.local(slot.start_time),
                    app.local(slot.end_time),
                    slot.technician_id
                );
            }
            Ok(())
        }
        Command::Rrule(RruleCommand::Check { rule, from, limit }) => {
            let rule: RecurrenceRule = rule.parse().context("invalid recurrence rule")?;
            println!("{rule}");
            let from = from.unwrap_or_else(|| Local::now().date_naive());
            for occurrence in rule.occurrences_from_date(from, limit) {
                println!("  {}", occurrence.format("%a %Y-%m-%d %H:%M"));
            }
            Ok(())
        }
    }
}

async fn locations(app: &App, command: LocationCommand) -> Result<()> {
    let view = app.locations();
    match command {
        LocationCommand::List => {
            let locations = app.settle(view.load().await)?.unwrap_or_default();
            for location in locations {
                println!(
                    "{}  {} ({})  {}, {}  {}  technicians={}",
                    location.id,
                    location.name,
                    location.slug,
                    location.city,
                    location.state,
                    format_phone(&location.phone),
                    location.technician_count
                );
            }
        }
        LocationCommand::Create {
            name,
            address,
            city,
            state,
            zip,
            phone,
            slug,
        } => {
            let input = LocationInput {
                name,
                slug: slug.unwrap_or_default(),
                address,
                city,
                state,
                zip,
                phone,
                hours: OperatingHours::standard(),
            };
            let location = app.settle(view.create(input).await)?;
            println!("{}", location.id);
        }
        LocationCommand::Delete { id } => {
            app.settle(view.load().await)?;
            app.settle(view.delete(&LocationId::new(id)).await)?;
        }
        LocationCommand::Hours {
            id,
            day,
            open,
            close,
            closed,
        } => {
            app.settle(view.load().await)?;
            let id = LocationId::new(id);
            let mut hours = view
                .get(&id)
                .await
                .map(|location| location.hours)
                .ok_or_else(|| anyhow!("location {id} not found"))?;
            let day_hours = match (closed, open, close) {
                (true, _, _) => DayHours::closed(),
                (false, Some(open), Some(close)) => DayHours::open(open, close),
                _ => bail!("--open and --close are required unless --closed is set"),
            };
            hours.set(day, day_hours);
            app.settle(view.update_hours(&id, hours).await)?;
        }
    }
    Ok(())
}

async fn technicians(app: &App, command: TechnicianCommand) -> Result<()> {
    let view = app.technicians();
    match command {
        TechnicianCommand::List { location } => {
            let location = location.map(LocationId::new);
            let technicians = app
                .settle(view.load(location.as_ref()).await)?
                .unwrap_or_default();
            for technician in technicians {
                let locations: Vec<_> = technician
                    .location_ids
                    .iter()
                    .map(LocationId::as_str)
                    .collect();
                println!(
                    "{}  {}  {}  {}  locations={}  appointments={}{}",
                    technician.id,
                    technician.name,
                    technician.color,
                    if technician.active { "active" } else { "inactive" },
                    locations.join(","),
                    technician.appointment_count,
                    if technician.master_fee { "  master-fee" } else { "" }
                );
            }
        }
        TechnicianCommand::Create {
            name,
            color,
            locations,
            master_fee,
        } => {
            let input = TechnicianInput {
                name,
                color,
                active: true,
                master_fee,
                location_ids: locations.into_iter().map(LocationId::new).collect(),
            };
            let technician = app.settle(view.create(input).await)?;
            println!("{}", technician.id);
        }
        TechnicianCommand::Activate { id } => set_active(app, &view, id, true).await?,
        TechnicianCommand::Deactivate { id } => set_active(app, &view, id, false).await?,
        TechnicianCommand::Delete { id } => {
            app.settle(view.load(None).await)?;
            app.settle(view.delete(&TechnicianId::new(id)).await)?;
        }
        TechnicianCommand::Schedule { id } => {
            let schedule = app.settle(view.schedule(&TechnicianId::new(id)).await)?;
            for day in Weekday::ALL {
                match schedule.days.get(day) {
                    Some(hours) if hours.is_open => println!(
                        "{day:?}: {} - {}",
                        hours.open.format("%H:%M"),
                        hours.close.format("%H:%M")
                    ),
                    _ => println!("{day:?}: off"),
                }
            }
        }
    }
    Ok(())
}

async fn set_active(app: &App, view: &TechniciansView, id: String, active: bool) -> Result<()> {
    app.settle(view.load(None).await)?;
    app.settle(view.set_active(&TechnicianId::new(id), active).await)?;
    Ok(())
}

async fn locate_client(app: &App, view: &ClientsView, lookup: &ClientLookup) -> Result<ClientId> {
    match &lookup.search {
        Some(term) => app.settle(view.search(term).await)?,
        None => app.settle(view.refresh().await)?,
    };
    let id = ClientId::new(lookup.id.as_str());
    if view.get(&id).await.is_none() {
        bail!("client {id} is not on the loaded page; pass --search to narrow the list");
    }
    Ok(id)
}

async fn clients(app: &App, command: ClientCommand) -> Result<()> {
    let view = app.clients();
    match command {
        ClientCommand::Search { term, filter, page } => {
            let mut listing = app.settle(view.set_filter(filter).await)?;
            if !term.trim().is_empty() {
                listing = app.settle(view.search(&term).await)?;
            }
            if page > 1 {
                listing = app.settle(view.go_to_page(page).await)?;
            }
            let Some(listing) = listing else {
                return Ok(());
            };
            for client in &listing.clients {
                println!(
                    "{}  {}  {}  visits={} no-shows={}{}",
                    client.id,
                    client.name,
                    format_phone(&client.phone),
                    client.visit_count,
                    client.no_show_count,
                    if client.blocked { "  BLOCKED" } else { "" }
                );
            }
            println!(
                "page {} of {} ({} clients)",
                listing.page,
                listing.page_count(),
                listing.total
            );
        }
        ClientCommand::Block { lookup, reason } => {
            let id = locate_client(app, &view, &lookup).await?;
            app.settle(view.set_blocked(&id, true, reason).await)?;
        }
        ClientCommand::Unblock { lookup } => {
            let id = locate_client(app, &view, &lookup).await?;
            app.settle(view.set_blocked(&id, false, None).await)?;
        }
        ClientCommand::Update {
            lookup,
            name,
            phone,
            email,
            notes,
        } => {
            let id = locate_client(app, &view, &lookup).await?;
            if let Some(notes) = notes {
                app.settle(view.update_notes(&id, &notes).await)?;
            }
            let patch = ClientPatch {
                name,
                phone,
                email,
                ..ClientPatch::default()
            };
            if !patch.is_empty() {
                let client = app.settle(view.update_contact(&id, patch).await)?;
                println!("{}  {}", client.name, format_phone(&client.phone));
            }
        }
        ClientCommand::History { id } => {
            let history = app.settle(view.appointment_history(&ClientId::new(id)).await)?;
            for appointment in history {
                println!(
                    "{}  {}  {}  technician={}",
                    appointment.id,
                    app.local(appointment.start_time),
                    appointment.status,
                    appointment.technician_id
                );
            }
        }
    }
    Ok(())
}

/// Guarded appointment actions work on the loaded calendar.
async fn load_all(app: &App, view: &AppointmentsView) -> Result<()> {
    app.settle(view.load(&AppointmentQuery::default()).await)?;
    Ok(())
}

async fn appointments(app: &App, command: AppointmentCommand) -> Result<()> {
    let view = app.appointments();
    match command {
        AppointmentCommand::List {
            range,
            location,
            technician,
        } => {
            let (start, end) = app.range(&range)?;
            let query = AppointmentQuery {
                start,
                end,
                location_id: location.map(LocationId::new),
                technician_id: technician.map(TechnicianId::new),
            };
            let appointments = app.settle(view.load(&query).await)?.unwrap_or_default();
            for appointment in appointments {
                println!(
                    "{}  {} ({} min)  {}  client={} technician={}{}",
                    appointment.id,
                    app.local(appointment.start_time),
                    appointment.duration_minutes(),
                    appointment.status,
                    appointment.client_id,
                    appointment.technician_id,
                    if appointment.is_recurring() { "  repeats" } else { "" }
                );
            }
        }
        AppointmentCommand::Create {
            client,
            technician,
            location,
            service,
            date,
            time,
            duration,
            notes,
        } => {
            let mut draft = AppointmentDraft::new(date.and_time(time), app.offset);
            draft.client_id = Some(ClientId::new(client));
            draft.technician_id = Some(TechnicianId::new(technician));
            draft.location_id = Some(LocationId::new(location));
            draft.notes = notes.unwrap_or_default();
            let service_id = ServiceId::new(service);
            match duration {
                Some(minutes) => {
                    draft.service_id = Some(service_id);
                    draft.set_duration(minutes);
                }
                None => {
                    let services = app.settle(view.services().await)?;
                    let service = services
                        .iter()
                        .find(|service| service.id == service_id)
                        .ok_or_else(|| anyhow!("service {service_id} not found"))?;
                    draft.apply_service(service);
                }
            }
            let appointment = app.settle(view.create(&draft).await)?;
            println!("{}", appointment.id);
        }
        AppointmentCommand::Reschedule {
            id,
            date,
            time,
            duration,
            end,
            scope,
        } => {
            load_all(app, &view).await?;
            let id = AppointmentId::new(id);
            let mut draft = view
                .draft(&id, app.offset)
                .await
                .ok_or_else(|| anyhow!("appointment {id} not found"))?;
            if let Some(date) = date {
                draft.set_date(date);
            }
            if let Some(time) = time {
                draft.set_start_time(time);
            }
            if let Some(minutes) = duration {
                draft.set_duration(minutes);
            }
            if let Some(end) = end {
                draft.set_end_time(end)?;
            }
            app.settle(view.save(&id, &draft, scope).await)?;
        }
        AppointmentCommand::Status { id, status } => {
            load_all(app, &view).await?;
            app.settle(view.set_status(&AppointmentId::new(id), status).await)?;
        }
        AppointmentCommand::Cancel { id, reason, scope } => {
            load_all(app, &view).await?;
            app.settle(view.cancel(&AppointmentId::new(id), reason, scope).await)?;
        }
        AppointmentCommand::NoShow { id, fee_cents } => {
            load_all(app, &view).await?;
            app.settle(view.mark_no_show(&AppointmentId::new(id), fee_cents).await)?;
        }
        AppointmentCommand::WaiveFee { id, reason } => {
            load_all(app, &view).await?;
            app.settle(
                view.waive_no_show_fee(&AppointmentId::new(id), &reason)
                    .await,
            )?;
        }
        AppointmentCommand::LineItems { id } => {
            let items = app.settle(view.load_line_items(&AppointmentId::new(id)).await)?;
            for item in &items {
                println!(
                    "{}  {:?}  {} x{}  {}",
                    item.id,
                    item.kind,
                    item.description,
                    item.quantity,
                    money(item.line_total_cents())
                );
            }
            println!("total {}", money(view.total_cents().await));
        }
        AppointmentCommand::AddItem {
            id,
            kind,
            description,
            service,
            product,
            quantity,
            price_cents,
        } => {
            let input = LineItemInput {
                kind,
                description,
                service_id: service.map(ServiceId::new),
                product_id: product.map(ProductId::new),
                quantity,
                unit_price_cents: price_cents,
            };
            app.settle(view.add_line_item(&AppointmentId::new(id), input).await)?;
            println!("total {}", money(view.total_cents().await));
        }
        AppointmentCommand::RemoveItem { id, item_id } => {
            app.settle(
                view.remove_line_item(&AppointmentId::new(id), &LineItemId::new(item_id))
                    .await,
            )?;
            println!("total {}", money(view.total_cents().await));
        }
        AppointmentCommand::Repeat {
            id,
            rule,
            count,
            until,
        } => {
            let end = match (count, until) {
                (Some(count), _) => RecurrenceEnd::Count(count),
                (None, Some(until)) => RecurrenceEnd::Until(until),
                (None, None) => bail!("pass --count or --until"),
            };
            let occurrences = app.settle(
                view.make_recurring(&AppointmentId::new(id), rule, end)
                    .await,
            )?;
            for occurrence in occurrences {
                println!("{}  {}", occurrence.id, app.local(occurrence.start_time));
            }
        }
        AppointmentCommand::StopRepeat { id, scope } => {
            load_all(app, &view).await?;
            app.settle(view.stop_recurring(&AppointmentId::new(id), scope).await)?;
        }
    }
    Ok(())
}

async fn blocks(app: &App, command: BlockCommand) -> Result<()> {
    let view = app.blocks();
    match command {
        BlockCommand::List { technician, range } => {
            let (start, end) = app.range(&range)?;
            let query = BlockQuery {
                technician_id: Some(TechnicianId::new(technician)),
                start,
                end,
            };
            let blocks = app.settle(view.load(&query).await)?.unwrap_or_default();
            for block in blocks {
                println!(
                    "{}  {} - {}  {}{}",
                    block.id,
                    app.local(block.start_time),
                    app.local(block.end_time),
                    block.title,
                    block
                        .recurrence_rule
                        .map(|rule| format!("  [{rule}]"))
                        .unwrap_or_default()
                );
            }
        }
        BlockCommand::Create {
            technician,
            title,
            date,
            start,
            end,
            rule,
        } => {
            let input = BlockInput {
                technician_id: TechnicianId::new(technician),
                title,
                start_time: app.to_utc(date.and_time(start))?,
                end_time: app.to_utc(date.and_time(end))?,
                recurrence_rule: rule,
            };
            let block = app.settle(view.create(input).await)?;
            println!("{}", block.id);
        }
        BlockCommand::Delete {
            technician,
            id,
            scope,
        } => {
            let query = BlockQuery {
                technician_id: Some(TechnicianId::new(technician)),
                ..BlockQuery::default()
            };
            app.settle(view.load(&query).await)?;
            app.settle(view.delete(&BlockId::new(id), scope).await)?;
        }
    }
    Ok(())
}

fn money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}${}.{:02}", cents / 100, cents % 100)
}

pub fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| format!("expected HH:MM, got '{raw}'"))
}

pub fn parse_offset(raw: &str) -> Result<FixedOffset, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| "invalid offset".to_string());
    }
    let invalid = || format!("expected an offset like -07:00, got '{raw}'");
    let (sign, rest) = if let Some(rest) = raw.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = raw.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(invalid());
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes >= 60 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

pub fn parse_weekday(raw: &str) -> Result<Weekday, String> {
    raw.trim()
        .parse::<chrono::Weekday>()
        .map(Weekday::from_chrono)
        .map_err(|_| format!("unknown weekday '{raw}'"))
}

pub fn parse_line_item_kind(raw: &str) -> Result<LineItemKind, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "service" => Ok(LineItemKind::Service),
        "product" => Ok(LineItemKind::Product),
        "discount" => Ok(LineItemKind::Discount),
        other => Err(format!("unknown line item kind '{other}'")),
    }
}
