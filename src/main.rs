//! CLI preview tool: runs the optimizer over an in-memory demo roster and
//! prints the resulting month as a table, optionally exporting it to CSV.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::Parser;
use duty_roster_core::config::CoreConfig;
use duty_roster_core::keys::PersonKey;
use duty_roster_core::model::{Duty, Person, Preference, Service, ServiceDuties};
use duty_roster_core::repository::InMemoryRepository;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "duty-roster", about = "Preview a fair monthly duty schedule")]
struct Cli {
    /// month to schedule, as YYYY-MM
    #[arg(long, value_parser = parse_year_month)]
    month: (i32, u32),

    /// optional TOML config overriding the optimizer's defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// write the resulting schedule to this CSV path
    #[arg(long)]
    out: Option<PathBuf>,
}

fn parse_year_month(s: &str) -> Result<(i32, u32), String> {
    let (y, m) = s.split_once('-').ok_or("expected YYYY-MM")?;
    let year: i32 = y.parse().map_err(|_| "invalid year")?;
    let month: u32 = m.parse().map_err(|_| "invalid month")?;
    if !(1..=12).contains(&month) {
        return Err("month must be 1..=12".into());
    }
    Ok((year, month))
}

fn demo_repository() -> InMemoryRepository {
    let repo = InMemoryRepository::new();

    repo.seed_persons(vec![
        Person { id: "alice".into(), first_name: "Alice".into(), last_name: "Adams".into(), active: true },
        Person { id: "bob".into(), first_name: "Bob".into(), last_name: "Baker".into(), active: true },
        Person { id: "carol".into(), first_name: "Carol".into(), last_name: "Clarke".into(), active: true },
    ]);

    repo.seed_services(vec![
        ServiceDuties {
            service: Service {
                id: "sunday".into(),
                name: "Sunday service".into(),
                weekday: Some(0),
                start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            },
            duties: vec![Duty {
                id: "reader".into(),
                name: "Reader".into(),
                service_id: "sunday".into(),
                order: 0,
                excludes: Default::default(),
                time_period: None,
            }],
        },
        ServiceDuties {
            service: Service {
                id: "weekly".into(),
                name: "Weekly cleaning".into(),
                weekday: None,
                start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            },
            duties: vec![Duty {
                id: "cleaner".into(),
                name: "Cleaner".into(),
                service_id: "weekly".into(),
                order: 1,
                excludes: Default::default(),
                time_period: None,
            }],
        },
    ]);

    repo.seed_preferences(vec![
        Preference { person_id: "alice".into(), duty_id: "reader".into(), value: 1.0 },
        Preference { person_id: "bob".into(), duty_id: "reader".into(), value: 1.0 },
        Preference { person_id: "carol".into(), duty_id: "reader".into(), value: 1.0 },
        Preference { person_id: "alice".into(), duty_id: "cleaner".into(), value: 1.0 },
        Preference { person_id: "bob".into(), duty_id: "cleaner".into(), value: 1.0 },
    ]);

    repo.seed_version(duty_roster_core::model::ScheduleVersion {
        id: "draft".into(),
        name: "preview".into(),
        month_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(), // overwritten below
        creator: "alice".into(),
        parent_version: None,
        is_official: false,
    });

    repo
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let (year, month) = cli.month;

    let config = match &cli.config {
        Some(path) => CoreConfig::load(path.to_str().context("config path must be valid UTF-8")?)?,
        None => CoreConfig::default(),
    };

    let repo = demo_repository();
    let version_id = "draft".into();
    repo.seed_version(duty_roster_core::model::ScheduleVersion {
        id: "draft".into(),
        name: "preview".into(),
        month_date: NaiveDate::from_ymd_opt(year, month, 1).context("invalid year/month")?,
        creator: "alice".into(),
        parent_version: None,
        is_official: false,
    });

    let locked: std::collections::HashMap<duty_roster_core::keys::SlotKey, PersonKey> =
        std::collections::HashMap::new();

    let schedule = duty_roster_core::generate_schedule(&repo, &version_id, &config, &locked)?;

    println!("{:<14} {:<10} {}", "Date", "Duty", "Person");
    for (slot, person) in &schedule {
        println!("{:<14} {:<10} {}", slot.date, slot.duty, person);
    }

    if let Some(out) = &cli.out {
        let mut writer = csv::Writer::from_path(out)
            .with_context(|| format!("opening {} for writing", out.display()))?;
        writer.write_record(["date", "duty", "person"])?;
        for (slot, person) in &schedule {
            writer.write_record([slot.date.to_string(), slot.duty.to_string(), person.to_string()])?;
        }
        writer.flush()?;
        println!("\nwrote {} rows to {}", schedule.len(), out.display());
    }

    Ok(())
}
