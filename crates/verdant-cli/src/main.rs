// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod session;

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine as _;
use config::Config;
use session::Session;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use verdant_app::{EnvironmentalFactors, NewPlant, schedule};
use verdant_db::TieredStore;
use verdant_sync::HttpRemote;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `verdant --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.db_path()?
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    let mut store = TieredStore::with_paths(&db_path, &config.fallback_path(&db_path));
    if !store.primary_available()
        && let Some(cause) = store.primary_error()
    {
        eprintln!("warning: primary storage unavailable, using fallback ({cause})");
    }

    let vision = if config.vision_enabled() {
        let api_key = match config.vision_api_key() {
            "" => store
                .get_setting_raw(verdant_app::SettingKey::VisionApiKey.as_str())
                .unwrap_or_default(),
            key => key.to_owned(),
        };
        Some(
            verdant_vision::Client::new(
                config.vision_base_url(),
                &api_key,
                config.vision_model(),
                config.vision_timeout()?,
            )
            .with_context(|| {
                format!(
                    "invalid [vision] config in {}; fix base_url/model/timeout values",
                    options.config_path.display()
                )
            })?,
        )
    } else {
        None
    };

    let remote = if config.sync_enabled() {
        Some(HttpRemote::new(
            config.sync_base_url(),
            config.sync_token(),
            config.sync_timeout()?,
        )?)
    } else {
        None
    };
    let user_id = config.sync_user_id().map(str::to_owned);

    let mut session = Session::open(
        store,
        vision,
        remote.map(|remote| Box::new(remote) as Box<dyn verdant_sync::CollectionRemote>),
        user_id,
    );

    if options.demo {
        seed_demo_garden(&mut session)?;
    }
    if options.check_only {
        println!("config, storage, and clients check out");
        return Ok(());
    }

    let now = OffsetDateTime::now_utc();
    match &options.command {
        None => {
            print_help();
            Ok(())
        }
        Some(Command::List) => {
            print_garden(&session, now);
            Ok(())
        }
        Some(Command::Due { horizon_days }) => {
            let due = session.due_soon(now, *horizon_days);
            if due.is_empty() {
                println!("nothing due within {horizon_days} day(s)");
            } else {
                for record in due {
                    print_record_line(record, now);
                }
            }
            Ok(())
        }
        Some(Command::Add { image_path }) => {
            let (image, checksum) = load_image(image_path)?;
            let (identified, id) = session.identify_and_add(image, checksum, now)?;
            println!(
                "added {} ({}) -- water every {} day(s), {} h light [{}]",
                identified.common_name,
                identified.scientific_name,
                identified.water_days,
                identified.sunlight_hours,
                short_id(id.as_str()),
            );
            Ok(())
        }
        Some(Command::Water { id }) => {
            let record = session.water_plant(id, now)?;
            println!(
                "watered {}; next due {}",
                record.common_name,
                format_day(record.next_water_at)
            );
            Ok(())
        }
        Some(Command::Remove { id }) => {
            let removed = session.remove_plant(id, now)?;
            println!("removed {} from the garden", removed.common_name);
            Ok(())
        }
        Some(Command::Diagnose { image_path }) => {
            let (image, _) = load_image(image_path)?;
            let diagnosis = session.diagnose(&image)?;
            println!("{} on {}", diagnosis.disease_name, diagnosis.affected_plant);
            if !diagnosis.severity.is_empty() {
                println!("severity: {}", diagnosis.severity);
            }
            if !diagnosis.cause.is_empty() {
                println!("cause: {}", diagnosis.cause);
            }
            for step in &diagnosis.treatment {
                println!("treat: {step}");
            }
            for step in &diagnosis.prevention {
                println!("prevent: {step}");
            }
            Ok(())
        }
        Some(Command::Adjust { factors }) => {
            let moved = session.apply_weather_adjustment(*factors, now)?;
            let factor = factors.composite();
            if moved == 0 {
                println!("factor {factor:.2} is within the dead-band; schedules unchanged");
            } else {
                println!("factor {factor:.2} moved {moved} due date(s)");
            }
            Ok(())
        }
        Some(Command::Sync) => {
            let outcome = session
                .sync()
                .map_err(|error| anyhow!("sync failed: {error}"))?;
            println!("{}", outcome.display());
            Ok(())
        }
        Some(Command::Export { out_path }) => {
            let document = session.export_json(now)?;
            match out_path {
                Some(path) => {
                    fs::write(path, document)
                        .with_context(|| format!("write export to {}", path.display()))?;
                    println!("exported garden to {}", path.display());
                }
                None => println!("{document}"),
            }
            Ok(())
        }
    }
}

fn print_garden(session: &Session, now: OffsetDateTime) {
    if session.collection().is_empty() {
        println!("the garden is empty; add a plant with `verdant add <photo>`");
        return;
    }
    for record in session.collection() {
        print_record_line(record, now);
    }
}

fn print_record_line(record: &verdant_app::PlantRecord, now: OffsetDateTime) {
    let status = schedule::care_status(record.next_water_at, now);
    let progress = schedule::water_progress_fraction(
        record.last_watered_at,
        record.water_interval_days,
        now,
    )
    .unwrap_or(1.0);
    println!(
        "{}  {:<20} {:<24} {:>3.0}%  {}",
        short_id(record.id.as_str()),
        record.common_name,
        record.scientific_name,
        progress * 100.0,
        status.display(),
    );
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn format_day(at: OffsetDateTime) -> String {
    at.date().to_string()
}

/// Read a photo off disk as a data URI plus its checksum.
fn load_image(path: &Path) -> Result<(String, String)> {
    let bytes =
        fs::read(path).with_context(|| format!("read image file {}", path.display()))?;
    if bytes.is_empty() {
        bail!("image file {} is empty", path.display());
    }

    let mime = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    };
    let checksum = verdant_db::checksum_sha256(&bytes);
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok((format!("data:{mime};base64,{encoded}"), checksum))
}

const DEMO_PLANTS: [(&str, &str, i64, f64, i64); 5] = [
    ("Monstera", "Monstera deliciosa", 9, 6.0, 8),
    ("Basil", "Ocimum basilicum", 3, 7.0, 4),
    ("Snake Plant", "Dracaena trifasciata", 14, 5.0, 2),
    ("Peace Lily", "Spathiphyllum wallisii", 6, 4.0, 7),
    ("Aloe Vera", "Aloe barbadensis", 18, 7.0, 1),
];

fn seed_demo_garden(session: &mut Session) -> Result<()> {
    let now = OffsetDateTime::now_utc();
    for (common, scientific, interval, sunlight, days_ago) in DEMO_PLANTS {
        session.add_to_garden(
            &NewPlant {
                common_name: common.to_owned(),
                scientific_name: scientific.to_owned(),
                info: String::new(),
                image: String::new(),
                image_sha256: String::new(),
                water_interval_days: interval,
                sunlight_hours: sunlight,
            },
            now - time::Duration::days(days_ago),
        )?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    List,
    Due { horizon_days: i64 },
    Add { image_path: PathBuf },
    Water { id: String },
    Remove { id: String },
    Diagnose { image_path: PathBuf },
    Adjust { factors: EnvironmentalFactors },
    Sync,
    Export { out_path: Option<PathBuf> },
}

#[derive(Debug, Clone, PartialEq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
    command: Option<Command>,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
        command: None,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            command if options.command.is_none() && !command.starts_with('-') => {
                options.command = Some(parse_command(command, &mut iter)?);
            }
            unknown => {
                bail!("unknown argument {unknown:?}; run with --help to see supported options");
            }
        }
    }

    Ok(options)
}

fn parse_command<I, S>(name: &str, iter: &mut I) -> Result<Command>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    match name {
        "list" => Ok(Command::List),
        "due" => {
            let mut horizon_days = 3i64;
            if let Some(flag) = iter.next() {
                if flag.as_ref() != "--days" {
                    bail!("unknown argument {:?} for `due`; expected --days <n>", flag.as_ref());
                }
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--days requires a number"))?;
                horizon_days = value
                    .as_ref()
                    .parse()
                    .with_context(|| format!("invalid --days value {:?}", value.as_ref()))?;
            }
            Ok(Command::Due { horizon_days })
        }
        "add" => {
            let path = iter
                .next()
                .ok_or_else(|| anyhow!("`add` requires an image path"))?;
            Ok(Command::Add {
                image_path: PathBuf::from(path.as_ref()),
            })
        }
        "water" => {
            let id = iter
                .next()
                .ok_or_else(|| anyhow!("`water` requires a plant id"))?;
            Ok(Command::Water {
                id: id.as_ref().to_owned(),
            })
        }
        "remove" => {
            let id = iter
                .next()
                .ok_or_else(|| anyhow!("`remove` requires a plant id"))?;
            Ok(Command::Remove {
                id: id.as_ref().to_owned(),
            })
        }
        "diagnose" => {
            let path = iter
                .next()
                .ok_or_else(|| anyhow!("`diagnose` requires an image path"))?;
            Ok(Command::Diagnose {
                image_path: PathBuf::from(path.as_ref()),
            })
        }
        "adjust" => {
            let mut factors = EnvironmentalFactors::default();
            while let Some(flag) = iter.next() {
                let target = match flag.as_ref() {
                    "--temperature" => &mut factors.temperature,
                    "--humidity" => &mut factors.humidity,
                    "--precipitation" => &mut factors.precipitation,
                    unknown => bail!(
                        "unknown argument {unknown:?} for `adjust`; expected --temperature/--humidity/--precipitation <factor>"
                    ),
                };
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("{} requires a factor", flag.as_ref()))?;
                *target = value
                    .as_ref()
                    .parse()
                    .with_context(|| format!("invalid factor {:?}", value.as_ref()))?;
            }
            Ok(Command::Adjust { factors })
        }
        "sync" => Ok(Command::Sync),
        "export" => {
            let mut out_path = None;
            if let Some(flag) = iter.next() {
                if flag.as_ref() != "--out" {
                    bail!("unknown argument {:?} for `export`; expected --out <path>", flag.as_ref());
                }
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--out requires a file path"))?;
                out_path = Some(PathBuf::from(value.as_ref()));
            }
            Ok(Command::Export { out_path })
        }
        unknown => bail!("unknown command {unknown:?}; run with --help to see supported commands"),
    }
}

fn print_help() {
    println!("verdant -- plant care assistant");
    println!();
    println!("commands:");
    println!("  list                     Show the whole garden with care status");
    println!("  due [--days <n>]         Show plants due within <n> days (default 3)");
    println!("  add <image>              Identify a photo and add the plant");
    println!("  water <id>               Record a watering now");
    println!("  remove <id>              Remove a plant from the garden");
    println!("  diagnose <image>         Diagnose a plant health problem from a photo");
    println!("  adjust [--temperature f] [--humidity f] [--precipitation f]");
    println!("                           Apply weather multipliers to the schedule");
    println!("  sync                     Reconcile with the cloud copy");
    println!("  export [--out <path>]    Export the garden as JSON");
    println!();
    println!("flags:");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a config template");
    println!("  --demo                   Run against seeded in-memory demo data");
    println!("  --check                  Validate config + storage + clients");
    println!("  --help                   Show this help");
}
