//! `fluxmeter-cli`: loads a scenario file and either evaluates a single
//! observation or a CSV batch. `clap` for argument parsing, the `config`
//! crate for the scenario file, `pretty_env_logger` against an env var.

use std::io::{self, Write};
use std::env::{set_var, var};
use std::process;

use clap::{App, Arg};
use log::{error, info};
use serde_derive::{Deserialize, Serialize};

use fluxmeter::config::FluxmeterConfig;
use fluxmeter::observation::{ObservationState, Pid};
use fluxmeter::{Fluxmeter, FluxmeterError};

const LOG_VAR: &str = "FLUXMETER_LOG";

#[derive(Debug, Deserialize)]
struct BatchRow {
    pid: String,
    latitude_deg: f64,
    longitude_deg: f64,
    height_m: f64,
    azimuth_deg: f64,
    elevation_deg: f64,
    kinetic_energy_gev: f64,
}

#[derive(Debug, Serialize)]
struct ResultRow {
    flux: f64,
    asymmetry: f64,
    weight: f64,
}

fn parse_pid(raw: &str) -> Result<Pid, String> {
    match raw.to_lowercase().as_str() {
        "muon" | "mu-" => Ok(Pid::Muon),
        "antimuon" | "mu+" => Ok(Pid::AntiMuon),
        "untagged" | "" => Ok(Pid::Untagged),
        other => Err(format!("unknown pid \"{}\"", other)),
    }
}

fn parse_f64(matches: &clap::ArgMatches<'_>, name: &str) -> Result<f64, String> {
    let raw = matches.value_of(name).unwrap();
    raw.parse()
        .map_err(|_| format!("invalid --{} value \"{}\"", name, raw))
}

fn main() {
    let app = App::new("fluxmeter-cli")
        .version("0.1.0")
        .about("Evaluates local differential muon flux from a scenario file.")
        .arg(
            Arg::with_name("SCENARIO")
                .help("Path to the scenario TOML file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("batch")
                .short("b")
                .long("batch")
                .takes_value(true)
                .value_name("CSV")
                .help("Read observer states from a CSV file instead of the single-observation flags"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("CSV")
                .help("Write batch results to this file instead of stdout"),
        )
        .arg(Arg::with_name("pid").long("pid").takes_value(true).default_value("untagged"))
        .arg(Arg::with_name("lat").long("lat").takes_value(true).default_value("0.0"))
        .arg(Arg::with_name("lon").long("lon").takes_value(true).default_value("0.0"))
        .arg(Arg::with_name("height").long("height").takes_value(true).default_value("0.0"))
        .arg(Arg::with_name("azimuth").long("azimuth").takes_value(true).default_value("0.0"))
        .arg(Arg::with_name("elevation").long("elevation").takes_value(true).default_value("90.0"))
        .arg(Arg::with_name("energy").long("energy").takes_value(true).default_value("1.0"))
        .arg(Arg::with_name("seed").long("seed").takes_value(true).help("PRNG seed, for reproducible batches"));

    let matches = app.get_matches();

    if var(LOG_VAR).is_err() {
        set_var(LOG_VAR, "INFO");
    }
    if pretty_env_logger::try_init_custom_env(LOG_VAR).is_err() {
        eprintln!("could not init logger");
    }

    let scenario_path = matches.value_of("SCENARIO").unwrap();
    let config = FluxmeterConfig::load(scenario_path).unwrap_or_else(|e| {
        error!("{}", e);
        process::exit(1);
    });

    let mut fluxmeter = config.build().unwrap_or_else(|e| {
        error!("{}", e);
        process::exit(1);
    });

    if let Some(seed) = matches.value_of("seed") {
        match seed.parse::<u64>() {
            Ok(seed) => fluxmeter.seed_rng(seed),
            Err(_) => {
                error!("invalid --seed value \"{}\"", seed);
                process::exit(1);
            }
        }
    }

    info!("Loaded scenario `{}`", scenario_path);

    if let Some(batch_path) = matches.value_of("batch") {
        if let Err(e) = run_batch(&mut fluxmeter, batch_path, matches.value_of("output")) {
            error!("{}", e);
            process::exit(1);
        }
        return;
    }

    let outcome = (|| -> Result<ObservationState, String> {
        let pid = parse_pid(matches.value_of("pid").unwrap())?;
        Ok(ObservationState::new(
            pid,
            parse_f64(&matches, "lat")?,
            parse_f64(&matches, "lon")?,
            parse_f64(&matches, "height")?,
            parse_f64(&matches, "azimuth")?,
            parse_f64(&matches, "elevation")?,
            parse_f64(&matches, "energy")?,
        ))
    })();

    let observation = outcome.unwrap_or_else(|e| {
        error!("{}", e);
        process::exit(1);
    });

    let result = fluxmeter.flux(&observation);
    println!(
        "flux={:.6e} asymmetry={:.6} weight={:.6}",
        result.value, result.asymmetry, result.weight
    );
}

fn run_batch(fluxmeter: &mut Fluxmeter, input_path: &str, output_path: Option<&str>) -> Result<(), FluxmeterError> {
    let mut reader =
        csv::Reader::from_path(input_path).map_err(|e| FluxmeterError::Io(format!("{}: {}", input_path, e)))?;

    let mut out: Box<dyn Write> = match output_path {
        Some(path) => Box::new(
            std::fs::File::create(path).map_err(|e| FluxmeterError::Io(format!("{}: {}", path, e)))?,
        ),
        None => Box::new(io::stdout()),
    };
    let mut csv_writer = csv::Writer::from_writer(&mut out);

    for record in reader.deserialize::<BatchRow>() {
        let row = record.map_err(|e| FluxmeterError::Format(e.to_string()))?;
        let pid = parse_pid(&row.pid).map_err(FluxmeterError::BadInput)?;
        let observation = ObservationState::new(
            pid,
            row.latitude_deg,
            row.longitude_deg,
            row.height_m,
            row.azimuth_deg,
            row.elevation_deg,
            row.kinetic_energy_gev,
        );
        let result = fluxmeter.flux(&observation);
        csv_writer
            .serialize(ResultRow {
                flux: result.value,
                asymmetry: result.asymmetry,
                weight: result.weight,
            })
            .map_err(|e| FluxmeterError::Format(e.to_string()))?;
    }
    csv_writer.flush().map_err(|e| FluxmeterError::Io(e.to_string()))?;
    Ok(())
}
