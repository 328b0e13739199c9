use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use itertools::Itertools;

use flowfilter::parser::time::parse_timestamp;
use flowfilter::{Configuration, Filter, Schema, TimeWindow, Value};

/// Compile a flow filter into query engine predicate text
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// filter expression, e.g. '%sa 10.0.0.0/8 and %dp > 1024'
    #[clap(default_value = "")]
    filter: String,

    /// JSON schema file, the built-in IPFIX schema when omitted
    #[clap(short, long)]
    schema: Option<PathBuf>,

    /// start of the time window (YYYY/MM/DD.hh:mm:ss, UTC)
    #[clap(long, requires = "to")]
    from: Option<String>,

    /// end of the time window (YYYY/MM/DD.hh:mm:ss, UTC)
    #[clap(long, requires = "from")]
    to: Option<String>,

    /// JSON object of column values to evaluate the filter against
    #[clap(short, long)]
    check: Option<String>,

    /// print the aliases known to the schema and exit
    #[clap(long)]
    list_columns: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    match run(Args::parse()) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let schema = match &args.schema {
        Some(path) => Schema::from_path(path)
            .with_context(|| format!("loading schema from {}", path.display()))?,
        None => Schema::builtin(),
    };

    if args.list_columns {
        println!("{}", schema.aliases().sorted().join("\n"));
        return Ok(ExitCode::SUCCESS);
    }

    let mut conf = Configuration::new(args.filter, schema);
    if let (Some(from), Some(to)) = (&args.from, &args.to) {
        let start = parse_timestamp(from).with_context(|| format!("--from {from}"))?;
        let end = parse_timestamp(to).with_context(|| format!("--to {to}"))?;
        if start > end {
            bail!("time window starts after it ends: {from} > {to}");
        }
        conf = conf.with_time_window(TimeWindow::new(start, end));
    }

    let filter = match Filter::new(&conf) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("{}", filter.get_filter());
    if filter.requires_row_check() {
        log::info!("filter contains decoded string comparisons, rows need a local check");
    }

    match &args.check {
        Some(json) => {
            let row: HashMap<String, Value> =
                serde_json::from_str(json).context("parsing --check row")?;
            let valid = filter.is_valid(&row);
            println!("{}", if valid { "match" } else { "no match" });
            Ok(if valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        None => Ok(ExitCode::SUCCESS),
    }
}
