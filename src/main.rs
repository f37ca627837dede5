use clap::Parser as _;
use delta_erv_tools::commands;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(clap::Parser)]
#[clap(version, about, author)]
enum Commands {
    Registers(commands::registers::Args),
    Read(commands::read::Args),
    Write(commands::write::Args),
    Fan(commands::fan::Args),
    Mode(commands::mode::Args),
    Status(commands::status::Args),
}

fn end<E: std::error::Error>(r: Result<(), E>) {
    std::process::exit(match r {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            let mut cause = e.source();
            while let Some(e) = cause {
                eprintln!("  because: {e}");
                cause = e.source();
            }
            1
        }
    });
}

fn main() {
    let filter = match std::env::var("DELTA_ERV_LOG") {
        Ok(description) => match description
            .parse::<tracing_subscriber::filter::targets::Targets>()
        {
            Ok(targets) => targets,
            Err(error) => {
                eprintln!("warning: ignoring unparseable DELTA_ERV_LOG: {error}");
                default_filter()
            }
        },
        Err(_) => default_filter(),
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
    match Commands::parse() {
        Commands::Registers(args) => end(commands::registers::run(args)),
        Commands::Read(args) => end(commands::read::run(args)),
        Commands::Write(args) => end(commands::write::run(args)),
        Commands::Fan(args) => end(commands::fan::run(args)),
        Commands::Mode(args) => end(commands::mode::run(args)),
        Commands::Status(args) => end(commands::status::run(args)),
    }
}

fn default_filter() -> tracing_subscriber::filter::targets::Targets {
    tracing_subscriber::filter::targets::Targets::new()
        .with_default(tracing::level_filters::LevelFilter::WARN)
}
