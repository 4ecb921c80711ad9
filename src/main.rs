use anyhow::Result;
use clap::{crate_version, App, AppSettings, Arg, ArgMatches, SubCommand};
use leaflet::build::{build_site, clear_cache, refresh_cache, Options};
use leaflet::config::Config;
use leaflet::wordpress::HttpSource;
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let project = Arg::with_name("project")
        .short("p")
        .long("project")
        .takes_value(true)
        .default_value(".")
        .help("Directory containing leaflet.yaml (or one of its subdirectories)");
    let output = Arg::with_name("output")
        .short("o")
        .long("output")
        .takes_value(true)
        .default_value("_output")
        .help("Directory the site is written to");

    let matches = App::new("leaflet")
        .version(crate_version!())
        .about("Builds a book-review site from a WordPress blog")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("build")
                .about("Builds the site, fetching reviews only if they aren't cached")
                .arg(project.clone())
                .arg(output.clone())
                .arg(
                    Arg::with_name("refresh")
                        .long("refresh")
                        .help("Ignores cached reviews and fetches from WordPress"),
                ),
        )
        .subcommand(
            SubCommand::with_name("fetch")
                .about("Fetches reviews from WordPress into the cache")
                .arg(project.clone()),
        )
        .subcommand(
            SubCommand::with_name("clean-cache")
                .about("Deletes cached reviews")
                .arg(project),
        )
        .get_matches();

    match matches.subcommand() {
        ("build", Some(m)) => {
            let config = load_config(m)?;
            let source = http_source(&config)?;
            build_site(
                &config,
                &source,
                Options {
                    refresh: m.is_present("refresh"),
                },
            )?;
        }
        ("fetch", Some(m)) => {
            let config = load_config(m)?;
            refresh_cache(&config, &http_source(&config)?)?;
        }
        ("clean-cache", Some(m)) => clear_cache(&load_config(m)?)?,
        _ => unreachable!("clap requires a subcommand"),
    }
    Ok(())
}

fn load_config(m: &ArgMatches) -> Result<Config> {
    let project = Path::new(m.value_of("project").unwrap_or("."));
    let output = PathBuf::from(m.value_of("output").unwrap_or("_output"));
    let output = match output.is_absolute() {
        true => output,
        false => std::env::current_dir()?.join(output),
    };
    Config::from_directory(&project.canonicalize()?, &output)
}

fn http_source(config: &Config) -> Result<HttpSource> {
    Ok(HttpSource::new(
        config.endpoint.clone(),
        config.per_page,
        config.max_pages,
    )?)
}
