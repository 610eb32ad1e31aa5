//! Command line interface

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, ArgMatches, ColorChoice, Command};

/// What the user asked for
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Log the receiver (and relay corrections) until interrupted
    Run { port: Option<String> },

    /// Check a closed raw log
    Validate {
        file: PathBuf,
        json: bool,
        expected_rate_hz: Option<f64>,
    },
}

pub struct Cli {
    /// Arguments passed by user
    matches: ArgMatches,
}

impl Cli {
    /// Parse the process arguments, exiting with usage on error
    pub fn new() -> Self {
        Self {
            matches: Self::command().get_matches(),
        }
    }

    /// Parse an explicit argument list
    pub fn try_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Ok(Self {
            matches: Self::command().try_get_matches_from(args)?,
        })
    }

    fn command() -> Command {
        Command::new("gnss-logger")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Raw u-blox GNSS logger with NTRIP correction relay")
            .color(ColorChoice::Auto)
            .subcommand_required(true)
            .arg_required_else_help(true)
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .global(true)
                    .value_parser(value_parser!(PathBuf))
                    .help("TOML configuration file. Built-in defaults are used when omitted."),
            )
            .subcommand(
                Command::new("run")
                    .about("Log raw receiver data and time correlation until Ctrl+C")
                    .arg(
                        Arg::new("port")
                            .short('p')
                            .long("port")
                            .value_name("PORT")
                            .help("Receiver serial port, overrides the configuration (e.g. /dev/ttyAMA4)"),
                    ),
            )
            .subcommand(
                Command::new("validate")
                    .about("Check that a raw log is suitable for post-processing")
                    .arg(
                        Arg::new("file")
                            .value_name("FILE")
                            .required(true)
                            .value_parser(value_parser!(PathBuf))
                            .help("Raw .ubx log to validate"),
                    )
                    .arg(
                        Arg::new("json")
                            .long("json")
                            .action(ArgAction::SetTrue)
                            .help("Print the report as JSON"),
                    )
                    .arg(
                        Arg::new("expected-rate")
                            .long("expected-rate")
                            .value_name("HZ")
                            .value_parser(value_parser!(f64))
                            .help("Expected RXM-RAWX rate, overrides the configuration"),
                    ),
            )
    }

    /// Configuration file, if one was given
    pub fn config_path(&self) -> Option<&PathBuf> {
        self.matches.get_one::<PathBuf>("config")
    }

    pub fn action(&self) -> Action {
        match self.matches.subcommand() {
            Some(("validate", sub)) => Action::Validate {
                file: sub.get_one::<PathBuf>("file").cloned().unwrap_or_default(),
                json: sub.get_flag("json"),
                expected_rate_hz: sub.get_one::<f64>("expected-rate").copied(),
            },
            Some(("run", sub)) => Action::Run {
                port: sub.get_one::<String>("port").cloned(),
            },
            _ => Action::Run { port: None },
        }
    }
}
