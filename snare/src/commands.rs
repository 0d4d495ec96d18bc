use crate::CLAP_STYLING;
use clap::{arg, command};
use regex::Regex;
use url::Url;

pub const DEFAULT_OUTPUT_ROOT: &str = "~/.local/share/snare/runs";

/// Rejects patterns that would only fail once the crawl has started.
fn regex_pattern(value: &str) -> Result<String, String> {
    Regex::new(value)
        .map(|_| value.to_string())
        .map_err(|e| format!("invalid regular expression: {}", e))
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("snare")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("snare")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("crawl")
                .about(
                    "Crawl a suspected phishing site, recording every page, form submission and \
                explored button sequence.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("The URL to crawl")
                        .value_parser(clap::value_parser!(Url))
                        .conflicts_with("hosts-file"),
                )
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of URLs to crawl")
                        .value_parser(clap::value_parser!(std::path::PathBuf))
                        .conflicts_with("url"),
                )
                .arg(
                    arg!(--"scope" <HOST_REGEX>)
                        .required(false)
                        .help("Hosts to stay on (default: the seed hosts and their subdomains)")
                        .value_parser(regex_pattern),
                )
                .arg(
                    arg!(--"include-url" <URL_REGEX>)
                        .required(false)
                        .help("Only visit URLs matching this expression")
                        .value_parser(regex_pattern),
                )
                .arg(
                    arg!(--"exclude" <URL_REGEX>)
                        .required(false)
                        .help("Never visit URLs matching this expression (repeatable)")
                        .value_parser(regex_pattern)
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"screenshot" <MODE>)
                        .required(false)
                        .help("Capture each loaded page")
                        .value_parser(["none", "viewport", "full"])
                        .default_value("none"),
                )
                .arg(
                    arg!(--"explore")
                        .required(false)
                        .help("Click through each page's buttons and inputs")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"no-forms")
                        .required(false)
                        .help("Do not fill and submit forms")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"max-urls" <NUM>)
                        .required(false)
                        .help("Stop after this many URLs have been enqueued")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1000"),
                )
                .arg(
                    arg!(--"max-per-base" <NUM>)
                        .required(false)
                        .help("Maximum URLs sharing one query-less base URL")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"max-sequence-length" <NUM>)
                        .required(false)
                        .help("Longest action sequence to explore")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"explore-workers" <NUM_WORKERS>)
                        .required(false)
                        .help("Action sequences explored concurrently on one page")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("4"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    arg!(-o --"output" <DIR>)
                        .required(false)
                        .help("Directory that receives the run directory")
                        .default_value(DEFAULT_OUTPUT_ROOT),
                )
                .arg(
                    arg!(-v --"verbose")
                        .required(false)
                        .help("Log at debug level")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("replay")
                .about("Replay the action that produced a persisted visit record")
                .arg(
                    arg!(<FILE>)
                        .help("A visited-page JSON file from a crawl run")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-i --"index" <NUM>)
                        .required(false)
                        .help("Which record of the page to replay (0 is the page load)")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("0"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                ),
        )
        .subcommand(
            command!("report")
                .about("Print the report of a finished crawl run")
                .arg(
                    arg!(<RUN_DIR>)
                        .help("The run directory created by `snare crawl`")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
}
