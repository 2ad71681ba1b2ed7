use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("retrace")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("retrace")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Increase log verbosity (-v info, -vv debug)")
                .required(false)
                .global(true)
                .action(clap::ArgAction::Count),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Writes a default retrace configuration file")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Directory to store the configuration in")
                        .default_value("~/.config/retrace/"),
                )
                .arg(
                    arg!(-f --"force")
                        .help("Overwrite an existing configuration file without asking")
                        .required(false),
                ),
        )
        .subcommand(
            command!("analyze")
                .about(
                    "Trace every dynamic value the target call needs back to a cookie or an \
                earlier response in a recorded session.",
                )
                .arg(
                    arg!(-c --"capture" <PATH>)
                        .required(true)
                        .help("Recorded session: a HAR file or a JSON array of requests")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-a --"action-url" <URL>)
                        .required(true)
                        .help("URL of the call to reproduce"),
                )
                .arg(
                    arg!(--"cookies" <PATH>)
                        .required(false)
                        .help("Cookie jar exported from the browser (JSON)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-i --"input" <ASSIGNMENT>)
                        .required(false)
                        .help("Known input value as NAME=VALUE; may be repeated")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"config" <PATH>)
                        .required(false)
                        .help("Configuration file (default: ~/.config/retrace/config.json)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"oracle-url" <URL>)
                        .required(false)
                        .help("Endpoint of the judgment service that proposes dynamic values"),
                )
                .arg(
                    arg!(--"oracle-key" <KEY>)
                        .required(false)
                        .help("Bearer token for the judgment service (or RETRACE_ORACLE_KEY)"),
                )
                .arg(
                    arg!(--"timeout" <SECS>)
                        .required(false)
                        .help("Per-request oracle timeout in seconds")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"attempts" <N>)
                        .required(false)
                        .help("Maximum oracle attempts per request, retries included")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"max-nodes" <N>)
                        .required(false)
                        .help("Maximum number of nodes analyzed in this pass")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"strict-oracle")
                        .required(false)
                        .help("Keep nodes pending when the oracle returns nothing for them")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, markdown")
                        .value_parser(["text", "json", "markdown", "md"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"graph-out" <PATH>)
                        .required(false)
                        .help("Write the dependency graph snapshot as JSON")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            command!("inspect")
                .about("Report completion, cycles and replay order of a saved graph snapshot")
                .arg(
                    arg!(<GRAPH>)
                        .required(true)
                        .help("Graph snapshot written by `analyze --graph-out`")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, markdown")
                        .value_parser(["text", "json", "markdown", "md"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            command!("resolve")
                .about("Look up where values come from in a capture, without an oracle")
                .arg(
                    arg!(-c --"capture" <PATH>)
                        .required(true)
                        .help("Recorded session: a HAR file or a JSON array of requests")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"cookies" <PATH>)
                        .required(false)
                        .help("Cookie jar exported from the browser (JSON)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"value" <VALUE>)
                        .required(true)
                        .help("Value to trace; may be repeated")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"before" <INDEX>)
                        .required(false)
                        .help("Only search entries captured before this index")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Print the result as JSON")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_definition_is_valid() {
        command_argument_builder().debug_assert();
    }

    #[test]
    fn test_analyze_collects_repeated_inputs() {
        let matches = command_argument_builder().get_matches_from([
            "retrace",
            "analyze",
            "-c",
            "session.har",
            "-a",
            "https://shop.test/api/checkout",
            "-i",
            "user=alice",
            "--input",
            "qty=2",
            "-vv",
        ]);
        assert_eq!(matches.get_count("verbose"), 2);

        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "analyze");
        let inputs: Vec<&String> = sub.get_many::<String>("input").unwrap().collect();
        assert_eq!(inputs, vec!["user=alice", "qty=2"]);
        assert_eq!(sub.get_one::<String>("format").unwrap(), "text");
    }
}
