//! Command-line interface for myriad
//! This binary compiles Myriad templates into Dockerfiles.
//!
//! Usage:
//!   myriad build `<path>` [--output `<file>`] [args...]  - Compile a template
//!   myriad tokens `<path>` [--format `<format>`]         - Print the token stream

use clap::{Arg, Command};

use myriad::files::{FileReader, FileWriter, FsReader, FsWriter};
use myriad::{tokenize, Compiler};

fn main() {
    let matches = Command::new("myriad")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A compiler for the Myriad Dockerfile templating language")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("build")
                .about("Compile a template and print or write the result")
                .arg(
                    Arg::new("path")
                        .help("Path to the template to compile")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("Write the result to this file instead of stdout"),
                )
                .arg(
                    Arg::new("args")
                        .help("Positional arguments passed to main")
                        .num_args(0..),
                ),
        )
        .subcommand(
            Command::new("tokens")
                .about("Lex a template and print its token stream")
                .arg(
                    Arg::new("path")
                        .help("Path to the template to lex")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .short('f')
                        .help("Output format")
                        .value_parser(["simple", "json"])
                        .default_value("simple"),
                ),
        )
        .get_matches();

    // Handle subcommands
    match matches.subcommand() {
        Some(("build", build_matches)) => {
            let path = build_matches.get_one::<String>("path").unwrap();
            let output = build_matches.get_one::<String>("output");
            let args: Vec<String> = build_matches
                .get_many::<String>("args")
                .map(|values| values.cloned().collect())
                .unwrap_or_default();
            handle_build_command(path, output.map(String::as_str), &args);
        }
        Some(("tokens", tokens_matches)) => {
            let path = tokens_matches.get_one::<String>("path").unwrap();
            let format = tokens_matches.get_one::<String>("format").unwrap();
            handle_tokens_command(path, format);
        }
        _ => unreachable!(),
    }
}

/// Handle the build command
fn handle_build_command(path: &str, output: Option<&str>, args: &[String]) {
    let reader = FsReader;
    let mut writer = FsWriter;
    let fragments = Compiler::new(&reader, &mut writer)
        .compile(path, args)
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });

    match output {
        Some(output) => {
            writer.write(output, &fragments).unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            });
        }
        None => print!("{}", fragments.concat()),
    }
}

/// Handle the tokens command
fn handle_tokens_command(path: &str, format: &str) {
    let source = FsReader.read(path).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let tokens = tokenize(&source).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    match format {
        "json" => {
            let rendered = serde_json::to_string_pretty(&tokens).unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            });
            println!("{}", rendered);
        }
        _ => {
            for token in &tokens {
                println!("{:>4}  {:?} {:?}", token.line, token.kind, token.text);
            }
        }
    }
}
