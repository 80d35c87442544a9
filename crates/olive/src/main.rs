use std::path::PathBuf;

use olive::{CheckOptions, check_file, emit_diagnostics, init_logging, summary_json};
use olive_diag::Category;

fn main() {
    init_logging();
    if let Err(message) = run() {
        eprintln!("{message}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = std::env::args().collect::<Vec<_>>();
    let command = parse_cli(&args)?;

    match command {
        Command::Check { options, summary } => {
            let result = check_file(&options).map_err(|err| err.to_string())?;
            emit_diagnostics(&result.diagnostics);
            if summary {
                let json = summary_json(&result.summaries)
                    .map_err(|err| format!("failed to serialize summary: {err}"))?;
                println!("{json}");
            }
            if !result.compiled {
                std::process::exit(1);
            }
            if !summary {
                println!(
                    "ok: {} olives checked, {} warnings",
                    result.summaries.len(),
                    result.warning_count()
                );
            }
            Ok(())
        }
        Command::Explain { code } => {
            let category = Category::all()
                .iter()
                .find(|category| category.code().eq_ignore_ascii_case(&code))
                .ok_or_else(|| format!("unknown diagnostic code `{code}`"))?;
            println!("{} ({})", category.code(), category.as_str());
            println!("{}", category.description());
            println!("fix: {}", category.example_fix());
            Ok(())
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Check { options: CheckOptions, summary: bool },
    Explain { code: String },
}

fn parse_cli(args: &[String]) -> Result<Command, String> {
    if args.len() < 3 {
        return Err(usage());
    }

    match args[1].as_str() {
        "check" => {
            let program = PathBuf::from(&args[2]);
            let mut catalogue = None;
            let mut config = None;
            let mut summary = false;

            let mut idx = 3;
            while idx < args.len() {
                match args[idx].as_str() {
                    "--catalogue" | "-c" => {
                        let value = args
                            .get(idx + 1)
                            .ok_or_else(|| "missing value for --catalogue".to_string())?;
                        catalogue = Some(PathBuf::from(value));
                        idx += 2;
                    }
                    "--config" => {
                        let value = args
                            .get(idx + 1)
                            .ok_or_else(|| "missing value for --config".to_string())?;
                        config = Some(PathBuf::from(value));
                        idx += 2;
                    }
                    "--summary" => {
                        summary = true;
                        idx += 1;
                    }
                    unknown => {
                        return Err(format!("unknown argument `{unknown}`\n{}", usage()));
                    }
                }
            }

            let catalogue =
                catalogue.ok_or_else(|| format!("missing --catalogue\n{}", usage()))?;
            Ok(Command::Check {
                options: CheckOptions {
                    program,
                    catalogue,
                    config,
                },
                summary,
            })
        }
        "explain" => Ok(Command::Explain {
            code: args[2].clone(),
        }),
        _ => Err(usage()),
    }
}

fn usage() -> String {
    "usage:\n  olive check <program.json> --catalogue <catalogue.json> [--config <config.json>] [--summary]\n  olive explain <code>".to_string()
}
