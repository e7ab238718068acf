use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use rowtest::load_suite;

#[derive(Parser)]
#[command(name = "rowtest")]
#[command(version = "0.1.0")]
#[command(about = "Data-driven UI test suite toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and shape-check a suite document
    Validate {
        /// Path to the suite YAML
        suite: PathBuf,
    },

    /// List the tests a suite defines
    Tests {
        /// Path to the suite YAML
        suite: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { suite } => {
            let loaded = load_suite(&suite)?;
            println!(
                "{} {} is valid",
                "✓".green().bold(),
                suite.display().to_string().cyan()
            );
            println!("  Base URL: {}", loaded.settings.base_url.cyan());
            println!("  Pages: {}", loaded.pages.len());
            let mut test_ids: Vec<_> = loaded.tests.keys().collect();
            test_ids.sort();
            for test_id in test_ids {
                let test = &loaded.tests[test_id];
                let mut line = format!(
                    "  {}: {} actions, {} assertions",
                    test_id.bold(),
                    test.actions.len(),
                    test.assertions.len()
                );
                if let Some(rows) = &test.dataset {
                    line.push_str(&format!(", {} dataset rows", rows.len()));
                }
                println!("{line}");
            }
        }
        Commands::Tests { suite } => {
            let loaded = load_suite(&suite)?;
            let mut test_ids: Vec<_> = loaded.tests.keys().collect();
            test_ids.sort();
            for test_id in test_ids {
                println!("{test_id}");
            }
        }
    }
    Ok(())
}
