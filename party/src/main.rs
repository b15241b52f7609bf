//! Party engine driver.
//!
//! Reads one command per line from stdin and plays it against a fresh
//! engine, printing tagged results. Suitable for scripted runs:
//!
//! ```bash
//! printf 'spawn\nspawn\n1 create fighter\n2 create mage\n2 join 1\n' | cargo run -p party
//! ```

mod headless;

use party_core::EngineConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    init_logging(verbosity(&args));

    let config = EngineConfig::from_env()?;
    info!(?config, "starting party driver");

    headless::run_headless(config)?;
    Ok(())
}

/// Count `-v` flags; `-vv` counts as two.
fn verbosity(args: &[String]) -> usize {
    args.iter()
        .skip(1)
        .filter(|a| a.starts_with("-v") && a[1..].chars().all(|c| c == 'v'))
        .map(|a| a.len() - 1)
        .sum()
}

/// Logs go to stderr so stdout stays a clean protocol stream.
fn init_logging(verbose: usize) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn print_help() {
    println!("party - drive a party engine from stdin");
    println!();
    println!("USAGE:");
    println!("  party [OPTIONS] < commands.txt");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help       Show this help message");
    println!("  -v, -vv, -vvv    Log at info, debug or trace level (RUST_LOG overrides)");
    println!();
    println!("ENVIRONMENT:");
    println!("  PARTY_INITIAL_LEVEL    Level of new characters (default: 1)");
    println!("  PARTY_MAX_CHARACTERS   Cap on live characters (default: unlimited)");
    println!("  PARTY_FIRST_AGENT_ID   First agent id handed out (default: 1)");
    println!();
    headless::print_commands();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(verbosity(&args(&["party"])), 0);
        assert_eq!(verbosity(&args(&["party", "-v"])), 1);
        assert_eq!(verbosity(&args(&["party", "-vv", "-v"])), 3);
        assert_eq!(verbosity(&args(&["party", "--verbose-ish"])), 0);
    }
}
