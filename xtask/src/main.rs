use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the fleet motion workspace",
    long_about = "A unified CLI for running the fleet demo, headless runs,\n\
                  benchmarks, and CI checks in the fleet motion workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the interactive fleet demo
    Run {
        /// Scenario to load on startup
        #[arg(value_enum, long, default_value_t = Scenario::Rides)]
        scenario: Scenario,
        /// OSRM endpoint used for road routing
        #[arg(long, env = "FLEET_OSRM_ENDPOINT")]
        osrm: Option<String>,
        /// Decision service endpoint polled for directives
        #[arg(long, env = "FLEET_DECISION_ENDPOINT")]
        decision: Option<String>,
    },
    /// Run the headless ride scenario and print a summary
    Headless,
    /// Run Criterion benchmarks
    Bench,
    /// Run CI checks (fmt, clippy, tests, examples, benchmarks)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Scenario {
    /// Random pickup/dropoff requests
    Rides,
    /// Pick-up points visited by the controlled vehicle
    Targets,
}

impl Scenario {
    fn as_arg(self) -> &'static str {
        match self {
            Self::Rides => "rides",
            Self::Targets => "targets",
        }
    }
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Build and run the headless example
    Examples,
    /// Run benchmarks
    Bench,
    /// Run check + examples + bench
    All,
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_demo(scenario: Scenario, osrm: Option<&str>, decision: Option<&str>) {
    let mut args = vec!["run", "-p", "fleet_demo", "--", "--scenario", scenario.as_arg()];
    if let Some(endpoint) = osrm {
        args.extend(["--osrm", endpoint]);
    }
    if let Some(endpoint) = decision {
        args.extend(["--decision", endpoint]);
    }
    run_cargo(&args);
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test fleet_core");
    run_cargo(&["test", "-p", "fleet_core"]);

    step("Test fleet_core without network features");
    run_cargo(&["test", "-p", "fleet_core", "--no-default-features", "--features", "test-helpers"]);

    step("Test fleet_demo");
    run_cargo(&["test", "-p", "fleet_demo"]);
}

fn ci_examples() {
    step("Run headless_run (10 random rides)");
    run_cargo(&[
        "run",
        "-p",
        "fleet_core",
        "--example",
        "headless_run",
        "--release",
    ]);
}

fn ci_bench() {
    step("Run benchmarks");
    run_cargo(&["bench", "--package", "fleet_core", "--bench", "performance"]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            osrm,
            decision,
        } => {
            run_demo(scenario, osrm.as_deref(), decision.as_deref());
        }
        Commands::Headless => ci_examples(),
        Commands::Bench => ci_bench(),
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Examples => ci_examples(),
                CiJob::Bench => ci_bench(),
                CiJob::All => {
                    ci_check();
                    ci_examples();
                    ci_bench();
                }
            }
            eprintln!("\nCI job passed.");
        }
    }
}
