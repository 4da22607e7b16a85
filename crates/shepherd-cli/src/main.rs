use clap::Parser;
use shepherd_cli::test_harness::{run_simulator, run_stress, SimulatorConfig, StressConfig};
use shepherd_cli::{logging, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.json_logs)?;
    let config = cli.load_config()?;

    match cli.command {
        Commands::Simulate { lines, fail_first } => {
            println!("Running aggregate simulation...");
            println!("Lines: {}", lines);
            println!("Fail First Commit: {}", fail_first);
            println!();

            let report = run_simulator(SimulatorConfig {
                lines,
                fail_first_commit: fail_first,
                page_size: config.page_size,
            })
            .await?;

            println!("{}", report.generate_text());

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Commands::Stress { entities, mutations } => {
            println!("Running stress test...");
            println!("Entities: {}", entities);
            println!("Mutations per Entity: {}", mutations);
            println!();

            let report = run_stress(config.store, StressConfig { entities, mutations }).await?;

            println!("Stress Test Report:");
            println!("  Entities: {}", report.config.entities);
            println!("  Mutations per Entity: {}", report.config.mutations);
            println!("  Elapsed: {}ms", report.elapsed.as_millis());
            println!("  Throughput: {:.0} mutations/sec", report.throughput());
            println!("  Queue-Full Retries: {}", report.retries);
            println!("  Applied: {}", report.stats.applied);
            println!("  Rejected: {}", report.stats.rejected);
            println!("  Mismatches: {}", report.mismatches.len());
            println!("  Success: {}", report.passed());

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}
