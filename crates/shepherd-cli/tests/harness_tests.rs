use proptest::prelude::*;
use shepherd_cli::test_harness::{run_simulator, run_stress, SimulatorConfig, StressConfig};
use shepherd_core::{ShepherdConfig, StoreConfig};

#[tokio::test]
async fn test_simulation_with_retry_and_paging() {
    let config = SimulatorConfig {
        lines: 30,
        fail_first_commit: true,
        page_size: ShepherdConfig::default().page_size,
    };
    let report = run_simulator(config).await.unwrap();

    println!("{}", report.generate_text());
    assert!(report.passed());
    assert_eq!(report.stored_lines, 29);
    assert_eq!(report.first_page_lines, 25);
    assert_eq!(report.stats.saves_failed, 1);
}

#[tokio::test]
async fn test_simulation_without_lines() {
    let config = SimulatorConfig {
        lines: 0,
        ..SimulatorConfig::default()
    };
    let report = run_simulator(config).await.unwrap();

    assert!(report.passed());
    assert_eq!(report.final_total_cents, 0);
    assert_eq!(report.stored_lines, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stress_many_entities() {
    let report = run_stress(
        StoreConfig::default(),
        StressConfig {
            entities: 50,
            mutations: 20,
        },
    )
    .await
    .unwrap();

    assert!(report.passed(), "{:?}", report.mismatches);
    assert_eq!(report.stats.applied, 1000);
    assert_eq!(report.stats.rejected, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_simulation_passes_for_any_line_count(lines in 0usize..20, fail_first in any::<bool>()) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let report = runtime
            .block_on(run_simulator(SimulatorConfig {
                lines,
                fail_first_commit: fail_first,
                page_size: 10,
            }))
            .unwrap();

        prop_assert!(report.passed(), "{}", report.generate_text());
        prop_assert_eq!(report.stored_lines, lines.saturating_sub(1));
        prop_assert_eq!(report.first_page_lines, lines.saturating_sub(1).min(10));
    }
}
