//! Penalty escalation is monotone under non-decreasing severities.

use aegis_admission::{PenaltyConfig, PenaltyManager, PenaltySeverity};
use aegis_store::CounterStore;
use proptest::prelude::*;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn severity_strategy() -> impl proptest::strategy::Strategy<Value = PenaltySeverity> {
    prop_oneof![
        Just(PenaltySeverity::Low),
        Just(PenaltySeverity::Medium),
        Just(PenaltySeverity::High),
        Just(PenaltySeverity::Critical),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Applying penalties with non-decreasing severities yields
    /// non-decreasing penalty types within a violation window.
    #[test]
    fn escalation_is_monotone(mut severities in proptest::collection::vec(severity_strategy(), 1..8)) {
        severities.sort();

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let manager = PenaltyManager::new(
                PenaltyConfig::default(),
                Arc::new(CounterStore::in_memory()),
            );

            let mut last_type = None;
            for severity in severities {
                let record = manager.apply_penalty("u", severity, "violation").await;
                if let Some(last) = last_type {
                    prop_assert!(
                        record.penalty_type >= last,
                        "penalty regressed from {:?} to {:?}",
                        last,
                        record.penalty_type
                    );
                }
                last_type = Some(record.penalty_type);
            }
            Ok(())
        })?;
    }

    /// Whatever was applied, revoking every active penalty restores
    /// admission unless the user was blacklisted independently.
    #[test]
    fn revocation_restores_admission(severities in proptest::collection::vec(severity_strategy(), 1..6)) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let manager = PenaltyManager::new(
                PenaltyConfig::default(),
                Arc::new(CounterStore::in_memory()),
            );

            let mut ids = Vec::new();
            for severity in severities {
                ids.push(manager.apply_penalty("u", severity, "violation").await.id);
            }
            for id in &ids {
                manager.revoke_penalty("u", id, "mod").await.unwrap();
            }
            prop_assert!(manager.is_user_allowed("u").await.allowed);
            Ok(())
        })?;
    }
}
