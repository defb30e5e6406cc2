//! Scenario: a 35% error rate drops the service to REDUCED; a disabled
//! feature refuses calls, an essential feature serves its simplified
//! implementation, and health recovery returns to FULL.

use aegis_degradation::{
    DegradationError, DegradationLevel, DegradationManager, DegradedBehavior, DegradedPaths,
    FeatureRule, HealthSample, LevelStrategy, RecoveryCondition, Served, TriggerCondition,
};
use std::time::Duration;

fn manager() -> DegradationManager {
    DegradationManager::builder()
        .strategy(
            LevelStrategy::new(DegradationLevel::Reduced, TriggerCondition::ErrorRate(0.3))
                .with_feature(FeatureRule::new(
                    "advanced_formatting",
                    false,
                    DegradedBehavior::Disable,
                ))
                .with_feature(FeatureRule::new(
                    "ai_processing",
                    true,
                    DegradedBehavior::Simplify,
                ))
                .with_recovery(RecoveryCondition::Health {
                    max_error_rate: 0.1,
                    hold_for: Duration::from_millis(30),
                }),
        )
        .build()
}

fn sample(error_rate: f64) -> HealthSample {
    HealthSample {
        error_rate,
        ..Default::default()
    }
}

#[tokio::test]
async fn error_rate_cascade_and_recovery() {
    let manager = manager();
    assert_eq!(manager.current_level(), DegradationLevel::Full);

    // Error rate climbs to 0.35: FULL -> REDUCED.
    manager.report_health(sample(0.35));
    assert_eq!(manager.current_level(), DegradationLevel::Reduced);

    // The auto-disabled feature refuses calls.
    let refused: Result<Served<String>, DegradationError<String>> = manager
        .execute("advanced_formatting", DegradedPaths::none(), || async {
            Ok("rich text".to_string())
        })
        .await;
    assert!(matches!(
        refused,
        Err(DegradationError::FeatureDisabled { .. })
    ));

    // The essential feature runs its simplified implementation.
    let served: Result<Served<String>, DegradationError<String>> = manager
        .execute(
            "ai_processing",
            DegradedPaths::none().with_simplified(|| {
                Box::pin(async { Ok("plain summary".to_string()) })
            }),
            || async { Ok("full pipeline".to_string()) },
        )
        .await;
    match served.unwrap() {
        Served::Simplified(text) => assert_eq!(text, "plain summary"),
        other => panic!("expected the simplified path, got {other:?}"),
    }

    // Error rate falls below 0.1 and holds; recovery returns to FULL.
    manager.report_health(sample(0.05));
    tokio::time::sleep(Duration::from_millis(40)).await;
    manager.report_health(sample(0.05));
    assert_eq!(manager.try_recover(), Some(DegradationLevel::Full));
    assert_eq!(manager.current_level(), DegradationLevel::Full);

    // History recorded both transitions.
    let history = manager.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].level, DegradationLevel::Reduced);
    assert_eq!(history[1].level, DegradationLevel::Full);
}

#[tokio::test]
async fn recovery_never_fires_while_the_trigger_holds() {
    let manager = manager();
    manager.report_health(sample(0.5));
    assert_eq!(manager.current_level(), DegradationLevel::Reduced);

    tokio::time::sleep(Duration::from_millis(40)).await;
    manager.report_health(sample(0.5));
    assert_eq!(manager.try_recover(), None);
    assert_eq!(manager.current_level(), DegradationLevel::Reduced);
}

#[tokio::test]
async fn the_monitor_recovers_in_the_background() {
    let manager = std::sync::Arc::new(
        DegradationManager::builder()
            .strategy(
                LevelStrategy::new(DegradationLevel::Reduced, TriggerCondition::ErrorRate(0.3))
                    .with_recovery(RecoveryCondition::Time {
                        after: Duration::from_millis(20),
                    }),
            )
            .monitor_interval(Duration::from_millis(10))
            .build(),
    );
    let _monitor = manager.spawn_monitor();

    manager.report_health(sample(0.5));
    assert_eq!(manager.current_level(), DegradationLevel::Reduced);

    // Trigger clears, dwell elapses, and the monitor steps back up.
    manager.report_health(sample(0.0));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(manager.current_level(), DegradationLevel::Full);
}
