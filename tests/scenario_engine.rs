//! Scenario engine behaviour against scripted screens.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::Notify;

use autodrive::scenario::{
    handler_fn, EngineOptions, FixedOutcome, RunStatus, ScenarioContext, ScenarioEngine,
    ScenarioRunner, Scene, SceneHandler, SceneOutcome, SceneSignature,
};
use autodrive::perception::Snapshot;
use autodrive::AutodriveError;
use common::{scenario_context, screen, text, ScriptedPerception};

fn requires(label: &str) -> SceneSignature {
    SceneSignature {
        required_all: vec![text(label)],
        ..Default::default()
    }
}

fn fast() -> EngineOptions {
    EngineOptions {
        init_scene: None,
        no_match_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(1),
    }
}

fn counting(scene: &'static str) -> Arc<dyn SceneHandler> {
    handler_fn(move |ctx| {
        let path = format!("visits.{}", scene);
        let n = ctx.get(&path).and_then(|v| v.as_u64()).unwrap_or(0);
        ctx.set(&path, json!(n + 1));
        Ok(SceneOutcome::Continue)
    })
}

#[tokio::test]
async fn test_prune_retires_scenes_and_finishes_when_none_remain() {
    let perception = ScriptedPerception::new(vec![
        screen(&["Home"]),
        screen(&["Home"]),
        screen(&["Done"]),
    ]);
    let (mut ctx, _) = scenario_context(perception.clone());
    let scenes = vec![
        Scene::new("home", counting("home")).with_signature(requires("Home")),
        Scene::new("done", counting("done"))
            .with_signature(requires("Done"))
            .with_prune(["home", "done"]),
    ];

    let result = ScenarioEngine::new(scenes, fast()).run(&mut ctx).await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.last_scene.as_deref(), Some("done"));
    assert_eq!(ctx.get("visits.home"), Some(&json!(2)));
    assert_eq!(ctx.get("visits.done"), Some(&json!(1)));
    assert!(ctx.snapshot().is_empty(), "snapshot is cleared on exit");
}

#[tokio::test]
async fn test_two_matching_scenes_fail_with_conflict() {
    let perception = ScriptedPerception::new(vec![screen(&["Home", "Popup"])]);
    let (mut ctx, _) = scenario_context(perception);
    let scenes = vec![
        Scene::new("home", Arc::new(FixedOutcome(SceneOutcome::Success)))
            .with_signature(requires("Home")),
        Scene::new("popup", Arc::new(FixedOutcome(SceneOutcome::Success)))
            .with_signature(requires("Popup")),
    ];

    let result = ScenarioEngine::new(scenes, fast()).run(&mut ctx).await;

    assert_eq!(result.status, RunStatus::Failed);
    match result.error {
        Some(AutodriveError::SceneConflict(ids)) => assert_eq!(ids, vec!["home", "popup"]),
        other => panic!("expected conflict, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_match_window_times_out() {
    let perception = ScriptedPerception::new(vec![screen(&["Somewhere else"])]);
    let (mut ctx, _) = scenario_context(perception.clone());
    let scenes = vec![Scene::new("home", Arc::new(FixedOutcome(SceneOutcome::Success)))
        .with_signature(requires("Home"))];
    let options = EngineOptions {
        init_scene: None,
        no_match_timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(100),
    };

    let result = ScenarioEngine::new(scenes, options).run(&mut ctx).await;

    assert_eq!(result.status, RunStatus::Timeout);
    assert!(result.last_scene.is_none());
    assert!(matches!(result.error, Some(AutodriveError::Timeout(1000))));
    assert!(perception.captures() >= 10);
}

fn one_second_window() -> EngineOptions {
    EngineOptions {
        init_scene: None,
        no_match_timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(100),
    }
}

/// Eight polls of an unknown screen, then `extra`. The final frame repeats.
fn frames_then(extra: Vec<Snapshot>) -> Vec<Snapshot> {
    let mut frames: Vec<Snapshot> = (0..8).map(|_| screen(&["Somewhere else"])).collect();
    frames.extend(extra);
    frames
}

#[tokio::test(start_paused = true)]
async fn test_match_restarts_no_match_window() {
    let perception = ScriptedPerception::new(frames_then(vec![
        screen(&["Home"]),
        screen(&["Somewhere else"]),
    ]));
    let (mut ctx, _) = scenario_context(perception);
    let scenes = vec![Scene::new("home", counting("home")).with_signature(requires("Home"))];
    let started = tokio::time::Instant::now();

    let result = ScenarioEngine::new(scenes, one_second_window()).run(&mut ctx).await;
    let elapsed = started.elapsed();

    assert_eq!(result.status, RunStatus::Timeout);
    assert_eq!(result.last_scene.as_deref(), Some("home"));
    assert_eq!(ctx.get("visits.home"), Some(&json!(1)));
    // Home matched at 0.8s, so the window closes a full second later.
    assert!(elapsed >= Duration::from_millis(1800), "timed out after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2500), "timed out after {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_empty_snapshots_do_not_extend_window() {
    let perception = ScriptedPerception::new(frames_then(vec![Snapshot::empty()]));
    let (mut ctx, _) = scenario_context(perception.clone());
    let scenes = vec![Scene::new("home", counting("home")).with_signature(requires("Home"))];
    let started = tokio::time::Instant::now();

    let result = ScenarioEngine::new(scenes, one_second_window()).run(&mut ctx).await;
    let elapsed = started.elapsed();

    assert_eq!(result.status, RunStatus::Timeout);
    assert!(result.last_scene.is_none());
    assert!(perception.captures() > 8, "empty frames were polled");
    assert!(elapsed >= Duration::from_secs(1), "timed out after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1500), "timed out after {:?}", elapsed);
}

#[tokio::test]
async fn test_pruning_scene_that_never_matches_leaves_other_scene_live() {
    let perception = ScriptedPerception::new(vec![screen(&["Y"])]);
    let (mut ctx, _) = scenario_context(perception);
    let scenes = vec![
        Scene::new("A", counting("A"))
            .with_signature(requires("X"))
            .with_prune(["A", "B"]),
        Scene::new("B", Arc::new(FixedOutcome(SceneOutcome::Success)))
            .with_signature(requires("Y")),
    ];

    let result = ScenarioEngine::new(scenes, fast()).run(&mut ctx).await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.last_scene.as_deref(), Some("B"));
    assert_eq!(ctx.get("visits.A"), None);
}

#[tokio::test]
async fn test_no_scenes_is_empty_run() {
    let perception = ScriptedPerception::new(vec![screen(&["Home"])]);
    let (mut ctx, _) = scenario_context(perception.clone());

    let result = ScenarioEngine::new(Vec::new(), fast()).run(&mut ctx).await;

    assert_eq!(result.status, RunStatus::Empty);
    assert!(matches!(result.error, Some(AutodriveError::EmptyScript)));
    assert_eq!(perception.captures(), 0);
}

#[tokio::test]
async fn test_init_scene_runs_once_without_matching() {
    let perception = ScriptedPerception::new(vec![screen(&["Home"])]);
    let (mut ctx, _) = scenario_context(perception);
    let boot = handler_fn(|ctx| {
        ctx.set("booted", json!(true));
        Ok(SceneOutcome::Continue)
    });
    let scenes = vec![
        // Would never match the screen on its own.
        Scene::new("boot", boot).with_signature(requires("Splash")),
        Scene::new("home", Arc::new(FixedOutcome(SceneOutcome::Success)))
            .with_signature(requires("Home")),
    ];
    let options = EngineOptions {
        init_scene: Some("boot".into()),
        ..fast()
    };

    let result = ScenarioEngine::new(scenes, options).run(&mut ctx).await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.last_scene.as_deref(), Some("home"));
    assert_eq!(ctx.get("booted"), Some(&json!(true)));
}

#[tokio::test]
async fn test_wildcard_scene_waits_for_a_readable_screen() {
    let perception = ScriptedPerception::new(vec![
        autodrive::perception::Snapshot::empty(),
        autodrive::perception::Snapshot::empty(),
        screen(&["Anything"]),
    ]);
    let (mut ctx, _) = scenario_context(perception.clone());
    let scenes = vec![Scene::new("any", Arc::new(FixedOutcome(SceneOutcome::Success)))];

    let result = ScenarioEngine::new(scenes, fast()).run(&mut ctx).await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(perception.captures(), 3);
}

#[tokio::test]
async fn test_error_before_exhaustion_fails_run() {
    let perception = ScriptedPerception::new(vec![screen(&["Checkout"])]);
    let (mut ctx, _) = scenario_context(perception);
    let scenes = vec![Scene::new("checkout", Arc::new(FixedOutcome(SceneOutcome::Error)))
        .with_signature(requires("Checkout"))
        .with_prune(["checkout"])];

    let result = ScenarioEngine::new(scenes, fast()).run(&mut ctx).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.last_scene.as_deref(), Some("checkout"));
}

#[tokio::test]
async fn test_stop_outcome_ends_run_as_stopped() {
    let perception = ScriptedPerception::new(vec![screen(&["Banned"])]);
    let (mut ctx, _) = scenario_context(perception);
    let scenes = vec![Scene::new("banned", Arc::new(FixedOutcome(SceneOutcome::Stop)))
        .with_signature(requires("Banned"))];

    let result = ScenarioEngine::new(scenes, fast()).run(&mut ctx).await;

    assert_eq!(result.status, RunStatus::Stopped);
    assert!(result.error.is_none());
    assert!(!result.was_cancelled());
}

#[tokio::test]
async fn test_cancellation_is_observed_between_iterations() {
    let perception = ScriptedPerception::new(vec![screen(&["Home"])]);
    let (mut ctx, _) = scenario_context(perception);
    let scenes = vec![Scene::new(
        "home",
        handler_fn(|ctx| {
            ctx.cancellation().cancel();
            Ok(SceneOutcome::Continue)
        }),
    )
    .with_signature(requires("Home"))];

    let result = ScenarioEngine::new(scenes, fast()).run(&mut ctx).await;

    assert_eq!(result.status, RunStatus::Stopped);
    assert!(result.was_cancelled());
    assert_eq!(result.last_scene.as_deref(), Some("home"));
}

/// Parks until released, then succeeds.
struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl SceneHandler for Gate {
    async fn handle(&self, _ctx: &mut ScenarioContext) -> Result<SceneOutcome, AutodriveError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(SceneOutcome::Success)
    }
}

#[tokio::test]
async fn test_runner_refuses_second_run_of_same_script() {
    let runner = Arc::new(ScenarioRunner::default());
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let gate: Arc<dyn SceneHandler> = Arc::new(Gate {
        entered: entered.clone(),
        release: release.clone(),
    });

    let first = {
        let runner = runner.clone();
        let gate = gate.clone();
        tokio::spawn(async move {
            let (mut ctx, _) = scenario_context(ScriptedPerception::new(vec![screen(&["Home"])]));
            runner
                .run("daily", vec![Scene::new("home", gate)], &mut ctx, fast())
                .await
        })
    };
    entered.notified().await;

    let (mut ctx, _) = scenario_context(ScriptedPerception::new(vec![screen(&["Home"])]));
    let second = runner
        .run("daily", vec![Scene::new("home", gate.clone())], &mut ctx, fast())
        .await;
    assert_eq!(second.status, RunStatus::Failed);
    assert!(matches!(second.error, Some(AutodriveError::DeviceBusy)));

    release.notify_one();
    let first = first.await.unwrap();
    assert_eq!(first.status, RunStatus::Success);
    assert!(!runner.guard().is_busy());
}
