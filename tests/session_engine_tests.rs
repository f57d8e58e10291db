//! Session engine behavior against the mock runtime

use loopdeck::collection::PatternRecord;
use loopdeck::runtime::{MockRuntime, RuntimeCall};
use loopdeck::session::{Rebuild, SessionEngine};
use loopdeck::SessionError;

fn session() -> (SessionEngine<MockRuntime>, MockRuntime) {
    let runtime = MockRuntime::new();
    (SessionEngine::new(runtime.clone(), 0.5), runtime)
}

#[tokio::test]
async fn test_program_depends_only_on_final_tracks() {
    let (first, _) = session();
    first.play_track("a", "s(\"bd*4\")", false, None).await.unwrap();
    first.play_track("b", "s(\"hh*8\")", false, None).await.unwrap();
    first.play_track("c", "note(\"c e g\")", false, None).await.unwrap();
    first.stop_track("b").await.unwrap();
    first.edit_fragment("a", "s(\"bd*2\")").await.unwrap();

    let (second, runtime) = session();
    second.play_track("a", "s(\"cp\")", false, None).await.unwrap();
    second.play_track("c", "note(\"c e g\")", false, None).await.unwrap();
    second.play_track("a", "s(\"bd*2\")", false, None).await.unwrap();

    assert_eq!(first.combined_program(), second.combined_program());
    assert_eq!(runtime.current_program(), second.combined_program());
    assert_eq!(second.active_ids(), vec!["a", "c"]);
}

#[tokio::test]
async fn test_every_push_replaces_everything() {
    let (engine, runtime) = session();
    engine.play_track("a", "s(\"bd\")", false, None).await.unwrap();
    engine.play_track("b", "s(\"hh\")", false, None).await.unwrap();

    for call in runtime.calls() {
        match call {
            RuntimeCall::Evaluate {
                reset_all,
                hush_first,
                ..
            } => assert!(reset_all && hush_first, "evaluation must replace the old program"),
            other => panic!("unexpected runtime call {:?}", other),
        }
    }
    assert_eq!(
        runtime.current_program().as_deref(),
        Some("stack(\n  (s(\"bd\")),\n  (s(\"hh\"))\n)")
    );
}

#[tokio::test]
async fn test_stopping_last_track_silences() {
    let (engine, runtime) = session();
    engine.play_track("a", "s(\"bd\")", false, None).await.unwrap();
    engine.play_track("b", "s(\"hh\")", false, None).await.unwrap();

    engine.stop_track("a").await.unwrap();
    assert_eq!(runtime.current_program().as_deref(), Some("s(\"hh\")"));

    let rebuild = engine.stop_track("b").await.unwrap();
    assert!(matches!(rebuild, Rebuild::Silenced { .. }));
    assert_eq!(runtime.calls().last(), Some(&RuntimeCall::Stop));
    assert!(runtime.is_silent());
    assert_eq!(engine.combined_program(), None);
    // Silence is a stop, never an evaluation of an empty program
    assert_eq!(runtime.programs().len(), 3);
}

#[tokio::test]
async fn test_exclusive_play_drops_others() {
    let (engine, runtime) = session();
    engine.play_track("a", "s(\"bd\")", false, None).await.unwrap();
    engine.play_track("b", "s(\"hh\")", false, None).await.unwrap();
    engine.play_track("c", "s(\"cp\")", true, None).await.unwrap();

    assert_eq!(engine.active_ids(), vec!["c"]);
    assert_eq!(runtime.current_program().as_deref(), Some("s(\"cp\")"));
}

#[tokio::test]
async fn test_replaying_keeps_position() {
    let (engine, _runtime) = session();
    engine.play_track("a", "s(\"bd\")", false, None).await.unwrap();
    engine.play_track("b", "s(\"hh\")", false, None).await.unwrap();
    engine.play_track("a", "s(\"sd\")", false, None).await.unwrap();

    assert_eq!(engine.active_ids(), vec!["a", "b"]);
    assert_eq!(engine.fragment("a").as_deref(), Some("s(\"sd\")"));
}

#[tokio::test]
async fn test_empty_input_is_rejected_without_change() {
    let (engine, runtime) = session();
    engine.play_track("a", "s(\"bd\")", false, None).await.unwrap();
    runtime.clear_calls();

    assert!(engine.play_track("", "s(\"hh\")", false, None).await.unwrap_err().is_input_error());
    assert!(engine.play_track("b", "   ", false, None).await.unwrap_err().is_input_error());
    assert!(engine
        .play_track("b", "s(\"hh\")", false, Some(" "))
        .await
        .unwrap_err()
        .is_input_error());

    assert!(runtime.calls().is_empty());
    assert_eq!(engine.active_ids(), vec!["a"]);
}

#[tokio::test]
async fn test_tempo_change_keeps_program_text() {
    let (engine, runtime) = session();
    let mut record = PatternRecord::new("groove", "s(\"bd*4\")");
    record.base_tempo = Some(120.0);
    engine.play_record(&record, false).await.unwrap();
    let before = runtime.current_program();
    let evaluations = runtime.programs().len();

    let cps = engine.set_tempo(200.0).unwrap();
    assert!((cps - 1.0).abs() < 1e-9, "120 bpm at 200% should be 1 cps, got {}", cps);
    assert_eq!(runtime.cps(), Some(cps));
    assert_eq!(runtime.current_program(), before);
    assert_eq!(runtime.programs().len(), evaluations);
    assert_eq!(engine.global_tempo_cps(), cps);
}

#[tokio::test]
async fn test_tempo_reference_is_latest_declared_base() {
    let (engine, _runtime) = session();

    // Nothing declares a base: default tempo
    engine.play_track("plain", "s(\"bd\")", false, None).await.unwrap();
    assert!((engine.set_tempo(100.0).unwrap() - 0.5).abs() < 1e-9);

    let mut record = PatternRecord::new("slow", "s(\"hh\")");
    record.base_tempo = Some(60.0);
    engine.play_record(&record, false).await.unwrap();
    engine
        .play_track("fast", "setcps(0.8)\ns(\"cp\")", false, None)
        .await
        .unwrap();
    assert!((engine.set_tempo(50.0).unwrap() - 0.4).abs() < 1e-9);

    engine.stop_track("fast").await.unwrap();
    assert!((engine.set_tempo(50.0).unwrap() - 0.125).abs() < 1e-9);
}

#[tokio::test]
async fn test_tempo_out_of_range() {
    let (engine, runtime) = session();
    engine.play_track("a", "s(\"bd\")", false, None).await.unwrap();
    engine.set_tempo(150.0).unwrap();

    for percent in [5.0, 401.0, f64::NAN] {
        let err = engine.set_tempo(percent).unwrap_err();
        assert!(err.is_input_error(), "{} should be rejected", percent);
    }
    assert_eq!(engine.tempo_percent(), 150.0);
    assert!((runtime.cps().unwrap() - 0.75).abs() < 1e-9);
}

#[tokio::test]
async fn test_tempo_runtime_failure_rolls_back() {
    let (engine, runtime) = session();
    engine.play_track("a", "s(\"bd\")", false, None).await.unwrap();
    runtime.fail_tempo("clock offline");

    assert!(matches!(engine.set_tempo(120.0), Err(SessionError::Runtime(_))));
    assert_eq!(engine.tempo_percent(), 100.0);
}

#[tokio::test]
async fn test_preload_failure_leaves_session_untouched() {
    let (engine, runtime) = session();
    engine.play_track("a", "s(\"bd\")", false, None).await.unwrap();
    let generation = engine.generation();
    runtime.fail_preload("https://samples.example/break.wav");

    let err = engine
        .play_track(
            "break",
            "s(\"break\").loopAt(2)",
            true,
            Some("https://samples.example/break.wav"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Preload { .. }));
    assert_eq!(engine.active_ids(), vec!["a"]);
    assert_eq!(engine.generation(), generation);
    assert_eq!(runtime.current_program().as_deref(), Some("s(\"bd\")"));
}

#[tokio::test]
async fn test_preload_happens_before_evaluation() {
    let (engine, runtime) = session();
    let mut record = PatternRecord::new("break", "s(\"break\").loopAt(2)");
    record.sample_url = Some("https://samples.example/break.wav".to_string());
    engine.play_record(&record, false).await.unwrap();

    let calls = runtime.calls();
    assert_eq!(
        calls[0],
        RuntimeCall::Preload("https://samples.example/break.wav".to_string())
    );
    assert!(matches!(calls[1], RuntimeCall::Evaluate { .. }));
}

#[tokio::test]
async fn test_evaluation_failure_keeps_fragment() {
    let (engine, runtime) = session();
    engine.play_track("a", "s(\"bd\")", false, None).await.unwrap();
    runtime.fail_next_evaluate("unexpected token");

    let err = engine.play_track("b", "s(\"hh\"", false, None).await.unwrap_err();
    assert!(matches!(err, SessionError::Evaluation(ref m) if m == "unexpected token"));
    assert!(engine.is_active("b"), "the broken fragment stays stored");

    // Fixing it is an ordinary edit
    engine.edit_fragment("b", "s(\"hh\")").await.unwrap();
    assert_eq!(runtime.current_program(), engine.combined_program());
}

#[tokio::test]
async fn test_concurrent_rebuild_is_superseded() {
    let (engine, runtime) = session();
    runtime.slow_next_evaluate(5);

    let (first, second) = tokio::join!(
        engine.play_track("a", "s(\"bd\")", false, None),
        engine.play_track("b", "s(\"hh\")", false, None),
    );

    assert!(matches!(first.unwrap(), Rebuild::Superseded { generation: 1 }));
    assert!(matches!(second.unwrap(), Rebuild::Evaluated { generation: 2 }));
    assert_eq!(runtime.current_program(), engine.combined_program());
}

#[tokio::test]
async fn test_queued_stale_rebuild_is_skipped() {
    let (engine, runtime) = session();
    runtime.slow_next_evaluate(5);

    let (first, second, third) = tokio::join!(
        engine.play_track("a", "s(\"bd\")", false, None),
        engine.play_track("b", "s(\"hh\")", false, None),
        engine.play_track("c", "s(\"cp\")", false, None),
    );

    assert!(matches!(first.unwrap(), Rebuild::Superseded { .. }));
    assert!(matches!(second.unwrap(), Rebuild::Skipped { .. }));
    assert!(matches!(third.unwrap(), Rebuild::Evaluated { .. }));

    // Only the first and the newest program ever reached the runtime
    assert_eq!(runtime.programs().len(), 2);
    assert_eq!(runtime.current_program(), engine.combined_program());
}

#[tokio::test]
async fn test_stale_evaluation_error_is_not_reported() {
    let (engine, runtime) = session();
    runtime.slow_next_evaluate(3);
    runtime.fail_next_evaluate("old program broke");

    let (first, second) = tokio::join!(
        engine.play_track("a", "s(\"bd\"", false, None),
        engine.play_track("a", "s(\"bd\")", false, None),
    );

    assert!(matches!(first.unwrap(), Rebuild::Superseded { .. }));
    assert!(matches!(second.unwrap(), Rebuild::Evaluated { .. }));
    assert_eq!(runtime.current_program().as_deref(), Some("s(\"bd\")"));
}

#[tokio::test]
async fn test_adjust_param_rewrites_only_the_number() {
    let (engine, runtime) = session();
    engine
        .play_track("a", "s(\"bd*4\").gain(0.5).room(0.2)", false, None)
        .await
        .unwrap();

    engine.adjust_param("a", 1, 0.9).await.unwrap();
    assert_eq!(
        runtime.current_program().as_deref(),
        Some("s(\"bd*4\").gain(0.5).room(0.9)")
    );

    assert!(matches!(
        engine.adjust_param("a", 2, 0.1).await,
        Err(SessionError::InvalidInput(_))
    ));
}
