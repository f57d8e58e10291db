//! Command handling end to end: collection, grids, params and tempo

use loopdeck::collection::{PatternCollection, PatternRecord};
use loopdeck::command::{CommandHandler, SessionCommand};
use loopdeck::runtime::MockRuntime;
use loopdeck::session::SessionEngine;
use loopdeck::step_grid::GridSize;
use loopdeck::SessionError;
use tempfile::TempDir;

struct Fixture {
    handler: CommandHandler<MockRuntime>,
    runtime: MockRuntime,
    _dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patterns.json");

    let mut collection = PatternCollection::load(&path).unwrap();
    let mut kick = PatternRecord::new("kick", "s(\"bd*4\").gain(0.8)");
    kick.base_tempo = Some(120.0);
    collection.add(kick).unwrap();
    collection
        .add(PatternRecord::new("hats", "s(\"hh ~ hh ~ ~ ~ hh ~ hh ~ hh ~ ~ ~ hh ~\").room(0.2)"))
        .unwrap();
    let mut brk = PatternRecord::new("break", "s(\"amen\").loopAt(2)");
    brk.sample_url = Some("https://samples.example/amen.wav".to_string());
    collection.add(brk).unwrap();
    collection
        .add(PatternRecord::new("chords", "note(\"<c e g>\").s(\"piano\").every(2, rev)"))
        .unwrap();
    collection.save().unwrap();

    // Reload to exercise the file format
    let collection = PatternCollection::load(&path).unwrap();
    let runtime = MockRuntime::new();
    let engine = SessionEngine::new(runtime.clone(), 0.5);
    Fixture {
        handler: CommandHandler::new(engine, collection, None, GridSize::Sixteen),
        runtime,
        _dir: dir,
    }
}

async fn run(fixture: &Fixture, line: &str) -> Result<String, SessionError> {
    let command = SessionCommand::parse(line)?.expect("not a command");
    fixture.handler.execute(command).await
}

#[tokio::test]
async fn test_play_solo_and_stop() {
    let f = fixture();
    run(&f, "play kick").await.unwrap();
    run(&f, "play hats").await.unwrap();
    assert_eq!(f.handler.engine().active_ids(), vec!["kick", "hats"]);

    run(&f, "solo chords").await.unwrap();
    assert_eq!(f.handler.engine().active_ids(), vec!["chords"]);

    let message = run(&f, "stop chords").await.unwrap();
    assert!(message.contains("silence"), "got {}", message);
    assert!(f.runtime.is_silent());

    assert!(matches!(
        run(&f, "play missing").await,
        Err(SessionError::Collection(_))
    ));
}

#[tokio::test]
async fn test_step_toggle_rewrites_fragment() {
    let f = fixture();
    run(&f, "play kick").await.unwrap();

    let grid = run(&f, "grid kick").await.unwrap();
    assert!(grid.contains("x...x...x...x..."), "got {}", grid);

    run(&f, "step kick 2").await.unwrap();
    assert_eq!(
        f.handler.engine().fragment("kick").as_deref(),
        Some("s(\"bd ~ bd ~ bd ~ ~ ~ bd ~ ~ ~ bd ~ ~ ~\").gain(0.8)")
    );
    assert_eq!(f.runtime.current_program(), f.handler.engine().combined_program());

    assert!(matches!(
        run(&f, "step kick 16").await,
        Err(SessionError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_steps_resize_and_remember_size() {
    let f = fixture();
    run(&f, "play hats").await.unwrap();

    let grid = run(&f, "steps hats 8").await.unwrap();
    assert!(grid.contains("xx.xxx.x"), "got {}", grid);

    // Later commands use the track's chosen size
    let grid = run(&f, "step hats 2").await.unwrap();
    assert!(grid.contains("xxxxxx.x"), "got {}", grid);
    assert_eq!(
        f.handler.engine().fragment("hats").as_deref(),
        Some("s(\"hh hh hh hh hh hh ~ hh\").room(0.2)")
    );
}

#[tokio::test]
async fn test_clearing_every_step_stays_editable() {
    let f = fixture();
    run(&f, "eval kick s(\"bd ~ ~ ~ ~ ~ ~ ~\").gain(0.7)").await.unwrap();
    run(&f, "steps kick 8").await.unwrap();

    let grid = run(&f, "step kick 0").await.unwrap();
    assert!(grid.contains("........"), "got {}", grid);
    assert_eq!(
        f.handler.engine().fragment("kick").as_deref(),
        Some("s(\"bd*0\").gain(0.7)")
    );

    run(&f, "step kick 0").await.unwrap();
    assert_eq!(
        f.handler.engine().fragment("kick").as_deref(),
        Some("s(\"bd ~ ~ ~ ~ ~ ~ ~\").gain(0.7)")
    );
}

#[tokio::test]
async fn test_failed_hush_keeps_grid_sizes() {
    let f = fixture();
    run(&f, "play hats").await.unwrap();
    run(&f, "steps hats 8").await.unwrap();
    f.runtime.fail_stop("audio device gone");

    assert!(matches!(run(&f, "hush").await, Err(SessionError::Runtime(_))));
    assert_eq!(f.handler.grid_size("hats"), GridSize::Eight);

    f.runtime.clear_failures();
    run(&f, "hush").await.unwrap();
    assert_eq!(f.handler.grid_size("hats"), GridSize::Sixteen);
}

#[tokio::test]
async fn test_loop_length_only_for_sample_tracks() {
    let f = fixture();
    run(&f, "play break").await.unwrap();
    run(&f, "play kick").await.unwrap();

    let grid = run(&f, "loop break 4").await.unwrap();
    assert!(grid.contains("loop 4"), "got {}", grid);
    assert!(f
        .handler
        .engine()
        .fragment("break")
        .unwrap()
        .ends_with(".loopAt(4)"));

    assert!(matches!(
        run(&f, "loop kick 2").await,
        Err(SessionError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_combinator_patterns_are_not_grids() {
    let f = fixture();
    run(&f, "play chords").await.unwrap();
    assert!(matches!(
        run(&f, "grid chords").await,
        Err(SessionError::Codec(_))
    ));
}

#[tokio::test]
async fn test_params_listing_and_edit() {
    let f = fixture();
    run(&f, "play hats").await.unwrap();

    let listing = run(&f, "params hats").await.unwrap();
    assert!(listing.contains("room"));

    run(&f, "param hats 0 0.75").await.unwrap();
    assert_eq!(
        f.runtime.current_program().as_deref(),
        Some("s(\"hh ~ hh ~ ~ ~ hh ~ hh ~ hh ~ ~ ~ hh ~\").room(0.75)")
    );
    assert!(run(&f, "params nothing").await.is_err());
}

#[tokio::test]
async fn test_tempo_follows_collection_base() {
    let f = fixture();
    run(&f, "play kick").await.unwrap();

    let message = run(&f, "tempo 50").await.unwrap();
    assert_eq!(message, "tempo 50% (0.25 cps)");
    assert_eq!(f.runtime.cps(), Some(0.25));

    run(&f, "hush").await.unwrap();
    assert_eq!(f.handler.engine().tempo_percent(), 100.0);
}

#[tokio::test]
async fn test_preload_failure_reported() {
    let f = fixture();
    run(&f, "play kick").await.unwrap();
    f.runtime.fail_preload("https://samples.example/amen.wav");

    assert!(matches!(
        run(&f, "solo break").await,
        Err(SessionError::Preload { .. })
    ));
    assert_eq!(f.handler.engine().active_ids(), vec!["kick"]);
}

#[tokio::test]
async fn test_generate_without_generator() {
    let f = fixture();
    assert!(matches!(
        run(&f, "gen bass dark rolling bassline").await,
        Err(SessionError::Generator(_))
    ));
}

#[tokio::test]
async fn test_status_and_list() {
    let f = fixture();
    assert_eq!(run(&f, "status").await.unwrap(), "nothing playing");

    run(&f, "play kick").await.unwrap();
    let status = run(&f, "status").await.unwrap();
    assert!(status.starts_with("playing: kick"), "got {}", status);

    let list = run(&f, "list").await.unwrap();
    assert!(list.lines().any(|l| l.starts_with("* kick")));
    assert!(list.lines().any(|l| l.starts_with("  hats")));
}
