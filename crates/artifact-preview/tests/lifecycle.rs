use artifact_preview::bindings::default_registry;
use artifact_preview::config::PreviewConfig;
use artifact_preview::lifecycle::{AttemptOutcome, LifecycleController, Phase};
use artifact_preview::registry::CollisionPolicy;
use futures::executor::{LocalPool, block_on};
use futures::task::LocalSpawnExt;
use std::cell::RefCell;
use std::rc::Rc;

const WORKING: &str = "export default () => <p>ok</p>;";
const BROKEN: &str = "export default () => <p>ok;";

fn controller() -> LifecycleController {
    let registry = Rc::new(default_registry(CollisionPolicy::Reject).unwrap());
    LifecycleController::new(registry, PreviewConfig::default())
}

#[test]
fn test_parse_failure_moves_to_compile_failed() {
    let controller = controller();
    assert_eq!(block_on(controller.set_source(BROKEN)), AttemptOutcome::Applied);
    let Phase::CompileFailed { error, .. } = controller.phase() else {
        panic!("Expected compile failure");
    };
    assert_eq!(error.title(), "Compilation Error");
}

#[test]
fn test_every_attempt_resets_to_compiling() {
    let controller = controller();
    block_on(controller.set_source(WORKING));
    assert!(matches!(controller.phase(), Phase::Ready { .. }));

    let attempt = controller.set_source(BROKEN);
    assert!(matches!(controller.phase(), Phase::Compiling { .. }));
    block_on(attempt);
    assert!(matches!(controller.phase(), Phase::CompileFailed { .. }));
}

#[test]
fn test_out_of_order_completion_keeps_latest_source() {
    let controller = controller();
    let outcomes = Rc::new(RefCell::new(Vec::new()));
    let attempts = vec![
        controller.set_source(WORKING),
        controller.set_source("export default () => <b>second</b>;"),
        controller.set_source(BROKEN),
    ];

    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    for (index, attempt) in attempts.into_iter().enumerate().rev() {
        let outcomes = Rc::clone(&outcomes);
        spawner
            .spawn_local(async move {
                let outcome = attempt.await;
                outcomes.borrow_mut().push((index, outcome));
            })
            .unwrap();
    }
    pool.run();

    let mut outcomes = outcomes.borrow().clone();
    outcomes.sort_by_key(|(index, _)| *index);
    assert_eq!(
        outcomes,
        vec![
            (0, AttemptOutcome::Discarded),
            (1, AttemptOutcome::Discarded),
            (2, AttemptOutcome::Applied),
        ]
    );
    assert!(matches!(controller.phase(), Phase::CompileFailed { .. }));
    assert_eq!(controller.source().as_str(), BROKEN);
}

#[test]
fn test_older_success_never_overwrites_newer_failure() {
    let controller = controller();
    let older = controller.set_source(WORKING);
    let newer = controller.set_source(BROKEN);
    assert_eq!(block_on(newer), AttemptOutcome::Applied);
    assert_eq!(block_on(older), AttemptOutcome::Discarded);
    assert!(matches!(controller.phase(), Phase::CompileFailed { .. }));
}

#[test]
fn test_disposed_controller_ignores_results() {
    let controller = controller();
    let mut phases = controller.subscribe();
    let attempt = controller.set_source(WORKING);
    controller.dispose();

    assert_eq!(block_on(attempt), AttemptOutcome::Discarded);
    assert!(controller.is_disposed());
    let mut names = Vec::new();
    while let Ok(Some(phase)) = phases.try_next() {
        names.push(phase.name());
    }
    assert_eq!(names, vec!["idle", "compiling"]);
}

#[test]
fn test_handles_share_state() {
    let controller = controller();
    let handle = controller.clone();
    block_on(handle.set_source(WORKING));
    assert!(matches!(controller.phase(), Phase::Ready { .. }));
}
