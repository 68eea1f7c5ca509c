use super::*;

fn viewport(scroll_top: f64, content_height: f64) -> Viewport {
    Viewport {
        scroll_top,
        viewport_height: 600.0,
        content_height,
    }
}

fn settled() -> ScrollCoordinator {
    let mut coordinator = ScrollCoordinator::new(150.0, 0.0);
    let first_page = MergeOutcome {
        appended: 20,
        ..MergeOutcome::default()
    };
    let action =
        coordinator.on_store_changed(&first_page, 20, true, viewport(0.0, 0.0), 2000.0);
    assert_eq!(action, ScrollAction::ToBottom);
    coordinator
}

#[test]
fn initial_population_scrolls_once() {
    let mut coordinator = settled();
    assert!(!coordinator.in_initial_phase());

    let status_only = MergeOutcome {
        updated: 1,
        ..MergeOutcome::default()
    };
    let action =
        coordinator.on_store_changed(&status_only, 20, true, viewport(400.0, 2000.0), 2000.0);
    assert_eq!(action, ScrollAction::None);
}

#[test]
fn stays_armed_until_loading_completes_with_content() {
    let mut coordinator = ScrollCoordinator::new(150.0, 0.0);
    let live = MergeOutcome {
        appended: 1,
        ..MergeOutcome::default()
    };
    assert_eq!(
        coordinator.on_store_changed(&live, 1, false, viewport(0.0, 0.0), 80.0),
        ScrollAction::None
    );
    assert!(coordinator.in_initial_phase());

    assert_eq!(
        coordinator.on_store_changed(&MergeOutcome::default(), 0, true, viewport(0.0, 0.0), 0.0),
        ScrollAction::None
    );
    assert!(coordinator.in_initial_phase());
}

#[test]
fn backfill_preserves_anchor() {
    let mut coordinator = settled();
    let older = MergeOutcome {
        prepended: 20,
        ..MergeOutcome::default()
    };
    let before = viewport(0.0, 2000.0);
    let action = coordinator.on_store_changed(&older, 40, true, before, 3600.0);
    assert_eq!(action, ScrollAction::SetOffset(1600.0));
    assert_eq!(action.resolve(before, 3600.0), 1600.0);
}

#[test]
fn new_tail_follows_only_near_bottom() {
    let mut coordinator = settled();
    let tail = MergeOutcome {
        appended: 1,
        ..MergeOutcome::default()
    };

    // 100px from the bottom: follow.
    let near = viewport(1300.0, 2000.0);
    let action = coordinator.on_store_changed(&tail, 21, true, near, 2080.0);
    assert_eq!(action, ScrollAction::ToBottom);
    assert_eq!(action.resolve(near, 2080.0), 1480.0);

    // 400px from the bottom: leave the reader alone.
    let far = viewport(1000.0, 2000.0);
    assert_eq!(
        coordinator.on_store_changed(&tail, 22, true, far, 2080.0),
        ScrollAction::None
    );
}

#[test]
fn sentinel_visible_at_top() {
    let coordinator = ScrollCoordinator::new(150.0, 0.0);
    assert!(coordinator.sentinel_visible(viewport(0.0, 2000.0)));
    assert!(!coordinator.sentinel_visible(viewport(10.0, 2000.0)));
}
