// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end cascade: host event, tracker, providers, guides, observers.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use kurbo::{Insets, Rect};
use understory_keyboard_guide::{
    HostEvent, HostTraits, KeyboardObserver, KeyboardPayload, KeyboardState, KeyboardTracker, ResponderChain,
    SafeAreaGuide, SafeAreaObserver, SafeAreaRegistry, SpaceId, SurfaceHost,
};
use understory_surface_tree::{LocalSurface, NodeId, Tree};

const SCREEN: Rect = Rect::new(0.0, 0.0, 320.0, 568.0);

struct Fixture {
    tree: Tree,
    window: NodeId,
    tracker: KeyboardTracker,
    registry: Rc<SafeAreaRegistry>,
}

impl Fixture {
    fn new() -> Self {
        let mut tree = Tree::new(SCREEN);
        let window = tree.insert_window(SCREEN);
        tree.make_key(Some(window));
        tree.commit();
        let tracker = KeyboardTracker::new();
        tracker.activate_application();
        let registry = Rc::new(SafeAreaRegistry::new(tracker.clone()));
        Self {
            tree,
            window,
            tracker,
            registry,
        }
    }

    fn show(&self, payload: KeyboardPayload) {
        self.tracker.handle_event(&self.tree, &HostEvent::will_show(payload));
    }

    fn window_inset(&self) -> f64 {
        self.registry
            .geometry(&self.tree, self.window.into())
            .effective()
            .y1
    }
}

#[derive(Default)]
struct InsetLog(RefCell<Vec<f64>>);

impl SafeAreaObserver for InsetLog {
    fn safe_area_did_change(&self, _: &dyn SurfaceHost, insets: Insets) {
        self.0.borrow_mut().push(insets.y1);
    }
}

#[test]
fn keyboard_covering_bottom_of_surface() {
    let fx = Fixture::new();
    assert_eq!(fx.window_inset(), 0.0);

    fx.show(KeyboardPayload::local(Rect::new(0.0, 368.0, 320.0, 568.0)));
    assert_eq!(fx.window_inset(), 200.0);

    fx.show(KeyboardPayload::local(Rect::new(0.0, 600.0, 320.0, 800.0)));
    assert_eq!(fx.window_inset(), 0.0);
}

#[test]
fn hidden_keyboard_means_no_inset_anywhere() {
    let mut fx = Fixture::new();
    let other = fx.tree.insert_window(Rect::new(0.0, 284.0, 320.0, 568.0));
    fx.tree.commit();
    fx.show(KeyboardPayload::local(Rect::new(0.0, 368.0, 320.0, 568.0)));
    let other_geometry = fx.registry.geometry(&fx.tree, other.into());
    // The second window's top is at 284, so the keyboard covers 200 of its 284.
    assert_eq!(other_geometry.insets.y1, 200.0);

    fx.tracker.handle_event(&fx.tree, &HostEvent::will_hide());
    assert_eq!(fx.window_inset(), 0.0);
    assert_eq!(fx.registry.geometry(&fx.tree, other.into()).insets, Insets::ZERO);
}

#[test]
fn width_mismatch_keeps_previous_state() {
    let fx = Fixture::new();
    let keyboard = Rect::new(0.0, 368.0, 320.0, 568.0);
    fx.show(KeyboardPayload::local(keyboard));

    fx.tracker.handle_event(
        &fx.tree,
        &HostEvent::will_change_frame(KeyboardPayload::local(Rect::new(0.0, 300.0, 375.0, 568.0))),
    );
    assert_eq!(fx.tracker.docked_keyboard_state().map(|s| s.frame()), Some(keyboard));
    assert_eq!(fx.window_inset(), 200.0);
}

#[test]
fn window_moving_without_keyboard_event_updates_inset() {
    let mut fx = Fixture::new();
    let log = Rc::new(InsetLog::default());
    let provider = fx.registry.provider_for(&fx.tree, fx.window.into());
    let _sub = provider.subscribe(Rc::downgrade(&log) as Weak<dyn SafeAreaObserver>);

    fx.show(KeyboardPayload::local(Rect::new(0.0, 368.0, 320.0, 568.0)));
    let forced = fx.tree.layout_requests();

    // A sheet-style presentation slides the window down by 100.
    fx.tree.set_frame(fx.window, Rect::new(0.0, 100.0, 320.0, 668.0));
    let relayout = fx.tree.commit();
    assert!(relayout.deliveries > 0);
    assert_eq!(fx.window_inset(), 300.0);
    assert_eq!(*log.0.borrow(), [200.0, 300.0]);
    assert_eq!(fx.tree.layout_requests(), forced, "window moves ride the host's pass");
}

#[test]
fn keyboard_event_applies_pending_window_move() {
    let mut fx = Fixture::new();
    let log = Rc::new(InsetLog::default());
    let provider = fx.registry.provider_for(&fx.tree, fx.window.into());
    let _sub = provider.subscribe(Rc::downgrade(&log) as Weak<dyn SafeAreaObserver>);

    // Moved but not yet laid out when the keyboard arrives.
    fx.tree.set_frame(fx.window, Rect::new(0.0, 100.0, 320.0, 668.0));
    fx.show(KeyboardPayload::local(Rect::new(0.0, 368.0, 320.0, 568.0)));
    assert_eq!(fx.window_inset(), 300.0);
    assert_eq!(*log.0.borrow(), [300.0]);
    assert_eq!(fx.tree.commit().deliveries, 0, "the forced pass consumed the move");
}

#[test]
fn removed_window_releases_its_provider() {
    let mut fx = Fixture::new();
    let extra = fx.tree.insert_window(SCREEN);
    fx.tree.commit();
    let provider = fx.registry.provider_for(&fx.tree, extra.into());
    assert_eq!(fx.tracker.observer_count(), 1);

    fx.tree.remove(extra);
    assert!(!provider.is_observing());
    assert!(fx.registry.is_empty());
    assert_eq!(fx.tracker.observer_count(), 0);

    let before = fx.tree.layout_requests();
    fx.show(KeyboardPayload::local(Rect::new(0.0, 368.0, 320.0, 568.0)));
    assert_eq!(fx.tree.layout_requests(), before);
}

#[test]
fn each_broadcast_forces_one_layout_per_provider() {
    let mut fx = Fixture::new();
    let second = fx.tree.insert_window(SCREEN);
    fx.tree.commit();
    let _a = fx.registry.provider_for(&fx.tree, fx.window.into());
    let _b = fx.registry.provider_for(&fx.tree, second.into());
    let before = fx.tree.layout_requests();

    fx.show(KeyboardPayload::local(Rect::new(0.0, 368.0, 320.0, 568.0)));
    assert_eq!(fx.tree.layout_requests(), before + 2);

    // Reading geometry never lays out.
    let _ = fx.window_inset();
    let _ = fx.registry.geometry(&fx.tree, second.into());
    assert_eq!(fx.tree.layout_requests(), before + 2);
}

#[test]
fn nested_view_guide_tracks_its_window() {
    let mut fx = Fixture::new();
    let content = fx.tree.insert_view(fx.window, Rect::new(0.0, 64.0, 320.0, 568.0));
    let footer = fx.tree.insert_view(content, Rect::new(0.0, 404.0, 320.0, 504.0));
    fx.tree.commit();

    let guide = SafeAreaGuide::new(fx.registry.clone(), &fx.tree, footer.into());
    let log = Rc::new(InsetLog::default());
    let _sub = guide.subscribe(Rc::downgrade(&log) as Weak<dyn SafeAreaObserver>);

    // The footer spans 468..568 on screen; a keyboard at 518 covers half of it.
    fx.show(KeyboardPayload::local(Rect::new(0.0, 518.0, 320.0, 568.0)));
    assert_eq!(guide.insets(&fx.tree).y1, 50.0);

    fx.show(KeyboardPayload::local(Rect::new(0.0, 368.0, 320.0, 568.0)));
    assert_eq!(guide.insets(&fx.tree).y1, 100.0, "clamped to the footer's height");
    assert_eq!(*log.0.borrow(), [50.0, 100.0]);
}

#[test]
fn guide_follows_view_between_windows() {
    let mut fx = Fixture::new();
    let lower = fx.tree.insert_window(Rect::new(0.0, 284.0, 320.0, 568.0));
    let view = fx.tree.insert_view(fx.window, Rect::new(0.0, 0.0, 320.0, 568.0));
    fx.tree.commit();
    let guide = SafeAreaGuide::new(fx.registry.clone(), &fx.tree, view.into());
    fx.show(KeyboardPayload::local(Rect::new(0.0, 468.0, 320.0, 568.0)));
    assert_eq!(guide.insets(&fx.tree).y1, 100.0);

    fx.tree.reparent(view, Some(lower));
    fx.tree.set_frame(view, Rect::new(0.0, 0.0, 320.0, 284.0));
    fx.tree.commit();
    assert_eq!(guide.provider().map(|p| p.surface()), Some(SpaceId::from(lower)));
    assert_eq!(guide.insets(&fx.tree).y1, 100.0);

    fx.tree.remove(lower);
    assert!(guide.provider().is_none());
    assert!(fx.registry.get(lower.into()).is_none());
    assert!(fx.registry.get(fx.window.into()).is_some());
}

#[test]
fn local_only_ignores_other_applications() {
    let fx = Fixture::new();
    fx.show(KeyboardPayload::remote(Rect::new(0.0, 368.0, 320.0, 568.0)));
    let provider = fx.registry.provider_for(&fx.tree, fx.window.into());

    assert_eq!(fx.window_inset(), 200.0);
    provider.set_local_only(&fx.tree, true);
    let geometry = fx.registry.geometry(&fx.tree, fx.window.into());
    assert!(geometry.is_local_only);
    assert_eq!(geometry.effective(), Insets::ZERO);
    assert_eq!(geometry.insets.y1, 200.0);
    // The tracker still reports the keyboard unfiltered.
    assert_eq!(fx.tracker.docked_keyboard_state().map(|s| s.is_local()), Some(false));
}

#[test]
fn extension_on_tablet_uses_hosting_window() {
    let tablet = Rect::new(0.0, 0.0, 768.0, 1024.0);
    let mut tree = Tree::new(tablet);
    tree.set_host_traits(HostTraits::ABSOLUTE_SCREEN_SPACE | HostTraits::TABLET);
    let window = tree.insert_window(tablet);
    let root = tree.insert_view(window, tablet);
    tree.commit();

    let tracker = KeyboardTracker::new();
    tracker.activate_extension(root.into());
    let registry = SafeAreaRegistry::new(tracker.clone());

    // Reported 300 tall, really 322 once the sentinel reveals the adjustment.
    let reported = Rect::new(0.0, 724.0, 768.0, 1024.0);
    let sentinel = Rect::new(0.0, 1024.0, 768.0, 1002.0);
    tracker.handle_event(
        &tree,
        &HostEvent::will_show(KeyboardPayload::local(reported).with_begin(sentinel)),
    );
    assert_eq!(tracker.learned_extension_adjustment(), Some(22.0));
    assert_eq!(registry.geometry(&tree, root.into()).insets.y1, 322.0);
}

#[test]
fn legacy_host_interprets_frames_in_key_window() {
    let mut fx = Fixture::new();
    fx.tree.set_host_traits(HostTraits::empty());
    fx.tree.set_frame(fx.window, Rect::new(40.0, 0.0, 360.0, 568.0));
    fx.tree.commit();

    fx.show(KeyboardPayload::local(Rect::new(0.0, 368.0, 320.0, 568.0)));
    let state = fx.tracker.docked_keyboard_state().expect("accepted");
    assert_eq!(state.space(), SpaceId::from(fx.window));
    assert_eq!(state.frame().x0, -40.0);
    assert_eq!(fx.window_inset(), 200.0);

    fx.tree.make_key(None);
    fx.tracker.handle_event(&fx.tree, &HostEvent::will_hide());
    fx.show(KeyboardPayload::local(Rect::new(0.0, 368.0, 320.0, 568.0)));
    assert!(fx.tracker.docked_keyboard_state().is_none(), "no key window");
}

#[test]
fn observers_see_replaced_state() {
    struct Seen(RefCell<Vec<Option<KeyboardState>>>);
    impl KeyboardObserver for Seen {
        fn docked_keyboard_state_did_change(
            &self,
            _: &dyn SurfaceHost,
            tracker: &KeyboardTracker,
            state: Option<&KeyboardState>,
        ) {
            assert_eq!(tracker.docked_keyboard_state().as_ref(), state);
            self.0.borrow_mut().push(state.copied());
        }
    }

    let fx = Fixture::new();
    let seen = Rc::new(Seen(RefCell::new(Vec::new())));
    let sub = fx.tracker.add_observer(&seen);
    fx.show(KeyboardPayload::local(Rect::new(0.0, 368.0, 320.0, 568.0)));
    fx.tracker.handle_event(&fx.tree, &HostEvent::will_hide());
    sub.cancel();
    fx.show(KeyboardPayload::local(Rect::new(0.0, 368.0, 320.0, 568.0)));
    assert_eq!(seen.0.borrow().len(), 2);
    assert!(seen.0.borrow()[1].is_none());
}

#[test]
fn shared_tracker_restores_focus_after_background() {
    let mut tree = Tree::new(SCREEN);
    let window = tree.insert_window(SCREEN);
    let field = tree.insert(Some(window), LocalSurface::text_field(Rect::new(0.0, 100.0, 320.0, 140.0)));
    tree.make_key(Some(window));
    tree.commit();

    let tracker = KeyboardTracker::shared();
    tracker.activate_application();
    assert!(tree.become_first_responder(field.into()));

    tracker.handle_event(&tree, &HostEvent::DidEnterBackground);
    tree.resign_first_responder();
    tracker.handle_event(&tree, &HostEvent::WillEnterForeground);
    assert_eq!(tree.first_responder(), Some(field));

    tracker.set_should_restore_first_responder(field.into(), Some(false));
    tracker.handle_event(&tree, &HostEvent::DidEnterBackground);
    tree.resign_first_responder();
    tracker.handle_event(&tree, &HostEvent::WillEnterForeground);
    assert_eq!(tree.first_responder(), None);
}
