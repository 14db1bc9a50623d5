//! End-to-end window-management scenarios driven through the tape
//! executor, with PTY side effects simulated the way the app loop applies
//! them (windows added/removed per effect).

use std::time::{Duration, Instant};

use tuios::config::Config;
use tuios::geom::Rect;
use tuios::layout::{BspNode, DockbarPosition, Orientation, Viewport};
use tuios::tape::{parse_script, TapeCommand, TapeExecutor};
use tuios::window::Window;
use tuios::wm::{Severity, WindowManager, WmEffect};

fn manager() -> WindowManager {
    WindowManager::new(
        Config::default(),
        Viewport {
            width: 120,
            height: 40,
            dockbar: DockbarPosition::Bottom,
        },
    )
}

/// Apply effects the way the app loop does, without real PTYs.
fn apply_effects(wm: &mut WindowManager, effects: Vec<WmEffect>, written: &mut Vec<Vec<u8>>) {
    for effect in effects {
        match effect {
            WmEffect::CreateWindow { name } => {
                let bounds = wm.spawn_bounds();
                let mut window = Window::new(bounds, wm.current_workspace, 100);
                window.custom_name = name;
                wm.add_window(window);
            }
            WmEffect::CloseWindow { window } => {
                wm.remove_window(window);
            }
            WmEffect::WritePty { bytes, .. } => written.push(bytes),
            WmEffect::Quit | WmEffect::Detach => {}
        }
    }
}

fn drive(
    wm: &mut WindowManager,
    executor: &mut TapeExecutor,
    written: &mut Vec<Vec<u8>>,
    mut probe: impl FnMut(&WindowManager),
) {
    let mut now = Instant::now();
    for _ in 0..10_000 {
        if !executor.is_active() {
            break;
        }
        let effects = executor.step(wm, now);
        apply_effects(wm, effects, written);
        probe(wm);
        now += Duration::from_millis(100);
    }
    assert!(!executor.is_active(), "executor failed to finish");
}

#[test]
fn create_type_close_scenario() {
    let mut wm = manager();
    let mut executor = TapeExecutor::new();
    let mut written = Vec::new();

    let commands =
        parse_script("CreateWindow \"A\"; Type \"echo hi\\n\"; Sleep 50ms; Close \"A\"").unwrap();
    executor.start(&mut wm, commands);

    let mut saw_one_window = false;
    drive(&mut wm, &mut executor, &mut written, |wm| {
        if wm.windows.len() == 1 {
            saw_one_window = true;
        }
        assert!(wm.windows.len() <= 1, "never more than one window");
    });

    assert!(saw_one_window, "the window existed during the run");
    assert!(wm.windows.is_empty(), "zero windows at the end");
    assert!(!wm.has_active_animations(), "no animation outstanding");
    assert_eq!(written, vec![b"echo hi\n".to_vec()]);
    assert!(
        wm.log_ring
            .iter()
            .any(|entry| entry.message.contains("window closed")),
        "log records the close"
    );
}

#[test]
fn bsp_split_and_equalize_scenario() {
    let mut wm = manager();
    wm.auto_tiling = true;
    wm.animations_suppressed = true;
    let mut written = Vec::new();

    for name in ["W1", "W2", "W3"] {
        apply_effects(
            &mut wm,
            vec![WmEffect::CreateWindow {
                name: Some(name.into()),
            }],
            &mut written,
        );
    }

    let tree = &wm.workspaces.get(&1).unwrap().bsp;
    assert_eq!(tree.leaves().len(), 3, "three leaves");

    // Horizontal auto-scheme: vertical dividers throughout.
    fn all_vertical(node: &BspNode) -> bool {
        match node {
            BspNode::Leaf { .. } => true,
            BspNode::Split {
                orientation,
                left,
                right,
                ..
            } => {
                *orientation == Orientation::Vertical && all_vertical(left) && all_vertical(right)
            }
        }
    }
    assert!(all_vertical(tree.root().unwrap()));

    wm.equalize();
    fn ratios_half(node: &BspNode) -> bool {
        match node {
            BspNode::Leaf { .. } => true,
            BspNode::Split {
                ratio, left, right, ..
            } => (*ratio - 0.5).abs() < 1e-9 && ratios_half(left) && ratios_half(right),
        }
    }
    assert!(ratios_half(wm.workspaces.get(&1).unwrap().bsp.root().unwrap()));

    // Removing the middle window leaves a two-leaf split at ratio 0.5.
    let w2 = wm.window_by_name("W2").unwrap().id;
    wm.remove_window(w2);
    let tree = &wm.workspaces.get(&1).unwrap().bsp;
    assert_eq!(tree.leaves().len(), 2);
    match tree.root().unwrap() {
        BspNode::Split {
            ratio, left, right, ..
        } => {
            assert!((ratio - 0.5).abs() < 1e-9);
            assert!(matches!(**left, BspNode::Leaf { .. }));
            assert!(matches!(**right, BspNode::Leaf { .. }));
        }
        other => panic!("expected a single split, got {other:?}"),
    }
}

#[test]
fn workspace_isolation_scenario() {
    let mut wm = manager();
    wm.animations_suppressed = true;
    let mut written = Vec::new();

    apply_effects(
        &mut wm,
        vec![WmEffect::CreateWindow {
            name: Some("W1".into()),
        }],
        &mut written,
    );
    let w1 = wm.window_by_name("W1").unwrap().id;

    wm.switch_workspace(2);
    apply_effects(
        &mut wm,
        vec![WmEffect::CreateWindow {
            name: Some("W2".into()),
        }],
        &mut written,
    );
    let w2 = wm.window_by_name("W2").unwrap().id;

    assert_eq!(wm.focused_id(), Some(w2));
    // W1 is not visible from workspace 2.
    assert!(wm.visible_windows().iter().all(|w| w.id != w1));

    wm.switch_workspace(1);
    assert_eq!(wm.focused_id(), Some(w1));
    assert!(wm.visible_windows().iter().all(|w| w.id != w2));
}

#[test]
fn remote_send_keys_sequencing_scenario() {
    let mut wm = manager();
    wm.auto_tiling = true;
    let mut executor = TapeExecutor::new();
    let mut written = Vec::new();

    // Remote send-keys: two create chords, processed one key at a time.
    executor.start(
        &mut wm,
        vec![TapeCommand::SendKeys {
            keys: "ctrl+b c ctrl+b c".into(),
            literal: false,
            raw: false,
        }],
    );
    assert!(wm.processing_remote_keys);
    assert!(wm.animations_suppressed);

    let mut suppressed_throughout = true;
    drive(&mut wm, &mut executor, &mut written, |wm| {
        if wm.windows.len() < 2 && !wm.animations_suppressed {
            suppressed_throughout = false;
        }
    });

    assert_eq!(wm.windows.len(), 2, "exactly two windows created");
    assert!(suppressed_throughout, "animations stayed suppressed mid-run");
    assert!(!wm.animations_suppressed, "restored after the final key");
    assert!(!wm.processing_remote_keys);

    // The final re-tile ran: both windows tile the usable area exactly.
    let area = wm.viewport.usable();
    let total: u32 = wm
        .visible_windows()
        .iter()
        .map(|w| w.bounds.w as u32 * w.bounds.h as u32)
        .sum();
    assert_eq!(total, area.w as u32 * area.h as u32);
    for window in wm.visible_windows() {
        assert!(!window.minimized);
    }
}

#[test]
fn invalid_operations_surface_as_errors_without_state_change() {
    let mut wm = manager();
    let mut executor = TapeExecutor::new();
    let mut written = Vec::new();

    executor.start(
        &mut wm,
        vec![
            TapeCommand::FocusWindow {
                target: "ghost".into(),
            },
            TapeCommand::SetConfig {
                path: "nonsense.path".into(),
                value: "1".into(),
            },
        ],
    );
    drive(&mut wm, &mut executor, &mut written, |_| {});

    assert!(wm.windows.is_empty());
    let errors = wm
        .log_ring
        .iter()
        .filter(|e| e.severity == Severity::Error)
        .count();
    assert_eq!(errors, 2, "each bad operation logged an error");
}
