// Collection invariants under random sequences of editor actions

#[path = "fixtures/sample_dashboards.rs"]
mod fixtures;

use dashboard_editor::{
    layout, Action, Dimension, EditorState, ElementId, ElementPatch, ElementType, ResizeHandle,
};
use fixtures::sales_tables;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Op {
    Add { element_type: usize, parent: Option<usize> },
    Delete(usize),
    Move(usize, f32, f32),
    Resize(usize, usize, f32, f32),
    Reparent(usize, Option<usize>),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..6usize, proptest::option::of(0..32usize))
            .prop_map(|(element_type, parent)| Op::Add { element_type, parent }),
        1 => (0..32usize).prop_map(Op::Delete),
        1 => (0..32usize, -200.0f32..1200.0, -200.0f32..1200.0)
            .prop_map(|(i, x, y)| Op::Move(i, x, y)),
        1 => (0..32usize, 0..8usize, -300.0f32..300.0, -300.0f32..300.0)
            .prop_map(|(i, h, dx, dy)| Op::Resize(i, h, dx, dy)),
        1 => (0..32usize, proptest::option::of(0..32usize))
            .prop_map(|(i, p)| Op::Reparent(i, p)),
    ]
}

/// Element at `index`, wrapping around the collection
fn pick(state: &EditorState, index: usize) -> Option<ElementId> {
    let elements = state.elements();
    if elements.is_empty() {
        None
    } else {
        Some(elements[index % elements.len()].id.clone())
    }
}

fn to_action(state: &EditorState, op: &Op) -> Option<Action> {
    Some(match op {
        Op::Add {
            element_type,
            parent,
        } => Action::Add {
            element_type: ElementType::ALL[*element_type],
            parent_id: parent.and_then(|p| pick(state, p)),
        },
        Op::Delete(i) => Action::Delete {
            id: pick(state, *i)?,
        },
        Op::Move(i, x, y) => Action::Move {
            id: pick(state, *i)?,
            x: *x,
            y: *y,
        },
        Op::Resize(i, h, dx, dy) => Action::Resize {
            id: pick(state, *i)?,
            handle: ResizeHandle::ALL[*h],
            dx: *dx,
            dy: *dy,
        },
        Op::Reparent(i, p) => Action::Reparent {
            id: pick(state, *i)?,
            new_parent: p.and_then(|p| pick(state, p)),
        },
    })
}

fn build(ops: &[Op]) -> EditorState {
    let mut state = EditorState::new();
    state.dispatch(Action::SetTables(sales_tables()));
    for op in ops {
        if let Some(action) = to_action(&state, op) {
            state.dispatch(action);
        }
    }
    state
}

/// Subtree of `root` collected by following `children`, independent of the store
fn subtree(state: &EditorState, root: &ElementId) -> HashSet<ElementId> {
    let mut found = HashSet::new();
    let mut pending = vec![root.clone()];
    while let Some(id) = pending.pop() {
        if !found.insert(id.clone()) {
            continue;
        }
        if let Some(element) = state.get(&id) {
            pending.extend(element.children().iter().cloned());
        }
    }
    found
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn collection_stays_valid(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let mut state = EditorState::new();
        state.dispatch(Action::SetTables(sales_tables()));

        for op in &ops {
            if let Some(action) = to_action(&state, op) {
                state.dispatch(action);
            }

            let result = state.validate();
            prop_assert!(!result.has_errors(), "{}", result.error_summary());

            for element in state.elements() {
                if let Some(parent) = &element.parent_id {
                    let parent = state.get(parent);
                    prop_assert!(parent.is_some_and(|p| p.children().contains(&element.id)));
                }
                prop_assert!(element.x >= 0.0 && element.y >= 0.0);
            }
        }
    }

    #[test]
    fn delete_removes_whole_subtree(
        ops in prop::collection::vec(op_strategy(), 1..60),
        target in 0..32usize,
    ) {
        let mut state = build(&ops);
        let Some(id) = pick(&state, target) else {
            return Ok(());
        };
        let doomed = subtree(&state, &id);
        let before = state.element_count();

        state.dispatch(Action::Delete { id });

        prop_assert_eq!(state.element_count(), before - doomed.len());
        for element in state.elements() {
            prop_assert!(!doomed.contains(&element.id));
            prop_assert!(element.children().iter().all(|c| !doomed.contains(c)));
        }
        prop_assert!(state.selected().map_or(true, |s| !doomed.contains(s)));
    }

    #[test]
    fn add_then_delete_restores_elements(
        ops in prop::collection::vec(op_strategy(), 0..40),
        element_type in 0..6usize,
        parent in proptest::option::of(0..32usize),
    ) {
        let mut state = build(&ops);
        let before = state.elements().to_vec();

        state.dispatch(Action::Add {
            element_type: ElementType::ALL[element_type],
            parent_id: parent.and_then(|p| pick(&state, p)),
        });
        if state.element_count() == before.len() {
            // Parent was not a container
            return Ok(());
        }
        let added = state.selected().cloned().unwrap();
        state.dispatch(Action::Delete { id: added });

        assert_eq!(state.elements(), before.as_slice());
    }

    #[test]
    fn left_and_top_resize_keep_opposite_edges(
        ops in prop::collection::vec(op_strategy(), 1..40),
        target in 0..32usize,
        handle in prop::sample::select(vec![
            ResizeHandle::W,
            ResizeHandle::NW,
            ResizeHandle::SW,
            ResizeHandle::N,
            ResizeHandle::NE,
        ]),
        dx in -400.0f32..400.0,
        dy in -400.0f32..400.0,
    ) {
        let mut state = build(&ops);
        let Some(id) = pick(&state, target) else {
            return Ok(());
        };
        let before = state.get(&id).cloned().unwrap();
        let min = layout::min_size(before.element_type());

        state.dispatch(Action::Resize { id: id.clone(), handle, dx, dy });
        let after = state.get(&id).unwrap();

        prop_assert!(after.x >= 0.0 && after.y >= 0.0);
        if let (Dimension::Px(w0), Dimension::Px(w1)) = (before.width, after.width) {
            if handle.moves_left_edge() && w1 > min.width {
                prop_assert_eq!(after.x + w1, before.x + w0);
            }
        }
        if let (Dimension::Px(h0), Dimension::Px(h1)) = (before.height, after.height) {
            if handle.moves_top_edge() && h1 > min.height {
                prop_assert_eq!(after.y + h1, before.y + h0);
            }
        }
    }

    #[test]
    fn empty_update_changes_nothing(
        ops in prop::collection::vec(op_strategy(), 1..40),
        target in 0..32usize,
    ) {
        let mut state = build(&ops);
        let Some(id) = pick(&state, target) else {
            return Ok(());
        };
        let before = state.elements().to_vec();
        let events = state.events().len();

        let effects = state.dispatch(Action::Update {
            id,
            patch: ElementPatch::new(),
        });

        prop_assert!(effects.is_empty());
        prop_assert_eq!(state.events().len(), events);
        assert_eq!(state.elements(), before.as_slice());
    }
}
