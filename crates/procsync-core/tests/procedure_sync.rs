//! End-to-end tests for declaration/call synchronization.
//!
//! Each test builds a workspace through the public API, edits declarations
//! the way the block editor would (mutator sessions, renames, deletes) and
//! checks that every call site followed.

use std::collections::HashMap;

use proptest::prelude::*;

use procsync_core::block::{arg_input, STACK_INPUT};
use procsync_core::{read_workspace, write_workspace, BlockId, CallState, GenericBlock, ParamId, Workspace};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn number(ws: &mut Workspace, value: i64) -> BlockId {
    ws.add_generic(GenericBlock::new("math_number", true).with_field("NUM", value.to_string()))
}

/// Declares `name(params...)` and returns its block.
fn declare(ws: &mut Workspace, name: &str, has_return: bool, params: &[&str]) -> BlockId {
    let decl = ws.add_procedure(name, has_return).unwrap();
    let session = ws.open_mutator(decl).unwrap();
    for param in params {
        session.add_param(param).unwrap();
    }
    ws.commit_mutator(decl).unwrap();
    decl
}

/// Creates a caller of `decl` with a distinct number plugged into every slot.
fn call_with_args(ws: &mut Workspace, decl: BlockId) -> (BlockId, Vec<BlockId>) {
    let call = ws.create_caller(decl).unwrap();
    let arity = ws.declaration(decl).unwrap().arity();
    let args = (0..arity)
        .map(|i| {
            let arg = number(ws, i as i64 + 1);
            ws.connect_input(call, &arg_input(i), arg).unwrap();
            arg
        })
        .collect();
    (call, args)
}

/// Every caller's slots line up with the declaration, label and identity.
fn assert_aligned(ws: &Workspace, decl: BlockId) {
    let d = ws.declaration(decl).unwrap();
    for call in ws.callers(d.name()) {
        let site = ws.call(call).unwrap();
        assert_eq!(site.arg_names(), d.param_names());
        let ids: Vec<Option<ParamId>> = site.slots().iter().map(|s| s.param).collect();
        let expected: Vec<Option<ParamId>> = d.param_ids().into_iter().map(Some).collect();
        assert_eq!(ids, expected);
        assert_eq!(site.state(), CallState::Bound);
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn arguments_follow_parameters_across_rename_and_reorder() {
    let mut ws = Workspace::new();
    let decl = declare(&mut ws, "foo", true, &["a", "b"]);
    let (call, args) = call_with_args(&mut ws, decl);
    let before = ws.declaration(decl).unwrap().param_ids();

    let session = ws.open_mutator(decl).unwrap();
    session.rename_param(0, "x").unwrap();
    session.move_param(1, 0).unwrap();
    ws.commit_mutator(decl).unwrap();

    let d = ws.declaration(decl).unwrap();
    assert_eq!(d.param_names(), ["b", "x"]);
    assert_eq!(d.param_ids(), [before[1], before[0]]);
    assert_eq!(ws.input_target(call, "ARG0"), Some(args[1]));
    assert_eq!(ws.input_target(call, "ARG1"), Some(args[0]));
    assert_aligned(&ws, decl);
}

#[test]
fn removed_parameter_detaches_its_argument() {
    let mut ws = Workspace::new();
    let decl = declare(&mut ws, "foo", false, &["a", "b", "c"]);
    let (call, args) = call_with_args(&mut ws, decl);

    let session = ws.open_mutator(decl).unwrap();
    session.remove_param(1).unwrap();
    ws.commit_mutator(decl).unwrap();

    assert_eq!(ws.call(call).unwrap().arg_names(), ["a", "c"]);
    assert_eq!(ws.input_target(call, "ARG0"), Some(args[0]));
    assert_eq!(ws.input_target(call, "ARG1"), Some(args[2]));
    assert!(ws.parent_of(args[1]).is_none());
    assert!(ws.contains(args[1]));
}

#[test]
fn re_adding_a_removed_name_is_a_new_parameter() {
    let mut ws = Workspace::new();
    let decl = declare(&mut ws, "foo", false, &["a"]);
    let (call, args) = call_with_args(&mut ws, decl);
    let old = ws.declaration(decl).unwrap().param_ids()[0];

    ws.open_mutator(decl).unwrap().remove_param(0).unwrap();
    ws.commit_mutator(decl).unwrap();
    ws.open_mutator(decl).unwrap().add_param("a").unwrap();
    ws.commit_mutator(decl).unwrap();

    assert_ne!(ws.declaration(decl).unwrap().param_ids()[0], old);
    assert_eq!(ws.input_target(call, "ARG0"), None);
    assert!(ws.parent_of(args[0]).is_none());
}

#[test]
fn duplicate_parameters_raise_a_warning_and_keep_identities() {
    let mut ws = Workspace::new();
    let decl = declare(&mut ws, "foo", false, &["a", "b"]);
    ws.open_mutator(decl).unwrap().rename_param(1, "A").unwrap();
    ws.commit_mutator(decl).unwrap();

    let d = ws.declaration(decl).unwrap();
    assert!(d.has_duplicate_params());
    assert!(d.warning().is_some());
    let ids = d.param_ids();
    assert_ne!(ids[0], ids[1]);

    ws.open_mutator(decl).unwrap().rename_param(1, "b").unwrap();
    ws.commit_mutator(decl).unwrap();
    assert!(ws.declaration(decl).unwrap().warning().is_none());
}

#[test]
fn deleting_a_procedure_removes_only_its_callers() {
    let mut ws = Workspace::new();
    let foo = declare(&mut ws, "foo", false, &["a"]);
    let bar = declare(&mut ws, "bar", false, &[]);
    let (foo_call, args) = call_with_args(&mut ws, foo);
    let bar_call = ws.create_caller(bar).unwrap();
    ws.connect_input(bar, STACK_INPUT, foo_call).unwrap();

    let removed = ws.delete_procedure(foo).unwrap();

    assert!(removed.contains(&foo));
    assert!(removed.contains(&foo_call));
    assert!(removed.contains(&args[0]));
    assert!(ws.contains(bar));
    assert!(ws.contains(bar_call));
    assert_eq!(ws.input_target(bar, STACK_INPUT), None);
    assert_eq!(ws.definition("foo"), None);
    assert!(ws.callers("foo").is_empty());
}

#[test]
fn deleting_a_procedure_keeps_the_rest_of_the_stack() {
    let mut ws = Workspace::new();
    let foo = declare(&mut ws, "foo", false, &[]);
    let bar = declare(&mut ws, "bar", false, &[]);
    let foo_call = ws.create_caller(foo).unwrap();
    let bar_call = ws.create_caller(bar).unwrap();
    ws.connect_input(bar, STACK_INPUT, foo_call).unwrap();
    ws.connect_next(foo_call, bar_call).unwrap();

    ws.delete_procedure(foo).unwrap();

    assert!(!ws.contains(foo_call));
    assert!(ws.contains(bar_call));
    assert_eq!(ws.input_target(bar, STACK_INPUT), Some(bar_call));
    assert_eq!(ws.call(bar_call).unwrap().state(), CallState::Bound);
}

#[test]
fn dragged_out_argument_stays_out_during_previews() {
    let mut ws = Workspace::new();
    let decl = declare(&mut ws, "foo", true, &["a", "b"]);
    let (call, args) = call_with_args(&mut ws, decl);
    let a = ws.declaration(decl).unwrap().param_ids()[0];

    ws.open_mutator(decl).unwrap();
    ws.unplug(args[0]);
    ws.mutator_mut(decl).unwrap().rename_param(1, "c").unwrap();
    ws.apply_mutator(decl).unwrap();

    assert_eq!(ws.input_target(call, "ARG0"), None);
    assert_eq!(ws.input_target(call, "ARG1"), Some(args[1]));
    assert_eq!(ws.call(call).unwrap().cached_connection(a), None);
    ws.commit_mutator(decl).unwrap();
    assert!(ws.parent_of(args[0]).is_none());
}

#[test]
fn cached_argument_enclosing_the_call_is_dropped() {
    let mut ws = Workspace::new();
    let decl = declare(&mut ws, "foo", true, &["a", "b"]);
    let call = ws.create_caller(decl).unwrap();
    let x = ws.add_generic(GenericBlock::new("math_arithmetic", true).with_field("OP", "ADD"));
    let y = number(&mut ws, 2);
    ws.connect_input(call, "ARG0", x).unwrap();
    ws.connect_input(call, "ARG1", y).unwrap();
    let a = ws.declaration(decl).unwrap().param_ids()[0];

    let row = ws.open_mutator(decl).unwrap().remove_param(0).unwrap();
    ws.apply_mutator(decl).unwrap();
    ws.connect_input(x, "A", call).unwrap();
    ws.mutator_mut(decl).unwrap().attach_param(0, row).unwrap();
    ws.apply_mutator(decl).unwrap();

    let site = ws.call(call).unwrap();
    assert_eq!(site.state(), CallState::Bound);
    assert_eq!(site.arg_names(), ["a", "b"]);
    assert_eq!(site.cached_connection(a), None);
    assert_eq!(ws.input_target(call, "ARG0"), None);
    assert_eq!(ws.input_target(call, "ARG1"), Some(y));
    assert_eq!(ws.parent_of(call).map(|(parent, _)| parent), Some(x));
    ws.commit_mutator(decl).unwrap();
}

#[test]
fn disposed_cached_argument_is_not_restored() {
    let mut ws = Workspace::new();
    let decl = declare(&mut ws, "foo", false, &["a"]);
    let (call, args) = call_with_args(&mut ws, decl);
    let a = ws.declaration(decl).unwrap().param_ids()[0];

    let row = ws.open_mutator(decl).unwrap().remove_param(0).unwrap();
    ws.apply_mutator(decl).unwrap();
    assert_eq!(ws.call(call).unwrap().cached_connection(a), Some(args[0]));
    ws.dispose(args[0]).unwrap();
    ws.mutator_mut(decl).unwrap().attach_param(0, row).unwrap();
    ws.apply_mutator(decl).unwrap();

    assert_eq!(ws.input_target(call, "ARG0"), None);
    assert_eq!(ws.call(call).unwrap().cached_connection(a), None);
}

#[test]
fn cached_argument_used_elsewhere_is_not_restored() {
    let mut ws = Workspace::new();
    let decl = declare(&mut ws, "foo", false, &["a"]);
    let (call, args) = call_with_args(&mut ws, decl);
    let a = ws.declaration(decl).unwrap().param_ids()[0];
    let holder = ws.add_generic(GenericBlock::new("variables_set", false).with_field("VAR", "v"));

    let row = ws.open_mutator(decl).unwrap().remove_param(0).unwrap();
    ws.apply_mutator(decl).unwrap();
    ws.connect_input(holder, "VALUE", args[0]).unwrap();
    ws.mutator_mut(decl).unwrap().attach_param(0, row).unwrap();
    ws.apply_mutator(decl).unwrap();

    assert_eq!(ws.input_target(call, "ARG0"), None);
    assert_eq!(ws.input_target(holder, "VALUE"), Some(args[0]));
    assert_eq!(ws.call(call).unwrap().cached_connection(a), None);
}

#[test]
fn parameters_can_be_set_directly_with_issued_ids() {
    let mut ws = Workspace::new();
    let decl = declare(&mut ws, "foo", false, &["a"]);
    let (call, args) = call_with_args(&mut ws, decl);
    let a = ws.declaration(decl).unwrap().param_ids()[0];
    let fresh = ws.issue_param_id();
    assert_ne!(fresh, a);

    let names = vec!["z".to_string(), "a".to_string()];
    ws.set_parameters(decl, &names, &[fresh, a]).unwrap();

    assert_eq!(ws.call(call).unwrap().arg_names(), ["z", "a"]);
    assert_eq!(ws.input_target(call, "ARG1"), Some(args[0]));
    assert!(matches!(
        ws.set_parameters(decl, &names, &[a]),
        Err(procsync_core::CoreError::ArityMismatch { names: 2, ids: 1 })
    ));
}

#[test]
fn renaming_a_procedure_retargets_callers() {
    let mut ws = Workspace::new();
    let decl = declare(&mut ws, "foo", true, &["a"]);
    declare(&mut ws, "bar", true, &[]);
    let (call, _) = call_with_args(&mut ws, decl);

    let used = ws.rename_procedure(decl, "BAR").unwrap();

    assert_eq!(used, "BAR2");
    assert_eq!(ws.call(call).unwrap().target(), "BAR2");
    assert_eq!(ws.definition_of(call).unwrap(), Some(decl));
    assert!(ws.callers("foo").is_empty());
}

#[test]
fn xml_roundtrip_keeps_calls_wired() {
    let mut ws = Workspace::new();
    let decl = declare(&mut ws, "foo", true, &["a", "b"]);
    call_with_args(&mut ws, decl);
    call_with_args(&mut ws, decl);

    let text = write_workspace(&ws).unwrap();
    let mut loaded = read_workspace(&text).unwrap();
    let decl = loaded.definition("foo").unwrap();
    assert_aligned(&loaded, decl);

    // Identities issued on load drive the next edit like any other.
    let callers = loaded.callers("foo");
    let firsts: Vec<Option<BlockId>> = callers.iter().map(|&c| loaded.input_target(c, "ARG0")).collect();
    loaded.open_mutator(decl).unwrap().move_param(0, 1).unwrap();
    loaded.commit_mutator(decl).unwrap();
    for (call, first) in callers.iter().zip(firsts) {
        assert_eq!(loaded.input_target(*call, "ARG1"), first);
    }
    assert_aligned(&loaded, decl);
}

#[test]
fn signature_serializes_as_json() {
    let mut ws = Workspace::new();
    let decl = declare(&mut ws, "area", true, &["w", "h"]);
    insta::assert_json_snapshot!(ws.signature(decl).unwrap(), @r#"
    {
      "name": "area",
      "params": [
        "w",
        "h"
      ],
      "has_return": true
    }
    "#);
}

// ---------------------------------------------------------------------------
// Property tests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Edit {
    Add(usize),
    Remove(usize),
    Rename(usize, usize),
    Move(usize, usize),
}

const NAMES: &[&str] = &["a", "b", "c", "x", "y", "total"];

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0..NAMES.len()).prop_map(Edit::Add),
        (0..8usize).prop_map(Edit::Remove),
        (0..8usize, 0..NAMES.len()).prop_map(|(i, n)| Edit::Rename(i, n)),
        (0..8usize, 0..8usize).prop_map(|(from, to)| Edit::Move(from, to)),
    ]
}

proptest! {
    #[test]
    fn calls_stay_aligned_through_any_session(edits in prop::collection::vec(edit_strategy(), 1..24)) {
        let mut ws = Workspace::new();
        let decl = declare(&mut ws, "f", true, &["a", "b", "c"]);
        let (call, args) = call_with_args(&mut ws, decl);
        let initial: HashMap<ParamId, BlockId> = ws
            .declaration(decl)
            .unwrap()
            .param_ids()
            .into_iter()
            .zip(args.iter().copied())
            .collect();

        ws.open_mutator(decl).unwrap();
        for edit in edits {
            let session = ws.mutator_mut(decl).unwrap();
            let len = session.rows().len();
            match edit {
                Edit::Add(n) => {
                    session.add_param(NAMES[n]).unwrap();
                }
                Edit::Remove(i) if i < len => {
                    session.remove_param(i).unwrap();
                }
                Edit::Rename(i, n) if i < len => session.rename_param(i, NAMES[n]).unwrap(),
                Edit::Move(from, to) if from < len && to < len => session.move_param(from, to).unwrap(),
                _ => continue,
            }
            ws.apply_mutator(decl).unwrap();

            assert_aligned(&ws, decl);
            let ids = ws.declaration(decl).unwrap().param_ids();
            for (i, id) in ids.iter().enumerate() {
                let target = ws.input_target(call, &arg_input(i));
                match initial.get(id) {
                    Some(&arg) => {
                        prop_assert_eq!(target, Some(arg));
                    }
                    None => {
                        prop_assert_eq!(target, None);
                    }
                }
            }
            for (id, &arg) in &initial {
                if !ids.contains(id) {
                    prop_assert!(ws.parent_of(arg).is_none());
                }
            }
        }
        ws.commit_mutator(decl).unwrap();
        assert_aligned(&ws, decl);
        prop_assert!(!ws.declaration(decl).unwrap().is_mutator_open());
    }
}
