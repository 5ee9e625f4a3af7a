use std::cell::Cell;

use typeflow::{
    infer::*,
    value::Value,
};

fn compartment() -> TypeCompartment {
    TypeCompartment::new(InferOptions::default())
}

thread_local! {
    static HANDLER_CALLS: Cell<usize> = Cell::new(0);
}

fn counting_handler(_comp: &mut TypeCompartment, _site: &TypeCallsite) -> InferResult<()> {
    HANDLER_CALLS.with(|calls| calls.set(calls.get() + 1));
    Ok(())
}

#[test]
fn int32_set_has_known_tag() {
    let mut comp = compartment();
    let set = comp.new_type_set().unwrap();
    comp.add_type(set, Type::Int32).unwrap();

    assert!(comp.has_type(set, Type::Int32));
    assert!(!comp.has_type(set, Type::String));
    assert_eq!(comp.get_known_type_tag(set, None).unwrap(), Some(ValueTag::Int32));
}

#[test]
fn subset_forwards_later_types() {
    let mut comp = compartment();
    let a = comp.new_type_set().unwrap();
    let b = comp.new_type_set().unwrap();

    comp.add_subset(a, b).unwrap();
    comp.add_type(a, Type::String).unwrap();

    assert!(comp.has_type(b, Type::String));
    assert_eq!(comp.type_set(b).types(), &[Type::String]);
}

#[test]
fn property_sets_are_stable() {
    let mut comp = compartment();
    let object = comp.get_type_object(None, "O", false, None).unwrap();
    let key = PropertyKey::from_name("x");

    let first = comp.get_property(object, &key, false).unwrap();
    comp.add_type(first, Type::Double).unwrap();
    let second = comp.get_property(object, &key, false).unwrap();

    assert_eq!(first, second);
    assert!(comp.has_type(second, Type::Double));
}

#[test]
fn sets_never_shrink() {
    let mut comp = compartment();
    let set = comp.new_type_set().unwrap();
    let types = [Type::Null, Type::Int32, Type::Double, Type::String];

    for (i, &ty) in types.iter().enumerate() {
        comp.add_type(set, ty).unwrap();
        for &seen in &types[..=i] {
            assert!(comp.has_type(set, seen));
        }
    }
}

#[test]
fn constraints_fire_once_per_type() {
    let mut comp = compartment();
    let native = comp.get_type_object(None, "native", true, None).unwrap();
    comp.set_native_handler(native, Some(counting_handler), false).unwrap();

    let callees = comp.new_type_set().unwrap();
    let site = comp.new_callsite(TypeCallsite::new(BytecodeId::new(ScriptId(0), 0), false, Vec::new())).unwrap();
    comp.add_call(callees, site).unwrap();

    HANDLER_CALLS.with(|calls| calls.set(0));
    comp.add_type(callees, Type::Object(native)).unwrap();
    comp.add_type(callees, Type::Object(native)).unwrap();
    comp.add_dynamic_type(callees, Type::Object(native)).unwrap();

    assert_eq!(HANDLER_CALLS.with(Cell::get), 1);
}

#[test]
fn unknown_absorbs_everything() {
    let mut comp = compartment();
    let set = comp.new_type_set().unwrap();
    let target = comp.new_type_set().unwrap();
    comp.add_subset(set, target).unwrap();

    comp.add_type(set, Type::Unknown).unwrap();
    comp.add_type(set, Type::Boolean).unwrap();

    let object = comp.get_type_object(None, "anything", false, None).unwrap();
    assert!(comp.has_type(set, Type::Object(object)));
    assert!(comp.type_set(set).is_unknown());
    // Nothing is propagated after the set becomes unknown
    assert_eq!(comp.type_set(target).types(), &[Type::Unknown]);
    assert_eq!(comp.get_known_type_tag(set, None).unwrap(), None);
}

#[test]
fn late_subscribers_catch_up_in_order() {
    let mut comp = compartment();
    let object = comp.get_type_object(None, "o", false, None).unwrap();
    let source = comp.new_type_set().unwrap();
    let target = comp.new_type_set().unwrap();

    comp.add_type(source, Type::Object(object)).unwrap();
    comp.add_type(source, Type::Undefined).unwrap();
    comp.add_type(source, Type::Double).unwrap();
    comp.add_subset(source, target).unwrap();

    assert_eq!(comp.type_set(target).types(), &[Type::Object(object), Type::Undefined, Type::Double]);
}

#[test]
fn prototype_properties_reach_existing_instances() {
    let mut comp = compartment();
    let base = comp.get_type_object(None, "Base", false, None).unwrap();
    let middle = comp.get_type_object(None, "Middle", false, Some(base)).unwrap();
    let leaf = comp.get_type_object(None, "Leaf", false, Some(middle)).unwrap();
    let key = PropertyKey::from_name("f");

    // The leaf reads the property before anything is stored on the base
    let leaf_types = comp.get_property(leaf, &key, false).unwrap();
    let base_own = comp.get_property(base, &key, true).unwrap();
    comp.add_type(base_own, Type::Int32).unwrap();

    assert!(comp.has_type(leaf_types, Type::Int32));
    let middle_types = comp.get_property(middle, &key, false).unwrap();
    assert!(comp.has_type(middle_types, Type::Int32));

    // Own assignments on the leaf stay on the leaf
    comp.dynamic_assign(leaf, &key, &Value::String("s".into())).unwrap();
    assert!(comp.has_type(leaf_types, Type::String));
    assert!(!comp.has_type(middle_types, Type::String));
}

#[test]
fn storing_to_instances_twice_changes_nothing() {
    let mut comp = compartment();
    let base = comp.get_type_object(None, "Base", false, None).unwrap();
    let middle = comp.get_type_object(None, "Middle", false, Some(base)).unwrap();
    let leaf = comp.get_type_object(None, "Leaf", false, Some(middle)).unwrap();
    let key = PropertyKey::from_name("g");

    let leaf_types = comp.get_property(leaf, &key, false).unwrap();
    comp.store_to_instances(base, &key).unwrap();
    comp.store_to_instances(base, &key).unwrap();

    let base_types = comp.get_property(base, &key, false).unwrap();
    comp.add_type(base_types, Type::Boolean).unwrap();
    assert!(comp.has_type(leaf_types, Type::Boolean));
}

#[test]
fn unknown_properties_are_contagious() {
    let mut comp = compartment();
    let proto = comp.get_type_object(None, "Proto", false, None).unwrap();
    let instance = comp.get_type_object(None, "Instance", false, Some(proto)).unwrap();
    let grandchild = comp.get_type_object(None, "Grandchild", false, Some(instance)).unwrap();
    let key = PropertyKey::from_name("p");

    let existing = comp.get_property(grandchild, &key, false).unwrap();
    comp.mark_unknown(proto).unwrap();

    assert!(comp.type_set(existing).is_unknown());
    for &object in &[proto, instance, grandchild] {
        assert!(comp.object(object).unknown_properties());
        let other = comp.get_property(object, &PropertyKey::from_name("other"), false).unwrap();
        assert_eq!(other, comp.universal_set());
    }

    // Marking again changes nothing
    comp.mark_unknown(instance).unwrap();
    assert!(comp.object(instance).unknown_properties());
}

#[test]
fn long_subset_chains_do_not_nest() {
    let mut comp = compartment();
    let sets: Vec<_> = (0..10_000).map(|_| comp.new_type_set().unwrap()).collect();
    for pair in sets.windows(2) {
        comp.add_subset(pair[0], pair[1]).unwrap();
    }

    comp.add_type(sets[0], Type::Int32).unwrap();

    let last = *sets.last().unwrap();
    assert!(comp.has_type(last, Type::Int32));
    assert!(comp.stats().max_solver_depth <= 2);
}

#[test]
fn frozen_type_tag_recompiles_once() {
    let mut comp = compartment();
    let set = comp.new_type_set().unwrap();
    comp.add_type(set, Type::Int32).unwrap();
    assert_eq!(comp.get_known_type_tag(set, Some(ScriptId(7))).unwrap(), Some(ValueTag::Int32));
    assert!(!comp.has_pending_recompiles());

    comp.add_type(set, Type::Double).unwrap();
    comp.add_type(set, Type::String).unwrap();

    let mut recompiled = Vec::new();
    comp.process_pending_recompiles(&mut |script: ScriptId| recompiled.push(script));
    assert_eq!(recompiled, vec![ScriptId(7)]);
}

#[test]
fn frozen_object_kind_recompiles_when_kinds_mix() {
    let mut comp = compartment();
    let f = comp.get_type_object(None, "f", true, None).unwrap();
    comp.set_function_script(f, ScriptId(1), 0).unwrap();
    let g = comp.get_type_object(None, "g", true, None).unwrap();
    comp.set_native_handler(g, None, false).unwrap();

    let set = comp.new_type_set().unwrap();
    comp.add_type(set, Type::Object(f)).unwrap();
    assert_eq!(comp.get_known_object_kind(set, Some(ScriptId(4))).unwrap(), ObjectKind::ScriptedFunction);

    comp.add_type(set, Type::Int32).unwrap();
    assert!(!comp.has_pending_recompiles());

    comp.add_type(set, Type::Object(g)).unwrap();
    assert!(comp.has_pending_recompiles());
    assert_eq!(comp.known_object_kind(set), ObjectKind::Unknown);
}

#[test]
fn empty_sets_recompile_when_filled() {
    let mut comp = compartment();
    let set = comp.new_type_set().unwrap();
    assert!(!comp.known_non_empty(set, Some(ScriptId(2))).unwrap());

    comp.add_type(set, Type::Null).unwrap();
    assert_eq!(comp.process_pending_recompiles(&mut |_: ScriptId| {}), 1);
    assert!(comp.known_non_empty(set, Some(ScriptId(2))).unwrap());
}

#[test]
fn scripted_calls_bind_arguments_and_results() {
    let mut comp = compartment();
    let f = comp.get_type_object(None, "f", true, None).unwrap();
    comp.set_function_script(f, ScriptId(1), 2).unwrap();
    let function = comp.object(f).as_function().unwrap().clone();

    let callees = comp.new_type_set().unwrap();
    let arg = comp.new_type_set().unwrap();
    comp.add_type(arg, Type::Boolean).unwrap();

    let mut site = TypeCallsite::new(BytecodeId::new(ScriptId(0), 3), false, vec![arg]);
    site.this_type = Some(Type::Null);
    let site = comp.new_callsite(site).unwrap();
    let result = comp.force_return_types(site).unwrap();
    comp.add_call(callees, site).unwrap();
    comp.add_type(callees, Type::Object(f)).unwrap();

    assert!(comp.has_type(function.arg_types(0).unwrap(), Type::Boolean));
    assert!(comp.has_type(function.arg_types(1).unwrap(), Type::Undefined));
    assert!(comp.has_type(function.this_types(), Type::Null));

    comp.add_type(function.return_types(), Type::Double).unwrap();
    assert!(comp.has_type(result, Type::Double));
}

#[test]
fn unknown_callees_make_unknown_results() {
    let mut comp = compartment();
    let callees = comp.new_type_set().unwrap();
    let site = comp.new_callsite(TypeCallsite::new(BytecodeId::new(ScriptId(0), 1), false, Vec::new())).unwrap();
    let result = comp.force_return_types(site).unwrap();
    comp.add_call(callees, site).unwrap();

    comp.add_type(callees, Type::String).unwrap();
    assert!(comp.type_set(result).is_empty());

    comp.add_type(callees, Type::Unknown).unwrap();
    assert!(comp.type_set(result).is_unknown());
}

#[test]
fn generic_natives_take_this_from_the_first_argument() {
    let mut comp = compartment();
    let native = comp.get_type_object(None, "reverse", true, None).unwrap();
    comp.set_native_handler(native, None, true).unwrap();
    let this_types = comp.object(native).as_function().unwrap().this_types();

    let callees = comp.new_type_set().unwrap();
    let arg = comp.new_type_set().unwrap();
    let init_site = comp_site(&mut comp, Vec::new());
    let array = comp.get_init_object(init_site, true).unwrap();
    comp.add_type(arg, Type::Object(array)).unwrap();

    let site = comp_site(&mut comp, vec![arg]);
    comp.add_call(callees, site).unwrap();
    comp.add_type(callees, Type::Object(native)).unwrap();

    assert!(comp.has_type(this_types, Type::Object(array)));
}

fn comp_site(comp: &mut TypeCompartment, args: Vec<TypeSetId>) -> SiteId {
    comp.new_callsite(TypeCallsite::new(BytecodeId::new(ScriptId(0), 9), false, args)).unwrap()
}

#[test]
fn init_objects_are_memoized() {
    let mut comp = compartment();
    let site = comp_site(&mut comp, Vec::new());

    let array = comp.get_init_object(site, true).unwrap();
    let object = comp.get_init_object(site, false).unwrap();
    assert_ne!(array, object);
    assert_eq!(comp.get_init_object(site, true).unwrap(), array);

    assert!(comp.is_array(array));
    assert!(comp.object(array).possible_packed_array());
    assert_eq!(comp.object_kind(array), ObjectKind::PackedArray);
    assert!(!comp.is_array(object));
}

#[test]
fn this_values_are_boxed() {
    let mut comp = compartment();
    let source = comp.new_type_set().unwrap();
    let target = comp.new_type_set().unwrap();
    comp.add_transform_this(source, target).unwrap();

    comp.add_type(source, Type::Int32).unwrap();
    comp.add_type(source, Type::Double).unwrap();
    comp.add_type(source, Type::Undefined).unwrap();

    let number = comp.make_fixed_type_object(FixedTypeObject::NewNumber).unwrap();
    let global = comp.global_object();
    assert_eq!(comp.type_set(target).types(), &[Type::Object(number), Type::Object(global)]);
}

#[test]
fn filters_drop_primitives() {
    let mut comp = compartment();
    let object = comp.get_type_object(None, "o", false, None).unwrap();
    let source = comp.new_type_set().unwrap();
    let objects_only = comp.new_type_set().unwrap();
    let defined = comp.new_type_set().unwrap();
    comp.add_filter_primitives(source, objects_only, FilterMode::AllPrimitives).unwrap();
    comp.add_filter_primitives(source, defined, FilterMode::NullVoid).unwrap();

    for &ty in &[Type::Null, Type::Int32, Type::Object(object), Type::Undefined] {
        comp.add_type(source, ty).unwrap();
    }

    assert_eq!(comp.type_set(objects_only).types(), &[Type::Object(object)]);
    assert_eq!(comp.type_set(defined).types(), &[Type::Int32, Type::Object(object)]);
}

#[test]
fn getter_reads_are_monitored() {
    let mut comp = compartment();
    let code = BytecodeId::new(ScriptId(3), 12);
    let source = comp.new_type_set().unwrap();
    let target = comp.new_type_set().unwrap();
    comp.add_monitor_read(source, code, target).unwrap();

    comp.add_type(source, Type::Int32).unwrap();
    assert!(!comp.is_monitored(code));

    let getset = comp.make_fixed_type_object(FixedTypeObject::GetSet).unwrap();
    comp.add_type(source, Type::Object(getset)).unwrap();
    assert!(comp.is_monitored(code));
    assert_eq!(comp.type_set(target).types(), &[Type::Int32]);
    assert!(comp.has_pending_recompiles());
}

#[test]
fn primitive_property_reads_use_wrapper_objects() {
    let mut comp = compartment();
    let strings = comp.new_type_set().unwrap();
    let target = comp.new_type_set().unwrap();
    comp.add_get_property(strings, None, target, PropertyKey::from_name("length")).unwrap();
    comp.add_type(strings, Type::String).unwrap();

    let wrapper = comp.make_fixed_type_object(FixedTypeObject::NewString).unwrap();
    let length = comp.get_property(wrapper, &PropertyKey::from_name("length"), false).unwrap();
    comp.add_type(length, Type::Int32).unwrap();
    assert!(comp.has_type(target, Type::Int32));
}

#[test]
fn non_functions_cannot_get_scripts() {
    let mut comp = compartment();
    let object = comp.get_type_object(None, "plain", false, None).unwrap();

    assert_eq!(
        comp.set_function_script(object, ScriptId(1), 1),
        Err(InferError::NotAFunction {name: "plain".into()}),
    );
}

#[test]
fn finish_reports_statistics() {
    let mut comp = TypeCompartment::new(InferOptions {record_timing: true, ..InferOptions::default()});
    let a = comp.new_type_set().unwrap();
    let b = comp.new_type_set().unwrap();
    comp.add_subset(a, b).unwrap();
    comp.add_type(a, Type::Int32).unwrap();
    comp.add_pending_recompile(ScriptId(1));
    comp.process_pending_recompiles(&mut |_: ScriptId| {});

    let stats = comp.finish();
    assert_eq!(stats.recompilations, 1);
    assert_eq!(stats.failures, 0);
    assert!(stats.max_solver_depth >= 1);
}

#[test]
fn deep_prototype_chains_resolve_properties() {
    let mut comp = compartment();
    let root = comp.get_type_object(None, "o0", false, None).unwrap();
    let mut leaf = root;
    for i in 1..30_000 {
        leaf = comp.get_type_object(None, &format!("o{}", i), false, Some(leaf)).unwrap();
    }
    let key = PropertyKey::from_name("x");

    let leaf_types = comp.get_property(leaf, &key, false).unwrap();
    let root_own = comp.get_property(root, &key, true).unwrap();
    comp.add_type(root_own, Type::Double).unwrap();
    assert!(comp.has_type(leaf_types, Type::Double));

    // Every ancestor got the property on the way up
    let middle = comp.object_by_name("o15000").unwrap();
    assert!(comp.object(middle).property(&key).is_some());
    let middle_types = comp.get_property(middle, &key, false).unwrap();
    assert!(comp.has_type(middle_types, Type::Double));
    assert!(comp.stats().max_solver_depth <= 2);
}

#[test]
fn existing_objects_keep_their_function_kind() {
    let mut comp = compartment();
    let plain = comp.get_type_object(None, "plain", false, None).unwrap();
    let function = comp.get_type_object(None, "f", true, None).unwrap();

    assert_eq!(comp.get_type_object(None, "plain", true, None), Err(InferError::NotAFunction {name: "plain".into()}));
    assert_eq!(comp.get_type_object(None, "f", false, None), Err(InferError::UnexpectedFunction {name: "f".into()}));
    assert_eq!(comp.get_type_object(None, "plain", false, None), Ok(plain));
    assert_eq!(comp.get_type_object(None, "f", true, None), Ok(function));
    assert_eq!(comp.get_type_object(None, "Global", true, None), Err(InferError::NotAFunction {name: "Global".into()}));

    // Builtins whose name is already taken are checked the same way
    comp.get_type_object(None, "Array", false, None).unwrap();
    assert_eq!(comp.make_fixed_type_object(FixedTypeObject::Array), Err(InferError::NotAFunction {name: "Array".into()}));
}

#[test]
fn frozen_function_kind_recompiles_when_properties_become_unknown() {
    let mut comp = compartment();
    let f = comp.get_type_object(None, "f", true, None).unwrap();
    comp.set_function_script(f, ScriptId(1), 0).unwrap();
    let set = comp.new_type_set().unwrap();
    comp.add_type(set, Type::Object(f)).unwrap();

    assert_eq!(comp.get_known_object_kind(set, Some(ScriptId(1))).unwrap(), ObjectKind::ScriptedFunction);
    assert!(!comp.has_pending_recompiles());

    comp.mark_unknown(f).unwrap();

    let mut recompiled = Vec::new();
    comp.process_pending_recompiles(&mut |script: ScriptId| recompiled.push(script));
    assert_eq!(recompiled, vec![ScriptId(1)]);
    assert_eq!(comp.known_object_kind(set), ObjectKind::Unknown);
}
