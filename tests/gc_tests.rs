use angelscript_runtime::prelude::*;

const NODES: &str = "class Node { Node@ next; int tag; }\n\
                     class Leaf { int value; }\n\
                     void ring(int n)\n\
                     {\n\
                       Node first;\n\
                       Node@ last = first;\n\
                       for (int i = 1; i < n; i++) { Node next; next.tag = i; @last.next = next; @last = next; }\n\
                       @last.next = first;\n\
                     }\n\
                     void leaves() { Leaf a; Leaf b; a.value = b.value; }";

fn engine_with_nodes() -> (Engine, Module) {
    let engine = Engine::create();
    engine.set_engine_property(EngineProperty::AutoGarbageCollect, 0).unwrap();
    let module = engine.get_module("gc", GetModuleFlags::AlwaysCreate).unwrap();
    module.add_script_section("gc", NODES, 0).unwrap();
    module.build().unwrap();
    (engine, module)
}

fn run_ring(engine: &Engine, module: &Module, n: u32) {
    let ctx = engine.create_context().unwrap();
    ctx.prepare(&module.get_function_by_name("ring").unwrap()).unwrap();
    ctx.set_arg_dword(0, n).unwrap();
    assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
}

#[test]
fn only_types_that_can_cycle_are_tracked() {
    let (engine, module) = engine_with_nodes();
    assert!(module.get_type_info_by_name("Node").unwrap().is_garbage_collected());
    assert!(!module.get_type_info_by_name("Leaf").unwrap().is_garbage_collected());

    let ctx = engine.create_context().unwrap();
    ctx.prepare(&module.get_function_by_name("leaves").unwrap()).unwrap();
    ctx.execute().unwrap();
    assert_eq!(engine.get_gc_statistics().current_size, 0);
}

#[test]
fn script_cycles_are_detected_and_broken() {
    let (engine, module) = engine_with_nodes();
    run_ring(&engine, &module, 4);
    assert_eq!(engine.get_gc_statistics().current_size, 4);

    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = reported.clone();
    engine
        .set_circular_ref_detected_callback(move |ty: &TypeInfo, object: &ScriptObject| {
            let tag = object.get_property_by_name("tag").map(|v| v.as_i64()).unwrap_or(-1);
            sink.lock().push((ty.get_name().to_string(), tag));
        })
        .unwrap();

    assert_eq!(engine.garbage_collect(GCFlags::FULL_CYCLE, 1), 0);
    let stats = engine.get_gc_statistics();
    assert_eq!(stats.current_size, 0);
    assert_eq!(stats.total_detected, 4);

    let mut reported = reported.lock().clone();
    reported.sort_by_key(|(_, tag)| *tag);
    let tags: Vec<i64> = reported.iter().map(|(_, tag)| *tag).collect();
    assert_eq!(tags, vec![0, 1, 2, 3]);
    assert!(reported.iter().all(|(name, _)| name == "Node"));
}

#[test]
fn reachable_objects_survive_collection() {
    let (engine, module) = engine_with_nodes();
    let node_type = module.get_type_info_by_name("Node").unwrap();
    let a = engine.create_script_object(&node_type).unwrap();
    let b = engine.create_script_object(&node_type).unwrap();
    a.set_property_by_name("next", Value::Object(Some(b.clone()))).unwrap();
    b.set_property_by_name("next", Value::Object(Some(a.clone()))).unwrap();
    let weak = b.get_weak_ref_flag();
    drop(b);

    // `a` is still held by the host, so the cycle is live
    engine.garbage_collect(GCFlags::FULL_CYCLE, 1);
    assert_eq!(engine.get_gc_statistics().current_size, 2);
    assert!(!weak.get());

    drop(a);
    engine.garbage_collect(GCFlags::FULL_CYCLE, 1);
    assert_eq!(engine.get_gc_statistics().current_size, 0);
    assert!(weak.get());
}

#[test]
fn tracked_objects_can_be_listed() {
    let (engine, module) = engine_with_nodes();
    let node_type = module.get_type_info_by_name("Node").unwrap();
    let held = engine.create_script_object(&node_type).unwrap();
    let (_, object, ty) = engine.get_object_in_gc(0).unwrap();
    assert!(object.ptr_eq(&held));
    assert_eq!(ty, node_type);
    assert!(engine.get_object_in_gc(1).is_none());
}

#[test]
fn automatic_collection_follows_execution() {
    let (engine, module) = engine_with_nodes();
    engine.set_engine_property(EngineProperty::AutoGarbageCollect, 1).unwrap();
    for _ in 0..200 {
        run_ring(&engine, &module, 3);
    }
    let stats = engine.get_gc_statistics();
    assert!(stats.total_detected > 0);
    assert!(stats.current_size < 600);
}

#[test]
fn weak_flags_outlive_their_objects() {
    let engine = Engine::create();
    let module = engine.get_module("w", GetModuleFlags::AlwaysCreate).unwrap();
    module.add_script_section("w", "class Thing { int id; }", 0).unwrap();
    module.build().unwrap();
    let ty = module.get_type_info_by_name("Thing").unwrap();

    let thing = engine.create_script_object(&ty).unwrap();
    let flag = engine.get_weak_ref_flag_of_script_object(&thing, &ty).unwrap();
    assert!(flag.ptr_eq(&thing.get_weak_ref_flag()));
    {
        let guard = flag.lock_guard();
        assert!(!guard.get());
    }
    drop(thing);
    assert!(flag.get());
}
