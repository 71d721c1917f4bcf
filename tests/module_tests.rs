use angelscript_runtime::prelude::*;

fn module(engine: &Engine, name: &str, sections: &[(&str, &str)]) -> Module {
    let module = engine.get_module(name, GetModuleFlags::AlwaysCreate).unwrap();
    for (section, code) in sections {
        module.add_script_section(section, code, 0).unwrap();
    }
    module.build().unwrap();
    module
}

fn call_int(engine: &Engine, function: &Function) -> i32 {
    let ctx = engine.create_context().unwrap();
    ctx.prepare(function).unwrap();
    assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
    ctx.get_return_dword() as i32
}

#[test]
fn sections_compile_together() {
    let engine = Engine::create();
    let module = module(
        &engine,
        "multi",
        &[
            ("a.as", "int a() { return b() + shared; }"),
            ("b.as", "int b() { return 40; }\nint shared = 2;"),
        ],
    );
    assert_eq!(module.get_function_count(), 2);
    assert_eq!(call_int(&engine, &module.get_function_by_name("a").unwrap()), 42);
    let b = module.get_function_by_name("b").unwrap();
    assert_eq!(b.get_script_section_name(), Some("b.as"));
    assert_eq!(b.get_module_name(), Some("multi"));
}

#[test]
fn globals_reset_to_their_initialisers() {
    let engine = Engine::create();
    let module = module(
        &engine,
        "state",
        &[("state", "int counter = 10;\nint next() { return ++counter; }")],
    );
    let next = module.get_function_by_name("next").unwrap();
    assert_eq!(call_int(&engine, &next), 11);
    assert_eq!(call_int(&engine, &next), 12);
    let index = module.get_global_var_index_by_name("counter").unwrap();
    assert_eq!(module.get_global_var_value(index), Some(Value::Int32(12)));

    module.reset_global_vars(None).unwrap();
    assert_eq!(call_int(&engine, &next), 11);

    let info = module.get_global_var(index).unwrap();
    assert_eq!(info.name, "counter");
    assert_eq!(info.type_id, PrimitiveKind::Int32.type_id());
    assert!(!info.is_const);
}

#[test]
fn imports_resolve_across_modules() {
    let engine = Engine::create();
    module(&engine, "lib", &[("lib", "int triple(int v) { return v * 3; }")]);
    let app = module(
        &engine,
        "app",
        &[("app", "import int triple(int) from \"lib\";\nint run() { return triple(5); }")],
    );
    let run = app.get_function_by_name("run").unwrap();

    let ctx = engine.create_context().unwrap();
    ctx.prepare(&run).unwrap();
    assert_eq!(ctx.execute().unwrap(), ContextState::Exception);
    assert!(ctx.get_exception_string().is_some());

    app.bind_all_imported_functions().unwrap();
    assert_eq!(call_int(&engine, &run), 15);

    app.unbind_imported_function(0).unwrap();
    ctx.prepare(&run).unwrap();
    assert_eq!(ctx.execute().unwrap(), ContextState::Exception);

    let replacement = module(&engine, "alt", &[("alt", "int triple(int v) { return v; }")]);
    app.bind_imported_function(0, &replacement.get_function_by_name("triple").unwrap())
        .unwrap();
    assert_eq!(call_int(&engine, &run), 5);

    let wrong = replacement
        .compile_function("w", "float triple(float v) { return v; }", 0, CompileFlags::empty())
        .unwrap();
    assert_eq!(
        app.bind_imported_function(0, &wrong).unwrap_err().return_code(),
        ReturnCode::InvalidInterface
    );
}

#[test]
fn unresolved_imports_fail_to_bind() {
    let engine = Engine::create();
    let app = module(
        &engine,
        "app",
        &[("app", "import void missing() from \"nowhere\";\nvoid run() { missing(); }")],
    );
    assert_eq!(
        app.bind_all_imported_functions().unwrap_err().return_code(),
        ReturnCode::CantBindAllFunctions
    );
}

#[test]
fn byte_code_reloads_into_another_engine() {
    let source_engine = Engine::create();
    let source = module(
        &source_engine,
        "src",
        &[
            ("math", "int square(int v) { return v * v; }"),
            ("main", "int run() { return square(7) + offset; }\nint offset = 1;"),
        ],
    );
    let mut stream = MemoryStream::new();
    source.save_byte_code(&mut stream, true).unwrap();
    let bytes = stream.into_bytes();
    assert_eq!(&bytes[..4], b"ASRB");

    let engine = Engine::create();
    let loaded = engine.get_module("loaded", GetModuleFlags::AlwaysCreate).unwrap();
    let stripped = loaded.load_byte_code(&mut MemoryStream::from_bytes(bytes.clone())).unwrap();
    assert!(stripped);
    assert_eq!(call_int(&engine, &loaded.get_function_by_name("run").unwrap()), 50);

    let mut truncated = MemoryStream::from_bytes(bytes[..bytes.len() - 3].to_vec());
    let other = engine.get_module("other", GetModuleFlags::AlwaysCreate).unwrap();
    assert!(other.load_byte_code(&mut truncated).is_err());
    assert_eq!(other.get_function_count(), 0);
}

#[test]
fn unbuilt_modules_cannot_be_saved() {
    let engine = Engine::create();
    let module = engine.get_module("empty", GetModuleFlags::AlwaysCreate).unwrap();
    module.add_script_section("empty", "void f() {}", 0).unwrap();
    assert!(module.save_byte_code(&mut MemoryStream::new(), false).is_err());
}

#[test]
fn functions_and_globals_can_be_removed() {
    let engine = Engine::create();
    let module = module(
        &engine,
        "rm",
        &[("rm", "int value = 3;\nint get() { return value; }\nint keep() { return get(); }")],
    );
    let get = module.get_function_by_name("get").unwrap();
    module.remove_function(&get).unwrap();
    assert!(module.get_function_by_name("get").is_none());
    assert_eq!(module.remove_function(&get).unwrap_err().return_code(), ReturnCode::NoFunction);
    // code compiled against the function keeps working
    assert_eq!(call_int(&engine, &module.get_function_by_name("keep").unwrap()), 3);

    module.remove_global_var(0).unwrap();
    assert_eq!(module.get_global_var_count(), 0);
    assert_eq!(call_int(&engine, &module.get_function_by_name("keep").unwrap()), 3);
}

#[test]
fn discarded_modules_leave_the_engine() {
    let engine = Engine::create();
    let first = module(&engine, "one", &[("one", "int f() { return 1; }")]);
    module(&engine, "two", &[("two", "int f() { return 2; }")]);
    assert_eq!(engine.get_module_count(), 2);
    let names: Vec<String> = (0..2).filter_map(|i| engine.get_module_by_index(i)).map(|m| m.get_name()).collect();
    assert_eq!(names, vec!["one", "two"]);

    let f = first.get_function_by_name("f").unwrap();
    engine.discard_module("one").unwrap();
    assert_eq!(engine.get_module_count(), 1);
    assert!(engine.get_module("one", GetModuleFlags::OnlyIfExists).is_err());
    let ctx = engine.create_context().unwrap();
    assert_eq!(ctx.prepare(&f).unwrap_err().return_code(), ReturnCode::NoFunction);
    assert_eq!(engine.discard_module("one").unwrap_err().return_code(), ReturnCode::NoModule);
}

#[test]
fn rebuilding_replaces_the_contents() {
    let engine = Engine::create();
    let module = module(&engine, "re", &[("re", "int f() { return 1; }")]);
    let old = module.get_function_by_name("f").unwrap();
    module.add_script_section("re", "int f() { return 2; }\nint g() { return 3; }", 0).unwrap();
    module.build().unwrap();
    assert_eq!(module.get_function_count(), 2);
    assert_eq!(call_int(&engine, &module.get_function_by_name("f").unwrap()), 2);
    assert!(!old.ptr_eq(&module.get_function_by_name("f").unwrap()));
}

#[test]
fn compiled_functions_see_module_globals() {
    let engine = Engine::create();
    let module = module(&engine, "cf", &[("cf", "int base = 4;\nint helper(int v) { return v + 1; }")]);
    let f = module
        .compile_function("adhoc", "int adhoc() { return helper(base) * 2; }", 0, CompileFlags::empty())
        .unwrap();
    assert_eq!(call_int(&engine, &f), 10);
    assert!(module.get_function_by_name("adhoc").is_none());

    let two = module.compile_function("adhoc", "int a() { return 1; }\nint b() { return 2; }", 0, CompileFlags::empty());
    assert!(two.is_err());

    module.compile_global_var("gv", "double scale = base * 0.5;", 0).unwrap();
    let index = module.get_global_var_index_by_name("scale").unwrap();
    assert_eq!(module.get_global_var_value(index), Some(Value::Double(2.0)));
}

#[test]
fn module_level_namespace_selects_lookups() {
    let engine = Engine::create();
    let module = module(
        &engine,
        "ns",
        &[("ns", "namespace a { int f() { return 1; } }\nnamespace b { int f() { return 2; } }")],
    );
    assert!(module.get_function_by_decl("int f()").is_none());
    module.set_default_namespace("b").unwrap();
    assert_eq!(call_int(&engine, &module.get_function_by_decl("int f()").unwrap()), 2);
    assert_eq!(module.get_default_namespace(), "b");
    assert_eq!(call_int(&engine, &module.get_function_by_name("a::f").unwrap()), 1);
}
