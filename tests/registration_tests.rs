use angelscript_runtime::prelude::*;

fn build(engine: &Engine, name: &str, code: &str) -> ScriptResult<Module> {
    let module = engine.get_module(name, GetModuleFlags::AlwaysCreate)?;
    module.add_script_section(name, code, 0)?;
    module.build()?;
    Ok(module)
}

fn run(engine: &Engine, function: &Function) -> Context {
    let ctx = engine.create_context().unwrap();
    ctx.prepare(function).unwrap();
    assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
    ctx
}

struct Tally {
    total: i32,
}

fn register_tally(engine: &Engine) -> TypeInfo {
    let tally = engine.register_object_type("Tally", 0, ObjectTypeFlags::REF).unwrap();
    let ty = tally.clone();
    engine
        .register_object_behaviour("Tally", Behaviour::Factory, "Tally@ f(int start)", move |generic: &mut ScriptGeneric| {
            let start = generic.get_arg_dword(0) as i32;
            let object = ScriptObject::new_native(&ty, Tally { total: start });
            generic.set_return_object(Some(object)).unwrap();
        })
        .unwrap();
    engine
        .register_object_method("Tally", "void add(int)", |generic: &mut ScriptGeneric| {
            let amount = generic.get_arg_dword(0) as i32;
            if let Some(this) = generic.get_object().as_object() {
                this.with_native(|t: &mut Tally| t.total += amount);
            }
        })
        .unwrap();
    engine
        .register_object_method("Tally", "int get() const", |generic: &mut ScriptGeneric| {
            let total = generic
                .get_object()
                .as_object()
                .and_then(|this| this.with_native(|t: &mut Tally| t.total))
                .unwrap_or(0);
            generic.set_return_dword(total as u32).unwrap();
        })
        .unwrap();
    engine.register_object_property("Tally", "int limit").unwrap();
    tally
}

#[test]
fn host_types_are_usable_from_scripts() {
    let engine = Engine::create();
    let tally = register_tally(&engine);
    let module = build(
        &engine,
        "m",
        "Tally@ made;\n\
         int run() { Tally@ t = Tally(5); t.add(3); t.limit = 9; @made = t; return t.get() + t.limit; }",
    )
    .unwrap();
    let ctx = run(&engine, &module.get_function_by_name("run").unwrap());
    assert_eq!(ctx.get_return_dword(), 17);

    let made = module.get_global_var_value(0).unwrap();
    let object = made.as_object().unwrap();
    assert_eq!(object.get_object_type(), tally);
    assert_eq!(object.with_native(|t: &mut Tally| t.total), Some(8));
    assert_eq!(object.get_property_by_name("limit"), Some(Value::Int32(9)));
    assert_eq!(tally.get_method_count(), 2);
    assert_eq!(tally.get_factory_count(), 1);
}

#[test]
fn overloads_pick_the_cheapest_conversion() {
    let engine = Engine::create();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let int_sink = seen.clone();
    engine
        .register_global_function("void log(int)", move |generic: &mut ScriptGeneric| {
            int_sink.lock().push(format!("int {}", generic.get_arg_dword(0) as i32));
        })
        .unwrap();
    let double_sink = seen.clone();
    engine
        .register_global_function("void log(double)", move |generic: &mut ScriptGeneric| {
            double_sink.lock().push(format!("double {}", generic.get_arg_double(0)));
        })
        .unwrap();
    let module = build(&engine, "m", "void run() { log(1); log(2.5); log(int8(-3)); log(1.5f); }").unwrap();
    run(&engine, &module.get_function_by_name("run").unwrap());
    assert_eq!(*seen.lock(), vec!["int 1", "double 2.5", "int -3", "double 1.5"]);
}

#[test]
fn generic_calls_see_their_arguments() {
    let engine = Engine::create();
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let function = engine
        .register_global_function("int64 inspect(int8 a, double b, bool c)", move |generic: &mut ScriptGeneric| {
            let types: Vec<i32> = (0..generic.get_arg_count()).map(|i| generic.get_arg_type_id(i).0).collect();
            *sink.lock() = Some(types);
            let a = generic.get_arg_byte(0) as i8 as i64;
            let b = generic.get_arg_double(1) as i64;
            let c = generic.get_arg(2).map(Value::as_bool).unwrap_or(false);
            generic.set_return_qword((a * 100 + b + c as i64) as u64).unwrap();
        })
        .unwrap();
    assert_eq!(function.get_func_type(), FunctionType::System);
    let module = build(&engine, "m", "int64 run() { return inspect(-2, 7.9, true); }").unwrap();
    let ctx = run(&engine, &module.get_function_by_name("run").unwrap());
    assert_eq!(ctx.get_return_qword() as i64, -200 + 7 + 1);
    assert_eq!(
        seen.lock().clone(),
        Some(vec![PrimitiveKind::Int8.type_id(), PrimitiveKind::Double.type_id(), PrimitiveKind::Bool.type_id()])
    );
}

#[test]
fn global_properties_are_shared_with_the_host() {
    let engine = Engine::create();
    let lives = Arc::new(GlobalSlot::new(Value::Int32(3)));
    let ratio = Arc::new(GlobalSlot::new(Value::Double(0.5)));
    engine.register_global_property("int lives", lives.clone()).unwrap();
    engine.register_global_property("const double ratio", ratio.clone()).unwrap();
    let module = build(&engine, "m", "int bump() { lives += 2; return int(lives * ratio * 10); }").unwrap();
    let bump = module.get_function_by_name("bump").unwrap();
    assert_eq!(run(&engine, &bump).get_return_dword(), 25);
    assert_eq!(lives.get(), Value::Int32(5));

    lives.set(Value::Int32(0));
    ratio.set(Value::Double(2.0));
    assert_eq!(run(&engine, &bump).get_return_dword(), 40);

    let result = build(&engine, "bad", "void f() { ratio = 1; }");
    assert!(result.is_err());
}

#[test]
fn namespaces_scope_host_functions() {
    let engine = Engine::create();
    engine.set_default_namespace("math").unwrap();
    engine
        .register_global_function("float lerp(float a, float b, float t)", |generic: &mut ScriptGeneric| {
            let (a, b, t) = (generic.get_arg_float(0), generic.get_arg_float(1), generic.get_arg_float(2));
            generic.set_return_float(a + (b - a) * t).unwrap();
        })
        .unwrap();
    engine.set_default_namespace("").unwrap();
    assert_eq!(engine.get_global_function_by_index(0).unwrap().get_namespace(), "math");

    assert!(build(&engine, "unscoped", "float f() { return lerp(0, 10, 0.5f); }").is_err());
    let module = build(&engine, "m", "float f() { return math::lerp(0, 10, 0.25f); }").unwrap();
    let ctx = run(&engine, &module.get_function_by_name("f").unwrap());
    assert_eq!(ctx.get_return_float(), 2.5);
}

#[test]
fn registered_enums_typedefs_and_funcdefs() {
    let engine = Engine::create();
    engine.register_enum("Dir").unwrap();
    engine.register_enum_value("Dir", "North", 0).unwrap();
    engine.register_enum_value("Dir", "South", 2).unwrap();
    engine.register_typedef("real", "double").unwrap();
    engine.register_funcdef("bool Filter(int)").unwrap();

    let stored = Arc::new(Mutex::new(None));
    let sink = stored.clone();
    engine
        .register_global_function("void keep(Filter@ f)", move |generic: &mut ScriptGeneric| {
            *sink.lock() = generic.get_arg_function(0);
        })
        .unwrap();

    let module = build(
        &engine,
        "m",
        "bool even(int v) { return v % 2 == 0; }\n\
         real half(real v) { return v / 2; }\n\
         int dir() { return Dir::South + North; }\n\
         void setup() { keep(even); }",
    )
    .unwrap();
    assert_eq!(run(&engine, &module.get_function_by_name("dir").unwrap()).get_return_dword(), 2);

    let half = module.get_function_by_name("half").unwrap();
    let ctx = engine.create_context().unwrap();
    ctx.prepare(&half).unwrap();
    ctx.set_arg_double(0, 5.0).unwrap();
    ctx.execute().unwrap();
    assert_eq!(ctx.get_return_double(), 2.5);

    run(&engine, &module.get_function_by_name("setup").unwrap());
    let filter = stored.lock().clone().unwrap();
    assert_eq!(filter.get_name(), "even");
    ctx.prepare(&filter).unwrap();
    ctx.set_arg_dword(0, 4).unwrap();
    ctx.execute().unwrap();
    assert_eq!(ctx.get_return_byte(), 1);

    assert_eq!(engine.get_enum_count(), 1);
    assert_eq!(engine.get_typedef_count(), 1);
    assert_eq!(engine.get_funcdef_count(), 1);
    let real = engine.get_type_info_by_name("real").unwrap();
    assert_eq!(real.get_typedef_type_id(), PrimitiveKind::Double.type_id());
}

#[test]
fn registered_interfaces_are_implemented_by_scripts() {
    let engine = Engine::create();
    let handler = engine.register_interface("IHandler").unwrap();
    engine.register_interface_method("IHandler", "void handle(int)").unwrap();
    let module = build(
        &engine,
        "m",
        "class Summer : IHandler { int total; void handle(int v) { total += v; } }\n\
         IHandler@ make() { return Summer(); }",
    )
    .unwrap();

    let ctx = run(&engine, &module.get_function_by_name("make").unwrap());
    let object = ctx.get_return_object().unwrap();
    assert!(object.get_object_type().implements(&handler));

    let method = object.get_object_type().get_method_by_decl("void handle(int)", true).unwrap();
    for value in [3, 4] {
        ctx.prepare(&method).unwrap();
        ctx.set_object(Some(object.clone())).unwrap();
        ctx.set_arg_dword(0, value).unwrap();
        assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
    }
    assert_eq!(object.get_property_by_name("total"), Some(Value::Int32(7)));

    let incomplete = build(&engine, "bad", "class Lazy : IHandler {}");
    assert!(incomplete.is_err());
}

#[test]
fn config_groups_outlive_their_users() {
    let engine = Engine::create();
    engine.begin_config_group("audio").unwrap();
    engine.register_global_function("void play()", |_| {}).unwrap();
    engine.end_config_group().unwrap();

    build(&engine, "player", "void f() { play(); }").unwrap();
    assert_eq!(
        engine.remove_config_group("audio").unwrap_err().return_code(),
        ReturnCode::ConfigGroupIsInUse
    );
    engine.discard_module("player").unwrap();
    engine.remove_config_group("audio").unwrap();
    assert!(engine.get_global_function_by_decl("void play()").is_none());
    assert!(build(&engine, "again", "void f() { play(); }").is_err());
}

#[test]
fn access_masks_limit_what_modules_see() {
    let engine = Engine::create();
    let previous = engine.set_default_access_mask(0x2);
    assert_eq!(previous, 1);
    engine.register_global_function("void admin()", |_| {}).unwrap();
    engine.set_default_access_mask(previous);

    assert!(build(&engine, "user", "void f() { admin(); }").is_err());
    let module = engine.get_module("admin", GetModuleFlags::AlwaysCreate).unwrap();
    module.set_access_mask(0x3);
    module.add_script_section("admin", "void f() { admin(); }", 0).unwrap();
    module.build().unwrap();
}

#[test]
fn message_callback_reports_each_problem() {
    let engine = Engine::create();
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    engine
        .set_message_callback(move |info: &MessageInfo| sink.lock().push(info.clone()))
        .unwrap();
    let result = build(&engine, "broken", "void f()\n{\n  int x = missing;\n  undefined();\n}");
    assert!(matches!(result, Err(ScriptError::Build(_))));

    let messages = messages.lock();
    let errors: Vec<&MessageInfo> = messages.iter().filter(|m| m.msg_type == MessageType::Error).collect();
    assert!(!errors.is_empty());
    assert!(errors.iter().all(|m| m.section == "broken"));
    assert_eq!(errors[0].row, 3);
    assert!(errors[0].col > 0);

    engine.clear_message_callback().unwrap();
}

#[test]
fn custom_string_factories_supply_constants() {
    struct Upper;
    impl StringFactory for Upper {
        fn get_string_constant(&self, data: &[u8]) -> Option<ScriptString> {
            std::str::from_utf8(data).ok().map(|s| ScriptString::new(s.to_uppercase()))
        }
        fn release_string_constant(&self, _value: &ScriptString) -> ScriptResult<()> {
            Ok(())
        }
        fn get_raw_string_data(&self, value: &ScriptString) -> Vec<u8> {
            value.as_str().as_bytes().to_vec()
        }
    }

    let engine = Engine::create();
    engine.register_string_factory("string", Arc::new(Upper)).unwrap();
    let module = build(&engine, "m", "string f() { return \"shout\"; }").unwrap();
    let ctx = run(&engine, &module.get_function_by_name("f").unwrap());
    assert_eq!(ctx.get_return_value().as_string().map(ScriptString::as_str), Some("SHOUT"));
}

#[test]
fn user_data_is_keyed_by_type() {
    struct Owner(&'static str);
    impl UserData for Owner {
        const KEY: usize = 1;
    }
    struct Build(u32);
    impl UserData for Build {
        const KEY: usize = 2;
    }

    let engine = Engine::create();
    assert!(engine.set_user_data(Owner("host")).is_none());
    engine.set_user_data(Build(7));
    assert_eq!(engine.get_user_data::<Owner>().map(|o| o.0), Some("host"));
    assert_eq!(engine.get_user_data::<Build>().map(|b| b.0), Some(7));
    assert!(engine.set_user_data(Owner("other")).is_some());
    assert_eq!(engine.get_user_data::<Owner>().map(|o| o.0), Some("other"));
}
