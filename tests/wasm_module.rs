//! Calls through a real wasmi instance
//!
//! The module under test is assembled in-process: a bump `allocate`, a
//! `release` that only counts, and a handful of exports to call into.

use mazebridge::interop::{NativeModule, Primitive, TypeDescriptor, TypeTag, Value, WasmExports, WasmModule};
use mazebridge::{Bridge, BridgeConfig, BridgeError, CallPhase};
use wasm_encoder::{
    CodeSection, ConstExpr, ExportKind, ExportSection, Function, FunctionSection, GlobalSection,
    GlobalType, Instruction, MemArg, MemorySection, MemoryType, Module, TypeSection, ValType,
};

const TYPE_I32_I32: u32 = 0;
const TYPE_I32_VOID: u32 = 1;
const TYPE_I32X2_VOID: u32 = 2;
const TYPE_I32X2_I32: u32 = 3;
const TYPE_VOID_VOID: u32 = 4;
const TYPE_VOID_I32: u32 = 5;
const TYPE_F64_F32_F64: u32 = 6;
const TYPE_F32_F32: u32 = 7;

const GLOBAL_HEAP: u32 = 0;
const GLOBAL_RELEASED: u32 = 1;

const HEAP_START: i32 = 1024;

fn memarg(offset: u64, align: u32) -> MemArg {
    MemArg {
        offset,
        align,
        memory_index: 0,
    }
}

fn mutable_i32(init: i32, globals: &mut GlobalSection) {
    globals.global(
        GlobalType {
            val_type: ValType::I32,
            mutable: true,
            shared: false,
        },
        &ConstExpr::i32_const(init),
    );
}

fn body(instructions: &[Instruction]) -> Function {
    let mut f = Function::new(vec![]);
    for instruction in instructions {
        f.instruction(instruction);
    }
    f.instruction(&Instruction::End);
    f
}

fn solver_module() -> Vec<u8> {
    let mut types = TypeSection::new();
    types.ty().function(vec![ValType::I32], vec![ValType::I32]);
    types.ty().function(vec![ValType::I32], vec![]);
    types.ty().function(vec![ValType::I32, ValType::I32], vec![]);
    types.ty().function(vec![ValType::I32, ValType::I32], vec![ValType::I32]);
    types.ty().function(vec![], vec![]);
    types.ty().function(vec![], vec![ValType::I32]);
    types.ty().function(vec![ValType::F64, ValType::F32], vec![ValType::F64]);
    types.ty().function(vec![ValType::F32], vec![ValType::F32]);

    let exported = [
        ("allocate", TYPE_I32_I32),
        ("release", TYPE_I32_VOID),
        ("identity", TYPE_I32X2_VOID),
        ("add", TYPE_I32X2_I32),
        ("trap", TYPE_VOID_VOID),
        ("released", TYPE_VOID_I32),
        ("scale", TYPE_F64_F32_F64),
        ("double", TYPE_F32_F32),
    ];

    let mut functions = FunctionSection::new();
    for (_, ty) in exported {
        functions.function(ty);
    }

    let mut memory = MemorySection::new();
    memory.memory(MemoryType {
        minimum: 1,
        maximum: Some(4),
        memory64: false,
        shared: false,
        page_size_log2: None,
    });

    let mut globals = GlobalSection::new();
    mutable_i32(HEAP_START, &mut globals);
    mutable_i32(0, &mut globals);

    let mut exports = ExportSection::new();
    exports.export("memory", ExportKind::Memory, 0);
    for (index, (name, _)) in exported.iter().enumerate() {
        exports.export(name, ExportKind::Func, index as u32);
    }

    let mut code = CodeSection::new();
    // allocate(size) -> old heap pointer
    code.function(&body(&[
        Instruction::GlobalGet(GLOBAL_HEAP),
        Instruction::GlobalGet(GLOBAL_HEAP),
        Instruction::LocalGet(0),
        Instruction::I32Add,
        Instruction::GlobalSet(GLOBAL_HEAP),
    ]));
    // release(addr)
    code.function(&body(&[
        Instruction::GlobalGet(GLOBAL_RELEASED),
        Instruction::I32Const(1),
        Instruction::I32Add,
        Instruction::GlobalSet(GLOBAL_RELEASED),
    ]));
    // identity(ret, arg): 4-byte Point copy
    code.function(&body(&[
        Instruction::LocalGet(0),
        Instruction::LocalGet(1),
        Instruction::I32Load(memarg(0, 1)),
        Instruction::I32Store(memarg(0, 1)),
    ]));
    // add(a, b)
    code.function(&body(&[
        Instruction::LocalGet(0),
        Instruction::LocalGet(1),
        Instruction::I32Add,
    ]));
    // trap()
    code.function(&body(&[Instruction::Unreachable]));
    // released() -> count
    code.function(&body(&[Instruction::GlobalGet(GLOBAL_RELEASED)]));
    // scale(a: f64, b: f32) -> a * b
    code.function(&body(&[
        Instruction::LocalGet(0),
        Instruction::LocalGet(1),
        Instruction::F64PromoteF32,
        Instruction::F64Mul,
    ]));
    // double(x: f32) -> x + x
    code.function(&body(&[
        Instruction::LocalGet(0),
        Instruction::LocalGet(0),
        Instruction::F32Add,
    ]));

    let mut module = Module::new();
    module.section(&types);
    module.section(&functions);
    module.section(&memory);
    module.section(&globals);
    module.section(&exports);
    module.section(&code);
    module.finish()
}

fn bridge() -> Bridge<WasmModule> {
    let module = WasmModule::from_bytes(&solver_module(), &WasmExports::default()).unwrap();
    let mut bridge = Bridge::new(module);
    let i16_tag = TypeTag::from(Primitive::I16);
    bridge
        .register("Point", TypeDescriptor::record([("x", i16_tag.clone()), ("y", i16_tag)]))
        .unwrap();
    bridge
}

fn released(bridge: &mut Bridge<WasmModule>) -> Value {
    bridge.invoke("released", &Primitive::I32.into(), &[], &[]).unwrap()
}

fn point_value(x: i64, y: i64) -> Value {
    Value::object([("x", Value::Int(x)), ("y", Value::Int(y))])
}

#[test]
fn instantiates_and_exposes_memory() {
    let bridge = bridge();
    assert_eq!(bridge.module().memory().len(), 65536);
    assert!(bridge.module().has_export("identity"));
    assert!(!bridge.module().has_export("solve"));
}

#[test]
fn primitive_call_returns_primitive() {
    let mut bridge = bridge();
    let i32_tag = TypeTag::from(Primitive::I32);
    let sum = bridge
        .invoke("add", &i32_tag, &[i32_tag.clone(), i32_tag.clone()], &[Value::Int(2), Value::Int(40)])
        .unwrap();
    assert_eq!(sum, Value::Int(42));
}

#[test]
fn float_arguments_and_returns_cross_the_boundary() {
    let mut bridge = bridge();
    let f32_tag = TypeTag::from(Primitive::F32);
    let f64_tag = TypeTag::from(Primitive::F64);

    let scaled = bridge
        .invoke("scale", &f64_tag, &[f64_tag.clone(), f32_tag.clone()], &[Value::Float(-2.5), Value::Float(4.0)])
        .unwrap();
    assert_eq!(scaled, Value::Float(-10.0));

    // integers are accepted for float parameters
    let doubled = bridge
        .invoke("double", &f32_tag, &[f32_tag.clone()], &[Value::Int(3)])
        .unwrap();
    assert_eq!(doubled, Value::Float(6.0));

    let doubled = bridge
        .invoke("double", &f32_tag, &[f32_tag.clone()], &[Value::Float(0.375)])
        .unwrap();
    assert_eq!(doubled, Value::Float(0.75));
}

#[test]
fn struct_round_trips_through_wasm_memory() {
    let mut bridge = bridge();
    let point = TypeTag::structure("Point");

    let result = bridge
        .invoke("identity", &point, &[point.clone()], &[point_value(-7, 300)])
        .unwrap();

    assert_eq!(result, point_value(-7, 300));
    assert_eq!(bridge.last_phase(), CallPhase::Released);
    // return buffer and argument both handed back to the module
    assert_eq!(released(&mut bridge), Value::Int(2));
}

#[test]
fn trap_is_a_native_error_and_still_releases() {
    let mut bridge = bridge();
    let point = TypeTag::structure("Point");
    bridge
        .invoke("identity", &point, &[point.clone()], &[point_value(1, 1)])
        .unwrap();

    let err = bridge.invoke("trap", &TypeTag::Void, &[], &[]).unwrap_err();
    assert!(matches!(err, BridgeError::Native { ref function, .. } if function == "trap"));
    assert_eq!(bridge.last_phase(), CallPhase::Failed);
    assert_eq!(bridge.stats().outstanding(), 0);
}

#[test]
fn wrong_arity_is_reported_by_the_module() {
    let mut bridge = bridge();
    let i32_tag = TypeTag::from(Primitive::I32);
    let err = bridge
        .invoke("add", &i32_tag, &[i32_tag.clone()], &[Value::Int(1)])
        .unwrap_err();
    assert!(matches!(err, BridgeError::Native { .. }));
}

#[test]
fn missing_allocator_export_fails_instantiation() {
    let exports = WasmExports {
        allocate: "malloc".to_string(),
        ..WasmExports::default()
    };
    assert!(WasmModule::from_bytes(&solver_module(), &exports).is_err());
}

#[test]
fn bridge_from_config_registers_structs() {
    let config = BridgeConfig::from_toml_str(
        r#"
[bridge]
max_depth = 4

[structs.Point]
fields = [ { name = "x", type = "i16" }, { name = "y", type = "i16" } ]
"#,
    )
    .unwrap();
    let module = WasmModule::from_bytes(&solver_module(), &config.exports()).unwrap();
    let mut bridge = Bridge::from_config(module, &config).unwrap();

    let point = TypeTag::structure("Point");
    let result = bridge
        .invoke("identity", &point, &[point.clone()], &[point_value(5, 6)])
        .unwrap();
    assert_eq!(result, point_value(5, 6));
}
