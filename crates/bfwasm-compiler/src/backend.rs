use wasm_encoder::{
    BlockType, CodeSection, EntityType, ExportKind, ExportSection, Function, FunctionSection,
    ImportSection, Instruction, MemArg, MemorySection, MemoryType, Module, TypeSection, ValType,
};

use crate::ir::Inst;
use crate::CompileOptions;

/// Bytes per wasm page; one cell per byte
pub const PAGE_SIZE: u32 = 65536;

/// Local holding the data pointer
const DP: u32 = 0;
/// Scratch local for computed addresses
const TARGET: u32 = 1;

/// Function indices of whatever the program needs to import
struct Imports {
    write: Option<u32>,
    read: Option<u32>,
    debug_terminate: Option<u32>,
}

/// Encode the IR as a module exporting `main`
pub fn create_wasm(ir: &[Inst], options: &CompileOptions) -> Vec<u8> {
    let mut module = Module::new();

    let mut types = TypeSection::new();
    types.ty().function([ValType::I32], []);
    let write_ty = types.len() - 1;
    types.ty().function([], [ValType::I32]);
    let read_ty = types.len() - 1;
    types.ty().function([ValType::I32, ValType::I32], []);
    let debug_ty = types.len() - 1;
    types.ty().function([], []);
    let main_ty = types.len() - 1;
    module.section(&types);

    let mut imports = ImportSection::new();
    let mut next_func = 0;
    let mut import = |name: &str, ty: u32| {
        imports.import(&options.namespace, name, EntityType::Function(ty));
        next_func += 1;
        next_func - 1
    };
    // A full 4 GiB tape leaves no address to reject
    let tape_len = u32::try_from(u64::from(options.tape_pages) * u64::from(PAGE_SIZE)).ok();
    let bounds_check = options.bounds_check && tape_len.is_some();
    let funcs = Imports {
        write: ir.contains(&Inst::Out).then(|| import("write", write_ty)),
        read: ir.contains(&Inst::In).then(|| import("read", read_ty)),
        debug_terminate: bounds_check.then(|| import("debug_terminate", debug_ty)),
    };
    if next_func > 0 {
        module.section(&imports);
    }
    let main_idx = next_func;

    let mut functions = FunctionSection::new();
    functions.function(main_ty);
    module.section(&functions);

    let mut memories = MemorySection::new();
    memories.memory(MemoryType {
        minimum: u64::from(options.tape_pages),
        maximum: None,
        memory64: false,
        shared: false,
        page_size_log2: None,
    });
    module.section(&memories);

    let mut exports = ExportSection::new();
    exports.export("main", ExportKind::Func, main_idx);
    module.section(&exports);

    let mut f = Function::new([(2, ValType::I32)]);
    for (idx, inst) in ir.iter().enumerate() {
        let guard = funcs
            .debug_terminate
            .zip(tape_len)
            .map(|(func, tape_len)| BoundsCheck {
                func,
                tape_len,
                position: idx as i32,
            });
        match *inst {
            Inst::Add(n) => add(&mut f, n as i32),
            Inst::Sub(n) => add(&mut f, (n as i32).wrapping_neg()),
            Inst::Right(n) => move_pointer(&mut f, n as i32, guard),
            Inst::Left(n) => move_pointer(&mut f, (n as i32).wrapping_neg(), guard),
            Inst::Out => {
                if let Some(write) = funcs.write {
                    print(&mut f, write);
                }
            }
            Inst::In => {
                if let Some(read) = funcs.read {
                    input(&mut f, read);
                }
            }
            Inst::LoopStart => loop_start(&mut f),
            Inst::LoopEnd => loop_end(&mut f),
            Inst::Zero => set_zero(&mut f),
            Inst::MulAdd { offset, factor } => mul_add(&mut f, offset, factor, guard),
        }
    }
    f.instruction(&Instruction::End);

    let mut codes = CodeSection::new();
    codes.function(&f);
    module.section(&codes);

    module.finish()
}

/// Emitted after every pointer change when bounds checking is on
#[derive(Clone, Copy)]
struct BoundsCheck {
    func: u32,
    tape_len: u32,
    position: i32,
}

impl BoundsCheck {
    /// Trap through `debug_terminate` unless `local` holds an address inside the tape
    fn emit(&self, f: &mut Function, local: u32) {
        f.instruction(&Instruction::LocalGet(local));
        f.instruction(&Instruction::I32Const(self.tape_len as i32));
        f.instruction(&Instruction::I32GeU);
        f.instruction(&Instruction::If(BlockType::Empty));
        f.instruction(&Instruction::LocalGet(local));
        f.instruction(&Instruction::I32Const(self.position));
        f.instruction(&Instruction::Call(self.func));
        f.instruction(&Instruction::Unreachable);
        f.instruction(&Instruction::End);
    }
}

fn cell_mem_arg() -> MemArg {
    MemArg {
        offset: 0,
        align: 0,
        memory_index: 0,
    }
}

fn load_cell(f: &mut Function) {
    f.instruction(&Instruction::LocalGet(DP));
    f.instruction(&Instruction::I32Load8U(cell_mem_arg()));
}

fn print(f: &mut Function, write: u32) {
    load_cell(f);
    f.instruction(&Instruction::Call(write));
}

fn input(f: &mut Function, read: u32) {
    f.instruction(&Instruction::LocalGet(DP));
    f.instruction(&Instruction::Call(read));
    f.instruction(&Instruction::I32Store8(cell_mem_arg()));
}

fn add(f: &mut Function, amount: i32) {
    f.instruction(&Instruction::LocalGet(DP));
    load_cell(f);
    f.instruction(&Instruction::I32Const(amount));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Store8(cell_mem_arg()));
}

fn set_zero(f: &mut Function) {
    f.instruction(&Instruction::LocalGet(DP));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::I32Store8(cell_mem_arg()));
}

fn move_pointer(f: &mut Function, amount: i32, guard: Option<BoundsCheck>) {
    f.instruction(&Instruction::LocalGet(DP));
    f.instruction(&Instruction::I32Const(amount));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalSet(DP));
    if let Some(guard) = guard {
        guard.emit(f, DP);
    }
}

fn mul_add(f: &mut Function, offset: i32, factor: i32, guard: Option<BoundsCheck>) {
    load_cell(f);
    f.instruction(&Instruction::If(BlockType::Empty));

    f.instruction(&Instruction::LocalGet(DP));
    f.instruction(&Instruction::I32Const(offset));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalSet(TARGET));
    if let Some(guard) = guard {
        guard.emit(f, TARGET);
    }

    // target = target + cell * factor
    f.instruction(&Instruction::LocalGet(TARGET));
    f.instruction(&Instruction::LocalGet(TARGET));
    f.instruction(&Instruction::I32Load8U(cell_mem_arg()));
    load_cell(f);
    f.instruction(&Instruction::I32Const(factor));
    f.instruction(&Instruction::I32Mul);
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Store8(cell_mem_arg()));

    f.instruction(&Instruction::End);
}

fn loop_start(f: &mut Function) {
    f.instruction(&Instruction::Block(BlockType::Empty));
    f.instruction(&Instruction::Loop(BlockType::Empty));
    load_cell(f);
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::BrIf(1));
}

fn loop_end(f: &mut Function) {
    f.instruction(&Instruction::Br(0));
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::End);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse;
    use wasmparser::{Parser, Payload, TypeRef};

    fn imported_names(bytes: &[u8]) -> Vec<(String, String)> {
        let mut names = Vec::new();
        for payload in Parser::new(0).parse_all(bytes) {
            if let Payload::ImportSection(reader) = payload.unwrap() {
                for import in reader {
                    let import = import.unwrap();
                    assert!(matches!(import.ty, TypeRef::Func(_)));
                    names.push((import.module.to_string(), import.name.to_string()));
                }
            }
        }
        names
    }

    fn exported_names(bytes: &[u8]) -> Vec<String> {
        let mut names = Vec::new();
        for payload in Parser::new(0).parse_all(bytes) {
            if let Payload::ExportSection(reader) = payload.unwrap() {
                for export in reader {
                    names.push(export.unwrap().name.to_string());
                }
            }
        }
        names
    }

    #[test]
    fn test_only_needed_imports() {
        let options = CompileOptions::default();

        let silent = create_wasm(&parse("+>-"), &options);
        assert!(imported_names(&silent).is_empty());

        let output = create_wasm(&parse("+."), &options);
        assert_eq!(
            imported_names(&output),
            vec![("env".to_string(), "write".to_string())]
        );

        let cat = create_wasm(&parse(",[.,]"), &options);
        assert_eq!(
            imported_names(&cat),
            vec![
                ("env".to_string(), "write".to_string()),
                ("env".to_string(), "read".to_string())
            ]
        );
    }

    #[test]
    fn test_bounds_check_imports_debug_hook() {
        let options = CompileOptions {
            bounds_check: true,
            namespace: "bf".to_string(),
            ..CompileOptions::default()
        };
        let bytes = create_wasm(&parse("<"), &options);
        assert_eq!(
            imported_names(&bytes),
            vec![("bf".to_string(), "debug_terminate".to_string())]
        );
    }

    #[test]
    fn test_full_address_space_needs_no_bounds_check() {
        let options = CompileOptions {
            bounds_check: true,
            tape_pages: 65536,
            ..CompileOptions::default()
        };
        let bytes = create_wasm(&parse("<+"), &options);
        assert!(imported_names(&bytes).is_empty());
        assert!(wasmparser::validate(&bytes).is_ok());
    }

    #[test]
    fn test_exports_main_and_validates() {
        let bytes = create_wasm(&parse("++[>+<-]>."), &CompileOptions::default());
        assert_eq!(exported_names(&bytes), vec!["main".to_string()]);
        assert!(wasmparser::validate(&bytes).is_ok());
    }
}
