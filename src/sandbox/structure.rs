//! Compilation of sketch source and inspection of its entry points.

use wasmparser::{ExternalKind, Operator, Parser, Payload, TypeRef};
use wasmtime::{Engine, Module};

use crate::error::{Result, SketchError};
use crate::protocol::RenderMode;

/// Entry point exported for one-time initialisation.
pub const SETUP_EXPORT: &str = "setup";
/// Entry point exported for per-frame drawing.
pub const DRAW_EXPORT: &str = "draw";

/// What a compiled sketch exports, read from the binary without running it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SketchStructure {
    pub has_setup: bool,
    pub has_draw: bool,
    /// `draw` contains at least one instruction besides `nop`/`end`.
    pub draw_has_body: bool,
    /// The module declares a wasm `start` function.
    pub has_start: bool,
}

impl SketchStructure {
    /// Read the export and code sections of `wasm`.
    pub fn inspect(wasm: &[u8]) -> Result<Self> {
        inspect_binary(wasm).map_err(SketchError::Compile)
    }

    /// Every entry-point problem for `mode`, in a stable order.
    pub fn problems(&self, mode: RenderMode) -> Vec<String> {
        let mut problems = Vec::new();
        if self.has_start {
            problems.push("sketches must not declare a start function".to_string());
        }
        if !self.has_setup {
            problems.push(format!("sketch must export a `{SETUP_EXPORT}` function"));
        }
        if mode == RenderMode::Loop {
            if !self.has_draw {
                problems.push(format!("loop mode requires a `{DRAW_EXPORT}` function"));
            } else if !self.draw_has_body {
                problems.push(format!("`{DRAW_EXPORT}` must have a non-empty body in loop mode"));
            }
        }
        problems
    }

    /// Fail with the first entry-point problem for `mode`.
    pub fn require(&self, mode: RenderMode) -> Result<()> {
        match self.problems(mode).into_iter().next() {
            Some(problem) => Err(SketchError::Validation(problem)),
            None => Ok(()),
        }
    }
}

fn inspect_binary(wasm: &[u8]) -> anyhow::Result<SketchStructure> {
    let mut structure = SketchStructure::default();
    let mut imported_funcs = 0u32;
    let mut draw_index = None;
    let mut defined_index = 0u32;

    for payload in Parser::new(0).parse_all(wasm) {
        match payload? {
            Payload::ImportSection(reader) => {
                for import in reader {
                    if matches!(import?.ty, TypeRef::Func(_)) {
                        imported_funcs += 1;
                    }
                }
            }
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export?;
                    if export.kind != ExternalKind::Func {
                        continue;
                    }
                    match export.name {
                        SETUP_EXPORT => structure.has_setup = true,
                        DRAW_EXPORT => {
                            structure.has_draw = true;
                            draw_index = Some(export.index);
                        }
                        _ => {}
                    }
                }
            }
            Payload::StartSection { .. } => structure.has_start = true,
            Payload::CodeSectionEntry(body) => {
                let function_index = imported_funcs + defined_index;
                defined_index += 1;
                if draw_index != Some(function_index) {
                    continue;
                }
                let mut reader = body.get_operators_reader()?;
                while !reader.eof() {
                    if !matches!(reader.read()?, Operator::Nop | Operator::End) {
                        structure.draw_has_body = true;
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(structure)
}

/// A compiled sketch together with its inspected structure.
#[derive(Clone)]
pub struct CompiledSketch {
    pub module: Module,
    pub structure: SketchStructure,
}

impl std::fmt::Debug for CompiledSketch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSketch")
            .field("structure", &self.structure)
            .finish_non_exhaustive()
    }
}

impl CompiledSketch {
    /// Parse WAT `source`, inspect it and compile it for `engine`.
    pub fn compile(engine: &Engine, source: &str) -> Result<Self> {
        let wasm = wat::parse_str(source)
            .map_err(|e| SketchError::Compile(anyhow::anyhow!("invalid sketch text: {e}")))?;
        let structure = SketchStructure::inspect(&wasm)?;
        let module = Module::from_binary(engine, &wasm).map_err(SketchError::Compile)?;
        Ok(Self { module, structure })
    }
}
