//! The closed capability set and the static import check.
//!
//! A sketch can only reach the host through wasm imports. The linker built
//! here defines the complete set of resolvable names; every import is checked
//! against it before instantiation, so a forbidden or unknown name is rejected
//! before any sketch code runs.

use std::fmt;

use serde::Serialize;
use wasmtime::{
    Caller, ExternType, Global, GlobalType, Linker, Module, Mutability, Store, Val, ValType,
};

use crate::error::{Result, SketchError};
use crate::sandbox::limits::StoreData;
use crate::surface::{BlendMode, Rgba, MAX_STACK_DEPTH};
use crate::vars::VAR_COUNT;

/// Import namespace for generators, protocol variables and timing.
pub const SKETCH_MODULE: &str = "sketch";
/// Import namespace for the safe numeric library.
pub const MATH_MODULE: &str = "math";
/// Import namespace for the drawing surface.
pub const DRAW_MODULE: &str = "draw";

/// Module names reserved for WASI; none of them is ever linked.
const WASI_PREFIX: &str = "wasi";

/// The kind of ambient capability a forbidden name reaches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForbiddenCategory {
    Clock,
    Timer,
    Scheduling,
    Process,
    Network,
    Storage,
    HostGlobal,
    DynamicCode,
    Entropy,
    /// Not forbidden by name, but not part of the capability set either.
    Unbound,
}

impl fmt::Display for ForbiddenCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ForbiddenCategory::Clock => "clock",
            ForbiddenCategory::Timer => "timer",
            ForbiddenCategory::Scheduling => "scheduling",
            ForbiddenCategory::Process => "process",
            ForbiddenCategory::Network => "network",
            ForbiddenCategory::Storage => "storage",
            ForbiddenCategory::HostGlobal => "host-global",
            ForbiddenCategory::DynamicCode => "dynamic-code",
            ForbiddenCategory::Entropy => "entropy",
            ForbiddenCategory::Unbound => "unbound",
        };
        f.write_str(label)
    }
}

const USE_SEEDED_RANDOM: &str = "use sketch.random, which is seeded";
const USE_FRAME_TIME: &str = "use sketch.t, sketch.time or sketch.frame_index";

/// Names that always fail, in any namespace, unless the capability set binds
/// them under its own namespace (for example `sketch.random` or `sketch.time`).
const FORBIDDEN_NAMES: &[(&str, ForbiddenCategory, Option<&str>)] = &[
    ("now", ForbiddenCategory::Clock, Some(USE_FRAME_TIME)),
    ("date", ForbiddenCategory::Clock, Some(USE_FRAME_TIME)),
    ("clock", ForbiddenCategory::Clock, Some(USE_FRAME_TIME)),
    ("time", ForbiddenCategory::Clock, Some(USE_FRAME_TIME)),
    ("performance", ForbiddenCategory::Clock, Some(USE_FRAME_TIME)),
    ("hrtime", ForbiddenCategory::Clock, Some(USE_FRAME_TIME)),
    ("clock_time_get", ForbiddenCategory::Clock, Some(USE_FRAME_TIME)),
    ("clock_res_get", ForbiddenCategory::Clock, Some(USE_FRAME_TIME)),
    ("settimeout", ForbiddenCategory::Timer, None),
    ("setinterval", ForbiddenCategory::Timer, None),
    ("cleartimeout", ForbiddenCategory::Timer, None),
    ("clearinterval", ForbiddenCategory::Timer, None),
    ("set_timeout", ForbiddenCategory::Timer, None),
    ("set_interval", ForbiddenCategory::Timer, None),
    ("sleep", ForbiddenCategory::Timer, None),
    ("requestanimationframe", ForbiddenCategory::Scheduling, None),
    ("cancelanimationframe", ForbiddenCategory::Scheduling, None),
    ("queuemicrotask", ForbiddenCategory::Scheduling, None),
    ("setimmediate", ForbiddenCategory::Scheduling, None),
    ("spawn", ForbiddenCategory::Scheduling, None),
    ("yield_now", ForbiddenCategory::Scheduling, None),
    ("sched_yield", ForbiddenCategory::Scheduling, None),
    ("poll_oneoff", ForbiddenCategory::Scheduling, None),
    ("process", ForbiddenCategory::Process, None),
    ("env", ForbiddenCategory::Process, None),
    ("getenv", ForbiddenCategory::Process, None),
    ("environ_get", ForbiddenCategory::Process, None),
    ("args_get", ForbiddenCategory::Process, None),
    ("exit", ForbiddenCategory::Process, None),
    ("proc_exit", ForbiddenCategory::Process, None),
    ("proc_raise", ForbiddenCategory::Process, None),
    ("fetch", ForbiddenCategory::Network, None),
    ("xmlhttprequest", ForbiddenCategory::Network, None),
    ("websocket", ForbiddenCategory::Network, None),
    ("eventsource", ForbiddenCategory::Network, None),
    ("socket", ForbiddenCategory::Network, None),
    ("connect", ForbiddenCategory::Network, None),
    ("sock_open", ForbiddenCategory::Network, None),
    ("sock_send", ForbiddenCategory::Network, None),
    ("sock_recv", ForbiddenCategory::Network, None),
    ("localstorage", ForbiddenCategory::Storage, None),
    ("sessionstorage", ForbiddenCategory::Storage, None),
    ("indexeddb", ForbiddenCategory::Storage, None),
    ("cookie", ForbiddenCategory::Storage, None),
    ("path_open", ForbiddenCategory::Storage, None),
    ("fd_read", ForbiddenCategory::Storage, None),
    ("fd_write", ForbiddenCategory::Storage, None),
    ("read_file", ForbiddenCategory::Storage, None),
    ("write_file", ForbiddenCategory::Storage, None),
    ("window", ForbiddenCategory::HostGlobal, None),
    ("document", ForbiddenCategory::HostGlobal, None),
    ("globalthis", ForbiddenCategory::HostGlobal, None),
    ("global", ForbiddenCategory::HostGlobal, None),
    ("self", ForbiddenCategory::HostGlobal, None),
    ("navigator", ForbiddenCategory::HostGlobal, None),
    ("location", ForbiddenCategory::HostGlobal, None),
    ("eval", ForbiddenCategory::DynamicCode, None),
    ("function", ForbiddenCategory::DynamicCode, None),
    ("import", ForbiddenCategory::DynamicCode, None),
    ("require", ForbiddenCategory::DynamicCode, None),
    ("compile", ForbiddenCategory::DynamicCode, None),
    ("instantiate", ForbiddenCategory::DynamicCode, None),
    ("webassembly", ForbiddenCategory::DynamicCode, None),
    ("random", ForbiddenCategory::Entropy, Some(USE_SEEDED_RANDOM)),
    ("crypto", ForbiddenCategory::Entropy, Some(USE_SEEDED_RANDOM)),
    ("getrandomvalues", ForbiddenCategory::Entropy, Some(USE_SEEDED_RANDOM)),
    ("randomuuid", ForbiddenCategory::Entropy, Some(USE_SEEDED_RANDOM)),
    ("random_get", ForbiddenCategory::Entropy, Some(USE_SEEDED_RANDOM)),
];

/// Look up `name` in the forbidden table (case-insensitive).
pub fn forbidden(name: &str) -> Option<(ForbiddenCategory, Option<&'static str>)> {
    let lowered = name.to_ascii_lowercase();
    FORBIDDEN_NAMES
        .iter()
        .find(|(forbidden, _, _)| *forbidden == lowered)
        .map(|&(_, category, hint)| (category, hint))
}

/// Whether `module` belongs to the WASI family.
pub fn is_wasi_module(module: &str) -> bool {
    module.to_ascii_lowercase().starts_with(WASI_PREFIX)
}

/// Parse `VARn` into `n`.
fn var_global_index(name: &str) -> Option<i64> {
    name.strip_prefix("VAR")?.parse().ok()
}

/// Check every import of `module` against the linker's definitions.
///
/// Runs before instantiation. The first offending import decides the error.
pub fn check_imports(
    linker: &Linker<StoreData>,
    store: &mut Store<StoreData>,
    module: &Module,
) -> Result<()> {
    for import in module.imports() {
        let (ns, name) = (import.module(), import.name());

        if ns == SKETCH_MODULE {
            if let Some(index) = var_global_index(name) {
                let mutable = matches!(
                    import.ty(),
                    ExternType::Global(ref g) if g.mutability() == Mutability::Var
                );
                if mutable || !(0..VAR_COUNT as i64).contains(&index) {
                    return Err(store.data().ctx.vars.reject_write(index));
                }
            }
        }

        let is_capability_ns = matches!(ns, SKETCH_MODULE | MATH_MODULE | DRAW_MODULE);
        if is_capability_ns && linker.get(&mut *store, ns, name).is_some() {
            continue;
        }

        let (category, hint) = if let Some(found) = forbidden(name) {
            found
        } else if is_wasi_module(ns) {
            (ForbiddenCategory::Process, Some("WASI is not available to sketches"))
        } else {
            (ForbiddenCategory::Unbound, None)
        };

        tracing::warn!(module = ns, name, %category, "sketch imports a name outside the capability set");
        return Err(SketchError::ForbiddenCapability {
            name: name.to_string(),
            category,
            hint,
        });
    }
    Ok(())
}

/// A linker with every host function of the capability set.
///
/// Per-execution globals are added separately by [`define_globals`].
pub fn capability_linker(engine: &wasmtime::Engine) -> Result<Linker<StoreData>> {
    let mut linker = Linker::new(engine);
    add_generator_capabilities(&mut linker).map_err(SketchError::RuntimeInit)?;
    add_protocol_capabilities(&mut linker).map_err(SketchError::RuntimeInit)?;
    add_math_capabilities(&mut linker).map_err(SketchError::RuntimeInit)?;
    add_draw_capabilities(&mut linker).map_err(SketchError::RuntimeInit)?;
    Ok(linker)
}

/// Define the immutable globals of one execution: `VAR0..VAR9`, the surface
/// size and the math constants.
pub fn define_globals(linker: &mut Linker<StoreData>, store: &mut Store<StoreData>) -> Result<()> {
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

    let vars = store.data().ctx.vars;
    let width = store.data().ctx.surface.width() as i32;
    let height = store.data().ctx.surface.height() as i32;

    let mut constants: Vec<(&str, String, Val)> = vars
        .as_slice()
        .iter()
        .enumerate()
        .map(|(i, v)| (SKETCH_MODULE, format!("VAR{i}"), Val::F64(v.to_bits())))
        .collect();
    constants.push((SKETCH_MODULE, "width".to_string(), Val::I32(width)));
    constants.push((SKETCH_MODULE, "height".to_string(), Val::I32(height)));
    constants.push((MATH_MODULE, "PI".to_string(), Val::F64(PI.to_bits())));
    constants.push((MATH_MODULE, "TWO_PI".to_string(), Val::F64(TAU.to_bits())));
    constants.push((MATH_MODULE, "HALF_PI".to_string(), Val::F64(FRAC_PI_2.to_bits())));
    constants.push((MATH_MODULE, "QUARTER_PI".to_string(), Val::F64(FRAC_PI_4.to_bits())));

    for (module, name, value) in constants {
        define_const(linker, store, module, &name, value).map_err(SketchError::RuntimeInit)?;
    }
    Ok(())
}

fn define_const(
    linker: &mut Linker<StoreData>,
    store: &mut Store<StoreData>,
    module: &str,
    name: &str,
    value: Val,
) -> anyhow::Result<()> {
    let ty = match value {
        Val::I32(_) => ValType::I32,
        _ => ValType::F64,
    };
    let global = Global::new(&mut *store, GlobalType::new(ty, Mutability::Const), value)?;
    linker.define(&*store, module, name, global)?;
    Ok(())
}

type Ctx<'a> = Caller<'a, StoreData>;

fn add_generator_capabilities(linker: &mut Linker<StoreData>) -> anyhow::Result<()> {
    linker.func_wrap(SKETCH_MODULE, "random", |mut caller: Ctx<'_>| -> f64 {
        caller.data_mut().ctx.prng.next_f64()
    })?;
    linker.func_wrap(
        SKETCH_MODULE,
        "random_range",
        |mut caller: Ctx<'_>, min: f64, max: f64| -> f64 {
            caller.data_mut().ctx.prng.range(min, max)
        },
    )?;
    linker.func_wrap(
        SKETCH_MODULE,
        "random_int",
        |mut caller: Ctx<'_>, min: i32, max: i32| -> i32 {
            caller.data_mut().ctx.prng.int_inclusive(i64::from(min), i64::from(max)) as i32
        },
    )?;
    linker.func_wrap(
        SKETCH_MODULE,
        "random_gaussian",
        |mut caller: Ctx<'_>, mean: f64, sd: f64| -> f64 {
            caller.data_mut().ctx.prng.gaussian(mean, sd)
        },
    )?;
    linker.func_wrap(SKETCH_MODULE, "random_seed", |mut caller: Ctx<'_>, seed: i32| {
        caller.data_mut().ctx.reseed_random(seed as i64);
    })?;
    linker.func_wrap(
        SKETCH_MODULE,
        "noise",
        |caller: Ctx<'_>, x: f64, y: f64, z: f64| -> f64 { caller.data().ctx.noise(x, y, z) },
    )?;
    linker.func_wrap(
        SKETCH_MODULE,
        "noise_detail",
        |mut caller: Ctx<'_>, octaves: i32, falloff: f64| {
            caller.data_mut().ctx.noise_detail =
                crate::generators::NoiseDetail::new(octaves as i64, falloff);
        },
    )?;
    linker.func_wrap(SKETCH_MODULE, "noise_seed", |mut caller: Ctx<'_>, seed: i32| {
        caller.data_mut().ctx.reseed_noise(seed as i64);
    })?;
    linker.func_wrap(
        SKETCH_MODULE,
        "fbm",
        |caller: Ctx<'_>, x: f64, y: f64, octaves: i32| -> f64 {
            let octaves = octaves.clamp(1, 8) as u32;
            caller.data().ctx.noise.layered(x, y, 0.0, octaves, 0.5)
        },
    )?;
    linker.func_wrap(
        SKETCH_MODULE,
        "ridged_noise",
        |caller: Ctx<'_>, x: f64, y: f64| -> f64 { caller.data().ctx.noise.ridged(x, y) },
    )?;
    linker.func_wrap(
        SKETCH_MODULE,
        "curl_noise",
        |caller: Ctx<'_>, x: f64, y: f64| -> (f64, f64) { caller.data().ctx.noise.curl(x, y) },
    )?;
    Ok(())
}

fn add_protocol_capabilities(linker: &mut Linker<StoreData>) -> anyhow::Result<()> {
    linker.func_wrap(
        SKETCH_MODULE,
        "var",
        |caller: Ctx<'_>, index: i32| -> anyhow::Result<f64> {
            Ok(caller.data().ctx.vars.get(index as i64)?)
        },
    )?;
    linker.func_wrap(
        SKETCH_MODULE,
        "set_var",
        |caller: Ctx<'_>, index: i32, _value: f64| -> anyhow::Result<()> {
            Err(caller.data().ctx.vars.reject_write(index as i64).into())
        },
    )?;
    linker.func_wrap(SKETCH_MODULE, "frame_index", |caller: Ctx<'_>| -> i32 {
        caller.data().ctx.time.frame_index as i32
    })?;
    linker.func_wrap(SKETCH_MODULE, "t", |caller: Ctx<'_>| -> f64 {
        caller.data().ctx.time.t
    })?;
    linker.func_wrap(SKETCH_MODULE, "time", |caller: Ctx<'_>| -> f64 {
        caller.data().ctx.time.time
    })?;
    linker.func_wrap(SKETCH_MODULE, "total_frames", |caller: Ctx<'_>| -> i32 {
        caller.data().ctx.time.total_frames as i32
    })?;
    Ok(())
}

fn add_math_capabilities(linker: &mut Linker<StoreData>) -> anyhow::Result<()> {
    let unary: [(&str, fn(f64) -> f64); 9] = [
        ("sin", f64::sin),
        ("cos", f64::cos),
        ("tan", f64::tan),
        ("asin", f64::asin),
        ("acos", f64::acos),
        ("atan", f64::atan),
        ("exp", f64::exp),
        ("ln", f64::ln),
        ("log10", f64::log10),
    ];
    for (name, op) in unary {
        linker.func_wrap(MATH_MODULE, name, move |x: f64| -> f64 { op(x) })?;
    }

    let binary: [(&str, fn(f64, f64) -> f64); 3] = [
        ("atan2", f64::atan2),
        ("pow", f64::powf),
        ("hypot", f64::hypot),
    ];
    for (name, op) in binary {
        linker.func_wrap(MATH_MODULE, name, move |a: f64, b: f64| -> f64 { op(a, b) })?;
    }

    linker.func_wrap(
        MATH_MODULE,
        "map",
        |v: f64, start1: f64, stop1: f64, start2: f64, stop2: f64| -> f64 {
            start2 + (stop2 - start2) * ((v - start1) / (stop1 - start1))
        },
    )?;
    linker.func_wrap(MATH_MODULE, "constrain", |v: f64, lo: f64, hi: f64| -> f64 {
        v.max(lo).min(hi)
    })?;
    linker.func_wrap(MATH_MODULE, "lerp", |a: f64, b: f64, t: f64| -> f64 {
        a + (b - a) * t
    })?;
    linker.func_wrap(
        MATH_MODULE,
        "dist",
        |x1: f64, y1: f64, x2: f64, y2: f64| -> f64 { (x2 - x1).hypot(y2 - y1) },
    )?;
    Ok(())
}

fn add_draw_capabilities(linker: &mut Linker<StoreData>) -> anyhow::Result<()> {
    linker.func_wrap(
        DRAW_MODULE,
        "background",
        |mut caller: Ctx<'_>, r: f64, g: f64, b: f64, a: f64| {
            caller.data_mut().ctx.surface.background(Rgba::from_channels(r, g, b, a));
        },
    )?;
    linker.func_wrap(DRAW_MODULE, "clear", |mut caller: Ctx<'_>| {
        caller.data_mut().ctx.surface.clear();
    })?;
    linker.func_wrap(
        DRAW_MODULE,
        "fill",
        |mut caller: Ctx<'_>, r: f64, g: f64, b: f64, a: f64| {
            caller.data_mut().ctx.surface.set_fill(Some(Rgba::from_channels(r, g, b, a)));
        },
    )?;
    linker.func_wrap(DRAW_MODULE, "no_fill", |mut caller: Ctx<'_>| {
        caller.data_mut().ctx.surface.set_fill(None);
    })?;
    linker.func_wrap(
        DRAW_MODULE,
        "stroke",
        |mut caller: Ctx<'_>, r: f64, g: f64, b: f64, a: f64| {
            caller.data_mut().ctx.surface.set_stroke(Some(Rgba::from_channels(r, g, b, a)));
        },
    )?;
    linker.func_wrap(DRAW_MODULE, "no_stroke", |mut caller: Ctx<'_>| {
        caller.data_mut().ctx.surface.set_stroke(None);
    })?;
    linker.func_wrap(DRAW_MODULE, "stroke_weight", |mut caller: Ctx<'_>, w: f64| {
        caller.data_mut().ctx.surface.set_stroke_weight(w);
    })?;
    linker.func_wrap(
        DRAW_MODULE,
        "blend_mode",
        |mut caller: Ctx<'_>, code: i32| -> anyhow::Result<()> {
            let mode = BlendMode::from_code(code).ok_or_else(|| {
                SketchError::Execution(format!("unknown blend mode {code}, expected 0-3"))
            })?;
            caller.data_mut().ctx.surface.set_blend_mode(mode);
            Ok(())
        },
    )?;
    linker.func_wrap(
        DRAW_MODULE,
        "rect",
        |mut caller: Ctx<'_>, x: f64, y: f64, w: f64, h: f64| {
            caller.data_mut().ctx.surface.rect(x, y, w, h);
        },
    )?;
    linker.func_wrap(
        DRAW_MODULE,
        "ellipse",
        |mut caller: Ctx<'_>, x: f64, y: f64, w: f64, h: f64| {
            caller.data_mut().ctx.surface.ellipse(x, y, w, h);
        },
    )?;
    linker.func_wrap(
        DRAW_MODULE,
        "circle",
        |mut caller: Ctx<'_>, x: f64, y: f64, d: f64| {
            caller.data_mut().ctx.surface.ellipse(x, y, d, d);
        },
    )?;
    linker.func_wrap(
        DRAW_MODULE,
        "line",
        |mut caller: Ctx<'_>, x1: f64, y1: f64, x2: f64, y2: f64| {
            caller.data_mut().ctx.surface.line(x1, y1, x2, y2);
        },
    )?;
    linker.func_wrap(DRAW_MODULE, "point", |mut caller: Ctx<'_>, x: f64, y: f64| {
        caller.data_mut().ctx.surface.point(x, y);
    })?;
    linker.func_wrap(
        DRAW_MODULE,
        "triangle",
        |mut caller: Ctx<'_>, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64| {
            caller.data_mut().ctx.surface.triangle(x1, y1, x2, y2, x3, y3);
        },
    )?;
    linker.func_wrap(DRAW_MODULE, "push", |mut caller: Ctx<'_>| -> anyhow::Result<()> {
        let surface = &mut caller.data_mut().ctx.surface;
        if surface.stack_depth() >= MAX_STACK_DEPTH {
            return Err(SketchError::Execution(format!(
                "push exceeds the maximum stack depth of {MAX_STACK_DEPTH}"
            ))
            .into());
        }
        surface.push();
        Ok(())
    })?;
    linker.func_wrap(DRAW_MODULE, "pop", |mut caller: Ctx<'_>| {
        caller.data_mut().ctx.surface.pop();
    })?;
    linker.func_wrap(DRAW_MODULE, "translate", |mut caller: Ctx<'_>, x: f64, y: f64| {
        caller.data_mut().ctx.surface.translate(x, y);
    })?;
    linker.func_wrap(DRAW_MODULE, "rotate", |mut caller: Ctx<'_>, angle: f64| {
        caller.data_mut().ctx.surface.rotate(angle);
    })?;
    linker.func_wrap(DRAW_MODULE, "scale", |mut caller: Ctx<'_>, sx: f64, sy: f64| {
        caller.data_mut().ctx.surface.scale(sx, sy);
    })?;
    linker.func_wrap(DRAW_MODULE, "reset_matrix", |mut caller: Ctx<'_>| {
        caller.data_mut().ctx.surface.reset_matrix();
    })?;
    linker.func_wrap(
        DRAW_MODULE,
        "set_pixel",
        |mut caller: Ctx<'_>, x: i32, y: i32, r: f64, g: f64, b: f64, a: f64| {
            caller
                .data_mut()
                .ctx
                .surface
                .set_pixel(x as i64, y as i64, Rgba::from_channels(r, g, b, a));
        },
    )?;
    linker.func_wrap(DRAW_MODULE, "get_pixel", |caller: Ctx<'_>, x: i32, y: i32| -> i32 {
        caller.data().ctx.surface.get_pixel(x as i64, y as i64).to_packed() as i32
    })?;
    Ok(())
}
