//! Process-wide configuration, read from the environment once and then
//! treated as immutable for the lifetime of the process.

use std::env;

const TRUTHY: [&str; 5] = ["1", "true", "TRUE", "yes", "YES"];

fn is_truthy(var: &str) -> bool {
    env::var(var).map(|v| TRUTHY.contains(&v.as_str())).unwrap_or(false)
}

/// Read-only, process-wide state built once before `start()` and threaded by
/// reference into every block's `initialize`.
///
/// This crate makes no acceleration-library selection itself (SIMD/FFT
/// kernel choice is an external collaborator), so the `disable_*` flags are
/// surfaced for host code and block implementations to consult, not acted
/// upon internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeContext {
    pub debug: bool,
    pub disable_liquid: bool,
    pub disable_volk: bool,
    pub disable_fftw3f: bool,
    /// Default stream buffer capacity in elements, rounded to a power of two
    /// by the stream buffer itself. A scheduler-wide default; per-edge
    /// tunability is out of scope for this version.
    pub buffer_capacity: usize,
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self {
            debug: false,
            disable_liquid: false,
            disable_volk: false,
            disable_fftw3f: false,
            buffer_capacity: 16 * 1024,
        }
    }
}

impl RuntimeContext {
    /// Build a `RuntimeContext` from the process environment.
    pub fn from_env() -> Self {
        let ctx = Self {
            debug: is_truthy("DEBUG"),
            disable_liquid: is_truthy("DISABLE_LIQUID"),
            disable_volk: is_truthy("DISABLE_VOLK"),
            disable_fftw3f: is_truthy("DISABLE_FFTW3F"),
            ..Self::default()
        };
        if ctx.debug {
            log::debug!("runtime context initialized: {ctx:?}");
        }
        ctx
    }
}
