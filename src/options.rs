//! The command-line surface spec.md §6 describes as "interface of the
//! external driver to the core": a plain data struct this crate reads but
//! never populates from `argv` itself — argument parsing is listed as an
//! external collaborator in spec.md §1 ("OUT OF SCOPE ... command-line
//! argument parsing"), so no `clap` (or any other arg-parsing crate)
//! appears in this crate's dependencies. Whatever embeds `vergec` is
//! responsible for constructing one of these.

use std::path::PathBuf;

/// Which standard library set a translation unit links against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LibrarySet {
    /// The source language's own small standard library.
    #[default]
    Stl,
    /// The C standard library, for translation units that call into it via
    /// `extern`.
    C,
}

/// The optimization level the peephole optimizer runs at (spec.md §6:
/// "optimization level (0-3)"). Levels 1-3 are currently equivalent — this
/// crate implements one fixed-point peephole pass, not graduated tiers —
/// kept as a `u8` rather than an enum so a future tiering scheme (e.g. a
/// level that skips the window-3 rules) doesn't require a public API
/// break.
pub type OptimizationLevel = u8;

/// Driver-level knobs passed down into the compilation pipeline.
///
/// This struct has no behavior of its own; it is a plain settings record
/// the embedding driver fills in (from `argv`, a config file, or a test
/// harness) and passes to [`crate::driver::compile`].
#[derive(Debug, Clone)]
pub struct CommandLineOptions {
    /// Source, header, assembly, C source, and object input files, in the
    /// order given on the command line.
    pub inputs: Vec<PathBuf>,
    /// Destination path for the emitted assembly, if overridden.
    pub output: Option<PathBuf>,
    /// `0`-`3`; `0` disables the peephole optimizer entirely.
    pub optimization_level: OptimizationLevel,
    /// Which standard library this translation unit links against.
    pub library_set: LibrarySet,
    /// `--emit ast-info`: serialize the parsed AST alongside the assembly.
    pub emit_ast_info: bool,
    /// Echo the (preprocessed) source back to the console before compiling.
    pub echo_source: bool,
    /// Dump the static analyzer's per-expression type trace.
    pub dump_type_trace: bool,
    /// Stop after emitting assembly; do not invoke the external assembler.
    pub stop_after_assembly: bool,
    /// Open the emitted assembly in the user's editor once written.
    pub open_assembly_in_editor: bool,
    /// Print progress/diagnostic detail beyond plain error output.
    pub verbose: bool,
    /// Print the external assembler/linker invocation without running it.
    pub print_not_run: bool,
    /// Emit the XOR-canary stack-guard prologue/epilogue (spec.md §4.5).
    pub stack_guard: bool,
}

impl Default for CommandLineOptions {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            output: None,
            optimization_level: 0,
            library_set: LibrarySet::default(),
            emit_ast_info: false,
            echo_source: false,
            dump_type_trace: false,
            stop_after_assembly: false,
            open_assembly_in_editor: false,
            verbose: false,
            print_not_run: false,
            stack_guard: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_optimization_and_stack_guard() {
        let opts = CommandLineOptions::default();
        assert_eq!(opts.optimization_level, 0);
        assert!(!opts.stack_guard);
        assert_eq!(opts.library_set, LibrarySet::Stl);
    }
}
