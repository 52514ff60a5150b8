//! The single-threaded cooperative pipeline driver: preprocessor →
//! lexer/parser → static analyzer → code generator → peephole optimizer →
//! assembly printer, run to completion one pass at a time with no pass
//! starting before its predecessor has finished.
//!
//! This is a pure function over source text rather than a method that also
//! owns file I/O — callers resolve `#include`s through an [`IncludeResolver`]
//! and write the returned assembly wherever they like; this crate never
//! touches a `Path` for reading.

use vergec_codegen::CodegenOptions;
use vergec_foundation::Diagnostic;
use vergec_lexer::{IncludeResolver, Preprocessor};

use crate::options::CommandLineOptions;
use crate::printer;

/// A successful end-to-end compilation: the rendered assembly plus
/// anything else the driver's flags asked for.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// The assembled `.nasm` text for this translation unit.
    pub assembly: String,
    /// The parsed AST serialized to a debug string, present only when
    /// [`CommandLineOptions::emit_ast_info`] is set.
    pub ast_info: Option<String>,
}

/// Runs the full pipeline over `source` (which came from `file_name`),
/// honoring `options`'s optimization level and stack-guard flag.
///
/// Each pass below returns `Err` as soon as it reports an error-severity
/// diagnostic, and the `?` operator refuses to invoke the next pass in that
/// case — a later pass never sees a tree or IR from a pass that failed.
///
/// # Errors
/// Returns the accumulated diagnostics from whichever pass first reported
/// an error-severity finding.
pub fn compile(
    source: &str,
    file_name: &str,
    resolver: &dyn IncludeResolver,
    options: &CommandLineOptions,
) -> Result<CompileOutput, Vec<Diagnostic>> {
    let preprocessed = Preprocessor::new(resolver).preprocess(source, file_name.to_string())?;

    let file = vergec_parser::parse(&preprocessed.source, &preprocessed.resolution_map)?;
    let file = vergec_analyzer::analyze(file)?;

    let ast_info = options.emit_ast_info.then(|| format!("{file:#?}"));

    let codegen_options = CodegenOptions { stack_guard: options.stack_guard };
    let mut output = vergec_codegen::generate(&file, codegen_options)?;

    vergec_peephole::optimize(&mut output, options.optimization_level);

    Ok(CompileOutput { assembly: printer::render(&output), ast_info })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vergec_lexer::NoIncludes;

    #[test]
    fn identity_return_emits_entry_shim_and_zeroed_return() {
        let options = CommandLineOptions { optimization_level: 1, ..CommandLineOptions::default() };
        let result = compile("func main(): Int { return 0; }", "main.vg", &NoIncludes, &options).unwrap();
        assert!(result.assembly.contains("_main:"));
        assert!(result.assembly.contains("syscall"));
        assert!(result.assembly.contains("xor eax, eax") || result.assembly.contains("xor rax, rax"));
    }

    #[test]
    fn arithmetic_constant_folds_at_optimization_level_one() {
        let options = CommandLineOptions { optimization_level: 1, ..CommandLineOptions::default() };
        let source = "func f(): Int { let x: Int = 1 + 2; return x; }";
        let result = compile(source, "f.vg", &NoIncludes, &options).unwrap();
        assert!(!result.assembly.contains("add"), "folded literal add must not survive to runtime");
    }

    #[test]
    fn undeclared_symbol_fails_before_codegen() {
        let options = CommandLineOptions::default();
        let result = compile("func main(): Int { return q; }", "main.vg", &NoIncludes, &options);
        assert!(result.is_err());
    }

    #[test]
    fn ast_info_is_populated_only_when_requested() {
        let options = CommandLineOptions { emit_ast_info: true, ..CommandLineOptions::default() };
        let result = compile("func main(): Int { return 0; }", "main.vg", &NoIncludes, &options).unwrap();
        assert!(result.ast_info.is_some());

        let options = CommandLineOptions::default();
        let result = compile("func main(): Int { return 0; }", "main.vg", &NoIncludes, &options).unwrap();
        assert!(result.ast_info.is_none());
    }

    #[test]
    fn level_zero_leaves_unfolded_arithmetic_in_place() {
        let options = CommandLineOptions::default();
        let source = "func f(): Int { let x: Int = 1 + 2; return x; }";
        let result = compile(source, "f.vg", &NoIncludes, &options).unwrap();
        assert!(result.assembly.contains("add"), "level 0 must not run the peephole optimizer");
    }
}
