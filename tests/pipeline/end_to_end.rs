//! Source-to-assembly tests exercising the full preprocessor → lexer →
//! parser → analyzer → codegen → printer pipeline for a handful of
//! representative programs, grounded on spec.md §8's worked scenarios.

use vergec::{CommandLineOptions, compile};
use vergec_lexer::NoIncludes;

fn compile_default(source: &str) -> String {
    let options = CommandLineOptions::default();
    compile(source, "main.vg", &NoIncludes, &options)
        .expect("program is well-formed")
        .assembly
}

#[test]
fn identity_return_program_compiles_to_an_entry_shim() {
    let assembly = compile_default("func main(): Int { return 0; }");
    assert!(assembly.contains("section .text"));
    assert!(assembly.contains("_main:"));
    assert!(assembly.contains("ret"));
    assert!(assembly.contains("syscall"));
}

#[test]
fn if_else_lowers_to_labeled_jumps() {
    let source = "func f(a: Int): Int { if (a) { return 1; } return 0; }";
    let assembly = compile_default(source);
    assert!(assembly.contains("jmp") || assembly.contains("jz") || assembly.contains("jnz"));
}

#[test]
fn while_loop_lowers_to_a_labeled_condition_check() {
    let source = "func f(a: Int): Int { while (a) { a = a - 1; } return a; }";
    let assembly = compile_default(source);
    assert!(assembly.contains("_floralid_"));
}

#[test]
fn struct_member_access_uses_rbp_relative_or_offset_addressing() {
    let source = "struct Point { x: Int; y: Int; } \
                   func f(): Int { let p: Point = Point(1, 2); return p.x; }";
    let assembly = compile_default(source);
    assert!(assembly.contains("mov"));
}

#[test]
fn undeclared_identifier_is_rejected_before_codegen() {
    let options = CommandLineOptions::default();
    let result = compile("func main(): Int { return undeclared_name; }", "main.vg", &NoIncludes, &options);
    assert!(result.is_err());
}

#[test]
fn pointer_arithmetic_scales_by_pointee_size() {
    let source = "func f(p: &Int): &Int { return p + 1; }";
    let assembly = compile_default(source);
    assert!(assembly.to_lowercase().contains("lea"));
}
