//! Static analysis: name resolution, typing, const-correctness, and
//! static-evaluability for a parsed translation unit.
//!
//! Grounded on `original_source/floral/src/SPA.cpp`'s single-pass "static
//! program analyzer", split here into a symbol-collection pass, a global-
//! initializer typing pass, and a per-function body-typing pass, so that
//! forward references and mutual recursion between functions resolve
//! regardless of declaration order.
//!
//! This crate provides:
//! - [`analyze`] - runs the full pass over a parsed [`File`]
//! - [`layout`] - struct member offsets
//! - [`mangle`] - function name mangling
//! - [`operator`] - the closed operator overload table
//! - [`scope`] - the lexical scope stack
//! - [`symbols`] - function/global symbol tables

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod layout;
pub mod mangle;
pub mod operator;
pub mod scope;
pub mod symbols;

use std::cell::RefCell;
use std::rc::Rc;

use vergec_foundation::{suggest, Diagnostic, DiagnosticContext, DiagnosticKind, Span};
use vergec_lexer::TokenKind;
use vergec_parser::{
    Declaration, Expression, ExpressionKind, File, FunctionAttributes, Initializer, IntWidth,
    Literal, Statement, Type, TypeShape,
};

use layout::LayoutTable;
use scope::ScopeStack;
use symbols::SymbolTables;

/// Runs full static analysis over `file`: collects every top-level symbol
/// (so forward references and mutual recursion resolve), types every
/// expression's [`vergec_parser::Expression::ty`]/`static_eval` slot, checks
/// const-correctness and return types, and appends a synthetic `return` to
/// any `Void` function whose body does not visibly end in one.
///
/// # Errors
/// Returns the accumulated diagnostics if any error-severity finding was
/// reported; warnings alone do not fail analysis.
pub fn analyze(file: File) -> vergec_foundation::Result<File> {
    Analyzer::new().run(file)
}

struct Analyzer {
    tables: SymbolTables,
    layouts: LayoutTable,
    diagnostics: Vec<Diagnostic>,
}

impl Analyzer {
    fn new() -> Self {
        Self {
            tables: SymbolTables::new(),
            layouts: LayoutTable::new(),
            diagnostics: Vec::new(),
        }
    }

    fn run(mut self, mut file: File) -> vergec_foundation::Result<File> {
        self.collect_declarations(&file.declarations);
        self.check_entry_point(&file);
        self.type_globals(&mut file.declarations);
        self.analyze_bodies(&mut file.declarations);
        if self.diagnostics.iter().any(|d| !d.is_warning()) {
            Err(self.diagnostics)
        } else {
            Ok(file)
        }
    }

    // -- collection --

    fn collect_declarations(&mut self, decls: &[Declaration]) {
        for decl in decls {
            self.collect_declaration(decl);
        }
    }

    fn collect_declaration(&mut self, decl: &Declaration) {
        match decl {
            Declaration::Function { name, params, return_type, span, .. } => {
                let param_types: Vec<Type> = params.iter().map(|(_, t)| t.clone()).collect();
                if self.tables.declare_function(name, param_types, return_type.clone(), true).is_err() {
                    self.redeclaration(name, span);
                }
            }
            Declaration::FunctionForwardDecl { name, params, return_type, span } => {
                let param_types: Vec<Type> = params.iter().map(|(_, t)| t.clone()).collect();
                if self.tables.declare_function(name, param_types, return_type.clone(), false).is_err() {
                    self.redeclaration(name, span);
                }
            }
            Declaration::Global { name, ty, span, .. } => {
                if self.tables.declare_global(name, ty.clone(), true, false).is_err() {
                    self.redeclaration(name, span);
                }
            }
            Declaration::GlobalForwardDecl { name, ty, span } => {
                if self.tables.declare_global(name, ty.clone(), false, true).is_err() {
                    self.redeclaration(name, span);
                }
            }
            Declaration::Struct { name, members, methods, constructors, .. } => {
                self.layouts.declare(name.clone(), members);
                let self_ty = struct_pointer(name);
                for method in methods.iter().chain(constructors.iter()) {
                    self.collect_method(name, &self_ty, method);
                }
            }
            Declaration::TypeAlias { .. } => {}
            Declaration::Namespace { nested, .. } => self.collect_declarations(nested),
        }
    }

    fn collect_method(&mut self, struct_name: &str, self_ty: &Type, method: &Declaration) {
        let Declaration::Function { name, params, return_type, span, .. } = method else {
            return;
        };
        let qualified = method_name(struct_name, name);
        let mut param_types = vec![self_ty.clone()];
        param_types.extend(params.iter().map(|(_, t)| t.clone()));
        if self.tables.declare_function(&qualified, param_types, return_type.clone(), true).is_err() {
            self.redeclaration(&qualified, span);
        }
    }

    fn redeclaration(&mut self, name: &str, span: &Span) {
        self.diagnostics.push(
            Diagnostic::error(DiagnosticKind::InvalidRedeclaration { name: name.to_string() })
                .with_context(DiagnosticContext::new().with_region(span.clone())),
        );
    }

    // -- entry point --

    fn check_entry_point(&mut self, file: &File) {
        match file.main_index {
            None => self.diagnostics.push(Diagnostic::error(DiagnosticKind::MissingMain)),
            Some(idx) => {
                if let Declaration::Function { params, span, .. } = &file.declarations[idx] {
                    let valid = params.is_empty()
                        || (params.len() == 2
                            && params[0].1.resolved().structurally_eq(&Type::new(TypeShape::Int(IntWidth::I32)))
                            && is_ptr_to_ptr_to_char(&params[1].1));
                    if !valid {
                        self.diagnostics.push(
                            Diagnostic::error(DiagnosticKind::MainSignatureMismatch)
                                .with_context(DiagnosticContext::new().with_region(span.clone())),
                        );
                    }
                }
            }
        }
    }

    // -- globals --

    fn type_globals(&mut self, decls: &mut [Declaration]) {
        let scope = ScopeStack::new();
        for decl in decls.iter_mut() {
            match decl {
                Declaration::Global { name, ty, initializer, span } => {
                    let static_eval = self.type_global_initializer(name, ty, initializer, &scope, span);
                    let _ = self.tables.declare_global(name, ty.clone(), true, static_eval);
                }
                Declaration::Namespace { nested, .. } => self.type_globals(nested),
                _ => {}
            }
        }
    }

    fn type_global_initializer(
        &mut self,
        name: &str,
        ty: &mut Type,
        initializer: &mut Initializer,
        scope: &ScopeStack,
        span: &Span,
    ) -> bool {
        match initializer {
            Initializer::Zero => true,
            Initializer::Direct(expr) | Initializer::Copy(expr) => {
                self.type_expression(expr, scope);
                let static_eval = *expr.static_eval.borrow();
                if let Some(expr_ty) = expr.ty.borrow().clone() {
                    if ty.is_incomplete() {
                        *ty = expr_ty.as_const();
                    } else if !ty.structurally_eq(&expr_ty) {
                        self.diagnostics.push(type_mismatch(ty, &expr_ty, span));
                    }
                }
                if !static_eval {
                    self.diagnostics.push(
                        Diagnostic::error(DiagnosticKind::NonStaticGlobalInitializer { name: name.to_string() })
                            .with_context(DiagnosticContext::new().with_region(span.clone())),
                    );
                }
                static_eval
            }
        }
    }

    // -- function bodies --

    fn analyze_bodies(&mut self, decls: &mut [Declaration]) {
        for decl in decls.iter_mut() {
            match decl {
                Declaration::Function { params, return_type, body, attributes, static_allocation_size, .. } => {
                    self.analyze_function_body(params, return_type, body, attributes, static_allocation_size, None);
                }
                Declaration::Struct { name, methods, constructors, .. } => {
                    let self_ty = struct_pointer(name);
                    for method in methods.iter_mut().chain(constructors.iter_mut()) {
                        if let Declaration::Function {
                            params,
                            return_type,
                            body,
                            attributes,
                            static_allocation_size,
                            ..
                        } = method
                        {
                            self.analyze_function_body(
                                params,
                                return_type,
                                body,
                                attributes,
                                static_allocation_size,
                                Some(self_ty.clone()),
                            );
                        }
                    }
                }
                Declaration::Namespace { nested, .. } => self.analyze_bodies(nested),
                _ => {}
            }
        }
    }

    fn analyze_function_body(
        &mut self,
        params: &[(String, Type)],
        return_type: &Type,
        body: &mut Vec<Statement>,
        attributes: &mut FunctionAttributes,
        static_allocation_size: &RefCell<u64>,
        self_param: Option<Type>,
    ) {
        let mut scope = ScopeStack::new();
        scope.push(Some(return_type.clone()));
        if let Some(self_ty) = self_param {
            scope.declare("self", self_ty);
        }
        for (pname, pty) in params {
            scope.declare(pname.clone(), pty.clone());
        }
        let mut allocated = 0u64;
        self.analyze_statements(body, &mut scope, &mut allocated);
        *static_allocation_size.borrow_mut() = allocated;
        ensure_terminates_with_return(body, return_type);
        attributes.reg_only = is_reg_only(body);
        scope.pop();
    }

    fn analyze_statements(&mut self, statements: &mut [Statement], scope: &mut ScopeStack, allocated: &mut u64) {
        for stmt in statements.iter_mut() {
            self.analyze_statement(stmt, scope, allocated);
        }
    }

    fn analyze_statement(&mut self, stmt: &mut Statement, scope: &mut ScopeStack, allocated: &mut u64) {
        match stmt {
            Statement::Let { name, ty, initializer, span } => {
                self.analyze_binding(name, ty, initializer, scope, allocated, span, true);
            }
            Statement::Var { name, ty, initializer, span } => {
                self.analyze_binding(name, ty, initializer, scope, allocated, span, false);
            }
            Statement::Assignment { target, value, span } => {
                self.type_expression(target, scope);
                self.type_expression(value, scope);
                self.check_assignment(target, value, span);
            }
            Statement::PointerAssignment { target, value, span } => {
                self.type_expression(target, scope);
                self.type_expression(value, scope);
                self.check_pointer_assignment(target, value, span);
            }
            Statement::Return { value, synthetic, span } => {
                if !*synthetic {
                    self.check_return(value.as_mut(), scope, span);
                }
            }
            Statement::CallStatement { call, .. } | Statement::ExpressionStatement { expr: call, .. } => {
                self.type_expression(call, scope);
            }
            Statement::If { condition, then_branch, else_branch, span } => {
                self.type_expression(condition, scope);
                self.check_condition(condition, span);
                scope.push(None);
                self.analyze_statements(then_branch, scope, allocated);
                scope.pop();
                if let Some(else_branch) = else_branch {
                    scope.push(None);
                    self.analyze_statements(else_branch, scope, allocated);
                    scope.pop();
                }
            }
            Statement::While { condition, body, span } => {
                self.type_expression(condition, scope);
                self.check_condition(condition, span);
                scope.push(None);
                self.analyze_statements(body, scope, allocated);
                scope.pop();
            }
            Statement::For { init, check, modify, body, .. } => {
                scope.push(None);
                self.analyze_statement(init, scope, allocated);
                self.type_expression(check, scope);
                let span = check.span.clone();
                self.check_condition(check, &span);
                self.analyze_statements(body, scope, allocated);
                self.analyze_statement(modify, scope, allocated);
                scope.pop();
            }
            Statement::Block { statements, .. } => {
                scope.push(None);
                self.analyze_statements(statements, scope, allocated);
                scope.pop();
            }
            Statement::Empty { .. } => {}
        }
    }

    fn analyze_binding(
        &mut self,
        name: &str,
        declared_ty: &mut Type,
        initializer: &mut Initializer,
        scope: &mut ScopeStack,
        allocated: &mut u64,
        span: &Span,
        is_let: bool,
    ) {
        match initializer {
            Initializer::Zero => {
                if declared_ty.is_incomplete() {
                    self.diagnostics.push(
                        Diagnostic::error(DiagnosticKind::TypeMismatch {
                            expected: "explicit type".into(),
                            actual: "<incomplete>".into(),
                        })
                        .with_context(DiagnosticContext::new().with_region(span.clone())),
                    );
                }
            }
            Initializer::Direct(expr) | Initializer::Copy(expr) => {
                self.type_expression(expr, scope);
                let expr_ty = expr.ty.borrow().clone().unwrap_or_else(|| Type::new(TypeShape::Incomplete));
                if declared_ty.is_incomplete() {
                    *declared_ty = expr_ty;
                } else if !declared_ty.structurally_eq(&expr_ty) {
                    self.diagnostics.push(type_mismatch(declared_ty, &expr_ty, span));
                }
                if is_let {
                    *declared_ty = declared_ty.as_const();
                } else if declared_ty.is_const && (declared_ty.is_number() || declared_ty.is_bool()) {
                    self.diagnostics.push(
                        Diagnostic::warning(DiagnosticKind::ImplicitUnconst { name: name.to_string() })
                            .with_context(DiagnosticContext::new().with_region(span.clone())),
                    );
                    *declared_ty = declared_ty.as_mut();
                }
            }
        }
        if !scope.declare(name.to_string(), declared_ty.clone()) {
            self.redeclaration(name, span);
        }
        *allocated += self.layouts.size_of(declared_ty);
    }

    fn check_assignment(&mut self, target: &Expression, value: &Expression, span: &Span) {
        let (Some(t), Some(v)) = (target.ty.borrow().clone(), value.ty.borrow().clone()) else {
            return;
        };
        if t.is_const {
            self.diagnostics.push(
                Diagnostic::error(DiagnosticKind::ConstViolation { description: describe_lvalue(target) })
                    .with_context(DiagnosticContext::new().with_region(span.clone())),
            );
        } else if !t.structurally_eq(&v) {
            self.diagnostics.push(type_mismatch(&t, &v, span));
        }
    }

    fn check_pointer_assignment(&mut self, target: &Expression, value: &Expression, span: &Span) {
        let Some(t) = target.ty.borrow().clone() else {
            return;
        };
        match t.resolved().pointee() {
            Some(pointee) => {
                if pointee.is_const {
                    self.diagnostics.push(
                        Diagnostic::error(DiagnosticKind::ConstViolation {
                            description: format!("*{}", describe_lvalue(target)),
                        })
                        .with_context(DiagnosticContext::new().with_region(span.clone())),
                    );
                } else if let Some(v) = value.ty.borrow().clone() {
                    if !pointee.structurally_eq(&v) {
                        self.diagnostics.push(type_mismatch(pointee, &v, span));
                    }
                }
            }
            None => {
                self.diagnostics.push(
                    Diagnostic::error(DiagnosticKind::TypeMismatch {
                        expected: "pointer".into(),
                        actual: t.to_string(),
                    })
                    .with_context(DiagnosticContext::new().with_region(span.clone())),
                );
            }
        }
    }

    fn check_return(&mut self, value: Option<&mut Expression>, scope: &ScopeStack, span: &Span) {
        let expected = scope.current_function_return_type().unwrap_or_else(|| Type::new(TypeShape::Void));
        match value {
            Some(expr) => {
                self.type_expression(expr, scope);
                if let Some(actual) = expr.ty.borrow().clone() {
                    if expected.resolved().is_void() || !expected.resolved().structurally_eq(&actual) {
                        self.diagnostics.push(
                            Diagnostic::error(DiagnosticKind::WrongReturnType {
                                expected: expected.to_string(),
                                actual: actual.to_string(),
                            })
                            .with_context(DiagnosticContext::new().with_region(span.clone())),
                        );
                    }
                }
            }
            None => {
                if !expected.resolved().is_void() {
                    self.diagnostics.push(
                        Diagnostic::error(DiagnosticKind::WrongReturnType {
                            expected: expected.to_string(),
                            actual: "Void".into(),
                        })
                        .with_context(DiagnosticContext::new().with_region(span.clone())),
                    );
                }
            }
        }
    }

    fn check_condition(&mut self, condition: &Expression, span: &Span) {
        let ty = condition.ty.borrow().clone();
        let ok = ty.as_ref().is_some_and(|t| t.resolved().is_bool());
        if !ok {
            self.diagnostics.push(
                Diagnostic::error(DiagnosticKind::TypeMismatch {
                    expected: "Bool".into(),
                    actual: ty.map(|t| t.to_string()).unwrap_or_else(|| "<unknown>".into()),
                })
                .with_context(DiagnosticContext::new().with_region(span.clone())),
            );
        }
    }

    // -- expressions --

    fn type_expression(&mut self, expr: &Expression, scope: &ScopeStack) {
        let span = expr.span.clone();
        match &expr.kind {
            ExpressionKind::Literal(lit) => {
                let (ty, static_eval) = literal_type(lit);
                set_type(expr, Some(ty), static_eval);
            }
            ExpressionKind::Symbol(name) => self.type_symbol(expr, name, scope, &span),
            ExpressionKind::Binary { left, op, right, .. } => {
                if matches!(op, TokenKind::Dot | TokenKind::Arrow) {
                    if let (Some(l), Some(r)) = (left, right) {
                        self.type_expression(l, scope);
                        self.type_member_access(expr, l, op, r, scope, &span);
                    }
                    return;
                }
                if let Some(l) = left {
                    self.type_expression(l, scope);
                }
                if let Some(r) = right {
                    self.type_expression(r, scope);
                }
                let left_ty = left.as_ref().and_then(|l| l.ty.borrow().clone());
                let right_ty = right.as_ref().and_then(|r| r.ty.borrow().clone());
                match operator::resolve(op, left_ty.as_ref(), right_ty.as_ref()) {
                    Some(result_ty) => {
                        let static_eval = left.as_ref().is_none_or(|l| *l.static_eval.borrow())
                            && right.as_ref().is_none_or(|r| *r.static_eval.borrow());
                        set_type(expr, Some(result_ty), static_eval);
                    }
                    None => {
                        self.diagnostics.push(
                            Diagnostic::error(DiagnosticKind::NoOperatorOverload {
                                op: format!("{op:?}"),
                                left: left_ty.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".into()),
                                right: right_ty.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".into()),
                            })
                            .with_context(DiagnosticContext::new().with_region(span.clone())),
                        );
                    }
                }
            }
            ExpressionKind::Call { name, args, resolved_params } => {
                for arg in args {
                    self.type_expression(arg, scope);
                }
                let arg_types = expr_types(args);
                match self.tables.resolve_call(name, &arg_types) {
                    Some(entry) => {
                        *resolved_params.borrow_mut() = Some(entry.params.clone());
                        set_type(expr, Some(entry.return_type.clone()), false);
                    }
                    None => {
                        let mut ctx = DiagnosticContext::new().with_region(span.clone());
                        if let Some(hint) = suggest(name, self.tables.function_names()) {
                            ctx = ctx.with_fix_hint(format!("did you mean `{hint}`?"));
                        }
                        self.diagnostics.push(
                            Diagnostic::error(DiagnosticKind::NoMatchingOverload { name: name.clone() })
                                .with_context(ctx),
                        );
                    }
                }
            }
            ExpressionKind::Construct { struct_name, args, .. } => {
                for arg in args {
                    self.type_expression(arg, scope);
                }
                match self.layouts.get(struct_name).cloned() {
                    Some(layout) => {
                        for (arg, member) in args.iter().zip(layout.members.iter()) {
                            if let Some(arg_ty) = arg.ty.borrow().clone() {
                                if !arg_ty.structurally_eq(&member.ty) {
                                    self.diagnostics.push(type_mismatch(&member.ty, &arg_ty, &arg.span));
                                }
                            }
                        }
                        set_type(expr, Some(Type::new(TypeShape::Struct(struct_name.clone()))), false);
                    }
                    None => {
                        self.diagnostics.push(
                            Diagnostic::error(DiagnosticKind::UnknownSymbol { name: struct_name.clone() })
                                .with_context(DiagnosticContext::new().with_region(span.clone())),
                        );
                    }
                }
            }
            ExpressionKind::ArrayLiteral(elems) => {
                for elem in elems {
                    self.type_expression(elem, scope);
                }
                let first_ty = elems.first().and_then(|e| e.ty.borrow().clone());
                if let Some(first_ty) = &first_ty {
                    for elem in elems.iter().skip(1) {
                        if let Some(ty) = elem.ty.borrow().clone() {
                            if !ty.structurally_eq(first_ty) {
                                self.diagnostics.push(type_mismatch(first_ty, &ty, &elem.span));
                            }
                        }
                    }
                }
                let static_eval = elems.iter().all(|e| *e.static_eval.borrow());
                let elem_ty = first_ty.unwrap_or_else(|| Type::new(TypeShape::Incomplete));
                set_type(
                    expr,
                    Some(Type::new(TypeShape::StaticArray(Rc::new(elem_ty), elems.len() as u64))),
                    static_eval,
                );
            }
            ExpressionKind::Sizeof(_) => {
                set_type(expr, Some(Type::new(TypeShape::Int(IntWidth::U64))), true);
            }
            ExpressionKind::UnsafeCast(ty, inner) => {
                self.type_expression(inner, scope);
                if let Some(inner_ty) = inner.ty.borrow().clone() {
                    let from_size = self.layouts.size_of(&inner_ty);
                    let to_size = self.layouts.size_of(ty);
                    if from_size != to_size {
                        self.diagnostics.push(
                            Diagnostic::error(DiagnosticKind::UnsafeCastSizeMismatch {
                                from: inner_ty.to_string(),
                                from_size: from_size as usize,
                                to: ty.to_string(),
                                to_size: to_size as usize,
                            })
                            .with_context(DiagnosticContext::new().with_region(span.clone())),
                        );
                    }
                }
                let static_eval = *inner.static_eval.borrow();
                set_type(expr, Some(ty.clone()), static_eval);
            }
        }
    }

    fn type_symbol(&mut self, expr: &Expression, name: &str, scope: &ScopeStack, span: &Span) {
        if let Some(ty) = scope.lookup(name) {
            set_type(expr, Some(ty.clone()), false);
            return;
        }
        if let Some(global) = self.tables.global(name) {
            set_type(expr, Some(global.ty.clone()), global.static_eval);
            return;
        }
        let mut ctx = DiagnosticContext::new().with_region(span.clone());
        if let Some(hint) = suggest(name, self.tables.global_names().chain(self.tables.function_names())) {
            ctx = ctx.with_fix_hint(format!("did you mean `{hint}`?"));
        }
        self.diagnostics.push(Diagnostic::error(DiagnosticKind::UnknownSymbol { name: name.to_string() }).with_context(ctx));
    }

    fn type_member_access(
        &mut self,
        expr: &Expression,
        left: &Expression,
        op: &TokenKind,
        right: &Expression,
        scope: &ScopeStack,
        span: &Span,
    ) {
        let left_ty = left.ty.borrow().clone();
        let base_ty = match (&left_ty, op) {
            (Some(t), TokenKind::Arrow) => t.resolved().pointee().cloned(),
            (Some(t), _) => Some(t.clone()),
            (None, _) => None,
        };
        let struct_name = base_ty.as_ref().and_then(|t| match &t.resolved().shape {
            TypeShape::Struct(name) => Some(name.clone()),
            _ => None,
        });
        let Some(struct_name) = struct_name else {
            self.diagnostics.push(
                Diagnostic::error(DiagnosticKind::TypeMismatch {
                    expected: "struct".into(),
                    actual: left_ty.as_ref().map(ToString::to_string).unwrap_or_else(|| "<unknown>".into()),
                })
                .with_context(DiagnosticContext::new().with_region(span.clone())),
            );
            return;
        };
        match &right.kind {
            ExpressionKind::Symbol(member) => match self.layouts.get(&struct_name).and_then(|l| l.member(member)) {
                Some(member_layout) => {
                    let ty = member_layout.ty.clone();
                    set_type(right, Some(ty.clone()), false);
                    set_type(expr, Some(ty), false);
                }
                None => {
                    self.diagnostics.push(
                        Diagnostic::error(DiagnosticKind::UnknownSymbol { name: member.clone() })
                            .with_context(DiagnosticContext::new().with_region(right.span.clone())),
                    );
                }
            },
            ExpressionKind::Call { name, args, resolved_params } => {
                for arg in args {
                    self.type_expression(arg, scope);
                }
                let qualified = method_name(&struct_name, name);
                let mut arg_types = vec![struct_pointer(&struct_name)];
                arg_types.extend(expr_types(args));
                match self.tables.resolve_call(&qualified, &arg_types) {
                    Some(entry) => {
                        *resolved_params.borrow_mut() = Some(entry.params.clone());
                        set_type(right, Some(entry.return_type.clone()), false);
                        set_type(expr, Some(entry.return_type.clone()), false);
                    }
                    None => {
                        self.diagnostics.push(
                            Diagnostic::error(DiagnosticKind::NoMatchingOverload { name: qualified })
                                .with_context(DiagnosticContext::new().with_region(right.span.clone())),
                        );
                    }
                }
            }
            _ => {
                self.diagnostics.push(
                    Diagnostic::error(DiagnosticKind::UnexpectedToken {
                        found: "expression".into(),
                        expected: "member name or method call".into(),
                    })
                    .with_context(DiagnosticContext::new().with_region(right.span.clone())),
                );
            }
        }
    }
}

fn expr_types(exprs: &[Expression]) -> Vec<Type> {
    exprs.iter().map(|e| e.ty.borrow().clone().unwrap_or_else(|| Type::new(TypeShape::Incomplete))).collect()
}

fn set_type(expr: &Expression, ty: Option<Type>, static_eval: bool) {
    *expr.ty.borrow_mut() = ty;
    *expr.static_eval.borrow_mut() = static_eval;
}

fn type_mismatch(expected: &Type, actual: &Type, span: &Span) -> Diagnostic {
    Diagnostic::error(DiagnosticKind::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
    .with_context(DiagnosticContext::new().with_region(span.clone()))
}

fn describe_lvalue(expr: &Expression) -> String {
    match &expr.kind {
        ExpressionKind::Symbol(name) => name.clone(),
        _ => "expression".into(),
    }
}

fn literal_type(lit: &Literal) -> (Type, bool) {
    match lit {
        Literal::Bool(_) => (Type::new_const(TypeShape::Bool), true),
        Literal::Int(_) => (Type::new_const(TypeShape::Int(IntWidth::I64)), true),
        Literal::Float(_) => (Type::new_const(TypeShape::Float), true),
        Literal::AsciiString(_) => (
            Type::new_const(TypeShape::Pointer(Rc::new(Type::new_const(TypeShape::Int(IntWidth::I8))))),
            true,
        ),
        Literal::WideString(_) => (
            Type::new_const(TypeShape::Pointer(Rc::new(Type::new_const(TypeShape::Int(IntWidth::WideChar))))),
            true,
        ),
        Literal::Null => (Type::new_const(TypeShape::Pointer(Rc::new(Type::new(TypeShape::Void)))), true),
    }
}

fn struct_pointer(struct_name: &str) -> Type {
    Type::new(TypeShape::Pointer(Rc::new(Type::new(TypeShape::Struct(struct_name.to_string())))))
}

fn method_name(struct_name: &str, method: &str) -> String {
    format!("{struct_name}${method}")
}

fn is_ptr_to_ptr_to_char(ty: &Type) -> bool {
    if let TypeShape::Pointer(inner) = &ty.resolved().shape {
        if let TypeShape::Pointer(inner2) = &inner.resolved().shape {
            return matches!(inner2.resolved().shape, TypeShape::Int(IntWidth::I8));
        }
    }
    false
}

fn is_reg_only(body: &[Statement]) -> bool {
    matches!(body, [Statement::Return { value: Some(_), synthetic: false, .. }])
}

fn ensure_terminates_with_return(body: &mut Vec<Statement>, return_type: &Type) {
    if !return_type.resolved().is_void() || visibly_returns(body) {
        return;
    }
    let span = body.last().map(Statement::span).cloned().unwrap_or_else(|| Span::at_start(""));
    body.push(Statement::Return { value: None, synthetic: true, span });
}

fn visibly_returns(body: &[Statement]) -> bool {
    match body.last() {
        Some(Statement::Return { .. }) => true,
        Some(Statement::Block { statements, .. }) => visibly_returns(statements),
        Some(Statement::If { then_branch, else_branch: Some(else_branch), .. }) => {
            visibly_returns(then_branch) && visibly_returns(else_branch)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vergec_foundation::Span;

    fn span() -> Span {
        Span::at_start("a.vg")
    }

    fn int_ty() -> Type {
        Type::new(TypeShape::Int(IntWidth::I64))
    }

    fn int_literal(n: u64) -> Expression {
        Expression::new(ExpressionKind::Literal(Literal::Int(n)), span())
    }

    fn void_main(body: Vec<Statement>) -> File {
        File {
            declarations: vec![Declaration::Function {
                name: "main".into(),
                params: Vec::new(),
                return_type: Type::new(TypeShape::Void),
                body,
                attributes: FunctionAttributes::default(),
                deprecation: None,
                static_allocation_size: RefCell::new(0),
                span: span(),
            }],
            main_index: Some(0),
        }
    }

    #[test]
    fn missing_main_is_an_error() {
        let file = File { declarations: Vec::new(), main_index: None };
        let result = analyze(file);
        assert!(result.is_err());
    }

    #[test]
    fn void_function_falling_off_the_end_gets_synthetic_return() {
        let file = void_main(vec![Statement::CallStatement {
            call: Expression::new(
                ExpressionKind::Call { name: "exit".into(), args: Vec::new(), resolved_params: RefCell::new(None) },
                span(),
            ),
            span: span(),
        }]);
        // "exit" is undeclared here, so analysis reports an error, but the
        // synthetic-return insertion runs before error accumulation fails
        // the pass — check the AST directly.
        let mut analyzer = Analyzer::new();
        analyzer.collect_declarations(&file.declarations);
        analyzer.check_entry_point(&file);
        let mut file = file;
        analyzer.type_globals(&mut file.declarations);
        analyzer.analyze_bodies(&mut file.declarations);
        let Declaration::Function { body, .. } = &file.declarations[0] else { unreachable!() };
        assert!(matches!(body.last(), Some(Statement::Return { synthetic: true, value: None, .. })));
    }

    #[test]
    fn literal_return_matching_declared_type_is_accepted() {
        let file = File {
            declarations: vec![Declaration::Function {
                name: "main".into(),
                params: Vec::new(),
                return_type: int_ty(),
                body: vec![Statement::Return { value: Some(int_literal(0)), synthetic: false, span: span() }],
                attributes: FunctionAttributes::default(),
                deprecation: None,
                static_allocation_size: RefCell::new(0),
                span: span(),
            }],
            main_index: Some(0),
        };
        let result = analyze(file);
        assert!(result.is_ok());
    }

    #[test]
    fn wrong_return_type_is_rejected() {
        let file = File {
            declarations: vec![Declaration::Function {
                name: "main".into(),
                params: Vec::new(),
                return_type: Type::new(TypeShape::Bool),
                body: vec![Statement::Return { value: Some(int_literal(0)), synthetic: false, span: span() }],
                attributes: FunctionAttributes::default(),
                deprecation: None,
                static_allocation_size: RefCell::new(0),
                span: span(),
            }],
            main_index: Some(0),
        };
        assert!(analyze(file).is_err());
    }

    #[test]
    fn assignment_to_let_binding_is_a_const_violation() {
        let body = vec![
            Statement::Let { name: "x".into(), ty: Type::new(TypeShape::Incomplete), initializer: Initializer::Direct(Box::new(int_literal(1))), span: span() },
            Statement::Assignment {
                target: Expression::new(ExpressionKind::Symbol("x".into()), span()),
                value: int_literal(2),
                span: span(),
            },
        ];
        let file = void_main(body);
        assert!(analyze(file).is_err());
    }

    #[test]
    fn unknown_function_call_is_rejected() {
        let body = vec![Statement::CallStatement {
            call: Expression::new(
                ExpressionKind::Call { name: "nope".into(), args: Vec::new(), resolved_params: RefCell::new(None) },
                span(),
            ),
            span: span(),
        }];
        let file = void_main(body);
        assert!(analyze(file).is_err());
    }

    #[test]
    fn overload_resolution_picks_matching_arity_and_types() {
        let mut decls = vec![
            Declaration::Function {
                name: "f".into(),
                params: vec![("x".into(), int_ty())],
                return_type: Type::new(TypeShape::Void),
                body: vec![Statement::Return { value: None, synthetic: false, span: span() }],
                attributes: FunctionAttributes::default(),
                deprecation: None,
                static_allocation_size: RefCell::new(0),
                span: span(),
            },
            Declaration::Function {
                name: "main".into(),
                params: Vec::new(),
                return_type: Type::new(TypeShape::Void),
                body: vec![Statement::CallStatement {
                    call: Expression::new(
                        ExpressionKind::Call {
                            name: "f".into(),
                            args: vec![int_literal(1)],
                            resolved_params: RefCell::new(None),
                        },
                        span(),
                    ),
                    span: span(),
                }],
                attributes: FunctionAttributes::default(),
                deprecation: None,
                static_allocation_size: RefCell::new(0),
                span: span(),
            },
        ];
        let main_index = Some(decls.len() - 1);
        let file = File { declarations: std::mem::take(&mut decls), main_index };
        assert!(analyze(file).is_ok());
    }

    #[test]
    fn struct_member_access_resolves_declared_type() {
        let struct_decl = Declaration::Struct {
            name: "Point".into(),
            members: vec![("x".into(), int_ty())],
            methods: Vec::new(),
            constructors: Vec::new(),
            span: span(),
        };
        let body = vec![
            Statement::Let {
                name: "p".into(),
                ty: Type::new(TypeShape::Struct("Point".into())),
                initializer: Initializer::Zero,
                span: span(),
            },
            Statement::ExpressionStatement {
                expr: Expression::new(
                    ExpressionKind::Binary {
                        left: Some(Box::new(Expression::new(ExpressionKind::Symbol("p".into()), span()))),
                        op: TokenKind::Dot,
                        precedence: 80,
                        right: Some(Box::new(Expression::new(ExpressionKind::Symbol("x".into()), span()))),
                    },
                    span(),
                ),
                span: span(),
            },
        ];
        let main = Declaration::Function {
            name: "main".into(),
            params: Vec::new(),
            return_type: Type::new(TypeShape::Void),
            body,
            attributes: FunctionAttributes::default(),
            deprecation: None,
            static_allocation_size: RefCell::new(0),
            span: span(),
        };
        let file = File { declarations: vec![struct_decl, main], main_index: Some(1) };
        assert!(analyze(file).is_ok());
    }
}
