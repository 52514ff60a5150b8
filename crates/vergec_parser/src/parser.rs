//! Recursive-descent parser with Pratt-style expression parsing.

use std::cell::RefCell;
use std::rc::Rc;

use vergec_foundation::{suggest, Diagnostic, DiagnosticContext, DiagnosticKind, FileResolutionMap};
use vergec_lexer::{Lexer, Token, TokenKind, KEYWORD_SPELLINGS};

use crate::ast::{
    ConstructMode, Declaration, Expression, ExpressionKind, File, FunctionAttributes, Initializer,
    Literal, Statement,
};
use crate::registry::TypeRegistry;
use crate::types::{IntWidth, Type, TypeShape};

const MAX_RECOVERY_POINTS: usize = 3;

/// Parses `source` (already preprocessed) into a [`File`].
///
/// # Errors
/// Returns the accumulated diagnostics if lexing or parsing failed.
pub fn parse(source: &str, resolution_map: &FileResolutionMap) -> Result<File, Vec<Diagnostic>> {
    Parser::new(source, resolution_map).parse_file()
}

/// Recursive-descent parser over one translation unit's token stream.
pub struct Parser<'src> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'src str,
    registry: TypeRegistry,
    diagnostics: Vec<Diagnostic>,
    recovery_points: usize,
    namespace_stack: Vec<String>,
}

impl<'src> Parser<'src> {
    /// Tokenizes `source` and builds a parser over the significant tokens.
    #[must_use]
    pub fn new(source: &'src str, resolution_map: &FileResolutionMap) -> Self {
        let (tokens, lex_diags) = Lexer::tokenize_all(source, resolution_map);
        let tokens: Vec<Token> = tokens.into_iter().filter(|t| !t.kind.is_trivia()).collect();
        Self {
            tokens,
            pos: 0,
            source,
            registry: TypeRegistry::new(),
            diagnostics: lex_diags,
            recovery_points: 0,
            namespace_stack: Vec::new(),
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn expect(&mut self, expected: &TokenKind) -> Result<Token, ()> {
        if std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(expected) {
            Ok(self.advance())
        } else {
            self.error_unexpected(expected);
            Err(())
        }
    }

    fn error_unexpected(&mut self, expected: &TokenKind) {
        let found = self.peek_kind().clone();
        let span = self.current().span.clone();
        let mut diag = Diagnostic::error(DiagnosticKind::UnexpectedToken {
            found: found.name(),
            expected: expected.name(),
        })
        .with_context(DiagnosticContext::new().with_region(span));
        if let TokenKind::Identifier(name) = &found {
            if let Some(hint) = suggest(name, KEYWORD_SPELLINGS.iter().copied()) {
                diag = diag.with_context(
                    DiagnosticContext::new().with_fix_hint(format!("did you mean `{hint}`?")),
                );
            }
        }
        self.diagnostics.push(diag);
    }

    fn error(&mut self, kind: DiagnosticKind) {
        let span = self.current().span.clone();
        self.diagnostics
            .push(Diagnostic::error(kind).with_context(DiagnosticContext::new().with_region(span)));
    }

    /// Skips tokens until the next declarator keyword, counting this as one
    /// recovery point. Returns `true` if the file should be abandoned.
    fn resynchronize(&mut self) -> bool {
        self.recovery_points += 1;
        while !self.at_eof() && !is_declarator_start(self.peek_kind()) {
            self.advance();
        }
        self.recovery_points >= MAX_RECOVERY_POINTS
    }

    /// Parses the whole translation unit.
    ///
    /// # Errors
    /// Returns the accumulated diagnostics if any hard parse error occurred.
    pub fn parse_file(mut self) -> Result<File, Vec<Diagnostic>> {
        let mut declarations = Vec::new();
        while !self.at_eof() {
            match self.parse_top_level_declaration() {
                Ok(Some(decl)) => declarations.push(decl),
                Ok(None) => {}
                Err(()) => {
                    if self.resynchronize() {
                        break;
                    }
                }
            }
        }
        let main_index = find_main_index(&declarations);
        if self.diagnostics.iter().any(|d| !d.is_warning()) {
            Err(self.diagnostics)
        } else {
            Ok(File { declarations, main_index })
        }
    }

    fn parse_top_level_declaration(&mut self) -> Result<Option<Declaration>, ()> {
        match self.peek_kind().clone() {
            TokenKind::Using => {
                self.advance();
                self.expect_identifier()?;
                self.expect(&TokenKind::Semicolon)?;
                Ok(None)
            }
            TokenKind::Static | TokenKind::Inline => {
                let mut attrs = FunctionAttributes::default();
                loop {
                    match self.peek_kind() {
                        TokenKind::Static => {
                            attrs.is_static = true;
                            self.advance();
                        }
                        TokenKind::Inline => {
                            attrs.is_inline = true;
                            self.advance();
                        }
                        _ => break,
                    }
                }
                self.parse_function(attrs).map(Some)
            }
            TokenKind::Func => self.parse_function(FunctionAttributes::default()).map(Some),
            TokenKind::Global => self.parse_global().map(Some),
            TokenKind::Struct => self.parse_struct().map(Some),
            TokenKind::TypeAlias => self.parse_type_alias().map(Some),
            TokenKind::Namespace => self.parse_namespace().map(Some),
            _ => {
                self.error(DiagnosticKind::InvalidTopLevelForm);
                Err(())
            }
        }
    }

    fn qualify(&self, name: &str) -> String {
        if self.namespace_stack.is_empty() {
            name.to_string()
        } else {
            format!("{}${}", self.namespace_stack.join("$"), name)
        }
    }

    fn expect_identifier(&mut self) -> Result<String, ()> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => {
                self.error_unexpected(&TokenKind::Identifier(String::new()));
                Err(())
            }
        }
    }

    fn parse_function(&mut self, attributes: FunctionAttributes) -> Result<Declaration, ()> {
        let start = self.current().span.clone();
        self.expect(&TokenKind::Func)?;
        let name = self.qualify(&self.expect_identifier()?);
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RParen) {
            let pname = self.expect_identifier()?;
            self.expect(&TokenKind::Colon)?;
            let ty = self.parse_type()?;
            params.push((pname, ty));
            if matches!(self.peek_kind(), TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        let return_type = if matches!(self.peek_kind(), TokenKind::Colon) {
            self.advance();
            self.parse_type()?
        } else if matches!(self.peek_kind(), TokenKind::Arrow) {
            self.advance();
            self.parse_type()?
        } else {
            Type::new(TypeShape::Void)
        };

        if matches!(self.peek_kind(), TokenKind::Semicolon) {
            let span = start.to(&self.current().span);
            self.advance();
            return Ok(Declaration::FunctionForwardDecl { name, params, return_type, span });
        }

        let body = self.parse_block()?;
        let span = start.to(&self.tokens[self.pos.saturating_sub(1)].span);
        Ok(Declaration::Function {
            name,
            params,
            return_type,
            body,
            attributes,
            deprecation: None,
            static_allocation_size: RefCell::new(0),
            span,
        })
    }

    fn parse_global(&mut self) -> Result<Declaration, ()> {
        let start = self.current().span.clone();
        self.expect(&TokenKind::Global)?;
        let name = self.qualify(&self.expect_identifier()?);
        self.expect(&TokenKind::Colon)?;
        let ty = self.parse_type()?;
        if matches!(self.peek_kind(), TokenKind::Semicolon) {
            let span = start.to(&self.current().span);
            self.advance();
            return Ok(Declaration::GlobalForwardDecl { name, ty, span });
        }
        self.expect(&TokenKind::Assign)?;
        let value = self.parse_expression(0)?;
        let span = start.to(&self.current().span);
        self.expect(&TokenKind::Semicolon)?;
        Ok(Declaration::Global {
            name,
            ty,
            initializer: Initializer::Direct(Box::new(value)),
            span,
        })
    }

    fn parse_struct(&mut self) -> Result<Declaration, ()> {
        let start = self.current().span.clone();
        self.expect(&TokenKind::Struct)?;
        let name = self.qualify(&self.expect_identifier()?);
        self.expect(&TokenKind::LBrace)?;
        let mut members = Vec::new();
        let mut methods = Vec::new();
        let mut constructors = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RBrace) {
            if matches!(self.peek_kind(), TokenKind::Func) {
                let method = self.parse_function(FunctionAttributes::default())?;
                if method.name() == Some(name.as_str()) {
                    constructors.push(method);
                } else {
                    methods.push(method);
                }
            } else {
                let mname = self.expect_identifier()?;
                self.expect(&TokenKind::Colon)?;
                let ty = self.parse_type()?;
                self.expect(&TokenKind::Semicolon)?;
                members.push((mname, ty));
            }
        }
        self.expect(&TokenKind::RBrace)?;
        self.registry.declare_struct(name.clone(), members.clone());
        let span = start.to(&self.tokens[self.pos.saturating_sub(1)].span);
        Ok(Declaration::Struct { name, members, methods, constructors, span })
    }

    fn parse_type_alias(&mut self) -> Result<Declaration, ()> {
        let start = self.current().span.clone();
        self.expect(&TokenKind::TypeAlias)?;
        let name = self.qualify(&self.expect_identifier()?);
        self.expect(&TokenKind::Assign)?;
        let aliased = self.parse_type()?;
        let span = start.to(&self.current().span);
        self.expect(&TokenKind::Semicolon)?;
        self.registry.declare_alias(name.clone(), aliased.clone());
        Ok(Declaration::TypeAlias { name, aliased, span })
    }

    fn parse_namespace(&mut self) -> Result<Declaration, ()> {
        let start = self.current().span.clone();
        self.expect(&TokenKind::Namespace)?;
        let name = self.expect_identifier()?;
        self.namespace_stack.push(name.clone());
        self.expect(&TokenKind::LBrace)?;
        let mut nested = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RBrace) && !self.at_eof() {
            match self.parse_top_level_declaration() {
                Ok(Some(decl)) => nested.push(decl),
                Ok(None) => {}
                Err(()) => {
                    if self.resynchronize() {
                        break;
                    }
                }
            }
        }
        self.expect(&TokenKind::RBrace)?;
        self.namespace_stack.pop();
        let span = start.to(&self.tokens[self.pos.saturating_sub(1)].span);
        Ok(Declaration::Namespace { name, nested, span })
    }

    // ---- Types ----

    fn parse_type(&mut self) -> Result<Type, ()> {
        let is_const = if matches!(self.peek_kind(), TokenKind::Const) {
            self.advance();
            true
        } else {
            false
        };
        let mut ty = self.parse_type_atom()?;
        loop {
            match self.peek_kind() {
                TokenKind::LBracket => {
                    self.advance();
                    if matches!(self.peek_kind(), TokenKind::RBracket) {
                        self.advance();
                        ty = Type::new(TypeShape::Pointer(Rc::new(ty)));
                    } else if let TokenKind::IntLiteral { value, .. } = self.peek_kind().clone() {
                        self.advance();
                        self.expect(&TokenKind::RBracket)?;
                        ty = Type::new(TypeShape::StaticArray(Rc::new(ty), value));
                    } else {
                        self.error_unexpected(&TokenKind::RBracket);
                        return Err(());
                    }
                }
                TokenKind::Arrow => {
                    self.advance();
                    let ret = self.parse_type()?;
                    ty = Type::new(TypeShape::Function(vec![Rc::new(ty)], Rc::new(ret)));
                }
                _ => break,
            }
        }
        Ok(if is_const { ty.as_const() } else { ty })
    }

    fn parse_type_atom(&mut self) -> Result<Type, ()> {
        match self.peek_kind().clone() {
            TokenKind::Amp => {
                self.advance();
                let inner = self.parse_type()?;
                Ok(Type::new(TypeShape::Pointer(Rc::new(inner))))
            }
            TokenKind::LParen => {
                self.advance();
                let mut elems = Vec::new();
                while !matches!(self.peek_kind(), TokenKind::RParen) {
                    elems.push(Rc::new(self.parse_type()?));
                    if matches!(self.peek_kind(), TokenKind::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen)?;
                Ok(Type::new(TypeShape::Tuple(elems)))
            }
            TokenKind::Int64Type => {
                self.advance();
                Ok(Type::new(TypeShape::Int(IntWidth::I64)))
            }
            TokenKind::UInt64Type => {
                self.advance();
                Ok(Type::new(TypeShape::Int(IntWidth::U64)))
            }
            TokenKind::CharType => {
                self.advance();
                Ok(Type::new(TypeShape::Int(IntWidth::I8)))
            }
            TokenKind::UCharType => {
                self.advance();
                Ok(Type::new(TypeShape::Int(IntWidth::U8)))
            }
            TokenKind::ShortType => {
                self.advance();
                Ok(Type::new(TypeShape::Int(IntWidth::I16)))
            }
            TokenKind::UShortType => {
                self.advance();
                Ok(Type::new(TypeShape::Int(IntWidth::U16)))
            }
            TokenKind::Int32Type => {
                self.advance();
                Ok(Type::new(TypeShape::Int(IntWidth::I32)))
            }
            TokenKind::UInt32Type => {
                self.advance();
                Ok(Type::new(TypeShape::Int(IntWidth::U32)))
            }
            TokenKind::WideCharType => {
                self.advance();
                Ok(Type::new(TypeShape::Int(IntWidth::WideChar)))
            }
            TokenKind::WideUCharType => {
                self.advance();
                Ok(Type::new(TypeShape::Int(IntWidth::WideUChar)))
            }
            TokenKind::BoolType => {
                self.advance();
                Ok(Type::new(TypeShape::Bool))
            }
            TokenKind::VoidType => {
                self.advance();
                Ok(Type::new(TypeShape::Void))
            }
            TokenKind::Struct => {
                self.advance();
                let name = self.expect_identifier()?;
                Ok(Type::new(TypeShape::Struct(name)))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.registry.names_struct(&name) {
                    if self.registry.struct_info(&name).is_some() {
                        Ok(Type::new(TypeShape::Struct(name)))
                    } else if let Some(alias) = self.registry.alias(&name).cloned() {
                        Ok(Type::new(TypeShape::Alias(name, Rc::new(alias))))
                    } else {
                        Ok(Type::new(TypeShape::Struct(name)))
                    }
                } else if let Some(alias) = self.registry.alias(&name).cloned() {
                    Ok(Type::new(TypeShape::Alias(name, Rc::new(alias))))
                } else {
                    Ok(Type::new(TypeShape::Incomplete))
                }
            }
            _ => {
                self.error_unexpected(&TokenKind::Identifier(String::new()));
                Err(())
            }
        }
    }

    // ---- Statements ----

    fn parse_block(&mut self) -> Result<Vec<Statement>, ()> {
        self.expect(&TokenKind::LBrace)?;
        let mut statements = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RBrace) && !self.at_eof() {
            statements.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, ()> {
        let start = self.current().span.clone();
        match self.peek_kind().clone() {
            TokenKind::Semicolon => {
                self.advance();
                Ok(Statement::Empty { span: start })
            }
            TokenKind::LBrace => {
                let statements = self.parse_block()?;
                let span = start.to(&self.tokens[self.pos.saturating_sub(1)].span);
                Ok(Statement::Block { statements, span })
            }
            TokenKind::Let | TokenKind::Var => self.parse_let_or_var(),
            TokenKind::Return => {
                self.advance();
                let value = if matches!(self.peek_kind(), TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression(0)?)
                };
                let span = start.to(&self.current().span);
                self.expect(&TokenKind::Semicolon)?;
                Ok(Statement::Return { value, synthetic: false, span })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            _ => self.parse_expression_or_assignment_statement(),
        }
    }

    fn parse_let_or_var(&mut self) -> Result<Statement, ()> {
        let start = self.current().span.clone();
        let is_let = matches!(self.peek_kind(), TokenKind::Let);
        self.advance();
        let name = self.expect_identifier()?;
        let ty = if matches!(self.peek_kind(), TokenKind::Colon) {
            self.advance();
            self.parse_type()?
        } else {
            Type::new(TypeShape::Incomplete)
        };
        let initializer = if matches!(self.peek_kind(), TokenKind::Assign) {
            self.advance();
            let expr = self.parse_expression(0)?;
            if is_let {
                Initializer::Direct(Box::new(expr))
            } else {
                Initializer::Copy(Box::new(expr))
            }
        } else {
            Initializer::Zero
        };
        let span = start.to(&self.current().span);
        self.expect(&TokenKind::Semicolon)?;
        Ok(if is_let {
            Statement::Let { name, ty, initializer, span }
        } else {
            Statement::Var { name, ty, initializer, span }
        })
    }

    fn parse_if(&mut self) -> Result<Statement, ()> {
        let start = self.current().span.clone();
        self.expect(&TokenKind::If)?;
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expression(0)?;
        self.expect(&TokenKind::RParen)?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.matches_identifier_keyword("else") {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };
        let span = start.to(&self.tokens[self.pos.saturating_sub(1)].span);
        Ok(Statement::If { condition, then_branch, else_branch, span })
    }

    /// `else` has no dedicated token kind in the closed keyword set the
    /// lexer reports (spec.md §4.2 does not list it among the declarator
    /// keywords), so it is recognized here as the bare identifier `else`.
    fn matches_identifier_keyword(&self, word: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Identifier(name) if name == word)
    }

    fn parse_while(&mut self) -> Result<Statement, ()> {
        let start = self.current().span.clone();
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expression(0)?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_block()?;
        let span = start.to(&self.tokens[self.pos.saturating_sub(1)].span);
        Ok(Statement::While { condition, body, span })
    }

    fn parse_for(&mut self) -> Result<Statement, ()> {
        let start = self.current().span.clone();
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::LParen)?;
        let init = self.parse_statement()?;
        let check = self.parse_expression(0)?;
        self.expect(&TokenKind::Semicolon)?;
        let modify = self.parse_assignment_or_expression()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_block()?;
        let span = start.to(&self.tokens[self.pos.saturating_sub(1)].span);
        Ok(Statement::For {
            init: Box::new(init),
            check,
            modify: Box::new(modify),
            body,
            span,
        })
    }

    /// Parses an assignment or bare expression, WITHOUT consuming a
    /// trailing `;` — used both as a full statement (caller adds the
    /// semicolon) and as a `for(...)` loop's `modify` clause, which is
    /// terminated by `)` instead.
    fn parse_assignment_or_expression(&mut self) -> Result<Statement, ()> {
        let start = self.current().span.clone();
        let expr = self.parse_expression(0)?;
        let stmt = match self.peek_kind() {
            TokenKind::Assign => {
                self.advance();
                let value = self.parse_expression(0)?;
                Statement::Assignment { target: expr, value, span: start.clone() }
            }
            TokenKind::BackArrow => {
                self.advance();
                let value = self.parse_expression(0)?;
                Statement::PointerAssignment { target: expr, value, span: start.clone() }
            }
            _ => {
                if matches!(expr.kind, ExpressionKind::Call { .. }) {
                    Statement::CallStatement { call: expr, span: start.clone() }
                } else {
                    Statement::ExpressionStatement { expr, span: start.clone() }
                }
            }
        };
        let span = start.to(&self.tokens[self.pos.saturating_sub(1)].span);
        Ok(with_span(stmt, span))
    }

    fn parse_expression_or_assignment_statement(&mut self) -> Result<Statement, ()> {
        let stmt = self.parse_assignment_or_expression()?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(stmt)
    }

    // ---- Expressions (Pratt parser) ----

    fn parse_expression(&mut self, min_precedence: u8) -> Result<Expression, ()> {
        let mut left = self.parse_unary()?;
        loop {
            let Some((op, precedence)) = infix_operator(self.peek_kind()) else { break };
            if precedence < min_precedence {
                break;
            }
            let op_span = self.current().span.clone();
            self.advance();
            match op {
                TokenKind::Dot | TokenKind::Arrow => {
                    let member = self.expect_identifier()?;
                    let span = left.span.to(&op_span);
                    let member_expr = Expression::new(ExpressionKind::Symbol(member), op_span.clone());
                    left = Expression::new(
                        ExpressionKind::Binary {
                            left: Some(Box::new(left)),
                            op,
                            precedence,
                            right: Some(Box::new(member_expr)),
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    let index = self.parse_expression(0)?;
                    let end = self.current().span.clone();
                    self.expect(&TokenKind::RBracket)?;
                    let span = left.span.to(&end);
                    left = Expression::new(
                        ExpressionKind::Binary {
                            left: Some(Box::new(left)),
                            op: TokenKind::LBracket,
                            precedence,
                            right: Some(Box::new(index)),
                        },
                        span,
                    );
                }
                TokenKind::Inc | TokenKind::Dec => {
                    let span = left.span.to(&op_span);
                    left = Expression::new(
                        ExpressionKind::Binary {
                            left: Some(Box::new(left)),
                            op,
                            precedence,
                            right: None,
                        },
                        span,
                    );
                }
                _ => {
                    let right = self.parse_expression(precedence + 1)?;
                    let span = left.span.to(&right.span);
                    left = Expression::new(
                        ExpressionKind::Binary {
                            left: Some(Box::new(left)),
                            op,
                            precedence,
                            right: Some(Box::new(right)),
                        },
                        span,
                    );
                }
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ()> {
        let start = self.current().span.clone();
        match self.peek_kind().clone() {
            TokenKind::Star => {
                self.advance();
                let inner = self.parse_expression(70)?;
                let span = start.to(&inner.span);
                Ok(Expression::new(
                    ExpressionKind::Binary { left: None, op: TokenKind::Star, precedence: 70, right: Some(Box::new(inner)) },
                    span,
                ))
            }
            TokenKind::Amp => {
                self.advance();
                let inner = self.parse_expression(70)?;
                let span = start.to(&inner.span);
                Ok(Expression::new(
                    ExpressionKind::Binary { left: None, op: TokenKind::Amp, precedence: 70, right: Some(Box::new(inner)) },
                    span,
                ))
            }
            TokenKind::Plus | TokenKind::Minus | TokenKind::Bang | TokenKind::Tilde => {
                let op = self.advance().kind;
                let inner = self.parse_expression(60)?;
                let span = start.to(&inner.span);
                Ok(Expression::new(
                    ExpressionKind::Binary { left: None, op, precedence: 60, right: Some(Box::new(inner)) },
                    span,
                ))
            }
            TokenKind::Inc | TokenKind::Dec => {
                let op = self.advance().kind;
                let inner = self.parse_expression(60)?;
                let span = start.to(&inner.span);
                Ok(Expression::new(
                    ExpressionKind::Binary { left: None, op, precedence: 60, right: Some(Box::new(inner)) },
                    span,
                ))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, ()> {
        let start = self.current().span.clone();
        match self.peek_kind().clone() {
            TokenKind::True => {
                self.advance();
                Ok(Expression::new(ExpressionKind::Literal(Literal::Bool(true)), start))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::new(ExpressionKind::Literal(Literal::Bool(false)), start))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expression::new(ExpressionKind::Literal(Literal::Null), start))
            }
            TokenKind::IntLiteral { value, .. } => {
                self.advance();
                Ok(Expression::new(ExpressionKind::Literal(Literal::Int(value)), start))
            }
            TokenKind::FloatLiteral(value) => {
                self.advance();
                Ok(Expression::new(ExpressionKind::Literal(Literal::Float(value)), start))
            }
            TokenKind::AsciiString(text) => {
                self.advance();
                Ok(Expression::new(ExpressionKind::Literal(Literal::AsciiString(text)), start))
            }
            TokenKind::WideString(points) => {
                self.advance();
                Ok(Expression::new(ExpressionKind::Literal(Literal::WideString(points)), start))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elems = Vec::new();
                while !matches!(self.peek_kind(), TokenKind::RBracket) {
                    elems.push(self.parse_expression(0)?);
                    if matches!(self.peek_kind(), TokenKind::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                let end = self.current().span.clone();
                self.expect(&TokenKind::RBracket)?;
                Ok(Expression::new(ExpressionKind::ArrayLiteral(elems), start.to(&end)))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression(0)?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Sizeof => {
                self.advance();
                self.expect(&TokenKind::LParen)?;
                let ty = self.parse_type()?;
                let end = self.current().span.clone();
                self.expect(&TokenKind::RParen)?;
                Ok(Expression::new(ExpressionKind::Sizeof(ty), start.to(&end)))
            }
            TokenKind::UnsafeCast => {
                self.advance();
                self.expect(&TokenKind::Less)?;
                let ty = self.parse_type()?;
                self.expect(&TokenKind::Greater)?;
                self.expect(&TokenKind::LParen)?;
                let expr = self.parse_expression(0)?;
                let end = self.current().span.clone();
                self.expect(&TokenKind::RParen)?;
                Ok(Expression::new(ExpressionKind::UnsafeCast(ty, Box::new(expr)), start.to(&end)))
            }
            TokenKind::Identifier(first) => {
                self.advance();
                let mut name = first;
                while matches!(self.peek_kind(), TokenKind::ScopeResolve) {
                    self.advance();
                    let seg = self.expect_identifier()?;
                    name = format!("{name}${seg}");
                }
                if matches!(self.peek_kind(), TokenKind::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    while !matches!(self.peek_kind(), TokenKind::RParen) {
                        args.push(self.parse_expression(0)?);
                        if matches!(self.peek_kind(), TokenKind::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                    let end = self.current().span.clone();
                    self.expect(&TokenKind::RParen)?;
                    let span = start.to(&end);
                    if self.registry.names_struct(&name) {
                        Ok(Expression::new(
                            ExpressionKind::Construct { struct_name: name, args, mode: ConstructMode::Stack },
                            span,
                        ))
                    } else {
                        Ok(Expression::new(
                            ExpressionKind::Call { name, args, resolved_params: RefCell::new(None) },
                            span,
                        ))
                    }
                } else {
                    Ok(Expression::new(ExpressionKind::Symbol(name), start))
                }
            }
            _ => {
                self.error_unexpected(&TokenKind::Identifier(String::new()));
                Err(())
            }
        }
    }
}

fn with_span(stmt: Statement, span: vergec_foundation::Span) -> Statement {
    match stmt {
        Statement::Assignment { target, value, .. } => Statement::Assignment { target, value, span },
        Statement::PointerAssignment { target, value, .. } => {
            Statement::PointerAssignment { target, value, span }
        }
        Statement::CallStatement { call, .. } => Statement::CallStatement { call, span },
        Statement::ExpressionStatement { expr, .. } => Statement::ExpressionStatement { expr, span },
        other => other,
    }
}

/// Returns `(op, precedence)` for a token kind usable as an infix or
/// postfix operator, per the table in spec.md §4.3.
fn infix_operator(kind: &TokenKind) -> Option<(TokenKind, u8)> {
    Some(match kind {
        TokenKind::Dot => (TokenKind::Dot, 80),
        TokenKind::Arrow => (TokenKind::Arrow, 80),
        TokenKind::LBracket => (TokenKind::LBracket, 60),
        TokenKind::Inc => (TokenKind::Inc, 60),
        TokenKind::Dec => (TokenKind::Dec, 60),
        TokenKind::Star => (TokenKind::Star, 50),
        TokenKind::Slash => (TokenKind::Slash, 50),
        TokenKind::Plus => (TokenKind::Plus, 40),
        TokenKind::Minus => (TokenKind::Minus, 40),
        TokenKind::Less => (TokenKind::Less, 20),
        TokenKind::LessEq => (TokenKind::LessEq, 20),
        TokenKind::Greater => (TokenKind::Greater, 20),
        TokenKind::GreaterEq => (TokenKind::GreaterEq, 20),
        TokenKind::EqEq => (TokenKind::EqEq, 10),
        TokenKind::NotEq => (TokenKind::NotEq, 10),
        TokenKind::AmpAmp => (TokenKind::AmpAmp, 10),
        TokenKind::PipePipe => (TokenKind::PipePipe, 10),
        TokenKind::CaretCaret => (TokenKind::CaretCaret, 10),
        _ => return None,
    })
}

fn is_declarator_start(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Func
            | TokenKind::Global
            | TokenKind::Struct
            | TokenKind::TypeAlias
            | TokenKind::Namespace
            | TokenKind::Using
            | TokenKind::Static
            | TokenKind::Inline
    )
}

fn find_main_index(declarations: &[Declaration]) -> Option<usize> {
    declarations.iter().position(|decl| {
        matches!(decl, Declaration::Function { name, params, .. } if name == "main" && (params.is_empty() || params.len() == 2))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_source(source: &'static str) -> File {
        let mut map = FileResolutionMap::new();
        map.push(0, source.len(), "a.vg");
        let leaked: &'static FileResolutionMap = Box::leak(Box::new(map));
        parse(source, leaked).expect("parse failed")
    }

    #[test]
    fn parses_identity_return() {
        let file = parse_source("func main(): Int { return 0; }");
        assert_eq!(file.declarations.len(), 1);
        assert_eq!(file.main_index, Some(0));
    }

    #[test]
    fn parses_let_with_arithmetic() {
        let file = parse_source("func f(): Int { let x: Int = 1 + 2; return x; }");
        let Declaration::Function { body, .. } = &file.declarations[0] else { panic!() };
        assert!(matches!(body[0], Statement::Let { .. }));
    }

    #[test]
    fn parses_pointer_parameter_and_subscript() {
        let file = parse_source("func g(p: &Int, i: Int): Int { return p[i]; }");
        let Declaration::Function { params, .. } = &file.declarations[0] else { panic!() };
        assert!(matches!(params[0].1.shape, TypeShape::Pointer(_)));
    }

    #[test]
    fn parses_struct_and_construct_call() {
        let file = parse_source(
            "struct Point { x: Int; y: Int; } func f(): Int { let p = Point(1, 2); return 0; }",
        );
        assert_eq!(file.declarations.len(), 2);
    }

    #[test]
    fn parses_if_else() {
        let file = parse_source("func f(): Int { if (true) { return 1; } else { return 0; } }");
        let Declaration::Function { body, .. } = &file.declarations[0] else { panic!() };
        assert!(matches!(body[0], Statement::If { else_branch: Some(_), .. }));
    }

    #[test]
    fn parses_while_loop() {
        let file = parse_source("func f(): Void { while (true) { } }");
        let Declaration::Function { body, .. } = &file.declarations[0] else { panic!() };
        assert!(matches!(body[0], Statement::While { .. }));
    }

    #[test]
    fn parses_for_loop() {
        let file = parse_source("func f(): Void { for (let i: Int = 0; i < 10; i = i + 1) { } }");
        let Declaration::Function { body, .. } = &file.declarations[0] else { panic!() };
        assert!(matches!(body[0], Statement::For { .. }));
    }

    #[test]
    fn precedence_binds_multiplication_tighter_than_addition() {
        let file = parse_source("func f(): Int { return 1 + 2 * 3; }");
        let Declaration::Function { body, .. } = &file.declarations[0] else { panic!() };
        let Statement::Return { value: Some(expr), .. } = &body[0] else { panic!() };
        let ExpressionKind::Binary { op, right, .. } = &expr.kind else { panic!() };
        assert_eq!(*op, TokenKind::Plus);
        assert!(matches!(
            right.as_ref().unwrap().kind,
            ExpressionKind::Binary { op: TokenKind::Star, .. }
        ));
    }

    #[test]
    fn member_access_parses_as_binary_dot() {
        let file = parse_source("func f(p: Point): Int { return p.x; }");
        let Declaration::Function { body, .. } = &file.declarations[0] else { panic!() };
        let Statement::Return { value: Some(expr), .. } = &body[0] else { panic!() };
        assert!(matches!(expr.kind, ExpressionKind::Binary { op: TokenKind::Dot, .. }));
    }

    #[test]
    fn forward_declarations_parse_without_body() {
        let file = parse_source("func f(x: Int): Int; func f(x: &Char): Int;");
        assert_eq!(file.declarations.len(), 2);
        assert!(matches!(file.declarations[0], Declaration::FunctionForwardDecl { .. }));
    }

    #[test]
    fn parse_error_on_garbage_reports_diagnostic_and_recovers() {
        let mut map = FileResolutionMap::new();
        let source = "@@@ func f(): Int { return 0; }";
        map.push(0, source.len(), "a.vg");
        let result = parse(source, &map);
        assert!(result.is_err());
    }

    #[test]
    fn unsafe_cast_and_sizeof_parse() {
        let file = parse_source("func f(): UInt { return sizeof(Int); }");
        let Declaration::Function { body, .. } = &file.declarations[0] else { panic!() };
        let Statement::Return { value: Some(expr), .. } = &body[0] else { panic!() };
        assert!(matches!(expr.kind, ExpressionKind::Sizeof(_)));
    }

    #[test]
    fn namespace_qualifies_nested_names() {
        let file = parse_source("namespace ns { func helper(): Void { } }");
        let Declaration::Namespace { nested, .. } = &file.declarations[0] else { panic!() };
        let Declaration::Function { name, .. } = &nested[0] else { panic!() };
        assert_eq!(name, "ns$helper");
    }
}
