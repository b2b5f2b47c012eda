use std::{fmt, io};

use crate::{
    emitter::{Command, Segment, VmWriter},
    symbol_table::{Kind, SymbolTable},
    token::{Keyword, Token, TokenKind},
    tokenizer::{self, Tokenizer},
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Compiles a single class from `src`, streaming instructions into `writer`.
pub fn compile<W>(src: &str, writer: W) -> Result<()>
where
    W: io::Write,
{
    let tokens = Tokenizer::new(src)?;
    CompilationEngine::new(tokens, writer).compile_class()
}

/// Convenience wrapper that collects the instruction stream into a string.
pub fn compile_to_string(src: &str) -> Result<String> {
    let mut buf = Vec::with_capacity(4 * 1024);
    compile(src, &mut buf)?;
    Ok(String::from_utf8(buf).expect("the instruction stream is ASCII"))
}

/// Predictive recursive-descent translator, one procedure per grammar rule.
///
/// The engine owns everything a compilation touches: the token cursor, the
/// symbol table, the output sink, and the label counter. Compiling the same
/// class twice therefore yields identical output, and independent
/// compilations cannot interfere.
pub struct CompilationEngine<W> {
    tokens: Tokenizer,
    table: SymbolTable,
    writer: VmWriter<W>,
    class_name: String,
    label_index: u32,
}

impl<W> CompilationEngine<W>
where
    W: io::Write,
{
    pub fn new(tokens: Tokenizer, writer: W) -> CompilationEngine<W> {
        CompilationEngine {
            tokens,
            table: SymbolTable::new(),
            writer: VmWriter::new(writer),
            class_name: String::new(),
            label_index: 0,
        }
    }

    /// class := 'class' className '{' classVarDec* subroutineDec* '}'
    pub fn compile_class(mut self) -> Result<()> {
        self.expect_keyword(Keyword::Class, "'class'")?;
        self.class_name = self.expect_identifier("className")?;
        self.expect_symbol('{')?;
        self.compile_class_var_decs()?;
        self.compile_subroutines()?;
        self.expect_symbol('}')?;
        if let Some(extra) = self.tokens.advance() {
            return Err(Self::unexpected("end of class", &extra));
        }
        self.writer.flush()?;
        Ok(())
    }

    /// classVarDec := ('static'|'field') type varName (',' varName)* ';'
    ///
    /// Loops until the token opening the subroutine declarations (or the
    /// closing brace) comes up, and gives that token back.
    fn compile_class_var_decs(&mut self) -> Result<()> {
        loop {
            let token = self.advance()?;
            let kind = match token.kind() {
                TokenKind::Symbol('}')
                | TokenKind::Keyword(Keyword::Constructor | Keyword::Function | Keyword::Method) => {
                    self.tokens.pointer_back();
                    return Ok(());
                }
                TokenKind::Keyword(Keyword::Static) => Kind::Static,
                TokenKind::Keyword(Keyword::Field) => Kind::Field,
                _ => {
                    return Err(Self::unexpected(
                        "static|field|constructor|function|method",
                        &token,
                    ))
                }
            };
            self.compile_var_names(kind)?;
        }
    }

    /// type varName (',' varName)* ';' — the common tail of class var and
    /// local var declarations. Defines each name at its declaration site, in
    /// source order.
    fn compile_var_names(&mut self, kind: Kind) -> Result<()> {
        let ty = self.compile_type()?;
        loop {
            let name = self.expect_identifier("varName")?;
            self.table.define(&name, &ty, kind);
            let token = self.advance()?;
            match token.symbol() {
                Some(',') => (),
                Some(';') => return Ok(()),
                _ => return Err(Self::unexpected("',' or ';'", &token)),
            }
        }
    }

    fn compile_subroutines(&mut self) -> Result<()> {
        loop {
            let token = self.advance()?;
            match token.kind() {
                TokenKind::Symbol('}') => {
                    self.tokens.pointer_back();
                    return Ok(());
                }
                TokenKind::Keyword(
                    keyword @ (Keyword::Constructor | Keyword::Function | Keyword::Method),
                ) => self.compile_subroutine(keyword)?,
                _ => return Err(Self::unexpected("constructor|function|method", &token)),
            }
        }
    }

    /// subroutineDec := ('constructor'|'function'|'method') ('void'|type)
    ///                  subroutineName '(' parameterList ')' subroutineBody
    fn compile_subroutine(&mut self, keyword: Keyword) -> Result<()> {
        self.table.start_subroutine();

        // A method's receiver claims argument 0 before any declared
        // parameter, so user parameters start at index 1.
        if keyword == Keyword::Method {
            let class_name = self.class_name.clone();
            self.table.define("this", &class_name, Kind::Arg);
        }

        // The declared return type plays no part in code generation.
        let token = self.advance()?;
        if token.keyword() != Some(Keyword::Void) {
            self.tokens.pointer_back();
            self.compile_type()?;
        }

        let name = self.expect_identifier("subroutineName")?;
        self.expect_symbol('(')?;
        self.compile_parameter_list()?;
        self.expect_symbol(')')?;
        self.compile_subroutine_body(keyword, &name)
    }

    /// parameterList := ((type varName)(',' type varName)*)?
    fn compile_parameter_list(&mut self) -> Result<()> {
        let token = self.advance()?;
        if token.symbol() == Some(')') {
            self.tokens.pointer_back();
            return Ok(());
        }
        self.tokens.pointer_back();
        loop {
            let ty = self.compile_type()?;
            let name = self.expect_identifier("varName")?;
            self.table.define(&name, &ty, Kind::Arg);
            let token = self.advance()?;
            match token.symbol() {
                Some(',') => (),
                Some(')') => {
                    self.tokens.pointer_back();
                    return Ok(());
                }
                _ => return Err(Self::unexpected("',' or ')'", &token)),
            }
        }
    }

    /// subroutineBody := '{' varDec* statement* '}'
    fn compile_subroutine_body(&mut self, keyword: Keyword, name: &str) -> Result<()> {
        self.expect_symbol('{')?;
        self.compile_var_decs()?;
        self.write_subroutine_entry(keyword, name)?;
        self.compile_statements()?;
        self.expect_symbol('}')
    }

    /// varDec := 'var' type varName (',' varName)* ';'
    fn compile_var_decs(&mut self) -> Result<()> {
        loop {
            let token = self.advance()?;
            if token.keyword() != Some(Keyword::Var) {
                self.tokens.pointer_back();
                return Ok(());
            }
            self.compile_var_names(Kind::Var)?;
        }
    }

    /// The function declaration carries the local count, so it is only
    /// written once every `var` declaration has been seen. A method then
    /// binds the receiver passed as argument 0; a constructor allocates the
    /// instance and binds the returned address.
    fn write_subroutine_entry(&mut self, keyword: Keyword, name: &str) -> Result<()> {
        let qualified = format!("{}.{name}", self.class_name);
        self.writer
            .write_function(&qualified, self.table.var_count(Kind::Var))?;
        match keyword {
            Keyword::Method => {
                self.writer.write_push(Segment::Argument, 0)?;
                self.writer.write_pop(Segment::Pointer, 0)?;
            }
            Keyword::Constructor => {
                let fields = i32::from(self.table.var_count(Kind::Field));
                self.writer.write_push(Segment::Constant, fields)?;
                self.writer.write_call("Memory.alloc", 1)?;
                self.writer.write_pop(Segment::Pointer, 0)?;
            }
            _ => (),
        }
        Ok(())
    }

    /// statement := letStmt | ifStmt | whileStmt | doStmt | returnStmt
    ///
    /// Loops until the enclosing '}' comes up, and gives it back.
    fn compile_statements(&mut self) -> Result<()> {
        loop {
            let token = self.advance()?;
            match token.kind() {
                TokenKind::Symbol('}') => {
                    self.tokens.pointer_back();
                    return Ok(());
                }
                TokenKind::Keyword(Keyword::Let) => self.compile_let()?,
                TokenKind::Keyword(Keyword::If) => self.compile_if()?,
                TokenKind::Keyword(Keyword::While) => self.compile_while()?,
                TokenKind::Keyword(Keyword::Do) => self.compile_do()?,
                TokenKind::Keyword(Keyword::Return) => self.compile_return()?,
                _ => return Err(Self::unexpected("'let'|'if'|'while'|'do'|'return'", &token)),
            }
        }
    }

    /// letStmt := 'let' varName ('[' expression ']')? '=' expression ';'
    fn compile_let(&mut self) -> Result<()> {
        let name = self.expect_identifier("varName")?;
        let (segment, index) = self.variable(&name);
        let token = self.advance()?;
        match token.symbol() {
            Some('[') => {
                // Base + offset on the operand stack.
                self.writer.write_push(segment, index)?;
                self.compile_expression()?;
                self.expect_symbol(']')?;
                self.writer.write_arithmetic(Command::Add)?;
                self.expect_symbol('=')?;
                self.compile_expression()?;
                self.expect_symbol(';')?;
                // Stash the value, alias `that` to the element, write
                // through it. `pointer 1` is free because the receiver
                // keeps `pointer 0`.
                self.writer.write_pop(Segment::Temp, 0)?;
                self.writer.write_pop(Segment::Pointer, 1)?;
                self.writer.write_push(Segment::Temp, 0)?;
                self.writer.write_pop(Segment::That, 0)?;
                Ok(())
            }
            Some('=') => {
                self.compile_expression()?;
                self.expect_symbol(';')?;
                self.writer.write_pop(segment, index)?;
                Ok(())
            }
            _ => Err(Self::unexpected("'['|'='", &token)),
        }
    }

    /// ifStmt := 'if' '(' expression ')' '{' statement* '}'
    ///           ('else' '{' statement* '}')?
    fn compile_if(&mut self) -> Result<()> {
        let else_label = self.new_label();
        let end_label = self.new_label();

        self.expect_symbol('(')?;
        self.compile_expression()?;
        self.expect_symbol(')')?;
        self.writer.write_arithmetic(Command::Not)?;
        self.writer.write_if(&else_label)?;

        self.expect_symbol('{')?;
        self.compile_statements()?;
        self.expect_symbol('}')?;
        self.writer.write_goto(&end_label)?;

        self.writer.write_label(&else_label)?;
        let token = self.advance()?;
        if token.keyword() == Some(Keyword::Else) {
            self.expect_symbol('{')?;
            self.compile_statements()?;
            self.expect_symbol('}')?;
        } else {
            self.tokens.pointer_back();
        }
        self.writer.write_label(&end_label)?;
        Ok(())
    }

    /// whileStmt := 'while' '(' expression ')' '{' statement* '}'
    fn compile_while(&mut self) -> Result<()> {
        let continue_label = self.new_label();
        let top_label = self.new_label();

        self.writer.write_label(&top_label)?;
        self.expect_symbol('(')?;
        self.compile_expression()?;
        self.expect_symbol(')')?;
        self.writer.write_arithmetic(Command::Not)?;
        self.writer.write_if(&continue_label)?;

        self.expect_symbol('{')?;
        self.compile_statements()?;
        self.expect_symbol('}')?;
        self.writer.write_goto(&top_label)?;
        self.writer.write_label(&continue_label)?;
        Ok(())
    }

    /// doStmt := 'do' subroutineCall ';'
    fn compile_do(&mut self) -> Result<()> {
        self.compile_subroutine_call()?;
        self.expect_symbol(';')?;
        // Discard the callee's result.
        self.writer.write_pop(Segment::Temp, 0)?;
        Ok(())
    }

    /// returnStmt := 'return' expression? ';'
    fn compile_return(&mut self) -> Result<()> {
        let token = self.advance()?;
        if token.symbol() == Some(';') {
            // Every call leaves exactly one value on the stack, declared
            // void or not.
            self.writer.write_push(Segment::Constant, 0)?;
        } else {
            self.tokens.pointer_back();
            self.compile_expression()?;
            self.expect_symbol(';')?;
        }
        self.writer.write_return()?;
        Ok(())
    }

    /// expression := term (binaryOp term)*
    ///
    /// Operands compile postfix: left, right, then the operator. All
    /// operators bind equally, left to right.
    fn compile_expression(&mut self) -> Result<()> {
        self.compile_term()?;
        loop {
            let token = self.advance()?;
            let op = match token.symbol() {
                Some(op) if token.is_op() => op,
                _ => {
                    self.tokens.pointer_back();
                    return Ok(());
                }
            };
            self.compile_term()?;
            // The machine has no native multiply or divide.
            match op {
                '+' => self.writer.write_arithmetic(Command::Add)?,
                '-' => self.writer.write_arithmetic(Command::Sub)?,
                '*' => self.writer.write_call("Math.multiply", 2)?,
                '/' => self.writer.write_call("Math.divide", 2)?,
                '&' => self.writer.write_arithmetic(Command::And)?,
                '|' => self.writer.write_arithmetic(Command::Or)?,
                '<' => self.writer.write_arithmetic(Command::Lt)?,
                '>' => self.writer.write_arithmetic(Command::Gt)?,
                '=' => self.writer.write_arithmetic(Command::Eq)?,
                _ => unreachable!("is_op admits no other symbol"),
            }
        }
    }

    /// term := intLit | strLit | keywordConst | varName
    ///       | varName '[' expression ']' | subroutineCall
    ///       | '(' expression ')' | ('-'|'~') term
    fn compile_term(&mut self) -> Result<()> {
        let token = self.advance()?;
        match token.kind() {
            // An identifier needs one more token to disambiguate: `[` means
            // array access, `(` or `.` a subroutine call, anything else a
            // plain variable reference.
            TokenKind::Identifier => {
                let name = token.text().to_string();
                let next = self.advance()?;
                match next.symbol() {
                    Some('[') => {
                        let (segment, index) = self.variable(&name);
                        self.writer.write_push(segment, index)?;
                        self.compile_expression()?;
                        self.expect_symbol(']')?;
                        self.writer.write_arithmetic(Command::Add)?;
                        // Alias `that` to the element and read through it.
                        self.writer.write_pop(Segment::Pointer, 1)?;
                        self.writer.write_push(Segment::That, 0)?;
                    }
                    Some('(' | '.') => {
                        // Give back both tokens and restart from the call
                        // rule.
                        self.tokens.backtrack(2);
                        self.compile_subroutine_call()?;
                    }
                    _ => {
                        self.tokens.pointer_back();
                        let (segment, index) = self.variable(&name);
                        self.writer.write_push(segment, index)?;
                    }
                }
            }
            TokenKind::IntConst => {
                let value = token
                    .int_val()
                    .ok_or_else(|| Self::unexpected("integerConstant", &token))?;
                self.writer.write_push(Segment::Constant, i32::from(value))?;
            }
            // A string constant builds a string object: allocate it with
            // the length, then append one character at a time. Each append
            // leaves the object back on the stack.
            TokenKind::StrConst => {
                let text = token.text();
                let value = &text[1..text.len() - 1];
                let len = i32::try_from(value.chars().count()).unwrap();
                self.writer.write_push(Segment::Constant, len)?;
                self.writer.write_call("String.new", 1)?;
                for c in value.chars() {
                    self.writer
                        .write_push(Segment::Constant, u32::from(c) as i32)?;
                    self.writer.write_call("String.appendChar", 2)?;
                }
            }
            TokenKind::Keyword(Keyword::True) => {
                self.writer.write_push(Segment::Constant, 0)?;
                self.writer.write_arithmetic(Command::Not)?;
            }
            TokenKind::Keyword(Keyword::False | Keyword::Null) => {
                self.writer.write_push(Segment::Constant, 0)?;
            }
            TokenKind::Keyword(Keyword::This) => {
                self.writer.write_push(Segment::Pointer, 0)?;
            }
            TokenKind::Symbol('(') => {
                self.compile_expression()?;
                self.expect_symbol(')')?;
            }
            TokenKind::Symbol('-') => {
                self.compile_term()?;
                self.writer.write_arithmetic(Command::Neg)?;
            }
            TokenKind::Symbol('~') => {
                self.compile_term()?;
                self.writer.write_arithmetic(Command::Not)?;
            }
            _ => {
                return Err(Self::unexpected(
                    "integerConstant|stringConstant|keywordConstant|'(' expression ')'|unaryOp term",
                    &token,
                ))
            }
        }
        Ok(())
    }

    /// subroutineCall := subroutineName '(' expressionList ')'
    ///                 | (className|varName) '.' subroutineName
    ///                   '(' expressionList ')'
    ///
    /// A bare call dispatches on the current receiver. A qualified call
    /// dispatches on the named variable's stored value when the qualifier
    /// resolves, and is a plain class-qualified call otherwise — an
    /// unresolvable qualifier is not diagnosed here.
    fn compile_subroutine_call(&mut self) -> Result<()> {
        let name = self.expect_identifier("subroutineName")?;
        let token = self.advance()?;
        match token.symbol() {
            Some('(') => {
                self.writer.write_push(Segment::Pointer, 0)?;
                let n_args = self.compile_expression_list()? + 1;
                self.expect_symbol(')')?;
                let target = format!("{}.{name}", self.class_name);
                self.writer.write_call(&target, n_args)?;
            }
            Some('.') => {
                let subroutine = self.expect_identifier("subroutineName")?;
                let receiver = self
                    .table
                    .resolve(&name)
                    .map(|s| (Segment::from(s.kind()), i32::from(s.index()), s.ty().to_string()));
                let (target, implicit) = match receiver {
                    Some((segment, index, ty)) => {
                        self.writer.write_push(segment, index)?;
                        (format!("{ty}.{subroutine}"), 1)
                    }
                    None => (format!("{name}.{subroutine}"), 0),
                };
                self.expect_symbol('(')?;
                let n_args = implicit + self.compile_expression_list()?;
                self.expect_symbol(')')?;
                self.writer.write_call(&target, n_args)?;
            }
            _ => return Err(Self::unexpected("'('|'.'", &token)),
        }
        Ok(())
    }

    /// expressionList := (expression (',' expression)*)?
    ///
    /// Returns how many expressions were compiled, each leaving one value
    /// on the stack.
    fn compile_expression_list(&mut self) -> Result<u16> {
        let token = self.advance()?;
        if token.symbol() == Some(')') {
            self.tokens.pointer_back();
            return Ok(0);
        }
        self.tokens.pointer_back();
        self.compile_expression()?;
        let mut n_args = 1;
        loop {
            let token = self.advance()?;
            if token.symbol() == Some(',') {
                self.compile_expression()?;
                n_args += 1;
            } else {
                self.tokens.pointer_back();
                return Ok(n_args);
            }
        }
    }

    /// type := 'int' | 'char' | 'boolean' | className
    fn compile_type(&mut self) -> Result<String> {
        let token = self.advance()?;
        match token.kind() {
            TokenKind::Keyword(Keyword::Int | Keyword::Char | Keyword::Boolean)
            | TokenKind::Identifier => Ok(token.text().to_string()),
            _ => Err(Self::unexpected("int|char|boolean|className", &token)),
        }
    }
}

/// Utility functions.
impl<W> CompilationEngine<W>
where
    W: io::Write,
{
    fn advance(&mut self) -> Result<Token> {
        self.tokens.advance().ok_or(Error::UnexpectedEnd)
    }

    fn expect_keyword(&mut self, keyword: Keyword, expected: &str) -> Result<()> {
        let token = self.advance()?;
        if token.keyword() == Some(keyword) {
            Ok(())
        } else {
            Err(Self::unexpected(expected, &token))
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<()> {
        let token = self.advance()?;
        if token.symbol() == Some(symbol) {
            Ok(())
        } else {
            Err(Self::unexpected(format!("'{symbol}'"), &token))
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<String> {
        let token = self.advance()?;
        match token.identifier() {
            Some(name) => Ok(name.to_string()),
            None => Err(Self::unexpected(expected, &token)),
        }
    }

    /// Resolved (segment, index) for a variable reference. An unresolved
    /// name is not diagnosed: it renders as `none -1`, which no downstream
    /// translator accepts, so the fault surfaces where the stream is
    /// consumed.
    fn variable(&self, name: &str) -> (Segment, i32) {
        match self.table.resolve(name) {
            Some(symbol) => (Segment::from(symbol.kind()), i32::from(symbol.index())),
            None => (Segment::None, -1),
        }
    }

    /// Labels carry a prefix no source identifier can spell, and the
    /// counter never resets or repeats within an engine.
    fn new_label(&mut self) -> String {
        let label = format!("L${}", self.label_index);
        self.label_index += 1;
        label
    }

    fn unexpected(expected: impl Into<String>, token: &Token) -> Error {
        Error::Unexpected {
            expected: expected.into(),
            found: token.text().to_string(),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    /// The source failed lexical classification.
    Lex(tokenizer::Error),
    /// A token is present but violates the expected grammar production.
    Unexpected { expected: String, found: String },
    /// The token sequence ran out mid-production.
    UnexpectedEnd,
    /// The output sink failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Lex(error) => write!(f, "{error}"),
            Error::Unexpected { expected, found } => {
                write!(f, "expected {expected}, but got {found:?}")
            }
            Error::UnexpectedEnd => write!(f, "unexpected end of input"),
            Error::Io(error) => write!(f, "failed to write instruction stream: {error}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Lex(error) => Some(error),
            Error::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl From<tokenizer::Error> for Error {
    fn from(error: tokenizer::Error) -> Error {
        Error::Lex(error)
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}
