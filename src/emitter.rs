use std::io;

use crate::symbol_table::Kind;

/// An addressable region of the target stack machine.
///
/// `None` is not part of the machine's vocabulary: it renders unresolved
/// variable references as a deliberately invalid segment token, so the
/// downstream translator rejects the stream instead of reading a wrong slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Constant,
    Argument,
    Local,
    Static,
    This,
    That,
    Pointer,
    Temp,
    None,
}

impl Segment {
    pub const fn as_str(self) -> &'static str {
        match self {
            Segment::Constant => "constant",
            Segment::Argument => "argument",
            Segment::Local => "local",
            Segment::Static => "static",
            Segment::This => "this",
            Segment::That => "that",
            Segment::Pointer => "pointer",
            Segment::Temp => "temp",
            Segment::None => "none",
        }
    }
}

impl From<Kind> for Segment {
    fn from(kind: Kind) -> Segment {
        match kind {
            Kind::Field => Segment::This,
            Kind::Static => Segment::Static,
            Kind::Var => Segment::Local,
            Kind::Arg => Segment::Argument,
        }
    }
}

/// An arithmetic or logical instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
}

impl Command {
    pub const fn as_str(self) -> &'static str {
        match self {
            Command::Add => "add",
            Command::Sub => "sub",
            Command::Neg => "neg",
            Command::Eq => "eq",
            Command::Gt => "gt",
            Command::Lt => "lt",
            Command::And => "and",
            Command::Or => "or",
            Command::Not => "not",
        }
    }
}

/// Stateless line formatter for the stack machine's instruction stream.
/// Every method appends exactly one instruction line to the sink and does no
/// semantic validation; emitting well-formed sequences is the caller's job.
pub struct VmWriter<W> {
    writer: W,
}

impl<W> VmWriter<W>
where
    W: io::Write,
{
    pub fn new(writer: W) -> VmWriter<W> {
        VmWriter { writer }
    }

    pub fn write_push(&mut self, segment: Segment, index: i32) -> io::Result<()> {
        writeln!(self.writer, "push {} {index}", segment.as_str())
    }

    pub fn write_pop(&mut self, segment: Segment, index: i32) -> io::Result<()> {
        writeln!(self.writer, "pop {} {index}", segment.as_str())
    }

    pub fn write_arithmetic(&mut self, command: Command) -> io::Result<()> {
        writeln!(self.writer, "{}", command.as_str())
    }

    pub fn write_label(&mut self, label: &str) -> io::Result<()> {
        writeln!(self.writer, "label {label}")
    }

    pub fn write_goto(&mut self, label: &str) -> io::Result<()> {
        writeln!(self.writer, "goto {label}")
    }

    pub fn write_if(&mut self, label: &str) -> io::Result<()> {
        writeln!(self.writer, "if-goto {label}")
    }

    pub fn write_call(&mut self, name: &str, n_args: u16) -> io::Result<()> {
        writeln!(self.writer, "call {name} {n_args}")
    }

    pub fn write_function(&mut self, name: &str, n_locals: u16) -> io::Result<()> {
        writeln!(self.writer, "function {name} {n_locals}")
    }

    pub fn write_return(&mut self) -> io::Result<()> {
        writeln!(self.writer, "return")
    }

    /// Flushes the underlying sink.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn collect(f: impl FnOnce(&mut VmWriter<&mut Vec<u8>>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut VmWriter::new(&mut buf)).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn one_line_per_instruction() {
        let out = collect(|w| {
            w.write_push(Segment::Constant, 7)?;
            w.write_pop(Segment::Local, 0)?;
            w.write_arithmetic(Command::Add)?;
            w.write_label("L$0")?;
            w.write_goto("L$1")?;
            w.write_if("L$0")?;
            w.write_call("Math.multiply", 2)?;
            w.write_function("Main.main", 3)?;
            w.write_return()
        });
        assert_eq!(
            out,
            "push constant 7\n\
             pop local 0\n\
             add\n\
             label L$0\n\
             goto L$1\n\
             if-goto L$0\n\
             call Math.multiply 2\n\
             function Main.main 3\n\
             return\n"
        );
    }

    #[test]
    fn kind_to_segment_mapping() {
        assert_eq!(Segment::from(Kind::Field), Segment::This);
        assert_eq!(Segment::from(Kind::Static), Segment::Static);
        assert_eq!(Segment::from(Kind::Var), Segment::Local);
        assert_eq!(Segment::from(Kind::Arg), Segment::Argument);
    }

    #[test]
    fn segment_tokens_match_the_machine() {
        let named = [
            (Segment::Constant, "constant"),
            (Segment::Argument, "argument"),
            (Segment::Local, "local"),
            (Segment::Static, "static"),
            (Segment::This, "this"),
            (Segment::That, "that"),
            (Segment::Pointer, "pointer"),
            (Segment::Temp, "temp"),
        ];
        for (segment, expected) in named {
            assert_eq!(segment.as_str(), expected);
        }
    }
}
