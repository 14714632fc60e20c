use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    UnexpectedEof,
    InvalidMagic(u32),
    InvalidConstantPoolIndex(u16),
    InvalidConstantPoolTag(u8),
    ConstantPoolTypeMismatch {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },
    InvalidModifiedUtf8,
    InvalidDescriptor(String),
    MalformedAttribute(&'static str),
    UnknownOpcode { opcode: u8, offset: usize },
    InvalidBranchTarget { offset: i64 },
    UnboundLabel(u32),
    ConstantPoolOverflow,
    CodeTooLarge(usize),
    Other(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnexpectedEof => write!(f, "unexpected end of input"),
            Error::InvalidMagic(magic) => write!(f, "invalid classfile magic: 0x{magic:08x}"),
            Error::InvalidConstantPoolIndex(index) => {
                write!(f, "invalid constant pool index: {index}")
            }
            Error::InvalidConstantPoolTag(tag) => write!(f, "invalid constant pool tag: {tag}"),
            Error::ConstantPoolTypeMismatch {
                index,
                expected,
                found,
            } => write!(
                f,
                "constant pool type mismatch at index {index}: expected {expected}, found {found}"
            ),
            Error::InvalidModifiedUtf8 => write!(f, "invalid modified UTF-8 constant"),
            Error::InvalidDescriptor(desc) => write!(f, "invalid descriptor: {desc}"),
            Error::MalformedAttribute(name) => write!(f, "malformed {name} attribute"),
            Error::UnknownOpcode { opcode, offset } => {
                write!(f, "unknown opcode 0x{opcode:02x} at code offset {offset}")
            }
            Error::InvalidBranchTarget { offset } => {
                write!(f, "branch target {offset} is not an instruction boundary")
            }
            Error::UnboundLabel(label) => write!(f, "label {label} was never placed"),
            Error::ConstantPoolOverflow => {
                write!(f, "constant pool exceeds 65535 entries")
            }
            Error::CodeTooLarge(len) => {
                write!(f, "method body of {len} bytes exceeds the 65535 byte limit")
            }
            Error::Other(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {}
