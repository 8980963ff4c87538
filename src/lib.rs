// bfc - Brainfuck compiler
// Source -> tokens -> AST -> raw x86 bytes -> ELF executable.
// No assembler, no linker, no libc: the backend emits i386 machine
// code directly and wraps it in a minimal ELF32 image.

pub mod backend;
pub mod frontend;
pub mod optimizer;

pub use backend::codegen::{CodeGenerator, CodegenError};
pub use backend::elf::ElfImage;
pub use frontend::ast::{Node, Program};
pub use frontend::lexer::{Lexer, Token};
pub use frontend::parser::{ParseError, Parser};
pub use optimizer::RunLengthMerger;
