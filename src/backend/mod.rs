// bfc backend
// Emits bytes directly: AST -> i386 machine code -> ELF32 image.
// No assembler stage and no linker; the code buffer the generator
// produces is the text of the final executable.

pub mod codegen;
pub mod elf;
