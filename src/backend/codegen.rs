// Code generator for bfc
// Translates the AST into a flat buffer of i386 machine code.
//
// The emitted program keeps its data tape on the process stack with ESP
// as the data pointer. The stack grows down, so > moves the pointer to a
// lower address (dec esp) and < to a higher one (inc esp). Cell
// arithmetic uses byte-sized inc/dec/add/sub on [esp], which wraps
// modulo 256 in hardware.

use thiserror::Error;

use crate::frontend::ast::{Node, Program};

/// Dwords the prologue zeroes below the initial ESP: 1 MiB of tape.
const TAPE_DWORDS: u32 = 0x40000;

/// Bytes a loop adds around its body: cmp (4) + je (6) + jmp (5).
const LOOP_OVERHEAD: usize = 15;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodegenError {
    #[error("loop body exceeds maximum jump displacement")]
    DisplacementOverflow,
}

pub struct CodeGenerator {
    code: Vec<u8>,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    /// Translate a whole program: prologue, every node, exit(0) epilogue.
    /// All jumps are resolved by the time this returns.
    pub fn generate(mut self, program: &Program) -> Result<Vec<u8>, CodegenError> {
        self.emit_prologue();
        self.emit_nodes(&program.nodes)?;
        self.emit_epilogue();

        log::debug!("generated {} bytes of machine code", self.code.len());
        Ok(self.code)
    }

    /// Zero the tape: 0x40000 dwords downward from the initial ESP.
    /// This leaves the direction flag set; nothing emitted afterwards
    /// uses a string instruction, so it never needs clearing.
    fn emit_prologue(&mut self) {
        // xor eax, eax
        self.emit(&[0x31, 0xC0]);
        // mov ecx, TAPE_DWORDS
        self.emit(&[0xB9]);
        self.emit_u32(TAPE_DWORDS);
        // mov edi, esp
        self.emit(&[0x89, 0xE7]);
        // std
        self.emit(&[0xFD]);
        // rep stosd
        self.emit(&[0xF3, 0xAB]);
    }

    /// sys_exit(0).
    fn emit_epilogue(&mut self) {
        // xor eax, eax / inc eax
        self.emit(&[0x31, 0xC0, 0x40]);
        // xor ebx, ebx
        self.emit(&[0x31, 0xDB]);
        // int 0x80
        self.emit(&[0xCD, 0x80]);
    }

    fn emit_nodes(&mut self, nodes: &[Node]) -> Result<(), CodegenError> {
        for node in nodes {
            self.emit_node(node)?;
        }
        Ok(())
    }

    fn emit_node(&mut self, node: &Node) -> Result<(), CodegenError> {
        match node {
            Node::IncPtr(count) => self.emit_inc_ptr(*count),
            Node::DecPtr(count) => self.emit_dec_ptr(*count),
            Node::IncByte(count) => self.emit_inc_byte(*count),
            Node::DecByte(count) => self.emit_dec_byte(*count),
            Node::Output => self.emit_output(),
            Node::Input => self.emit_input(),
            Node::Loop(body) => self.emit_loop(body)?,
        }
        Ok(())
    }

    // ========== Pointer and byte commands ==========
    //
    // Instruction lengths depend only on the node variant and on whether
    // the count is 1, so every node's size is known up front and loop
    // displacements can be computed in a single pass.

    fn emit_inc_ptr(&mut self, count: u8) {
        if count == 1 {
            // dec esp
            self.emit(&[0x4C]);
        } else {
            // sub esp, imm8
            self.emit(&[0x83, 0xEC, count]);
        }
    }

    fn emit_dec_ptr(&mut self, count: u8) {
        if count == 1 {
            // inc esp
            self.emit(&[0x44]);
        } else {
            // add esp, imm8
            self.emit(&[0x83, 0xC4, count]);
        }
    }

    fn emit_inc_byte(&mut self, count: u8) {
        if count == 1 {
            // inc byte [esp]
            self.emit(&[0xFE, 0x04, 0x24]);
        } else {
            // add byte [esp], imm8
            self.emit(&[0x80, 0x04, 0x24, count]);
        }
    }

    fn emit_dec_byte(&mut self, count: u8) {
        if count == 1 {
            // dec byte [esp]
            self.emit(&[0xFE, 0x0C, 0x24]);
        } else {
            // sub byte [esp], imm8
            self.emit(&[0x80, 0x2C, 0x24, count]);
        }
    }

    // ========== I/O commands ==========

    /// write(stdout, esp, 1)
    fn emit_output(&mut self) {
        // mov eax, 4 (sys_write)
        self.emit(&[0xB8]);
        self.emit_u32(4);
        // mov ebx, 1 (stdout)
        self.emit(&[0xBB]);
        self.emit_u32(1);
        // mov ecx, esp
        self.emit(&[0x89, 0xE1]);
        // mov edx, 1
        self.emit(&[0xBA]);
        self.emit_u32(1);
        // int 0x80
        self.emit(&[0xCD, 0x80]);
    }

    /// read(stdin, esp, 1)
    fn emit_input(&mut self) {
        // mov eax, 3 (sys_read)
        self.emit(&[0xB8]);
        self.emit_u32(3);
        // mov ebx, 0 (stdin)
        self.emit(&[0xBB]);
        self.emit_u32(0);
        // mov ecx, esp
        self.emit(&[0x89, 0xE1]);
        // mov edx, 1
        self.emit(&[0xBA]);
        self.emit_u32(1);
        // int 0x80
        self.emit(&[0xCD, 0x80]);
    }

    // ========== Loops ==========

    /// Compile [body] as:
    ///
    ///   start: cmp byte [esp], 0
    ///          je   end            ; forward over body + jmp
    ///          <body>
    ///          jmp  start          ; back over body + cmp + je + itself
    ///   end:
    ///
    /// The body is emitted into its own buffer first, so an inner loop has
    /// resolved its jumps before the outer loop measures it. No patch list.
    fn emit_loop(&mut self, body: &[Node]) -> Result<(), CodegenError> {
        let mut inner = CodeGenerator::new();
        inner.emit_nodes(body)?;
        let body_code = inner.code;

        if body_code.len() + LOOP_OVERHEAD > i32::MAX as usize {
            return Err(CodegenError::DisplacementOverflow);
        }
        let body_len = body_code.len() as i32;

        // cmp byte [esp], 0
        self.emit(&[0x80, 0x3C, 0x24, 0x00]);
        // je rel32, past the body and the trailing jmp
        self.emit(&[0x0F, 0x84]);
        self.emit_i32(body_len + 5);

        self.emit(&body_code);

        // jmp rel32, back to the cmp
        self.emit(&[0xE9]);
        self.emit_i32(-(body_len + LOOP_OVERHEAD as i32));

        Ok(())
    }

    // ========== Raw emission helpers ==========

    #[inline]
    fn emit(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    #[inline]
    fn emit_u32(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    #[inline]
    fn emit_i32(&mut self, value: i32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}
