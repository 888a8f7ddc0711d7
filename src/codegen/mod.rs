//! Machine-code emission for the 6502a target.
//!
//! One pass over the AST fills a 256-byte image: code grows from byte
//! zero, static variables live in a fixed region behind it, and string
//! constants sit at the top of memory. Every absolute reference to a
//! static slot is emitted as a two-byte placeholder and resolved by a
//! back-patching pass once emission is done; branch distances are
//! measured from the emitted body, never guessed.

pub mod isa;

use crate::ast::{BinaryOp, Node, NodeKind, TypeName};
use crate::diag::Log;
use crate::error::Position;
use isa::{Opcode, SYSCALL_PRINT_INT, SYSCALL_PRINT_STRING};
use itertools::Itertools;
use std::fmt;
use thiserror::Error;

pub const IMAGE_SIZE: usize = 256;
/// First byte of the static-variable region; code must end below it.
pub const STATIC_START: u16 = 0x003C;
/// First byte of the string heap.
pub const HEAP_START: u16 = 0x00E0;
/// Address of the interned `"true"`, doubling as the true value.
pub const TRUE_ADDR: u16 = 0x00F5;
/// Address of the interned `"false"`, doubling as the false value.
pub const FALSE_ADDR: u16 = 0x00FA;

#[derive(Error, Debug)]
pub enum CodegenErrorKind {
    #[error("Undefined variable '{0}' during code generation")]
    UndefinedVariable(String),
    #[error("Program too large for the 256-byte image")]
    OutOfSpace,
    #[error("String pool exhausted, cannot fit {0:?}")]
    HeapOverflow(String),
    #[error("Cannot concatenate a string variable at compile time")]
    StringConcat,
}

struct CgError {
    kind: CodegenErrorKind,
    position: Position,
}

type CgRes<T> = Result<T, CgError>;

#[derive(Debug, Clone)]
pub struct MemoryMap {
    pub statics: Vec<(String, u16)>,
    pub strings: Vec<(String, u16)>,
}

impl fmt::Display for MemoryMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (name, address) in &self.statics {
            writeln!(f, "{}: 0x{:04X}", name, address)?;
        }
        for (text, address) in &self.strings {
            writeln!(f, "{:?}: 0x{:04X}", text, address)?;
        }
        Ok(())
    }
}

pub struct CodegenOutput {
    pub image: [u8; IMAGE_SIZE],
    pub memory_map: MemoryMap,
    pub log: Log,
}

/// Runs code generation for one semantically-valid sub-program. On an
/// internal failure the sub-program gets the minimal all-BRK image and
/// an ERROR entry; nothing panics.
pub fn generate(ast: &Node) -> CodegenOutput {
    let mut generator = Generator::new();
    match generator.run(ast) {
        Ok(image) => {
            generator.log.info("Code Generation complete");
            CodegenOutput {
                image,
                memory_map: generator.memory_map(),
                log: generator.log,
            }
        }
        Err(error) => {
            generator
                .log
                .error_at(error.kind.to_string(), error.position);
            generator
                .log
                .info("Code Generation aborted, emitting fallback image");
            CodegenOutput {
                image: [0; IMAGE_SIZE],
                memory_map: MemoryMap {
                    statics: Vec::new(),
                    strings: Vec::new(),
                },
                log: generator.log,
            }
        }
    }
}

/// Space-separated uppercase hex bytes, sixteen per line.
pub fn render_image(image: &[u8; IMAGE_SIZE]) -> String {
    image
        .chunks(16)
        .map(|row| row.iter().map(|byte| format!("{:02X}", byte)).join(" "))
        .join("\n")
}

#[derive(Debug, Clone)]
struct StaticSlot {
    name: Option<String>,
    ty: TypeName,
    scope: u32,
    address: u16,
}

#[derive(Debug, Clone, Copy)]
struct Placeholder {
    tag: usize,
    offset: usize,
}

#[derive(Debug, Clone)]
struct PoolEntry {
    text: String,
    address: u16,
    referenced: bool,
}

struct StringPool {
    entries: Vec<PoolEntry>,
    cursor: u16,
}

impl StringPool {
    fn new() -> Self {
        Self {
            entries: vec![
                PoolEntry {
                    text: "true".to_string(),
                    address: TRUE_ADDR,
                    referenced: false,
                },
                PoolEntry {
                    text: "false".to_string(),
                    address: FALSE_ADDR,
                    referenced: false,
                },
            ],
            cursor: HEAP_START,
        }
    }

    /// Address of `text`, allocating on first use. User strings grow
    /// upward from the heap base and must stay below the reserved
    /// boolean spellings.
    fn intern(&mut self, text: &str, position: Position) -> CgRes<u16> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.text == text) {
            entry.referenced = true;
            return Ok(entry.address);
        }
        let address = self.cursor;
        let end = address + text.len() as u16 + 1;
        if end > TRUE_ADDR {
            return Err(CgError {
                kind: CodegenErrorKind::HeapOverflow(text.to_string()),
                position,
            });
        }
        self.entries.push(PoolEntry {
            text: text.to_string(),
            address,
            referenced: true,
        });
        self.cursor = end;
        Ok(address)
    }

    /// Marks the boolean spellings live so their bytes land in the
    /// heap. Called whenever a boolean value is materialized, since any
    /// such value can end up in a print.
    fn mark_booleans(&mut self) {
        for entry in &mut self.entries {
            if entry.address == TRUE_ADDR || entry.address == FALSE_ADDR {
                entry.referenced = true;
            }
        }
    }
}

struct Generator {
    code: Vec<u8>,
    statics: Vec<StaticSlot>,
    placeholders: Vec<Placeholder>,
    pool: StringPool,
    scope_stack: Vec<u32>,
    scope_counter: u32,
    temp_tags: Vec<usize>,
    temps_in_use: usize,
    log: Log,
}

impl Generator {
    fn new() -> Self {
        Self {
            code: Vec::new(),
            statics: Vec::new(),
            placeholders: Vec::new(),
            pool: StringPool::new(),
            scope_stack: vec![0],
            scope_counter: 0,
            temp_tags: Vec::new(),
            temps_in_use: 0,
            log: Log::new(),
        }
    }

    fn run(&mut self, ast: &Node) -> CgRes<[u8; IMAGE_SIZE]> {
        // the accumulator starts every program holding zero; variable
        // declarations rely on it for their default value
        self.emit(&[Opcode::LdaImm.byte(), 0x00]);
        if let NodeKind::Program { body } = &ast.kind {
            self.gen_block(body)?;
        }
        self.emit(&[Opcode::Brk.byte()]);
        self.backpatch(ast.position)?;
        self.finalize(ast.position)
    }

    fn gen_block(&mut self, node: &Node) -> CgRes<()> {
        let NodeKind::Block { statements } = &node.kind else {
            return Ok(());
        };
        self.scope_counter += 1;
        self.scope_stack.push(self.scope_counter);
        if statements.is_empty() {
            self.emit(&[Opcode::Nop.byte()]);
        }
        for statement in statements {
            self.gen_statement(statement)?;
        }
        self.scope_stack.pop();
        Ok(())
    }

    fn gen_statement(&mut self, node: &Node) -> CgRes<()> {
        match &node.kind {
            NodeKind::VarDecl { var_type, name } => {
                let tag = self.new_slot(Some(name.clone()), *var_type);
                // A still holds the default from the prelude
                self.emit_static(Opcode::StaAbs, tag);
                Ok(())
            }
            NodeKind::Assign { target, value } => {
                self.gen_expr_to_a(value)?;
                let NodeKind::Identifier { name } = &target.kind else {
                    return Ok(());
                };
                let tag = self.resolve_slot(name, target.position)?;
                self.emit_static(Opcode::StaAbs, tag);
                Ok(())
            }
            NodeKind::Print { expr } => self.gen_print(expr),
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.gen_if(condition, then_branch, else_branch.as_deref()),
            NodeKind::While { condition, body } => self.gen_while(condition, body),
            NodeKind::Block { .. } => self.gen_block(node),
            // bare expression statements have no effect at runtime
            NodeKind::Identifier { .. }
            | NodeKind::IntLiteral { .. }
            | NodeKind::StringLiteral { .. }
            | NodeKind::BoolLiteral { .. }
            | NodeKind::Binary { .. } => Ok(()),
            NodeKind::Program { .. } => {
                unreachable!("lowering never nests a program in statement position")
            }
        }
    }

    /// Leaves the value of an expression in the accumulator. Boolean
    /// values are represented by the heap address of their spelling.
    fn gen_expr_to_a(&mut self, node: &Node) -> CgRes<()> {
        match &node.kind {
            NodeKind::IntLiteral { value } => {
                self.emit(&[Opcode::LdaImm.byte(), *value]);
                Ok(())
            }
            NodeKind::BoolLiteral { value } => {
                self.pool.mark_booleans();
                self.emit(&[Opcode::LdaImm.byte(), bool_address(*value)]);
                Ok(())
            }
            NodeKind::StringLiteral { value } => {
                let address = self.pool.intern(value, node.position)?;
                self.emit(&[Opcode::LdaImm.byte(), address as u8]);
                Ok(())
            }
            NodeKind::Identifier { name } => {
                let tag = self.resolve_slot(name, node.position)?;
                self.emit_static(Opcode::LdaAbs, tag);
                Ok(())
            }
            NodeKind::Binary { op, .. } if op.is_comparison() => self.gen_compare(node),
            NodeKind::Binary { .. } => {
                if self.expr_type(node) == TypeName::String {
                    let folded = self.fold_string(node)?;
                    let address = self.pool.intern(&folded, node.position)?;
                    self.emit(&[Opcode::LdaImm.byte(), address as u8]);
                    Ok(())
                } else {
                    self.gen_add_chain(node)
                }
            }
            _ => unreachable!("lowering emits no other node in expression position"),
        }
    }

    /// `a + b + c` flattened right-to-left through one temporary: load
    /// the rightmost operand, park it, then fold the rest in with ADC.
    fn gen_add_chain(&mut self, node: &Node) -> CgRes<()> {
        let mut operands = Vec::new();
        flatten_add(node, &mut operands);

        let temp = self.alloc_temp();
        let mut rest = operands.into_iter().rev();
        if let Some(last) = rest.next() {
            self.gen_expr_to_a(last)?;
            self.emit_static(Opcode::StaAbs, temp);
        }
        for operand in rest {
            self.gen_expr_to_a(operand)?;
            self.emit_static(Opcode::AdcAbs, temp);
            self.emit_static(Opcode::StaAbs, temp);
        }
        self.free_temp();
        Ok(())
    }

    /// Comparison result as a boolean pointer in A. The right operand
    /// is evaluated and parked first so a nested comparison inside it
    /// cannot clobber X between the load and the CPX.
    fn gen_compare(&mut self, node: &Node) -> CgRes<()> {
        let NodeKind::Binary { op, lhs, rhs } = &node.kind else {
            return Ok(());
        };

        self.gen_expr_to_a(rhs)?;
        let temp = self.alloc_temp();
        self.emit_static(Opcode::StaAbs, temp);
        self.load_x(lhs)?;
        self.emit_static(Opcode::CpxAbs, temp);
        self.free_temp();

        let (on_mismatch, on_match) = match op {
            BinaryOp::NotEquals => (TRUE_ADDR, FALSE_ADDR),
            _ => (FALSE_ADDR, TRUE_ADDR),
        };
        self.pool.mark_booleans();
        self.emit(&[Opcode::LdaImm.byte(), on_mismatch as u8]);
        self.emit(&[Opcode::Bne.byte(), 0x02]);
        self.emit(&[Opcode::LdaImm.byte(), on_match as u8]);
        Ok(())
    }

    fn load_x(&mut self, node: &Node) -> CgRes<()> {
        match &node.kind {
            NodeKind::IntLiteral { value } => {
                self.emit(&[Opcode::LdxImm.byte(), *value]);
                Ok(())
            }
            NodeKind::BoolLiteral { value } => {
                self.pool.mark_booleans();
                self.emit(&[Opcode::LdxImm.byte(), bool_address(*value)]);
                Ok(())
            }
            NodeKind::StringLiteral { value } => {
                let address = self.pool.intern(value, node.position)?;
                self.emit(&[Opcode::LdxImm.byte(), address as u8]);
                Ok(())
            }
            NodeKind::Identifier { name } => {
                let tag = self.resolve_slot(name, node.position)?;
                self.emit_static(Opcode::LdxAbs, tag);
                Ok(())
            }
            _ => {
                self.gen_expr_to_a(node)?;
                let temp = self.alloc_temp();
                self.emit_static(Opcode::StaAbs, temp);
                self.emit_static(Opcode::LdxAbs, temp);
                self.free_temp();
                Ok(())
            }
        }
    }

    fn gen_print(&mut self, expr: &Node) -> CgRes<()> {
        match &expr.kind {
            NodeKind::IntLiteral { value } => {
                self.emit(&[Opcode::LdyImm.byte(), *value]);
                self.syscall(SYSCALL_PRINT_INT);
                Ok(())
            }
            NodeKind::StringLiteral { value } => {
                let address = self.pool.intern(value, expr.position)?;
                self.emit(&[Opcode::LdyImm.byte(), address as u8]);
                self.syscall(SYSCALL_PRINT_STRING);
                Ok(())
            }
            NodeKind::BoolLiteral { value } => {
                self.pool.mark_booleans();
                self.emit(&[Opcode::LdyImm.byte(), bool_address(*value)]);
                self.syscall(SYSCALL_PRINT_STRING);
                Ok(())
            }
            NodeKind::Identifier { name } => {
                let tag = self.resolve_slot(name, expr.position)?;
                let ty = self.statics[tag].ty;
                self.emit_static(Opcode::LdyAbs, tag);
                match ty {
                    TypeName::Int => self.syscall(SYSCALL_PRINT_INT),
                    TypeName::String => self.syscall(SYSCALL_PRINT_STRING),
                    TypeName::Boolean => {
                        // the stored value is a pointer at "true"/"false"
                        self.pool.mark_booleans();
                        self.syscall(SYSCALL_PRINT_STRING);
                    }
                }
                Ok(())
            }
            NodeKind::Binary { .. } => {
                let ty = self.expr_type(expr);
                self.gen_expr_to_a(expr)?;
                let temp = self.alloc_temp();
                self.emit_static(Opcode::StaAbs, temp);
                self.emit_static(Opcode::LdyAbs, temp);
                self.free_temp();
                match ty {
                    TypeName::Int => self.syscall(SYSCALL_PRINT_INT),
                    _ => self.syscall(SYSCALL_PRINT_STRING),
                }
                Ok(())
            }
            _ => unreachable!("lowering emits no other node in print position"),
        }
    }

    fn gen_if(
        &mut self,
        condition: &Node,
        then_branch: &Node,
        else_branch: Option<&Node>,
    ) -> CgRes<()> {
        let over_then = self.gen_condition_test(condition)?;
        self.gen_block(then_branch)?;
        match else_branch {
            Some(else_branch) => {
                let over_else = self.emit_unconditional_branch();
                self.patch_forward(over_then);
                self.gen_block(else_branch)?;
                self.patch_forward(over_else);
            }
            None => self.patch_forward(over_then),
        }
        Ok(())
    }

    fn gen_while(&mut self, condition: &Node, body: &Node) -> CgRes<()> {
        let loop_start = self.code.len();
        let exit = self.gen_condition_test(condition)?;
        self.gen_block(body)?;
        let back = self.emit_unconditional_branch();
        // relative distance wraps around the 256-byte image, which is
        // exactly the two's complement encoding BNE wants
        self.code[back] = (loop_start.wrapping_sub(back + 1) & 0xFF) as u8;
        self.patch_forward(exit);
        Ok(())
    }

    /// Evaluates the condition, compares it against the true pointer
    /// and emits a BNE with a zeroed distance. Returns the offset of
    /// the distance byte for later patching; the branch is taken (and
    /// the guarded body skipped) exactly when the condition is false.
    fn gen_condition_test(&mut self, condition: &Node) -> CgRes<usize> {
        self.gen_expr_to_a(condition)?;
        let temp = self.alloc_temp();
        self.emit_static(Opcode::StaAbs, temp);
        self.emit(&[Opcode::LdxImm.byte(), TRUE_ADDR as u8]);
        self.emit_static(Opcode::CpxAbs, temp);
        self.free_temp();
        self.emit(&[Opcode::Bne.byte(), 0x00]);
        Ok(self.code.len() - 1)
    }

    /// A branch that is always taken: park 1, compare it with X=0 so Z
    /// is reliably clear, then BNE. Returns the distance-byte offset.
    fn emit_unconditional_branch(&mut self) -> usize {
        let temp = self.alloc_temp();
        self.emit(&[Opcode::LdaImm.byte(), 0x01]);
        self.emit_static(Opcode::StaAbs, temp);
        self.emit(&[Opcode::LdxImm.byte(), 0x00]);
        self.emit_static(Opcode::CpxAbs, temp);
        self.free_temp();
        self.emit(&[Opcode::Bne.byte(), 0x00]);
        self.code.len() - 1
    }

    fn patch_forward(&mut self, operand_offset: usize) {
        self.code[operand_offset] = (self.code.len() - (operand_offset + 1)) as u8;
    }

    fn syscall(&mut self, selector: u8) {
        self.emit(&[Opcode::LdxImm.byte(), selector, Opcode::Sys.byte()]);
    }

    fn emit(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    /// An opcode followed by a two-byte placeholder that the back-patch
    /// pass will overwrite with the slot's little-endian address.
    fn emit_static(&mut self, op: Opcode, tag: usize) {
        self.code.push(op.byte());
        self.placeholders.push(Placeholder {
            tag,
            offset: self.code.len(),
        });
        self.code.extend_from_slice(&[0x00, 0x00]);
    }

    fn new_slot(&mut self, name: Option<String>, ty: TypeName) -> usize {
        let tag = self.statics.len();
        self.statics.push(StaticSlot {
            name,
            ty,
            scope: self.current_scope(),
            address: STATIC_START + tag as u16,
        });
        tag
    }

    fn resolve_slot(&self, name: &str, position: Position) -> CgRes<usize> {
        for &scope in self.scope_stack.iter().rev() {
            let found = self
                .statics
                .iter()
                .position(|slot| slot.scope == scope && slot.name.as_deref() == Some(name));
            if let Some(tag) = found {
                return Ok(tag);
            }
        }
        Err(CgError {
            kind: CodegenErrorKind::UndefinedVariable(name.to_string()),
            position,
        })
    }

    fn alloc_temp(&mut self) -> usize {
        let tag = match self.temp_tags.get(self.temps_in_use) {
            Some(&tag) => tag,
            None => {
                let tag = self.new_slot(None, TypeName::Int);
                self.temp_tags.push(tag);
                tag
            }
        };
        self.temps_in_use += 1;
        tag
    }

    fn free_temp(&mut self) {
        self.temps_in_use -= 1;
    }

    /// Static string concatenation. Only literal operands can be glued
    /// at compile time; a variable operand has no bytes to copy yet.
    fn fold_string(&mut self, node: &Node) -> CgRes<String> {
        match &node.kind {
            NodeKind::StringLiteral { value } => Ok(value.clone()),
            NodeKind::Binary {
                op: BinaryOp::Add,
                lhs,
                rhs,
            } => {
                let mut folded = self.fold_string(lhs)?;
                folded.push_str(&self.fold_string(rhs)?);
                Ok(folded)
            }
            _ => Err(CgError {
                kind: CodegenErrorKind::StringConcat,
                position: node.position,
            }),
        }
    }

    /// Local type reconstruction; the analyzer already proved it
    /// consistent, so leaves decide everything.
    fn expr_type(&self, node: &Node) -> TypeName {
        match &node.kind {
            NodeKind::IntLiteral { .. } => TypeName::Int,
            NodeKind::StringLiteral { .. } => TypeName::String,
            NodeKind::BoolLiteral { .. } => TypeName::Boolean,
            NodeKind::Identifier { name } => self
                .scope_stack
                .iter()
                .rev()
                .find_map(|&scope| {
                    self.statics.iter().find(|slot| {
                        slot.scope == scope && slot.name.as_deref() == Some(name.as_str())
                    })
                })
                .map(|slot| slot.ty)
                .unwrap_or(TypeName::Int),
            NodeKind::Binary { op, lhs, .. } => {
                if op.is_comparison() {
                    TypeName::Boolean
                } else {
                    self.expr_type(lhs)
                }
            }
            _ => TypeName::Int,
        }
    }

    fn current_scope(&self) -> u32 {
        self.scope_stack.last().copied().unwrap_or(0)
    }

    fn backpatch(&mut self, position: Position) -> CgRes<()> {
        if STATIC_START as usize + self.statics.len() > HEAP_START as usize {
            return Err(CgError {
                kind: CodegenErrorKind::OutOfSpace,
                position,
            });
        }
        for placeholder in &self.placeholders {
            let [lo, hi] = self.statics[placeholder.tag].address.to_le_bytes();
            self.code[placeholder.offset] = lo;
            self.code[placeholder.offset + 1] = hi;
        }
        Ok(())
    }

    fn finalize(&self, position: Position) -> CgRes<[u8; IMAGE_SIZE]> {
        if self.code.len() > STATIC_START as usize {
            return Err(CgError {
                kind: CodegenErrorKind::OutOfSpace,
                position,
            });
        }
        let mut image = [0u8; IMAGE_SIZE];
        image[..self.code.len()].copy_from_slice(&self.code);
        for entry in self.pool.entries.iter().filter(|e| e.referenced) {
            let start = entry.address as usize;
            for (i, byte) in entry.text.bytes().enumerate() {
                image[start + i] = byte;
            }
            // the terminating NUL is already there
        }
        Ok(image)
    }

    fn memory_map(&self) -> MemoryMap {
        let statics = self
            .statics
            .iter()
            .filter_map(|slot| slot.name.clone().map(|name| (name, slot.address)))
            .collect();
        let strings = self
            .pool
            .entries
            .iter()
            .filter(|e| e.referenced)
            .sorted_by_key(|e| e.address)
            .map(|e| (e.text.clone(), e.address))
            .collect();
        MemoryMap { statics, strings }
    }
}

const fn bool_address(value: bool) -> u8 {
    if value {
        TRUE_ADDR as u8
    } else {
        FALSE_ADDR as u8
    }
}

fn flatten_add<'n>(node: &'n Node, out: &mut Vec<&'n Node>) {
    match &node.kind {
        NodeKind::Binary {
            op: BinaryOp::Add,
            lhs,
            rhs,
        } => {
            flatten_add(lhs, out);
            out.push(rhs);
        }
        _ => out.push(node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceMetadata;
    use crate::grammar::{lexer::Lexer, Parser};
    use crate::lowering;
    use crate::semantic;

    fn compile(source: &str) -> CodegenOutput {
        let meta = SourceMetadata::new(source);
        let lexed = Lexer::new(&meta).scan();
        let parsed = Parser::new(lexed.tokens, &meta).run();
        assert_eq!(parsed.log.error_count(), 0, "unexpected parse errors");
        let analysis = semantic::analyze(lowering::lower(parsed.cst.as_ref()));
        assert!(!analysis.log.has_errors(), "unexpected semantic errors");
        generate(analysis.ast.as_ref().unwrap())
    }

    const LO: u8 = STATIC_START as u8;

    #[test]
    fn empty_block_image() {
        let out = compile("{}$");
        assert_eq!(&out.image[..4], &[0xA9, 0x00, 0xEA, 0x00]);
        assert!(out.image[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn generation_is_deterministic() {
        let a = compile("{ int a a = 3 print(a) }$");
        let b = compile("{ int a a = 3 print(a) }$");
        assert_eq!(a.image, b.image);
    }

    #[test]
    fn declaration_stores_default_and_lands_at_static_start() {
        let out = compile("{ int a }$");
        assert_eq!(&out.image[..5], &[0xA9, 0x00, 0x8D, LO, 0x00]);
        assert_eq!(out.memory_map.statics, vec![("a".to_string(), STATIC_START)]);
    }

    #[test]
    fn assign_and_print_integer() {
        let out = compile("{ int a a = 3 print(a) }$");
        let expected = [
            0xA9, 0x00, // prelude
            0x8D, LO, 0x00, // int a
            0xA9, 0x03, 0x8D, LO, 0x00, // a = 3
            0xAC, LO, 0x00, 0xA2, 0x01, 0xFF, // print(a)
            0x00, // brk
        ];
        assert_eq!(&out.image[..expected.len()], &expected);
        assert_eq!(out.memory_map.statics, vec![("a".to_string(), 0x003C)]);
    }

    #[test]
    fn addition_chain_folds_through_a_temp() {
        let out = compile("{ int a a = 1 + 2 }$");
        let temp = STATIC_START as u8 + 1;
        let expected = [
            0xA9, 0x00, 0x8D, LO, 0x00, // int a
            0xA9, 0x02, 0x8D, temp, 0x00, // rightmost operand parked
            0xA9, 0x01, 0x6D, temp, 0x00, 0x8D, temp, 0x00, // 1 + temp
            0x8D, LO, 0x00, // a = result
            0x00,
        ];
        assert_eq!(&out.image[..expected.len()], &expected);
    }

    #[test]
    fn string_literal_lands_at_heap_start() {
        let out = compile("{ print(\"hi\") }$");
        assert_eq!(out.image[0xE0], b'h');
        assert_eq!(out.image[0xE1], b'i');
        assert_eq!(out.image[0xE2], 0x00);
        // LDY #$E0 / LDX #$02 / SYS
        let code = &out.image[..8];
        assert_eq!(code[2..8], [0xA0, 0xE0, 0xA2, 0x02, 0xFF, 0x00]);
        assert_eq!(
            out.memory_map.strings,
            vec![("hi".to_string(), HEAP_START)]
        );
    }

    #[test]
    fn string_literals_are_interned_once() {
        let out = compile("{ print(\"hi\") print(\"hi\") }$");
        assert_eq!(out.memory_map.strings.len(), 1);
    }

    #[test]
    fn comparison_emits_cpx_bne_fragment() {
        let out = compile("{ if (1 == 1) { print(\"hi\") } }$");
        let code: Vec<u8> = out.image.to_vec();
        let cpx_at = code
            .iter()
            .position(|&b| b == Opcode::CpxAbs.byte())
            .expect("no CPX emitted");
        assert!(code[cpx_at..].contains(&Opcode::Bne.byte()));
        // "hi" interned at the heap base, printed by address
        assert_eq!(out.image[0xE0], b'h');
        assert!(code.windows(3).any(|w| w == [0xA0, 0xE0, 0xA2]));
    }

    #[test]
    fn true_literal_is_the_true_string_address() {
        let out = compile("{ boolean b b = true }$");
        assert!(out
            .image
            .windows(2)
            .any(|w| w == [0xA9, TRUE_ADDR as u8]));
        // spelling bytes are live once a boolean exists
        assert_eq!(&out.image[0xF5..0xFA], b"true\0");
        assert_eq!(&out.image[0xFA..0x100], b"false\0");
    }

    #[test]
    fn untouched_heap_stays_zero() {
        let out = compile("{ int a }$");
        assert!(out.image[HEAP_START as usize..].iter().all(|&b| b == 0));
    }

    #[test]
    fn if_branch_distance_covers_exactly_the_body() {
        let out = compile("{ if (1 == 1) { print(\"hi\") } }$");
        let code = out.image;
        // locate the condition-test BNE: the last BNE before the print
        let print_at = code
            .windows(3)
            .position(|w| w == [0xA0, 0xE0, 0xA2])
            .unwrap();
        let bne_at = (0..print_at)
            .rev()
            .find(|&i| code[i] == Opcode::Bne.byte())
            .unwrap();
        let distance = code[bne_at + 1] as usize;
        // branch target is the BRK right after the then-body
        assert_eq!(code[bne_at + 2 + distance], Opcode::Brk.byte());
        assert_eq!(distance, 5);
    }

    #[test]
    fn while_loops_back_with_twos_complement() {
        let out = compile("{ int a while (a == 0) { a = 1 } }$");
        let code = out.image;
        // the backward branch is the last BNE in the code region
        let back_at = (0..STATIC_START as usize)
            .rev()
            .find(|&i| code[i] == Opcode::Bne.byte() && code[i + 1] >= 0x80)
            .expect("no backward branch");
        let distance = code[back_at + 1] as i8 as isize;
        let target = (back_at as isize + 2 + distance) as usize;
        // the loop re-tests the condition: target is the LDA of the
        // comparison's right operand (0)
        assert_eq!(code[target], Opcode::LdaImm.byte());
        assert_eq!(code[target + 1], 0x00);
    }

    #[test]
    fn else_branch_is_skipped_by_an_unconditional_hop() {
        let out = compile("{ if (1 == 2) { print(\"a\") } else { print(\"b\") } }$");
        // both strings are in the pool, "a" first
        assert_eq!(
            out.memory_map.strings,
            vec![
                ("a".to_string(), 0x00E0),
                ("b".to_string(), 0x00E2),
            ]
        );
    }

    #[test]
    fn string_variable_concatenation_aborts_to_fallback() {
        let out = compile("{ string s s = \"a\" string t t = s + \"b\" }$");
        assert!(out.image.iter().all(|&b| b == 0));
        assert!(out.log.has_errors());
    }

    #[test]
    fn literal_concatenation_folds_at_compile_time() {
        let out = compile("{ string s s = \"ab\" + \"cd\" }$");
        assert_eq!(
            out.memory_map.strings,
            vec![("abcd".to_string(), HEAP_START)]
        );
        assert_eq!(&out.image[0xE0..0xE5], b"abcd\0");
    }

    #[test]
    fn shadowed_variables_get_distinct_slots() {
        let out = compile("{ int a { int a a = 1 } a = 2 }$");
        assert_eq!(out.memory_map.statics.len(), 2);
        assert_eq!(out.memory_map.statics[0].1, STATIC_START);
        assert_eq!(out.memory_map.statics[1].1, STATIC_START + 1);
    }

    #[test]
    fn oversized_program_aborts_to_fallback() {
        // enough statements to overflow the 0x3C-byte code region
        let body = "print(1) ".repeat(12);
        let source = format!("{{ {} }}$", body);
        let out = compile(&source);
        assert!(out.log.has_errors());
        assert!(out.image.iter().all(|&b| b == 0));
    }

    #[test]
    fn hex_dump_is_sixteen_wide_uppercase() {
        let out = compile("{}$");
        let dump = render_image(&out.image);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 16);
        assert!(lines[0].starts_with("A9 00 EA 00"));
        assert_eq!(lines[0].split(' ').count(), 16);
    }
}
