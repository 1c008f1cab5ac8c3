mod chunk;
mod compiler;

use log::trace;

use crate::error::SharedErrorReporter;
use crate::object::Object;

pub use chunk::{Chunk, OpCode};
pub use compiler::Compiler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

const STACK_MAX: usize = 256;

/// Stack machine over a `Chunk`. The value stack starts at a nominal
/// capacity, doubles when full and shrinks back (never below the initial
/// size) once usage drops to a quarter.
pub struct Vm {
    stack: Vec<Object>,
    error_reporter: Option<SharedErrorReporter>,
}

impl Vm {
    pub fn new() -> Self {
        Self { stack: Vec::with_capacity(STACK_MAX), error_reporter: None }
    }

    pub fn with_error_reporting(self, error_reporter: SharedErrorReporter) -> Self {
        Self { error_reporter: Some(error_reporter), ..self }
    }

    /// Compile the source to a fresh chunk and run it.
    pub fn interpret_source(&mut self, source: &str) -> InterpretResult {
        let mut chunk = Chunk::new();
        let mut compiler = Compiler::new(&mut chunk);
        if let Some(reporter) = self.error_reporter.as_ref() {
            compiler = compiler.with_error_reporting(reporter.clone());
        }

        if !compiler.compile(source) {
            return InterpretResult::CompileError;
        }

        self.interpret_chunk(&chunk)
    }

    /// Run an existing chunk from its first byte.
    pub fn interpret_chunk(&mut self, chunk: &Chunk) -> InterpretResult {
        self.run(chunk)
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    fn run(&mut self, chunk: &Chunk) -> InterpretResult {
        let mut ip = 0usize;

        while ip < chunk.len() {
            if log::log_enabled!(log::Level::Trace) {
                let (text, _) = chunk.disassemble_instruction(ip);
                trace!("{}", text);
            }

            let op_offset = ip;
            let byte = chunk.code[ip];
            ip += 1;

            let Some(op) = OpCode::from_byte(byte) else {
                self.runtime_error(chunk, op_offset, &format!("Unknown opcode {byte}."));
                self.reset_stack();
                return InterpretResult::RuntimeError;
            };

            let result = match op {
                OpCode::Constant => {
                    let index = chunk.code.get(ip).copied().unwrap_or(0) as usize;
                    ip += 1;
                    self.push_constant(chunk, op_offset, index)
                }
                OpCode::ConstantLong => {
                    let index = chunk.read_long_index(ip);
                    ip += 3;
                    self.push_constant(chunk, op_offset, index)
                }
                OpCode::Nil => {
                    self.push(Object::Null);
                    Ok(())
                }
                OpCode::True => {
                    self.push(Object::Boolean(true));
                    Ok(())
                }
                OpCode::False => {
                    self.push(Object::Boolean(false));
                    Ok(())
                }
                OpCode::Negate => self.unary_op(chunk, op_offset, Object::try_neg),
                OpCode::Not => self.unary_op(chunk, op_offset, Object::try_not),
                OpCode::Add => self.binary_op(chunk, op_offset, Object::try_add),
                OpCode::Subtract => self.binary_op(chunk, op_offset, Object::try_sub),
                OpCode::Multiply => self.binary_op(chunk, op_offset, Object::try_mul),
                OpCode::Divide => self.binary_op(chunk, op_offset, Object::try_div),
                OpCode::Equal => self.binary_op(chunk, op_offset, Object::try_equal),
                OpCode::Greater => self.binary_op(chunk, op_offset, Object::try_greater),
                OpCode::Less => self.binary_op(chunk, op_offset, Object::try_less),
                OpCode::Return => {
                    return match self.pop() {
                        Some(value) => {
                            println!("{value}");
                            InterpretResult::Ok
                        }
                        None => {
                            self.runtime_error(chunk, op_offset, "Stack underflow.");
                            InterpretResult::RuntimeError
                        }
                    };
                }
            };

            if let Err(result) = result {
                return result;
            }
        }

        // Fell off the end without OP_RETURN.
        InterpretResult::RuntimeError
    }

    fn push_constant(
        &mut self,
        chunk: &Chunk,
        op_offset: usize,
        index: usize,
    ) -> Result<(), InterpretResult> {
        match chunk.constants.get(index) {
            Some(value) => {
                self.push(value.clone());
                Ok(())
            }
            None => {
                self.runtime_error(chunk, op_offset, "Constant index out of range.");
                self.reset_stack();
                Err(InterpretResult::RuntimeError)
            }
        }
    }

    fn unary_op(
        &mut self,
        chunk: &Chunk,
        op_offset: usize,
        op: fn(&Object) -> Result<Object, String>,
    ) -> Result<(), InterpretResult> {
        let Some(value) = self.pop() else {
            self.runtime_error(chunk, op_offset, "Stack underflow.");
            return Err(InterpretResult::RuntimeError);
        };

        match op(&value) {
            Ok(result) => {
                self.push(result);
                Ok(())
            }
            Err(msg) => {
                self.runtime_error(chunk, op_offset, &msg);
                self.reset_stack();
                Err(InterpretResult::RuntimeError)
            }
        }
    }

    fn binary_op(
        &mut self,
        chunk: &Chunk,
        op_offset: usize,
        op: fn(&Object, &Object) -> Result<Object, String>,
    ) -> Result<(), InterpretResult> {
        let (Some(right), Some(left)) = (self.pop(), self.pop()) else {
            self.runtime_error(chunk, op_offset, "Stack underflow.");
            return Err(InterpretResult::RuntimeError);
        };

        match op(&left, &right) {
            Ok(result) => {
                self.push(result);
                Ok(())
            }
            Err(msg) => {
                self.runtime_error(chunk, op_offset, &msg);
                self.reset_stack();
                Err(InterpretResult::RuntimeError)
            }
        }
    }

    fn push(&mut self, value: Object) {
        if self.stack.len() == self.stack.capacity() {
            self.stack.reserve_exact(self.stack.capacity().max(STACK_MAX));
        }
        self.stack.push(value);
    }

    fn pop(&mut self) -> Option<Object> {
        let value = self.stack.pop();

        let capacity = self.stack.capacity();
        if capacity > STACK_MAX && self.stack.len() <= capacity / 4 {
            self.stack.shrink_to((capacity / 2).max(STACK_MAX));
        }

        value
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
    }

    fn runtime_error(&self, chunk: &Chunk, offset: usize, message: &str) {
        if let Some(reporter) = self.error_reporter.as_ref() {
            reporter.borrow_mut().runtime_error_at(
                chunk.line(offset),
                chunk.column(offset),
                message,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorReporter;

    fn run_source(source: &str) -> InterpretResult {
        Vm::new().interpret_source(source)
    }

    #[test]
    fn runs_a_compiled_expression() {
        assert_eq!(run_source("1 + 2 * 3"), InterpretResult::Ok);
    }

    #[test]
    fn compile_errors_refuse_to_run() {
        assert_eq!(run_source("1 +"), InterpretResult::CompileError);
        assert_eq!(run_source("(1"), InterpretResult::CompileError);
    }

    #[test]
    fn stack_is_balanced_after_a_run() {
        let mut vm = Vm::new();
        assert_eq!(vm.interpret_source("(1 + 2) * -3 == -9"), InterpretResult::Ok);
        assert_eq!(vm.stack_len(), 0);
    }

    #[test]
    fn type_errors_reset_the_stack() {
        let reporter = ErrorReporter::new().as_shared();
        let mut vm = Vm::new().with_error_reporting(reporter.clone());
        assert_eq!(vm.interpret_source("1 + true"), InterpretResult::RuntimeError);
        assert_eq!(vm.stack_len(), 0);
        assert!(reporter.borrow().had_runtime_error);
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let reporter = ErrorReporter::new().as_shared();
        let mut vm = Vm::new().with_error_reporting(reporter.clone());
        assert_eq!(vm.interpret_source("1 / 0"), InterpretResult::RuntimeError);
        let messages = reporter.borrow().messages().to_vec();
        assert!(messages[0].contains("RuntimeError: Division by zero."));
    }

    #[test]
    fn runs_a_hand_written_chunk() {
        let mut chunk = Chunk::new();
        chunk.write_constant(Object::Int(40), 1, 1);
        chunk.write_constant(Object::Int(2), 1, 6);
        chunk.write_op(OpCode::Add, 1, 4);
        chunk.write_op(OpCode::Return, 1, 8);

        let mut vm = Vm::new();
        assert_eq!(vm.interpret_chunk(&chunk), InterpretResult::Ok);
        assert_eq!(vm.stack_len(), 0);
    }

    #[test]
    fn long_constants_execute_like_short_ones() {
        let mut chunk = Chunk::new();
        // Fill the pool past the one-byte range, then add the operands.
        for i in 0..300 {
            chunk.add_constant(Object::Int(i));
        }
        chunk.write_constant(Object::Int(20), 1, 1);
        chunk.write_constant(Object::Int(22), 1, 6);
        chunk.write_op(OpCode::Add, 1, 4);
        chunk.write_op(OpCode::Return, 1, 8);

        let mut vm = Vm::new();
        assert_eq!(vm.interpret_chunk(&chunk), InterpretResult::Ok);
    }

    #[test]
    fn chunk_without_return_is_a_runtime_error() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Nil, 1, 1);
        assert_eq!(Vm::new().interpret_chunk(&chunk), InterpretResult::RuntimeError);
    }

    #[test]
    fn deep_stacks_grow_and_shrink() {
        let mut chunk = Chunk::new();
        for _ in 0..1000 {
            chunk.write_op(OpCode::Nil, 1, 1);
        }
        // Each OP_EQUAL pops two and pushes one; only the final pop prints.
        for _ in 0..999 {
            chunk.write_op(OpCode::Equal, 1, 1);
        }
        chunk.write_op(OpCode::Return, 1, 1);

        let mut vm = Vm::new();
        assert_eq!(vm.interpret_chunk(&chunk), InterpretResult::Ok);
        assert_eq!(vm.stack_len(), 0);
    }
}
