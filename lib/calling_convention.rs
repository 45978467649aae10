//! Information about varying calling conventions.
//!
//! A `CallingConvention` is a name bound to a behavior table. Architectures
//! expose their conventions by name, and platforms register those
//! conventions under roles. Nothing in this module knows about roles.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A named register of a given width in bits.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Register {
    name: String,
    bits: usize,
}

impl Register {
    pub fn new<S: Into<String>>(name: S, bits: usize) -> Register {
        Register {
            name: name.into(),
            bits,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bits(&self) -> usize {
        self.bits
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.bits)
    }
}

/// Convenience function to create a new `Register`.
pub fn register<S: Into<String>>(name: S, bits: usize) -> Register {
    Register::new(name, bits)
}

fn registers(names: &[&str], bits: usize) -> Vec<Register> {
    names.iter().map(|name| register(*name, bits)).collect()
}

fn register_set(names: &[&str], bits: usize) -> HashSet<Register> {
    names.iter().map(|name| register(*name, bits)).collect()
}

/// Available type of calling conventions
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum CallingConventionType {
    /// 32-bit x86, all arguments on the stack, caller cleans up.
    Cdecl,
    /// 32-bit x86, all arguments on the stack, callee cleans up.
    Stdcall,
    /// 32-bit x86, first two arguments in `ecx` and `edx`.
    Fastcall,
    /// 32-bit x86, `this` in `ecx`.
    Thiscall,
    /// 32-bit x86, GCC `regparm(3)`, first three arguments in registers.
    Regparm,
    /// The System V ABI for 64-bit x86.
    Amd64SystemV,
    /// The Microsoft x64 ABI.
    Win64,
    /// The procedure call standard for 32-bit ARM, in either instruction mode.
    Aapcs,
    /// The procedure call standard for 64-bit ARM.
    Aapcs64,
}

impl CallingConventionType {
    /// The name architectures expose this convention under.
    pub fn name(&self) -> &'static str {
        match self {
            CallingConventionType::Cdecl
            | CallingConventionType::Aapcs
            | CallingConventionType::Aapcs64 => "cdecl",
            CallingConventionType::Stdcall => "stdcall",
            CallingConventionType::Fastcall => "fastcall",
            CallingConventionType::Thiscall => "thiscall",
            CallingConventionType::Regparm => "regparm",
            CallingConventionType::Amd64SystemV => "sysv",
            CallingConventionType::Win64 => "win64",
        }
    }
}

/// Who removes stack arguments once a call returns.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum StackCleanup {
    Caller,
    Callee,
}

/// The return type for a function.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ReturnAddressType {
    /// Functions return by loading an address from a register.
    Register(Register),
    /// Functions return by loading an address from the stack.
    ///
    /// The offset to the return address at function call/entry is given.
    Stack(usize),
}

impl ReturnAddressType {
    pub fn register(&self) -> Option<&Register> {
        match self {
            ReturnAddressType::Register(register) => Some(register),
            ReturnAddressType::Stack(_) => None,
        }
    }

    pub fn stack(&self) -> Option<usize> {
        match self {
            ReturnAddressType::Stack(offset) => Some(*offset),
            ReturnAddressType::Register(_) => None,
        }
    }
}

/// The type of an argument.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ArgumentType {
    /// The argument is held in a register.
    Register(Register),

    /// The argument is held in a stack offset.
    ///
    /// The stack offset is given at function call/entry.
    Stack(usize),
}

impl ArgumentType {
    pub fn register(&self) -> Option<&Register> {
        match self {
            ArgumentType::Register(register) => Some(register),
            ArgumentType::Stack(_) => None,
        }
    }

    pub fn stack(&self) -> Option<usize> {
        match self {
            ArgumentType::Stack(offset) => Some(*offset),
            ArgumentType::Register(_) => None,
        }
    }
}

/// A named calling convention and the behavior it describes.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CallingConvention {
    name: String,

    typ: CallingConventionType,

    /// arguments passed in registers.
    argument_registers: Vec<Register>,

    /// These registers are preserved across function calls.
    preserved_registers: HashSet<Register>,

    /// These registers are not preserved across function calls.
    trashed_registers: HashSet<Register>,

    /// Offset from function start where first argument on stack is found.
    ///
    /// After register arguments are exhausted, analysis will begin looking
    /// here.
    stack_argument_offset: usize,

    /// Length of an argument on the stack in bytes.
    stack_argument_length: usize,

    /// The return address is given in the following type.
    return_address_type: ReturnAddressType,

    /// The register the returned value is given in.
    return_register: Register,

    stack_cleanup: StackCleanup,
}

impl CallingConvention {
    /// Create a new `CallingConvention` based on the given
    /// `CallingConventionType`, named after that type.
    pub fn new(typ: CallingConventionType) -> CallingConvention {
        CallingConvention::with_name(typ.name(), typ)
    }

    /// Create a new `CallingConvention` with the behavior of the given
    /// `CallingConventionType`, exposed under a different name.
    pub fn with_name<S: Into<String>>(name: S, typ: CallingConventionType) -> CallingConvention {
        let x86_preserved = &["ebx", "edi", "esi", "ebp", "esp"];
        let x86_trashed = &["eax", "ecx", "edx"];

        let (
            argument_registers,
            preserved_registers,
            trashed_registers,
            stack_argument_offset,
            stack_argument_length,
            return_address_type,
            return_register,
            stack_cleanup,
        ) = match typ {
            CallingConventionType::Cdecl => (
                Vec::new(),
                register_set(x86_preserved, 32),
                register_set(x86_trashed, 32),
                4,
                4,
                ReturnAddressType::Stack(0),
                register("eax", 32),
                StackCleanup::Caller,
            ),
            CallingConventionType::Stdcall => (
                Vec::new(),
                register_set(x86_preserved, 32),
                register_set(x86_trashed, 32),
                4,
                4,
                ReturnAddressType::Stack(0),
                register("eax", 32),
                StackCleanup::Callee,
            ),
            CallingConventionType::Fastcall => (
                registers(&["ecx", "edx"], 32),
                register_set(x86_preserved, 32),
                register_set(x86_trashed, 32),
                4,
                4,
                ReturnAddressType::Stack(0),
                register("eax", 32),
                StackCleanup::Callee,
            ),
            CallingConventionType::Thiscall => (
                registers(&["ecx"], 32),
                register_set(x86_preserved, 32),
                register_set(x86_trashed, 32),
                4,
                4,
                ReturnAddressType::Stack(0),
                register("eax", 32),
                StackCleanup::Callee,
            ),
            CallingConventionType::Regparm => (
                registers(&["eax", "edx", "ecx"], 32),
                register_set(x86_preserved, 32),
                register_set(x86_trashed, 32),
                4,
                4,
                ReturnAddressType::Stack(0),
                register("eax", 32),
                StackCleanup::Caller,
            ),
            CallingConventionType::Amd64SystemV => (
                registers(&["rdi", "rsi", "rdx", "rcx", "r8", "r9"], 64),
                register_set(&["rbx", "r12", "r13", "r14", "r15", "rbp", "rsp"], 64),
                register_set(
                    &[
                        "rax", "rcx", "rdx", "rdi", "rsi", "r8", "r9", "r10", "r11",
                    ],
                    64,
                ),
                8,
                8,
                ReturnAddressType::Stack(0),
                register("rax", 64),
                StackCleanup::Caller,
            ),
            // 32 bytes of shadow space sit between the return address and the
            // first stack argument.
            CallingConventionType::Win64 => (
                registers(&["rcx", "rdx", "r8", "r9"], 64),
                register_set(
                    &[
                        "rbx", "rbp", "rdi", "rsi", "rsp", "r12", "r13", "r14", "r15",
                    ],
                    64,
                ),
                register_set(&["rax", "rcx", "rdx", "r8", "r9", "r10", "r11"], 64),
                40,
                8,
                ReturnAddressType::Stack(0),
                register("rax", 64),
                StackCleanup::Caller,
            ),
            CallingConventionType::Aapcs => (
                registers(&["r0", "r1", "r2", "r3"], 32),
                register_set(
                    &["r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "sp"],
                    32,
                ),
                register_set(&["r0", "r1", "r2", "r3", "r12", "lr"], 32),
                0,
                4,
                ReturnAddressType::Register(register("lr", 32)),
                register("r0", 32),
                StackCleanup::Caller,
            ),
            CallingConventionType::Aapcs64 => {
                let trashed_registers = (0..19)
                    .map(|i| register(format!("x{}", i), 64))
                    .chain(std::iter::once(register("x30", 64)))
                    .collect::<HashSet<Register>>();

                let preserved_registers = (19..30)
                    .map(|i| register(format!("x{}", i), 64))
                    .chain(std::iter::once(register("sp", 64)))
                    .collect::<HashSet<Register>>();

                (
                    registers(&["x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7"], 64),
                    preserved_registers,
                    trashed_registers,
                    0,
                    8,
                    ReturnAddressType::Register(register("x30", 64)),
                    register("x0", 64),
                    StackCleanup::Caller,
                )
            }
        };

        CallingConvention {
            name: name.into(),
            typ,
            argument_registers,
            preserved_registers,
            trashed_registers,
            stack_argument_offset,
            stack_argument_length,
            return_address_type,
            return_register,
            stack_cleanup,
        }
    }

    /// The name this convention is looked up by.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The behavior table this convention was built from.
    pub fn typ(&self) -> CallingConventionType {
        self.typ
    }

    /// Get the registers the first n arguments are passed in.
    pub fn argument_registers(&self) -> &[Register] {
        &self.argument_registers
    }

    /// Get the registers preserved across function calls.
    pub fn preserved_registers(&self) -> &HashSet<Register> {
        &self.preserved_registers
    }

    /// Get the registers trashed across function calls.
    pub fn trashed_registers(&self) -> &HashSet<Register> {
        &self.trashed_registers
    }

    /// Get the length of an argument on the stack in _bytes, not bits_.
    ///
    /// We would expect this to be natural register-width of the architecture.
    pub fn stack_argument_length(&self) -> usize {
        self.stack_argument_length
    }

    /// Get the stack offset to the first argument passed on the stack in
    /// _bytes, not bits_.
    pub fn stack_argument_offset(&self) -> usize {
        self.stack_argument_offset
    }

    /// How the return address is specified for function calls.
    pub fn return_address_type(&self) -> &ReturnAddressType {
        &self.return_address_type
    }

    /// The register returned values is given in.
    pub fn return_register(&self) -> &Register {
        &self.return_register
    }

    /// Whether the caller or the callee removes stack arguments.
    pub fn stack_cleanup(&self) -> StackCleanup {
        self.stack_cleanup
    }

    /// Get the type for the given argument, starting with 0 index.
    pub fn argument_type(&self, argument_number: usize) -> ArgumentType {
        match self.argument_registers.get(argument_number) {
            Some(register) => ArgumentType::Register(register.clone()),
            None => {
                let n = argument_number - self.argument_registers.len();
                let offset = self.stack_argument_offset + (self.stack_argument_length * n);
                ArgumentType::Stack(offset)
            }
        }
    }

    /// Is the given register preserved.
    pub fn is_preserved(&self, register: &Register) -> Option<bool> {
        if self.preserved_registers.contains(register) {
            Some(true)
        } else if self.trashed_registers.contains(register) {
            Some(false)
        } else {
            None
        }
    }

    /// Is the given register trashed.
    pub fn is_trashed(&self, register: &Register) -> Option<bool> {
        self.is_preserved(register).map(|preserved| !preserved)
    }
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
