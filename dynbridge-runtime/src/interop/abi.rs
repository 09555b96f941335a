//! ABI (Application Binary Interface) handling
//!
//! Describes how the current target delivers native arguments and which
//! calling conventions it can honour.

use super::types::Convention;

/// Argument-passing discipline of the compilation target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetAbi {
    /// System V AMD64 ABI (Unix x86-64)
    SysV,
    /// Microsoft x64 calling convention
    Win64,
    /// AArch64 procedure call standard
    Aarch64,
    /// 32-bit x86 on Windows (cdecl and stdcall both exist)
    X86Windows,
    /// 32-bit x86 elsewhere
    X86,
    /// Anything else; treated as a flat stack layout
    Other,
}

/// How a calling convention is realised on a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConventionSupport {
    /// The target has dedicated stubs for it
    Native,
    /// The platform defines it identically to the default convention
    Alias,
    Unsupported,
}

/// Where argument slots are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLayout {
    /// Separate general-purpose and floating register files
    RegisterClass { gp_regs: usize, fp_regs: usize },
    /// One positional register sequence shared by both classes
    Positional { regs: usize },
    /// Everything on the stack
    Flat,
}

impl TargetAbi {
    /// ABI of the target this crate was compiled for
    #[inline]
    pub const fn current() -> Self {
        #[cfg(all(target_arch = "x86_64", target_os = "windows"))]
        return Self::Win64;

        #[cfg(all(target_arch = "x86_64", not(target_os = "windows")))]
        return Self::SysV;

        #[cfg(target_arch = "aarch64")]
        return Self::Aarch64;

        #[cfg(all(target_arch = "x86", target_os = "windows"))]
        return Self::X86Windows;

        #[cfg(all(target_arch = "x86", not(target_os = "windows")))]
        return Self::X86;

        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "x86")))]
        return Self::Other;
    }

    #[inline]
    pub const fn layout(self) -> FrameLayout {
        match self {
            Self::SysV => FrameLayout::RegisterClass { gp_regs: 6, fp_regs: 8 }, // RDI..R9, XMM0-7
            Self::Aarch64 => FrameLayout::RegisterClass { gp_regs: 8, fp_regs: 8 }, // X0-X7, V0-V7
            Self::Win64 => FrameLayout::Positional { regs: 4 }, // RCX/XMM0 .. R9/XMM3
            Self::X86Windows | Self::X86 | Self::Other => FrameLayout::Flat,
        }
    }

    /// Check whether `convention` can be called on this target
    #[inline]
    pub const fn convention_support(self, convention: Convention) -> ConventionSupport {
        match (convention, self) {
            (Convention::Default, _) => ConventionSupport::Native,
            (Convention::CalleeCleanup, Self::X86Windows) => ConventionSupport::Native,
            (Convention::CalleeCleanup, Self::Win64) => ConventionSupport::Alias,
            (Convention::CalleeCleanup, _) => ConventionSupport::Unsupported,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::SysV => "sysv64",
            Self::Win64 => "win64",
            Self::Aarch64 => "aarch64",
            Self::X86Windows => "x86-windows",
            Self::X86 => "x86",
            Self::Other => "other",
        }
    }
}

impl Default for TargetAbi {
    #[inline]
    fn default() -> Self {
        Self::current()
    }
}

/// Location assigned to one argument slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    GpRegister,
    FpRegister,
    Stack,
}

/// Register allocation for one call frame
#[derive(Debug, Clone)]
pub struct RegisterAllocator {
    layout: FrameLayout,
    gp_used: usize,
    fp_used: usize,
    stack_used: usize,
}

impl RegisterAllocator {
    #[inline]
    pub const fn new(abi: TargetAbi) -> Self {
        Self {
            layout: abi.layout(),
            gp_used: 0,
            fp_used: 0,
            stack_used: 0,
        }
    }

    /// Check if the next argument of this class still fits in a register
    #[inline]
    pub fn can_use_register(&self, is_float: bool) -> bool {
        match self.layout {
            FrameLayout::RegisterClass { gp_regs, fp_regs } => {
                if is_float {
                    self.fp_used < fp_regs
                } else {
                    self.gp_used < gp_regs
                }
            }
            FrameLayout::Positional { regs } => self.gp_used + self.fp_used < regs,
            FrameLayout::Flat => false,
        }
    }

    /// Assign the next argument and record where it went
    pub fn place(&mut self, is_float: bool) -> Placement {
        if !self.can_use_register(is_float) {
            self.stack_used += 1;
            return Placement::Stack;
        }
        if is_float {
            self.fp_used += 1;
            Placement::FpRegister
        } else {
            self.gp_used += 1;
            Placement::GpRegister
        }
    }

    #[inline]
    pub fn gp_used(&self) -> usize {
        self.gp_used
    }

    #[inline]
    pub fn fp_used(&self) -> usize {
        self.fp_used
    }

    #[inline]
    pub fn stack_used(&self) -> usize {
        self.stack_used
    }

    /// Reset for new call
    #[inline]
    pub fn reset(&mut self) {
        self.gp_used = 0;
        self.fp_used = 0;
        self.stack_used = 0;
    }
}
