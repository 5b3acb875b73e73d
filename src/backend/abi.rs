//! ARM registers and AAPCS constants.

use std::fmt;

/// A 32-bit ARM register.
///
/// `r0`–`r3` pass arguments and results (AAPCS); `r4`–`r11` are callee-saved
/// and form the allocator pool; `ip`, `sp`, `lr`, `pc` keep their
/// conventional names in the rendered assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    R0, R1, R2, R3, R4, R5, R6, R7,
    R8, R9, R10, R11, Ip, Sp, Lr, Pc,
}

impl Reg {
    /// Argument/result registers, in argument order.
    pub const ARG_REGS: [Reg; 4] = [Reg::R0, Reg::R1, Reg::R2, Reg::R3];

    /// Callee-saved registers the allocator draws from, in allocation order.
    pub const POOL: [Reg; 8] = [
        Reg::R4, Reg::R5, Reg::R6, Reg::R7,
        Reg::R8, Reg::R9, Reg::R10, Reg::R11,
    ];

    /// Function results arrive here.
    pub const RESULT: Reg = Reg::R0;

    /// The architectural register number (`ip` = 12, …, `pc` = 15).
    pub fn number(self) -> usize {
        match self {
            Reg::R0 => 0,
            Reg::R1 => 1,
            Reg::R2 => 2,
            Reg::R3 => 3,
            Reg::R4 => 4,
            Reg::R5 => 5,
            Reg::R6 => 6,
            Reg::R7 => 7,
            Reg::R8 => 8,
            Reg::R9 => 9,
            Reg::R10 => 10,
            Reg::R11 => 11,
            Reg::Ip => 12,
            Reg::Sp => 13,
            Reg::Lr => 14,
            Reg::Pc => 15,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Reg::R0 => "r0",
            Reg::R1 => "r1",
            Reg::R2 => "r2",
            Reg::R3 => "r3",
            Reg::R4 => "r4",
            Reg::R5 => "r5",
            Reg::R6 => "r6",
            Reg::R7 => "r7",
            Reg::R8 => "r8",
            Reg::R9 => "r9",
            Reg::R10 => "r10",
            Reg::R11 => "r11",
            Reg::Ip => "ip",
            Reg::Sp => "sp",
            Reg::Lr => "lr",
            Reg::Pc => "pc",
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
