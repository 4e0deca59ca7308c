//! x86 encodings of the control transfers the patcher can insert.

pub const NOP: u8 = 0x90;
pub const RET: u8 = 0xC3;

/// Code segment selector written after the absolute target of far jumps and calls.
///
/// This is the flat 32-bit user code segment of the host's environment. It is carried
/// as-is and never derived from anything.
pub const FAR_SEGMENT_SELECTOR: u16 = 0x23;

/// Widest encoding any [`ControlTransfer`] produces.
pub const MAX_WIDTH: usize = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlTransfer {
    /// `jmp rel32`
    Jump,
    /// `call rel32`
    Call,
    /// `jmp ptr16:32`
    FarJump,
    /// `call ptr16:32`
    FarCall,
    /// `push imm32; ret`
    PushRet,
}

impl ControlTransfer {
    pub const ALL: [ControlTransfer; 5] = [
        ControlTransfer::Jump,
        ControlTransfer::Call,
        ControlTransfer::FarJump,
        ControlTransfer::FarCall,
        ControlTransfer::PushRet,
    ];

    /// Maps the numbering used by C plugins; unknown values fall back to a jump.
    pub fn from_raw(kind: u32) -> Self {
        match kind {
            1 => ControlTransfer::Call,
            2 => ControlTransfer::FarJump,
            3 => ControlTransfer::FarCall,
            4 => ControlTransfer::PushRet,
            _ => ControlTransfer::Jump,
        }
    }

    pub fn opcode(self) -> u8 {
        match self {
            ControlTransfer::Jump => 0xE9,
            ControlTransfer::Call => 0xE8,
            ControlTransfer::FarJump => 0xEA,
            ControlTransfer::FarCall => 0x9A,
            ControlTransfer::PushRet => 0x68,
        }
    }

    /// Number of bytes the encoding occupies before any padding.
    pub fn width(self) -> usize {
        match self {
            ControlTransfer::Jump | ControlTransfer::Call => 5,
            ControlTransfer::PushRet => 6,
            ControlTransfer::FarJump | ControlTransfer::FarCall => 7,
        }
    }

    pub fn is_relative(self) -> bool {
        matches!(self, ControlTransfer::Jump | ControlTransfer::Call)
    }

    /// Encodes the transfer as it must appear at `address` to reach `target`.
    ///
    /// Relative forms are measured from the end of the instruction. Absolute forms keep the
    /// low 32 bits of `target`.
    pub fn encode(self, address: usize, target: usize) -> Vec<u8> {
        let mut code = Vec::with_capacity(MAX_WIDTH);
        code.push(self.opcode());

        if self.is_relative() {
            code.extend_from_slice(&relative_displacement(address, target).to_le_bytes());
        } else {
            code.extend_from_slice(&(target as u32).to_le_bytes());
            match self {
                ControlTransfer::PushRet => code.push(RET),
                _ => code.extend_from_slice(&FAR_SEGMENT_SELECTOR.to_le_bytes()),
            }
        }

        debug_assert_eq!(code.len(), self.width());
        code
    }
}

/// Displacement of a 5 byte near branch at `address` landing on `target`.
pub fn relative_displacement(address: usize, target: usize) -> i32 {
    (target as isize).wrapping_sub(address as isize).wrapping_sub(5) as i32
}
