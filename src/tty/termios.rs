//! termios-style control structure: special control characters and the
//! line-discipline mode flags (section 4.8).

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct LFlags: u32 {
        const ICANON  = 1 << 0;
        const ECHO    = 1 << 1;
        const ECHOE   = 1 << 2;
        const ECHOK   = 1 << 3;
        const ECHOCTL = 1 << 4;
        const ECHONL  = 1 << 5;
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct IFlags: u32 {
        const IGNCR = 1 << 0;
        const ICRNL = 1 << 1;
        const INLCR = 1 << 2;
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct OFlags: u32 {
        const OPOST = 1 << 0;
        const ONLCR = 1 << 1;
    }
}

/// Index into `Termios::c_cc`, one slot per special control role named in
/// section 4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum CC {
    VIntr = 0,
    VQuit = 1,
    VErase = 2,
    VKill = 3,
    VEof = 4,
    VEol = 5,
    VEol2 = 6,
    VStart = 7,
    VStop = 8,
    VSusp = 9,
    VReprint = 10,
    VDiscard = 11,
    VWerase = 12,
    VLnext = 13,
    VMin = 14,
    VTime = 15,
}

pub const NCCS: usize = 16;

#[derive(Clone, Copy)]
pub struct Termios {
    pub c_iflag: IFlags,
    pub c_oflag: OFlags,
    pub c_lflag: LFlags,
    pub c_cc: [u8; NCCS],
}

impl Termios {
    pub fn canonical_default() -> Self {
        let mut c_cc = [0u8; NCCS];
        c_cc[CC::VIntr as usize] = 0x03; // ^C
        c_cc[CC::VQuit as usize] = 0x1c; // ^\
        c_cc[CC::VErase as usize] = 0x7f; // DEL
        c_cc[CC::VKill as usize] = 0x15; // ^U
        c_cc[CC::VEof as usize] = 0x04; // ^D
        c_cc[CC::VEol as usize] = b'\n';
        c_cc[CC::VStart as usize] = 0x11; // ^Q
        c_cc[CC::VStop as usize] = 0x13; // ^S
        c_cc[CC::VSusp as usize] = 0x1a; // ^Z
        c_cc[CC::VReprint as usize] = 0x12; // ^R
        c_cc[CC::VDiscard as usize] = 0x0f; // ^O
        c_cc[CC::VWerase as usize] = 0x17; // ^W
        c_cc[CC::VLnext as usize] = 0x16; // ^V
        c_cc[CC::VMin as usize] = 1;
        c_cc[CC::VTime as usize] = 0;

        Termios {
            c_iflag: IFlags::ICRNL,
            c_oflag: OFlags::OPOST | OFlags::ONLCR,
            c_lflag: LFlags::ICANON | LFlags::ECHO | LFlags::ECHOE | LFlags::ECHOK,
            c_cc,
        }
    }

    pub fn raw() -> Self {
        let mut t = Self::canonical_default();
        t.c_lflag.remove(LFlags::ICANON | LFlags::ECHO | LFlags::ECHOE | LFlags::ECHOK);
        t
    }

    pub fn cc(&self, role: CC) -> u8 {
        self.c_cc[role as usize]
    }

    /// `TCSETS` with a new control character: rebuilds nothing by itself,
    /// since the table in `line_discipline` is keyed dynamically off this
    /// struct on every keypress (section 4.8 says the handler table "is
    /// rebuilt on each TCSETS"; here that's simply always-current lookup).
    pub fn set_cc(&mut self, role: CC, value: u8) {
        self.c_cc[role as usize] = value;
    }
}

impl Default for Termios {
    fn default() -> Self {
        Self::canonical_default()
    }
}
