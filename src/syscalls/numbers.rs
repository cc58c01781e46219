//! System call numbers. The values are ABI: user programs place them in
//! the syscall-number register before `int 0x30`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SyscallNumber {
    // Console I/O (0-1)
    Puts = 0,
    Getc = 1,

    // Process management (2-6)
    GetPid = 2,
    GetCid = 3,
    Fork = 4,
    Kill = 5,
    Sleep = 6,

    // Memory accounting (7-8)
    GetNumUsedPage = 7,
    GetNumFreePage = 8,

    // Time (9)
    GetTicks = 9,

    // Screen control (10-11)
    SetTextColor = 10,
    Cls = 11,

    // File system (12-18)
    Open = 12,
    Close = 13,
    Read = 14,
    Write = 15,
    Lseek = 16,
    Unlink = 17,
    Readdir = 18,

    // Unknown
    Unknown = usize::MAX,
}

impl From<usize> for SyscallNumber {
    fn from(num: usize) -> Self {
        match num {
            0 => Self::Puts,
            1 => Self::Getc,
            2 => Self::GetPid,
            3 => Self::GetCid,
            4 => Self::Fork,
            5 => Self::Kill,
            6 => Self::Sleep,
            7 => Self::GetNumUsedPage,
            8 => Self::GetNumFreePage,
            9 => Self::GetTicks,
            10 => Self::SetTextColor,
            11 => Self::Cls,
            12 => Self::Open,
            13 => Self::Close,
            14 => Self::Read,
            15 => Self::Write,
            16 => Self::Lseek,
            17 => Self::Unlink,
            18 => Self::Readdir,
            _ => Self::Unknown,
        }
    }
}
