//! Control code packing
//!
//! A control code is a 32-bit value laid out as
//! `device_type[31:16] | access[15:14] | function[13:2] | method[1:0]`.
//! The layout is fixed by the driver interface, so composition and
//! decomposition here must stay bit-exact.

use serde::Serialize;
use std::fmt;

/// Device category in the high 16 bits of a control code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceType(pub u16);

impl DeviceType {
    pub const DISK: DeviceType = DeviceType(0x0007);
    pub const FILE_SYSTEM: DeviceType = DeviceType(0x0009);
    pub const MASS_STORAGE: DeviceType = DeviceType(0x002D);
    pub const CHANGER: DeviceType = DeviceType(0x0030);
}

/// Buffer transfer method in the low 2 bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum Method {
    Buffered = 0,
    InDirect = 1,
    OutDirect = 2,
    Neither = 3,
}

impl Method {
    pub fn from_u32(value: u32) -> Self {
        match value & 0x3 {
            0 => Self::Buffered,
            1 => Self::InDirect,
            2 => Self::OutDirect,
            _ => Self::Neither,
        }
    }
}

/// Required access rights in bits 14-15
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum Access {
    Any = 0,
    Read = 1,
    Write = 2,
    ReadWrite = 3,
}

impl Access {
    pub fn from_u32(value: u32) -> Self {
        match value & 0x3 {
            0 => Self::Any,
            1 => Self::Read,
            2 => Self::Write,
            _ => Self::ReadWrite,
        }
    }
}

/// Packed control code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ControlCode(u32);

impl ControlCode {
    /// Compose a control code from its parts
    ///
    /// `function` is 12 bits wide; higher bits are masked off.
    pub const fn new(
        device_type: DeviceType,
        function: u16,
        method: Method,
        access: Access,
    ) -> Self {
        Self(
            ((device_type.0 as u32) << 16)
                | ((access as u32) << 14)
                | (((function as u32) & 0x0FFF) << 2)
                | method as u32,
        )
    }

    /// Wrap an already packed value
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn device_type(self) -> DeviceType {
        DeviceType((self.0 >> 16) as u16)
    }

    pub const fn function(self) -> u16 {
        ((self.0 >> 2) & 0x0FFF) as u16
    }

    pub fn method(self) -> Method {
        Method::from_u32(self.0)
    }

    pub fn access(self) -> Access {
        Access::from_u32(self.0 >> 14)
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<ControlCode> for u32 {
    fn from(code: ControlCode) -> Self {
        code.0
    }
}
