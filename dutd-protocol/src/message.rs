//! Message-id catalog for the DUT control link.

use crate::error::ProtocolError;
use std::fmt;

/// The closed set of message kinds a controller can send.
///
/// Ids are 4-bit values packed next to the hardware index; id 0 is reserved
/// and 13..=15 are unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgId {
    /// Stop and restart the driver, optionally staging EEPROM data.
    Reset = 1,
    /// Upload a pair of program images named in the payload.
    UploadProgram = 2,
    /// Raw low-level firmware command block.
    LowLevelCommand = 3,
    /// Raw driver command block.
    DriverCommand = 4,
    /// Create a virtual interface on the target.
    AddInterface = 5,
    /// Remove a virtual interface from the target.
    RemoveInterface = 6,
    /// Configure BSS parameters.
    SetBss = 7,
    /// Configure QoS queue parameters.
    SetQos = 8,
    /// Stop traffic on a virtual interface.
    StopTraffic = 9,
    /// Generic driver/firmware command.
    DriverFirmware = 10,
    /// Platform data field access.
    PlatformFields = 11,
    /// Raw platform command block.
    PlatformCommand = 12,
}

/// Number of assigned message ids plus the reserved id 0.
pub const MSG_ID_COUNT: usize = 13;

impl MsgId {
    /// All assigned message ids, in wire order.
    pub const ALL: [MsgId; 12] = [
        MsgId::Reset,
        MsgId::UploadProgram,
        MsgId::LowLevelCommand,
        MsgId::DriverCommand,
        MsgId::AddInterface,
        MsgId::RemoveInterface,
        MsgId::SetBss,
        MsgId::SetQos,
        MsgId::StopTraffic,
        MsgId::DriverFirmware,
        MsgId::PlatformFields,
        MsgId::PlatformCommand,
    ];

    /// Returns the wire id.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Maps a wire id back to its message kind.
    pub fn from_id(id: u8) -> Result<Self, ProtocolError> {
        MsgId::ALL
            .iter()
            .copied()
            .find(|m| m.id() == id)
            .ok_or(ProtocolError::UnknownMessageId(id))
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MsgId::Reset => "reset",
            MsgId::UploadProgram => "upload-program",
            MsgId::LowLevelCommand => "low-level-command",
            MsgId::DriverCommand => "driver-command",
            MsgId::AddInterface => "add-interface",
            MsgId::RemoveInterface => "remove-interface",
            MsgId::SetBss => "set-bss",
            MsgId::SetQos => "set-qos",
            MsgId::StopTraffic => "stop-traffic",
            MsgId::DriverFirmware => "driver-firmware",
            MsgId::PlatformFields => "platform-fields",
            MsgId::PlatformCommand => "platform-command",
        };
        f.write_str(name)
    }
}
