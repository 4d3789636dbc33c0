//! Proxy command codes.
//!
//! The command byte carries a 7-bit code and uses bit 7 as the error flag.
//! Code 0 is reserved; every value past the last defined command is unknown.

use std::fmt;

use crate::error::FrameError;

/// Bit 7 of the command byte: the payload is an error message.
pub const ERROR_FLAG: u8 = 0x80;

/// Mask selecting the 7-bit command code.
pub const CODE_MASK: u8 = 0x7F;

/// A proxy command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCode {
    /// Confirm the gateway is ready.
    Connect = 1,
    /// Session teardown (accepted, currently a no-op).
    Disconnect = 2,
    /// Connect the gateway to an overlay peer.
    ConnectToPeer = 3,
    /// Open (or reuse) an API session to a peer.
    NewApiClient = 4,
    /// Relay one API command to a peer and return its answer.
    SendToPeerApi = 5,
    /// Subscribe the connection to a peer stream; also the code of push frames.
    Subscribe = 6,
}

impl CommandCode {
    /// Every defined command, in code order.
    pub const ALL: [CommandCode; 6] = [
        CommandCode::Connect,
        CommandCode::Disconnect,
        CommandCode::ConnectToPeer,
        CommandCode::NewApiClient,
        CommandCode::SendToPeerApi,
        CommandCode::Subscribe,
    ];

    /// Look up a command by its 7-bit code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(CommandCode::Connect),
            2 => Some(CommandCode::Disconnect),
            3 => Some(CommandCode::ConnectToPeer),
            4 => Some(CommandCode::NewApiClient),
            5 => Some(CommandCode::SendToPeerApi),
            6 => Some(CommandCode::Subscribe),
            _ => None,
        }
    }

    /// The wire value of this command (error flag clear).
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable command name.
    pub fn name(self) -> &'static str {
        match self {
            CommandCode::Connect => "CONNECT",
            CommandCode::Disconnect => "DISCONNECT",
            CommandCode::ConnectToPeer => "CONNECT_TO_PEER",
            CommandCode::NewApiClient => "NEW_API_CLIENT",
            CommandCode::SendToPeerApi => "SEND_TO_PEER_API",
            CommandCode::Subscribe => "SUBSCRIBE",
        }
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = FrameError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(FrameError::UnknownCommand(code))
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns a human-readable name for a raw command byte, ignoring the error flag.
pub fn command_name(byte: u8) -> &'static str {
    match CommandCode::from_code(byte & CODE_MASK) {
        Some(code) => code.name(),
        None => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_wire_values() {
        for (expected, code) in (1u8..).zip(CommandCode::ALL) {
            assert_eq!(code.as_u8(), expected);
            assert_eq!(CommandCode::from_code(expected), Some(code));
        }
    }

    #[test]
    fn reserved_and_out_of_range_codes_are_unknown() {
        assert!(CommandCode::from_code(0).is_none());
        assert!(CommandCode::from_code(7).is_none());
        assert!(CommandCode::from_code(CODE_MASK).is_none());
        assert!(matches!(
            CommandCode::try_from(42),
            Err(FrameError::UnknownCommand(42))
        ));
    }

    #[test]
    fn command_name_ignores_error_flag() {
        assert_eq!(command_name(3 | ERROR_FLAG), "CONNECT_TO_PEER");
        assert_eq!(command_name(ERROR_FLAG), "UNKNOWN");
    }
}
