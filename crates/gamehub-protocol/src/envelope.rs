//! Protobuf command envelope used by the jili brand.
//!
//! ```proto
//! message Command {
//!   uint32 type = 1;
//!   bytes  data = 2;
//! }
//! ```

use prost::Message;

use crate::{Command, CommandKind, ProtocolError};

#[derive(Clone, PartialEq, prost::Message)]
pub struct CommandEnvelope {
    #[prost(uint32, tag = "1")]
    pub r#type: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

/// Encodes an outbound `(type, data)` pair.
pub fn pack(kind: u32, data: &[u8]) -> Vec<u8> {
    CommandEnvelope {
        r#type: kind,
        data: data.to_vec(),
    }
    .encode_to_vec()
}

/// Decodes an inbound frame into a [`Command`] with a numeric kind.
pub fn unpack(frame: &[u8]) -> Result<Command, ProtocolError> {
    let env = CommandEnvelope::decode(frame)?;
    Ok(Command::code(env.r#type, env.data))
}

/// Re-encodes a numeric [`Command`]. Named commands have no jili form.
pub fn repack(cmd: &Command) -> Result<Vec<u8>, ProtocolError> {
    match cmd.kind {
        CommandKind::Code(code) => Ok(pack(code, &cmd.payload)),
        CommandKind::Action(ref name) => Err(ProtocolError::InvalidMessage(
            format!("named command {name:?} cannot be sent as an envelope"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_reads_type_and_data() {
        let frame = pack(1001, b"body");
        let cmd = unpack(&frame).unwrap();
        assert_eq!(cmd.kind, CommandKind::Code(1001));
        assert_eq!(cmd.payload, b"body");
    }

    #[test]
    fn test_pack_matches_protobuf_layout() {
        // field 1 varint 5, field 2 length-delimited "hi"
        assert_eq!(pack(5, b"hi"), vec![0x08, 0x05, 0x12, 0x02, b'h', b'i']);
    }

    #[test]
    fn test_unpack_garbage_errors() {
        let err = unpack(&[0x12, 0x05, 0x01]).unwrap_err();
        assert!(matches!(err, ProtocolError::Protobuf(_)));
    }

    #[test]
    fn test_repack_rejects_named_command() {
        assert!(repack(&Command::action("bet", Vec::new())).is_err());
        assert_eq!(repack(&Command::code(5, b"hi".to_vec())).unwrap(), pack(5, b"hi"));
    }
}
