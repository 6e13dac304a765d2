//! Framed message codec (spec §4.1): each message is a 5-byte ASCII
//! decimal length prefix (left-justified, space-padded) followed by the
//! XML payload. Mirrors `sendMessageOnSocket`/`readMessageFromSocket` in
//! the original implementation.

use std::io::{self, Read, Write};

use vizstack_types::{VizError, VizErrorKind, VizResult};

const LENGTH_PREFIX_WIDTH: usize = 5;

pub fn write_message<W: Write>(writer: &mut W, payload: &[u8]) -> VizResult<()> {
    let prefix = format!("{:<width$}", payload.len(), width = LENGTH_PREFIX_WIDTH);
    if prefix.len() != LENGTH_PREFIX_WIDTH {
        return Err(VizError::bad_protocol(format!(
            "message of {} bytes does not fit in a {}-digit length prefix",
            payload.len(),
            LENGTH_PREFIX_WIDTH
        )));
    }
    writer
        .write_all(prefix.as_bytes())
        .and_then(|_| writer.write_all(payload))
        .map_err(socket_error)
}

pub fn read_message<R: Read>(reader: &mut R) -> VizResult<Vec<u8>> {
    let mut prefix = [0u8; LENGTH_PREFIX_WIDTH];
    match reader.read_exact(&mut prefix) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(VizError::new(VizErrorKind::NotConnected, "socket disconnected"));
        }
        Err(e) => return Err(socket_error(e)),
    }

    let prefix_str = std::str::from_utf8(&prefix)
        .map_err(|_| VizError::bad_protocol("message length prefix is not valid ASCII"))?;
    let data_len: usize = prefix_str
        .trim()
        .parse()
        .map_err(|_| VizError::bad_protocol(format!("message length '{prefix_str}' is invalid")))?;
    if data_len == 0 {
        return Err(VizError::bad_protocol("message length 0 is invalid"));
    }

    let mut payload = vec![0u8; data_len];
    reader
        .read_exact(&mut payload)
        .map_err(|_| VizError::bad_protocol("incomplete message"))?;
    Ok(payload)
}

fn socket_error(e: io::Error) -> VizError {
    VizError::new(VizErrorKind::SocketError, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip_through_a_buffer() {
        let mut buf = Vec::new();
        write_message(&mut buf, b"<ssm/>").unwrap();
        assert_eq!(&buf[..5], b"6    ");
        let mut cursor = Cursor::new(buf);
        let payload = read_message(&mut cursor).unwrap();
        assert_eq!(payload, b"<ssm/>");
    }

    #[test]
    fn rejects_non_numeric_prefix() {
        let mut cursor = Cursor::new(b"abcde<ssm/>".to_vec());
        assert!(read_message(&mut cursor).is_err());
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut cursor = Cursor::new(b"10   ab".to_vec());
        assert!(read_message(&mut cursor).is_err());
    }

    #[test]
    fn empty_read_reports_not_connected() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let err = read_message(&mut cursor).unwrap_err();
        assert_eq!(err.kind, VizErrorKind::NotConnected);
    }
}
