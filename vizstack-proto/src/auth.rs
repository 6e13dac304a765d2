//! Peer authentication (spec §4.2): local-socket connections pass frames
//! verbatim and trust the kernel-reported peer uid; TCP connections wrap
//! the hello frame in an authenticating envelope, currently only `Munge`.
//! Mirrors `encode_message_with_auth`/`decode_message_with_auth` and
//! `parse_munge_metadata` in the original implementation, which shell out
//! to the `munge`/`unmunge` binaries rather than linking libmunge.

use std::io::Write as _;
use std::process::{Command, Stdio};

use vizstack_types::{VizError, VizErrorKind, VizResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerIdentity {
    pub uid: u32,
    pub gid: Option<u32>,
}

impl PeerIdentity {
    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthScheme {
    None,
    Munge,
}

impl AuthScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthScheme::None => "None",
            AuthScheme::Munge => "Munge",
        }
    }

    pub fn parse(s: &str) -> Result<Self, VizError> {
        match s {
            "None" => Ok(AuthScheme::None),
            "Munge" => Ok(AuthScheme::Munge),
            other => Err(VizError::bad_configuration(format!(
                "unsupported master_auth scheme '{other}', only 'None' and 'Munge' are defined"
            ))),
        }
    }
}

/// Decode a Munge-wrapped frame into the peer identity and the inner
/// payload. Shells out to `unmunge`, matching the original's use of
/// `popen2.Popen4`.
pub fn decode_munge_frame(frame: &[u8]) -> VizResult<(PeerIdentity, Vec<u8>)> {
    let mut child = Command::new("unmunge")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| VizError::new(VizErrorKind::InternalError, format!("failed to spawn unmunge: {e}")))?;

    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(frame)
        .map_err(|e| VizError::new(VizErrorKind::InternalError, format!("failed to write to unmunge: {e}")))?;

    let output = child
        .wait_with_output()
        .map_err(|e| VizError::new(VizErrorKind::InternalError, format!("unmunge did not run: {e}")))?;

    let decoded = String::from_utf8_lossy(&output.stdout);
    let mut lines = decoded.lines();
    let mut metadata = Vec::new();
    let mut payload_started = false;
    let mut payload_lines = Vec::new();

    for line in &mut lines {
        if !payload_started {
            if line.is_empty() {
                payload_started = true;
            } else {
                metadata.push(line.to_string());
            }
        } else {
            payload_lines.push(line);
        }
    }
    let payload = payload_lines.join("\n").into_bytes();

    let identity = parse_munge_metadata(&metadata)?;
    Ok((identity, payload))
}

/// Wrap `payload` in a Munge credential, the server-side counterpart to
/// `decode_munge_frame` used when a response must go back out over an
/// authenticated TCP connection. Shells out to `munge -i -`, feeding the
/// payload on stdin.
pub fn encode_munge_frame(payload: &[u8]) -> VizResult<Vec<u8>> {
    let mut child = Command::new("munge")
        .arg("-i")
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| VizError::new(VizErrorKind::InternalError, format!("failed to spawn munge: {e}")))?;

    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(payload)
        .map_err(|e| VizError::new(VizErrorKind::InternalError, format!("failed to write to munge: {e}")))?;

    let output = child
        .wait_with_output()
        .map_err(|e| VizError::new(VizErrorKind::InternalError, format!("munge did not run: {e}")))?;
    if !output.status.success() {
        return Err(VizError::new(
            VizErrorKind::InternalError,
            format!("munge exited with {}: {}", output.status, String::from_utf8_lossy(&output.stderr)),
        ));
    }
    Ok(output.stdout)
}

/// Parse `FIELD:   value` metadata lines emitted by `unmunge`, as in
/// `parse_munge_metadata` of the original implementation. Recognizes
/// `STATUS`, `UID`, and `GID`; other fields are ignored.
pub fn parse_munge_metadata(lines: &[String]) -> VizResult<PeerIdentity> {
    let mut uid = None;
    let mut gid = None;
    let mut status_code = None;

    for line in lines {
        let Some(colon) = line.find(':') else { continue };
        let key = &line[..colon];
        let value = line[colon + 1..].trim();
        match key {
            "STATUS" => {
                let code = extract_parenthesized_int(value)?;
                status_code = Some(code);
            }
            "UID" => {
                uid = Some(extract_parenthesized_int(value)? as u32);
            }
            "GID" => {
                gid = Some(extract_parenthesized_int(value)? as u32);
            }
            _ => {}
        }
    }

    match status_code {
        Some(0) => {}
        Some(code) => {
            return Err(VizError::access_denied(format!("munge decode failed with status code {code}")));
        }
        None => {
            return Err(VizError::bad_protocol("munge metadata missing STATUS field"));
        }
    }

    let uid = uid.ok_or_else(|| VizError::bad_protocol("munge metadata missing UID field"))?;
    Ok(PeerIdentity { uid, gid })
}

fn extract_parenthesized_int(value: &str) -> VizResult<i64> {
    let open = value
        .find('(')
        .ok_or_else(|| VizError::bad_protocol(format!("expected '(n)' in munge metadata value '{value}'")))?;
    let close = value
        .find(')')
        .ok_or_else(|| VizError::bad_protocol(format!("expected '(n)' in munge metadata value '{value}'")))?;
    value[open + 1..close]
        .parse()
        .map_err(|_| VizError::bad_protocol(format!("non-numeric value inside parentheses: '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_metadata() {
        let lines = vec![
            "STATUS: Success (0)".to_string(),
            "UID: someuser (1000)".to_string(),
            "GID: somegroup (1000)".to_string(),
        ];
        let identity = parse_munge_metadata(&lines).unwrap();
        assert_eq!(identity.uid, 1000);
        assert_eq!(identity.gid, Some(1000));
        assert!(!identity.is_root());
    }

    #[test]
    fn nonzero_status_is_access_denied() {
        let lines = vec!["STATUS: Invalid credential (5)".to_string()];
        let err = parse_munge_metadata(&lines).unwrap_err();
        assert_eq!(err.kind, VizErrorKind::AccessDenied);
    }

    #[test]
    fn missing_uid_is_bad_protocol() {
        let lines = vec!["STATUS: Success (0)".to_string()];
        let err = parse_munge_metadata(&lines).unwrap_err();
        assert_eq!(err.kind, VizErrorKind::BadProtocol);
    }

    #[test]
    fn auth_scheme_rejects_unknown_value() {
        assert!(AuthScheme::parse("Kerberos").is_err());
        assert_eq!(AuthScheme::parse("Munge").unwrap(), AuthScheme::Munge);
    }
}
