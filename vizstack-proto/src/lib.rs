//! Wire protocol plumbing for the VizStack resource broker: the framed
//! message codec (spec §4.1), peer authentication (spec §4.2), and the
//! `<ssm>` command/response envelope (spec §6).

pub mod auth;
pub mod codec;
pub mod envelope;

pub use auth::{decode_munge_frame, encode_munge_frame, parse_munge_metadata, AuthScheme, PeerIdentity};
pub use codec::{read_message, write_message};
pub use envelope::{Command, Response};
