//! Per-connection session state (spec §4.2, §4.8):
//! `Unauthenticated -> Active -> Closing`.

use vizstack_proto::PeerIdentity;
use vizstack_types::{VizError, VizResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Active,
    Closing,
}

/// One connected client. `peer` is populated once the transport's auth
/// handshake completes (TCP: munge; local socket: trusted as uid 0 at the
/// listener, mirroring the original's local-socket trust boundary).
pub struct Session {
    pub id: u64,
    pub state: SessionState,
    pub peer: Option<PeerIdentity>,
    pub cleanup_on_disconnect: bool,
    pub owned_allocations: Vec<u64>,
}

impl Session {
    pub fn new(id: u64, peer: Option<PeerIdentity>) -> Self {
        Self {
            id,
            state: SessionState::Unauthenticated,
            peer,
            cleanup_on_disconnect: true,
            owned_allocations: Vec::new(),
        }
    }

    /// spec §4.2: a session must present `<client>` before any other
    /// command. TCP connections require a resolved peer identity (munge
    /// auth happens before this point at the transport layer); local
    /// connections may already carry one from the listener's own trust.
    pub fn accept_hello(&mut self, cleanup_on_disconnect: bool, requires_peer: bool) -> VizResult<()> {
        if self.state != SessionState::Unauthenticated {
            return Err(VizError::bad_protocol("hello received on an already-active session"));
        }
        if requires_peer && self.peer.is_none() {
            return Err(VizError::access_denied("connection has no verified peer identity"));
        }
        self.cleanup_on_disconnect = cleanup_on_disconnect;
        self.state = SessionState::Active;
        Ok(())
    }

    pub fn require_active(&self) -> VizResult<()> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Unauthenticated => Err(VizError::new(
                vizstack_types::VizErrorKind::NotConnected,
                "session has not sent its hello yet",
            )),
            SessionState::Closing => Err(VizError::new(
                vizstack_types::VizErrorKind::NotConnected,
                "session is closing",
            )),
        }
    }

    pub fn owns(&self, alloc_owner_uid: Option<u32>) -> bool {
        match (&self.peer, alloc_owner_uid) {
            (Some(peer), _) if peer.is_root() => true,
            (Some(peer), Some(owner_uid)) => peer.uid == owner_uid,
            _ => false,
        }
    }

    pub fn record_allocation(&mut self, alloc_id: u64) {
        self.owned_allocations.push(alloc_id);
    }

    pub fn forget_allocation(&mut self, alloc_id: u64) {
        self.owned_allocations.retain(|id| *id != alloc_id);
    }

    pub fn begin_close(&mut self) {
        self.state = SessionState::Closing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_before_hello_are_not_connected() {
        let session = Session::new(1, None);
        let err = session.require_active().unwrap_err();
        assert_eq!(err.kind, vizstack_types::VizErrorKind::NotConnected);
    }

    #[test]
    fn tcp_session_without_a_peer_is_rejected() {
        let mut session = Session::new(1, None);
        let err = session.accept_hello(true, true).unwrap_err();
        assert_eq!(err.kind, vizstack_types::VizErrorKind::AccessDenied);
    }

    #[test]
    fn root_owns_every_allocation() {
        let session = Session::new(1, Some(PeerIdentity { uid: 0, gid: None }));
        assert!(session.owns(Some(4242)));
    }

    #[test]
    fn non_root_only_owns_matching_uid() {
        let session = Session::new(1, Some(PeerIdentity { uid: 1000, gid: None }));
        assert!(session.owns(Some(1000)));
        assert!(!session.owns(Some(1001)));
    }
}
