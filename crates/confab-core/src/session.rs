//! Session coordination: the join/relay/leave state machine.
//!
//! One [`Session`] exists per connection and walks
//! `Unjoined -> Joined -> Closed`. The shared [`Coordinator`] owns all
//! mutable relay state (registry, keyring, sequencer) behind one lock,
//! computes fan-out sets from the registry, and pushes outbound frames
//! through an [`EventSink`].
//!
//! Fan-out frames are enqueued while the state lock is held. That keeps
//! the per-room notification order identical to the mutation order even
//! when connection tasks run on a multi-threaded runtime, which the
//! meta/announcement contract requires.

use crate::message::{ChatMessage, Sequencer, SYSTEM_AUTHOR};
use crate::registry::{
    validate_room_name, validate_username, ConnectionId, MembershipRecord, Registry, RegistryError,
};
use crate::roster::Roster;
use crate::secret::Keyring;
use confab_protocol::{codes, Frame};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Outbound event channel, implemented by the transport layer.
///
/// `deliver` is called with the coordinator lock held and must only
/// enqueue: implementations must not block, perform I/O inline, or call
/// back into the coordinator. Delivery to a vanished connection is
/// silently dropped; a slow or stuck peer is the transport's problem.
pub trait EventSink: Send + Sync {
    /// Enqueue a frame for one connection.
    fn deliver(&self, target: &str, frame: Frame);
}

/// Join failures, reported point-to-point to the requesting connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// Another member of the room already uses this username.
    #[error("Username {0:?} already taken")]
    DuplicateUsername(String),

    /// The username is the reserved system author identity.
    #[error("Username is reserved")]
    ReservedUsername,

    /// The username failed validation.
    #[error("Invalid username: {0}")]
    InvalidUsername(&'static str),

    /// The room name failed validation.
    #[error("Invalid room name: {0}")]
    InvalidRoom(&'static str),

    /// The connection already joined a room.
    #[error("Connection already joined a room")]
    AlreadyJoined,

    /// The session is closed.
    #[error("Session is closed")]
    Closed,
}

impl JoinError {
    /// The wire error code for this failure.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            JoinError::DuplicateUsername(_) => codes::DUPLICATE_USERNAME,
            JoinError::ReservedUsername => codes::RESERVED_USERNAME,
            JoinError::InvalidUsername(_) => codes::INVALID_USERNAME,
            JoinError::InvalidRoom(_) => codes::INVALID_ROOM,
            JoinError::AlreadyJoined => codes::ALREADY_JOINED,
            JoinError::Closed => codes::NOT_JOINED,
        }
    }
}

/// Relay failures. Nothing is fanned out on any of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The connection has not joined a room (or its session is closed).
    #[error("Connection has not joined a room")]
    NotJoined,

    /// The target room does not match the room the connection joined.
    #[error("Target room {requested:?} does not match joined room {joined:?}")]
    RoomMismatch {
        /// Room named in the send request.
        requested: String,
        /// Room the connection actually joined.
        joined: String,
    },
}

impl RelayError {
    /// The wire error code for this failure.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            RelayError::NotJoined => codes::NOT_JOINED,
            RelayError::RoomMismatch { .. } => codes::ROOM_MISMATCH,
        }
    }
}

/// Lifecycle of one connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, not yet in a room.
    Unjoined,
    /// Member of exactly one room.
    Joined,
    /// Disconnected; no further transitions.
    Closed,
}

/// Per-connection session handle.
///
/// Owned by the connection task; the membership record itself lives in
/// the registry so there is exactly one copy of who-is-where.
#[derive(Debug)]
pub struct Session {
    connection_id: ConnectionId,
    state: SessionState,
}

impl Session {
    /// Create a session for a freshly accepted connection.
    #[must_use]
    pub fn new(connection_id: impl Into<ConnectionId>) -> Self {
        Self {
            connection_id: connection_id.into(),
            state: SessionState::Unjoined,
        }
    }

    /// The connection this session belongs to.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session is in a room.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.state == SessionState::Joined
    }
}

/// Coordinator statistics.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorStats {
    /// Connections currently joined to a room.
    pub connections: usize,
    /// Rooms with at least one member.
    pub rooms: usize,
}

/// All mutable relay state, guarded by one lock.
///
/// Keyring and sequencer entries exist exactly for the rooms the
/// registry knows, because every transition that empties a room retires
/// them in the same critical section.
#[derive(Default)]
struct Shared {
    registry: Registry,
    keyring: Keyring,
    sequencer: Sequencer,
}

/// The session coordinator.
///
/// Sole writer of the registry. All three operations - join, relay,
/// leave - mutate state and emit their notifications inside a single
/// critical section.
pub struct Coordinator {
    shared: Mutex<Shared>,
    sink: Arc<dyn EventSink>,
}

impl Coordinator {
    /// Create a coordinator delivering through the given sink.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            shared: Mutex::new(Shared::default()),
            sink,
        }
    }

    /// Join a room.
    ///
    /// Valid only from `Unjoined`. On success the joiner is registered,
    /// the request is acked, every member of the room (joiner included)
    /// receives a meta frame with the new occupancy and the room secret,
    /// and every other member receives a system announcement.
    ///
    /// # Errors
    ///
    /// On failure an error frame answering `request_id` is delivered to
    /// the requesting connection only, nothing else is emitted, and the
    /// session stays `Unjoined` so the client can retry with a
    /// different username.
    pub fn join(
        &self,
        session: &mut Session,
        request_id: u64,
        username: &str,
        room: &str,
    ) -> Result<MembershipRecord, JoinError> {
        match session.state {
            SessionState::Unjoined => {}
            SessionState::Joined => {
                return Err(self.reject_join(session, request_id, JoinError::AlreadyJoined))
            }
            SessionState::Closed => {
                return Err(self.reject_join(session, request_id, JoinError::Closed))
            }
        }

        if username == SYSTEM_AUTHOR {
            return Err(self.reject_join(session, request_id, JoinError::ReservedUsername));
        }
        if let Err(reason) = validate_username(username) {
            return Err(self.reject_join(session, request_id, JoinError::InvalidUsername(reason)));
        }
        if let Err(reason) = validate_room_name(room) {
            return Err(self.reject_join(session, request_id, JoinError::InvalidRoom(reason)));
        }

        let mut shared = self.lock();
        let shared = &mut *shared;

        let record = match shared
            .registry
            .add(session.connection_id.clone(), username, room)
        {
            Ok(record) => record,
            Err(RegistryError::DuplicateUsername { username, .. }) => {
                return Err(self.reject_join(
                    session,
                    request_id,
                    JoinError::DuplicateUsername(username),
                ));
            }
        };

        let secret = shared.keyring.issue(room);
        let announcement: Frame =
            ChatMessage::joined(shared.sequencer.next(room), room, username).into();

        let members = Roster::new(&shared.registry).members(room);
        let meta = Frame::meta(room, members.len() as u32, secret.as_str());

        self.sink
            .deliver(&session.connection_id, Frame::ack(request_id));
        for member in &members {
            self.sink.deliver(&member.connection_id, meta.clone());
        }
        for member in &members {
            if member.connection_id != session.connection_id {
                self.sink
                    .deliver(&member.connection_id, announcement.clone());
            }
        }

        info!(
            connection = %session.connection_id,
            username = %username,
            room = %room,
            occupancy = members.len(),
            "Joined room"
        );

        session.state = SessionState::Joined;
        Ok(record)
    }

    /// Relay a ciphertext message to the sender's room.
    ///
    /// Valid only from `Joined`, and only for the room the session
    /// actually joined; the registry record is authoritative for both
    /// the room and the author, regardless of what the request claims.
    /// The body is forwarded verbatim to every other member; the sender
    /// never receives its own message back. Empty bodies are dropped
    /// silently.
    ///
    /// Returns the number of members the message was delivered to.
    ///
    /// # Errors
    ///
    /// On a state or room mismatch nothing is relayed; an error frame is
    /// delivered to the sender when the request carried an id.
    pub fn relay(
        &self,
        session: &Session,
        request_id: Option<u64>,
        room: &str,
        body: &str,
        claimed_author: Option<&str>,
        sent_at: Option<String>,
    ) -> Result<usize, RelayError> {
        if !session.is_joined() {
            return Err(self.reject_relay(session, request_id, RelayError::NotJoined));
        }

        if body.is_empty() {
            trace!(connection = %session.connection_id, "Dropped empty message body");
            return Ok(0);
        }

        let mut shared = self.lock();
        let shared = &mut *shared;

        // A joined session always has a record; treat a missing one as
        // not-joined rather than panicking on an impossible state.
        let Some(record) = shared.registry.get(&session.connection_id).cloned() else {
            return Err(self.reject_relay(session, request_id, RelayError::NotJoined));
        };

        if record.room != room {
            let err = RelayError::RoomMismatch {
                requested: room.to_string(),
                joined: record.room.clone(),
            };
            return Err(self.reject_relay(session, request_id, err));
        }

        if let Some(claimed) = claimed_author {
            if claimed != record.username {
                warn!(
                    connection = %session.connection_id,
                    claimed = %claimed,
                    registered = %record.username,
                    "Claimed author ignored"
                );
            }
        }

        let uid = shared.sequencer.next(&record.room);
        let frame: Frame =
            ChatMessage::user(uid, &record.room, body, &record.username, sent_at).into();

        let mut recipients = 0;
        for member in Roster::new(&shared.registry).members(&record.room) {
            if member.connection_id != session.connection_id {
                self.sink.deliver(&member.connection_id, frame.clone());
                recipients += 1;
            }
        }

        if let Some(id) = request_id {
            self.sink.deliver(&session.connection_id, Frame::ack(id));
        }

        debug!(
            connection = %session.connection_id,
            room = %record.room,
            uid,
            recipients,
            "Relayed message"
        );

        Ok(recipients)
    }

    /// Close a session, leaving its room if it joined one.
    ///
    /// From `Unjoined` this is a no-op; disconnect-before-join is a
    /// normal path. From `Joined` the record is removed and, if the
    /// room still has members, they receive a meta frame with the
    /// decremented count plus a system announcement. An emptied room
    /// ceases to exist: its secret and uid counter are discarded.
    ///
    /// Returns the removed record, if there was one. Idempotent.
    pub fn leave(&self, session: &mut Session) -> Option<MembershipRecord> {
        let was = session.state;
        session.state = SessionState::Closed;

        if was != SessionState::Joined {
            return None;
        }

        let mut shared = self.lock();
        let shared = &mut *shared;

        let record = shared.registry.remove(&session.connection_id)?;
        let room = record.room.as_str();

        let members = Roster::new(&shared.registry).members(room);
        if members.is_empty() {
            shared.keyring.retire(room);
            shared.sequencer.reset(room);
            debug!(room = %room, "Room vacated");
        } else {
            let secret = shared.keyring.issue(room);
            let meta = Frame::meta(room, members.len() as u32, secret.as_str());
            let announcement: Frame =
                ChatMessage::left(shared.sequencer.next(room), room, &record.username).into();

            for member in &members {
                self.sink.deliver(&member.connection_id, meta.clone());
            }
            for member in &members {
                self.sink
                    .deliver(&member.connection_id, announcement.clone());
            }
        }

        info!(
            connection = %session.connection_id,
            username = %record.username,
            room = %room,
            remaining = members.len(),
            "Left room"
        );

        Some(record)
    }

    /// Current occupancy of a room.
    #[must_use]
    pub fn occupancy(&self, room: &str) -> usize {
        let shared = self.lock();
        Roster::new(&shared.registry).occupancy(room)
    }

    /// Coordinator-wide statistics.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        let shared = self.lock();
        CoordinatorStats {
            connections: shared.registry.len(),
            rooms: Roster::new(&shared.registry).rooms().len(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().expect("coordinator state poisoned")
    }

    fn reject_join(&self, session: &Session, request_id: u64, err: JoinError) -> JoinError {
        warn!(connection = %session.connection_id, error = %err, "Join rejected");
        self.sink.deliver(
            &session.connection_id,
            Frame::error(request_id, err.code(), err.to_string()),
        );
        err
    }

    fn reject_relay(
        &self,
        session: &Session,
        request_id: Option<u64>,
        err: RelayError,
    ) -> RelayError {
        warn!(connection = %session.connection_id, error = %err, "Relay rejected");
        if let Some(id) = request_id {
            self.sink.deliver(
                &session.connection_id,
                Frame::error(id, err.code(), err.to_string()),
            );
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink that records every (target, frame) pair in delivery order.
    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<(String, Frame)>>,
    }

    impl EventSink for RecordingSink {
        fn deliver(&self, target: &str, frame: Frame) {
            self.events
                .lock()
                .unwrap()
                .push((target.to_string(), frame));
        }
    }

    impl RecordingSink {
        fn to(&self, target: &str) -> Vec<Frame> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t == target)
                .map(|(_, f)| f.clone())
                .collect()
        }

        fn total(&self) -> usize {
            self.events.lock().unwrap().len()
        }

        fn clear(&self) {
            self.events.lock().unwrap().clear();
        }
    }

    fn harness() -> (Arc<RecordingSink>, Coordinator) {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = Coordinator::new(sink.clone());
        (sink, coordinator)
    }

    fn meta_fields(frame: &Frame) -> (u32, String) {
        match frame {
            Frame::Meta {
                total_active_users,
                room_secret,
                ..
            } => (*total_active_users, room_secret.clone()),
            other => panic!("expected meta frame, got {other:?}"),
        }
    }

    fn metas(frames: &[Frame]) -> Vec<(u32, String)> {
        frames
            .iter()
            .filter(|f| matches!(f, Frame::Meta { .. }))
            .map(meta_fields)
            .collect()
    }

    fn messages(frames: &[Frame]) -> Vec<(u64, String, String)> {
        frames
            .iter()
            .filter_map(|f| match f {
                Frame::Message {
                    uid, body, author, ..
                } => Some((*uid, body.clone(), author.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_first_join_emits_meta_to_joiner_only() {
        let (sink, coordinator) = harness();
        let mut a = Session::new("conn-a");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();

        let to_a = sink.to("conn-a");
        assert_eq!(to_a[0], Frame::ack(1));
        assert_eq!(metas(&to_a), vec![(1, metas(&to_a)[0].1.clone())]);
        // No announcement anywhere: the joiner has no one to announce to.
        assert!(messages(&to_a).is_empty());
        assert_eq!(sink.total(), 2);
        assert!(a.is_joined());
    }

    #[test]
    fn test_second_join_notifies_prior_members() {
        let (sink, coordinator) = harness();
        let mut a = Session::new("conn-a");
        let mut b = Session::new("conn-b");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        let secret = metas(&sink.to("conn-a"))[0].1.clone();
        sink.clear();

        coordinator.join(&mut b, 2, "bob", "lobby").unwrap();

        // Every member, joiner included, sees the new occupancy and the
        // unchanged room secret.
        assert_eq!(metas(&sink.to("conn-a")), vec![(2, secret.clone())]);
        assert_eq!(metas(&sink.to("conn-b")), vec![(2, secret)]);

        // Only prior members get the announcement.
        let announced = messages(&sink.to("conn-a"));
        assert_eq!(announced.len(), 1);
        assert!(announced[0].1.contains("bob"));
        assert_eq!(announced[0].2, SYSTEM_AUTHOR);
        assert!(messages(&sink.to("conn-b")).is_empty());
    }

    #[test]
    fn test_join_order_is_meta_then_announcement() {
        let (sink, coordinator) = harness();
        let mut a = Session::new("conn-a");
        let mut b = Session::new("conn-b");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        sink.clear();
        coordinator.join(&mut b, 2, "bob", "lobby").unwrap();

        let to_a = sink.to("conn-a");
        assert!(matches!(to_a[0], Frame::Meta { .. }));
        assert!(matches!(to_a[1], Frame::Message { .. }));
    }

    #[test]
    fn test_duplicate_username_rejected_then_retry_succeeds() {
        let (sink, coordinator) = harness();
        let mut a = Session::new("conn-a");
        let mut c = Session::new("conn-c");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        sink.clear();

        let err = coordinator.join(&mut c, 7, "alice", "lobby").unwrap_err();
        assert_eq!(err, JoinError::DuplicateUsername("alice".into()));

        // Rejection is point-to-point; no one else hears about it.
        assert_eq!(
            sink.to("conn-c"),
            vec![Frame::error(7, codes::DUPLICATE_USERNAME, err.to_string())]
        );
        assert!(sink.to("conn-a").is_empty());
        assert_eq!(coordinator.occupancy("lobby"), 1);

        // The transport stays open and the session unjoined: retrying
        // under a free username works.
        assert_eq!(c.state(), SessionState::Unjoined);
        coordinator.join(&mut c, 8, "carol", "lobby").unwrap();
        assert_eq!(coordinator.occupancy("lobby"), 2);
    }

    #[test]
    fn test_same_username_in_other_room_is_fine() {
        let (_sink, coordinator) = harness();
        let mut a = Session::new("conn-a");
        let mut b = Session::new("conn-b");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        coordinator.join(&mut b, 2, "alice", "den").unwrap();
        assert_eq!(coordinator.occupancy("lobby"), 1);
        assert_eq!(coordinator.occupancy("den"), 1);
    }

    #[test]
    fn test_reserved_and_invalid_names_rejected() {
        let (sink, coordinator) = harness();
        let mut s = Session::new("conn-s");

        assert_eq!(
            coordinator.join(&mut s, 1, SYSTEM_AUTHOR, "lobby"),
            Err(JoinError::ReservedUsername)
        );
        assert!(matches!(
            coordinator.join(&mut s, 2, "", "lobby"),
            Err(JoinError::InvalidUsername(_))
        ));
        assert!(matches!(
            coordinator.join(&mut s, 3, "alice", ""),
            Err(JoinError::InvalidRoom(_))
        ));

        assert_eq!(coordinator.occupancy("lobby"), 0);
        let errors: Vec<u16> = sink
            .to("conn-s")
            .iter()
            .map(|f| match f {
                Frame::Error { code, .. } => *code,
                other => panic!("expected error frame, got {other:?}"),
            })
            .collect();
        assert_eq!(
            errors,
            vec![
                codes::RESERVED_USERNAME,
                codes::INVALID_USERNAME,
                codes::INVALID_ROOM
            ]
        );
    }

    #[test]
    fn test_double_join_rejected() {
        let (_sink, coordinator) = harness();
        let mut a = Session::new("conn-a");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        assert_eq!(
            coordinator.join(&mut a, 2, "alice2", "den"),
            Err(JoinError::AlreadyJoined)
        );
        assert!(a.is_joined());
        assert_eq!(coordinator.occupancy("den"), 0);
    }

    #[test]
    fn test_relay_excludes_sender_and_other_rooms() {
        let (sink, coordinator) = harness();
        let mut a = Session::new("conn-a");
        let mut b = Session::new("conn-b");
        let mut c = Session::new("conn-c");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        coordinator.join(&mut b, 2, "bob", "lobby").unwrap();
        coordinator.join(&mut c, 3, "carol", "den").unwrap();
        sink.clear();

        let recipients = coordinator
            .relay(&b, None, "lobby", "X", Some("bob"), Some("14:32".into()))
            .unwrap();
        assert_eq!(recipients, 1);

        let delivered = messages(&sink.to("conn-a"));
        assert_eq!(delivered, vec![(delivered[0].0, "X".into(), "bob".into())]);
        assert!(sink.to("conn-b").is_empty());
        assert!(sink.to("conn-c").is_empty());
    }

    #[test]
    fn test_relay_acks_when_requested() {
        let (sink, coordinator) = harness();
        let mut a = Session::new("conn-a");
        let mut b = Session::new("conn-b");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        coordinator.join(&mut b, 2, "bob", "lobby").unwrap();
        sink.clear();

        coordinator
            .relay(&b, Some(9), "lobby", "X", None, None)
            .unwrap();
        assert_eq!(sink.to("conn-b"), vec![Frame::ack(9)]);
    }

    #[test]
    fn test_relay_empty_body_dropped_silently() {
        let (sink, coordinator) = harness();
        let mut a = Session::new("conn-a");
        let mut b = Session::new("conn-b");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        coordinator.join(&mut b, 2, "bob", "lobby").unwrap();
        sink.clear();

        assert_eq!(
            coordinator.relay(&b, Some(9), "lobby", "", None, None),
            Ok(0)
        );
        // No relay, no ack, no error: silence.
        assert_eq!(sink.total(), 0);
    }

    #[test]
    fn test_relay_room_mismatch_rejected() {
        let (sink, coordinator) = harness();
        let mut a = Session::new("conn-a");
        let mut b = Session::new("conn-b");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        coordinator.join(&mut b, 2, "bob", "lobby").unwrap();
        sink.clear();

        let err = coordinator
            .relay(&b, Some(9), "den", "X", None, None)
            .unwrap_err();
        assert!(matches!(err, RelayError::RoomMismatch { .. }));

        assert!(sink.to("conn-a").is_empty());
        assert_eq!(
            sink.to("conn-b"),
            vec![Frame::error(9, codes::ROOM_MISMATCH, err.to_string())]
        );
    }

    #[test]
    fn test_relay_before_join_rejected() {
        let (sink, coordinator) = harness();
        let s = Session::new("conn-s");

        assert_eq!(
            coordinator.relay(&s, None, "lobby", "X", None, None),
            Err(RelayError::NotJoined)
        );
        // Without a request id there is nothing to answer.
        assert_eq!(sink.total(), 0);
    }

    #[test]
    fn test_relay_stamps_author_from_registry() {
        let (sink, coordinator) = harness();
        let mut a = Session::new("conn-a");
        let mut b = Session::new("conn-b");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        coordinator.join(&mut b, 2, "bob", "lobby").unwrap();
        sink.clear();

        coordinator
            .relay(&b, None, "lobby", "X", Some(SYSTEM_AUTHOR), None)
            .unwrap();

        let delivered = messages(&sink.to("conn-a"));
        assert_eq!(delivered[0].2, "bob");
    }

    #[test]
    fn test_leave_notifies_remaining_members() {
        let (sink, coordinator) = harness();
        let mut a = Session::new("conn-a");
        let mut b = Session::new("conn-b");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        coordinator.join(&mut b, 2, "bob", "lobby").unwrap();
        let secret = metas(&sink.to("conn-a"))[0].1.clone();
        sink.clear();

        let record = coordinator.leave(&mut b).unwrap();
        assert_eq!(record.username, "bob");
        assert_eq!(b.state(), SessionState::Closed);

        // Remaining member: decremented count, unchanged secret, then
        // the departure announcement.
        let to_a = sink.to("conn-a");
        assert_eq!(metas(&to_a), vec![(1, secret)]);
        let announced = messages(&to_a);
        assert_eq!(announced.len(), 1);
        assert!(announced[0].1.contains("bob"));
        assert_eq!(announced[0].2, SYSTEM_AUTHOR);
        assert!(matches!(to_a[0], Frame::Meta { .. }));

        // The departed member hears nothing.
        assert!(sink.to("conn-b").is_empty());
        assert_eq!(coordinator.occupancy("lobby"), 1);

        // Idempotent.
        assert!(coordinator.leave(&mut b).is_none());
    }

    #[test]
    fn test_leave_before_join_is_noop() {
        let (sink, coordinator) = harness();
        let mut s = Session::new("conn-s");

        assert!(coordinator.leave(&mut s).is_none());
        assert_eq!(s.state(), SessionState::Closed);
        assert_eq!(sink.total(), 0);

        // Closed is terminal.
        assert_eq!(
            coordinator.join(&mut s, 1, "alice", "lobby"),
            Err(JoinError::Closed)
        );
    }

    #[test]
    fn test_last_leave_erases_room() {
        let (sink, coordinator) = harness();
        let mut a = Session::new("conn-a");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        let first_secret = metas(&sink.to("conn-a"))[0].1.clone();
        sink.clear();

        coordinator.leave(&mut a).unwrap();
        // Empty room: no listeners remain, nothing is emitted.
        assert_eq!(sink.total(), 0);
        assert_eq!(coordinator.occupancy("lobby"), 0);
        assert_eq!(coordinator.stats().rooms, 0);

        // A reborn room is a fresh room: new secret, uids start over.
        let mut a2 = Session::new("conn-a2");
        coordinator.join(&mut a2, 1, "alice", "lobby").unwrap();
        let second_secret = metas(&sink.to("conn-a2"))[0].1.clone();
        assert_ne!(first_secret, second_secret);
    }

    #[test]
    fn test_uids_are_monotonic_within_a_room() {
        let (sink, coordinator) = harness();
        let mut a = Session::new("conn-a");
        let mut b = Session::new("conn-b");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        coordinator.join(&mut b, 2, "bob", "lobby").unwrap();
        sink.clear();

        coordinator.relay(&b, None, "lobby", "one", None, None).unwrap();
        coordinator.relay(&a, None, "lobby", "two", None, None).unwrap();
        coordinator.relay(&b, None, "lobby", "three", None, None).unwrap();

        let uids: Vec<u64> = sink
            .events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, f)| match f {
                Frame::Message { uid, .. } => Some(*uid),
                _ => None,
            })
            .collect();
        assert_eq!(uids.len(), 3);
        assert!(uids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_lobby_scenario_end_to_end() {
        let (sink, coordinator) = harness();
        let mut a = Session::new("conn-a");
        let mut b = Session::new("conn-b");
        let mut c = Session::new("conn-c");

        // A joins as alice: meta{count:1} to A only.
        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        assert_eq!(metas(&sink.to("conn-a")).len(), 1);
        assert_eq!(metas(&sink.to("conn-a"))[0].0, 1);

        // B joins as bob: meta{count:2} to both, announcement to A only.
        sink.clear();
        coordinator.join(&mut b, 2, "bob", "lobby").unwrap();
        assert_eq!(metas(&sink.to("conn-a"))[0].0, 2);
        assert_eq!(metas(&sink.to("conn-b"))[0].0, 2);
        assert_eq!(messages(&sink.to("conn-a")).len(), 1);
        assert!(messages(&sink.to("conn-b")).is_empty());

        // C attempts to join as alice: rejected, registry unchanged.
        sink.clear();
        assert!(coordinator.join(&mut c, 3, "alice", "lobby").is_err());
        assert_eq!(coordinator.occupancy("lobby"), 2);

        // B sends ciphertext "X": only A receives it.
        sink.clear();
        coordinator.relay(&b, None, "lobby", "X", None, None).unwrap();
        let to_a = messages(&sink.to("conn-a"));
        assert_eq!(to_a[0].1, "X");
        assert_eq!(to_a[0].2, "bob");
        assert!(sink.to("conn-b").is_empty());

        // B disconnects: meta{count:1} and "bob left" reach A, who stays.
        sink.clear();
        coordinator.leave(&mut b).unwrap();
        assert_eq!(metas(&sink.to("conn-a"))[0].0, 1);
        assert!(messages(&sink.to("conn-a"))[0].1.contains("bob"));
    }

    #[test]
    fn test_stats() {
        let (_sink, coordinator) = harness();
        let mut a = Session::new("conn-a");
        let mut b = Session::new("conn-b");
        let mut c = Session::new("conn-c");

        coordinator.join(&mut a, 1, "alice", "lobby").unwrap();
        coordinator.join(&mut b, 2, "bob", "lobby").unwrap();
        coordinator.join(&mut c, 3, "carol", "den").unwrap();

        let stats = coordinator.stats();
        assert_eq!(stats.connections, 3);
        assert_eq!(stats.rooms, 2);
    }
}
