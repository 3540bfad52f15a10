use crate::config::ViewConfig;
use crate::error::{AddressingError, ConnectionError};
use crate::session::{RenderSink, Session};
use std::fmt;
use tracing::{debug, info};

/// Text frame sent to the server right after the transport opens. Servers
/// treat it as a liveness check and ignore its content.
pub const GREETING: &str = "printwall-viewer:hello";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection reached [`ConnectionState::Closed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Local,
    Transport(String),
}

/// One inbound stream and the session state it feeds.
///
/// Messages are applied only while open, one at a time and in the order
/// they are delivered. Closing freezes the session as it was.
#[derive(Debug, Clone)]
pub struct Connection {
    state: ConnectionState,
    session: Session,
    close_reason: Option<CloseReason>,
    delivered: u64,
    rejected: u64,
}

impl Connection {
    pub fn new(config: ViewConfig) -> Self {
        Self {
            state: ConnectionState::Connecting,
            session: Session::new(config),
            close_reason: None,
            delivered: 0,
            rejected: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    /// Messages applied successfully.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Messages dropped by the dispatcher.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Transport reported open. Returns the greeting to send, or `None` when
    /// the connection is not in `connecting` any more.
    pub fn open(&mut self) -> Option<&'static str> {
        if self.state != ConnectionState::Connecting {
            return None;
        }
        self.state = ConnectionState::Open;
        info!("connection_open");
        Some(GREETING)
    }

    /// Applies one text frame.
    pub fn deliver<S: RenderSink + ?Sized>(
        &mut self,
        text: &str,
        sink: &mut S,
    ) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Open {
            return Err(ConnectionError::NotOpen { state: self.state });
        }
        match self.session.handle_text(text, sink) {
            Ok(()) => {
                self.delivered += 1;
                Ok(())
            }
            Err(err) => {
                self.rejected += 1;
                Err(err.into())
            }
        }
    }

    /// User-driven scroll lock toggle.
    pub fn set_follow(&mut self, index: usize, follow: bool) -> Result<(), ConnectionError> {
        if self.state == ConnectionState::Closed {
            return Err(ConnectionError::NotOpen { state: self.state });
        }
        self.session
            .set_follow(index, follow)
            .map_err(|err: AddressingError| ConnectionError::Dispatch(err.into()))
    }

    /// Runtime change of the per-column group cap.
    pub fn set_max_groups<S: RenderSink + ?Sized>(
        &mut self,
        max_groups: usize,
        sink: &mut S,
    ) -> Result<(), ConnectionError> {
        if self.state == ConnectionState::Closed {
            return Err(ConnectionError::NotOpen { state: self.state });
        }
        self.session.set_max_groups(max_groups, sink)?;
        Ok(())
    }

    /// Local close. Idempotent.
    pub fn close(&mut self) {
        self.transition_closed(CloseReason::Local);
    }

    /// The transport failed or went away. Idempotent, and a no-op after a
    /// local close.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.transition_closed(CloseReason::Transport(reason.into()));
    }

    fn transition_closed(&mut self, reason: CloseReason) {
        if self.state == ConnectionState::Closed {
            debug!("connection_close_ignored: already closed");
            return;
        }
        info!(
            "connection_closed: reason={reason:?} delivered={} rejected={}",
            self.delivered, self.rejected
        );
        self.state = ConnectionState::Closed;
        self.close_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::session::NullSink;

    fn connection() -> Connection {
        Connection::new(ViewConfig::new(4).expect("config"))
    }

    #[test]
    fn rejects_messages_before_open() {
        let mut conn = connection();
        let err = conn
            .deliver(r#"{"cmd":"init_info","val":["a"]}"#, &mut NullSink)
            .expect_err("connecting");
        assert_eq!(
            err,
            ConnectionError::NotOpen {
                state: ConnectionState::Connecting
            }
        );
        assert!(!conn.session().is_initialized());
    }

    #[test]
    fn open_returns_greeting_once() {
        let mut conn = connection();
        assert_eq!(conn.open(), Some(GREETING));
        assert_eq!(conn.open(), None);
        assert_eq!(conn.state(), ConnectionState::Open);
    }

    #[test]
    fn bad_message_does_not_close() {
        let mut conn = connection();
        conn.open();
        let err = conn
            .deliver(r#"{"cmd":"nope","val":null}"#, &mut NullSink)
            .expect_err("unknown");
        assert!(matches!(
            err,
            ConnectionError::Dispatch(DispatchError::Protocol(_))
        ));
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.rejected(), 1);
        conn.deliver(r#"{"cmd":"init_info","val":["a"]}"#, &mut NullSink)
            .expect("still usable");
        assert_eq!(conn.delivered(), 1);
    }

    #[test]
    fn close_is_idempotent_and_freezes_state() {
        let mut conn = connection();
        conn.open();
        conn.deliver(r#"{"cmd":"init_info","val":["a"]}"#, &mut NullSink)
            .expect("init");
        conn.deliver(r#"{"cmd":"print","val":{"col_idx":0,"data":"before"}}"#, &mut NullSink)
            .expect("print");
        conn.close();
        conn.close();
        conn.fail("late error");
        assert_eq!(conn.close_reason(), Some(&CloseReason::Local));

        let err = conn
            .deliver(r#"{"cmd":"print","val":{"col_idx":0,"data":"after"}}"#, &mut NullSink)
            .expect_err("closed");
        assert!(matches!(err, ConnectionError::NotOpen { .. }));
        assert!(conn.set_follow(0, false).is_err());

        let column = conn.session().column(0).expect("column");
        assert_eq!(column.rows().len(), 1);
        assert!(column.follow());
        assert_eq!(conn.open(), None);
    }

    #[test]
    fn max_groups_change_validates_and_evicts() {
        let mut conn = connection();
        conn.open();
        conn.deliver(r#"{"cmd":"init_info","val":["a"]}"#, &mut NullSink)
            .expect("init");
        for id in ["1", "2", "3"] {
            let special_id = id.repeat(32);
            conn.deliver(
                &format!(r#"{{"cmd":"open_group","val":{{"col_idx":0,"special_id":"{special_id}"}}}}"#),
                &mut NullSink,
            )
            .expect("open");
        }
        assert!(matches!(
            conn.set_max_groups(0, &mut NullSink),
            Err(ConnectionError::Config(_))
        ));
        conn.set_max_groups(1, &mut NullSink).expect("lower cap");
        assert_eq!(conn.session().live_group_count(), 1);
        assert_eq!(conn.session().config().max_groups, 1);
    }

    #[test]
    fn transport_failure_closes() {
        let mut conn = connection();
        conn.open();
        conn.fail("connection reset");
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            conn.close_reason(),
            Some(&CloseReason::Transport("connection reset".to_string()))
        );
    }
}
