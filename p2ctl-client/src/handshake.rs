//! Control channel handshake state machine.
//!
//! ```text
//! Disconnected --tcp up / Login--> AwaitingEncryptionKey
//!   --Realm+Nonce / env query--> AwaitingEnvironmentInfo
//!   --Version / connect on + name--> AwaitingSessionId
//!   --CamCtl SessionID--> Connected
//! ```
//!
//! Frames that do not carry what the current state waits for are ignored.
//! The machine does no I/O; it returns the payloads to send.

use p2ctl_protocol::{auth_token, commands, Encoder, Envelope, EnvironmentInfo};

/// Control channel connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    AwaitingEncryptionKey,
    AwaitingEnvironmentInfo,
    AwaitingSessionId,
    Connected,
}

/// Challenge received from the camera and the token derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub realm: String,
    pub nonce: String,
    pub token: String,
}

/// Something the driver must do in response to a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeAction {
    /// Wrap and send a control payload.
    Send(String),
    /// Environment info was received.
    EnvironmentInfo(EnvironmentInfo),
    /// The session was established; telemetry may start.
    Established,
    /// The camera reported an error.
    CameraError(String),
}

/// Per-connection authentication and session state.
#[derive(Debug)]
pub struct ControlSession {
    username: String,
    password: String,
    state: ConnectionState,
    auth: Option<AuthContext>,
    environment: Option<EnvironmentInfo>,
    session_id: Option<String>,
}

impl ControlSession {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            state: ConnectionState::Disconnected,
            auth: None,
            environment: None,
            session_id: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn auth(&self) -> Option<&AuthContext> {
        self.auth.as_ref()
    }

    pub fn environment(&self) -> Option<&EnvironmentInfo> {
        self.environment.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Starts a handshake on a freshly established TCP connection.
    ///
    /// Returns the login payload.
    pub fn begin(&mut self) -> String {
        self.reset();
        self.state = ConnectionState::AwaitingEncryptionKey;
        commands::login(&self.username)
    }

    /// Drops all per-connection state.
    pub fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.auth = None;
        self.environment = None;
        self.session_id = None;
    }

    /// Wraps a payload with the current token and session id.
    pub fn wrap(&self, payload: &str) -> String {
        Encoder::wrap(
            payload,
            self.auth.as_ref().map(|a| a.token.as_str()),
            Some(self.session_id.as_deref().unwrap_or("")),
        )
    }

    /// Advances the handshake with an inbound envelope.
    pub fn handle(&mut self, envelope: &Envelope) -> Vec<HandshakeAction> {
        if let Some(error) = envelope.error() {
            return vec![HandshakeAction::CameraError(error)];
        }

        match self.state {
            ConnectionState::AwaitingEncryptionKey => self.on_challenge(envelope),
            ConnectionState::AwaitingEnvironmentInfo => self.on_environment(envelope),
            ConnectionState::AwaitingSessionId => self.on_session(envelope),
            ConnectionState::Disconnected | ConnectionState::Connected => Vec::new(),
        }
    }

    fn on_challenge(&mut self, envelope: &Envelope) -> Vec<HandshakeAction> {
        let Some(response) = envelope.response() else {
            return Vec::new();
        };
        let realm = response.child_text("Realm");
        let nonce = response.child_text("Nonce");
        let (Some(realm), Some(nonce)) = (realm, nonce) else {
            return Vec::new();
        };

        let token = auth_token(&self.username, &self.password, realm, nonce);
        self.auth = Some(AuthContext {
            realm: realm.to_string(),
            nonce: nonce.to_string(),
            token,
        });
        self.state = ConnectionState::AwaitingEnvironmentInfo;

        vec![HandshakeAction::Send(commands::ENV_QUERY.to_string())]
    }

    fn on_environment(&mut self, envelope: &Envelope) -> Vec<HandshakeAction> {
        let Some(environment) = envelope.response().and_then(EnvironmentInfo::from_response) else {
            return Vec::new();
        };

        let connect_on = commands::connect_on(&environment.device.model_name);
        self.environment = Some(environment.clone());
        self.state = ConnectionState::AwaitingSessionId;

        vec![
            HandshakeAction::EnvironmentInfo(environment),
            HandshakeAction::Send(connect_on),
        ]
    }

    fn on_session(&mut self, envelope: &Envelope) -> Vec<HandshakeAction> {
        let Some(session_id) = envelope.session_id() else {
            return Vec::new();
        };

        self.session_id = Some(session_id.to_string());
        self.state = ConnectionState::Connected;

        vec![HandshakeAction::Established]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(xml: &str) -> Envelope {
        Envelope::parse(xml).unwrap()
    }

    const CHALLENGE: &str =
        "<P2Control><Response><Realm>X</Realm><Nonce>Y</Nonce></Response></P2Control>";
    const VERSION_ONLY: &str = "<P2Control><Response><Version>1.0</Version></Response></P2Control>";
    const SESSION: &str = r#"<P2Control><CamCtl SessionID="abc123"/></P2Control>"#;

    fn session_in(state: ConnectionState) -> ControlSession {
        let mut session = ControlSession::new("admin", "secret");
        session.begin();
        if state == ConnectionState::AwaitingEncryptionKey {
            return session;
        }
        session.handle(&envelope(CHALLENGE));
        if state == ConnectionState::AwaitingEnvironmentInfo {
            return session;
        }
        session.handle(&envelope(VERSION_ONLY));
        if state == ConnectionState::AwaitingSessionId {
            return session;
        }
        session.handle(&envelope(SESSION));
        session
    }

    #[test]
    fn test_begin_sends_login() {
        let mut session = ControlSession::new("admin", "secret");
        assert_eq!(session.state(), ConnectionState::Disconnected);

        let login = session.begin();
        assert_eq!(login, "<Login>admin</Login>");
        assert_eq!(session.state(), ConnectionState::AwaitingEncryptionKey);
        assert_eq!(
            session.wrap(&login),
            "<P2Control><SessionID></SessionID><Login>admin</Login></P2Control>"
        );
    }

    #[test]
    fn test_challenge_derives_token() {
        let mut session = session_in(ConnectionState::AwaitingEncryptionKey);
        assert!(session.auth().is_none());

        let actions = session.handle(&envelope(CHALLENGE));
        assert_eq!(
            actions,
            vec![HandshakeAction::Send(r#"<Query Type="env"/>"#.to_string())]
        );
        assert_eq!(session.state(), ConnectionState::AwaitingEnvironmentInfo);

        let auth = session.auth().unwrap();
        assert_eq!(auth.realm, "X");
        assert_eq!(auth.nonce, "Y");
        assert_eq!(auth.token, "64ded122b308311a60eb76af24b704f4");
        assert!(session
            .wrap("<Query/>")
            .starts_with("<P2Control><Auth>64ded122b308311a60eb76af24b704f4</Auth>"));
    }

    #[test]
    fn test_challenge_requires_realm_and_nonce() {
        let mut session = session_in(ConnectionState::AwaitingEncryptionKey);

        let partial = "<P2Control><Response><Realm>X</Realm></Response></P2Control>";
        assert!(session.handle(&envelope(partial)).is_empty());
        assert_eq!(session.state(), ConnectionState::AwaitingEncryptionKey);
        assert!(session.auth().is_none());
    }

    #[test]
    fn test_version_ignored_while_awaiting_key() {
        let mut session = session_in(ConnectionState::AwaitingEncryptionKey);
        assert!(session.handle(&envelope(VERSION_ONLY)).is_empty());
        assert_eq!(session.state(), ConnectionState::AwaitingEncryptionKey);
    }

    #[test]
    fn test_version_advances_when_awaiting_environment() {
        let mut session = session_in(ConnectionState::AwaitingEnvironmentInfo);
        let actions = session.handle(&envelope(VERSION_ONLY));
        assert_eq!(session.state(), ConnectionState::AwaitingSessionId);
        assert_eq!(actions.len(), 2);
        assert!(matches!(
            &actions[0],
            HandshakeAction::EnvironmentInfo(env) if env.version == "1.0"
        ));
        assert_eq!(
            actions[1],
            HandshakeAction::Send(
                "<CamCtl>$Connect:=On</CamCtl><CamCtl>$MyName:sRC_P2Package_NodeJS</CamCtl>".into()
            )
        );
    }

    #[test]
    fn test_environment_registers_model_name() {
        let mut session = session_in(ConnectionState::AwaitingEnvironmentInfo);
        let actions = session.handle(&envelope(
            "<P2Control><Response><Version>1.0</Version>\
             <Device><ModelName>HC-X20</ModelName></Device>\
             <RTInfo><Port>50000</Port></RTInfo></Response></P2Control>",
        ));
        assert!(actions.contains(&HandshakeAction::Send(
            "<CamCtl>$Connect:=On</CamCtl><CamCtl>$MyName:sRC_SemiProApp_NodeJS</CamCtl>".into()
        )));
        let env = session.environment().unwrap();
        assert_eq!(env.udp_port, Some(50000));
        assert_eq!(env.device.model_name, "HC-X20");
    }

    #[test]
    fn test_session_id_establishes() {
        let mut session = session_in(ConnectionState::AwaitingSessionId);

        // CamCtl without a session id is not enough.
        let ack = "<P2Control><CamCtl>$Connect:=On</CamCtl></P2Control>";
        assert!(session.handle(&envelope(ack)).is_empty());
        assert_eq!(session.state(), ConnectionState::AwaitingSessionId);

        let actions = session.handle(&envelope(SESSION));
        assert_eq!(actions, vec![HandshakeAction::Established]);
        assert!(session.is_connected());
        assert_eq!(session.session_id(), Some("abc123"));
        assert!(session.wrap("").contains("<SessionID>abc123</SessionID>"));
    }

    #[test]
    fn test_error_does_not_transition() {
        let mut session = session_in(ConnectionState::AwaitingEncryptionKey);
        let actions = session.handle(&envelope(
            "<P2Control><Error>Login failed</Error><Response><Realm>X</Realm><Nonce>Y</Nonce></Response></P2Control>",
        ));
        assert_eq!(
            actions,
            vec![HandshakeAction::CameraError("Login failed".into())]
        );
        assert_eq!(session.state(), ConnectionState::AwaitingEncryptionKey);
    }

    #[test]
    fn test_frames_ignored_when_connected_or_disconnected() {
        let mut session = session_in(ConnectionState::Connected);
        assert!(session.handle(&envelope(CHALLENGE)).is_empty());
        assert!(session.handle(&envelope(SESSION)).is_empty());
        assert_eq!(session.state(), ConnectionState::Connected);

        let mut idle = ControlSession::new("a", "b");
        assert!(idle.handle(&envelope(CHALLENGE)).is_empty());
        assert_eq!(idle.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_reset_clears_session() {
        let mut session = session_in(ConnectionState::Connected);
        session.reset();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.auth().is_none());
        assert!(session.environment().is_none());
        assert!(session.session_id().is_none());
        assert_eq!(
            session.wrap("<X/>"),
            "<P2Control><SessionID></SessionID><X/></P2Control>"
        );
    }
}
