//! Shared types, enums, error types, and payloads for the session bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Connection stage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Coarse lifecycle phase of the tunnel negotiation.
///
/// Declaration order is significant: raw-token matching walks the variants
/// in this order and the first canonical name containing the token wins
/// (see [`crate::session::stage::parse_stage`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VpnStage {
    /// Platform is preparing the tunnel device.
    Prepare,
    /// Credentials are being checked.
    Authenticating,
    /// Transport-level connection in progress.
    Connecting,
    /// Post-handshake authentication exchange.
    Authentication,
    /// Tunnel is up and traffic is flowing.
    Connected,
    /// No active session.
    Disconnected,
    /// Graceful teardown in progress.
    Disconnecting,
    /// Server refused the session.
    Denied,
    /// Engine reported a failure.
    Error,
    /// Waiting for the network to become reachable.
    WaitConnection,
    /// Engine is rendering the effective config.
    VpnGenerateConfig,
    /// Waiting for the server to push config.
    GetConfig,
    TcpConnect,
    UdpConnect,
    /// Tunnel address assignment.
    AssignIp,
    /// Resolving the remote hostname.
    Resolve,
    /// Engine process is exiting.
    Exiting,
    /// Raw token matched no canonical stage name.
    Unknown,
}

impl VpnStage {
    /// Every matchable stage, in declaration order. `Unknown` is the
    /// parser fallback and is deliberately absent.
    pub const ALL: [VpnStage; 17] = [
        VpnStage::Prepare,
        VpnStage::Authenticating,
        VpnStage::Connecting,
        VpnStage::Authentication,
        VpnStage::Connected,
        VpnStage::Disconnected,
        VpnStage::Disconnecting,
        VpnStage::Denied,
        VpnStage::Error,
        VpnStage::WaitConnection,
        VpnStage::VpnGenerateConfig,
        VpnStage::GetConfig,
        VpnStage::TcpConnect,
        VpnStage::UdpConnect,
        VpnStage::AssignIp,
        VpnStage::Resolve,
        VpnStage::Exiting,
    ];

    /// Canonical (wire) name of the stage.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Authenticating => "authenticating",
            Self::Connecting => "connecting",
            Self::Authentication => "authentication",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Disconnecting => "disconnecting",
            Self::Denied => "denied",
            Self::Error => "error",
            Self::WaitConnection => "wait_connection",
            Self::VpnGenerateConfig => "vpn_generate_config",
            Self::GetConfig => "get_config",
            Self::TcpConnect => "tcp_connect",
            Self::UdpConnect => "udp_connect",
            Self::AssignIp => "assign_ip",
            Self::Resolve => "resolve",
            Self::Exiting => "exiting",
            Self::Unknown => "unknown",
        }
    }
}

impl Default for VpnStage {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl fmt::Display for VpnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Platform identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which native engine flavor is feeding this bridge.
///
/// The two platforms report status in differently shaped payloads; the
/// identity is supplied by the embedder, never auto-detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Structured key-value status payload (`connected_on`, `byte_in`, …).
    Android,
    /// Underscore-delimited flat status payload.
    Ios,
}

impl Platform {
    /// Resolve an externally supplied platform identity.
    ///
    /// Anything other than the two known engines is an
    /// [`SessionErrorKind::UnsupportedPlatform`] error – never defaulted.
    pub fn from_name(name: &str) -> Result<Self, SessionError> {
        match name.trim().to_lowercase().as_str() {
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            other => Err(SessionError::new(
                SessionErrorKind::UnsupportedPlatform,
                format!("unsupported platform '{}'", other),
            )),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Android => write!(f, "android"),
            Self::Ios => write!(f, "ios"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Status snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fine-grained session metrics sampled while connected.
///
/// Counters are decimal strings as reported by the engines. Platforms that
/// do not track packet counts separately report packets equal to bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnStatus {
    pub connected_since: Option<DateTime<Utc>>,
    /// Elapsed session time, zero-padded `HH:MM:SS` (hours unwrapped).
    pub duration: String,
    pub bytes_in: String,
    pub bytes_out: String,
    pub packets_in: String,
    pub packets_out: String,
}

impl VpnStatus {
    /// The no-active-session sentinel.
    pub fn empty() -> Self {
        Self {
            connected_since: None,
            duration: "00:00:00".to_string(),
            bytes_in: "0".to_string(),
            bytes_out: "0".to_string(),
            packets_in: "0".to_string(),
            packets_out: "0".to_string(),
        }
    }
}

impl Default for VpnStatus {
    fn default() -> Self {
        Self::empty()
    }
}

/// Point-in-time session snapshot exposed by the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub stage: VpnStage,
    pub connected_since: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Requests toward the native layer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Username/password pair for engines that authenticate interactively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpnCredentials {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl VpnCredentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// One-time engine setup options passed through `initialize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitOptions {
    /// Shared app-group identifier for engines sandboxed per extension.
    pub group_identifier: Option<String>,
    /// Bundle identifier of the packet-tunnel provider.
    pub provider_bundle_identifier: Option<String>,
    /// Description shown by the OS next to the tunnel entry.
    pub localized_description: Option<String>,
}

/// Everything the native layer needs to bring a tunnel up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Full config script handed to the engine verbatim.
    pub config: String,
    /// Human-readable session name.
    pub name: String,
    pub credentials: Option<VpnCredentials>,
    /// App identifiers excluded from the tunnel.
    pub bypass_packages: Vec<String>,
}

impl ConnectRequest {
    pub fn new(config: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            config: config.into(),
            name: name.into(),
            credentials: None,
            bypass_packages: Vec::new(),
        }
    }

    pub fn with_credentials(mut self, credentials: VpnCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Crate-level error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionErrorKind {
    /// Connect/status operation invoked before `initialize` completed.
    NotInitialized,
    /// Platform identity names no known engine.
    UnsupportedPlatform,
    /// Config script cannot be transformed (e.g. no remote directives).
    InvalidConfig,
    /// The native side rejected a command.
    TransportFailed,
    /// The raw stage-event subscription terminated.
    EventFeedClosed,
}

/// Crate-level error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl SessionError {
    pub fn new(kind: SessionErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(d) = &self.detail {
            write!(f, " ({})", d)?;
        }
        Ok(())
    }
}

impl std::error::Error for SessionError {}

impl From<SessionError> for String {
    fn from(e: SessionError) -> String {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── VpnStage ─────────────────────────────────────────────────

    #[test]
    fn stage_serde_roundtrip() {
        for stage in VpnStage::ALL {
            let json = serde_json::to_string(&stage).unwrap();
            let back: VpnStage = serde_json::from_str(&json).unwrap();
            assert_eq!(stage, back);
        }
    }

    #[test]
    fn stage_wire_names_match_serde() {
        for stage in VpnStage::ALL {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage.name()));
        }
    }

    #[test]
    fn stage_display() {
        assert_eq!(VpnStage::WaitConnection.to_string(), "wait_connection");
        assert_eq!(VpnStage::VpnGenerateConfig.to_string(), "vpn_generate_config");
        assert_eq!(VpnStage::Connected.to_string(), "connected");
    }

    #[test]
    fn stage_default_is_disconnected() {
        assert_eq!(VpnStage::default(), VpnStage::Disconnected);
    }

    // ── Platform ─────────────────────────────────────────────────

    #[test]
    fn platform_from_name() {
        assert_eq!(Platform::from_name("android").unwrap(), Platform::Android);
        assert_eq!(Platform::from_name(" iOS ").unwrap(), Platform::Ios);
        assert_eq!(Platform::from_name("ANDROID").unwrap(), Platform::Android);
    }

    #[test]
    fn platform_from_name_unsupported() {
        let err = Platform::from_name("windows").unwrap_err();
        assert_eq!(err.kind, SessionErrorKind::UnsupportedPlatform);
        assert!(err.to_string().contains("windows"));
    }

    #[test]
    fn platform_serde() {
        let json = serde_json::to_string(&Platform::Ios).unwrap();
        assert_eq!(json, "\"ios\"");
        let back: Platform = serde_json::from_str("\"android\"").unwrap();
        assert_eq!(back, Platform::Android);
    }

    // ── VpnStatus ────────────────────────────────────────────────

    #[test]
    fn status_empty_sentinel() {
        let s = VpnStatus::empty();
        assert!(s.connected_since.is_none());
        assert_eq!(s.duration, "00:00:00");
        assert_eq!(s.bytes_in, "0");
        assert_eq!(s.packets_out, "0");
    }

    #[test]
    fn status_serde_roundtrip() {
        let s = VpnStatus {
            connected_since: Some(Utc::now()),
            duration: "01:02:03".into(),
            bytes_in: "1000".into(),
            bytes_out: "2000".into(),
            packets_in: "10".into(),
            packets_out: "20".into(),
        };
        let json = serde_json::to_string(&s).unwrap();
        let back: VpnStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }

    // ── Credentials / requests ───────────────────────────────────

    #[test]
    fn credentials_basic() {
        let c = VpnCredentials::basic("user", "pass");
        assert_eq!(c.username, "user");
        assert_eq!(c.password, "pass");
    }

    #[test]
    fn credentials_password_not_serialized() {
        let c = VpnCredentials::basic("user", "secret");
        let json = serde_json::to_string(&c).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn connect_request_builder() {
        let r = ConnectRequest::new("remote a 1194", "Office")
            .with_credentials(VpnCredentials::basic("u", "p"));
        assert_eq!(r.name, "Office");
        assert!(r.credentials.is_some());
        assert!(r.bypass_packages.is_empty());
    }

    // ── SessionError ─────────────────────────────────────────────

    #[test]
    fn error_display() {
        let e = SessionError::new(SessionErrorKind::InvalidConfig, "no remotes");
        assert!(e.to_string().contains("no remotes"));
        let e2 = e.with_detail("3 lines scanned");
        assert!(e2.to_string().contains("3 lines scanned"));
    }

    #[test]
    fn error_into_string() {
        let e = SessionError::new(SessionErrorKind::TransportFailed, "engine rejected connect");
        let s: String = e.into();
        assert!(s.contains("engine rejected connect"));
    }
}
