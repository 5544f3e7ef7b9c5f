use rand::Rng;

/// Alphabet without lookalike characters (no 0/O, 1/l/I, etc.), so tokens
/// stay legible in logs and admin UIs.
const TOKEN_ALPHABET: &[u8] = b"346789ABCDEFGHJKLMNPQRTUVWXYabcdefghijkmnpqrtwxyz";
const TOKEN_LEN: usize = 5;

/// Short random token identifying one session of the managed server.
///
/// External state keyed by server lifetime (player list buffers, event
/// routing) is correlated through this token rather than the OS pid, which
/// can be recycled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let token: String = (0..TOKEN_LEN)
            .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
            .collect();
        Self(token)
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supervisor control-path state. At most one phase is active at a time;
/// the delay phases double as the mutual-exclusion markers for concurrent
/// kill/restart requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SupervisorPhase {
    Idle,
    Spawning,
    Running,
    ShuttingDown,
    RespawnDelay,
}

/// Exit record, set exactly once when the managed process terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionExit {
    pub code: Option<i32>,
    pub at_unix_ms: u64,
}

/// One lifetime of the managed server process, from spawn to termination.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionInfo {
    pub pid: u32,
    pub token: SessionToken,
    pub spawned_at_unix_ms: u64,
    pub net_endpoint: String,
    pub exit: Option<SessionExit>,
}

/// Who issued a console command, for audit-trail purposes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CommandAuthor {
    System,
    Admin(String),
}

impl CommandAuthor {
    pub fn display_name(&self) -> &str {
        match self {
            CommandAuthor::System => "warden",
            CommandAuthor::Admin(name) => name,
        }
    }
}

/// Resource lifecycle notifications emitted by the managed server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ResourceLifecycle {
    #[serde(rename = "onResourceStarting")]
    Starting,
    #[serde(rename = "onResourceStart")]
    Started,
    #[serde(rename = "onServerResourceStart")]
    ServerStarted,
    #[serde(rename = "onResourceListRefresh")]
    ListRefresh,
    #[serde(rename = "onResourceStop")]
    Stopped,
    #[serde(rename = "onServerResourceStop")]
    ServerStopped,
}

/// Structured events read from the managed process's auxiliary pipe, one
/// JSON object per line, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "resourceEvent")]
    Resource {
        resource: String,
        event: ResourceLifecycle,
    },
    #[serde(other)]
    Unknown,
}

/// Classification of a console line, used by the logger collaborator to
/// keep stdout, stderr, and injected commands apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConsoleLineKind {
    StdOut,
    StdErr,
    SystemCmd,
    AdminCmd,
    Info,
}

pub fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_has_expected_shape() {
        let t = SessionToken::generate();
        assert_eq!(t.0.len(), TOKEN_LEN);
        assert!(t.0.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
    }

    #[test]
    fn tokens_are_unique_enough() {
        let a = SessionToken::generate();
        let b = SessionToken::generate();
        // 49^5 keyspace; a collision here means the generator is broken.
        assert_ne!(a, b);
    }

    #[test]
    fn resource_event_parses() {
        let ev: ServerEvent =
            serde_json::from_str(r#"{"type":"resourceEvent","resource":"chat","event":"onResourceStart"}"#)
                .unwrap();
        assert_eq!(
            ev,
            ServerEvent::Resource {
                resource: "chat".to_string(),
                event: ResourceLifecycle::Started,
            }
        );
    }

    #[test]
    fn unknown_event_type_maps_to_unknown() {
        let ev: ServerEvent = serde_json::from_str(r#"{"type":"somethingNew","x":1}"#).unwrap();
        assert_eq!(ev, ServerEvent::Unknown);
    }
}
