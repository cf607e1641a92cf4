// ABOUTME: End-to-end tests of the sxinit workflows against a scripted cluster.
// ABOUTME: Uses a temporary config root so persistence is checked on a real directory tree.

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use sx_cluster::{
    derive_token, is_valid_token, AbortHandle, CaCertificate, Cluster, ClusterError, Connector,
};
use sx_config::{ClusterState, ProfileStore};
use sx_init::{
    Bootstrap, InitError, InitOptions, InterruptContext, Prompter, SecretBuffer, TokenError,
};
use tempfile::TempDir;

const HOST: &str = "cluster.example.com";
const UUID: &str = "0e5bd5ff-4c1e-4b9a-9f3b-5b2f6f0d9c11";
const TOKEN: &str = "wFPs+e1B3wMRud8TzGw7YHjS08LWGuoIdfALMZTPLMVFKYM41rVlDwAA";
const OTHER_TOKEN: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// How the fake cluster answers.
#[derive(Clone)]
struct Behaviour {
    uuid: Option<String>,
    accepted_token: String,
    nodes: Vec<String>,
    secure: bool,
    ca: CaCertificate,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            uuid: Some(UUID.to_string()),
            accepted_token: TOKEN.to_string(),
            nodes: vec!["192.168.1.10".into(), "192.168.1.11".into()],
            secure: false,
            ca: CaCertificate::from_der(b"test cluster ca".to_vec()),
        }
    }
}

type CallLog = Arc<Mutex<Vec<String>>>;

struct MockCluster {
    state: ClusterState,
    behaviour: Behaviour,
    calls: CallLog,
    secure: bool,
    abort: AbortHandle,
}

impl MockCluster {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn absorb_reply(&mut self) {
        self.state.connection.uuid = self.behaviour.uuid.clone();
        self.secure = self.behaviour.secure;
    }
}

impl Cluster for MockCluster {
    fn state(&self) -> &ClusterState {
        &self.state
    }

    fn set_ssl_name(&mut self, name: &str) {
        self.state.connection.ssl_name = Some(name.to_string());
    }

    fn set_dns_name(&mut self, name: Option<&str>) {
        self.state.connection.dns_name = name.map(String::from);
    }

    fn reset_hosts(&mut self) {
        self.state.connection.hosts.clear();
    }

    fn add_host(&mut self, host: &str) -> sx_cluster::Result<()> {
        self.record(format!("add_host {host}"));
        self.state.connection.hosts.push(host.to_string());
        Ok(())
    }

    fn set_port(&mut self, port: u16) {
        self.state.connection.port = Some(port);
    }

    fn set_tls_material(&mut self, certificate: Option<&CaCertificate>) {
        self.state.connection.use_tls = certificate.is_some();
        self.state.ca_certificate = certificate.map(CaCertificate::to_pem);
    }

    fn add_credential(&mut self, profile: &str, token: &str) -> sx_cluster::Result<()> {
        if !is_valid_token(token) {
            return Err(ClusterError::InvalidToken("malformed"));
        }
        self.state
            .credentials
            .insert(profile.to_string(), token.to_string());
        Ok(())
    }

    fn activate_credential(&mut self, profile: &str) -> sx_cluster::Result<()> {
        self.state.active_profile = Some(profile.to_string());
        Ok(())
    }

    fn fetch_membership(&mut self) -> sx_cluster::Result<()> {
        self.record("fetch_membership");
        self.absorb_reply();
        if self.state.active_token() != Some(self.behaviour.accepted_token.as_str()) {
            return Err(ClusterError::Auth("401 Unauthorized".into()));
        }
        self.state.connection.hosts = self.behaviour.nodes.clone();
        Ok(())
    }

    fn fetch_ca(&mut self) -> sx_cluster::Result<CaCertificate> {
        self.record("fetch_ca");
        self.absorb_reply();
        Ok(self.behaviour.ca.clone())
    }

    fn internally_secure(&self) -> bool {
        self.secure
    }

    fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

#[derive(Clone, Default)]
struct MockConnector {
    behaviour: Behaviour,
    calls: CallLog,
}

impl Connector for MockConnector {
    type Cluster = MockCluster;

    fn connect(&self, state: ClusterState) -> MockCluster {
        self.calls.lock().unwrap().push("connect".into());
        MockCluster {
            state,
            behaviour: self.behaviour.clone(),
            calls: Arc::clone(&self.calls),
            secure: false,
            abort: AbortHandle::default(),
        }
    }
}

#[derive(Default)]
struct ScriptedPrompter {
    lines: VecDeque<String>,
    passwords: VecDeque<String>,
    answers: VecDeque<bool>,
    prompts: Vec<String>,
}

impl Prompter for ScriptedPrompter {
    fn read_line(&mut self, prompt: &str, _limit: usize) -> io::Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.lines.pop_front())
    }

    fn read_password(&mut self, prompt: &str, secret: &mut SecretBuffer) -> io::Result<()> {
        self.prompts.push(prompt.to_string());
        let password = self
            .passwords
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        secret.set(password.as_bytes());
        Ok(())
    }

    fn confirm(&mut self, prompt: &str, _default: bool) -> io::Result<bool> {
        self.prompts.push(prompt.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
    }
}

struct Harness {
    dir: TempDir,
    connector: MockConnector,
    prompter: ScriptedPrompter,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            connector: MockConnector::default(),
            prompter: ScriptedPrompter::default(),
        }
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("sx")
    }

    fn store(&self) -> ProfileStore {
        ProfileStore::new(self.root())
    }

    fn write_file(&self, name: &str, content: &str) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn calls(&self) -> Vec<String> {
        self.connector.calls.lock().unwrap().clone()
    }

    /// Runs one sxinit invocation, returning its output and the prompts shown.
    fn run(&mut self, options: InitOptions) -> (Result<(), InitError>, String, Vec<String>) {
        let mode = match options.validate() {
            Ok(mode) => mode,
            Err(e) => return (Err(e), String::new(), Vec::new()),
        };
        let prompter = std::mem::take(&mut self.prompter);
        let mut bootstrap = Bootstrap::new(self.store(), self.connector.clone(), prompter);
        let mut out = Vec::new();
        let result = bootstrap.run(&mode, &mut out);
        let prompts = bootstrap.prompter().prompts.clone();
        (result, String::from_utf8(out).unwrap(), prompts)
    }
}

fn address(uri: &str) -> InitOptions {
    InitOptions {
        addresses: vec![uri.to_string()],
        ..Default::default()
    }
}

fn with_key_file(h: &Harness, uri: &str, token: &str) -> InitOptions {
    InitOptions {
        auth_file: Some(h.write_file("key", &format!("{token}\n"))),
        batch: true,
        ..address(uri)
    }
}

#[test]
fn test_key_file_init_over_tls_persists_everything() {
    let mut h = Harness::new();
    let options = with_key_file(&h, &format!("sx://{HOST}"), TOKEN);

    let (result, out, prompts) = h.run(options);
    result.unwrap();
    assert!(out.contains("configured"));
    assert!(prompts.is_empty(), "batch mode must not prompt: {prompts:?}");

    let state = h.store().load(HOST).unwrap().expect("cluster should be saved");
    assert_eq!(state.credentials.get("default").map(String::as_str), Some(TOKEN));
    assert_eq!(state.connection.uuid.as_deref(), Some(UUID));
    assert_eq!(state.connection.dns_name.as_deref(), Some(HOST));
    assert_eq!(state.connection.hosts, vec!["192.168.1.10", "192.168.1.11"]);
    assert!(state.connection.use_tls);
    let pem = state.ca_certificate.expect("CA should be stored");
    assert_eq!(
        CaCertificate::from_pem(&pem).unwrap(),
        Behaviour::default().ca
    );
}

#[test]
fn test_host_list_adds_nodes_in_order() {
    let mut h = Harness::new();
    let options = InitOptions {
        host_list: Some("10.0.0.1,10.0.0.2,10.0.0.3".into()),
        ..with_key_file(&h, &format!("sx://{HOST}"), TOKEN)
    };

    h.run(options).0.unwrap();

    let added: Vec<_> = h
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("add_host"))
        .collect();
    assert_eq!(
        added,
        vec!["add_host 10.0.0.1", "add_host 10.0.0.2", "add_host 10.0.0.3"]
    );
    let state = h.store().load(HOST).unwrap().unwrap();
    assert_eq!(state.connection.dns_name, None);
}

#[test]
fn test_empty_host_list_segment_fails_before_any_side_effect() {
    let mut h = Harness::new();
    let options = InitOptions {
        host_list: Some("10.0.0.1,,10.0.0.2".into()),
        ..with_key_file(&h, &format!("sx://{HOST}"), TOKEN)
    };

    let (result, _, _) = h.run(options);
    assert!(matches!(result, Err(InitError::Argument(_))));
    assert!(h.calls().is_empty());
    assert!(!h.root().exists());
}

#[test]
fn test_zero_port_rejected() {
    let mut h = Harness::new();
    let options = InitOptions {
        port: Some(0),
        ..with_key_file(&h, &format!("sx://{HOST}"), TOKEN)
    };
    let (result, _, _) = h.run(options);
    assert_eq!(result.unwrap_err().to_string(), "Invalid port given: 0");

    let link = InitOptions {
        config_link: Some(format!("sx://{HOST}?token={TOKEN}&port=0")),
        batch: true,
        ..Default::default()
    };
    let (result, _, _) = h.run(link);
    assert!(matches!(result, Err(InitError::Parse { .. })));
    assert!(h.calls().is_empty());
}

#[test]
fn test_cluster_token_is_rejected() {
    let mut h = Harness::new();
    let cluster_token = format!("CLUSTER/ALLNODE/ROOT/USER{}", &TOKEN[25..]);
    let options = with_key_file(&h, &format!("sx://{HOST}"), &cluster_token);

    let (result, _, _) = h.run(options);
    assert!(matches!(
        result,
        Err(InitError::Token(TokenError::ClusterToken))
    ));
    assert!(h.store().load(HOST).unwrap().is_none());

    let link = InitOptions {
        config_link: Some(format!("sx://{HOST}?token={cluster_token}")),
        batch: true,
        ..Default::default()
    };
    let (result, _, _) = h.run(link);
    assert!(matches!(
        result,
        Err(InitError::Token(TokenError::ClusterToken))
    ));
}

#[test]
fn test_rejected_credentials_leave_no_trace() {
    let mut h = Harness::new();
    let options = with_key_file(&h, &format!("sx://{HOST}"), OTHER_TOKEN);

    let (result, _, _) = h.run(options);
    let err = result.unwrap_err();
    assert!(matches!(err, InitError::Network { .. }), "{err:?}");
    assert!(!h.root().join(HOST).exists());
}

#[test]
fn test_link_with_matching_fingerprint_needs_no_prompt() {
    let mut h = Harness::new();
    let fp = Behaviour::default().ca.fingerprint().to_uppercase();
    let options = InitOptions {
        config_link: Some(format!(
            "sx://admin@{HOST}?token={TOKEN}&ip=10.1.1.1,10.1.1.2&port=8443&fp={fp}"
        )),
        ..Default::default()
    };

    let (result, _, prompts) = h.run(options);
    result.unwrap();
    assert!(prompts.is_empty(), "{prompts:?}");

    let state = h.store().load(HOST).unwrap().unwrap();
    assert_eq!(state.credentials.get("admin").map(String::as_str), Some(TOKEN));
    assert_eq!(state.connection.port, Some(8443));
    assert_eq!(state.connection.dns_name, None);
}

#[test]
fn test_link_with_wrong_fingerprint_is_refused() {
    let mut h = Harness::new();
    let options = InitOptions {
        config_link: Some(format!("sx://{HOST}?token={TOKEN}&fp=00ff")),
        ..Default::default()
    };

    let (result, _, _) = h.run(options);
    assert!(matches!(result, Err(InitError::Trust { .. })));
    assert!(h.store().load(HOST).unwrap().is_none());
}

#[test]
fn test_link_from_stdin() {
    let mut h = Harness::new();
    h.prompter
        .lines
        .push_back(format!("sx://{HOST}?token={TOKEN}\n"));
    let options = InitOptions {
        config_link: Some("-".into()),
        batch: true,
        ..Default::default()
    };

    let (result, _, prompts) = h.run(options);
    result.unwrap();
    assert_eq!(prompts, vec!["Please enter the configuration link: "]);
}

#[test]
fn test_declined_certificate_aborts() {
    let mut h = Harness::new();
    h.prompter.answers.push_back(false);
    let options = InitOptions {
        batch: false,
        ..with_key_file(&h, &format!("sx://{HOST}"), TOKEN)
    };

    let (result, _, prompts) = h.run(options);
    assert!(matches!(result, Err(InitError::Trust { .. })));
    assert_eq!(prompts, vec!["Do you trust this SSL certificate?"]);
    assert!(!h.calls().contains(&"fetch_membership".to_string()));
    assert!(h.store().load(HOST).unwrap().is_none());
}

#[test]
fn test_accepted_certificate_is_pinned() {
    let mut h = Harness::new();
    h.prompter.answers.push_back(true);
    let options = InitOptions {
        batch: false,
        ..with_key_file(&h, &format!("sx://{HOST}"), TOKEN)
    };

    h.run(options).0.unwrap();
    let state = h.store().load(HOST).unwrap().unwrap();
    assert!(state.ca_certificate.is_some());
}

#[test]
fn test_plain_http_to_secure_cluster_asks_first() {
    let mut h = Harness::new();
    h.connector.behaviour.secure = true;
    h.prompter.answers.push_back(false);
    let options = InitOptions {
        no_ssl: true,
        batch: false,
        ..with_key_file(&h, &format!("sx://{HOST}"), TOKEN)
    };

    let (result, _, prompts) = h.run(options);
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "Aborted");
    assert_eq!(prompts, vec!["Do you want to continue?"]);
    assert!(h.store().load(HOST).unwrap().is_none());
}

#[test]
fn test_plain_http_in_batch_mode_skips_probe() {
    let mut h = Harness::new();
    h.connector.behaviour.secure = true;
    let options = InitOptions {
        no_ssl: true,
        ..with_key_file(&h, &format!("sx://{HOST}"), TOKEN)
    };

    h.run(options).0.unwrap();
    let membership_calls = h
        .calls()
        .iter()
        .filter(|c| *c == "fetch_membership")
        .count();
    assert_eq!(membership_calls, 1);

    let state = h.store().load(HOST).unwrap().unwrap();
    assert!(!state.connection.use_tls);
    assert!(state.ca_certificate.is_none());
}

#[test]
fn test_password_from_file_derives_token() {
    let mut h = Harness::new();
    let expected = derive_token(UUID, "default", b"secret").unwrap();
    h.connector.behaviour.accepted_token = expected.clone();
    let options = InitOptions {
        pass_file: Some(h.write_file("pass", "secret\n")),
        no_ssl: true,
        batch: true,
        ..address(&format!("sx://{HOST}"))
    };

    h.run(options).0.unwrap();
    let state = h.store().load(HOST).unwrap().unwrap();
    assert_eq!(state.credentials.get("default"), Some(&expected));
}

#[test]
fn test_interactive_password() {
    let mut h = Harness::new();
    let expected = derive_token(UUID, "alice", b"hunter2").unwrap();
    h.connector.behaviour.accepted_token = expected;
    h.prompter.passwords.push_back("hunter2".into());
    let options = InitOptions {
        no_ssl: true,
        batch: true,
        ..address(&format!("sx://alice@{HOST}"))
    };

    let (result, _, prompts) = h.run(options);
    result.unwrap();
    assert_eq!(prompts, vec![format!("Enter password for sx://alice@{HOST}")]);
}

#[test]
fn test_empty_pass_file_is_fatal() {
    let mut h = Harness::new();
    let options = InitOptions {
        pass_file: Some(h.write_file("pass", "")),
        no_ssl: true,
        batch: true,
        ..address(&format!("sx://{HOST}"))
    };

    let (result, _, _) = h.run(options);
    assert!(matches!(
        result,
        Err(InitError::Token(TokenError::EmptyPassFile(_)))
    ));
}

#[test]
fn test_missing_uuid_suggests_checking_port() {
    let mut h = Harness::new();
    h.connector.behaviour.uuid = None;
    let options = InitOptions {
        pass_file: Some(h.write_file("pass", "secret\n")),
        no_ssl: true,
        batch: true,
        ..address(&format!("sx://{HOST}"))
    };

    let (result, _, _) = h.run(options);
    let err = result.unwrap_err();
    assert!(err.remediation().unwrap().contains("--port"));
}

#[test]
fn test_interactive_user_key() {
    let mut h = Harness::new();
    h.prompter.lines.push_back(format!("{TOKEN}\n"));
    let options = InitOptions {
        key: true,
        batch: true,
        ..address(&format!("sx://{HOST}"))
    };

    let (result, _, prompts) = h.run(options);
    result.unwrap();
    assert_eq!(prompts, vec!["Please enter the user key: "]);
}

#[test]
fn test_alias_bound_then_used_as_address() {
    let mut h = Harness::new();
    let options = InitOptions {
        alias: Some("sx://prod".into()),
        ..with_key_file(&h, &format!("sx://{HOST}"), TOKEN)
    };
    h.run(options).0.unwrap();

    let info = InitOptions {
        info: true,
        ..address("sx://prod")
    };
    let (result, out, _) = h.run(info);
    result.unwrap();
    assert!(out.contains(&format!("Cluster name: {HOST}")), "{out}");
    assert!(out.contains(&format!("Cluster UUID: {UUID}")));
    assert!(out.contains("Profile: default (configured)"));
    assert!(out.contains("Aliases: sx://prod"));
}

#[test]
fn test_alias_conflict_stops_before_network() {
    let mut h = Harness::new();
    h.store().aliases().bind("sx://prod", "default", "elsewhere").unwrap();

    let options = InitOptions {
        alias: Some("sx://prod".into()),
        ..with_key_file(&h, &format!("sx://{HOST}"), TOKEN)
    };
    let (result, _, _) = h.run(options);
    assert!(matches!(result, Err(InitError::AliasConflict { .. })));
    assert!(h.calls().is_empty());
}

#[test]
fn test_bad_alias_name() {
    let mut h = Harness::new();
    let options = InitOptions {
        alias: Some("prod".into()),
        ..with_key_file(&h, &format!("sx://{HOST}"), TOKEN)
    };
    let (result, _, _) = h.run(options);
    assert!(matches!(result, Err(InitError::Argument(_))));
}

#[test]
fn test_delete_cascades_and_clears_aliases() {
    let mut h = Harness::new();
    let options = InitOptions {
        alias: Some("sx://prod".into()),
        ..with_key_file(&h, &format!("sx://{HOST}"), TOKEN)
    };
    h.run(options).0.unwrap();

    let delete = InitOptions {
        delete: true,
        ..address(&format!("sx://{HOST}"))
    };
    let (result, out, _) = h.run(delete);
    result.unwrap();
    assert!(out.contains("deleted"));
    assert!(!h.root().join(HOST).exists());
    assert!(h.store().aliases().load().unwrap().aliases.is_empty());

    let again = InitOptions {
        delete: true,
        ..address(&format!("sx://{HOST}"))
    };
    assert!(matches!(h.run(again).0, Err(InitError::Persistence { .. })));
}

#[test]
fn test_list_formats_profiles() {
    let mut h = Harness::new();
    let options = InitOptions {
        alias: Some("sx://prod".into()),
        ..with_key_file(&h, &format!("sx://{HOST}"), TOKEN)
    };
    h.run(options).0.unwrap();
    let options = with_key_file(&h, &format!("sx://bob@{HOST}"), TOKEN);
    h.run(options).0.unwrap();

    let list = InitOptions {
        list: true,
        ..Default::default()
    };
    let (result, out, _) = h.run(list);
    result.unwrap();

    let mut lines: Vec<&str> = out.lines().collect();
    lines.sort();
    assert_eq!(
        lines,
        vec![
            format!("{:<40} -", format!("sx://bob@{HOST}")),
            format!("{:<40} sx://prod", format!("sx://{HOST}")),
        ]
    );
}

#[test]
fn test_list_without_profiles() {
    let mut h = Harness::new();
    let list = InitOptions {
        list: true,
        ..Default::default()
    };
    let (result, _, _) = h.run(list);
    let err = result.unwrap_err();
    assert!(matches!(err, InitError::NoProfiles { .. }));
    assert_eq!(err.to_string(), "No profiles configured");
}

#[test]
fn test_force_reinit_discards_old_configuration() {
    let mut h = Harness::new();
    let mut stale = ClusterState::new(HOST);
    stale.credentials.insert("old".into(), OTHER_TOKEN.into());
    stale.connection.port = Some(9999);
    h.store().save(&stale).unwrap();

    let keep = with_key_file(&h, &format!("sx://{HOST}"), TOKEN);
    h.run(keep).0.unwrap();
    let state = h.store().load(HOST).unwrap().unwrap();
    assert!(state.credentials.contains_key("old"));
    assert_eq!(state.connection.port, Some(9999));

    let reinit = InitOptions {
        force_reinit: true,
        ..with_key_file(&h, &format!("sx://{HOST}"), TOKEN)
    };
    h.run(reinit).0.unwrap();
    let state = h.store().load(HOST).unwrap().unwrap();
    assert!(!state.credentials.contains_key("old"));
    assert_eq!(state.connection.port, None);
}

#[test]
fn test_interrupt_context_watches_running_handle() {
    let h = Harness::new();
    let context = InterruptContext::new();
    let mut bootstrap = Bootstrap::new(h.store(), h.connector.clone(), ScriptedPrompter::default())
        .with_interrupt(Arc::clone(&context));

    let options = with_key_file(&h, &format!("sx://{HOST}"), TOKEN);
    let mut out = Vec::new();
    bootstrap
        .run(&options.validate().unwrap(), &mut out)
        .unwrap();

    context.disarm();
    assert!(!context.on_signal());
}
