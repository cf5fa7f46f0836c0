//! Config Loader: produces a validated `{id -> BackendSpec}` map from a JSON
//! document and from `MCP_SERVER_<ID>_*` environment overrides.
//!
//! Environment substitution (`${NAME}` interpolation) is one pure traversal
//! applied once at load time; nothing re-interpolates at use sites.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProxyError, ProxyResult};

/// Risk level gating `tools/call` dispatch. Numeric values match the
/// ordering in the data model (Low=1, Medium=2, High=3).
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl RiskLevel {
    pub fn description(self) -> &'static str {
        match self {
            Self::Low => "low risk: executes without confirmation",
            Self::Medium => "medium risk: requires explicit confirmation before execution",
            Self::High => "high risk: executes inside an isolated container runtime",
        }
    }

    /// Parses a risk level from either a string (`"low"`/`"medium"`/`"high"`,
    /// case-insensitive) or an integer (1/2/3). Returns `None` for anything
    /// else, matching the "unknown risk level -> field dropped" rule.
    fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "low" => Some(Self::Low),
                "medium" => Some(Self::Medium),
                "high" => Some(Self::High),
                _ => None,
            },
            Value::Number(n) => match n.as_u64() {
                Some(1) => Some(Self::Low),
                Some(2) => Some(Self::Medium),
                Some(3) => Some(Self::High),
                _ => None,
            },
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for RiskLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::parse(&value).ok_or_else(|| serde::de::Error::custom("unknown risk level"))
    }
}

/// Container-isolation metadata for High-risk backends. Required and
/// complete whenever `risk_level == High`; the executable vector is
/// rewritten at session start to route through this runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationDescriptor {
    pub image: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub network: Option<String>,
}

/// Tuning knobs for the SSE adapter; all optional, with conservative defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SseTuning {
    pub heartbeat_interval_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
    },
    Sse {
        url: String,
        #[serde(default)]
        tuning: SseTuning,
    },
}

impl Transport {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Stdio { .. } => None,
            Self::Http { url } | Self::Sse { url, .. } => Some(url),
        }
    }
}

/// A validated backend entry, as produced by the Config Loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSpec {
    pub id: String,
    #[serde(flatten)]
    pub transport: Transport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation: Option<IsolationDescriptor>,
    #[serde(default)]
    pub ssrf_protection: SsrfProtection,
}

impl BackendSpec {
    /// Applies the High-risk/isolation validation rules, downgrading and
    /// warning rather than rejecting.
    pub fn validate(mut self) -> Self {
        if self.risk_level == Some(RiskLevel::High) && self.isolation.is_none() {
            tracing::warn!(
                backend = %self.id,
                "risk level High requires an isolation descriptor; downgrading to Medium"
            );
            self.risk_level = Some(RiskLevel::Medium);
        }
        self
    }
}

/// SSRF protection level for http/sse backend URLs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SsrfProtection {
    #[default]
    Strict,
    Balanced {
        allowed_private_networks: Vec<IpNetwork>,
    },
    Disabled,
}

impl SsrfProtection {
    /// Returns true if a known-private, non-loopback `ip` is blocked under
    /// this policy. Loopback is always allowed: a bridge routinely points at
    /// backends started on the operator's own machine.
    fn blocks_private(&self, ip: IpAddr) -> bool {
        match self {
            Self::Disabled => false,
            Self::Strict => true,
            Self::Balanced { allowed_private_networks } => {
                !allowed_private_networks.iter().any(|net| net.contains(ip))
            }
        }
    }
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

fn is_metadata_endpoint(ip: IpAddr) -> bool {
    match ip {
        // AWS/GCP instance-metadata endpoint; Azure's IMDS endpoint.
        IpAddr::V4(v4) => v4 == std::net::Ipv4Addr::new(169, 254, 169, 254) || v4 == std::net::Ipv4Addr::new(168, 63, 129, 16),
        IpAddr::V6(_) => false,
    }
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// Rejects http/sse backend URLs whose host is a literal IP in a private or
/// cloud-metadata range (per `protection`), or a known cloud metadata
/// hostname. Loopback is always allowed. Hostnames that require DNS
/// resolution to classify are let through unchanged; this is a
/// literal-address guard, not a resolver.
pub fn validate_backend_url(url: &str, protection: &SsrfProtection) -> ProxyResult<()> {
    let parsed = url::Url::parse(url).map_err(|e| ProxyError::BadRequest(format!("invalid URL '{url}': {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| ProxyError::BadRequest(format!("URL '{url}' has no host")))?;

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_loopback(ip) {
            return Ok(());
        }
        if is_metadata_endpoint(ip) && *protection != SsrfProtection::Disabled {
            return Err(ProxyError::BadRequest(format!(
                "backend URL '{url}' targets a cloud metadata endpoint"
            )));
        }
        if is_private(ip) && protection.blocks_private(ip) {
            return Err(ProxyError::BadRequest(format!(
                "backend URL '{url}' resolves to a blocked private address"
            )));
        }
    } else if host.eq_ignore_ascii_case("metadata.google.internal") && *protection != SsrfProtection::Disabled {
        return Err(ProxyError::BadRequest(format!(
            "backend URL '{url}' targets a known cloud metadata hostname"
        )));
    }

    Ok(())
}

/// A loaded, validated registry of backend specs plus the persisted-config
/// path they came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub servers: HashMap<String, BackendSpec>,
    pub path: std::path::PathBuf,
}

/// Drops a malformed `isolation` field from a single backend entry rather
/// than letting it fail deserialization of the whole document: a bad
/// isolation descriptor should downgrade that one backend's risk level
/// (via `BackendSpec::validate`), not reject every other entry alongside it.
pub fn sanitize_malformed_isolation(entry: &mut Value, backend_id: &str) {
    let Some(isolation) = entry.get_mut("isolation") else {
        return;
    };
    if isolation.is_null() {
        return;
    }
    if let Err(e) = serde_json::from_value::<IsolationDescriptor>(isolation.clone()) {
        tracing::warn!(backend = %backend_id, error = %e, "malformed isolation descriptor, downgrading risk");
        if let Some(map) = entry.as_object_mut() {
            map.remove("isolation");
        }
    }
}

/// Reads `{mcpServers: {id: BackendSpec}}` from `path` (creating an empty
/// document if the file does not exist), interpolates `${NAME}` tokens
/// against the process environment, applies `MCP_SERVER_<ID>_*` overrides,
/// and validates every entry.
pub fn load(path: impl AsRef<Path>) -> ProxyResult<LoadedConfig> {
    let path = path.as_ref().to_path_buf();
    let raw = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => "{\"mcpServers\":{}}".to_string(),
        Err(e) => return Err(ProxyError::Io(e)),
    };

    let mut document: Value = serde_json::from_str(&raw)?;
    interpolate(&mut document);

    let mut mcp_servers = document
        .get_mut("mcpServers")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    if let Some(map) = mcp_servers.as_object_mut() {
        for (id, entry) in map.iter_mut() {
            sanitize_malformed_isolation(entry, id);
        }
    }

    let mut servers: HashMap<String, BackendSpec> = serde_json::from_value(mcp_servers)
        .map_err(|e| ProxyError::Configuration(format!("invalid mcpServers document: {e}")))?;

    apply_env_overrides(&mut servers);

    let servers = servers
        .into_iter()
        .map(|(id, spec)| (id, spec.validate()))
        .collect();

    Ok(LoadedConfig { servers, path })
}

/// Atomically rewrites the persisted config document: load, mutate via
/// `mutate`, write back. The only durable state this bridge owns.
pub fn rewrite(
    path: impl AsRef<Path>,
    mutate: impl FnOnce(&mut HashMap<String, BackendSpec>),
) -> ProxyResult<()> {
    let path = path.as_ref();
    let mut loaded = load(path)?;
    mutate(&mut loaded.servers);

    let document = serde_json::json!({ "mcpServers": loaded.servers });
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(&document)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Applies the same `${NAME}` interpolation the loader runs on the
/// persisted document to a single inbound value: the REST Facade
/// substitutes environment variables in incoming configs before they reach
/// the loader.
pub fn interpolate_value(value: &mut Value) {
    interpolate(value);
}

/// Recursively replaces `${NAME}` tokens in every string value using the
/// process environment. Unresolved tokens are preserved verbatim and logged.
fn interpolate(value: &mut Value) {
    match value {
        Value::String(s) => {
            if let Some(replaced) = interpolate_str(s) {
                *s = replaced;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(interpolate),
        Value::Object(map) => map.values_mut().for_each(interpolate),
        _ => {}
    }
}

fn interpolate_str(input: &str) -> Option<String> {
    if !input.contains("${") {
        return None;
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut changed = false;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => {
                        out.push_str(&value);
                        changed = true;
                    }
                    Err(_) => {
                        tracing::warn!(token = %name, "unresolved ${{{}}} interpolation", name);
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    changed.then_some(out)
}

/// Applies `MCP_SERVER_<ID>_COMMAND`, `..._ARGS` (comma-split), `..._ENV`
/// (JSON), `..._RISK_LEVEL`, `..._DOCKER_CONFIG` (JSON) overrides on top of
/// whatever the document already declared for that id.
fn apply_env_overrides(servers: &mut HashMap<String, BackendSpec>) {
    for (key, value) in std::env::vars() {
        let Some(rest) = key.strip_prefix("MCP_SERVER_") else {
            continue;
        };
        let Some((id, field)) = split_override(rest) else {
            continue;
        };
        let id = id.to_ascii_lowercase();
        let spec = servers.entry(id.clone()).or_insert_with(|| BackendSpec {
            id: id.clone(),
            transport: Transport::Stdio {
                command: String::new(),
                args: Vec::new(),
                env: HashMap::new(),
            },
            risk_level: None,
            isolation: None,
            ssrf_protection: SsrfProtection::default(),
        });

        match field {
            "COMMAND" => {
                if let Transport::Stdio { command, .. } = &mut spec.transport {
                    *command = value;
                }
            }
            "ARGS" => {
                if let Transport::Stdio { args, .. } = &mut spec.transport {
                    *args = value.split(',').map(str::to_string).collect();
                }
            }
            "ENV" => match serde_json::from_str::<HashMap<String, String>>(&value) {
                Ok(overlay) => {
                    if let Transport::Stdio { env, .. } = &mut spec.transport {
                        env.extend(overlay);
                    }
                }
                Err(e) => tracing::warn!(backend = %id, error = %e, "malformed MCP_SERVER_*_ENV"),
            },
            "RISK_LEVEL" => match RiskLevel::parse(&Value::String(value.clone())) {
                Some(level) => spec.risk_level = Some(level),
                None => tracing::warn!(backend = %id, value = %value, "unknown risk level override, dropping"),
            },
            "DOCKER_CONFIG" => match serde_json::from_str::<IsolationDescriptor>(&value) {
                Ok(descriptor) => spec.isolation = Some(descriptor),
                Err(e) => {
                    tracing::warn!(backend = %id, error = %e, "malformed isolation descriptor, downgrading risk");
                    spec.isolation = None;
                }
            },
            _ => {}
        }
    }
}

fn split_override(rest: &str) -> Option<(&str, &str)> {
    for field in ["COMMAND", "ARGS", "ENV", "RISK_LEVEL", "DOCKER_CONFIG"] {
        let suffix = format!("_{field}");
        if let Some(id) = rest.strip_suffix(suffix.as_str()) {
            if !id.is_empty() {
                return Some((id, field));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_token_round_trips() {
        // SAFETY: test-only env mutation, no concurrent readers in this process.
        unsafe { std::env::remove_var("DOES_NOT_EXIST_TOKEN") };
        let mut value = Value::String("prefix-${DOES_NOT_EXIST_TOKEN}-suffix".to_string());
        interpolate(&mut value);
        assert_eq!(value, Value::String("prefix-${DOES_NOT_EXIST_TOKEN}-suffix".to_string()));
    }

    #[test]
    fn resolved_token_is_substituted() {
        unsafe { std::env::set_var("MCP_BRIDGE_TEST_TOKEN", "resolved") };
        let mut value = Value::String("value=${MCP_BRIDGE_TEST_TOKEN}".to_string());
        interpolate(&mut value);
        assert_eq!(value, Value::String("value=resolved".to_string()));
        unsafe { std::env::remove_var("MCP_BRIDGE_TEST_TOKEN") };
    }

    #[test]
    fn high_risk_without_isolation_downgrades_to_medium() {
        let spec = BackendSpec {
            id: "fs".into(),
            transport: Transport::Stdio {
                command: "node".into(),
                args: vec![],
                env: HashMap::new(),
            },
            risk_level: Some(RiskLevel::High),
            isolation: None,
            ssrf_protection: SsrfProtection::default(),
        }
        .validate();
        assert_eq!(spec.risk_level, Some(RiskLevel::Medium));
    }

    #[test]
    fn strict_ssrf_allows_loopback_blocks_metadata_and_private() {
        assert!(validate_backend_url("http://127.0.0.1:9000/mcp", &SsrfProtection::Strict).is_ok());
        assert!(validate_backend_url("http://169.254.169.254/latest/meta-data", &SsrfProtection::Strict).is_err());
        assert!(validate_backend_url("http://metadata.google.internal/", &SsrfProtection::Strict).is_err());
        assert!(validate_backend_url("http://10.0.0.5:8080/mcp", &SsrfProtection::Strict).is_err());
        assert!(validate_backend_url("https://api.example.com/mcp", &SsrfProtection::Strict).is_ok());
    }

    #[test]
    fn disabled_ssrf_allows_metadata_endpoint() {
        assert!(validate_backend_url("http://169.254.169.254/latest/meta-data", &SsrfProtection::Disabled).is_ok());
    }

    #[test]
    fn balanced_ssrf_allows_whitelisted_private_network() {
        let protection = SsrfProtection::Balanced {
            allowed_private_networks: vec!["10.0.0.0/8".parse().unwrap()],
        };
        assert!(validate_backend_url("http://10.1.2.3:8080/mcp", &protection).is_ok());
        assert!(validate_backend_url("http://192.168.1.1:8080/mcp", &protection).is_err());
    }

    #[test]
    fn risk_level_parses_numeric_and_string() {
        assert_eq!(RiskLevel::parse(&Value::from(1)), Some(RiskLevel::Low));
        assert_eq!(RiskLevel::parse(&Value::from("high")), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse(&Value::from("HIGH")), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse(&Value::from(99)), None);
    }

    #[test]
    fn split_override_matches_longest_field_suffix() {
        assert_eq!(split_override("FS_RISK_LEVEL"), Some(("FS", "RISK_LEVEL")));
        assert_eq!(split_override("FS_COMMAND"), Some(("FS", "COMMAND")));
        assert_eq!(split_override("UNKNOWN_SUFFIX"), None);
    }
}
