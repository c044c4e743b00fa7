//! Installed apps, their artifacts and method descriptors.
//!
//! Artifacts are resolved once per app code version and indexed by 4-byte selector, so
//! the resolver never searches ABI fragments by name at runtime.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_json_abi::Function;
use alloy_primitives::{keccak256, Address, Selector, B256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::FORWARD_SIGNATURE;

/// Errors while building artifacts or looking up methods.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("invalid function signature `{0}`")]
    InvalidSignature(String),
    #[error("unknown method `{0}`")]
    UnknownMethod(String),
    #[error("method `{name}` is ambiguous: {candidates:?}")]
    AmbiguousMethod { name: String, candidates: Vec<String> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MethodKind {
    Current,
    /// Kept for older app versions; `since` is the version that deprecated it.
    Deprecated { since: String },
}

/// A callable function of an app, with the roles that guard it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    /// Canonical signature, eg `mint(address,uint256)`.
    pub signature: String,
    pub selector: Selector,
    /// Solidity input types, in order.
    pub inputs: Vec<String>,
    pub roles: Vec<B256>,
    pub kind: MethodKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl MethodDescriptor {
    /// Build a descriptor from a human-readable signature; parameter names and
    /// whitespace are dropped from the stored canonical form.
    pub fn new(signature: &str, roles: Vec<B256>) -> Result<Self, ArtifactError> {
        let function = parse_function(signature)?;
        Ok(Self {
            selector: function.selector(),
            signature: function.signature(),
            inputs: function.inputs.iter().map(|p| p.selector_type().into_owned()).collect(),
            name: function.name,
            roles,
            kind: MethodKind::Current,
            notice: None,
        })
    }

    pub fn deprecated(mut self, since: impl Into<String>) -> Self {
        self.kind = MethodKind::Deprecated { since: since.into() };
        self
    }

    /// Role the ACL checks before running this method. Only the first declared role is
    /// enforced; methods without roles are unguarded.
    pub fn required_role(&self) -> Option<B256> {
        self.roles.first().copied()
    }

    pub fn is_deprecated(&self) -> bool {
        matches!(self.kind, MethodKind::Deprecated { .. })
    }
}

/// A named role, with its on-chain id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleDescriptor {
    pub id: String,
    pub bytes: B256,
}

/// Functions and roles of one app code version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppArtifact {
    pub roles: Vec<RoleDescriptor>,
    pub functions: BTreeMap<Selector, MethodDescriptor>,
}

impl AppArtifact {
    /// Build from descriptors. Current functions shadow deprecated ones sharing a selector.
    pub fn new(roles: Vec<RoleDescriptor>, methods: impl IntoIterator<Item = MethodDescriptor>) -> Self {
        let mut functions: BTreeMap<Selector, MethodDescriptor> = BTreeMap::new();
        for method in methods {
            match functions.get(&method.selector) {
                Some(existing) if !existing.is_deprecated() && method.is_deprecated() => {}
                _ => {
                    functions.insert(method.selector, method);
                }
            }
        }
        Self { roles, functions }
    }

    pub fn from_manifest(manifest: &ArtifactManifest) -> Result<Self, ArtifactError> {
        let roles: Vec<RoleDescriptor> = manifest
            .roles
            .iter()
            .map(|role| RoleDescriptor {
                id: role.id.clone(),
                bytes: role.bytes.unwrap_or_else(|| keccak256(role.id.as_bytes())),
            })
            .collect();

        let role_bytes = |name: &str| {
            roles
                .iter()
                .find(|r| r.id == name)
                .map(|r| r.bytes)
                .unwrap_or_else(|| keccak256(name.as_bytes()))
        };

        let mut methods = Vec::new();
        for (since, functions) in &manifest.deprecated_functions {
            for f in functions {
                let roles = f.roles.iter().map(|r| role_bytes(r)).collect();
                let mut method = MethodDescriptor::new(&f.sig, roles)?.deprecated(since.clone());
                method.notice = f.notice.clone();
                methods.push(method);
            }
        }
        for f in &manifest.functions {
            let roles = f.roles.iter().map(|r| role_bytes(r)).collect();
            let mut method = MethodDescriptor::new(&f.sig, roles)?;
            method.notice = f.notice.clone();
            methods.push(method);
        }

        Ok(Self::new(roles, methods))
    }

    pub fn by_selector(&self, selector: Selector) -> Option<&MethodDescriptor> {
        self.functions.get(&selector)
    }

    /// Look a method up by full signature or by bare name.
    ///
    /// A bare name prefers current functions over deprecated ones; several matches at the
    /// same level is an error rather than a guess.
    pub fn find(&self, method: &str) -> Result<&MethodDescriptor, ArtifactError> {
        if method.contains('(') {
            let unknown = || ArtifactError::UnknownMethod(method.to_string());
            let function = parse_function(method).map_err(|_| unknown())?;
            let signature = function.signature();
            return self
                .by_selector(function.selector())
                .filter(|m| m.signature == signature)
                .ok_or_else(unknown);
        }

        let named: Vec<&MethodDescriptor> =
            self.functions.values().filter(|m| m.name == method).collect();
        let current: Vec<&MethodDescriptor> =
            named.iter().copied().filter(|m| !m.is_deprecated()).collect();
        let pool = if current.is_empty() { named } else { current };

        match pool.as_slice() {
            [] => Err(ArtifactError::UnknownMethod(method.to_string())),
            [only] => Ok(*only),
            many => Err(ArtifactError::AmbiguousMethod {
                name: method.to_string(),
                candidates: many.iter().map(|m| m.signature.clone()).collect(),
            }),
        }
    }

    pub fn role(&self, id: &str) -> Option<B256> {
        self.roles.iter().find(|r| r.id == id).map(|r| r.bytes)
    }

    /// The `forward(bytes)` entrypoint, if this app is a forwarder.
    pub fn forward_method(&self) -> Option<&MethodDescriptor> {
        self.by_selector(selector(FORWARD_SIGNATURE))
    }

    pub fn is_forwarder(&self) -> bool {
        self.forward_method().is_some()
    }
}

/// An installed app. Superseded on upgrade, never removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct App {
    pub proxy_address: Address,
    pub app_id: B256,
    pub code_address: Address,
    pub artifact: Arc<AppArtifact>,
    pub is_forwarder: bool,
}

impl App {
    pub fn new(proxy_address: Address, app_id: B256, code_address: Address, artifact: AppArtifact) -> Self {
        let is_forwarder = artifact.is_forwarder();
        Self {
            proxy_address,
            app_id,
            code_address,
            artifact: Arc::new(artifact),
            is_forwarder,
        }
    }
}

/// Artifact manifest as published alongside an app version.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactManifest {
    #[serde(default)]
    pub roles: Vec<RoleManifest>,
    #[serde(default)]
    pub functions: Vec<FunctionManifest>,
    /// Keyed by the version that deprecated them.
    #[serde(default)]
    pub deprecated_functions: BTreeMap<String, Vec<FunctionManifest>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RoleManifest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bytes: Option<B256>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FunctionManifest {
    pub sig: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub notice: Option<String>,
}

fn selector(signature: &str) -> Selector {
    let h = keccak256(signature.as_bytes());
    Selector::from([h[0], h[1], h[2], h[3]])
}

fn parse_function(signature: &str) -> Result<Function, ArtifactError> {
    match Function::parse(signature) {
        Ok(function) if !function.name.is_empty() => Ok(function),
        _ => Err(ArtifactError::InvalidSignature(signature.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> ArtifactManifest {
        serde_json::from_str(
            r#"{
                "roles": [
                    { "id": "MINT_ROLE", "name": "Mint tokens" },
                    { "id": "CREATE_VOTES_ROLE" }
                ],
                "functions": [
                    { "sig": "mint(address,uint256)", "roles": ["MINT_ROLE"], "notice": "Mint tokens" },
                    { "sig": "forward(bytes)", "roles": ["CREATE_VOTES_ROLE"] },
                    { "sig": "transfer(address,uint256)", "roles": [] },
                    { "sig": "transfer(address,uint256,bytes)", "roles": [] }
                ],
                "deprecatedFunctions": {
                    "2.0.0": [
                        { "sig": "issue(uint256)", "roles": ["MINT_ROLE"] },
                        { "sig": "mint(address,uint256)", "roles": [] }
                    ]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn signature_splitting() {
        let m = MethodDescriptor::new("vote(uint256, bool,(address,uint256[]))", vec![]).unwrap();
        assert_eq!(m.name, "vote");
        assert_eq!(m.signature, "vote(uint256,bool,(address,uint256[]))");
        assert_eq!(m.inputs, vec!["uint256", "bool", "(address,uint256[])"]);

        let none = MethodDescriptor::new("initialize()", vec![]).unwrap();
        assert!(none.inputs.is_empty());

        assert!(MethodDescriptor::new("broken(uint256", vec![]).is_err());
        assert!(MethodDescriptor::new("(uint256)", vec![]).is_err());
        assert!(MethodDescriptor::new("a(uint256,,bool)", vec![]).is_err());
    }

    #[test]
    fn parameter_names_are_dropped() {
        let m = MethodDescriptor::new("function mint(address to, uint256 amount)", vec![]).unwrap();
        assert_eq!(m.signature, "mint(address,uint256)");
        assert_eq!(m.inputs, vec!["address", "uint256"]);
        assert_eq!(m.selector, MethodDescriptor::new("mint(address,uint256)", vec![]).unwrap().selector);
    }

    #[test]
    fn forward_selector_matches_deployed_forwarders() {
        let m = MethodDescriptor::new(FORWARD_SIGNATURE, vec![]).unwrap();
        assert_eq!(m.selector.as_slice(), &[0xd9, 0x48, 0xd4, 0x68]);
    }

    #[test]
    fn manifest_resolves_roles_and_shadows_deprecated() {
        let artifact = AppArtifact::from_manifest(&manifest()).unwrap();
        let mint_role = keccak256("MINT_ROLE".as_bytes());

        let mint = artifact.find("mint").unwrap();
        assert_eq!(mint.required_role(), Some(mint_role));
        assert!(!mint.is_deprecated());
        assert_eq!(mint.notice.as_deref(), Some("Mint tokens"));

        let issue = artifact.find("issue").unwrap();
        assert!(issue.is_deprecated());
        assert_eq!(artifact.role("MINT_ROLE"), Some(mint_role));
        assert!(artifact.is_forwarder());
    }

    #[test]
    fn lookup_by_name_rejects_ambiguity() {
        let artifact = AppArtifact::from_manifest(&manifest()).unwrap();
        match artifact.find("transfer") {
            Err(ArtifactError::AmbiguousMethod { candidates, .. }) => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguity, got {other:?}"),
        }
        let exact = artifact.find("transfer(address, uint256, bytes)").unwrap();
        assert_eq!(exact.inputs.len(), 3);
        assert_eq!(
            artifact.find("burn"),
            Err(ArtifactError::UnknownMethod("burn".to_string()))
        );
    }

    #[test]
    fn explicit_role_bytes_win() {
        let m: ArtifactManifest = serde_json::from_str(
            r#"{
                "roles": [{ "id": "X_ROLE", "bytes": "0x0000000000000000000000000000000000000000000000000000000000000001" }],
                "functions": [{ "sig": "x()", "roles": ["X_ROLE"] }]
            }"#,
        )
        .unwrap();
        let artifact = AppArtifact::from_manifest(&m).unwrap();
        assert_eq!(artifact.find("x").unwrap().required_role(), Some(B256::with_last_byte(1)));
        assert!(!artifact.is_forwarder());
    }
}
