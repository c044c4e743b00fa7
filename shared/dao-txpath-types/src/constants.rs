//! Protocol constants mirrored from the DAO kernel and ACL contracts.

use alloy_primitives::{keccak256, Address, B256};

/// Entity placeholder that grants a role to every sender.
pub const ANY_ENTITY: Address = Address::new([0xff; 20]);

/// Callscript spec id (the 4-byte magic prefix of every encoded script).
pub const CALLSCRIPT_SPEC_ID: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Signature of the forwarder entrypoint.
pub const FORWARD_SIGNATURE: &str = "forward(bytes)";

/// Kernel namespaces used by `SetApp`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Namespace {
    /// `keccak256("core")`: kernel upgrades.
    Core,
    /// `keccak256("base")`: code (base) address for an app id.
    AppBase,
    /// `keccak256("app")`: default app instance (proxy) for an app id.
    App,
    Unknown,
}

impl Namespace {
    pub fn hash(self) -> Option<B256> {
        match self {
            Namespace::Core => Some(keccak256("core")),
            Namespace::AppBase => Some(keccak256("base")),
            Namespace::App => Some(keccak256("app")),
            Namespace::Unknown => None,
        }
    }

    pub fn classify(namespace: B256) -> Self {
        [Namespace::Core, Namespace::AppBase, Namespace::App]
            .into_iter()
            .find(|ns| ns.hash() == Some(namespace))
            .unwrap_or(Namespace::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_round_trips_known_namespaces() {
        for ns in [Namespace::Core, Namespace::AppBase, Namespace::App] {
            let hash = ns.hash().unwrap();
            assert_eq!(Namespace::classify(hash), ns);
        }
        assert_eq!(Namespace::classify(B256::ZERO), Namespace::Unknown);
    }

    #[test]
    fn any_entity_is_all_ones() {
        assert_eq!(ANY_ENTITY.as_slice(), &[0xffu8; 20]);
    }
}
