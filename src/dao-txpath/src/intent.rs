//! The call a sender ultimately wants executed.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, Bytes, U256};
use dao_txpath_types::{MethodDescriptor, TokenRequirement};

use crate::{catalog::AppSet, errors::PathError};

#[derive(Clone, Debug, PartialEq)]
pub struct Intent {
    pub to: Address,
    pub method: MethodDescriptor,
    pub params: Vec<DynSolValue>,
    /// Tokens the call pulls from the sender (transfer/deposit style methods).
    pub token: Option<TokenRequirement>,
}

impl Intent {
    pub fn new(to: Address, method: MethodDescriptor, params: Vec<DynSolValue>) -> Self {
        Self {
            to,
            method,
            params,
            token: None,
        }
    }

    /// Build an intent by method name or signature, resolved against the target app's
    /// artifact.
    pub fn invoke(apps: &AppSet, to: Address, method: &str, params: Vec<DynSolValue>) -> Result<Self, PathError> {
        let app = apps.get(to).ok_or(PathError::UnknownApp(to))?;
        let method = app.artifact.find(method)?.clone();
        Ok(Self::new(to, method, params))
    }

    /// Like [`Intent::invoke`], with parameters given as strings and coerced to the
    /// method's input types.
    pub fn invoke_str(apps: &AppSet, to: Address, method: &str, params: &[String]) -> Result<Self, PathError> {
        let app = apps.get(to).ok_or(PathError::UnknownApp(to))?;
        let method = app.artifact.find(method)?.clone();
        let params = coerce_params(&method, params)?;
        Ok(Self::new(to, method, params))
    }

    /// Require the sender to have approved `amount` of `token` to the target before the call.
    pub fn with_token(mut self, token: Address, amount: U256) -> Self {
        self.token = Some(TokenRequirement {
            token,
            amount,
            spender: None,
        });
        self
    }

    /// ABI-encoded call data: selector followed by the encoded parameters.
    pub fn call_data(&self) -> Result<Bytes, PathError> {
        let types = input_types(&self.method)?;
        if types.len() != self.params.len() {
            return Err(invalid(
                &self.method,
                format!("expected {} parameter(s), got {}", types.len(), self.params.len()),
            ));
        }
        for (i, (ty, value)) in types.iter().zip(&self.params).enumerate() {
            if !ty.matches(value) {
                return Err(invalid(&self.method, format!("parameter {i} is not a {}", ty.sol_type_name())));
            }
        }

        let mut data = self.method.selector.to_vec();
        data.extend_from_slice(&DynSolValue::Tuple(self.params.clone()).abi_encode_params());
        Ok(data.into())
    }
}

fn input_types(method: &MethodDescriptor) -> Result<Vec<DynSolType>, PathError> {
    method
        .inputs
        .iter()
        .map(|input| DynSolType::parse(input).map_err(|e| invalid(method, e.to_string())))
        .collect()
}

fn coerce_params(method: &MethodDescriptor, params: &[String]) -> Result<Vec<DynSolValue>, PathError> {
    let types = input_types(method)?;
    if types.len() != params.len() {
        return Err(invalid(
            method,
            format!("expected {} parameter(s), got {}", types.len(), params.len()),
        ));
    }
    types
        .iter()
        .zip(params)
        .map(|(ty, raw)| ty.coerce_str(raw).map_err(|e| invalid(method, e.to_string())))
        .collect()
}

fn invalid(method: &MethodDescriptor, reason: String) -> PathError {
    PathError::InvalidParams {
        method: method.signature.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{hex, B256};
    use dao_txpath_types::{App, AppArtifact};

    use super::*;

    fn token_manager() -> AppSet {
        let mint = MethodDescriptor::new("mint(address,uint256)", vec![B256::repeat_byte(1)]).unwrap();
        let mut apps = AppSet::default();
        apps.upsert(App::new(
            Address::repeat_byte(0xaa),
            B256::ZERO,
            Address::ZERO,
            AppArtifact::new(vec![], [mint]),
        ));
        apps
    }

    #[test]
    fn encodes_selector_and_params() {
        let apps = token_manager();
        let holder = Address::repeat_byte(0x12);
        let intent = Intent::invoke(
            &apps,
            Address::repeat_byte(0xaa),
            "mint",
            vec![DynSolValue::Address(holder), DynSolValue::Uint(U256::from(10u64), 256)],
        )
        .unwrap();

        let data = intent.call_data().unwrap();
        // mint(address,uint256)
        assert_eq!(&data[..4], &hex!("40c10f19"));
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[4 + 12..4 + 32], holder.as_slice());
        assert_eq!(data[4 + 63], 10);
    }

    #[test]
    fn string_params_are_coerced() {
        let apps = token_manager();
        let intent = Intent::invoke_str(
            &apps,
            Address::repeat_byte(0xaa),
            "mint(address,uint256)",
            &["0x1212121212121212121212121212121212121212".to_string(), "10".to_string()],
        )
        .unwrap();
        assert_eq!(intent.params[1], DynSolValue::Uint(U256::from(10u64), 256));
    }

    #[test]
    fn mismatched_params_are_rejected() {
        let apps = token_manager();
        let to = Address::repeat_byte(0xaa);

        let wrong_count = Intent::invoke(&apps, to, "mint", vec![DynSolValue::Bool(true)]).unwrap();
        assert!(matches!(wrong_count.call_data(), Err(PathError::InvalidParams { .. })));

        let wrong_type = Intent::invoke(
            &apps,
            to,
            "mint",
            vec![DynSolValue::Bool(true), DynSolValue::Uint(U256::from(1u64), 256)],
        )
        .unwrap();
        assert!(matches!(wrong_type.call_data(), Err(PathError::InvalidParams { .. })));
    }

    #[test]
    fn unknown_targets_and_methods() {
        let apps = token_manager();
        assert!(matches!(
            Intent::invoke(&apps, Address::ZERO, "mint", vec![]),
            Err(PathError::UnknownApp(_))
        ));
        assert!(matches!(
            Intent::invoke(&apps, Address::repeat_byte(0xaa), "burn", vec![]),
            Err(PathError::Artifact(_))
        ));
    }
}
