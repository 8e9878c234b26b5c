//! Constructor argument typing and encoding.

use std::str::FromStr;

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, Specifier},
    json_abi::JsonAbi,
};
use serde::{Deserialize, Serialize};

use crate::DeployError;

/// A constructor argument as written by the user, before it is typed against the ABI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(untagged)]
pub enum ConstructorArg {
    #[display("{_0}")]
    Bool(bool),
    #[display("{_0}")]
    Integer(i64),
    #[display("{_0}")]
    Text(String),
}

impl FromStr for ConstructorArg {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::Text(s.to_string()))
    }
}

/// Constructor arguments typed against a contract's constructor signature.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArgs {
    /// The typed values, in constructor order.
    pub values: Vec<DynSolValue>,
    /// Canonical rendering of each value, used to compare deployments.
    pub snapshot: Vec<String>,
}

impl TypedArgs {
    /// ABI-encode the values as constructor parameters.
    pub fn abi_encode(&self) -> Vec<u8> {
        DynSolValue::Tuple(self.values.clone()).abi_encode_params()
    }
}

/// Type-check `args` against the constructor of `abi`.
///
/// The arity is checked before any value is parsed. A contract without an explicit
/// constructor takes no arguments.
pub fn type_constructor_args(
    contract: &str,
    abi: &JsonAbi,
    args: &[ConstructorArg],
) -> Result<TypedArgs, DeployError> {
    let inputs = abi
        .constructor
        .as_ref()
        .map(|c| c.inputs.as_slice())
        .unwrap_or_default();

    if inputs.len() != args.len() {
        return Err(DeployError::argument_mismatch(
            contract,
            format!(
                "expected {} argument(s) ({}), got {}",
                inputs.len(),
                inputs
                    .iter()
                    .map(|p| p.ty.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                args.len()
            ),
        ));
    }

    let mut values = Vec::with_capacity(args.len());
    let mut snapshot = Vec::with_capacity(args.len());

    for (index, (param, arg)) in inputs.iter().zip(args).enumerate() {
        let ty: DynSolType = param.resolve().map_err(|e| {
            DeployError::argument_mismatch(
                contract,
                format!("argument #{index} has unsupported type {}: {e}", param.ty),
            )
        })?;

        if !is_supported(&ty) {
            return Err(DeployError::argument_mismatch(
                contract,
                format!(
                    "argument #{index} ({}) has type {ty}, only primitive and fixed-size byte values are supported",
                    param.name
                ),
            ));
        }

        let value = ty.coerce_str(&arg.to_string()).map_err(|e| {
            DeployError::argument_mismatch(
                contract,
                format!(
                    "argument #{index} ({}) expects {ty}, got '{arg}': {e}",
                    param.name
                ),
            )
        })?;

        // Supported types always render.
        if let Some(rendered) = canonical(&value) {
            snapshot.push(rendered);
        }
        values.push(value);
    }

    Ok(TypedArgs { values, snapshot })
}

fn is_supported(ty: &DynSolType) -> bool {
    matches!(
        ty,
        DynSolType::Address
            | DynSolType::Bool
            | DynSolType::Int(_)
            | DynSolType::Uint(_)
            | DynSolType::FixedBytes(_)
            | DynSolType::Bytes
            | DynSolType::String
    )
}

/// Render a value so that equal values written differently compare equal.
fn canonical(value: &DynSolValue) -> Option<String> {
    match value {
        DynSolValue::Address(address) => Some(address.to_checksum(None)),
        DynSolValue::Bool(b) => Some(b.to_string()),
        DynSolValue::Int(i, _) => Some(i.to_string()),
        DynSolValue::Uint(u, _) => Some(u.to_string()),
        DynSolValue::FixedBytes(word, size) => Some(format!("0x{}", hex::encode(&word[..*size]))),
        DynSolValue::Bytes(bytes) => Some(format!("0x{}", hex::encode(bytes))),
        DynSolValue::String(s) => Some(s.clone()),
        _ => None,
    }
}
