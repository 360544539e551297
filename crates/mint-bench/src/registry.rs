//! Compiled contract artifacts.
//!
//! Artifacts are read from disk at startup. Both the Foundry layout
//! (`out/<Name>.sol/<Name>.json` with `bytecode.object`) and the flat Hardhat
//! layout (`<Name>.json` with a `bytecode` string) are accepted.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy::primitives::Bytes;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no artifact for {contract} under {}", dir.display())]
    NotFound { contract: ContractKind, dir: PathBuf },
    #[error("failed reading artifact `{}`", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("artifact for {contract} is not valid JSON")]
    Json {
        contract: ContractKind,
        source: serde_json::Error,
    },
    #[error("artifact for {contract} carries no deployable bytecode")]
    MissingBytecode { contract: ContractKind },
    #[error("artifact for {contract} has malformed bytecode")]
    InvalidBytecode {
        contract: ContractKind,
        source: alloy::primitives::hex::FromHexError,
    },
}

/// The two contracts a run deploys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContractKind {
    ValueDistributor,
    Token,
}

impl ContractKind {
    /// Contract name used by the compiler output.
    pub const fn artifact_name(self) -> &'static str {
        match self {
            Self::ValueDistributor => "ValueDistributor",
            Self::Token => "MintableToken",
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.artifact_name())
    }
}

/// Interface and creation code of one contract.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub abi: Value,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    pub fn from_json(contract: ContractKind, json: &str) -> Result<Self, RegistryError> {
        let value: Value =
            serde_json::from_str(json).map_err(|source| RegistryError::Json { contract, source })?;

        let code = match &value["bytecode"] {
            Value::String(code) => code.as_str(),
            Value::Object(obj) => obj.get("object").and_then(Value::as_str).unwrap_or_default(),
            _ => "",
        };
        let bytecode = Bytes::from_str(code)
            .map_err(|source| RegistryError::InvalidBytecode { contract, source })?;
        if bytecode.is_empty() {
            return Err(RegistryError::MissingBytecode { contract });
        }

        Ok(Self {
            abi: value["abi"].clone(),
            bytecode,
        })
    }
}

/// Supplies the artifacts for both benchmark contracts.
#[derive(Debug, Clone)]
pub struct ContractRegistry {
    distributor: ContractArtifact,
    token: ContractArtifact,
}

impl ContractRegistry {
    pub fn new(distributor: ContractArtifact, token: ContractArtifact) -> Self {
        Self { distributor, token }
    }

    /// Loads both artifacts from `dir`.
    pub fn load(dir: &Path) -> Result<Self, RegistryError> {
        Ok(Self {
            distributor: load_artifact(dir, ContractKind::ValueDistributor)?,
            token: load_artifact(dir, ContractKind::Token)?,
        })
    }

    pub fn artifact(&self, contract: ContractKind) -> &ContractArtifact {
        match contract {
            ContractKind::ValueDistributor => &self.distributor,
            ContractKind::Token => &self.token,
        }
    }
}

fn load_artifact(dir: &Path, contract: ContractKind) -> Result<ContractArtifact, RegistryError> {
    let name = contract.artifact_name();
    let path = [
        dir.join(format!("{name}.sol")).join(format!("{name}.json")),
        dir.join(format!("{name}.json")),
    ]
    .into_iter()
    .find(|path| path.is_file())
    .ok_or_else(|| RegistryError::NotFound {
        contract,
        dir: dir.to_path_buf(),
    })?;

    let json = std::fs::read_to_string(&path).map_err(|source| RegistryError::Io {
        path: path.clone(),
        source,
    })?;
    ContractArtifact::from_json(contract, &json)
}
