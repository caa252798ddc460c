// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Data sensitivity of a unit of work, ordered `Public < Internal < Sensitive < Critical`.
///
/// Computed per request and never stored on its own; every computation that
/// leads to a routing decision is captured in the compliance audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSensitivity {
    Public,
    Internal,
    Sensitive,
    Critical,
}

impl TaskSensitivity {
    pub const ALL: [TaskSensitivity; 4] = [
        TaskSensitivity::Public,
        TaskSensitivity::Internal,
        TaskSensitivity::Sensitive,
        TaskSensitivity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Sensitive => "sensitive",
            Self::Critical => "critical",
        }
    }

    /// Sensitive and critical data must never leave local execution.
    pub fn is_protected(&self) -> bool {
        *self >= Self::Sensitive
    }
}

impl fmt::Display for TaskSensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskSensitivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "internal" => Ok(Self::Internal),
            "sensitive" => Ok(Self::Sensitive),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown sensitivity level: {}", other)),
        }
    }
}

/// Where a routed request's data ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataResidency {
    Local,
    Cloud,
}

impl fmt::Display for DataResidency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Cloud => f.write_str("cloud"),
        }
    }
}
