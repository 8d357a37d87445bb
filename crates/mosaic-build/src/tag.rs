//! Dependency tags: the closed vocabulary of edge kinds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyTag {
    /// Link against the target's shared object
    SharedLib,
    /// Link against the target's static archive
    StaticLib,
    /// Static archive whose symbols the dependent re-exports
    StaticExport,
    /// Static archive placed after every other static input
    LateStatic,
    /// Static archive linked with --whole-archive
    WholeStatic,
    /// Raw relocatable object
    Object,
    /// Objects compiled for a sibling variant and reused as-is
    ReusedObject,
}

impl DependencyTag {
    /// All tags, in declaration order
    pub const ALL: [DependencyTag; 7] = [
        DependencyTag::SharedLib,
        DependencyTag::StaticLib,
        DependencyTag::StaticExport,
        DependencyTag::LateStatic,
        DependencyTag::WholeStatic,
        DependencyTag::Object,
        DependencyTag::ReusedObject,
    ];

    /// Tags that pull a static archive into the dependent's link
    pub const STATIC_FAMILY: [DependencyTag; 4] = [
        DependencyTag::StaticLib,
        DependencyTag::StaticExport,
        DependencyTag::LateStatic,
        DependencyTag::WholeStatic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DependencyTag::SharedLib => "shared_lib",
            DependencyTag::StaticLib => "static_lib",
            DependencyTag::StaticExport => "static_export",
            DependencyTag::LateStatic => "late_static",
            DependencyTag::WholeStatic => "whole_static",
            DependencyTag::Object => "object",
            DependencyTag::ReusedObject => "reused_object",
        }
    }

    pub fn is_static(self) -> bool {
        Self::STATIC_FAMILY.contains(&self)
    }

    /// The link variation an edge of this tag selects on its target
    ///
    /// Objects carry no link type and resolve like any other axis.
    pub fn link_variation(self) -> Option<&'static str> {
        match self {
            DependencyTag::SharedLib => Some("shared"),
            t if t.is_static() => Some("static"),
            _ => None,
        }
    }
}

impl fmt::Display for DependencyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DependencyTag::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown dependency tag '{}'", s))
    }
}
