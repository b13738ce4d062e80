//! Licensing metric definitions.
//!
//! Each family carries only the fields its formula reads: pooled families
//! (`Ops`, `Nup`) reference three attributes and four type anchors, direct
//! families (`Ips`, `Sps`) two attributes and a single base type.

use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricFamily {
    /// Processor-standard, pooled.
    Ops,
    /// Named-user-plus, pooled with a per-processor user threshold.
    Nup,
    /// PVU-style, direct.
    Ips,
    /// Processor-standard variant, direct.
    Sps,
}

impl MetricFamily {
    pub const ALL: [MetricFamily; 4] = [
        MetricFamily::Ops,
        MetricFamily::Nup,
        MetricFamily::Ips,
        MetricFamily::Sps,
    ];

    /// Canonical family tag.
    pub fn tag(self) -> &'static str {
        match self {
            MetricFamily::Ops => "oracle.processor.standard",
            MetricFamily::Nup => "oracle.nup.standard",
            MetricFamily::Ips => "ibm.pvu.standard",
            MetricFamily::Sps => "sag.processor.standard",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            MetricFamily::Ops => "OPS",
            MetricFamily::Nup => "NUP",
            MetricFamily::Ips => "IPS",
            MetricFamily::Sps => "SPS",
        }
    }

    pub fn is_pooled(self) -> bool {
        matches!(self, MetricFamily::Ops | MetricFamily::Nup)
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for MetricFamily {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        MetricFamily::ALL
            .into_iter()
            .find(|f| f.tag() == trimmed || f.short_name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ModelError::UnsupportedFamily(s.to_string()))
    }
}

/// Anchors and attributes shared by the pooled families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PooledMetric {
    pub id: String,
    pub name: String,
    pub num_cores_attr_id: String,
    pub num_cpu_attr_id: String,
    pub core_factor_attr_id: String,
    pub start_type_id: String,
    pub base_type_id: String,
    pub aggregate_level_type_id: String,
    pub end_type_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NupMetric {
    #[serde(flatten)]
    pub pooled: PooledMetric,
    /// Minimum named users per processor license.
    pub number_of_users: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMetric {
    pub id: String,
    pub name: String,
    pub num_cores_attr_id: String,
    pub core_factor_attr_id: String,
    pub base_type_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum MetricDefinition {
    Ops(PooledMetric),
    Nup(NupMetric),
    Ips(DirectMetric),
    Sps(DirectMetric),
}

impl MetricDefinition {
    pub fn family(&self) -> MetricFamily {
        match self {
            MetricDefinition::Ops(_) => MetricFamily::Ops,
            MetricDefinition::Nup(_) => MetricFamily::Nup,
            MetricDefinition::Ips(_) => MetricFamily::Ips,
            MetricDefinition::Sps(_) => MetricFamily::Sps,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MetricDefinition::Ops(m) => &m.name,
            MetricDefinition::Nup(m) => &m.pooled.name,
            MetricDefinition::Ips(m) | MetricDefinition::Sps(m) => &m.name,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            MetricDefinition::Ops(m) => &m.id,
            MetricDefinition::Nup(m) => &m.pooled.id,
            MetricDefinition::Ips(m) | MetricDefinition::Sps(m) => &m.id,
        }
    }

    pub fn base_type_id(&self) -> &str {
        match self {
            MetricDefinition::Ops(m) => &m.base_type_id,
            MetricDefinition::Nup(m) => &m.pooled.base_type_id,
            MetricDefinition::Ips(m) | MetricDefinition::Sps(m) => &m.base_type_id,
        }
    }

    pub fn pooled(&self) -> Option<&PooledMetric> {
        match self {
            MetricDefinition::Ops(m) => Some(m),
            MetricDefinition::Nup(m) => Some(&m.pooled),
            MetricDefinition::Ips(_) | MetricDefinition::Sps(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_parses_tags_and_aliases() {
        assert_eq!(
            "oracle.processor.standard".parse::<MetricFamily>().unwrap(),
            MetricFamily::Ops
        );
        assert_eq!("nup".parse::<MetricFamily>().unwrap(), MetricFamily::Nup);
        assert_eq!(
            "ibm.pvu.standard".parse::<MetricFamily>().unwrap(),
            MetricFamily::Ips
        );
        assert_eq!("SPS".parse::<MetricFamily>().unwrap(), MetricFamily::Sps);
        assert_eq!(
            "NoNameMetric".parse::<MetricFamily>().unwrap_err(),
            ModelError::UnsupportedFamily("NoNameMetric".into())
        );
    }

    #[test]
    fn nup_flattens_pooled_fields() {
        let json = r#"{
            "family": "nup",
            "id": "1M",
            "name": "oracle.nup.standard",
            "num_cores_attr_id": "1A",
            "num_cpu_attr_id": "1B",
            "core_factor_attr_id": "1C",
            "start_type_id": "1",
            "base_type_id": "2",
            "aggregate_level_type_id": "3",
            "end_type_id": "5",
            "number_of_users": 100
        }"#;
        let metric: MetricDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(metric.family(), MetricFamily::Nup);
        assert_eq!(metric.name(), "oracle.nup.standard");
        assert_eq!(metric.pooled().map(|p| p.end_type_id.as_str()), Some("5"));
    }
}
