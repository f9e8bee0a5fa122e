//! Workload ordering policies.
//!
//! A sequencer is a pure, total, deterministic permutation of the validated
//! workload list. It never raises and never drops an element; the
//! coordinator applies whichever sequencer the resource group is configured
//! with, without special-casing any of them.

mod fair_share;
mod fifo;
mod lifo;

pub use fair_share::FairShareSequencer;
pub use fifo::FifoSequencer;
pub use lifo::LifoSequencer;

use crate::snapshot::SystemSnapshot;
use crate::workload::SessionWorkload;

/// A workload ordering policy.
pub trait WorkloadSequencer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns a permutation of `workloads`.
    fn sequence(
        &self,
        snapshot: &SystemSnapshot,
        workloads: Vec<SessionWorkload>,
    ) -> Vec<SessionWorkload>;
}

/// Which sequencer a resource group uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerKind {
    Fifo,
    Lifo,
    FairShare,
}

impl SequencerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fifo => "fifo",
            Self::Lifo => "lifo",
            Self::FairShare => "fairshare",
        }
    }
}

impl std::str::FromStr for SequencerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "lifo" => Ok(Self::Lifo),
            "fairshare" | "fair_share" => Ok(Self::FairShare),
            other => Err(format!("unknown sequencer: {other}")),
        }
    }
}

/// Instantiates the sequencer for a configured kind.
pub fn sequencer_for(kind: SequencerKind) -> Box<dyn WorkloadSequencer> {
    match kind {
        SequencerKind::Fifo => Box::new(FifoSequencer),
        SequencerKind::Lifo => Box::new(LifoSequencer),
        SequencerKind::FairShare => Box::new(FairShareSequencer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("fifo".parse::<SequencerKind>().unwrap(), SequencerKind::Fifo);
        assert_eq!("LIFO".parse::<SequencerKind>().unwrap(), SequencerKind::Lifo);
        assert_eq!(
            "fairshare".parse::<SequencerKind>().unwrap(),
            SequencerKind::FairShare
        );
        assert_eq!(
            "fair_share".parse::<SequencerKind>().unwrap(),
            SequencerKind::FairShare
        );
        assert!("drf".parse::<SequencerKind>().is_err());
    }

    #[test]
    fn test_factory_matches_kind() {
        assert_eq!(sequencer_for(SequencerKind::Fifo).name(), "fifo");
        assert_eq!(sequencer_for(SequencerKind::Lifo).name(), "lifo");
        assert_eq!(sequencer_for(SequencerKind::FairShare).name(), "fairshare");
    }
}
