use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::store::fields;

/// One step of the fixed pipeline chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StageKind {
    Harvest,
    Resolve,
    Extract,
    Classify,
    Originality,
}

impl StageKind {
    /// Store field carrying this stage's phase label. The fan-out branches
    /// report on their own fields so they never overwrite each other.
    pub fn status_field(self) -> &'static str {
        match self {
            Self::Harvest | Self::Resolve | Self::Extract => fields::STATE,
            Self::Classify => fields::AI_ANALYZE_STATUS,
            Self::Originality => fields::PLAGIARISM_CHECK_STATUS,
        }
    }

    pub fn start_time_field(self) -> String {
        format!("{self}_start_time")
    }

    pub fn end_time_field(self) -> String {
        format!("{self}_end_time")
    }

    /// Phase the status field must hold before this stage starts.
    /// `None` means the field is expected to be unset.
    pub fn entry_phase(self) -> Option<JobPhase> {
        match self {
            Self::Harvest => Some(JobPhase::Queued),
            Self::Resolve => Some(JobPhase::Harvested),
            Self::Extract => Some(JobPhase::IdentityResolved),
            Self::Classify | Self::Originality => None,
        }
    }

    pub fn started_phase(self) -> JobPhase {
        match self {
            Self::Harvest => JobPhase::Harvesting,
            Self::Resolve => JobPhase::ResolvingIdentity,
            Self::Extract => JobPhase::ExtractingText,
            Self::Classify => JobPhase::Classifying,
            Self::Originality => JobPhase::CheckingOriginality,
        }
    }

    pub fn finished_phase(self) -> JobPhase {
        match self {
            Self::Harvest => JobPhase::Harvested,
            Self::Resolve => JobPhase::IdentityResolved,
            Self::Extract => JobPhase::TextExtracted,
            Self::Classify => JobPhase::Classified,
            Self::Originality => JobPhase::OriginalityChecked,
        }
    }

    fn error_label(self) -> &'static str {
        match self {
            Self::Harvest => "Scraper error.",
            Self::Resolve => "DOI resolver error.",
            Self::Extract => "Extract service error.",
            Self::Classify => "AI analyzer error.",
            Self::Originality => "Plagiarism checker error.",
        }
    }
}

/// Closed set of job progress phases.
///
/// The store holds the human-readable [`JobPhase::label`]; labels parse back
/// with [`FromStr`] so status readers and tests can reason about phases
/// instead of substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobPhase {
    Queued,
    Harvesting,
    Harvested,
    HarvestEmpty,
    ResolvingIdentity,
    IdentityResolved,
    ExtractingText,
    TextExtracted,
    Classifying,
    Classified,
    CheckingOriginality,
    OriginalityChecked,
    Failed(StageKind),
}

const LABELED: [JobPhase; 12] = [
    JobPhase::Queued,
    JobPhase::Harvesting,
    JobPhase::Harvested,
    JobPhase::HarvestEmpty,
    JobPhase::ResolvingIdentity,
    JobPhase::IdentityResolved,
    JobPhase::ExtractingText,
    JobPhase::TextExtracted,
    JobPhase::Classifying,
    JobPhase::Classified,
    JobPhase::CheckingOriginality,
    JobPhase::OriginalityChecked,
];

impl JobPhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "Job queued.",
            Self::Harvesting => "Scraping started.",
            Self::Harvested => "Scraper completed successfully.",
            Self::HarvestEmpty => "Scraper found no results.",
            Self::ResolvingIdentity => "DOIs resolving.",
            Self::IdentityResolved => "DOIs resolved.",
            Self::ExtractingText => "Extract service started.",
            Self::TextExtracted => "Extract service successfully finished.",
            Self::Classifying => "AI analyzer started.",
            Self::Classified => "AI analyzer finished successfully.",
            Self::CheckingOriginality => "Plagiarism checker started.",
            Self::OriginalityChecked => "Plagiarism checker finished successfully.",
            Self::Failed(stage) => stage.error_label(),
        }
    }

    /// Stage that owns this phase, if any.
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::Queued => None,
            Self::Harvesting | Self::Harvested | Self::HarvestEmpty => Some(StageKind::Harvest),
            Self::ResolvingIdentity | Self::IdentityResolved => Some(StageKind::Resolve),
            Self::ExtractingText | Self::TextExtracted => Some(StageKind::Extract),
            Self::Classifying | Self::Classified => Some(StageKind::Classify),
            Self::CheckingOriginality | Self::OriginalityChecked => Some(StageKind::Originality),
            Self::Failed(stage) => Some(*stage),
        }
    }

    /// Last phase its status field will hold. The main chain ends at
    /// `TextExtracted`; the branches report on their own fields.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::HarvestEmpty
                | Self::TextExtracted
                | Self::Classified
                | Self::OriginalityChecked
                | Self::Failed(_)
        )
    }

    /// Allowed-transition table for one status field.
    ///
    /// `from` is the phase currently stored (`None` when unset). A failed
    /// stage may be restarted by redelivery of its message.
    pub fn can_transition(from: Option<&JobPhase>, to: &JobPhase) -> bool {
        let Some(stage) = to.stage() else {
            return from.is_none();
        };
        let entry = stage.entry_phase();
        let started = stage.started_phase();

        if *to == started {
            return from.copied() == entry || from == Some(&JobPhase::Failed(stage));
        }
        match to {
            JobPhase::Failed(_) => from == Some(&started) || from.copied() == entry,
            JobPhase::HarvestEmpty => from == Some(&JobPhase::Harvesting),
            _ if *to == stage.finished_phase() => from == Some(&started),
            _ => false,
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown job phase label: {0:?}")]
pub struct UnknownPhase(pub String);

impl FromStr for JobPhase {
    type Err = UnknownPhase;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        use strum::IntoEnumIterator;

        LABELED
            .iter()
            .copied()
            .chain(StageKind::iter().map(JobPhase::Failed))
            .find(|phase| phase.label() == label)
            .ok_or_else(|| UnknownPhase(label.to_string()))
    }
}
