use triage_core::domain::{AnalysisResult, CanonicalIncident};
use triage_core::error::AppError;

use crate::slack::{AlertView, SlackNotifier};

pub trait ChatChannel {
    fn send_alert(&self, view: &AlertView) -> Result<(), AppError>;
}

impl ChatChannel for SlackNotifier {
    fn send_alert(&self, view: &AlertView) -> Result<(), AppError> {
        self.send_incident_alert(view)
    }
}

pub trait PagingClient {
    fn create_incident(
        &self,
        routing_key: &str,
        analysis: &AnalysisResult,
        incident: &CanonicalIncident,
    ) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ChatUnconfigured,
    /// No paging client was built into this binary.
    PagingUnavailable,
    PagingUnconfigured,
    BelowThreshold,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::ChatUnconfigured => "chat_unconfigured",
            SkipReason::PagingUnavailable => "paging_unavailable",
            SkipReason::PagingUnconfigured => "paging_unconfigured",
            SkipReason::BelowThreshold => "below_threshold",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Delivered,
    Failed(AppError),
    Skipped(SkipReason),
}

impl ChannelOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ChannelOutcome::Delivered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub chat: ChannelOutcome,
    pub paging: ChannelOutcome,
}

/// Fans an analysis out to chat and paging. Channels fail independently and never surface
/// errors to the caller.
pub struct Dispatcher<'a> {
    chat: Option<&'a dyn ChatChannel>,
    paging: Option<&'a dyn PagingClient>,
    paging_key: Option<String>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        chat: Option<&'a dyn ChatChannel>,
        paging: Option<&'a dyn PagingClient>,
        paging_key: Option<&str>,
    ) -> Self {
        Self {
            chat,
            paging,
            paging_key: paging_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
        }
    }

    pub fn dispatch(&self, analysis: &AnalysisResult, incident: &CanonicalIncident) -> DispatchReport {
        let report = DispatchReport {
            chat: self.send_chat(analysis, incident),
            paging: self.send_paging(analysis, incident),
        };
        tracing::info!(
            incident_id = %analysis.incident_id,
            severity = %analysis.severity,
            chat = ?report.chat,
            paging = ?report.paging,
            "notifications dispatched"
        );
        report
    }

    fn send_chat(&self, analysis: &AnalysisResult, incident: &CanonicalIncident) -> ChannelOutcome {
        let Some(chat) = self.chat else {
            tracing::warn!(channel = "chat", reason = SkipReason::ChatUnconfigured.as_str(), "skipping chat alert");
            return ChannelOutcome::Skipped(SkipReason::ChatUnconfigured);
        };
        match chat.send_alert(&AlertView::from_analysis(analysis, incident)) {
            Ok(()) => ChannelOutcome::Delivered,
            Err(e) => {
                tracing::warn!(channel = "chat", error = %e.describe(), "chat alert failed");
                ChannelOutcome::Failed(e)
            }
        }
    }

    fn send_paging(&self, analysis: &AnalysisResult, incident: &CanonicalIncident) -> ChannelOutcome {
        let skip = |reason: SkipReason| {
            tracing::info!(channel = "paging", reason = reason.as_str(), "skipping page");
            ChannelOutcome::Skipped(reason)
        };
        let Some(paging) = self.paging else {
            return skip(SkipReason::PagingUnavailable);
        };
        let Some(key) = self.paging_key.as_deref() else {
            return skip(SkipReason::PagingUnconfigured);
        };
        if !analysis.severity.escalates() {
            return skip(SkipReason::BelowThreshold);
        }

        match paging.create_incident(key, analysis, incident) {
            Ok(()) => {
                tracing::info!(channel = "paging", incident_id = %analysis.incident_id, "page created");
                ChannelOutcome::Delivered
            }
            Err(e) => {
                tracing::warn!(channel = "paging", error = %e.describe(), "page failed");
                ChannelOutcome::Failed(e)
            }
        }
    }
}
