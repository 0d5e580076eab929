use serde::{Deserialize, Serialize};

/// Closed severity set produced by analysis. Stored lowercase; uppercased only for display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    /// Case-insensitive parse. Surrounding whitespace is ignored.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(label))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    pub fn display_label(self) -> String {
        self.as_str().to_uppercase()
    }

    /// High and critical incidents page and get interactive chat controls.
    pub fn escalates(self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }

    pub fn style(self) -> SeverityStyle {
        match self {
            Severity::Low => SeverityStyle {
                color: "#36a64f",
                glyph: "🟢",
            },
            Severity::Medium => SeverityStyle {
                color: "#ff9900",
                glyph: "🟡",
            },
            Severity::High => SeverityStyle {
                color: "#ff0000",
                glyph: "🔴",
            },
            Severity::Critical => SeverityStyle {
                color: "#8B0000",
                glyph: "🚨",
            },
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityStyle {
    pub color: &'static str,
    pub glyph: &'static str,
}

pub const UNKNOWN_STYLE: SeverityStyle = SeverityStyle {
    color: "#808080",
    glyph: "❓",
};

/// Presentation for an arbitrary severity label; unrecognized labels get the neutral style.
pub fn format_severity(label: &str) -> SeverityStyle {
    Severity::parse(label)
        .map(Severity::style)
        .unwrap_or(UNKNOWN_STYLE)
}

/// True when the label names a severity at or above the paging threshold.
pub fn label_escalates(label: &str) -> bool {
    Severity::parse(label).is_some_and(Severity::escalates)
}
