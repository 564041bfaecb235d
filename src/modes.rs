//! Analysis modes
//!
//! Each mode adds an instruction block to the system prompt and ships a
//! handful of suggested questions ("chips") for the UI.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    #[default]
    General,
    Legal,
    Finance,
    Risk,
}

impl AnalysisMode {
    pub const ALL: [AnalysisMode; 4] = [
        AnalysisMode::General,
        AnalysisMode::Legal,
        AnalysisMode::Finance,
        AnalysisMode::Risk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::General => "general",
            AnalysisMode::Legal => "legal",
            AnalysisMode::Finance => "finance",
            AnalysisMode::Risk => "risk",
        }
    }

    /// Parse a mode key; unknown or empty keys map to `General`
    pub fn from_key(key: &str) -> Self {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == key)
            .unwrap_or_default()
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnalysisMode::General => "🏢 General",
            AnalysisMode::Legal => "⚖️ Legal",
            AnalysisMode::Finance => "💰 Finance",
            AnalysisMode::Risk => "🛡️ Risk",
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            AnalysisMode::General => {
                "MODE: General Knowledge Assistant.\n\
                 Answer questions about company policies, HR procedures, onboarding, benefits,\n\
                 IT guidelines, and any internal knowledge thoroughly and clearly."
            }
            AnalysisMode::Legal => {
                "MODE: Legal Contract Analyzer.\n\
                 Focus on legal provisions, clauses, obligations, rights, and contractual risks.\n\
                 Use precise legal terminology. Always add: 'This is not legal advice.'"
            }
            AnalysisMode::Finance => {
                "MODE: Financial Document Reviewer.\n\
                 Focus on monetary figures, payment terms, penalties, financial obligations,\n\
                 and fiscal risk. Format all figures clearly with currency symbols."
            }
            AnalysisMode::Risk => {
                "MODE: Risk Intelligence Scanner.\n\
                 Identify, categorize, and score risks as:\n  \
                 🔴 HIGH   — immediate legal, financial, or operational exposure\n  \
                 🟡 MEDIUM — significant risk requiring attention\n  \
                 🟢 LOW    — minor or standard boilerplate risk\n\n\
                 Provide a structured risk register: Risk | Category | Severity | Clause | Action."
            }
        }
    }

    /// Suggested starter questions shown for this mode
    pub fn chips(&self) -> &'static [&'static str] {
        match self {
            AnalysisMode::General => &[
                "What is the leave policy?",
                "Explain the reimbursement rules",
                "What are the IT security guidelines?",
                "Summarize the HR compliance requirements",
                "What is the remote work policy?",
                "Give me a 5-point document summary",
            ],
            AnalysisMode::Legal => &[
                "What are the termination conditions?",
                "List all indemnification clauses",
                "What are the governing law provisions?",
                "Extract all IP ownership terms",
                "What are the dispute resolution mechanisms?",
                "Summarize NDA obligations",
            ],
            AnalysisMode::Finance => &[
                "What financial penalties apply?",
                "List all payment milestones",
                "What are the late payment consequences?",
                "Summarize all financial obligations",
                "What revenue sharing terms exist?",
                "Identify any hidden costs or fees",
            ],
            AnalysisMode::Risk => &[
                "Highlight the key liability risks",
                "What compliance violations are mentioned?",
                "Score the overall contract risk level",
                "What limitations of liability exist?",
                "Identify all force majeure provisions",
                "What indemnity obligations do we hold?",
            ],
        }
    }
}

/// UI-facing description of a mode (`GET /api/modes`)
#[derive(Debug, Clone, Serialize)]
pub struct ModeInfo {
    pub label: &'static str,
    pub chips: &'static [&'static str],
}

impl From<AnalysisMode> for ModeInfo {
    fn from(mode: AnalysisMode) -> Self {
        Self {
            label: mode.label(),
            chips: mode.chips(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_key_falls_back_to_general() {
        assert_eq!(AnalysisMode::from_key("legal"), AnalysisMode::Legal);
        assert_eq!(AnalysisMode::from_key(" risk "), AnalysisMode::Risk);
        assert_eq!(AnalysisMode::from_key("astrology"), AnalysisMode::General);
        assert_eq!(AnalysisMode::from_key(""), AnalysisMode::General);
    }

    #[test]
    fn test_from_key_is_case_sensitive() {
        assert_eq!(AnalysisMode::from_key("LEGAL"), AnalysisMode::General);
        assert_eq!(AnalysisMode::from_key("Finance"), AnalysisMode::General);
    }

    #[test]
    fn test_risk_instruction_keeps_severity_scale() {
        let text = AnalysisMode::Risk.instruction();
        assert!(text.contains("🔴 HIGH   — immediate legal, financial, or operational exposure"));
        assert!(text.contains("🟢 LOW    — minor or standard boilerplate risk"));
    }

    #[test]
    fn test_every_mode_has_content() {
        for mode in AnalysisMode::ALL {
            assert!(mode.instruction().starts_with("MODE: "));
            assert_eq!(mode.chips().len(), 6);
            assert!(!mode.label().is_empty());
        }
    }

    #[test]
    fn test_serde_uses_lowercase_keys() {
        let json = serde_json::to_string(&AnalysisMode::Finance).unwrap();
        assert_eq!(json, "\"finance\"");
    }
}
