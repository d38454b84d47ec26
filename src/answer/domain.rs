//! Domain-specific system instructions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subject area of the documents being queried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    #[default]
    Generic,
    Insurance,
    Legal,
    Hr,
    Compliance,
}

const INSTRUCTIONS: &str = "INSTRUCTIONS:
1. Analyze the provided document context carefully
2. Answer questions based ONLY on the information present in the document
3. Provide specific details, numbers, timeframes, and conditions when available
4. If information is not found in the document, clearly state \"Information not found in the document\"
5. Be precise and avoid speculation or assumptions
6. Include relevant clause references or section details when applicable
7. For complex conditions, break them down clearly

RESPONSE FORMAT:
- Provide direct, factual answers
- Include specific details (amounts, timeframes, percentages, etc.)
- Mention conditions or limitations when they apply
- Be concise but comprehensive";

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Generic,
        Domain::Insurance,
        Domain::Legal,
        Domain::Hr,
        Domain::Compliance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Insurance => "insurance",
            Self::Legal => "legal",
            Self::Hr => "hr",
            Self::Compliance => "compliance",
        }
    }

    fn role(&self) -> &'static str {
        match self {
            Self::Generic => "You are an expert document analysis assistant.",
            Self::Insurance => {
                "You are an expert insurance policy analyst. You read policy wordings, schedules and endorsements."
            }
            Self::Legal => {
                "You are an expert legal document analyst. You read contracts, agreements and statutes."
            }
            Self::Hr => {
                "You are an expert human resources policy analyst. You read employee handbooks, benefit plans and employment terms."
            }
            Self::Compliance => {
                "You are an expert regulatory compliance analyst. You read regulations, internal policies and audit requirements."
            }
        }
    }

    fn focus(&self) -> Option<&'static str> {
        match self {
            Self::Generic => None,
            Self::Insurance => Some(
                "Pay close attention to coverage limits, waiting periods, grace periods, exclusions, deductibles and claim procedures.",
            ),
            Self::Legal => Some(
                "Pay close attention to obligations, definitions, termination rights, liability caps and governing law.",
            ),
            Self::Hr => Some(
                "Pay close attention to eligibility, leave entitlements, notice periods, benefits and disciplinary procedures.",
            ),
            Self::Compliance => Some(
                "Pay close attention to mandatory requirements, deadlines, reporting duties and penalties for non-compliance.",
            ),
        }
    }

    /// System instruction for this domain.
    pub fn instruction(&self) -> String {
        let mut text = String::from(self.role());
        text.push_str(
            " Your task is to analyze document content and provide accurate, detailed answers to specific questions.",
        );
        if let Some(focus) = self.focus() {
            text.push(' ');
            text.push_str(focus);
        }
        text.push_str("\n\n");
        text.push_str(INSTRUCTIONS);
        text
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generic" | "general" => Ok(Self::Generic),
            "insurance" => Ok(Self::Insurance),
            "legal" => Ok(Self::Legal),
            "hr" | "human-resources" => Ok(Self::Hr),
            "compliance" => Ok(Self::Compliance),
            other => Err(format!(
                "unknown domain '{other}' (expected generic, insurance, legal, hr or compliance)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_domain() {
        assert_eq!("Insurance".parse::<Domain>().unwrap(), Domain::Insurance);
        assert_eq!("hr".parse::<Domain>().unwrap(), Domain::Hr);
        assert!("medical".parse::<Domain>().is_err());
        for domain in Domain::ALL {
            assert_eq!(domain.as_str().parse::<Domain>().unwrap(), domain);
        }
    }

    #[test]
    fn test_instructions_differ_by_domain() {
        let generic = Domain::Generic.instruction();
        let insurance = Domain::Insurance.instruction();
        assert!(generic.contains("ONLY on the information present"));
        assert!(insurance.contains("grace periods"));
        assert_ne!(generic, insurance);
    }
}
