//! COSTAR-style prompt variants. Template construction is opaque to the
//! rest of the system: a variant is just a named `fn(&str) -> String`
//! applied to the raw legal-agreement text.

use once_cell::sync::Lazy;

use crate::error::ConfigurationError;

type Template = fn(&str) -> String;

/// A named prompt template applied to one legal document.
#[derive(Clone, Copy, Debug)]
pub struct PromptVariant {
    pub id: &'static str,
    template: Template,
}

impl PromptVariant {
    pub fn render(&self, agreement: &str) -> String {
        (self.template)(agreement)
    }
}

const CONTEXT_STUDENT: &str = "You are a Masters student in Computer Science.";
const CONTEXT_SENIOR: &str = "You are a senior Solidity developer.";
const GOAL: &str = "Write a smart contract in Solidity based on the following legal agreement";
const REQUIREMENTS: &str = "The software requirements are:\n\
    - target blockchain: Ethereum\n\
    - Solidity pragma >0.8\n\
    - fully defined function logic\n\
    - assign value of available parameters\n\
    - ready to deploy\n\
    - compilable\n\
    - secure.";
const AUDIENCE_PROFESSOR: &str = "You will deliver the smart contract to your professor.";
const AUDIENCE_LEGAL: &str =
    "You will deliver the smart contract to your company's legal department.";
const STYLE_FORMAL: &str = "Be professional and use a formal style.";

fn pr1(agreement: &str) -> String {
    format!("{CONTEXT_STUDENT} {GOAL}\n\n{agreement}\n")
}

fn pr2(agreement: &str) -> String {
    format!("{CONTEXT_STUDENT} {GOAL}\n\n{agreement}\n{STYLE_FORMAL}\n{AUDIENCE_PROFESSOR}\n")
}

fn pr5(agreement: &str) -> String {
    format!("{CONTEXT_SENIOR} {GOAL}\n\n{agreement}\n{REQUIREMENTS}\n")
}

fn pr8(agreement: &str) -> String {
    format!("{CONTEXT_SENIOR} {GOAL}\n\n{agreement}\n{REQUIREMENTS}\n{STYLE_FORMAL}\n{AUDIENCE_LEGAL}\n")
}

static VARIANTS: Lazy<Vec<PromptVariant>> = Lazy::new(|| {
    vec![
        PromptVariant {
            id: "PR1",
            template: pr1,
        },
        PromptVariant {
            id: "PR2",
            template: pr2,
        },
        PromptVariant {
            id: "PR5",
            template: pr5,
        },
        PromptVariant {
            id: "PR8",
            template: pr8,
        },
    ]
});

/// All shipped prompt variants in declaration order.
pub fn all_variants() -> &'static [PromptVariant] {
    &VARIANTS
}

/// Look up a variant by id, failing fast on unknown identifiers.
pub fn variant(id: &str) -> Result<PromptVariant, ConfigurationError> {
    VARIANTS
        .iter()
        .find(|v| v.id == id)
        .copied()
        .ok_or_else(|| ConfigurationError::UnknownPromptVariant(id.to_string()))
}
