use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref BRACKET_CITATION: Regex =
        Regex::new(r"\[(\d+)\]").expect("BRACKET_CITATION regex is valid");
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub number: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Numeric `[n]` markers in order of appearance.
///
/// The review prompt asks for (Author, Year) citations, so this normally finds
/// nothing in generated reviews.
pub fn extract_citations(text: &str) -> Vec<Citation> {
    BRACKET_CITATION
        .captures_iter(text)
        .map(|caps| Citation {
            number: caps[1].to_string(),
            kind: "bracket".to_string(),
        })
        .collect()
}
