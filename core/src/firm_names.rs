//! Actuarial firm name canonicalisation.
//!
//! Filers type the enrolled actuary's firm free-hand, so the same
//! consultancy shows up under many spellings. Each rule maps every
//! spelling it matches to one canonical name.

use regex::Regex;
use std::sync::LazyLock;

struct FirmRule {
    pattern: &'static str,
    canonical: &'static str,
}

const FIRM_RULES: &[FirmRule] = &[
    // Big 4
    FirmRule { pattern: r"\bERNST\b.*\bYOUNG\b|^EY\b", canonical: "Ernst & Young LLP" },
    FirmRule { pattern: r"\bDELOITTE\b", canonical: "Deloitte Consulting LLP" },
    FirmRule { pattern: r"\bKPMG\b", canonical: "KPMG LLP" },
    FirmRule { pattern: r"\bPRICEWATERHOUSE|^PWC\b", canonical: "PricewaterhouseCoopers LLP" },
    // Actuarial consultancies
    FirmRule { pattern: r"\bMERCER\b", canonical: "Mercer" },
    FirmRule { pattern: r"\bAON\b", canonical: "Aon" },
    FirmRule {
        pattern: r"\bWILLIS.*TOWERS.*WATSON\b|\bWTW\b|WILLS\s*TOWERS|WILLIS\s*TOWER\s",
        canonical: "Willis Towers Watson",
    },
    FirmRule { pattern: r"\bMILLIMAN\b", canonical: "Milliman" },
    FirmRule { pattern: r"\bBUCK\s*(GLOBAL|CONSULTANTS)?\b", canonical: "Buck Global LLC" },
    FirmRule { pattern: r"\bSEGAL\b", canonical: "Segal" },
    FirmRule { pattern: r"\bCONDUENT\b", canonical: "Conduent" },
    FirmRule { pattern: r"\bNYHART\b", canonical: "Nyhart" },
    FirmRule { pattern: r"\bOCTOBER\s*THREE\b", canonical: "October Three Consulting" },
    FirmRule { pattern: r"\bCHEIRON\b", canonical: "Cheiron" },
    FirmRule {
        pattern: r"\bGABRIEL\s*ROEDER\s*SMITH\b|\bGRS\b",
        canonical: "Gabriel Roeder Smith & Company",
    },
    FirmRule { pattern: r"\bCAVANAUGH\b", canonical: "Cavanaugh Macdonald Consulting" },
    // Recordkeepers and insurers
    FirmRule { pattern: r"\bFIDELITY\b", canonical: "Fidelity Investments" },
    FirmRule { pattern: r"\bEMPOWER\b", canonical: "Empower" },
    FirmRule { pattern: r"\bPRINCIPAL\b", canonical: "Principal Financial Group" },
    FirmRule { pattern: r"\bVOYA\b", canonical: "Voya Financial" },
    FirmRule { pattern: r"\bPRUDENTIAL\b", canonical: "Prudential" },
    FirmRule { pattern: r"\bMETLIFE\b", canonical: "MetLife" },
    FirmRule { pattern: r"\bMASS\s*MUTUAL\b|\bMASSMUTUAL\b", canonical: "MassMutual" },
    FirmRule { pattern: r"\bTIAA\b", canonical: "TIAA" },
    FirmRule { pattern: r"\bVANGUARD\b", canonical: "Vanguard" },
];

// Rules that fail to compile are skipped rather than taking the
// whole normalizer down; the table is static so this only bites in dev.
static COMPILED_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    FIRM_RULES
        .iter()
        .filter_map(|rule| {
            match Regex::new(&format!("(?i){}", rule.pattern)) {
                Ok(re) => Some((re, rule.canonical)),
                Err(e) => {
                    log::error!("firm rule for '{}' does not compile: {e}", rule.canonical);
                    None
                }
            }
        })
        .collect()
});

/// Map a firm name to its canonical form. Unmatched names pass through
/// trimmed; blank names return `None`.
pub fn canonical_firm_name(raw: &str) -> Option<String> {
    let cleaned = raw.trim();
    if cleaned.is_empty() {
        return None;
    }
    let canonical = COMPILED_RULES
        .iter()
        .find(|(re, _)| re.is_match(cleaned))
        .map(|(_, canonical)| (*canonical).to_string());
    Some(canonical.unwrap_or_else(|| cleaned.to_string()))
}
