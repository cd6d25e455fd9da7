//! NAICS business code → industry sector lookup.

/// Two-digit NAICS sector prefixes.
const NAICS_SECTORS: &[(&str, &str)] = &[
    ("11", "Agriculture, Forestry, Fishing and Hunting"),
    ("21", "Mining, Quarrying, and Oil and Gas Extraction"),
    ("22", "Utilities"),
    ("23", "Construction"),
    ("31", "Manufacturing"),
    ("32", "Manufacturing"),
    ("33", "Manufacturing"),
    ("42", "Wholesale Trade"),
    ("44", "Retail Trade"),
    ("45", "Retail Trade"),
    ("48", "Transportation and Warehousing"),
    ("49", "Transportation and Warehousing"),
    ("51", "Information"),
    ("52", "Finance and Insurance"),
    ("53", "Real Estate and Rental and Leasing"),
    ("54", "Professional, Scientific, and Technical Services"),
    ("55", "Management of Companies and Enterprises"),
    ("56", "Administrative and Support Services"),
    ("61", "Educational Services"),
    ("62", "Health Care and Social Assistance"),
    ("71", "Arts, Entertainment, and Recreation"),
    ("72", "Accommodation and Food Services"),
    ("81", "Other Services"),
    ("92", "Public Administration"),
];

/// Sector name for a business code, `None` when the code is too short,
/// non-numeric, or outside the sector table.
pub fn naics_sector(code: &str) -> Option<&'static str> {
    let code = code.trim();
    if code.len() < 2 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let prefix = &code[..2];
    NAICS_SECTORS
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_from_six_digit_code() {
        assert_eq!(naics_sector("336410"), Some("Manufacturing"));
        assert_eq!(naics_sector(" 525110 "), Some("Finance and Insurance"));
    }

    #[test]
    fn unusable_codes_have_no_sector() {
        assert_eq!(naics_sector("9"), None);
        assert_eq!(naics_sector("99xxxx"), None);
        assert_eq!(naics_sector("990000"), None);
    }
}
