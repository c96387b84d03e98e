//! Enumerated header codes and their display strings.

/// Static (code, display string) pairs
pub type CodeTable = &'static [(i64, &'static str)];

/// Dataset creation sites, keyed by the index of their 3-letter code
pub const CREATION_SITE_CODES: [&str; 4] = ["CMS", "DSS", "NSS", "UKM"];

pub const CREATION_SITES: CodeTable = &[
    (0, "Centre de Meteorologie Spatiale - Lannion, France"),
    (1, "Dundee Satellite Receiving Station - Dundee, Scotland, UK"),
    (2, "National Environmental Satellite, Data and Information Service - Suitland, Maryland, USA"),
    (3, "United Kingdom Meteorological Office - Bracknell, England, UK"),
];

pub const KLM_SPACECRAFT: CodeTable = &[
    (2, "NOAA-16"),
    (4, "NOAA-15"),
    (6, "NOAA-17"),
    (7, "NOAA-18"),
    (8, "NOAA-19"),
    (11, "MetOp-B"),
    (12, "MetOp-A"),
    (13, "MetOp-C"),
];

pub const POD_SPACECRAFT: CodeTable = &[
    (1, "NOAA-11"),
    (2, "NOAA-7"),
    (3, "NOAA-14"),
    (4, "NOAA-12"),
    (5, "NOAA-13"),
    (6, "NOAA-9"),
    (7, "NOAA-10"),
    (8, "TIROS-N"),
    (9, "NOAA-6"),
    (10, "NOAA-8"),
];

pub const KLM_DATA_TYPES: CodeTable = &[
    (1, "LAC"),
    (2, "GAC"),
    (3, "HRPT"),
    (4, "TIP"),
    (5, "HIRS"),
    (6, "MSU"),
    (7, "SSU"),
    (8, "DCS"),
    (9, "SEM"),
    (10, "AMSU-A"),
    (11, "AMSU-B"),
];

/// High nibble of the POD data type byte
pub const POD_DATA_TYPES: CodeTable = &[(1, "LAC"), (2, "GAC"), (3, "HRPT")];

pub const CLAVR_CLASSES: CodeTable = &[
    (0, "unknown"),
    (1, "clear"),
    (2, "probably cloudy"),
    (3, "cloudy"),
];

/// Display string for `code`, or an explicit "unknown code: N" marker
pub fn lookup(table: CodeTable, code: i64) -> String {
    table
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, s)| (*s).to_string())
        .unwrap_or_else(|| format!("unknown code: {}", code))
}

/// Index of a 3-letter creation site code
pub fn creation_site_index(code: &[u8]) -> Option<usize> {
    CREATION_SITE_CODES
        .iter()
        .position(|site| site.as_bytes() == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert_eq!(lookup(KLM_SPACECRAFT, 4), "NOAA-15");
        assert_eq!(lookup(KLM_SPACECRAFT, 99), "unknown code: 99");
        assert_eq!(lookup(POD_DATA_TYPES, 2), "GAC");
    }

    #[test]
    fn test_creation_site_index() {
        assert_eq!(creation_site_index(b"NSS"), Some(2));
        assert_eq!(creation_site_index(b"XYZ"), None);
        assert_eq!(creation_site_index(b"NS"), None);
    }
}
