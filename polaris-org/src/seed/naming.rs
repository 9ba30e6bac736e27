//! Certification-name normalization
//!
//! Playbooks-era archives spell framework names loosely; canonical names
//! are remapped on the way in. My Compliance archives preserve names
//! verbatim. Detection is a heuristic on control reference prefixes, so
//! archives that mix both conventions are flagged rather than guessed.

use super::archive::Record;

/// What the controls sheet says about the archive's content model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Playbooks,
    MyCompliance,
    /// Some reference ids carry the My Compliance prefix, some do not
    Ambiguous,
}

const MY_COMPLIANCE_PREFIX: &str = "CTRL-";

/// Classify an archive by its controls sheet. Absent sheet reads as
/// My Compliance (names preserved).
pub fn detect_archive_kind(controls: Option<&[Record]>) -> ArchiveKind {
    let Some(controls) = controls else {
        return ArchiveKind::MyCompliance;
    };

    let references: Vec<&str> = controls
        .iter()
        .filter_map(|r| r.get("reference_id"))
        .collect();

    if references.is_empty() {
        return ArchiveKind::Playbooks;
    }

    let prefixed = references
        .iter()
        .filter(|r| r.starts_with(MY_COMPLIANCE_PREFIX))
        .count();

    if prefixed == references.len() {
        ArchiveKind::MyCompliance
    } else if prefixed == 0 {
        ArchiveKind::Playbooks
    } else {
        ArchiveKind::Ambiguous
    }
}

/// Canonical renames applied to Playbooks archives
const CANONICAL_NAMES: &[(&str, &str)] = &[
    ("soc 2 type i", "SOC 2 Type 1"),
    ("soc2 type 1", "SOC 2 Type 1"),
    ("soc 2 - type 1", "SOC 2 Type 1"),
    ("soc 2 type ii", "SOC 2 Type 2"),
    ("soc2 type 2", "SOC 2 Type 2"),
    ("soc 2 - type 2", "SOC 2 Type 2"),
    ("iso/iec 27001", "ISO 27001"),
    ("iso 27001:2013", "ISO 27001"),
    ("pci-dss", "PCI DSS"),
    ("pci", "PCI DSS"),
    ("hipaa security rule", "HIPAA"),
];

/// Name policy for one seed run
#[derive(Debug, Clone, Copy)]
pub struct CertNaming {
    remap: bool,
}

impl CertNaming {
    pub fn for_kind(kind: ArchiveKind) -> Self {
        Self {
            // Ambiguous archives keep names verbatim; the run is flagged
            remap: kind == ArchiveKind::Playbooks,
        }
    }

    pub fn verbatim() -> Self {
        Self { remap: false }
    }

    /// Canonical form of a certification name under this policy
    pub fn canonical(&self, name: &str) -> String {
        if !self.remap {
            return name.to_string();
        }
        let needle = name.trim().to_lowercase();
        CANONICAL_NAMES
            .iter()
            .find(|(variant, _)| *variant == needle)
            .map(|(_, canonical)| canonical.to_string())
            .unwrap_or_else(|| name.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playbooks_names_are_remapped() {
        let naming = CertNaming::for_kind(ArchiveKind::Playbooks);
        assert_eq!(naming.canonical("SOC 2 Type I"), "SOC 2 Type 1");
        assert_eq!(naming.canonical("ISO/IEC 27001"), "ISO 27001");
        assert_eq!(naming.canonical("GDPR"), "GDPR");
    }

    #[test]
    fn my_compliance_names_are_verbatim() {
        let naming = CertNaming::for_kind(ArchiveKind::MyCompliance);
        assert_eq!(naming.canonical("SOC 2 Type I"), "SOC 2 Type I");
    }

    #[test]
    fn detection_follows_reference_prefixes() {
        let playbooks = vec![
            Record::from_pairs(2, &[("reference_id", "AC-1"), ("name", "a")]),
            Record::from_pairs(3, &[("reference_id", "AC-2"), ("name", "b")]),
        ];
        assert_eq!(detect_archive_kind(Some(&playbooks)), ArchiveKind::Playbooks);

        let my_compliance = vec![
            Record::from_pairs(2, &[("reference_id", "CTRL-001"), ("name", "a")]),
        ];
        assert_eq!(
            detect_archive_kind(Some(&my_compliance)),
            ArchiveKind::MyCompliance
        );

        let mixed = vec![
            Record::from_pairs(2, &[("reference_id", "CTRL-001"), ("name", "a")]),
            Record::from_pairs(3, &[("reference_id", "AC-2"), ("name", "b")]),
        ];
        assert_eq!(detect_archive_kind(Some(&mixed)), ArchiveKind::Ambiguous);

        assert_eq!(detect_archive_kind(None), ArchiveKind::MyCompliance);
    }
}
