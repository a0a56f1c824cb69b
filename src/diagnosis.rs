//! Fixed severity label set produced by the classifier.
//!
//! The output units of the classifier head map 1:1 onto these variants, in
//! declaration order. Colours are the display colours returned to clients;
//! they are never rendered into the overlay pixels.

use serde::{Serialize, Serializer};

/// Retinopathy of Prematurity severity, ordered by classifier output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Diagnosis {
    Normal,
    PrePlus,
    Plus,
}

impl Diagnosis {
    /// All diagnoses in classifier output order.
    pub const ALL: [Diagnosis; 3] = [Diagnosis::Normal, Diagnosis::PrePlus, Diagnosis::Plus];

    /// Number of classifier output units.
    pub const COUNT: usize = Self::ALL.len();

    /// Map a classifier output index to its diagnosis.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            Self::Normal => 0,
            Self::PrePlus => 1,
            Self::Plus => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::PrePlus => "Pre-Plus",
            Self::Plus => "Plus",
        }
    }

    /// Severity colour as a CSS hex string (green / amber / red).
    pub fn color(self) -> &'static str {
        match self {
            Self::Normal => "#10b981",
            Self::PrePlus => "#f59e0b",
            Self::Plus => "#ef4444",
        }
    }
}

impl std::fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Diagnosis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("Unknown diagnosis label: {s}"))
    }
}

impl Serialize for Diagnosis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_mapping_is_fixed() {
        assert_eq!(Diagnosis::from_index(0), Some(Diagnosis::Normal));
        assert_eq!(Diagnosis::from_index(1), Some(Diagnosis::PrePlus));
        assert_eq!(Diagnosis::from_index(2), Some(Diagnosis::Plus));
        assert_eq!(Diagnosis::from_index(3), None);
    }

    #[test]
    fn label_and_color_pairs() {
        let pairs: Vec<(&str, &str)> = Diagnosis::ALL
            .iter()
            .map(|d| (d.as_str(), d.color()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Normal", "#10b981"),
                ("Pre-Plus", "#f59e0b"),
                ("Plus", "#ef4444"),
            ]
        );
    }

    #[test]
    fn index_round_trips() {
        for diagnosis in Diagnosis::ALL {
            assert_eq!(Diagnosis::from_index(diagnosis.index()), Some(diagnosis));
        }
    }

    #[test]
    fn parses_labels() {
        assert_eq!("Pre-Plus".parse::<Diagnosis>(), Ok(Diagnosis::PrePlus));
        assert!("pre-plus".parse::<Diagnosis>().is_err());
    }

    #[test]
    fn serializes_as_label() {
        let json = serde_json::to_string(&Diagnosis::PrePlus).unwrap();
        assert_eq!(json, "\"Pre-Plus\"");
    }
}
