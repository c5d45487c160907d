//! # Spectral templates and template types
//!
//! Every spectral template belongs to one of three broad galaxy classes, represented by the
//! closed [`TemplateType`] enum. Type labels are parsed and validated **once**, when the
//! [`TemplateSet`] is built, so the priors never branch on strings in the hot path.
//!
//! ```rust
//! use blendfit::templates::{TemplateSet, TemplateType};
//!
//! let set = TemplateSet::from_labels(&[("El_B2004a", "early"), ("Sbc_B2004a", "late"), ("Im_B2004a", "irr")]).unwrap();
//! assert_eq!(set.num_templates(), 3);
//! assert_eq!(set.template_type(2), TemplateType::Irregular);
//! assert_eq!(set.num_type(TemplateType::Late), 1);
//! ```
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::blendfit_errors::BlendfitError;

/// Broad galaxy class of a spectral template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TemplateType {
    Early,
    Late,
    Irregular,
}

impl TemplateType {
    /// All template types, in the canonical parameter order.
    pub const ALL: [TemplateType; 3] = [
        TemplateType::Early,
        TemplateType::Late,
        TemplateType::Irregular,
    ];

    /// Dense index of this type in [`TemplateType::ALL`].
    pub fn index(self) -> usize {
        match self {
            TemplateType::Early => 0,
            TemplateType::Late => 1,
            TemplateType::Irregular => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TemplateType::Early => "early",
            TemplateType::Late => "late",
            TemplateType::Irregular => "irr",
        }
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for TemplateType {
    type Err = BlendfitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "early" => Ok(TemplateType::Early),
            "late" => Ok(TemplateType::Late),
            "irr" => Ok(TemplateType::Irregular),
            other => Err(BlendfitError::UnknownTemplateType {
                context: "template set",
                label: other.to_string(),
            }),
        }
    }
}

/// An ordered set of spectral templates and their types.
///
/// Fields
/// -----------------
/// * `names` – template names, index-aligned with `types`.
/// * `types` – the [`TemplateType`] of each template.
/// * `possible_types` – the distinct types present, in [`TemplateType::ALL`] order.
/// * `type_index` – for each template, the position of its type in `possible_types`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSet {
    names: Vec<String>,
    types: Vec<TemplateType>,
    possible_types: Vec<TemplateType>,
    type_index: Vec<usize>,
}

impl TemplateSet {
    /// Build a template set from `(name, type)` pairs.
    ///
    /// Return
    /// ----------
    /// * [`BlendfitError::InvalidConfiguration`] if the set is empty.
    pub fn new(templates: Vec<(String, TemplateType)>) -> Result<Self, BlendfitError> {
        if templates.is_empty() {
            return Err(BlendfitError::InvalidConfiguration(
                "a template set needs at least one template".into(),
            ));
        }
        let (names, types): (Vec<_>, Vec<_>) = templates.into_iter().unzip();

        let possible_types: Vec<TemplateType> = TemplateType::ALL
            .into_iter()
            .filter(|t| types.contains(t))
            .collect();

        let type_index = types
            .iter()
            .map(|t| {
                possible_types
                    .iter()
                    .position(|p| p == t)
                    .unwrap_or_default()
            })
            .collect();

        Ok(TemplateSet {
            names,
            types,
            possible_types,
            type_index,
        })
    }

    /// Build a template set from `(name, label)` pairs, parsing each label into a [`TemplateType`].
    pub fn from_labels(templates: &[(&str, &str)]) -> Result<Self, BlendfitError> {
        let parsed = templates
            .iter()
            .map(|(name, label)| Ok((name.to_string(), label.parse::<TemplateType>()?)))
            .collect::<Result<Vec<_>, BlendfitError>>()?;
        TemplateSet::new(parsed)
    }

    pub fn num_templates(&self) -> usize {
        self.types.len()
    }

    pub fn name(&self, template: usize) -> &str {
        &self.names[template]
    }

    pub fn template_type(&self, template: usize) -> TemplateType {
        self.types[template]
    }

    /// Number of templates of the given type.
    pub fn num_type(&self, template_type: TemplateType) -> usize {
        self.types.iter().filter(|&&t| t == template_type).count()
    }

    pub fn possible_types(&self) -> &[TemplateType] {
        &self.possible_types
    }

    pub fn num_types(&self) -> usize {
        self.possible_types.len()
    }

    /// Position of the template's type in [`TemplateSet::possible_types`].
    pub fn type_index(&self, template: usize) -> usize {
        self.type_index[template]
    }
}

#[cfg(test)]
mod templates_test {
    use super::*;

    #[test]
    fn test_parse_labels() {
        assert_eq!("early".parse::<TemplateType>().unwrap(), TemplateType::Early);
        assert_eq!("irr".parse::<TemplateType>().unwrap(), TemplateType::Irregular);
        let err = "spiral".parse::<TemplateType>().unwrap_err();
        assert_eq!(
            err,
            BlendfitError::UnknownTemplateType {
                context: "template set",
                label: "spiral".into()
            }
        );
    }

    #[test]
    fn test_possible_types_and_index() {
        let set = TemplateSet::from_labels(&[
            ("a", "irr"),
            ("b", "early"),
            ("c", "irr"),
            ("d", "early"),
        ])
        .unwrap();
        assert_eq!(
            set.possible_types(),
            &[TemplateType::Early, TemplateType::Irregular]
        );
        assert_eq!(set.type_index(0), 1);
        assert_eq!(set.type_index(1), 0);
        assert_eq!(set.num_type(TemplateType::Irregular), 2);
        assert_eq!(set.num_type(TemplateType::Late), 0);
        assert_eq!(set.name(3), "d");
    }

    #[test]
    fn test_empty_set() {
        assert!(TemplateSet::new(Vec::new()).is_err());
    }
}
