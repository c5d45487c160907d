use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlendfitError {
    #[error("Wrong number of prior parameters: expected {expected}, got {got}")]
    InvalidPriorParameterCount { expected: usize, got: usize },

    #[error("The reference band {0} must contain all components")]
    ReferenceBandNotCovered(usize),

    #[error("Invalid measurement-component specification: {0}")]
    InvalidMeasurementSpecification(String),

    #[error("Correlation function is not implemented for {0} components (at most 2)")]
    UnsupportedComponentCount(usize),

    #[error(
        "The {context} is only defined for templates of types \"early\", \"late\" and \"irr\", but was called with type {label}"
    )]
    UnknownTemplateType { context: &'static str, label: String },

    #[error("Invalid parameter vector length: {0}")]
    InvalidParameterLength(String),

    #[error("Reference flux has {got} entries but the galaxy provides {expected}")]
    ReferenceFluxMismatch { expected: usize, got: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(
        "Magnitude = {magnitude} is outside of prior-precalculation range [{lo}, {hi}]. Check your configuration ref-mag limits cover your input magnitudes."
    )]
    MagnitudeOutsidePriorGrid { magnitude: f64, lo: f64, hi: f64 },

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV reading error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Error during the catalogue parsing: {0}")]
    CatalogParse(String),

    #[error("Snapshot serialization error: {0}")]
    SnapshotError(#[from] serde_json::Error),

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    SnapshotVersion { found: u32, expected: u32 },

    #[error("Galaxy not found: {0}")]
    GalaxyNotFound(usize),

    #[error("Galaxy {0} has no truth redshift")]
    MissingTruth(usize),

    #[error("No sampling result for galaxy {galaxy} with {num_components} components")]
    ResultNotFound {
        galaxy: usize,
        num_components: usize,
    },

    #[error("Invalid sampling options: {0}")]
    InvalidSampleOptions(String),

    #[error("Nested sampling failed: {0}")]
    SamplerFailure(String),
}

impl PartialEq for BlendfitError {
    fn eq(&self, other: &Self) -> bool {
        use BlendfitError::*;
        match (self, other) {
            (
                InvalidPriorParameterCount {
                    expected: a,
                    got: b,
                },
                InvalidPriorParameterCount {
                    expected: c,
                    got: d,
                },
            ) => a == c && b == d,
            (ReferenceBandNotCovered(a), ReferenceBandNotCovered(b)) => a == b,
            (InvalidMeasurementSpecification(a), InvalidMeasurementSpecification(b)) => a == b,
            (UnsupportedComponentCount(a), UnsupportedComponentCount(b)) => a == b,
            (
                UnknownTemplateType {
                    context: a,
                    label: b,
                },
                UnknownTemplateType {
                    context: c,
                    label: d,
                },
            ) => a == c && b == d,
            (InvalidParameterLength(a), InvalidParameterLength(b)) => a == b,
            (
                ReferenceFluxMismatch {
                    expected: a,
                    got: b,
                },
                ReferenceFluxMismatch {
                    expected: c,
                    got: d,
                },
            ) => a == c && b == d,
            (InvalidConfiguration(a), InvalidConfiguration(b)) => a == b,
            (
                MagnitudeOutsidePriorGrid {
                    magnitude: a,
                    lo: b,
                    hi: c,
                },
                MagnitudeOutsidePriorGrid {
                    magnitude: d,
                    lo: e,
                    hi: f,
                },
            ) => a == d && b == e && c == f,

            // I/O and serde errors are not comparable: equal when same variant
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,
            (SnapshotError(_), SnapshotError(_)) => true,

            (CatalogParse(a), CatalogParse(b)) => a == b,
            (
                SnapshotVersion {
                    found: a,
                    expected: b,
                },
                SnapshotVersion {
                    found: c,
                    expected: d,
                },
            ) => a == c && b == d,
            (GalaxyNotFound(a), GalaxyNotFound(b)) => a == b,
            (MissingTruth(a), MissingTruth(b)) => a == b,
            (
                ResultNotFound {
                    galaxy: a,
                    num_components: b,
                },
                ResultNotFound {
                    galaxy: c,
                    num_components: d,
                },
            ) => a == c && b == d,
            (InvalidSampleOptions(a), InvalidSampleOptions(b)) => a == b,
            (SamplerFailure(a), SamplerFailure(b)) => a == b,

            _ => false,
        }
    }
}
