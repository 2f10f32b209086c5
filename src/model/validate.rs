//! Validation of MME patients and match results.

use regex::Regex;

use super::{
    records::{MatchRequest, MatchResult},
    Patient,
};
use crate::err::ValidationError;

lazy_static::lazy_static! {
    /// Plain e-mail addresses.
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$")
            .expect("invalid regex in source code");
    /// Valid contact hrefs.
    static ref HREF_REGEX: Regex =
        Regex::new(r"^(mailto:\S+@\S+|https?://\S+)$").expect("invalid regex in source code");
}

/// Prefix plain e-mail contact hrefs with `mailto:` and check that the href is either a
/// `mailto:` URI or an http(s) URL.
pub fn normalize_contact_href(patient: &mut Patient) -> Result<(), ValidationError> {
    let href = patient.contact.href.trim().to_string();
    patient.contact.href = if EMAIL_REGEX.is_match(&href) {
        format!("mailto:{}", href)
    } else {
        href
    };
    if HREF_REGEX.is_match(&patient.contact.href) {
        Ok(())
    } else {
        Err(ValidationError::schema(format!(
            "contact href {:?} is neither a mailto: URI nor an http(s) URL",
            &patient.contact.href
        )))
    }
}

/// Check a patient against the MME API rules.
pub fn validate_patient(patient: &Patient) -> Result<(), ValidationError> {
    if patient.id.trim().is_empty() {
        return Err(ValidationError::schema("patient id must not be empty"));
    }
    if patient.contact.name.trim().is_empty() || patient.contact.href.trim().is_empty() {
        return Err(ValidationError::schema(
            "patient contact requires name and href",
        ));
    }

    let has_features = patient.has_features();
    let has_genomic_features = !patient.genomic_features().is_empty();
    if !has_features && !has_genomic_features {
        return Err(ValidationError::schema(
            "patient requires at least one of features or genomicFeatures",
        ));
    }

    for feature in patient.features.iter().flatten() {
        if feature.id.trim().is_empty() {
            return Err(ValidationError::schema("feature id must not be empty"));
        }
        match feature.observed.as_deref() {
            None | Some("yes") | Some("no") => (),
            Some(other) => {
                return Err(ValidationError::schema(format!(
                    "feature observed must be yes or no but was {:?}",
                    other
                )))
            }
        }
    }

    for disorder in patient.disorders.iter().flatten() {
        if disorder.id.trim().is_empty() {
            return Err(ValidationError::schema("disorder id must not be empty"));
        }
    }

    for genomic_feature in patient.genomic_features() {
        if genomic_feature.gene().is_none() {
            return Err(ValidationError::schema(
                "genomic feature requires a gene with an id",
            ));
        }
        if let Some(zygosity) = genomic_feature.zygosity {
            if zygosity > 2 {
                return Err(ValidationError::schema(format!(
                    "invalid zygosity {}",
                    zygosity
                )));
            }
        }
        if let Some(variant) = genomic_feature.variant.as_ref() {
            if variant.assembly.trim().is_empty() || variant.reference_name.trim().is_empty() {
                return Err(ValidationError::schema(
                    "variant requires assembly and referenceName",
                ));
            }
            if let Some(end) = variant.end {
                if end < variant.start {
                    return Err(ValidationError::schema("variant end is before start"));
                }
            }
        }
    }

    Ok(())
}

/// Check match results returned by this node or by a peer.
pub fn validate_results(results: &[MatchResult]) -> Result<(), ValidationError> {
    for result in results {
        if !(0.0..=1.0).contains(&result.score.combined) {
            return Err(ValidationError::schema(format!(
                "score {} of patient {} out of range",
                result.score.combined, &result.patient.id
            )));
        }
        validate_patient(&result.patient)?;
    }
    Ok(())
}

/// Parse the body of a match or patient submission request.
///
/// The contact href is normalized; the patient is validated.  Lifted-over variants are
/// node-internal and dropped from submitted patients.
pub fn parse_match_request(body: &[u8]) -> Result<Patient, ValidationError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
    let mut patient = serde_json::from_value::<MatchRequest>(value)
        .map_err(|e| ValidationError::schema(e.to_string()))?
        .patient
        .to_mme();
    normalize_contact_href(&mut patient)?;
    validate_patient(&patient)?;
    Ok(patient)
}
