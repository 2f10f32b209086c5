//! Removal and bulk loading of patients.

use std::time::Instant;

use thousands::Separable;
use tracing::{info, warn};

use super::{LoadPatientsArgs, RemovePatientArgs};
use crate::{
    common::io::open_read_maybe_gz,
    err::ValidationError,
    model::{
        validate::{normalize_contact_href, validate_patient},
        Patient,
    },
    store::{MatchFilter, PatientFilter, Store, UpsertOutcome},
};

/// Remove the selected patients and the match records they triggered.
///
/// Returns the IDs of the removed patients.
pub fn remove_patients(
    store: &dyn Store,
    filter: &PatientFilter,
) -> Result<Vec<String>, anyhow::Error> {
    let mut removed = Vec::new();
    for patient in store.find_patients(filter)? {
        let matches = store.delete_matches(&MatchFilter {
            query_patient_id: Some(patient.id.clone()),
            ..Default::default()
        })?;
        if store.delete_patient(&patient.id)? {
            info!("removed patient {} and {} match(es)", &patient.id, matches);
            removed.push(patient.id);
        }
    }
    Ok(removed)
}

/// Main entry point for `admin remove-patient` sub command.
pub fn run_remove_patient(
    common_args: &crate::common::Args,
    args: &RemovePatientArgs,
) -> Result<(), anyhow::Error> {
    info!("Starting `admin remove-patient`");
    info!("  common_args = {:?}", &common_args);
    info!("  args = {:?}", &args);

    let store = args.store.open()?;
    let removed = remove_patients(
        store.as_ref(),
        &PatientFilter::Identity {
            id: args.id.clone(),
            label: args.label.clone(),
        },
    )?;
    if removed.is_empty() {
        warn!("no patient matches id {:?} and label {:?}", &args.id, &args.label);
    }

    Ok(())
}

/// Parse one patient of a bulk file, normalizing its contact.
fn parse_patient(value: serde_json::Value) -> Result<Patient, ValidationError> {
    let mut patient = serde_json::from_value::<Patient>(value)
        .map_err(|e| ValidationError::schema(e.to_string()))?
        .to_mme();
    normalize_contact_href(&mut patient)?;
    validate_patient(&patient)?;
    Ok(patient)
}

/// Counts of a bulk load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub invalid: usize,
}

/// Upsert the patients of a JSON array; invalid entries are skipped.
pub fn load_patients(
    store: &dyn Store,
    values: Vec<serde_json::Value>,
) -> Result<LoadSummary, anyhow::Error> {
    let mut summary = LoadSummary::default();
    for (i, value) in values.into_iter().enumerate() {
        match parse_patient(value) {
            Ok(patient) => match store.upsert_patient(&patient)? {
                UpsertOutcome::Inserted => summary.inserted += 1,
                UpsertOutcome::Updated => summary.updated += 1,
                UpsertOutcome::Unchanged => summary.unchanged += 1,
            },
            Err(e) => {
                warn!("skipping patient #{}: {}", i, e);
                summary.invalid += 1;
            }
        }
    }
    Ok(summary)
}

/// Main entry point for `admin load-patients` sub command.
pub fn run_load_patients(
    common_args: &crate::common::Args,
    args: &LoadPatientsArgs,
) -> Result<(), anyhow::Error> {
    info!("Starting `admin load-patients`");
    info!("  common_args = {:?}", &common_args);
    info!("  args = {:?}", &args);

    info!("Loading patients...");
    let before_loading = Instant::now();
    let values: Vec<serde_json::Value> =
        serde_json::from_reader(open_read_maybe_gz(&args.path_input)?)
            .map_err(|e| anyhow::anyhow!("could not parse {}: {}", &args.path_input, e))?;
    let store = args.store.open()?;
    let summary = load_patients(store.as_ref(), values)?;
    info!(
        "...done loading patients in {:?}: {} inserted, {} updated, {} unchanged, {} invalid",
        before_loading.elapsed(),
        summary.inserted.separate_with_commas(),
        summary.updated.separate_with_commas(),
        summary.unchanged.separate_with_commas(),
        summary.invalid.separate_with_commas(),
    );

    Ok(())
}
